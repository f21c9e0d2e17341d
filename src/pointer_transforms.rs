//! Pointer transforms (§4.9, "illustrative"): shared→unique promotion and
//! unique-pointer-to-local (register) promotion.

use std::collections::BTreeMap;

use crate::function::Function;
use crate::instruction::{BlockNum, Instruction, PhiOperand};
use crate::types::{Composite, SharedKind, Type, TypeTable};
use crate::usedef::UseDefIndex;
use crate::value::{Value, ValueNum};

/// For every shared-pointer value defined by `make-shared` with no use
/// that is `copy-shared`, `phi`, `call`, or `return`, retypes it (and its
/// defining/deleting instructions) to a unique pointer of the same
/// element type. Returns the value numbers that were promoted.
pub fn shared_to_unique(func: &mut Function, types: &mut TypeTable) -> Vec<ValueNum> {
    let index = UseDefIndex::build(func);
    let mut promoted = Vec::new();

    let candidates: Vec<ValueNum> = index
        .iter()
        .filter_map(|(num, info)| {
            let Type::Composite(id) = &info.ty else { return None };
            match types.get(*id) {
                Some(Composite::SharedPointer { kind: SharedKind::Strong, .. }) => Some(num),
                _ => None,
            }
        })
        .collect();

    for num in candidates {
        let info = index.info(num).unwrap();
        let Some(def_site) = info.def else { continue };
        let is_make_shared = matches!(
            func.get_block(def_site.block).and_then(|b| b.instructions.get(def_site.index)),
            Some(Instruction::MakeShared { .. })
        );
        if !is_make_shared || !info.phi_uses.is_empty() {
            continue;
        }
        let escapes = info.uses.iter().any(|site| {
            matches!(
                func.get_block(site.block).and_then(|b| b.instructions.get(site.index)),
                Some(Instruction::CopyShared { .. }) | Some(Instruction::Call { .. }) | Some(Instruction::Return { .. })
            )
        });
        if escapes {
            continue;
        }

        let Type::Composite(old_id) = &info.ty else { continue };
        let Some(Composite::SharedPointer { element, .. }) = types.get(*old_id).cloned() else { continue };
        let new_id = types.intern(Composite::UniquePointer { element });
        let new_ty = Type::Composite(new_id);

        if let Some(block) = func.get_block_mut(def_site.block) {
            if let Some(Instruction::MakeShared { result, ty: _, size }) = block.instructions.get(def_site.index).cloned() {
                block.instructions[def_site.index] = Instruction::MakeUnique { result, ty: new_ty.clone(), size };
            }
        }
        for site in info.uses.clone() {
            if let Some(block) = func.get_block_mut(site.block) {
                if let Some(Instruction::DeleteShared { address }) = block.instructions.get(site.index).cloned() {
                    let retyped = retype_value(address, num, &new_ty);
                    block.instructions[site.index] = Instruction::DeleteUnique { address: retyped };
                } else if let Some(instr) = block.instructions.get_mut(site.index) {
                    for v in instr.used_values_mut() {
                        if v.as_computed_num() == Some(num) {
                            *v = Value::Computed { num, ty: new_ty.clone() };
                        }
                    }
                }
            }
        }
        promoted.push(num);
    }

    promoted
}

fn retype_value(v: Value, num: ValueNum, ty: &Type) -> Value {
    if v.as_computed_num() == Some(num) {
        Value::Computed { num, ty: ty.clone() }
    } else {
        v
    }
}

enum EndValue {
    InProgress(ValueNum),
    Done(Value),
}

/// Promotes a single-object unique pointer (one `make-unique`/one
/// `delete-unique`, no escaping use) to direct SSA value flow, inserting
/// phis at merges where different stores reach a load. Uses the
/// "variable renaming with placeholder phis" construction (Braun et al.)
/// to handle back edges without a separate dominance-frontier pass.
pub fn unique_to_local(func: &mut Function, ptr_num: ValueNum) -> bool {
    let index = UseDefIndex::build(func);
    let Some(info) = index.info(ptr_num) else { return false };
    let Type::Composite(_) = &info.ty else { return false };
    let Some(def_site) = info.def else { return false };
    let is_make_unique =
        matches!(func.get_block(def_site.block).and_then(|b| b.instructions.get(def_site.index)), Some(Instruction::MakeUnique { .. }));
    if !is_make_unique || !info.phi_uses.is_empty() {
        return false;
    }

    let mut delete_sites = Vec::new();
    let mut load_sites = Vec::new();
    let mut store_sites = Vec::new();
    for site in &info.uses {
        match func.get_block(site.block).and_then(|b| b.instructions.get(site.index)) {
            Some(Instruction::Load { .. }) => load_sites.push(*site),
            Some(Instruction::Store { .. }) => store_sites.push(*site),
            Some(Instruction::DeleteUnique { .. }) => delete_sites.push(*site),
            _ => return false, // escaping use: call/return/pointer-offset/etc.
        }
    }
    if delete_sites.len() != 1 {
        return false;
    }

    // The pointer type itself doesn't carry its element type in this IR
    // (unlike a typed `unique_ptr<T>` composite, `ty` here can be the
    // opaque `ptr` atomic); recover the element type from any load result
    // or stored value instead.
    let element_ty = load_sites
        .first()
        .and_then(|site| func.get_block(site.block).and_then(|b| b.instructions.get(site.index)))
        .and_then(|i| if let Instruction::Load { ty, .. } = i { Some(ty.clone()) } else { None })
        .or_else(|| {
            store_sites
                .first()
                .and_then(|site| func.get_block(site.block).and_then(|b| b.instructions.get(site.index)))
                .and_then(|i| if let Instruction::Store { value, .. } = i { Some(value.ty()) } else { None })
        });
    let Some(element_ty) = element_ty else { return false };

    let mut last_local_store: BTreeMap<BlockNum, Value> = BTreeMap::new();
    for site in &store_sites {
        if let Some(Instruction::Store { value, .. }) = func.get_block(site.block).and_then(|b| b.instructions.get(site.index)) {
            last_local_store.insert(site.block, value.clone());
        }
    }

    let mut memo: BTreeMap<BlockNum, EndValue> = BTreeMap::new();
    let mut pending_phis: Vec<(BlockNum, ValueNum, Vec<PhiOperand>)> = Vec::new();

    fn entering_value(
        b: BlockNum,
        func: &Function,
        element_ty: &Type,
        last_local_store: &BTreeMap<BlockNum, Value>,
        memo: &mut BTreeMap<BlockNum, EndValue>,
        pending_phis: &mut Vec<(BlockNum, ValueNum, Vec<PhiOperand>)>,
        next_num: &mut ValueNum,
    ) -> Value {
        let parents: Vec<BlockNum> = func.get_block(b).map(|blk| blk.parents.iter().copied().collect()).unwrap_or_default();
        match parents.len() {
            0 => Value::Constant(crate::value::Constant::nil()),
            1 => end_value(parents[0], func, element_ty, last_local_store, memo, pending_phis, next_num),
            _ => {
                let phi_num = *next_num;
                *next_num += 1;
                memo.insert(b, EndValue::InProgress(phi_num));
                let mut operands = Vec::new();
                for p in parents {
                    let v = end_value(p, func, element_ty, last_local_store, memo, pending_phis, next_num);
                    operands.push(PhiOperand { value: v, parent: p });
                }
                pending_phis.push((b, phi_num, operands));
                let result = Value::Computed { num: phi_num, ty: element_ty.clone() };
                memo.insert(b, EndValue::Done(result.clone()));
                result
            }
        }
    }

    fn end_value(
        b: BlockNum,
        func: &Function,
        element_ty: &Type,
        last_local_store: &BTreeMap<BlockNum, Value>,
        memo: &mut BTreeMap<BlockNum, EndValue>,
        pending_phis: &mut Vec<(BlockNum, ValueNum, Vec<PhiOperand>)>,
        next_num: &mut ValueNum,
    ) -> Value {
        match memo.get(&b) {
            Some(EndValue::Done(v)) => return v.clone(),
            Some(EndValue::InProgress(phi)) => return Value::Computed { num: *phi, ty: element_ty.clone() },
            None => {}
        }
        if let Some(v) = last_local_store.get(&b) {
            memo.insert(b, EndValue::Done(v.clone()));
            return v.clone();
        }
        entering_value(b, func, element_ty, last_local_store, memo, pending_phis, next_num)
    }

    let mut next_num = func.computed_count();
    for site in &load_sites {
        let block = func.get_block(site.block).expect("load site block exists");
        let local_before: Option<Value> = block.instructions[..site.index].iter().rev().find_map(|i| {
            if let Instruction::Store { address, value } = i {
                (address.as_computed_num() == Some(ptr_num)).then(|| value.clone())
            } else {
                None
            }
        });
        let reaching = match local_before {
            Some(v) => v,
            None => entering_value(site.block, func, &element_ty, &last_local_store, &mut memo, &mut pending_phis, &mut next_num),
        };
        if let Some(Instruction::Load { result, ty, .. }) =
            func.get_block(site.block).and_then(|b| b.instructions.get(site.index)).cloned()
        {
            if let Some(block) = func.get_block_mut(site.block) {
                block.instructions[site.index] = Instruction::Mov { result, ty, origin: reaching };
            }
        }
    }

    let mut phi_shift: BTreeMap<BlockNum, usize> = BTreeMap::new();
    for (block_num, phi_num, operands) in pending_phis {
        if let Some(block) = func.get_block_mut(block_num) {
            block.instructions.insert(0, Instruction::Phi { result: phi_num, ty: element_ty.clone(), operands });
            *phi_shift.entry(block_num).or_insert(0) += 1;
        }
    }

    while func.computed_count() < next_num {
        func.allocate_value_num();
    }

    // Every index collected above (stores, the single delete, the def
    // itself) was computed before any phi insertion shifted that block's
    // instructions forward. Re-base each by its block's shift, then remove
    // in descending-index order per block so earlier removals don't
    // invalidate later ones.
    let mut removals: BTreeMap<BlockNum, Vec<usize>> = BTreeMap::new();
    for site in store_sites.iter().chain(delete_sites.iter()) {
        let shift = phi_shift.get(&site.block).copied().unwrap_or(0);
        removals.entry(site.block).or_default().push(site.index + shift);
    }
    {
        let shift = phi_shift.get(&def_site.block).copied().unwrap_or(0);
        removals.entry(def_site.block).or_default().push(def_site.index + shift);
    }
    for (block_num, mut indices) in removals {
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        if let Some(block) = func.get_block_mut(block_num) {
            for idx in indices {
                if idx < block.instructions.len() {
                    block.instructions.remove(idx);
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Argument, Function};
    use crate::instruction::Block;
    use crate::types::IntKind;
    use crate::value::Constant;

    #[test]
    fn shared_to_unique_retypes_non_escaping_pointer() {
        let mut types = TypeTable::new();
        let shared_id = types.intern(Composite::SharedPointer { element: Box::new(Type::Int(IntKind::I64)), kind: SharedKind::Strong });
        let shared_ty = Type::Composite(shared_id);

        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::MakeShared {
            result: 0,
            ty: shared_ty.clone(),
            size: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 8 }),
        });
        b0.instructions.push(Instruction::DeleteShared { address: Value::Computed { num: 0, ty: shared_ty.clone() } });
        b0.instructions.push(Instruction::Return { args: vec![] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.observe_value_num(0);

        let promoted = shared_to_unique(&mut func, &mut types);
        assert_eq!(promoted, vec![0]);
        let block = func.get_block(0).unwrap();
        assert!(matches!(block.instructions[0], Instruction::MakeUnique { .. }));
        assert!(matches!(block.instructions[1], Instruction::DeleteUnique { .. }));
    }

    #[test]
    fn shared_to_unique_skips_pointer_escaping_through_return() {
        let mut types = TypeTable::new();
        let shared_id = types.intern(Composite::SharedPointer { element: Box::new(Type::Bool), kind: SharedKind::Strong });
        let shared_ty = Type::Composite(shared_id);

        let mut func = Function::new(0, 0);
        func.result_types.push(shared_ty.clone());
        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::MakeShared {
            result: 0,
            ty: shared_ty.clone(),
            size: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 1 }),
        });
        b0.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 0, ty: shared_ty }] });
        func.blocks.clear();
        func.blocks.insert(0, b0);

        let promoted = shared_to_unique(&mut func, &mut types);
        assert!(promoted.is_empty());
    }

    /// `make-unique`, store, load, delete-unique, all in one block: the
    /// simplest single-block promotion (no phi needed).
    #[test]
    fn unique_to_local_promotes_single_block_store_load() {
        let unique_ty = Type::Ptr; // element-typing not load-bearing for this test's promotion check
        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::MakeUnique {
            result: 0,
            ty: unique_ty.clone(),
            size: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 1 }),
        });
        b0.instructions.push(Instruction::Store {
            address: Value::Computed { num: 0, ty: unique_ty.clone() },
            value: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 42 }),
        });
        b0.instructions.push(Instruction::Load { result: 1, ty: Type::Int(IntKind::I64), address: Value::Computed { num: 0, ty: unique_ty.clone() } });
        b0.instructions.push(Instruction::DeleteUnique { address: Value::Computed { num: 0, ty: unique_ty } });
        b0.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 1, ty: Type::Int(IntKind::I64) }] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.observe_value_num(1);

        let ok = unique_to_local(&mut func, 0);
        assert!(ok);
        let block = func.get_block(0).unwrap();
        assert!(block.instructions.iter().all(|i| !matches!(i, Instruction::Store { .. } | Instruction::DeleteUnique { .. } | Instruction::MakeUnique { .. })));
        assert!(matches!(block.instructions[0], Instruction::Mov { result: 1, .. }));
    }

    #[test]
    fn unique_to_local_declines_when_pointer_escapes_through_call() {
        let unique_ty = Type::Ptr;
        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::MakeUnique {
            result: 0,
            ty: unique_ty.clone(),
            size: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 1 }),
        });
        b0.instructions.push(Instruction::Call {
            results: vec![],
            result_types: vec![],
            callee: Value::Constant(Constant::Func(1)),
            args: vec![Value::Computed { num: 0, ty: unique_ty.clone() }],
        });
        b0.instructions.push(Instruction::DeleteUnique { address: Value::Computed { num: 0, ty: unique_ty } });
        b0.instructions.push(Instruction::Return { args: vec![] });
        func.blocks.clear();
        func.blocks.insert(0, b0);

        assert!(!unique_to_local(&mut func, 0));
    }

    #[allow(dead_code)]
    fn unused_argument_marker(_: Argument) {}
}
