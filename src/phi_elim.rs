//! Phi elimination (§4.7): replace every phi with parallel-copy `mov`
//! instructions inserted into each parent block immediately before its
//! terminator, breaking simultaneous-copy cycles with a fresh temporary.

use std::collections::BTreeMap;

use crate::function::Function;
use crate::instruction::{Block, BlockNum, Instruction};
use crate::types::Type;
use crate::value::{Value, ValueNum};

/// Sequentializes one parallel-copy set (`dst <- src` for every pair,
/// executed as if simultaneously) into an ordered list of real moves,
/// inserting fresh temporaries to break any cycles among pairs whose
/// source is itself one of the destinations. Grounded on the classical
/// "serialize a set of parallel register copies" construction used by
/// SSA-destruction phi resolvers (§4.7's note: "a correct implementation
/// must schedule the inserted moves so that copies that feed each other
/// through a cycle are broken with an extra temporary").
fn sequentialize(
    pairs: Vec<(ValueNum, Value, Type)>,
    fresh: &mut impl FnMut(Type) -> ValueNum,
) -> Vec<(ValueNum, Value, Type)> {
    let dsts: Vec<ValueNum> = pairs.iter().map(|(d, _, _)| *d).collect();
    let mut pred: BTreeMap<ValueNum, (Value, Type)> =
        pairs.into_iter().map(|(d, s, t)| (d, (s, t))).collect();
    let mut loc: BTreeMap<ValueNum, ValueNum> = dsts.iter().map(|&d| (d, d)).collect();
    let mut use_count: BTreeMap<ValueNum, usize> = BTreeMap::new();
    for (src, _) in pred.values() {
        if let Some(n) = src.as_computed_num() {
            *use_count.entry(n).or_insert(0) += 1;
        }
    }

    let mut ready: Vec<ValueNum> = dsts.iter().copied().filter(|d| use_count.get(d).copied().unwrap_or(0) == 0).collect();
    let mut todo: Vec<ValueNum> = dsts;
    let mut out = Vec::new();

    while !todo.is_empty() {
        while let Some(b) = ready.pop() {
            if !todo.contains(&b) {
                continue;
            }
            if let Some((src, ty)) = pred.remove(&b) {
                let emitted_src = match src.as_computed_num() {
                    Some(a) => {
                        let c = *loc.get(&a).unwrap_or(&a);
                        loc.insert(a, b);
                        if let Some(cnt) = use_count.get_mut(&c) {
                            *cnt = cnt.saturating_sub(1);
                            if *cnt == 0 && pred.contains_key(&c) {
                                ready.push(c);
                            }
                        }
                        Value::Computed { num: c, ty: ty.clone() }
                    }
                    None => src,
                };
                out.push((b, emitted_src, ty));
            }
            todo.retain(|&x| x != b);
        }
        if let Some(&b) = pred.keys().find(|d| todo.contains(d)) {
            let (_, ty) = pred.get(&b).unwrap().clone();
            let temp = fresh(ty.clone());
            out.push((temp, Value::Computed { num: b, ty: ty.clone() }, ty.clone()));
            loc.insert(b, temp);
            ready.push(b);
        }
    }

    out
}

/// One phi copy to insert into a parent block: the phi's result, the
/// operand value tagged to that parent, and the phi's type.
fn collect_phi_copies(child: &Block, parent: BlockNum) -> Vec<(ValueNum, Value, Type)> {
    let mut pairs = Vec::new();
    for instr in child.phis() {
        if let Instruction::Phi { result, ty, operands } = instr {
            if let Some(op) = operands.iter().find(|o| o.parent == parent) {
                pairs.push((*result, op.value.clone(), ty.clone()));
            }
            // A missing operand for a declared parent is an I-B5 violation;
            // phi elimination assumes a checked program (§4.10) and simply
            // skips it rather than inventing a value.
        }
    }
    pairs
}

/// Eliminates every phi in `func`, inserting the resulting moves into
/// parent blocks. Returns the fresh temporaries allocated to break
/// parallel-copy cycles, if any.
pub fn eliminate_phis(func: &mut Function) -> Vec<ValueNum> {
    let children_with_phis: Vec<BlockNum> =
        func.blocks_ascending().filter(|b| b.phis().next().is_some()).map(|b| b.num).collect();

    let mut next_temp = func.computed_count();
    let mut fresh = |_ty: Type| -> ValueNum {
        let n = next_temp;
        next_temp += 1;
        n
    };

    let mut temps = Vec::new();
    let mut inserts: BTreeMap<BlockNum, Vec<(ValueNum, Value, Type)>> = BTreeMap::new();

    for &cnum in &children_with_phis {
        let child = func.get_block(cnum).expect("child block exists").clone();
        for &parent in &child.parents {
            let pairs = collect_phi_copies(&child, parent);
            if pairs.is_empty() {
                continue;
            }
            let before = temps.len();
            let resolved = sequentialize(pairs, &mut |ty| {
                let n = fresh(ty);
                temps.push(n);
                n
            });
            debug_assert!(temps.len() >= before);
            inserts.entry(parent).or_default().extend(resolved);
        }
    }

    for (parent, moves) in inserts {
        let block = func.get_block_mut(parent).expect("parent block exists");
        let term_idx = block.instructions.iter().position(Instruction::is_terminator).unwrap_or(block.instructions.len());
        let movs: Vec<Instruction> =
            moves.into_iter().map(|(result, origin, ty)| Instruction::Mov { result, ty, origin }).collect();
        block.instructions.splice(term_idx..term_idx, movs);
    }

    for &cnum in &children_with_phis {
        let block = func.get_block_mut(cnum).expect("child block exists");
        block.instructions.retain(|i| !i.is_phi());
    }

    while func.computed_count() < next_temp {
        func.allocate_value_num();
    }

    temps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Argument, Function};
    use crate::instruction::PhiOperand;
    use crate::types::{BinaryOp, CompareOp, IntKind};
    use crate::value::Constant;

    fn loop_sum() -> Function {
        let mut func = Function::new(0, 0);
        func.result_types.push(Type::Int(IntKind::I64));

        let mut b0 = Block::new(0);
        b0.children.insert(1);
        b0.instructions.push(Instruction::Jump { destination: 1 });

        let mut b1 = Block::new(1);
        b1.parents.insert(0);
        b1.parents.insert(2);
        b1.children.insert(2);
        b1.children.insert(3);
        b1.instructions.push(Instruction::Phi {
            result: 0,
            ty: Type::Int(IntKind::I64),
            operands: vec![
                PhiOperand { value: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 0 }), parent: 0 },
                PhiOperand { value: Value::Computed { num: 3, ty: Type::Int(IntKind::I64) }, parent: 2 },
            ],
        });
        b1.instructions.push(Instruction::Phi {
            result: 1,
            ty: Type::Int(IntKind::I64),
            operands: vec![
                PhiOperand { value: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 0 }), parent: 0 },
                PhiOperand { value: Value::Computed { num: 4, ty: Type::Int(IntKind::I64) }, parent: 2 },
            ],
        });
        b1.instructions.push(Instruction::IntCompare {
            result: 2,
            op: CompareOp::Lss,
            a: Value::Computed { num: 0, ty: Type::Int(IntKind::I64) },
            b: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 10 }),
        });
        b1.instructions.push(Instruction::JumpCond { cond: Value::Computed { num: 2, ty: Type::Bool }, true_dest: 2, false_dest: 3 });

        let mut b2 = Block::new(2);
        b2.parents.insert(1);
        b2.children.insert(1);
        b2.instructions.push(Instruction::IntBinary {
            result: 3,
            ty: Type::Int(IntKind::I64),
            op: BinaryOp::Add,
            a: Value::Computed { num: 0, ty: Type::Int(IntKind::I64) },
            b: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 1 }),
        });
        b2.instructions.push(Instruction::IntBinary {
            result: 4,
            ty: Type::Int(IntKind::I64),
            op: BinaryOp::Add,
            a: Value::Computed { num: 1, ty: Type::Int(IntKind::I64) },
            b: Value::Computed { num: 3, ty: Type::Int(IntKind::I64) },
        });
        b2.instructions.push(Instruction::Jump { destination: 1 });

        let mut b3 = Block::new(3);
        b3.parents.insert(1);
        b3.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 1, ty: Type::Int(IntKind::I64) }] });

        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.blocks.insert(1, b1);
        func.blocks.insert(2, b2);
        func.blocks.insert(3, b3);
        func
    }

    #[test]
    fn scenario_3_elimination_leaves_no_phis() {
        let mut func = loop_sum();
        eliminate_phis(&mut func);
        for block in func.blocks_ascending() {
            assert!(block.phis().next().is_none());
        }
    }

    #[test]
    fn moves_land_before_each_parent_terminator() {
        let mut func = loop_sum();
        eliminate_phis(&mut func);

        let b0 = func.get_block(0).unwrap();
        assert!(matches!(b0.instructions.last(), Some(Instruction::Jump { destination: 1 })));
        assert!(b0.instructions[..b0.instructions.len() - 1]
            .iter()
            .any(|i| matches!(i, Instruction::Mov { result: 0, .. })));
        assert!(b0.instructions[..b0.instructions.len() - 1]
            .iter()
            .any(|i| matches!(i, Instruction::Mov { result: 1, .. })));

        let b2 = func.get_block(2).unwrap();
        assert!(matches!(b2.instructions.last(), Some(Instruction::Jump { destination: 1 })));
        let before_term = &b2.instructions[..b2.instructions.len() - 1];
        assert!(before_term.iter().any(|i| matches!(i, Instruction::Mov { result: 0, .. })));
        assert!(before_term.iter().any(|i| matches!(i, Instruction::Mov { result: 1, .. })));
    }

    #[test]
    fn swap_cycle_uses_a_temporary() {
        // A block with two parents, where a loop-back edge feeds each phi
        // the OTHER phi's result: phi_a = phi(c0@p0, b@p1); phi_b =
        // phi(c0@p0, a@p1) — a true simultaneous swap.
        let mut func = Function::new(0, 1);
        func.args.push(Argument { num: 0, ty: Type::Int(IntKind::I64) });

        let mut b0 = Block::new(0);
        b0.children.insert(1);
        b0.instructions.push(Instruction::Jump { destination: 1 });

        let mut b1 = Block::new(1);
        b1.parents.insert(0);
        b1.parents.insert(2);
        b1.children.insert(2);
        b1.instructions.push(Instruction::Phi {
            result: 1,
            ty: Type::Int(IntKind::I64),
            operands: vec![
                PhiOperand { value: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 0 }), parent: 0 },
                PhiOperand { value: Value::Computed { num: 2, ty: Type::Int(IntKind::I64) }, parent: 2 },
            ],
        });
        b1.instructions.push(Instruction::Phi {
            result: 2,
            ty: Type::Int(IntKind::I64),
            operands: vec![
                PhiOperand { value: Value::Constant(Constant::Int { kind: IntKind::I64, bits: 1 }), parent: 0 },
                PhiOperand { value: Value::Computed { num: 1, ty: Type::Int(IntKind::I64) }, parent: 2 },
            ],
        });
        b1.instructions.push(Instruction::Jump { destination: 2 });

        let mut b2 = Block::new(2);
        b2.parents.insert(1);
        b2.children.insert(1);
        b2.instructions.push(Instruction::Jump { destination: 1 });

        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.blocks.insert(1, b1);
        func.blocks.insert(2, b2);
        func.observe_value_num(2);

        let pre_count = func.computed_count();
        let temps = eliminate_phis(&mut func);
        assert_eq!(temps.len(), 1, "a 2-cycle needs exactly one temporary");
        assert!(func.computed_count() > pre_count);

        let b2 = func.get_block(2).unwrap();
        assert!(b2.instructions.len() > 1, "moves were inserted before the jump");
    }
}
