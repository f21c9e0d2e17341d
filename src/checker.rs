//! The well-formedness checker (§4.2): accumulates [`Issue`]s rather than
//! failing on the first one, so a single check pass surfaces every
//! violation in a function. Grounded on Katara's `ir_checker::Issue` /
//! `Issue::Kind` (`examples/original_source/Katara/ir/checker.cc`, `.h`):
//! same shape (scope + involved objects + a closed-enum kind), same
//! strategy of checking each instruction's operand/result types against
//! the declared type before checking structural (block/phi/dominance)
//! properties.

use std::collections::{BTreeMap, BTreeSet};

use crate::function::{FuncNum, Function};
use crate::instruction::{Block, BlockNum, Instruction};
use crate::program::Program;
use crate::types::{IntKind, Type};
use crate::usedef::UseDefIndex;
use crate::value::{Value, ValueNum};

/// The closed set of ways a program can fail to be well-formed. Each
/// variant names the rule it violates; kebab-case names in doc comments
/// match identifiers used in the testable-properties scenarios (§8).
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// An operand or phi-operand refers to a value number with no
    /// definition anywhere in the function (and no matching argument).
    UnknownValue { num: ValueNum },
    /// The same value number is the result of more than one instruction
    /// (or of an instruction and also a function argument) — violates
    /// I-F1 (SSA).
    ValueDefinedMultipleTimes { num: ValueNum },
    /// A `Value::Computed` operand's carried type disagrees with the
    /// type recorded at that value's own definition site.
    OperandTypeMismatch { num: ValueNum, declared: Type, actual: Type },
    /// Two operands of a binary/shift/compare instruction have types
    /// that don't match each other, or an operand's type disagrees with
    /// an instruction's own declared result type (e.g. `mov`'s origin
    /// vs. result, `int-shift`'s shifted operand vs. result).
    OperandTypesDisagree { a: Type, b: Type },
    /// An operand's type isn't one of the kinds this opcode's rule
    /// allows (§3's per-instruction operand table) — e.g. `malloc`'s
    /// size isn't `i64`, or `nil-test`'s tested value is neither a
    /// pointer nor a function.
    OperandKindMismatch { expected: &'static str, actual: Type },
    /// A jump or jump-cond destination is not a block number in this
    /// function.
    UnknownBlock { num: BlockNum },
    /// `jump-cond-has-duplicate-destinations`: both branches of a
    /// `jcc` name the same block.
    JumpCondHasDuplicateDestinations,
    /// `phi-has-no-argument-for-parent-block`: the block has a CFG
    /// parent with no corresponding phi operand.
    PhiHasNoArgumentForParentBlock { parent: BlockNum },
    /// A phi operand names a parent block that isn't actually one of
    /// this block's CFG parents.
    PhiArgumentForNonParentBlock { block: BlockNum },
    /// I-B5: the same parent block supplies more than one operand to
    /// the same phi.
    PhiHasDuplicateArgumentForParentBlock { parent: BlockNum },
    /// A phi operand's type disagrees with the phi's own declared
    /// result type.
    PhiArgumentResultTypeMismatch { expected: Type, actual: Type },
    /// I-B3: a phi instruction appears after a non-phi in the same
    /// block.
    PhiNotAtBlockStart,
    /// I-B4: a phi instruction appears in a block with fewer than two
    /// parents.
    PhiInBlockWithoutMultipleParents,
    /// I-B1/I-B2: the block is empty, or its last instruction isn't a
    /// terminator.
    BlockMissingTerminator,
    /// An instruction appears after the block's terminator.
    InstructionAfterTerminator,
    /// The block's recorded `parents`/`children` disagree with what its
    /// own and its neighbors' terminators actually encode (I-F5).
    ParentChildMismatch { block: BlockNum },
    /// I-F3: the entry block has a recorded CFG parent.
    EntryBlockHasParents,
    /// I-F4: a non-entry block has no recorded CFG parent.
    NonEntryBlockHasNoParents,
    /// `call`'s result count, or an arg/result's type, disagrees with
    /// the callee function's declared signature.
    CallSignatureMismatch,
    /// `ret`'s argument count or types disagree with the function's
    /// declared result types.
    ReturnSignatureMismatch,
    /// A `call`'s callee names a function number absent from the
    /// program.
    UnknownCallee { num: u64 },
    /// An ordinary (non-phi) use of a value is reached along a path not
    /// dominated by that value's definition.
    UseNotDominatedByDef { num: ValueNum },
    /// A phi operand's value is not available at the end of the named
    /// parent block (its def doesn't dominate that parent).
    PhiOperandNotDominatedByDef { num: ValueNum, parent: BlockNum },
    /// §4.2 Program-wide: the same computed value number turns up as a
    /// computed operand (ordinary or phi) in more than one function.
    ValueUsedByMultipleFunctions { num: ValueNum },
}

/// The coarser error-kind grouping from §7, for callers that want to
/// report or count issues at that grain rather than per-variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCategory {
    MalformedValue,
    MalformedInstruction,
    TypeMismatch,
    PhiViolation,
    BlockViolation,
    FunctionViolation,
    ProgramViolation,
}

impl IssueKind {
    pub fn category(&self) -> IssueCategory {
        use IssueCategory::*;
        match self {
            IssueKind::UnknownValue { .. } => ProgramViolation,
            IssueKind::ValueDefinedMultipleTimes { .. } => ProgramViolation,
            IssueKind::OperandTypeMismatch { .. } => TypeMismatch,
            IssueKind::OperandTypesDisagree { .. } => TypeMismatch,
            IssueKind::OperandKindMismatch { .. } => TypeMismatch,
            IssueKind::UnknownBlock { .. } => MalformedInstruction,
            IssueKind::JumpCondHasDuplicateDestinations => BlockViolation,
            IssueKind::PhiHasNoArgumentForParentBlock { .. } => PhiViolation,
            IssueKind::PhiArgumentForNonParentBlock { .. } => PhiViolation,
            IssueKind::PhiHasDuplicateArgumentForParentBlock { .. } => PhiViolation,
            IssueKind::PhiArgumentResultTypeMismatch { .. } => PhiViolation,
            IssueKind::PhiNotAtBlockStart => BlockViolation,
            IssueKind::PhiInBlockWithoutMultipleParents => BlockViolation,
            IssueKind::BlockMissingTerminator => BlockViolation,
            IssueKind::InstructionAfterTerminator => BlockViolation,
            IssueKind::ParentChildMismatch { .. } => BlockViolation,
            IssueKind::EntryBlockHasParents => FunctionViolation,
            IssueKind::NonEntryBlockHasNoParents => FunctionViolation,
            IssueKind::CallSignatureMismatch => FunctionViolation,
            IssueKind::ReturnSignatureMismatch => FunctionViolation,
            IssueKind::UnknownCallee { .. } => MalformedInstruction,
            IssueKind::UseNotDominatedByDef { .. } => ProgramViolation,
            IssueKind::PhiOperandNotDominatedByDef { .. } => PhiViolation,
            IssueKind::ValueUsedByMultipleFunctions { .. } => ProgramViolation,
        }
    }
}

/// One well-formedness violation, scoped to the function (and, where
/// applicable, block/instruction) it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub func: FuncNum,
    pub block: Option<BlockNum>,
    pub instr_index: Option<usize>,
    pub kind: IssueKind,
}

pub fn check_program(program: &Program) -> Vec<Issue> {
    let mut issues = Vec::new();
    for func in program.funcs.values() {
        issues.extend(check_func(program, func));
    }
    issues.extend(check_cross_function_value_usage(program));
    issues
}

/// §4.2 Program-wide: "no computed value is used by more than one
/// function." Value numbers are scoped per function by construction —
/// nothing stops two unrelated functions from each having their own
/// `%0` — but nothing in the data model stops a transform from splicing
/// an instruction (and the `Value::Computed` operands it carries) from
/// one function's blocks into another's either, so this tracks, per
/// value number, every function that uses it as a computed operand and
/// flags any number claimed by more than one.
fn check_cross_function_value_usage(program: &Program) -> Vec<Issue> {
    let mut users: BTreeMap<ValueNum, BTreeSet<FuncNum>> = BTreeMap::new();
    for func in program.funcs.values() {
        for block in func.blocks_ascending() {
            for instr in &block.instructions {
                for v in instr.used_values() {
                    if let Some(num) = v.as_computed_num() {
                        users.entry(num).or_default().insert(func.num);
                    }
                }
                if let Instruction::Phi { operands, .. } = instr {
                    for op in operands {
                        if let Some(num) = op.value.as_computed_num() {
                            users.entry(num).or_default().insert(func.num);
                        }
                    }
                }
            }
        }
    }

    let mut issues = Vec::new();
    for (num, funcs) in users {
        if funcs.len() > 1 {
            for func_num in funcs {
                push(&mut issues, func_num, None, None, IssueKind::ValueUsedByMultipleFunctions { num });
            }
        }
    }
    issues
}

pub fn check_func(program: &Program, func: &Function) -> Vec<Issue> {
    let mut issues = Vec::new();
    let index = UseDefIndex::build(func);

    check_value_definitions(func, &mut issues);
    check_unknown_values(func, &index, &mut issues);

    for block in func.blocks_ascending() {
        check_block_shape(func, block, &mut issues);
        check_phi_parents(func.num, block, &mut issues);
        for (i, instr) in block.instructions.iter().enumerate() {
            check_instruction(program, func, block.num, i, instr, &index, &mut issues);
        }
    }

    check_dominance(func, &index, &mut issues);
    issues
}

fn push(issues: &mut Vec<Issue>, func: FuncNum, block: Option<BlockNum>, instr_index: Option<usize>, kind: IssueKind) {
    issues.push(Issue { func, block, instr_index, kind });
}

/// I-F4: every value number is defined at most once (by one instruction,
/// or by being a function argument, never both).
fn check_value_definitions(func: &Function, issues: &mut Vec<Issue>) {
    let mut seen: BTreeMap<ValueNum, u32> = BTreeMap::new();
    for arg in &func.args {
        *seen.entry(arg.num).or_insert(0) += 1;
    }
    for block in func.blocks_ascending() {
        for instr in &block.instructions {
            for (num, _) in instr.defined_values() {
                *seen.entry(num).or_insert(0) += 1;
            }
        }
    }
    for (num, count) in seen {
        if count > 1 {
            push(issues, func.num, None, None, IssueKind::ValueDefinedMultipleTimes { num });
        }
    }
}

fn check_unknown_values(func: &Function, index: &UseDefIndex, issues: &mut Vec<Issue>) {
    for (num, info) in index.iter() {
        let is_arg = func.args.iter().any(|a| a.num == num);
        if info.def.is_none() && !is_arg {
            push(issues, func.num, None, None, IssueKind::UnknownValue { num });
        }
    }
}

fn check_block_shape(func: &Function, block: &Block, issues: &mut Vec<Issue>) {
    if !block.phis_precede_non_phis() {
        push(issues, func.num, Some(block.num), None, IssueKind::PhiNotAtBlockStart);
    }
    match block.instructions.iter().position(|i| i.is_terminator()) {
        None => push(issues, func.num, Some(block.num), None, IssueKind::BlockMissingTerminator),
        Some(pos) if pos != block.instructions.len() - 1 => {
            push(issues, func.num, Some(block.num), Some(pos), IssueKind::InstructionAfterTerminator)
        }
        _ => {}
    }

    let expected_children: std::collections::BTreeSet<BlockNum> = block.terminator_successors().into_iter().collect();
    if expected_children != block.children {
        push(issues, func.num, Some(block.num), None, IssueKind::ParentChildMismatch { block: block.num });
    }
    let expected_parents: std::collections::BTreeSet<BlockNum> = func
        .blocks_ascending()
        .filter(|b| b.terminator_successors().contains(&block.num))
        .map(|b| b.num)
        .collect();
    if expected_parents != block.parents {
        push(issues, func.num, Some(block.num), None, IssueKind::ParentChildMismatch { block: block.num });
    }

    if block.num == func.entry {
        if !block.parents.is_empty() {
            push(issues, func.num, Some(block.num), None, IssueKind::EntryBlockHasParents);
        }
    } else if block.parents.is_empty() {
        push(issues, func.num, Some(block.num), None, IssueKind::NonEntryBlockHasNoParents);
    }

    if block.parents.len() < 2 && block.instructions.iter().any(|i| i.is_phi()) {
        push(issues, func.num, Some(block.num), None, IssueKind::PhiInBlockWithoutMultipleParents);
    }

    for (i, instr) in block.instructions.iter().enumerate() {
        if let Instruction::Jump { destination } = instr {
            if func.get_block(*destination).is_none() {
                push(issues, func.num, Some(block.num), Some(i), IssueKind::UnknownBlock { num: *destination });
            }
        }
        if let Instruction::JumpCond { true_dest, false_dest, .. } = instr {
            if func.get_block(*true_dest).is_none() {
                push(issues, func.num, Some(block.num), Some(i), IssueKind::UnknownBlock { num: *true_dest });
            }
            if func.get_block(*false_dest).is_none() {
                push(issues, func.num, Some(block.num), Some(i), IssueKind::UnknownBlock { num: *false_dest });
            }
            if true_dest == false_dest {
                push(issues, func.num, Some(block.num), Some(i), IssueKind::JumpCondHasDuplicateDestinations);
            }
        }
    }
}

/// Every CFG parent of `block` must supply exactly one phi operand per
/// phi, and every phi operand's named parent must actually be one (§8
/// scenario: "phi missing parent" yields exactly one
/// `phi-has-no-argument-for-parent-block` issue).
fn check_phi_parents(func_num: FuncNum, block: &Block, issues: &mut Vec<Issue>) {
    for (i, instr) in block.instructions.iter().enumerate() {
        let Instruction::Phi { operands, .. } = instr else { continue };
        let mut operand_parents: BTreeMap<BlockNum, u32> = BTreeMap::new();
        for op in operands {
            *operand_parents.entry(op.parent).or_insert(0) += 1;
        }
        for &parent in &block.parents {
            if !operand_parents.contains_key(&parent) {
                push(issues, func_num, Some(block.num), Some(i), IssueKind::PhiHasNoArgumentForParentBlock { parent });
            }
        }
        for (&parent, &count) in &operand_parents {
            if count > 1 {
                push(issues, func_num, Some(block.num), Some(i), IssueKind::PhiHasDuplicateArgumentForParentBlock { parent });
            }
        }
        for op in operands {
            if !block.parents.contains(&op.parent) {
                push(issues, func_num, Some(block.num), Some(i), IssueKind::PhiArgumentForNonParentBlock { block: block.num });
            }
        }
    }
}

fn check_instruction(
    program: &Program,
    func: &Function,
    block_num: BlockNum,
    index_in_block: usize,
    instr: &Instruction,
    use_def: &UseDefIndex,
    issues: &mut Vec<Issue>,
) {
    let scoped = |issues: &mut Vec<Issue>, kind: IssueKind| {
        push(issues, func.num, Some(block_num), Some(index_in_block), kind);
    };

    let check_value = |issues: &mut Vec<Issue>, v: &Value| {
        if let Value::Computed { num, ty } = v {
            if let Some(info) = use_def.info(*num) {
                if &info.ty != ty {
                    push(
                        issues,
                        func.num,
                        Some(block_num),
                        Some(index_in_block),
                        IssueKind::OperandTypeMismatch { num: *num, declared: ty.clone(), actual: info.ty.clone() },
                    );
                }
            }
        }
    };

    // table-aware type of `v`: resolves string constants to the interned
    // `string` composite rather than the context-free `Type::Ptr` fallback
    // `Value::ty` gives without a `TypeTable` (§4.2, the checker always has
    // the owning program's table at hand).
    let rty = |v: &Value| v.ty_in(&program.types);

    for v in instr.used_values() {
        check_value(issues, v);
    }
    if let Instruction::Phi { operands, ty, .. } = instr {
        for op in operands {
            check_value(issues, &op.value);
            let actual = rty(&op.value);
            if &actual != ty {
                scoped(issues, IssueKind::PhiArgumentResultTypeMismatch { expected: ty.clone(), actual });
            }
        }
    }

    let expect_i64 = |issues: &mut Vec<Issue>, v: &Value| {
        let t = rty(v);
        if t != Type::Int(IntKind::I64) {
            push(
                issues,
                func.num,
                Some(block_num),
                Some(index_in_block),
                IssueKind::OperandKindMismatch { expected: "i64", actual: t },
            );
        }
    };

    match instr {
        Instruction::Mov { ty, origin, .. } => {
            let ot = rty(origin);
            if &ot != ty {
                scoped(issues, IssueKind::OperandTypesDisagree { a: ot, b: ty.clone() });
            }
        }
        Instruction::Conversion { ty, operand, .. } => {
            let is_convertible = |t: &Type| matches!(t, Type::Bool | Type::Int(_) | Type::Ptr | Type::Func);
            let ot = rty(operand);
            if !is_convertible(&ot) {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "bool, int, ptr, or func", actual: ot });
            }
            if !is_convertible(ty) {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "bool, int, ptr, or func", actual: ty.clone() });
            }
        }
        Instruction::BoolNot { operand, .. } => {
            let ot = rty(operand);
            if !ot.is_bool() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "bool", actual: ot });
            }
        }
        Instruction::BoolBinary { a, b, .. } => {
            let (at, bt) = (rty(a), rty(b));
            if !at.is_bool() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "bool", actual: at });
            }
            if !bt.is_bool() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "bool", actual: bt });
            }
        }
        Instruction::IntUnary { ty, operand, .. } => {
            let ot = rty(operand);
            if !ot.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: ot });
            } else if &ot != ty {
                scoped(issues, IssueKind::OperandTypesDisagree { a: ot, b: ty.clone() });
            }
        }
        Instruction::IntCompare { a, b, .. } => {
            let (at, bt) = (rty(a), rty(b));
            if !at.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: at.clone() });
            }
            if !bt.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: bt.clone() });
            }
            if at.is_int() && bt.is_int() && at != bt {
                scoped(issues, IssueKind::OperandTypesDisagree { a: at, b: bt });
            }
        }
        Instruction::IntBinary { ty, a, b, .. } => {
            let (at, bt) = (rty(a), rty(b));
            if !at.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: at.clone() });
            }
            if !bt.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: bt.clone() });
            }
            if at.is_int() && bt.is_int() {
                if at != bt {
                    scoped(issues, IssueKind::OperandTypesDisagree { a: at, b: bt });
                } else if &at != ty {
                    scoped(issues, IssueKind::OperandTypesDisagree { a: at, b: ty.clone() });
                }
            }
        }
        Instruction::IntShift { shifted, offset, ty, .. } => {
            let st = rty(shifted);
            if !st.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: st });
            } else if &st != ty {
                scoped(issues, IssueKind::OperandTypesDisagree { a: st, b: ty.clone() });
            }
            let ot = rty(offset);
            if !ot.is_int() {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "int", actual: ot });
            }
        }
        Instruction::PointerOffset { pointer, offset, .. } => {
            let pt = rty(pointer);
            if pt != Type::Ptr {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "ptr", actual: pt });
            }
            expect_i64(issues, offset);
        }
        Instruction::NilTest { tested, .. } => {
            let tt = rty(tested);
            if !matches!(tt, Type::Ptr | Type::Func) {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "ptr or func", actual: tt });
            }
        }
        Instruction::Malloc { size, .. } => expect_i64(issues, size),
        Instruction::Load { address, .. } => {
            let at = rty(address);
            if !program.types.is_pointer_like(&at) {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "ptr-like", actual: at });
            }
        }
        Instruction::Store { address, .. } => {
            let at = rty(address);
            if !program.types.is_pointer_like(&at) {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "ptr-like", actual: at });
            }
        }
        Instruction::Free { address } => {
            let at = rty(address);
            if at != Type::Ptr {
                scoped(issues, IssueKind::OperandKindMismatch { expected: "ptr", actual: at });
            }
        }
        Instruction::Syscall { syscall_number, args, .. } => {
            expect_i64(issues, syscall_number);
            for a in args {
                expect_i64(issues, a);
            }
        }
        Instruction::Call { results, result_types, callee, args } => {
            if let Value::Constant(crate::value::Constant::Func(n)) = callee {
                match program.get_func(*n as FuncNum) {
                    None => scoped(issues, IssueKind::UnknownCallee { num: *n }),
                    Some(callee_func) => {
                        let args_ok = args.len() == callee_func.args.len() && args.iter().zip(&callee_func.args).all(|(a, p)| rty(a) == p.ty);
                        let results_ok = results.len() == callee_func.result_types.len()
                            && result_types.iter().zip(&callee_func.result_types).all(|(a, b)| a == b);
                        if !args_ok || !results_ok {
                            scoped(issues, IssueKind::CallSignatureMismatch);
                        }
                    }
                }
            }
        }
        Instruction::Return { args } => {
            let ok = args.len() == func.result_types.len() && args.iter().zip(&func.result_types).all(|(a, t)| &rty(a) == t);
            if !ok {
                scoped(issues, IssueKind::ReturnSignatureMismatch);
            }
        }
        _ => {}
    }
}

/// I-F4's dominance requirement: every ordinary use of a computed value
/// is dominated by that value's definition; a phi operand's value need
/// only be available at the end of the parent block it's tagged with
/// (§8: the loop-sum scenario's phi operands refer forward to values
/// defined later in the textual order but still validly dominate their
/// uses once control has looped back through the parent block).
fn check_dominance(func: &Function, index: &UseDefIndex, issues: &mut Vec<Issue>) {
    let tree = func.dominator_tree();
    for (num, info) in index.iter() {
        let Some(def_site) = info.def else { continue };
        for use_site in &info.uses {
            let dominated = if def_site.block == use_site.block {
                def_site.index < use_site.index
            } else {
                tree.dominates(def_site.block, use_site.block)
            };
            if !dominated {
                push(issues, func.num, Some(use_site.block), Some(use_site.index), IssueKind::UseNotDominatedByDef { num });
            }
        }
        for phi_site in &info.phi_uses {
            let block = func.get_block(phi_site.block).expect("phi use site block exists");
            let Instruction::Phi { operands, .. } = &block.instructions[phi_site.index] else { continue };
            for op in operands {
                if op.value.as_computed_num() != Some(num) {
                    continue;
                }
                let dominated = if def_site.block == op.parent { true } else { tree.dominates(def_site.block, op.parent) };
                if !dominated {
                    push(
                        issues,
                        func.num,
                        Some(phi_site.block),
                        Some(phi_site.index),
                        IssueKind::PhiOperandNotDominatedByDef { num, parent: op.parent },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    #[test]
    fn empty_function_has_no_issues() {
        let program = parse_program("@0 f() => () { {0} ret }").unwrap();
        assert!(check_program(&program).is_empty());
    }

    #[test]
    fn phi_missing_parent_argument_is_flagged() {
        let src = "@0 () => () { {0} jcc #t, {1}, {2}\n\
{1} jmp {2}\n\
{2} %0:i64 = phi #0:i64{0}\n\
     ret }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        let count = issues.iter().filter(|i| matches!(i.kind, IssueKind::PhiHasNoArgumentForParentBlock { parent: 1 })).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn loop_sum_scenario_is_clean() {
        let src = "@0 () => (i64) { {0} jmp {1}\n\
{1} %0 = phi #0:i64{0}, %3{2}\n\
     %1 = phi #0:i64{0}, %4{2}\n\
     %2:b = ilss %0, #10:i64\n\
     jcc %2, {2}, {3}\n\
{2} %3:i64 = iadd %0, #1:i64\n\
     %4:i64 = iadd %1, %3\n\
     jmp {1}\n\
{3} ret %1 }";
        let program = parse_program(src).unwrap();
        assert_eq!(check_program(&program), vec![]);
    }

    #[test]
    fn jump_cond_duplicate_destination_is_flagged() {
        let src = "@0 () => () { {0} jcc #t, {1}, {1}\n{1} ret }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        assert!(issues.iter().any(|i| i.kind == IssueKind::JumpCondHasDuplicateDestinations));
    }

    #[test]
    fn phi_violations_categorize_as_phi_violation() {
        assert_eq!(IssueKind::PhiHasNoArgumentForParentBlock { parent: 0 }.category(), IssueCategory::PhiViolation);
        assert_eq!(IssueKind::PhiArgumentForNonParentBlock { block: 0 }.category(), IssueCategory::PhiViolation);
    }

    #[test]
    fn malloc_size_must_be_i64() {
        let src = "@0 () => (ptr) { {0} %0 = malloc #1:i32\n     ret %0 }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        assert!(issues.iter().any(|i| matches!(&i.kind, IssueKind::OperandKindMismatch { expected, .. } if *expected == "i64")));
    }

    #[test]
    fn nil_test_operand_must_be_pointer_or_function() {
        let src = "@0 () => (b) { {0} %0 = niltest #t\n     ret %0 }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        assert!(issues.iter().any(|i| matches!(&i.kind, IssueKind::OperandKindMismatch { expected, .. } if *expected == "ptr or func")));
    }

    #[test]
    fn mov_origin_must_match_declared_result_type() {
        let src = "@0 () => (i64) { {0} %0:i64 = mov #1:i32\n     ret %0 }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        assert!(issues.iter().any(|i| matches!(&i.kind, IssueKind::OperandTypesDisagree { .. })));
    }

    #[test]
    fn phi_duplicate_parent_argument_is_flagged() {
        let src = "@0 () => (i64) { {0} jcc #t, {1}, {2}\n\
{1} jmp {2}\n\
{2} %0:i64 = phi #1:i64{0}, #2:i64{0}\n\
     ret %0 }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        assert!(issues.iter().any(|i| i.kind == IssueKind::PhiHasDuplicateArgumentForParentBlock { parent: 0 }));
    }

    #[test]
    fn phi_argument_type_must_match_declared_result_type() {
        let src = "@0 () => (i64) { {0} jcc #t, {1}, {2}\n\
{1} jmp {2}\n\
{2} %0:i64 = phi #1:i32{0}, #2:i64{1}\n\
     ret %0 }";
        let program = parse_program(src).unwrap();
        let issues = check_program(&program);
        assert!(issues
            .iter()
            .any(|i| matches!(&i.kind, IssueKind::PhiArgumentResultTypeMismatch { expected, .. } if *expected == Type::Int(IntKind::I64))));
    }

    #[test]
    fn entry_block_with_a_recorded_parent_is_flagged() {
        let src = "@0 () => () { {0} jmp {1}\n{1} ret }";
        let mut program = parse_program(src).unwrap();
        program.funcs.get_mut(&0).unwrap().get_block_mut(0).unwrap().parents.insert(1);
        let func = program.funcs.get(&0).unwrap();
        let issues = check_func(&program, func);
        assert!(issues.iter().any(|i| i.kind == IssueKind::EntryBlockHasParents));
    }

    #[test]
    fn non_entry_block_with_no_recorded_parent_is_flagged() {
        let src = "@0 () => () { {0} jmp {1}\n{1} ret }";
        let mut program = parse_program(src).unwrap();
        program.funcs.get_mut(&0).unwrap().get_block_mut(1).unwrap().parents.clear();
        let func = program.funcs.get(&0).unwrap();
        let issues = check_func(&program, func);
        assert!(issues.iter().any(|i| i.kind == IssueKind::NonEntryBlockHasNoParents));
    }

    #[test]
    fn value_used_by_two_functions_is_flagged() {
        let mut program = Program::new();

        let mut f0 = Function::new(0, 0);
        f0.result_types = vec![Type::Int(IntKind::I64)];
        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 5, ty: Type::Int(IntKind::I64) }] });
        f0.add_block(b0);
        program.add_func(f0);

        let mut f1 = Function::new(1, 0);
        f1.result_types = vec![Type::Int(IntKind::I64)];
        let mut b1 = Block::new(0);
        b1.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 5, ty: Type::Int(IntKind::I64) }] });
        f1.add_block(b1);
        program.add_func(f1);

        let issues = check_program(&program);
        let count = issues.iter().filter(|i| i.kind == IssueKind::ValueUsedByMultipleFunctions { num: 5 }).count();
        assert_eq!(count, 2);
    }

    #[test]
    fn string_constant_matches_a_string_typed_mov_result() {
        let src = "@0 () => (string) { {0} %0:string = mov \"hi\"\n     ret %0 }";
        let program = parse_program(src).unwrap();
        assert_eq!(check_program(&program), vec![]);
    }
}
