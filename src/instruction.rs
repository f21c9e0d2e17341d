//! The instruction set (§3) and the basic block container (§3 Block,
//! invariants I-B1..I-B5).

use std::collections::BTreeSet;
use std::fmt;
use serde::{Deserialize, Serialize};

use crate::types::{BinaryOp, CompareOp, ShiftOp, Type, UnaryOp};
use crate::value::{Value, ValueNum};

/// A function-unique block number. Signed to match Katara's `block_num_t`
/// (`int64_t`); see `examples/original_source/src/ir/representation/num_types.h`.
pub type BlockNum = i64;

/// Bool-only binary operators (§3 `bool-binary`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if matches!(self, BoolOp::And) { "band" } else { "bor" })
    }
}

/// One (value, parent-block) pair in a phi's operand list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiOperand {
    pub value: Value,
    pub parent: BlockNum,
}

impl fmt::Display for PhiOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.value, self.parent)
    }
}

fn fmt_result_list(f: &mut fmt::Formatter<'_>, nums: &[ValueNum]) -> fmt::Result {
    for (i, n) in nums.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "%{n}")?;
    }
    Ok(())
}

fn fmt_value_list(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}

/// A single IR instruction. Every variant that defines a result carries its
/// own [`ValueNum`] (and, where the type isn't implied by the operator,
/// its [`Type`]); invariant I-F4 (SSA) is enforced by the checker, not by
/// this type — the instruction alone is just a tagged payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Mov { result: ValueNum, ty: Type, origin: Value },
    Phi { result: ValueNum, ty: Type, operands: Vec<PhiOperand> },
    Conversion { result: ValueNum, ty: Type, operand: Value },
    BoolNot { result: ValueNum, operand: Value },
    BoolBinary { result: ValueNum, op: BoolOp, a: Value, b: Value },
    IntUnary { result: ValueNum, ty: Type, op: UnaryOp, operand: Value },
    IntCompare { result: ValueNum, op: CompareOp, a: Value, b: Value },
    IntBinary { result: ValueNum, ty: Type, op: BinaryOp, a: Value, b: Value },
    IntShift { result: ValueNum, ty: Type, op: ShiftOp, shifted: Value, offset: Value },
    PointerOffset { result: ValueNum, pointer: Value, offset: Value },
    NilTest { result: ValueNum, tested: Value },
    Malloc { result: ValueNum, size: Value },
    Load { result: ValueNum, ty: Type, address: Value },
    Store { address: Value, value: Value },
    Free { address: Value },
    Jump { destination: BlockNum },
    JumpCond { cond: Value, true_dest: BlockNum, false_dest: BlockNum },
    Syscall { result: ValueNum, syscall_number: Value, args: Vec<Value> },
    Call { results: Vec<ValueNum>, result_types: Vec<Type>, callee: Value, args: Vec<Value> },
    Return { args: Vec<Value> },
    MakeShared { result: ValueNum, ty: Type, size: Value },
    CopyShared { result: ValueNum, ty: Type, copied: Value, offset: Value },
    DeleteShared { address: Value },
    MakeUnique { result: ValueNum, ty: Type, size: Value },
    DeleteUnique { address: Value },
    StringIndex { result: ValueNum, string: Value, index: Value },
    StringConcat { result: ValueNum, operands: Vec<Value> },
    Panic { reason: Value },
}

impl Instruction {
    /// Opcode mnemonic, as it appears in the textual form (§4.1).
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Mov { .. } => "mov",
            Instruction::Phi { .. } => "phi",
            Instruction::Conversion { .. } => "conv",
            Instruction::BoolNot { .. } => "bnot",
            Instruction::BoolBinary { op, .. } => match op {
                BoolOp::And => "band",
                BoolOp::Or => "bor",
            },
            Instruction::IntUnary { op, .. } => match op {
                UnaryOp::Neg => "ineg",
                UnaryOp::Not => "inot",
            },
            Instruction::IntCompare { op, .. } => match op {
                CompareOp::Eq => "ieq",
                CompareOp::Neq => "ineq",
                CompareOp::Lss => "ilss",
                CompareOp::Leq => "ileq",
                CompareOp::Gtr => "igtr",
                CompareOp::Geq => "igeq",
            },
            Instruction::IntBinary { op, .. } => match op {
                BinaryOp::Add => "iadd",
                BinaryOp::Sub => "isub",
                BinaryOp::Mul => "imul",
                BinaryOp::Quo => "iquo",
                BinaryOp::Rem => "irem",
                BinaryOp::And => "iand",
                BinaryOp::Or => "ior",
                BinaryOp::Xor => "ixor",
                BinaryOp::Andnot => "iandnot",
            },
            Instruction::IntShift { op, .. } => match op {
                ShiftOp::Shl => "shl",
                ShiftOp::Shr => "shr",
            },
            Instruction::PointerOffset { .. } => "poff",
            Instruction::NilTest { .. } => "niltest",
            Instruction::Malloc { .. } => "malloc",
            Instruction::Load { .. } => "load",
            Instruction::Store { .. } => "store",
            Instruction::Free { .. } => "free",
            Instruction::Jump { .. } => "jmp",
            Instruction::JumpCond { .. } => "jcc",
            Instruction::Syscall { .. } => "syscall",
            Instruction::Call { .. } => "call",
            Instruction::Return { .. } => "ret",
            Instruction::MakeShared { .. } => "make_shared",
            Instruction::CopyShared { .. } => "copy_shared",
            Instruction::DeleteShared { .. } => "delete_shared",
            Instruction::MakeUnique { .. } => "make_unique",
            Instruction::DeleteUnique { .. } => "delete_unique",
            Instruction::StringIndex { .. } => "str_index",
            Instruction::StringConcat { .. } => "str_concat",
            Instruction::Panic { .. } => "panic",
        }
    }

    /// Is this the variant allowed only at the head of a block (I-B3)?
    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi { .. })
    }

    /// Is this variant a control-flow terminator (I-B2: jump, jump-cond,
    /// return)?
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instruction::Jump { .. } | Instruction::JumpCond { .. } | Instruction::Return { .. })
    }

    /// Block numbers this instruction (as a terminator) transfers control
    /// to. Empty for non-terminators.
    pub fn successors(&self) -> Vec<BlockNum> {
        match self {
            Instruction::Jump { destination } => vec![*destination],
            Instruction::JumpCond { true_dest, false_dest, .. } => vec![*true_dest, *false_dest],
            Instruction::Return { .. } => vec![],
            _ => vec![],
        }
    }

    /// (value number, type) pairs this instruction defines. Multi-result
    /// only for `call`.
    pub fn defined_values(&self) -> Vec<(ValueNum, Type)> {
        match self {
            Instruction::Mov { result, ty, .. }
            | Instruction::Conversion { result, ty, .. }
            | Instruction::IntUnary { result, ty, .. }
            | Instruction::IntBinary { result, ty, .. }
            | Instruction::IntShift { result, ty, .. }
            | Instruction::Load { result, ty, .. }
            | Instruction::MakeShared { result, ty, .. }
            | Instruction::CopyShared { result, ty, .. }
            | Instruction::MakeUnique { result, ty, .. }
            | Instruction::Phi { result, ty, .. } => vec![(*result, ty.clone())],
            Instruction::BoolNot { result, .. } => vec![(*result, Type::Bool)],
            Instruction::BoolBinary { result, .. } => vec![(*result, Type::Bool)],
            Instruction::IntCompare { result, .. } => vec![(*result, Type::Bool)],
            Instruction::PointerOffset { result, .. } => vec![(*result, Type::Ptr)],
            Instruction::NilTest { result, .. } => vec![(*result, Type::Bool)],
            Instruction::Malloc { result, .. } => vec![(*result, Type::Ptr)],
            Instruction::Syscall { result, .. } => vec![(*result, Type::Int(crate::types::IntKind::I64))],
            Instruction::Call { results, result_types, .. } => {
                results.iter().copied().zip(result_types.iter().cloned()).collect()
            }
            Instruction::StringIndex { result, .. } => vec![(*result, Type::Int(crate::types::IntKind::I8))],
            Instruction::StringConcat { result, .. } => vec![(*result, Type::Ptr)],
            Instruction::Store { .. }
            | Instruction::Free { .. }
            | Instruction::Jump { .. }
            | Instruction::JumpCond { .. }
            | Instruction::Return { .. }
            | Instruction::DeleteShared { .. }
            | Instruction::DeleteUnique { .. }
            | Instruction::Panic { .. } => vec![],
        }
    }

    /// All operand values, in order, *excluding* phi operands (the use/def
    /// index and the interference graph treat phi uses specially — see
    /// §4.4 and §4.6 — so callers that want phi operands go through
    /// `Instruction::Phi`'s `operands` field directly).
    pub fn used_values(&self) -> Vec<&Value> {
        match self {
            Instruction::Mov { origin, .. } => vec![origin],
            Instruction::Phi { .. } => vec![],
            Instruction::Conversion { operand, .. } => vec![operand],
            Instruction::BoolNot { operand, .. } => vec![operand],
            Instruction::BoolBinary { a, b, .. } => vec![a, b],
            Instruction::IntUnary { operand, .. } => vec![operand],
            Instruction::IntCompare { a, b, .. } => vec![a, b],
            Instruction::IntBinary { a, b, .. } => vec![a, b],
            Instruction::IntShift { shifted, offset, .. } => vec![shifted, offset],
            Instruction::PointerOffset { pointer, offset, .. } => vec![pointer, offset],
            Instruction::NilTest { tested, .. } => vec![tested],
            Instruction::Malloc { size, .. } => vec![size],
            Instruction::Load { address, .. } => vec![address],
            Instruction::Store { address, value } => vec![address, value],
            Instruction::Free { address } => vec![address],
            Instruction::Jump { .. } => vec![],
            Instruction::JumpCond { cond, .. } => vec![cond],
            Instruction::Syscall { syscall_number, args, .. } => {
                let mut v = vec![syscall_number];
                v.extend(args.iter());
                v
            }
            Instruction::Call { callee, args, .. } => {
                let mut v = vec![callee];
                v.extend(args.iter());
                v
            }
            Instruction::Return { args } => args.iter().collect(),
            Instruction::MakeShared { size, .. } => vec![size],
            Instruction::CopyShared { copied, offset, .. } => vec![copied, offset],
            Instruction::DeleteShared { address } => vec![address],
            Instruction::MakeUnique { size, .. } => vec![size],
            Instruction::DeleteUnique { address } => vec![address],
            Instruction::StringIndex { string, index, .. } => vec![string, index],
            Instruction::StringConcat { operands, .. } => operands.iter().collect(),
            Instruction::Panic { reason } => vec![reason],
        }
    }

    /// Mutable counterpart of `used_values`, for transforms that retype
    /// values in place (pointer transforms, §4.9). Phi operands are
    /// reached separately through the `Phi` variant's `operands` field.
    pub fn used_values_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Instruction::Mov { origin, .. } => vec![origin],
            Instruction::Phi { .. } => vec![],
            Instruction::Conversion { operand, .. } => vec![operand],
            Instruction::BoolNot { operand, .. } => vec![operand],
            Instruction::BoolBinary { a, b, .. } => vec![a, b],
            Instruction::IntUnary { operand, .. } => vec![operand],
            Instruction::IntCompare { a, b, .. } => vec![a, b],
            Instruction::IntBinary { a, b, .. } => vec![a, b],
            Instruction::IntShift { shifted, offset, .. } => vec![shifted, offset],
            Instruction::PointerOffset { pointer, offset, .. } => vec![pointer, offset],
            Instruction::NilTest { tested, .. } => vec![tested],
            Instruction::Malloc { size, .. } => vec![size],
            Instruction::Load { address, .. } => vec![address],
            Instruction::Store { address, value } => vec![address, value],
            Instruction::Free { address } => vec![address],
            Instruction::Jump { .. } => vec![],
            Instruction::JumpCond { cond, .. } => vec![cond],
            Instruction::Syscall { syscall_number, args, .. } => {
                let mut v = vec![syscall_number];
                v.extend(args.iter_mut());
                v
            }
            Instruction::Call { callee, args, .. } => {
                let mut v = vec![callee];
                v.extend(args.iter_mut());
                v
            }
            Instruction::Return { args } => args.iter_mut().collect(),
            Instruction::MakeShared { size, .. } => vec![size],
            Instruction::CopyShared { copied, offset, .. } => vec![copied, offset],
            Instruction::DeleteShared { address } => vec![address],
            Instruction::MakeUnique { size, .. } => vec![size],
            Instruction::DeleteUnique { address } => vec![address],
            Instruction::StringIndex { string, index, .. } => vec![string, index],
            Instruction::StringConcat { operands, .. } => operands.iter_mut().collect(),
            Instruction::Panic { reason } => vec![reason],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results = self.defined_values();
        if !results.is_empty() {
            let nums: Vec<ValueNum> = results.iter().map(|(n, _)| *n).collect();
            fmt_result_list(f, &nums)?;
            write!(f, " = ")?;
        }
        write!(f, "{}", self.mnemonic())?;
        match self {
            Instruction::Mov { origin, .. } => write!(f, " {origin}"),
            Instruction::Phi { operands, .. } => {
                write!(f, " ")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                Ok(())
            }
            Instruction::Conversion { operand, .. }
            | Instruction::BoolNot { operand, .. }
            | Instruction::IntUnary { operand, .. } => write!(f, " {operand}"),
            Instruction::BoolBinary { a, b, .. }
            | Instruction::IntCompare { a, b, .. }
            | Instruction::IntBinary { a, b, .. } => write!(f, " {a}, {b}"),
            Instruction::IntShift { shifted, offset, .. } => write!(f, " {shifted}, {offset}"),
            Instruction::PointerOffset { pointer, offset, .. } => write!(f, " {pointer}, {offset}"),
            Instruction::NilTest { tested, .. } => write!(f, " {tested}"),
            Instruction::Malloc { size, .. } => write!(f, " {size}"),
            Instruction::Load { address, .. } => write!(f, " {address}"),
            Instruction::Store { address, value } => write!(f, " {address}, {value}"),
            Instruction::Free { address } => write!(f, " {address}"),
            Instruction::Jump { destination } => write!(f, " {{{destination}}}"),
            Instruction::JumpCond { cond, true_dest, false_dest } => {
                write!(f, " {cond}, {{{true_dest}}}, {{{false_dest}}}")
            }
            Instruction::Syscall { syscall_number, args, .. } => {
                write!(f, " {syscall_number}")?;
                for a in args {
                    write!(f, ", {a}")?;
                }
                Ok(())
            }
            Instruction::Call { callee, args, .. } => {
                write!(f, " {callee}")?;
                for a in args {
                    write!(f, ", {a}")?;
                }
                Ok(())
            }
            Instruction::Return { args } => {
                write!(f, " ")?;
                fmt_value_list(f, args)
            }
            Instruction::MakeShared { size, .. } | Instruction::MakeUnique { size, .. } => write!(f, " {size}"),
            Instruction::CopyShared { copied, offset, .. } => write!(f, " {copied}, {offset}"),
            Instruction::DeleteShared { address } | Instruction::DeleteUnique { address } => write!(f, " {address}"),
            Instruction::StringIndex { string, index, .. } => write!(f, " {string}, {index}"),
            Instruction::StringConcat { operands, .. } => {
                write!(f, " ")?;
                fmt_value_list(f, operands)
            }
            Instruction::Panic { reason } => write!(f, " {reason}"),
        }
    }
}

/// A basic block: an ordered instruction list plus its CFG neighborhood.
/// Parents/children are maintained by the parser (from terminators, §4.1)
/// and by transformations that splice control flow; the checker
/// cross-validates them against the actual terminator (I-F5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub num: BlockNum,
    pub name: Option<String>,
    pub instructions: Vec<Instruction>,
    pub parents: BTreeSet<BlockNum>,
    pub children: BTreeSet<BlockNum>,
}

impl Block {
    pub fn new(num: BlockNum) -> Self {
        Self { num, name: None, instructions: Vec::new(), parents: BTreeSet::new(), children: BTreeSet::new() }
    }

    pub fn with_name(num: BlockNum, name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::new(num) }
    }

    /// The block's terminator, if its instruction list is non-empty and
    /// well-formed (I-B1, I-B2). Returns `None` on an empty block, which
    /// the checker flags separately.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Block numbers the terminator actually transfers control to.
    pub fn terminator_successors(&self) -> Vec<BlockNum> {
        self.terminator().map(|t| t.successors()).unwrap_or_default()
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|i| i.is_phi())
    }

    pub fn non_phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|i| !i.is_phi())
    }

    /// Index one past the last leading phi; equivalently the index of the
    /// first non-phi instruction, or `instructions.len()` if all-phi
    /// (which can only happen transiently, since I-B2 requires a trailing
    /// terminator).
    pub fn first_non_phi_index(&self) -> usize {
        self.instructions.iter().position(|i| !i.is_phi()).unwrap_or(self.instructions.len())
    }

    /// I-B3: every phi precedes every non-phi. Checked structurally rather
    /// than assumed, since transformations may splice instructions.
    pub fn phis_precede_non_phis(&self) -> bool {
        let split = self.first_non_phi_index();
        self.instructions[split..].iter().all(|i| !i.is_phi())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.num)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        writeln!(f)?;
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntKind;
    use crate::value::Constant;

    fn int_const(v: u64) -> Value {
        Value::Constant(Constant::Int { kind: IntKind::I64, bits: v })
    }

    #[test]
    fn mnemonics_match_grammar() {
        let add = Instruction::IntBinary {
            result: 2,
            ty: Type::Int(IntKind::I64),
            op: BinaryOp::Add,
            a: int_const(1),
            b: int_const(2),
        };
        assert_eq!(add.mnemonic(), "iadd");
        assert_eq!(add.to_string(), "%2 = iadd #1, #2");
    }

    #[test]
    fn jump_cond_successors() {
        let jcc = Instruction::JumpCond { cond: int_const(0), true_dest: 1, false_dest: 2 };
        assert_eq!(jcc.successors(), vec![1, 2]);
        assert!(jcc.is_terminator());
    }

    #[test]
    fn phi_not_counted_as_used_value() {
        let phi = Instruction::Phi {
            result: 0,
            ty: Type::Int(IntKind::I64),
            operands: vec![PhiOperand { value: int_const(0), parent: 0 }],
        };
        assert!(phi.used_values().is_empty());
        assert!(phi.is_phi());
    }

    #[test]
    fn block_phis_precede_non_phis() {
        let mut block = Block::new(1);
        block.instructions.push(Instruction::Phi {
            result: 0,
            ty: Type::Int(IntKind::I64),
            operands: vec![PhiOperand { value: int_const(0), parent: 0 }],
        });
        block.instructions.push(Instruction::Jump { destination: 2 });
        assert!(block.phis_precede_non_phis());
        assert_eq!(block.terminator_successors(), vec![2]);
    }

    #[test]
    fn empty_block_has_no_terminator() {
        let block = Block::new(0);
        assert!(block.terminator().is_none());
    }
}
