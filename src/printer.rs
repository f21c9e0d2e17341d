//! The textual printer (§4.1 "Printer contract"): emits the canonical
//! form consumed by the parser. The governing correctness property is
//! that parse ∘ print ∘ parse is the identity on a program's logical
//! content (value/block numbering, instruction order, types, constants),
//! not that the output matches any particular hand-written example text
//! byte for byte.
//!
//! [`Program`], [`Function`] and [`Block`] already carry their own
//! `Display` impls used by the rest of the crate (tests, debug output);
//! this module exists because those impls can't resolve composite type
//! handles on their own (`Type::Display` only prints the bare `#N`
//! handle — see `TypeTable::render`). `print_program` walks the same
//! structure but threads the owning `TypeTable` through so composite
//! types render in full.

use std::fmt::Write;

use crate::function::Function;
use crate::instruction::{Block, Instruction, PhiOperand};
use crate::program::Program;
use crate::types::TypeTable;
use crate::value::Value;

pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    for func in program.funcs.values() {
        print_func(&mut out, func, &program.types);
    }
    out
}

fn print_value(out: &mut String, value: &Value, types: &TypeTable) {
    match value {
        Value::Constant(c) => write!(out, "{c}").unwrap(),
        Value::Computed { num, ty } => write!(out, "%{num}:{}", types.render(ty)).unwrap(),
    }
}

fn print_phi_operand(out: &mut String, op: &PhiOperand, types: &TypeTable) {
    print_value(out, &op.value, types);
    write!(out, "{{{}}}", op.parent).unwrap();
}

fn print_values(out: &mut String, values: &[Value], types: &TypeTable) {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_value(out, v, types);
    }
}

fn print_instr(out: &mut String, instr: &Instruction, types: &TypeTable) {
    let results = instr.defined_values();
    if !results.is_empty() {
        for (i, (num, _)) in results.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(out, "%{num}").unwrap();
        }
        out.push_str(" = ");
    }
    out.push_str(instr.mnemonic());

    match instr {
        Instruction::Mov { origin, .. } => {
            out.push(' ');
            print_value(out, origin, types);
        }
        Instruction::Phi { operands, .. } => {
            out.push(' ');
            for (i, op) in operands.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_phi_operand(out, op, types);
            }
        }
        Instruction::Conversion { operand, .. } | Instruction::BoolNot { operand, .. } | Instruction::IntUnary { operand, .. } => {
            out.push(' ');
            print_value(out, operand, types);
        }
        Instruction::BoolBinary { a, b, .. } | Instruction::IntCompare { a, b, .. } | Instruction::IntBinary { a, b, .. } => {
            out.push(' ');
            print_value(out, a, types);
            out.push_str(", ");
            print_value(out, b, types);
        }
        Instruction::IntShift { shifted, offset, .. } => {
            out.push(' ');
            print_value(out, shifted, types);
            out.push_str(", ");
            print_value(out, offset, types);
        }
        Instruction::PointerOffset { pointer, offset, .. } => {
            out.push(' ');
            print_value(out, pointer, types);
            out.push_str(", ");
            print_value(out, offset, types);
        }
        Instruction::NilTest { tested, .. } => {
            out.push(' ');
            print_value(out, tested, types);
        }
        Instruction::Malloc { size, .. } | Instruction::MakeShared { size, .. } | Instruction::MakeUnique { size, .. } => {
            out.push(' ');
            print_value(out, size, types);
        }
        Instruction::Load { address, .. } => {
            out.push(' ');
            print_value(out, address, types);
        }
        Instruction::Store { address, value } => {
            out.push(' ');
            print_value(out, address, types);
            out.push_str(", ");
            print_value(out, value, types);
        }
        Instruction::Free { address } | Instruction::DeleteShared { address } | Instruction::DeleteUnique { address } => {
            out.push(' ');
            print_value(out, address, types);
        }
        Instruction::Jump { destination } => {
            write!(out, " {{{destination}}}").unwrap();
        }
        Instruction::JumpCond { cond, true_dest, false_dest } => {
            out.push(' ');
            print_value(out, cond, types);
            write!(out, ", {{{true_dest}}}, {{{false_dest}}}").unwrap();
        }
        Instruction::Syscall { syscall_number, args, .. } => {
            out.push(' ');
            print_value(out, syscall_number, types);
            for a in args {
                out.push_str(", ");
                print_value(out, a, types);
            }
        }
        Instruction::Call { callee, args, .. } => {
            out.push(' ');
            print_value(out, callee, types);
            for a in args {
                out.push_str(", ");
                print_value(out, a, types);
            }
        }
        Instruction::Return { args } => {
            out.push(' ');
            print_values(out, args, types);
        }
        Instruction::CopyShared { copied, offset, .. } => {
            out.push(' ');
            print_value(out, copied, types);
            out.push_str(", ");
            print_value(out, offset, types);
        }
        Instruction::StringIndex { string, index, .. } => {
            out.push(' ');
            print_value(out, string, types);
            out.push_str(", ");
            print_value(out, index, types);
        }
        Instruction::StringConcat { operands, .. } => {
            out.push(' ');
            print_values(out, operands, types);
        }
        Instruction::Panic { reason } => {
            out.push(' ');
            print_value(out, reason, types);
        }
    }
    out.push('\n');
}

fn print_block(out: &mut String, block: &Block, types: &TypeTable) {
    write!(out, "{{{}}}", block.num).unwrap();
    if let Some(name) = &block.name {
        write!(out, " {name}").unwrap();
    }
    out.push('\n');
    for instr in &block.instructions {
        out.push_str("     ");
        print_instr(out, instr, types);
    }
}

fn print_func(out: &mut String, func: &Function, types: &TypeTable) {
    write!(out, "@{}", func.num).unwrap();
    if let Some(name) = &func.name {
        write!(out, " {name}").unwrap();
    }
    out.push('(');
    for (i, arg) in func.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "%{}:{}", arg.num, types.render(&arg.ty)).unwrap();
    }
    out.push_str(") => (");
    for (i, ty) in func.result_types.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&types.render(ty));
    }
    out.push_str(") {\n");
    for block in func.blocks.values() {
        print_block(out, block, types);
    }
    out.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn roundtrips(src: &str) {
        let program = parse_program(src).unwrap();
        let printed = print_program(&program);
        let reparsed = parse_program(&printed).unwrap();
        let twice = print_program(&reparsed);
        assert_eq!(printed, twice, "printing is not idempotent on:\n{printed}");
    }

    #[test]
    fn prints_empty_function() {
        let program = parse_program("@0 f() => () { {0} ret }").unwrap();
        let printed = print_program(&program);
        assert!(printed.contains("@0 f() => () {"));
        assert!(printed.contains("{0}"));
        assert!(printed.contains("ret"));
    }

    #[test]
    fn loop_sum_round_trips_through_print_and_reparse() {
        let src = "@0 () => (i64) { {0} jmp {1}\n\
{1} %0 = phi #0:i64{0}, %3{2}\n\
     %1 = phi #0:i64{0}, %4{2}\n\
     %2:b = ilss %0, #10:i64\n\
     jcc %2, {2}, {3}\n\
{2} %3:i64 = iadd %0, #1:i64\n\
     %4:i64 = iadd %1, %3\n\
     jmp {1}\n\
{3} ret %1 }";
        roundtrips(src);
    }

    #[test]
    fn composite_type_prints_fully_resolved() {
        let src = "@0 (%0:unique_ptr<i64>) => () { {0} ret }";
        let program = parse_program(src).unwrap();
        let printed = print_program(&program);
        assert!(printed.contains("unique_ptr<i64>"), "expected resolved composite spelling, got:\n{printed}");
    }
}
