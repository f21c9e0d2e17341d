//! Calling-convention-driven preferred colors and the color-to-storage
//! mapping (§4.8: "A backend maps the first k colors to physical
//! registers ... and any color >= k to a stack slot").
//!
//! This is the one piece of target-specific lowering §1/§4.8 keeps in
//! scope: coloring itself is target-agnostic, but the preferred-color
//! seeding and the final storage mapping both need *some* convention to
//! be useful, so a minimal one is defined here rather than left
//! unimplemented.

use crate::coloring::Color;
use crate::function::Function;
use crate::instruction::Instruction;
use crate::interference::InterferenceGraph;

/// A physical register bank plus argument/return register assignment
/// order. `num_registers` is the count of colors mapped to physical
/// registers; any color `>= num_registers` becomes a stack slot.
#[derive(Debug, Clone)]
pub struct CallingConvention {
    pub num_registers: u32,
    pub arg_registers: Vec<Color>,
    pub return_registers: Vec<Color>,
}

impl CallingConvention {
    /// A small illustrative convention: registers 0..num_registers,
    /// arguments and returns claim them in order starting at register 0.
    pub fn simple(num_registers: u32) -> Self {
        let regs: Vec<Color> = (0..num_registers).collect();
        Self { num_registers, arg_registers: regs.clone(), return_registers: regs }
    }

    /// Seeds `graph.preferred_colors` for `func`'s arguments (color =
    /// physical argument register i) and for every `return` instruction's
    /// operands (color = physical return register i), per §4.8.
    pub fn seed_preferred_colors(&self, func: &Function, graph: &mut InterferenceGraph) {
        for (i, arg) in func.args.iter().enumerate() {
            if let Some(&reg) = self.arg_registers.get(i) {
                graph.preferred_colors.insert(arg.num, reg);
            }
        }
        for block in func.blocks_ascending() {
            for instr in &block.instructions {
                if let Instruction::Return { args } = instr {
                    for (i, v) in args.iter().enumerate() {
                        if let (Some(num), Some(&reg)) = (v.as_computed_num(), self.return_registers.get(i)) {
                            graph.preferred_colors.entry(num).or_insert(reg);
                        }
                    }
                }
            }
        }
    }

    /// Where a colored value ultimately lives: a physical register number,
    /// or a stack slot offset (in machine words) derived from the color.
    pub fn location(&self, color: Color) -> StorageLocation {
        if color < self.num_registers {
            StorageLocation::Register(color)
        } else {
            StorageLocation::StackSlot((color - self.num_registers) as u64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLocation {
    Register(u32),
    StackSlot(u64),
}
