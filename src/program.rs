//! The top-level container: a type table plus the function map (§3
//! "Program").

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::function::{Function, FuncNum};
use crate::types::TypeTable;

/// A program owns a type table and a mapping from function number to
/// function; one function number may be designated the entry (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub types: TypeTable,
    pub funcs: BTreeMap<FuncNum, Function>,
    pub entry: Option<FuncNum>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `func`, designating it the entry if this is the first
    /// function added (lowest-numbered function is entry absent any other
    /// convention — the text format has no explicit entry marker; see
    /// DESIGN.md).
    pub fn add_func(&mut self, func: Function) {
        if self.entry.is_none() || func.num < self.entry.unwrap() {
            self.entry = Some(func.num);
        }
        self.funcs.insert(func.num, func);
    }

    pub fn get_func(&self, num: FuncNum) -> Option<&Function> {
        self.funcs.get(&num)
    }

    pub fn get_func_mut(&mut self, num: FuncNum) -> Option<&mut Function> {
        self.funcs.get_mut(&num)
    }

    pub fn entry_func(&self) -> Option<&Function> {
        self.entry.and_then(|n| self.funcs.get(&n))
    }

    pub fn funcs_ascending(&self) -> impl Iterator<Item = &Function> {
        self.funcs.values()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in self.funcs.values() {
            writeln!(f, "{func}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_added_func_is_entry_by_number() {
        let mut program = Program::new();
        program.add_func(Function::new(1, 0));
        program.add_func(Function::new(0, 0));
        assert_eq!(program.entry, Some(0));
    }

    #[test]
    fn empty_program_has_no_entry() {
        let program = Program::new();
        assert!(program.entry_func().is_none());
    }
}
