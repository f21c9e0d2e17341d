//! The function container: block map, argument/result lists, value
//! numbering, and the lazily-maintained dominator tree cache (§3, §4.3).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dominance::DominatorTree;
use crate::instruction::{Block, BlockNum};
use crate::types::Type;
use crate::value::ValueNum;

/// A program-unique function number (Katara's `func_num_t`, `int64_t`).
pub type FuncNum = i64;

/// A computed value bound as a function argument: number plus declared
/// type (§3: "an ordered argument list of computed values with their
/// declared types").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub num: ValueNum,
    pub ty: Type,
}

/// A function: block map, value numbering, and the CFG those blocks
/// encode. The dominator tree cache is not (de)serialized — it's
/// recomputed on first query after load, same as after any mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub num: FuncNum,
    pub name: Option<String>,
    pub args: Vec<Argument>,
    pub result_types: Vec<Type>,
    pub entry: BlockNum,
    pub blocks: BTreeMap<BlockNum, Block>,
    /// I-F2: strictly exceeds every value number (computed or argument) in
    /// use; the next number `allocate_value_num` will hand out.
    next_value_num: ValueNum,
    next_block_num: BlockNum,
    #[serde(skip)]
    dom_cache: RefCell<Option<DominatorTree>>,
}

impl Function {
    pub fn new(num: FuncNum, entry: BlockNum) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(entry, Block::new(entry));
        Self {
            num,
            name: None,
            args: Vec::new(),
            result_types: Vec::new(),
            entry,
            blocks,
            next_value_num: 0,
            next_block_num: entry + 1,
            dom_cache: RefCell::new(None),
        }
    }

    pub fn with_name(num: FuncNum, entry: BlockNum, name: impl Into<String>) -> Self {
        let mut f = Self::new(num, entry);
        f.name = Some(name.into());
        f
    }

    /// Hands out the next value number and bumps the counter, preserving
    /// I-F2.
    pub fn allocate_value_num(&mut self) -> ValueNum {
        let n = self.next_value_num;
        self.next_value_num = n + 1;
        n
    }

    /// Reserves a number as already in use without bumping past an
    /// already-higher counter — used by the parser, which assigns numbers
    /// from the text rather than sequentially.
    pub fn observe_value_num(&mut self, num: ValueNum) {
        if num >= self.next_value_num {
            self.next_value_num = num + 1;
        }
    }

    pub fn computed_count(&self) -> ValueNum {
        self.next_value_num
    }

    pub fn allocate_block_num(&mut self) -> BlockNum {
        let n = self.next_block_num;
        self.next_block_num = n + 1;
        n
    }

    pub fn observe_block_num(&mut self, num: BlockNum) {
        if num >= self.next_block_num {
            self.next_block_num = num + 1;
        }
    }

    pub fn entry_block(&self) -> &Block {
        self.blocks.get(&self.entry).expect("entry block always present")
    }

    pub fn get_block(&self, num: BlockNum) -> Option<&Block> {
        self.blocks.get(&num)
    }

    pub fn get_block_mut(&mut self, num: BlockNum) -> Option<&mut Block> {
        self.invalidate_dominance();
        self.blocks.get_mut(&num)
    }

    /// Inserts a block and wires parent/child links from its terminator;
    /// mirrors the parser's CFG-reconstruction contract in §4.1. Callers
    /// that splice blocks without a terminator yet (mid-construction)
    /// should wire links manually and call `invalidate_dominance`
    /// themselves.
    pub fn add_block(&mut self, block: Block) {
        self.invalidate_dominance();
        self.blocks.insert(block.num, block);
    }

    /// Any mutation that could change the CFG shape must call this; mirrors
    /// Katara's `dom_tree_ok_` flag (`examples/original_source/Katara/ir/block.cc`).
    pub fn invalidate_dominance(&mut self) {
        *self.dom_cache.get_mut() = None;
    }

    /// Returns the cached dominator tree, computing it on first access
    /// after construction or the last invalidating mutation (§4.3).
    pub fn dominator_tree(&self) -> std::cell::Ref<'_, DominatorTree> {
        if self.dom_cache.borrow().is_none() {
            let tree = DominatorTree::compute(self);
            *self.dom_cache.borrow_mut() = Some(tree);
        }
        std::cell::Ref::map(self.dom_cache.borrow(), |o| o.as_ref().unwrap())
    }

    /// `b`'s single parent, if it has exactly one and that parent itself
    /// has more than one child (i.e. branches). Grounded in
    /// `Block::HasBranchingParent`/`BranchingParent`
    /// (`examples/original_source/Katara/ir/block.cc`); needed by the
    /// live-range analysis's single-merging-child check from the other
    /// side.
    pub fn branching_parent(&self, b: BlockNum) -> Option<BlockNum> {
        let block = self.blocks.get(&b)?;
        if block.parents.len() != 1 {
            return None;
        }
        let parent_num = *block.parents.iter().next().unwrap();
        let parent = self.blocks.get(&parent_num)?;
        (parent.children.len() > 1).then_some(parent_num)
    }

    /// `b`'s single child, if it has exactly one and that child itself has
    /// more than one parent (i.e. merges). This is the query §4.5 phase 1
    /// step 2 needs ("the block has a single merging child").
    pub fn merging_child(&self, b: BlockNum) -> Option<BlockNum> {
        let block = self.blocks.get(&b)?;
        if block.children.len() != 1 {
            return None;
        }
        let child_num = *block.children.iter().next().unwrap();
        let child = self.blocks.get(&child_num)?;
        (child.parents.len() > 1).then_some(child_num)
    }

    /// Blocks in ascending block-number order — a convenient, deterministic
    /// (if not dominance-ordered) default iteration order.
    pub fn blocks_ascending(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.num)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, "(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}:{}", arg.num, arg.ty)?;
        }
        write!(f, ") => (")?;
        for (i, ty) in self.result_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        writeln!(f, ") {{")?;
        for block in self.blocks.values() {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    #[test]
    fn value_numbering_respects_i_f2() {
        let mut func = Function::new(0, 0);
        let a = func.allocate_value_num();
        let b = func.allocate_value_num();
        assert_eq!((a, b), (0, 1));
        assert_eq!(func.computed_count(), 2);
    }

    #[test]
    fn observe_value_num_never_rewinds_counter() {
        let mut func = Function::new(0, 0);
        func.observe_value_num(5);
        assert_eq!(func.computed_count(), 6);
        func.observe_value_num(2);
        assert_eq!(func.computed_count(), 6);
    }

    #[test]
    fn merging_child_requires_single_child_with_multiple_parents() {
        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.children.insert(1);
        b0.instructions.push(Instruction::Jump { destination: 1 });
        let mut b1 = Block::new(1);
        b1.parents.insert(0);
        b1.parents.insert(2);
        b1.instructions.push(Instruction::Return { args: vec![] });
        func.blocks.insert(0, b0);
        func.blocks.insert(1, b1);
        assert_eq!(func.merging_child(0), Some(1));
    }

    #[test]
    fn entry_block_is_always_present() {
        let func = Function::new(7, 3);
        assert_eq!(func.entry_block().num, 3);
    }
}
