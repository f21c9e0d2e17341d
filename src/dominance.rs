//! Dominator tree construction (§4.3). Computed lazily by
//! [`crate::function::Function::dominator_tree`] and cached there; this
//! module only knows how to build one from a snapshot of a function's CFG.

use std::collections::BTreeMap;

use crate::function::Function;
use crate::instruction::BlockNum;

/// The dominator tree of one function's CFG, rooted at the entry block.
#[derive(Debug, Clone, Default)]
pub struct DominatorTree {
    /// Immediate dominator of every reachable non-entry block.
    idom: BTreeMap<BlockNum, BlockNum>,
    /// Blocks immediately dominated by each block (inverse of `idom`).
    children: BTreeMap<BlockNum, Vec<BlockNum>>,
    /// Entry first; every block precedes its dominees (§4.3).
    order: Vec<BlockNum>,
}

impl DominatorTree {
    /// Builds the tree using the Cooper/Harvey/Kennedy iterative algorithm:
    /// a reverse-postorder fixed point over immediate-dominator
    /// intersection. Unreachable blocks (no path from entry) have no
    /// immediate dominator and are omitted from `order`.
    pub fn compute(func: &Function) -> Self {
        let entry = func.entry;
        let postorder = Self::postorder(func, entry);
        let mut rpo_index: BTreeMap<BlockNum, usize> = BTreeMap::new();
        for (i, &b) in postorder.iter().rev().enumerate() {
            rpo_index.insert(b, i);
        }

        let mut idom: BTreeMap<BlockNum, BlockNum> = BTreeMap::new();
        idom.insert(entry, entry);

        let rpo: Vec<BlockNum> = postorder.iter().rev().copied().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().filter(|&&b| b != entry) {
                let block = func.get_block(b).expect("block in CFG");
                let mut new_idom: Option<BlockNum> = None;
                for &p in &block.parents {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => Self::intersect(&idom, &rpo_index, cur, p),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&b) != Some(&new_idom) {
                        idom.insert(b, new_idom);
                        changed = true;
                    }
                }
            }
        }
        idom.remove(&entry); // entry dominates itself but has no distinct immediate dominator

        let mut children: BTreeMap<BlockNum, Vec<BlockNum>> = BTreeMap::new();
        for (&b, &d) in &idom {
            children.entry(d).or_default().push(b);
        }
        for kids in children.values_mut() {
            kids.sort_unstable();
        }

        let mut order = Vec::with_capacity(idom.len() + 1);
        let mut stack = vec![entry];
        while let Some(b) = stack.pop() {
            order.push(b);
            if let Some(kids) = children.get(&b) {
                for &k in kids.iter().rev() {
                    stack.push(k);
                }
            }
        }

        Self { idom, children, order }
    }

    fn postorder(func: &Function, entry: BlockNum) -> Vec<BlockNum> {
        let mut visited = std::collections::BTreeSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<(BlockNum, usize)> = vec![(entry, 0)];
        visited.insert(entry);
        while let Some((b, idx)) = stack.pop() {
            let block = match func.get_block(b) {
                Some(block) => block,
                None => continue,
            };
            let children: Vec<BlockNum> = block.children.iter().copied().collect();
            if idx < children.len() {
                let next_child = children[idx];
                stack.push((b, idx + 1));
                if visited.insert(next_child) {
                    stack.push((next_child, 0));
                }
            } else {
                order.push(b);
            }
        }
        order
    }

    fn intersect(
        idom: &BTreeMap<BlockNum, BlockNum>,
        rpo_index: &BTreeMap<BlockNum, usize>,
        a: BlockNum,
        b: BlockNum,
    ) -> BlockNum {
        let mut a = a;
        let mut b = b;
        while a != b {
            while rpo_index[&a] > rpo_index[&b] {
                a = idom[&a];
            }
            while rpo_index[&b] > rpo_index[&a] {
                b = idom[&b];
            }
        }
        a
    }

    /// Immediate dominator of `b`, or `None` for the entry block or an
    /// unreachable block.
    pub fn immediate_dominator(&self, b: BlockNum) -> Option<BlockNum> {
        self.idom.get(&b).copied()
    }

    /// Blocks immediately dominated by `b`.
    pub fn dominees(&self, b: BlockNum) -> &[BlockNum] {
        self.children.get(&b).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entry-first iteration order in which every block precedes its
    /// dominees (§4.3).
    pub fn order(&self) -> &[BlockNum] {
        &self.order
    }

    /// `a` dominates `b` iff `a` appears on `b`'s idom-chain (or `a == b`).
    pub fn dominates(&self, a: BlockNum, b: BlockNum) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&d) = self.idom.get(&cur) {
            if d == a {
                return true;
            }
            cur = d;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Block, Instruction};

    fn jump(to: BlockNum) -> Instruction {
        Instruction::Jump { destination: to }
    }

    /// 0 -> 1 -> 2 -> 3, a straight-line diamond-free chain.
    fn linear_func() -> Function {
        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.children.insert(1);
        b0.instructions.push(jump(1));
        let mut b1 = Block::new(1);
        b1.parents.insert(0);
        b1.children.insert(2);
        b1.instructions.push(jump(2));
        let mut b2 = Block::new(2);
        b2.parents.insert(1);
        b2.instructions.push(Instruction::Return { args: vec![] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.blocks.insert(1, b1);
        func.blocks.insert(2, b2);
        func
    }

    #[test]
    fn linear_chain_dominance() {
        let func = linear_func();
        let tree = DominatorTree::compute(&func);
        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(1));
        assert!(tree.dominates(0, 2));
        assert_eq!(tree.order()[0], 0);
    }

    /// Diamond: 0 -> {1,2} -> 3. Neither 1 nor 2 dominates 3; 0 does.
    fn diamond_func() -> Function {
        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.children.insert(1);
        b0.children.insert(2);
        b0.instructions.push(Instruction::JumpCond {
            cond: crate::value::Value::Constant(crate::value::Constant::Bool(true)),
            true_dest: 1,
            false_dest: 2,
        });
        let mut b1 = Block::new(1);
        b1.parents.insert(0);
        b1.children.insert(3);
        b1.instructions.push(jump(3));
        let mut b2 = Block::new(2);
        b2.parents.insert(0);
        b2.children.insert(3);
        b2.instructions.push(jump(3));
        let mut b3 = Block::new(3);
        b3.parents.insert(1);
        b3.parents.insert(2);
        b3.instructions.push(Instruction::Return { args: vec![] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.blocks.insert(1, b1);
        func.blocks.insert(2, b2);
        func.blocks.insert(3, b3);
        func
    }

    #[test]
    fn diamond_merge_dominated_by_entry_only() {
        let func = diamond_func();
        let tree = DominatorTree::compute(&func);
        assert_eq!(tree.immediate_dominator(3), Some(0));
        assert!(!tree.dominates(1, 3));
        assert!(!tree.dominates(2, 3));
        assert!(tree.dominates(0, 3));
    }

    #[test]
    fn loop_back_edge_does_not_confuse_dominance() {
        // 0 -> 1 -> 2 -> {1 (back edge), 3}
        let mut func = Function::new(0, 0);
        let mut b0 = Block::new(0);
        b0.children.insert(1);
        b0.instructions.push(jump(1));
        let mut b1 = Block::new(1);
        b1.parents.insert(0);
        b1.parents.insert(2);
        b1.children.insert(2);
        b1.instructions.push(jump(2));
        let mut b2 = Block::new(2);
        b2.parents.insert(1);
        b2.children.insert(1);
        b2.children.insert(3);
        b2.instructions.push(Instruction::JumpCond {
            cond: crate::value::Value::Constant(crate::value::Constant::Bool(true)),
            true_dest: 1,
            false_dest: 3,
        });
        let mut b3 = Block::new(3);
        b3.parents.insert(2);
        b3.instructions.push(Instruction::Return { args: vec![] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func.blocks.insert(1, b1);
        func.blocks.insert(2, b2);
        func.blocks.insert(3, b3);

        let tree = DominatorTree::compute(&func);
        assert_eq!(tree.immediate_dominator(1), Some(0));
        assert_eq!(tree.immediate_dominator(2), Some(1));
        assert_eq!(tree.immediate_dominator(3), Some(2));
        assert!(tree.dominates(0, 3));
    }
}
