//! Interference graph construction (§4.6).

use std::collections::{BTreeMap, BTreeSet};

use crate::function::Function;
use crate::liveness::LiveRanges;
use crate::value::ValueNum;

/// Undirected graph over computed values; edges mean "simultaneously
/// live". Also carries optional preferred-color hints consumed by
/// register coloring (§4.8).
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    edges: BTreeMap<ValueNum, BTreeSet<ValueNum>>,
    pub preferred_colors: BTreeMap<ValueNum, u32>,
}

impl InterferenceGraph {
    fn ensure(&mut self, v: ValueNum) {
        self.edges.entry(v).or_default();
    }

    fn add_edge(&mut self, a: ValueNum, b: ValueNum) {
        if a == b {
            return;
        }
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    fn add_edges_in(&mut self, set: &BTreeSet<ValueNum>) {
        let members: Vec<ValueNum> = set.iter().copied().collect();
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                self.add_edge(members[i], members[j]);
            }
        }
    }

    fn add_edges_between(&mut self, v: ValueNum, set: &BTreeSet<ValueNum>) {
        self.ensure(v);
        for &other in set {
            self.add_edge(v, other);
        }
    }

    pub fn neighbors(&self, v: ValueNum) -> impl Iterator<Item = ValueNum> + '_ {
        self.edges.get(&v).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn interferes(&self, a: ValueNum, b: ValueNum) -> bool {
        self.edges.get(&a).map(|s| s.contains(&b)).unwrap_or(false)
    }

    pub fn vertices(&self) -> impl Iterator<Item = ValueNum> + '_ {
        self.edges.keys().copied()
    }

    /// Builds the interference graph from a function's live ranges,
    /// following the backward per-instruction walk of §4.6.
    pub fn build(func: &Function, ranges: &LiveRanges) -> Self {
        let mut graph = InterferenceGraph::default();

        for block in func.blocks_ascending() {
            let mut live: BTreeSet<ValueNum> = ranges.get(block.num).exit_set.clone();
            graph.add_edges_in(&live);
            for v in &live {
                graph.ensure(*v);
            }

            for instr in block.instructions.iter().rev() {
                for (v, _) in instr.defined_values() {
                    if live.remove(&v) {
                        graph.ensure(v);
                    } else {
                        graph.add_edges_between(v, &live);
                    }
                }

                if instr.is_phi() {
                    continue;
                }
                for used in instr.used_values() {
                    if let Some(u) = used.as_computed_num() {
                        if !live.contains(&u) {
                            graph.add_edges_between(u, &live);
                        }
                        live.insert(u);
                    }
                }
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::instruction::{Block, Instruction};
    use crate::types::{IntKind, Type};
    use crate::value::{Constant, Value};

    /// `%2 = iadd %0, %1; ret %2` — %0 and %1 interfere (both live across
    /// the add), %2 interferes with neither (defined after both die).
    fn sum_of_two() -> Function {
        let mut func = Function::new(0, 0);
        func.args.push(crate::function::Argument { num: 0, ty: Type::Int(IntKind::U8) });
        func.args.push(crate::function::Argument { num: 1, ty: Type::Int(IntKind::U8) });
        func.result_types.push(Type::Int(IntKind::U8));

        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::IntBinary {
            result: 2,
            ty: Type::Int(IntKind::U8),
            op: crate::types::BinaryOp::Add,
            a: Value::Computed { num: 0, ty: Type::Int(IntKind::U8) },
            b: Value::Computed { num: 1, ty: Type::Int(IntKind::U8) },
        });
        b0.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 2, ty: Type::Int(IntKind::U8) }] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func
    }

    #[test]
    fn operands_of_same_instruction_interfere() {
        let func = sum_of_two();
        let ranges = LiveRanges::compute(&func);
        let graph = InterferenceGraph::build(&func, &ranges);
        assert!(graph.interferes(0, 1));
        assert!(!graph.interferes(0, 2));
        assert!(!graph.interferes(1, 2));
    }

    #[test]
    fn unused_trailing_constant_ignored() {
        let func = sum_of_two();
        let ranges = LiveRanges::compute(&func);
        let graph = InterferenceGraph::build(&func, &ranges);
        let vertices: BTreeSet<ValueNum> = graph.vertices().collect();
        assert!(vertices.contains(&0));
        assert!(vertices.contains(&1));
        assert!(vertices.contains(&2));
    }
}
