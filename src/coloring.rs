//! Register coloring (§4.8): greedy first-fit graph coloring driven by
//! per-value preferred colors seeded from the calling convention.

use std::collections::{BTreeMap, BTreeSet};

use crate::interference::InterferenceGraph;
use crate::value::ValueNum;

/// Nonnegative integer standing for a storage location; a backend (see
/// `abi`) maps colors `< k` to physical registers and `>= k` to stack
/// slots.
pub type Color = u32;

/// `graph`'s vertices, colored greedily in `order`. Ties in iteration
/// order are deterministic (ascending value number) when `order` is
/// built with [`default_order`]; §4.8 leaves the order otherwise
/// unspecified.
pub fn color_graph(graph: &InterferenceGraph, order: &[ValueNum]) -> BTreeMap<ValueNum, Color> {
    let mut colors: BTreeMap<ValueNum, Color> = BTreeMap::new();
    for &v in order {
        let used: BTreeSet<Color> = graph.neighbors(v).filter_map(|n| colors.get(&n).copied()).collect();
        let assigned = match graph.preferred_colors.get(&v) {
            Some(&pref) if !used.contains(&pref) => pref,
            _ => (0..Color::MAX).find(|c| !used.contains(c)).expect("unbounded color space"),
        };
        colors.insert(v, assigned);
    }
    colors
}

/// Ascending value-number order over every vertex in `graph`.
pub fn default_order(graph: &InterferenceGraph) -> Vec<ValueNum> {
    let mut order: Vec<ValueNum> = graph.vertices().collect();
    order.sort_unstable();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Argument, Function};
    use crate::instruction::Block;
    use crate::instruction::Instruction;
    use crate::liveness::LiveRanges;
    use crate::types::{BinaryOp, IntKind, Type};
    use crate::value::Value;

    /// Scenario 6 (§8): `%2 = iadd %0, %1; ret %2` with preferred colors
    /// 0:=arg0, 1:=arg1, 2:=return register.
    fn sum_of_two() -> Function {
        let mut func = Function::new(0, 0);
        func.args.push(Argument { num: 0, ty: Type::Int(IntKind::U8) });
        func.args.push(Argument { num: 1, ty: Type::Int(IntKind::U8) });
        func.result_types.push(Type::Int(IntKind::U8));

        let mut b0 = Block::new(0);
        b0.instructions.push(Instruction::IntBinary {
            result: 2,
            ty: Type::Int(IntKind::U8),
            op: BinaryOp::Add,
            a: Value::Computed { num: 0, ty: Type::Int(IntKind::U8) },
            b: Value::Computed { num: 1, ty: Type::Int(IntKind::U8) },
        });
        b0.instructions.push(Instruction::Return { args: vec![Value::Computed { num: 2, ty: Type::Int(IntKind::U8) }] });
        func.blocks.clear();
        func.blocks.insert(0, b0);
        func
    }

    #[test]
    fn preferred_colors_honored_when_non_interfering() {
        let func = sum_of_two();
        let ranges = LiveRanges::compute(&func);
        let mut graph = InterferenceGraph::build(&func, &ranges);
        graph.preferred_colors.insert(0, 0);
        graph.preferred_colors.insert(1, 1);
        graph.preferred_colors.insert(2, 2);

        let order = default_order(&graph);
        let colors = color_graph(&graph, &order);
        assert_eq!(colors[&0], 0);
        assert_eq!(colors[&1], 1);
        assert_eq!(colors[&2], 2);
    }

    #[test]
    fn adjacent_vertices_never_share_a_color() {
        let func = sum_of_two();
        let ranges = LiveRanges::compute(&func);
        let graph = InterferenceGraph::build(&func, &ranges);
        let order = default_order(&graph);
        let colors = color_graph(&graph, &order);
        for v in graph.vertices() {
            for n in graph.neighbors(v) {
                assert_ne!(colors[&v], colors[&n]);
            }
        }
    }

    #[test]
    fn conflicting_preference_falls_back_to_first_fit() {
        let func = sum_of_two();
        let ranges = LiveRanges::compute(&func);
        let mut graph = InterferenceGraph::build(&func, &ranges);
        // %0 and %1 interfere; giving both the same preference forces a
        // fallback for whichever is colored second.
        graph.preferred_colors.insert(0, 0);
        graph.preferred_colors.insert(1, 0);

        let order = default_order(&graph);
        let colors = color_graph(&graph, &order);
        assert_ne!(colors[&0], colors[&1]);
    }
}
