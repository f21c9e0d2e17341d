//! Per-function value use/def index (§4.4).

use std::collections::{BTreeMap, BTreeSet};

use crate::function::Function;
use crate::instruction::{BlockNum, Instruction};
use crate::types::Type;
use crate::value::ValueNum;

/// Where a value is used: the instruction's position, identified by block
/// and index within the block's instruction list. Phi uses are recorded
/// separately (`phi_uses`) because the checker and the interference graph
/// both need to distinguish a phi operand from an ordinary operand (§4.4:
/// "Uses via inherited values are recorded against the underlying computed
/// value").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstrSite {
    pub block: BlockNum,
    pub index: usize,
}

/// One computed value's definition site and type, or `None` if it's a
/// function argument (arguments have no defining instruction, §4.4).
#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub ty: Type,
    pub def: Option<InstrSite>,
    pub uses: BTreeSet<InstrSite>,
    pub phi_uses: BTreeSet<InstrSite>,
}

/// Map from computed/argument value number to its [`ValueInfo`], built in
/// one pass over a function's instructions.
#[derive(Debug, Clone, Default)]
pub struct UseDefIndex {
    values: BTreeMap<ValueNum, ValueInfo>,
}

impl UseDefIndex {
    pub fn build(func: &Function) -> Self {
        let mut values: BTreeMap<ValueNum, ValueInfo> = BTreeMap::new();

        for arg in &func.args {
            values.insert(
                arg.num,
                ValueInfo { ty: arg.ty.clone(), def: None, uses: BTreeSet::new(), phi_uses: BTreeSet::new() },
            );
        }

        for block in func.blocks_ascending() {
            for (index, instr) in block.instructions.iter().enumerate() {
                let site = InstrSite { block: block.num, index };
                for (num, ty) in instr.defined_values() {
                    values
                        .entry(num)
                        .or_insert_with(|| ValueInfo { ty, def: None, uses: BTreeSet::new(), phi_uses: BTreeSet::new() })
                        .def = Some(site);
                }
                if let Instruction::Phi { operands, .. } = instr {
                    for op in operands {
                        if let Some(num) = op.value.as_computed_num() {
                            values.entry(num).or_insert_with(|| ValueInfo {
                                ty: op.value.ty(),
                                def: None,
                                uses: BTreeSet::new(),
                                phi_uses: BTreeSet::new(),
                            }).phi_uses.insert(site);
                        }
                    }
                } else {
                    for used in instr.used_values() {
                        if let Some(num) = used.as_computed_num() {
                            values
                                .entry(num)
                                .or_insert_with(|| ValueInfo {
                                    ty: used.ty(),
                                    def: None,
                                    uses: BTreeSet::new(),
                                    phi_uses: BTreeSet::new(),
                                })
                                .uses
                                .insert(site);
                        }
                    }
                }
            }
        }

        Self { values }
    }

    pub fn info(&self, num: ValueNum) -> Option<&ValueInfo> {
        self.values.get(&num)
    }

    pub fn defining_instruction(&self, num: ValueNum) -> Option<InstrSite> {
        self.values.get(&num).and_then(|i| i.def)
    }

    /// All value numbers whose declared type is exactly `ty`.
    pub fn values_of_type<'a>(&'a self, ty: &'a Type) -> impl Iterator<Item = ValueNum> + 'a {
        self.values.iter().filter(move |(_, info)| &info.ty == ty).map(|(num, _)| *num)
    }

    /// All value numbers whose type matches `pred` — used by
    /// transformations that iterate over all shared-pointer values
    /// regardless of element type (§4.4).
    pub fn values_matching<'a>(&'a self, mut pred: impl FnMut(&Type) -> bool + 'a) -> impl Iterator<Item = ValueNum> + 'a {
        self.values.iter().filter(move |(_, info)| pred(&info.ty)).map(|(num, _)| *num)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueNum, &ValueInfo)> {
        self.values.iter().map(|(n, i)| (*n, i))
    }
}
