//! SSA-form intermediate representation: data model, textual
//! serialization, well-formedness checker, and the analyses and
//! transforms built on top of it (dominator tree, use/def index,
//! live-range analysis, interference graph, phi elimination, register
//! coloring) plus the pointer-ownership transforms.

pub mod abi;
pub mod checker;
pub mod coloring;
pub mod dominance;
pub mod error;
pub mod function;
pub mod instruction;
pub mod interference;
pub mod lexer;
pub mod liveness;
pub mod parser;
pub mod phi_elim;
pub mod pointer_transforms;
pub mod printer;
pub mod program;
pub mod types;
pub mod usedef;
pub mod value;

pub use checker::{check_program, Issue, IssueCategory, IssueKind};
pub use error::{IrError, IrResult, ParseError, ParseResult};
pub use function::Function;
pub use instruction::{Block, Instruction};
pub use parser::parse_program;
pub use printer::print_program;
pub use program::Program;
pub use types::{Type, TypeTable};
pub use value::{Constant, Value};
