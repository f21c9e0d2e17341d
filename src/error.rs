//! Error types for the scanner/parser and the top-level tool. The checker
//! does not propagate errors through this type — it accumulates
//! `checker::Issue`s instead (§4.2, §7); see that module.

use thiserror::Error;

use crate::lexer::Position;

/// A single-violation failure from the scanner or parser (§4.1: "Fails
/// (reporting position and expectation) on the first syntactic
/// violation").
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{position}: unexpected character {found:?}")]
    UnexpectedChar { position: Position, found: char },

    #[error("{position}: unterminated string literal")]
    UnterminatedString { position: Position },

    #[error("{position}: expected {expected}, found {found}")]
    UnexpectedToken { position: Position, expected: String, found: String },

    #[error("{position}: invalid number literal {text:?}")]
    InvalidNumber { position: Position, text: String },

    #[error("{position}: unknown type keyword {text:?}")]
    UnknownType { position: Position, text: String },

    #[error("{position}: unexpected end of input, expected {expected}")]
    UnexpectedEof { position: Position, expected: String },
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Crate-level error for top-level tool use (§6: "Exit code is 0 on
/// success, nonzero on failure").
#[derive(Debug, Error)]
pub enum IrError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{0} checker issue(s) found")]
    CheckFailed(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type IrResult<T> = std::result::Result<T, IrError>;
