//! The value model: constants, computed (SSA) values, and inherited
//! (argument) values, each carrying a [`Type`].

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::types::{Composite, Type, TypeTable};

/// A number identifying a computed or inherited value within its defining
/// function. Signed to match the rest of the IR's numeric handles
/// (function/block/value numbers), which mirror Katara's `int64_t`
/// `*_num_t` typedefs (`examples/original_source/src/ir/representation/num_types.h`).
pub type ValueNum = i64;

/// A literal constant, self-describing its own type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Int { kind: crate::types::IntKind, bits: u64 },
    /// A raw pointer address (grammar: `'0x' HexDigits`); the null pointer
    /// is simply `Pointer(0)`, not a distinct constant kind.
    Pointer(u64),
    /// A function value referring to another function by number.
    Func(u64),
    String(String),
}

impl Constant {
    /// Context-free type of this constant. A string constant has no
    /// `TypeTable` to resolve its composite handle against here, so it
    /// falls back to `Type::Ptr`; callers that can supply the owning
    /// program's table (the checker) should use `ty_in` instead, which
    /// resolves it to the interned `string` composite.
    pub fn ty(&self) -> Type {
        match self {
            Constant::Bool(_) => Type::Bool,
            Constant::Int { kind, .. } => Type::Int(*kind),
            Constant::Pointer(_) => Type::Ptr,
            Constant::Func(_) => Type::Func,
            Constant::String(_) => Type::Ptr,
        }
    }

    /// Table-aware counterpart of `ty`: resolves a string constant to its
    /// interned `string` composite instead of falling back to `Type::Ptr`.
    /// The parser interns `Composite::String` the moment it parses any
    /// string literal or `:string` annotation, so this lookup succeeds
    /// whenever a string constant exists anywhere in the program.
    pub fn ty_in(&self, types: &TypeTable) -> Type {
        match self {
            Constant::String(_) => types.find(&Composite::String).map(Type::Composite).unwrap_or(Type::Ptr),
            other => other.ty(),
        }
    }

    pub fn nil() -> Self {
        Constant::Pointer(0)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Constant::Int { kind, bits } => {
                if kind.is_signed() {
                    write!(f, "#{}", *bits as i64)
                } else {
                    write!(f, "#{bits}")
                }
            }
            Constant::Pointer(addr) => write!(f, "0x{addr:x}"),
            Constant::Func(n) => write!(f, "@{n}"),
            Constant::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A value usable as an instruction operand or result: a literal constant,
/// or the result of some earlier instruction (or function argument) in the
/// same function. Function arguments are Computed values like any other —
/// §3 describes them as "an ordered argument list of computed values with
/// their declared types" — so there is no separate argument variant here.
///
/// The third kind in §3, "Inherited" (a value tagged with its originating
/// block), is not a storage kind of `Value` at all: the grammar defines it
/// as `InheritedValue ::= Value BlockValue`, i.e. a `Value` paired with a
/// block number. That pairing is [`crate::instruction::PhiOperand`], used
/// only in phi operand lists, exactly where §3 says Inherited values may
/// appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Constant(Constant),
    /// Defined by exactly one instruction in the owning function (I-F1:
    /// SSA — each computed value number has exactly one defining
    /// instruction), or bound as a function argument.
    Computed { num: ValueNum, ty: Type },
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Constant(c) => c.ty(),
            Value::Computed { ty, .. } => ty.clone(),
        }
    }

    /// Table-aware counterpart of `ty`; see `Constant::ty_in`.
    pub fn ty_in(&self, types: &TypeTable) -> Type {
        match self {
            Value::Constant(c) => c.ty_in(types),
            Value::Computed { ty, .. } => ty.clone(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }

    pub fn as_computed_num(&self) -> Option<ValueNum> {
        match self {
            Value::Computed { num, .. } => Some(*num),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(c) => write!(f, "{c}"),
            Value::Computed { num, .. } => write!(f, "%{num}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntKind, TypeTable};

    #[test]
    fn constant_display_matches_grammar() {
        assert_eq!(Constant::Bool(true).to_string(), "#t");
        assert_eq!(Constant::Int { kind: IntKind::I64, bits: 7 }.to_string(), "#7");
        assert_eq!(Constant::Pointer(0).to_string(), "0x0");
        assert_eq!(Constant::nil(), Constant::Pointer(0));
    }

    #[test]
    fn negative_signed_int_displays_with_sign() {
        let bits = (-1i64) as u64;
        assert_eq!(Constant::Int { kind: IntKind::I64, bits }.to_string(), "#-1");
    }

    #[test]
    fn computed_value_displays_with_percent_sigil() {
        let computed = Value::Computed { num: 3, ty: Type::Int(IntKind::I64) };
        assert_eq!(computed.to_string(), "%3");
        assert!(computed.as_computed_num().is_some());
    }

    #[test]
    fn value_ty_roundtrips() {
        let v = Value::Constant(Constant::Bool(false));
        assert_eq!(v.ty(), Type::Bool);
    }

    #[test]
    fn string_constant_ty_falls_back_to_ptr_without_a_table() {
        let s = Constant::String("hi".into());
        assert_eq!(s.ty(), Type::Ptr);
    }

    #[test]
    fn string_constant_ty_in_resolves_the_interned_string_composite() {
        let mut types = TypeTable::new();
        let string_id = types.intern(Composite::String);
        let s = Value::Constant(Constant::String("hi".into()));
        assert_eq!(s.ty_in(&types), Type::Composite(string_id));
        // ty() alone would never compare equal to a `:string`-declared
        // operand's type, since it falls back to Type::Ptr.
        assert_ne!(s.ty(), Type::Composite(string_id));
    }
}
