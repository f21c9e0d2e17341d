//! The IR type system: atomic types, extension (composite) types, and the
//! per-program type table that interns them.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Signedness and width of an integer atomic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntKind {
    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64)
    }

    pub fn bits(self) -> u32 {
        match self {
            IntKind::I8 | IntKind::U8 => 8,
            IntKind::I16 | IntKind::U16 => 16,
            IntKind::I32 | IntKind::U32 => 32,
            IntKind::I64 | IntKind::U64 => 64,
        }
    }

    pub fn size_bytes(self) -> u64 {
        self.bits() as u64 / 8
    }
}

impl fmt::Display for IntKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntKind::I8 => "i8",
            IntKind::I16 => "i16",
            IntKind::I32 => "i32",
            IntKind::I64 => "i64",
            IntKind::U8 => "u8",
            IntKind::U16 => "u16",
            IntKind::U32 => "u32",
            IntKind::U64 => "u64",
        };
        write!(f, "{s}")
    }
}

/// Unary operators over bools and ints (§3 instruction table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if matches!(self, UnaryOp::Neg) { "ineg" } else { "inot" })
    }
}

/// Binary arithmetic/bitwise operators over two ints of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    And,
    Or,
    Xor,
    Andnot,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "iadd",
            BinaryOp::Sub => "isub",
            BinaryOp::Mul => "imul",
            BinaryOp::Quo => "iquo",
            BinaryOp::Rem => "irem",
            BinaryOp::And => "iand",
            BinaryOp::Or => "ior",
            BinaryOp::Xor => "ixor",
            BinaryOp::Andnot => "iandnot",
        };
        write!(f, "{s}")
    }
}

/// Integer comparison operators; result is always `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "ieq",
            CompareOp::Neq => "ineq",
            CompareOp::Lss => "ilss",
            CompareOp::Leq => "ileq",
            CompareOp::Gtr => "igtr",
            CompareOp::Geq => "igeq",
        };
        write!(f, "{s}")
    }
}

/// Shift operators; the offset is always `int` but may differ in kind from
/// the shifted operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftOp {
    Shl,
    Shr,
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if matches!(self, ShiftOp::Shl) { "shl" } else { "shr" })
    }
}

/// Handle into a program's [`TypeTable`], identifying one interned
/// composite type by structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeId(pub u32);

/// Ownership discipline carried by a shared pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharedKind {
    Strong,
    Weak,
}

/// A struct field: name plus element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// An interface method signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<Type>,
    pub results: Vec<Type>,
}

/// The structural payload of a composite (extension) type, stored once in
/// the owning program's [`TypeTable`] and referenced everywhere else by
/// [`CompositeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Composite {
    /// Reference-counted pointer; `strong` increments/decrements a
    /// refcount, `weak` does not.
    SharedPointer { element: Box<Type>, kind: SharedKind },
    /// Single-owner pointer, freed explicitly via `delete-unique`.
    UniquePointer { element: Box<Type> },
    /// Fixed-size array of a known element count.
    Array { element: Box<Type>, count: u64 },
    Struct { fields: Vec<Field> },
    Interface { methods: Vec<Method> },
    /// Byte string; not a pointer-to-bytes, a first-class value kind.
    String,
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Composite::SharedPointer { element, kind } => {
                write!(f, "shared_ptr<{}, {}>", element, if matches!(kind, SharedKind::Strong) { "s" } else { "w" })
            }
            Composite::UniquePointer { element } => write!(f, "unique_ptr<{element}>"),
            Composite::Array { element, count } => write!(f, "array<{element}, {count}>"),
            Composite::Struct { fields } => {
                if fields.is_empty() {
                    return write!(f, "struct");
                }
                write!(f, "struct<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, ">")
            }
            Composite::Interface { methods } => {
                if methods.is_empty() {
                    return write!(f, "interface");
                }
                write!(f, "interface<")?;
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: (", m.name)?;
                    for (j, p) in m.parameters.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{p}")?;
                    }
                    write!(f, ") => (")?;
                    for (j, r) in m.results.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{r}")?;
                    }
                    write!(f, ")")?;
                }
                write!(f, ">")
            }
            Composite::String => write!(f, "string"),
        }
    }
}

/// A type in the IR: one of the atomic kinds, or a handle into the type
/// table for an interned composite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int(IntKind),
    Ptr,
    Func,
    Composite(CompositeId),
}

impl Type {
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Type::Func)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "b"),
            Type::Int(k) => write!(f, "{k}"),
            Type::Ptr => write!(f, "ptr"),
            Type::Func => write!(f, "func"),
            Type::Composite(id) => write!(f, "#{}", id.0),
        }
    }
}

/// Per-program table interning composite types by structural equality.
/// Atomic types need no table entry; they are process-constant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    entries: Vec<Composite>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `composite`, returning its stable handle. Structurally equal
    /// composites (including nested ones) share a handle.
    pub fn intern(&mut self, composite: Composite) -> CompositeId {
        if let Some(pos) = self.entries.iter().position(|c| *c == composite) {
            return CompositeId(pos as u32);
        }
        self.entries.push(composite);
        CompositeId((self.entries.len() - 1) as u32)
    }

    pub fn get(&self, id: CompositeId) -> Option<&Composite> {
        self.entries.get(id.0 as usize)
    }

    /// Looks up `composite`'s handle without interning it. Non-mutating
    /// counterpart of `intern`, for callers (the checker) that must treat
    /// the table as immutable.
    pub fn find(&self, composite: &Composite) -> Option<CompositeId> {
        self.entries.iter().position(|c| c == composite).map(|pos| CompositeId(pos as u32))
    }

    /// Is `ty` "pointer-like" (§3 `load`/`store`'s address operand): a raw
    /// pointer, or a shared/unique pointer composite. Composite kinds need
    /// the table to resolve, so this lives here rather than on `Type`.
    pub fn is_pointer_like(&self, ty: &Type) -> bool {
        match ty {
            Type::Ptr => true,
            Type::Composite(id) => {
                matches!(self.get(*id), Some(Composite::SharedPointer { .. } | Composite::UniquePointer { .. }))
            }
            _ => false,
        }
    }

    /// Render a [`Type`] to its full textual form, resolving composite
    /// handles through the table. Needed by the printer (§4.1) because
    /// `Type::Display` alone only prints the `#N` handle.
    pub fn render(&self, ty: &Type) -> String {
        match ty {
            Type::Composite(id) => match self.get(*id) {
                Some(composite) => composite.to_string(),
                None => format!("#{}(unknown)", id.0),
            },
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_kind_widths() {
        assert_eq!(IntKind::I8.bits(), 8);
        assert_eq!(IntKind::U64.bits(), 64);
        assert!(IntKind::I32.is_signed());
        assert!(!IntKind::U32.is_signed());
    }

    #[test]
    fn interning_dedupes_structurally_equal_composites() {
        let mut table = TypeTable::new();
        let a = table.intern(Composite::Array { element: Box::new(Type::Int(IntKind::I64)), count: 4 });
        let b = table.intern(Composite::Array { element: Box::new(Type::Int(IntKind::I64)), count: 4 });
        let c = table.intern(Composite::Array { element: Box::new(Type::Int(IntKind::I64)), count: 5 });
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn render_resolves_composite_handles() {
        let mut table = TypeTable::new();
        let id = table.intern(Composite::UniquePointer { element: Box::new(Type::Bool) });
        assert_eq!(table.render(&Type::Composite(id)), "unique_ptr<b>");
        assert_eq!(table.render(&Type::Int(IntKind::I64)), "i64");
    }

    #[test]
    fn find_locates_an_interned_composite_without_inserting() {
        let mut table = TypeTable::new();
        assert_eq!(table.find(&Composite::String), None);
        let id = table.intern(Composite::String);
        assert_eq!(table.find(&Composite::String), Some(id));
    }

    #[test]
    fn pointer_like_covers_raw_and_owning_pointers_but_not_other_composites() {
        let mut table = TypeTable::new();
        let unique = table.intern(Composite::UniquePointer { element: Box::new(Type::Int(IntKind::I64)) });
        let shared = table.intern(Composite::SharedPointer { element: Box::new(Type::Int(IntKind::I64)), kind: SharedKind::Strong });
        let string = table.intern(Composite::String);
        assert!(table.is_pointer_like(&Type::Ptr));
        assert!(table.is_pointer_like(&Type::Composite(unique)));
        assert!(table.is_pointer_like(&Type::Composite(shared)));
        assert!(!table.is_pointer_like(&Type::Composite(string)));
        assert!(!table.is_pointer_like(&Type::Int(IntKind::I64)));
    }
}
