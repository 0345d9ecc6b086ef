//! The reference model: a value naming a storage location that is resolved
//! to an address only at execution time, never at build time.

use core_types::Type;

/// Which storage domain a [`Reference`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum RefKind {
    /// A local variable of the current function, by index into its locals.
    Frame,
    /// A slot in the argument tuple, by index.
    Arg,
    /// The return slot (conventionally index 0).
    Ret,
    /// A process-wide slot, materialized lazily on first use.
    Global,
    /// An interned constant value.
    Const,
    /// One of the six fixed scratch pseudo-registers.
    Reg,
    /// An entry in the program's external-symbol table.
    ExtSym,
    /// No storage; used for unused instruction operand slots.
    None,
}

/// `(kind, index, offset, post_offset, type, is_indirect)`. See the module
/// docs for how these compose into a final address.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub kind: RefKind,
    pub index: u32,
    pub offset: i64,
    pub post_offset: i64,
    pub ty: &'static Type,
    pub is_indirect: bool,
}

impl Reference {
    pub fn none(ty: &'static Type) -> Self {
        Reference {
            kind: RefKind::None,
            index: 0,
            offset: 0,
            post_offset: 0,
            ty,
            is_indirect: false,
        }
    }

    pub fn new(kind: RefKind, index: u32, ty: &'static Type) -> Self {
        Reference {
            kind,
            index,
            offset: 0,
            post_offset: 0,
            ty,
            is_indirect: false,
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_post_offset(mut self, post_offset: i64) -> Self {
        self.post_offset = post_offset;
        self
    }

    pub fn indirect(mut self) -> Self {
        self.is_indirect = true;
        self
    }
}
