//! Structural hash-consing of [`Type`]s.
//!
//! Every distinct shape is represented by exactly one `&'static Type`: two
//! calls to an interner constructor with the same structural arguments
//! return the same reference, so callers may compare types with pointer
//! (here, reference) equality instead of a structural walk.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::layout::layout_fields;
use crate::WORD_SIZE;

/// Monotonically increasing handle assigned on first construction of a
/// distinct type. 1-based; `0` is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum NumericKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumericKind {
    pub fn size(self) -> usize {
        use NumericKind::*;
        match self {
            I8 | U8 => 1,
            I16 | U16 => 2,
            I32 | U32 | F32 => 4,
            I64 | U64 | F64 => 8,
        }
    }

    pub fn align(self) -> usize {
        self.size()
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericKind::F32 | NumericKind::F64)
    }

    pub fn is_signed(self) -> bool {
        use NumericKind::*;
        matches!(self, I8 | I16 | I32 | I64)
    }

    fn tag(self) -> u8 {
        use NumericKind::*;
        match self {
            I8 => 0,
            I16 => 1,
            I32 => 2,
            I64 => 3,
            U8 => 4,
            U16 => 5,
            U32 => 6,
            U64 => 7,
            F32 => 8,
            F64 => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// A function lowered from this workspace's own IR.
    Native,
    /// A foreign, C-ABI function reached through the FFI trampoline.
    Cdecl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleField {
    pub ty: &'static Type,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateField {
    pub ty: &'static Type,
    pub count: usize,
    pub offset: usize,
}

#[derive(Debug)]
pub enum Typeclass {
    Void,
    Numeric(NumericKind),
    Pointer(&'static Type),
    Array { elem: &'static Type, count: usize },
    Tuple(Vec<TupleField>),
    Aggregate(Vec<AggregateField>),
    Procedure {
        args: Vec<&'static Type>,
        ret: &'static Type,
        call_conv: CallConv,
        variadic: bool,
    },
    Typeref,
}

/// An immutable, interned type descriptor. Equality is always reference
/// equality among interned instances; there is no other way to construct
/// one.
#[derive(Debug)]
pub struct Type {
    pub id: TypeId,
    pub size: usize,
    pub align: usize,
    pub class: Typeclass,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Type {}

struct InternerState {
    by_fingerprint: HashMap<Vec<u8>, &'static Type>,
    next_id: u64,
}

/// The process-wide structural cache. One instance is shared by every
/// program; see [`interner()`] for the global accessor.
pub struct TypeInterner {
    arena: &'static crate::Arena,
    state: Mutex<InternerState>,
}

impl TypeInterner {
    pub fn new() -> Self {
        // The interner's arena lives for the process's lifetime, matching
        // the lifecycle documented for the type table.
        let arena: &'static crate::Arena = Box::leak(Box::new(crate::Arena::new()));
        TypeInterner {
            arena,
            state: Mutex::new(InternerState {
                by_fingerprint: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    fn intern(&self, fingerprint: Vec<u8>, build: impl FnOnce(TypeId) -> Type) -> &'static Type {
        let mut state = self.state.lock();
        if let Some(ty) = state.by_fingerprint.get(&fingerprint) {
            return ty;
        }
        let id = TypeId(state.next_id);
        state.next_id += 1;
        let ty = build(id);
        tracing::trace!(id = id.0, "interning new type");
        let ty_ref: &'static Type = self.arena.alloc(ty);
        state.by_fingerprint.insert(fingerprint, ty_ref);
        ty_ref
    }

    pub fn get_void(&self) -> &'static Type {
        self.intern(vec![0], |id| Type {
            id,
            size: 0,
            align: 1,
            class: Typeclass::Void,
        })
    }

    pub fn get_numeric(&self, kind: NumericKind) -> &'static Type {
        self.intern(vec![1, kind.tag()], |id| Type {
            id,
            size: kind.size(),
            align: kind.align(),
            class: Typeclass::Numeric(kind),
        })
    }

    pub fn get_pointer(&self, target: &'static Type) -> &'static Type {
        let fp = fingerprint(2, &[target.id.0]);
        self.intern(fp, |id| Type {
            id,
            size: WORD_SIZE,
            align: WORD_SIZE,
            class: Typeclass::Pointer(target),
        })
    }

    pub fn get_array(&self, elem: &'static Type, count: usize) -> &'static Type {
        let fp = fingerprint(3, &[elem.id.0, count as u64]);
        self.intern(fp, |id| Type {
            id,
            size: elem.size.checked_mul(count).expect("array size overflow"),
            align: elem.align,
            class: Typeclass::Array { elem, count },
        })
    }

    pub fn get_tuple(&self, elems: &[&'static Type]) -> &'static Type {
        let ids: Vec<u64> = elems.iter().map(|t| t.id.0).collect();
        let fp = fingerprint(4, &ids);
        self.intern(fp, |id| {
            let fields: Vec<(usize, usize, usize)> =
                elems.iter().map(|t| (t.size, t.align, 1)).collect();
            let layout = layout_fields(&fields);
            let class = Typeclass::Tuple(
                elems
                    .iter()
                    .zip(layout.fields.iter())
                    .map(|(t, f)| TupleField {
                        ty: t,
                        offset: f.offset,
                    })
                    .collect(),
            );
            Type {
                id,
                size: layout.size,
                align: layout.align,
                class,
            }
        })
    }

    pub fn get_aggregate(&self, elems: &[(&'static Type, usize)]) -> &'static Type {
        let mut key = Vec::with_capacity(elems.len() * 2);
        for (t, c) in elems {
            key.push(t.id.0);
            key.push(*c as u64);
        }
        let fp = fingerprint(5, &key);
        self.intern(fp, |id| {
            let fields: Vec<(usize, usize, usize)> =
                elems.iter().map(|(t, c)| (t.size, t.align, *c)).collect();
            let layout = layout_fields(&fields);
            let class = Typeclass::Aggregate(
                elems
                    .iter()
                    .zip(layout.fields.iter())
                    .map(|((t, c), f)| AggregateField {
                        ty: t,
                        count: *c,
                        offset: f.offset,
                    })
                    .collect(),
            );
            Type {
                id,
                size: layout.size,
                align: layout.align,
                class,
            }
        })
    }

    pub fn get_procedure(
        &self,
        args: &[&'static Type],
        ret: &'static Type,
        call_conv: CallConv,
        variadic: bool,
    ) -> &'static Type {
        let mut key: Vec<u64> = args.iter().map(|t| t.id.0).collect();
        key.push(ret.id.0);
        key.push(call_conv as u8 as u64);
        key.push(variadic as u64);
        let fp = fingerprint(6, &key);
        self.intern(fp, |id| Type {
            id,
            size: WORD_SIZE,
            align: WORD_SIZE,
            class: Typeclass::Procedure {
                args: args.to_vec(),
                ret,
                call_conv,
                variadic,
            },
        })
    }

    pub fn get_typeref(&self) -> &'static Type {
        self.intern(vec![7], |id| Type {
            id,
            size: WORD_SIZE,
            align: WORD_SIZE,
            class: Typeclass::Typeref,
        })
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint(discriminant: u8, ids: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + ids.len() * 8);
    out.push(discriminant);
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// The single process-wide interner. Every component that needs a `Type`
/// goes through this instance so that interning is actually global.
pub static INTERNER: once_cell::sync::Lazy<TypeInterner> =
    once_cell::sync::Lazy::new(TypeInterner::new);

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use strum::IntoEnumIterator;

    // quickcheck the structural-equality invariant: interning the same
    // numeric kind twice, through any interleaving of other constructions,
    // always returns the same pointer.
    #[quickcheck]
    fn interning_numeric_kind_is_idempotent(kind_index: usize, noise: Vec<u8>) -> bool {
        let kinds: Vec<NumericKind> = NumericKind::iter().collect();
        let kind = kinds[kind_index % kinds.len()];
        let interner = TypeInterner::new();
        let first = interner.get_numeric(kind);
        for n in noise {
            interner.get_numeric(kinds[n as usize % kinds.len()]);
        }
        let second = interner.get_numeric(kind);
        std::ptr::eq(first, second) && first.id == second.id
    }

    #[test]
    fn interning_is_pointer_equal_for_equal_structure() {
        let interner = TypeInterner::new();
        let i32_t = interner.get_numeric(NumericKind::I32);
        let ptr_a = interner.get_pointer(i32_t);
        let a = interner.get_tuple(&[i32_t, ptr_a]);
        let b = interner.get_tuple(&[i32_t, ptr_a]);
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn distinct_structures_get_distinct_ids() {
        let interner = TypeInterner::new();
        let i32_t = interner.get_numeric(NumericKind::I32);
        let i64_t = interner.get_numeric(NumericKind::I64);
        assert_ne!(i32_t.id, i64_t.id);
    }

    #[test]
    fn aggregate_layout_matches_mixed_width_example() {
        let interner = TypeInterner::new();
        let i8_t = interner.get_numeric(NumericKind::I8);
        let i64_t = interner.get_numeric(NumericKind::I64);
        let agg = interner.get_aggregate(&[(i8_t, 1), (i64_t, 1), (i8_t, 3)]);
        assert_eq!(agg.size, 24);
        assert_eq!(agg.align, 8);
        match &agg.class {
            Typeclass::Aggregate(fields) => {
                let offsets: Vec<usize> = fields.iter().map(|f| f.offset).collect();
                assert_eq!(offsets, vec![0, 8, 16]);
            }
            _ => panic!("expected aggregate"),
        }
    }

    #[test]
    fn empty_tuple_is_zero_sized() {
        let interner = TypeInterner::new();
        let t = interner.get_tuple(&[]);
        assert_eq!(t.size, 0);
        assert_eq!(t.align, 1);
    }
}
