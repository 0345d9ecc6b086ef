//! The tuple/aggregate layout algorithm shared by the type interner's
//! `Tuple` and `Aggregate` constructors.

use crate::round_up;

/// One field's contribution to a computed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: usize,
}

/// The result of laying out an ordered list of `(size, align, count)` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub fields: Vec<FieldLayout>,
    pub size: usize,
    pub align: usize,
}

/// Compute offsets for a sequence of fields, each occupying `size * count`
/// bytes aligned to `align`. Used for both `Tuple` (every `count` is 1) and
/// `Aggregate` (repeated elements).
///
/// `offset_i = roundUp(offset_{i-1} + size_{i-1}*count_{i-1}, align_i)`;
/// overall alignment is the max field alignment (1 if there are no fields);
/// overall size is the end offset rounded up to the overall alignment.
pub fn layout_fields(fields: &[(usize, usize, usize)]) -> Layout {
    let align = fields.iter().map(|(_, a, _)| *a).max().unwrap_or(1);
    let mut offsets = Vec::with_capacity(fields.len());
    let mut cursor = 0usize;
    for (size, field_align, count) in fields {
        let offset = round_up(cursor, *field_align);
        offsets.push(FieldLayout { offset });
        cursor = offset + size * count;
    }
    let size = round_up(cursor, align);
    Layout {
        fields: offsets,
        size,
        align,
    }
}
