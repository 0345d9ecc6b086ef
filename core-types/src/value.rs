//! The value representation every other subsystem reads and writes through:
//! an untyped data pointer paired with the [`Type`](crate::Type) that gives
//! its bytes meaning.

use crate::ty::{Type, Typeclass};

/// A `(data_ptr, type)` pair. `data_ptr` must be valid for `type.size` bytes
/// with `type.align` for as long as the `Value` is used; `Value` itself does
/// not own the storage it points at.
#[derive(Clone, Copy)]
pub struct Value {
    data_ptr: *mut u8,
    ty: &'static Type,
}

impl Value {
    /// # Safety
    /// `data_ptr` must be valid for `ty.size` readable/writable bytes,
    /// aligned to `ty.align`, for the lifetime this `Value` is used.
    pub unsafe fn new(data_ptr: *mut u8, ty: &'static Type) -> Self {
        Value { data_ptr, ty }
    }

    pub fn ty(&self) -> &'static Type {
        self.ty
    }

    pub fn data_ptr(&self) -> *mut u8 {
        self.data_ptr
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.data_ptr, self.ty.size) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.data_ptr, self.ty.size) }
    }

    pub fn copy_from(&mut self, other: &Value) {
        assert_eq!(self.ty.size, other.ty.size, "copy between differently sized values");
        unsafe {
            core::ptr::copy_nonoverlapping(other.data_ptr, self.data_ptr, self.ty.size);
        }
    }

    /// Reinterpret this value's bytes through a different type of equal
    /// size.
    pub fn reinterpret(&self, ty: &'static Type) -> Value {
        assert_eq!(self.ty.size, ty.size, "reinterpret requires equal-sized types");
        Value {
            data_ptr: self.data_ptr,
            ty,
        }
    }

    /// Index into a `Tuple` or `Aggregate` value, producing the `i`th field.
    pub fn field(&self, i: usize) -> Value {
        match &self.ty.class {
            Typeclass::Tuple(fields) => {
                let f = fields[i];
                Value {
                    data_ptr: unsafe { self.data_ptr.add(f.offset) },
                    ty: f.ty,
                }
            }
            Typeclass::Aggregate(fields) => {
                let f = fields[i];
                Value {
                    data_ptr: unsafe { self.data_ptr.add(f.offset) },
                    ty: f.ty,
                }
            }
            _ => panic!("field() called on a non-tuple, non-aggregate value"),
        }
    }

    /// Index into an `Array` value, producing the `i`th element.
    pub fn index(&self, i: usize) -> Value {
        match &self.ty.class {
            Typeclass::Array { elem, count } => {
                assert!(i < *count, "array index out of bounds");
                Value {
                    data_ptr: unsafe { self.data_ptr.add(elem.size * i) },
                    ty: elem,
                }
            }
            _ => panic!("index() called on a non-array value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{NumericKind, TypeInterner};

    #[test]
    fn tuple_field_round_trip() {
        let interner = TypeInterner::new();
        let i32_t = interner.get_numeric(NumericKind::I32);
        let i8_t = interner.get_numeric(NumericKind::I8);
        let tuple_t = interner.get_tuple(&[i8_t, i32_t]);

        let mut storage = vec![0u8; tuple_t.size];
        let v = unsafe { Value::new(storage.as_mut_ptr(), tuple_t) };
        let mut second = v.field(1);
        second.as_bytes_mut().copy_from_slice(&42i32.to_ne_bytes());

        let readback = i32::from_ne_bytes(v.field(1).as_bytes().try_into().unwrap());
        assert_eq!(readback, 42);
    }

    #[test]
    fn array_index_walks_elements() {
        let interner = TypeInterner::new();
        let i64_t = interner.get_numeric(NumericKind::I64);
        let arr_t = interner.get_array(i64_t, 4);
        let mut storage = vec![0u8; arr_t.size];
        let v = unsafe { Value::new(storage.as_mut_ptr(), arr_t) };
        for i in 0..4i64 {
            v.index(i as usize)
                .as_bytes_mut()
                .copy_from_slice(&(i * 10).to_ne_bytes());
        }
        for i in 0..4i64 {
            let bytes = v.index(i as usize).as_bytes().to_vec();
            assert_eq!(i64::from_ne_bytes(bytes.try_into().unwrap()), i * 10);
        }
    }
}
