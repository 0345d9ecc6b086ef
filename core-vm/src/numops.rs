//! Per-numeric-kind arithmetic, comparison and cast semantics shared by the
//! interpreter's specialized opcode handlers.

use core_types::ty::NumericKind;

/// Uniform operations over one concrete Rust numeric type, dispatched to
/// from [`NumericKind`] so the interpreter's opcode handlers don't need one
/// match arm per operation per kind.
pub trait NumOps: Copy {
    fn w_add(self, rhs: Self) -> Self;
    fn w_sub(self, rhs: Self) -> Self;
    fn w_mul(self, rhs: Self) -> Self;
    fn w_div(self, rhs: Self) -> Self;
    fn w_rem(self, rhs: Self) -> Self;
    fn w_neg(self) -> Self;
    fn bit_and(self, rhs: Self) -> Self;
    fn bit_or(self, rhs: Self) -> Self;
    fn bit_xor(self, rhs: Self) -> Self;
    fn bit_not(self) -> Self;
    fn shl(self, rhs: Self) -> Self;
    fn shr(self, rhs: Self) -> Self;
    fn lt(self, rhs: Self) -> bool;
    fn le(self, rhs: Self) -> bool;
    fn gt(self, rhs: Self) -> bool;
    fn ge(self, rhs: Self) -> bool;
}

macro_rules! impl_int_numops {
    ($($t:ty),* $(,)?) => {$(
        impl NumOps for $t {
            fn w_add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn w_sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn w_mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn w_div(self, rhs: Self) -> Self { self.wrapping_div(rhs) }
            fn w_rem(self, rhs: Self) -> Self { self.wrapping_rem(rhs) }
            fn w_neg(self) -> Self { self.wrapping_neg() }
            fn bit_and(self, rhs: Self) -> Self { self & rhs }
            fn bit_or(self, rhs: Self) -> Self { self | rhs }
            fn bit_xor(self, rhs: Self) -> Self { self ^ rhs }
            fn bit_not(self) -> Self { !self }
            fn shl(self, rhs: Self) -> Self { self.wrapping_shl(rhs as u32) }
            fn shr(self, rhs: Self) -> Self { self.wrapping_shr(rhs as u32) }
            fn lt(self, rhs: Self) -> bool { self < rhs }
            fn le(self, rhs: Self) -> bool { self <= rhs }
            fn gt(self, rhs: Self) -> bool { self > rhs }
            fn ge(self, rhs: Self) -> bool { self >= rhs }
        }
    )*};
}

macro_rules! impl_float_numops {
    ($($t:ty),* $(,)?) => {$(
        impl NumOps for $t {
            fn w_add(self, rhs: Self) -> Self { self + rhs }
            fn w_sub(self, rhs: Self) -> Self { self - rhs }
            fn w_mul(self, rhs: Self) -> Self { self * rhs }
            fn w_div(self, rhs: Self) -> Self { self / rhs }
            fn w_rem(self, rhs: Self) -> Self { self % rhs }
            fn w_neg(self) -> Self { -self }
            fn bit_and(self, _rhs: Self) -> Self { panic!("bitwise and on a float operand") }
            fn bit_or(self, _rhs: Self) -> Self { panic!("bitwise or on a float operand") }
            fn bit_xor(self, _rhs: Self) -> Self { panic!("xor on a float operand") }
            fn bit_not(self) -> Self { panic!("bitwise complement on a float operand") }
            fn shl(self, _rhs: Self) -> Self { panic!("left shift on a float operand") }
            fn shr(self, _rhs: Self) -> Self { panic!("right shift on a float operand") }
            fn lt(self, rhs: Self) -> bool { self < rhs }
            fn le(self, rhs: Self) -> bool { self <= rhs }
            fn gt(self, rhs: Self) -> bool { self > rhs }
            fn ge(self, rhs: Self) -> bool { self >= rhs }
        }
    )*};
}

impl_int_numops!(i8, i16, i32, i64, u8, u16, u32, u64);
impl_float_numops!(f32, f64);

/// Read a `T` from `ptr` without assuming alignment (bytecode references
/// are not guaranteed aligned beyond what the type's own layout promises).
///
/// # Safety
/// `ptr` must be valid for reads of `size_of::<T>()` bytes and those bytes
/// must hold a valid `T`.
pub unsafe fn read<T: Copy>(ptr: *const u8) -> T {
    unsafe { ptr.cast::<T>().read_unaligned() }
}

/// # Safety
/// `ptr` must be valid for writes of `size_of::<T>()` bytes.
pub unsafe fn write<T>(ptr: *mut u8, value: T) {
    unsafe { ptr.cast::<T>().write_unaligned(value) };
}

/// Convert `src` (of kind `src_kind`) to `dst_kind`'s representation,
/// following C-style conversion rules: integer truncation/extension with
/// sign preservation, float-to-int truncation toward zero, int-to-float
/// and float-to-float rounding to nearest.
///
/// # Safety
/// `src` must be valid for reads of `src_kind`'s size and `dst` valid for
/// writes of `dst_kind`'s size.
pub unsafe fn cast(dst: *mut u8, dst_kind: NumericKind, src: *const u8, src_kind: NumericKind) {
    macro_rules! from_src {
        ($dst_ty:ty) => {{
            let v: $dst_ty = match src_kind {
                NumericKind::I8 => unsafe { read::<i8>(src) as $dst_ty },
                NumericKind::I16 => unsafe { read::<i16>(src) as $dst_ty },
                NumericKind::I32 => unsafe { read::<i32>(src) as $dst_ty },
                NumericKind::I64 => unsafe { read::<i64>(src) as $dst_ty },
                NumericKind::U8 => unsafe { read::<u8>(src) as $dst_ty },
                NumericKind::U16 => unsafe { read::<u16>(src) as $dst_ty },
                NumericKind::U32 => unsafe { read::<u32>(src) as $dst_ty },
                NumericKind::U64 => unsafe { read::<u64>(src) as $dst_ty },
                NumericKind::F32 => unsafe { read::<f32>(src) as $dst_ty },
                NumericKind::F64 => unsafe { read::<f64>(src) as $dst_ty },
            };
            unsafe { write(dst, v) };
        }};
    }
    match dst_kind {
        NumericKind::I8 => from_src!(i8),
        NumericKind::I16 => from_src!(i16),
        NumericKind::I32 => from_src!(i32),
        NumericKind::I64 => from_src!(i64),
        NumericKind::U8 => from_src!(u8),
        NumericKind::U16 => from_src!(u16),
        NumericKind::U32 => from_src!(u32),
        NumericKind::U64 => from_src!(u64),
        NumericKind::F32 => from_src!(f32),
        NumericKind::F64 => from_src!(f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_add_matches_twos_complement() {
        assert_eq!(i8::MAX.w_add(1), i8::MIN);
        assert_eq!(u8::MAX.w_add(1), 0u8);
    }

    #[test]
    fn cast_float_to_int_truncates_toward_zero() {
        let src = 3.9f64;
        let mut dst = 0i32;
        unsafe {
            cast(
                (&mut dst) as *mut i32 as *mut u8,
                NumericKind::I32,
                (&src) as *const f64 as *const u8,
                NumericKind::F64,
            );
        }
        assert_eq!(dst, 3);
    }
}
