//! Marshals calls across the C ABI using `libffi`, translating this
//! workspace's interned [`Type`]s into libffi's own type descriptors and
//! caching that translation per [`TypeId`].

use std::collections::HashMap;

use core_types::ty::{NumericKind, Typeclass};
use core_types::{Type, TypeId, Value};
use libffi::middle::{Cif, Type as FfiType};
use parking_lot::Mutex;

use crate::error::{FfiError, FfiResult};

/// `Cif` holds raw `libffi_sys` pointers and so is not `Send`/`Sync` by
/// default; once built it is never mutated again, only called through
/// (which libffi itself allows from any thread), so sharing it behind our
/// own mutex is sound.
struct CachedCif(Cif);
unsafe impl Send for CachedCif {}
unsafe impl Sync for CachedCif {}

static CIF_CACHE: once_cell::sync::Lazy<Mutex<HashMap<(TypeId, usize), CachedCif>>> =
    once_cell::sync::Lazy::new(|| Mutex::new(HashMap::new()));

fn ffi_type_for(ty: &'static Type) -> FfiResult<FfiType> {
    let t = match &ty.class {
        Typeclass::Void => FfiType::void(),
        Typeclass::Numeric(k) => match k {
            NumericKind::I8 => FfiType::i8(),
            NumericKind::I16 => FfiType::i16(),
            NumericKind::I32 => FfiType::i32(),
            NumericKind::I64 => FfiType::i64(),
            NumericKind::U8 => FfiType::u8(),
            NumericKind::U16 => FfiType::u16(),
            NumericKind::U32 => FfiType::u32(),
            NumericKind::U64 => FfiType::u64(),
            NumericKind::F32 => FfiType::f32(),
            NumericKind::F64 => FfiType::f64(),
        },
        Typeclass::Pointer(_) | Typeclass::Typeref => FfiType::pointer(),
        Typeclass::Array { elem, count } => {
            let fields: Vec<FfiType> = (0..*count).map(|_| ffi_type_for(elem)).collect::<FfiResult<_>>()?;
            FfiType::structure(fields)
        }
        Typeclass::Tuple(fields) => {
            let fields: Vec<FfiType> = fields
                .iter()
                .map(|f| ffi_type_for(f.ty))
                .collect::<FfiResult<_>>()?;
            FfiType::structure(fields)
        }
        Typeclass::Aggregate(fields) => {
            let mut flat = Vec::new();
            for f in fields {
                for _ in 0..f.count {
                    flat.push(ffi_type_for(f.ty)?);
                }
            }
            FfiType::structure(flat)
        }
        Typeclass::Procedure { .. } => FfiType::pointer(),
    };
    Ok(t)
}

/// Build (and cache, by the procedure type's id) the call-interface
/// descriptor for a procedure type with `total_args` actual arguments at
/// the call site (which may exceed the declared fixed arguments for a
/// variadic procedure).
fn cif_for(proc_ty: &'static Type, total_args: usize) -> FfiResult<Cif> {
    let (arg_types, ret_ty) = match &proc_ty.class {
        Typeclass::Procedure { args, ret, .. } => (args, *ret),
        _ => return Err(FfiError::UnrepresentableType(proc_ty.id)),
    };

    let key = (proc_ty.id, total_args);
    let mut cache = CIF_CACHE.lock();
    // Variadic call sites with differing `total_args` build and cache a
    // distinct CIF per argument count; non-variadic procedures only ever
    // see one key.
    if let Some(cif) = cache.get(&key) {
        return Ok(cif.0.clone());
    }

    let mut ffi_args: Vec<FfiType> = arg_types
        .iter()
        .map(|t| ffi_type_for(t))
        .collect::<FfiResult<_>>()?;
    // Fixed/total split: a variadic call site extends the fixed arguments
    // with promoted actual arguments; the caller is responsible for C
    // default-argument promotion before this point.
    while ffi_args.len() < total_args {
        ffi_args.push(FfiType::u64());
    }
    let ffi_ret = ffi_type_for(ret_ty)?;
    let cif = Cif::new(ffi_args, ffi_ret);
    cache.insert(key, CachedCif(cif.clone()));
    Ok(cif)
}

/// Invoke the C-ABI callable at `callee_ptr`, whose signature is
/// `proc_ty`, passing `args` (laid out per `proc_ty`'s argument tuple) and
/// writing the result into `ret`.
///
/// # Safety
/// `callee_ptr` must be a valid, ABI-matching function pointer for
/// `proc_ty`; `args` and `ret`'s storage must match `proc_ty`'s argument
/// tuple and return type.
pub unsafe fn invoke_foreign(
    callee_ptr: *const (),
    proc_ty: &'static Type,
    ret: &mut Value,
    args: &Value,
) -> FfiResult<()> {
    let total_args = match &proc_ty.class {
        Typeclass::Procedure { args: fixed, .. } => match &args.ty().class {
            Typeclass::Tuple(fields) => fields.len().max(fixed.len()),
            _ => fixed.len(),
        },
        _ => return Err(FfiError::UnrepresentableType(proc_ty.id)),
    };
    let cif = cif_for(proc_ty, total_args)?;

    let arg_ptrs: Vec<*mut u8> = match &args.ty().class {
        Typeclass::Tuple(fields) => (0..fields.len()).map(|i| args.field(i).data_ptr()).collect(),
        _ => Vec::new(),
    };

    let code_ptr = libffi::middle::CodePtr::from_ptr(callee_ptr as *const std::ffi::c_void);
    // `libffi::middle::arg` wraps `&T` as the *address of the argument
    // data itself* (not a pointer-to-pointer) — `&*ptr` here reborrows
    // through the raw pointer so the wrapped address is `ptr` unchanged,
    // regardless of the field's real type.
    let ffi_args: Vec<libffi::middle::Arg> = arg_ptrs
        .iter()
        .map(|&p| libffi::middle::arg(unsafe { &*p }))
        .collect();

    // SAFETY: delegated to the caller's contract above; `cif` matches
    // `proc_ty` and `ffi_args` point at each tuple field of `args`. The
    // return type dispatched on below matches `ret.ty()`'s numeric kind,
    // the only shapes libffi can hand back by value through this call.
    macro_rules! call_numeric {
        ($t:ty) => {{
            let v: $t = unsafe { cif.call(code_ptr, &ffi_args) };
            ret.as_bytes_mut().copy_from_slice(&v.to_ne_bytes());
        }};
    }

    match &ret.ty().class {
        Typeclass::Void => {
            let (): () = unsafe { cif.call(code_ptr, &ffi_args) };
        }
        Typeclass::Numeric(NumericKind::I8) => call_numeric!(i8),
        Typeclass::Numeric(NumericKind::I16) => call_numeric!(i16),
        Typeclass::Numeric(NumericKind::I32) => call_numeric!(i32),
        Typeclass::Numeric(NumericKind::I64) => call_numeric!(i64),
        Typeclass::Numeric(NumericKind::U8) => call_numeric!(u8),
        Typeclass::Numeric(NumericKind::U16) => call_numeric!(u16),
        Typeclass::Numeric(NumericKind::U32) => call_numeric!(u32),
        Typeclass::Numeric(NumericKind::U64) => call_numeric!(u64),
        Typeclass::Numeric(NumericKind::F32) => call_numeric!(f32),
        Typeclass::Numeric(NumericKind::F64) => call_numeric!(f64),
        Typeclass::Pointer(_) | Typeclass::Typeref => call_numeric!(usize),
        _ => return Err(FfiError::UnrepresentableType(ret.ty().id)),
    }
    Ok(())
}
