//! Per-program state the bytecode lowering and the interpreter share:
//! materialized globals, resolved external symbols, and the shared-object
//! handles they were resolved from.

use std::collections::HashMap;

use core_ir::{ExternId, IrProgram};
use parking_lot::Mutex;

use crate::dynlib::SharedObjects;
use crate::error::LowerResult;

/// Owns everything lowering and execution allocate outside the IR itself:
/// materialized global storage, the external-symbol resolution cache, and
/// the shared-object handles backing it. Dropped when the program is
/// destroyed, closing every shared object it opened.
pub struct BcProgram {
    globals: Mutex<Vec<Option<Box<[u8]>>>>,
    extern_cache: Mutex<HashMap<u32, usize>>,
    shared_objects: Mutex<SharedObjects>,
}

impl BcProgram {
    pub fn new(_program: &IrProgram) -> Self {
        BcProgram {
            globals: Mutex::new(Vec::new()),
            extern_cache: Mutex::new(HashMap::new()),
            shared_objects: Mutex::new(SharedObjects::new()),
        }
    }

    /// Materialize (on first use) the zero-initialized storage for global
    /// `index`, returning a stable pointer to it.
    pub fn materialize_global(&self, program: &IrProgram, index: u32) -> *mut u8 {
        let mut globals = self.globals.lock();
        let idx = index as usize;
        if globals.len() <= idx {
            globals.resize_with(idx + 1, || None);
        }
        if globals[idx].is_none() {
            let ty = program.global_ty(index);
            tracing::debug!(global = index, size = ty.size, "materializing global");
            globals[idx] = Some(vec![0u8; ty.size].into_boxed_slice());
        }
        globals[idx].as_mut().unwrap().as_mut_ptr()
    }

    /// Resolve (and cache) the address of an external symbol, opening its
    /// shared object on first reference.
    pub fn resolve_extern(&self, program: &IrProgram, id: ExternId) -> LowerResult<*const ()> {
        if let Some(ptr) = self.extern_cache.lock().get(&id.0) {
            return Ok(*ptr as *const ());
        }
        let sym = program.extern_sym(id);
        let so_name = program.shared_object_name(sym.shared_object);
        let ptr = self.shared_objects.lock().resolve(so_name, &sym.name)?;
        self.extern_cache.lock().insert(id.0, ptr as usize);
        Ok(ptr)
    }
}
