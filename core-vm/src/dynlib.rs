//! A thin wrapper over the host dynamic linker: open a shared object by
//! name (once, lazily) and resolve named symbols from it. Handles close
//! when the owning [`SharedObjects`] (and with it, the owning program) is
//! dropped.

use std::collections::HashMap;

use crate::error::LowerError;

pub struct SharedObjects {
    libraries: HashMap<String, libloading::Library>,
}

impl SharedObjects {
    pub fn new() -> Self {
        SharedObjects {
            libraries: HashMap::new(),
        }
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    fn open(&mut self, name: &str) -> Result<&libloading::Library, LowerError> {
        if !self.libraries.contains_key(name) {
            tracing::debug!(shared_object = name, "opening shared object");
            // SAFETY: loading and later calling into an arbitrary shared
            // object is inherently unsafe; the caller is trusted to have
            // named a library whose ABI matches what the IR declares.
            let lib = unsafe { libloading::Library::new(name) }.map_err(|e| LowerError::OpenSharedObject {
                name: name.to_owned(),
                source: e.to_string(),
            })?;
            self.libraries.insert(name.to_owned(), lib);
        }
        Ok(self.libraries.get(name).expect("just inserted"))
    }

    /// Resolve `symbol` in the shared object named `name`, opening it first
    /// if necessary. Returns the symbol's raw address; the caller
    /// interprets it as whichever type the IR's extern declaration claims.
    pub fn resolve(&mut self, name: &str, symbol: &str) -> Result<*const (), LowerError> {
        let lib = self.open(name)?;
        // SAFETY: a `Symbol<unsafe extern "C" fn()>` is the standard
        // libloading idiom for naming "I just want this symbol's address";
        // the real signature is whatever the IR's extern declaration
        // claims, used only by the FFI trampoline that marshals arguments.
        unsafe {
            lib.get::<unsafe extern "C" fn()>(symbol.as_bytes())
                .map(|sym| *sym as usize as *const ())
                .map_err(|_| LowerError::SymbolNotFound {
                    name: symbol.to_owned(),
                    shared_object: name.to_owned(),
                })
        }
    }
}

impl Default for SharedObjects {
    fn default() -> Self {
        Self::new()
    }
}
