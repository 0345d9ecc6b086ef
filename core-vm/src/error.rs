//! Error taxonomy for the lowering and foreign-call subsystems.
//!
//! Instruction-level runtime traps (division by zero, stack exhaustion, an
//! unmatched `ret`/`call` pair) are not represented here: those are
//! programmer errors or CPU traps and are raised as a Rust panic rather
//! than threaded through a `Result`, matching this workspace's treatment of
//! unrecoverable interpreter state.

#[derive(Debug, derive_more::Display)]
pub enum LowerError {
    #[display(fmt = "shared object \"{}\" could not be opened: {}", name, source)]
    OpenSharedObject { name: String, source: String },
    #[display(fmt = "symbol \"{}\" was not found in shared object \"{}\"", name, shared_object)]
    SymbolNotFound { name: String, shared_object: String },
    #[display(fmt = "jump target block {:?} has no emitted instructions", _0)]
    DanglingRelocation(core_ir::BlockId),
}

impl std::error::Error for LowerError {}

pub type LowerResult<T> = Result<T, LowerError>;

#[derive(Debug, derive_more::Display)]
pub enum FfiError {
    #[display(fmt = "type {:?} has no foreign-call representation", _0)]
    UnrepresentableType(core_types::TypeId),
}

impl std::error::Error for FfiError {}

pub type FfiResult<T> = Result<T, FfiError>;

/// Errors that can surface from [`crate::interp::invoke`]: either a
/// lowering failure (a callee could not be lowered, typically a dangling
/// jump target or an unresolvable extern) or a foreign-call marshaling
/// failure. Both can only occur the first time a given function or
/// extern is touched; a program that has run once without error cannot
/// newly produce one on a later call.
#[derive(Debug, derive_more::Display)]
pub enum RuntimeError {
    #[display(fmt = "{}", _0)]
    Lower(LowerError),
    #[display(fmt = "{}", _0)]
    Ffi(FfiError),
}

impl std::error::Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
