//! Bytecode lowering and execution: turns a `core_ir::IrProgram` into
//! lazily-materialized bytecode and runs it, marshaling foreign calls
//! across the C ABI through `libffi` and resolving externs through the
//! host dynamic linker.

pub mod dynlib;
pub mod error;
pub mod ffi;
pub mod interp;
pub mod lower;
pub mod numops;
pub mod program;

pub use error::{FfiError, LowerError, RuntimeError};
pub use interp::{invoke, is_idle};
pub use lower::{lower_function, BcFunction, BcOp};
pub use program::BcProgram;
