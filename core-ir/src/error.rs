//! Construction errors: misuse of the builder API. These correspond to
//! programmer errors rather than malformed input data — the happy-path
//! builder methods panic on them, but a front end that wants to validate
//! before committing can use the `try_*` counterparts instead.

use crate::program::{BlockId, FunctionId};

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("no function is currently open")]
    NoOpenFunction,
    #[error("no block is currently open")]
    NoOpenBlock,
    #[error("function {0:?} was finished with no terminator in its last block")]
    MissingTerminator(FunctionId),
    #[error("block {0:?} does not belong to the function currently being built")]
    BlockNotInFunction(BlockId),
    #[error("local variable index {0} is out of range for the current function")]
    LocalOutOfRange(u32),
}
