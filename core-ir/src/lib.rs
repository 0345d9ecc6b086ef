//! The intermediate representation this workspace's front end targets:
//! flat, append-only program storage, a typed reference model, and the
//! stateful builder API used to emit it.

pub mod builder;
pub mod error;
pub mod opcode;
pub mod program;
pub mod reference;

pub use builder::Builder;
pub use error::BuilderError;
pub use opcode::Opcode;
pub use program::{
    Block, BlockId, ConstId, ConstRecord, ExternId, ExternSym, Function, FunctionId, Instruction,
    InstrArg, IrProgram, SharedObjectId,
};
pub use reference::{RefKind, Reference};
