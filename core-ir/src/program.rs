//! Flat, append-only program storage. Functions, blocks and instructions
//! only ever reference each other by integer index — never by pointer —
//! which is what lets an `IrProgram` be handed across threads for lowering
//! and lets lowering cache results keyed by a plain index.

use std::any::Any;

use once_cell::sync::OnceCell;

use core_types::{Arena, Type};

use crate::opcode::Opcode;
use crate::reference::Reference;

macro_rules! index_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

index_type!(FunctionId);
index_type!(BlockId);
index_type!(ConstId);
index_type!(ExternId);
index_type!(SharedObjectId);

/// One instruction operand. `Block` is only ever valid as a jump target;
/// `NumericKind` only ever appears as the discriminator consumed by `cast`.
#[derive(Debug, Clone, Copy)]
pub enum InstrArg {
    None,
    Ref(Reference),
    Block(BlockId),
    NumericKind(core_types::NumericKind),
    /// A direct callee for `call`: a sibling native IR function, named by
    /// index rather than through the general reference model, since a
    /// native call needs no address — only the callee's already-lowered (or
    /// lowerable) bytecode.
    Function(FunctionId),
}

#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: Opcode,
    pub args: [InstrArg; 3],
}

pub struct Block {
    pub name: String,
    pub instrs: Vec<usize>,
}

/// An external symbol: a named value or procedure resolved, lazily, from a
/// shared object at lowering time.
pub struct ExternSym {
    pub name: String,
    pub shared_object: SharedObjectId,
    pub ty: &'static Type,
}

pub struct ConstRecord {
    pub ty: &'static Type,
    pub data_ptr: *const u8,
}

pub struct Function {
    pub name: String,
    pub ty: &'static Type,
    pub blocks: Vec<BlockId>,
    pub locals: Vec<&'static Type>,
    /// Set by `core_vm::lower` the first time this function is lowered;
    /// type-erased here so `core-ir` does not depend on `core-vm`.
    pub lowered: OnceCell<Box<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub struct IrProgram {
    arena: Arena,
    functions: Vec<Function>,
    blocks: Vec<Block>,
    instructions: Vec<Instruction>,
    globals: Vec<&'static Type>,
    consts: Vec<ConstRecord>,
    shared_objects: Vec<String>,
    externs: Vec<ExternSym>,
}

impl IrProgram {
    pub fn new() -> Self {
        IrProgram::default()
    }

    pub fn push_function(&mut self, name: impl Into<String>, ty: &'static Type) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.into(),
            ty,
            blocks: Vec::new(),
            locals: Vec::new(),
            lowered: OnceCell::new(),
        });
        id
    }

    pub fn push_block(&mut self, function: FunctionId, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.into(),
            instrs: Vec::new(),
        });
        self.functions[function.index()].blocks.push(id);
        id
    }

    pub fn push_instruction(&mut self, block: BlockId, instr: Instruction) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(instr);
        self.blocks[block.index()].instrs.push(idx);
        idx
    }

    pub fn add_local(&mut self, function: FunctionId, ty: &'static Type) -> u32 {
        let f = &mut self.functions[function.index()];
        let idx = f.locals.len() as u32;
        f.locals.push(ty);
        idx
    }

    pub fn add_global(&mut self, ty: &'static Type) -> u32 {
        let idx = self.globals.len() as u32;
        self.globals.push(ty);
        idx
    }

    pub fn add_const(&mut self, ty: &'static Type, bytes: &[u8]) -> ConstId {
        assert_eq!(bytes.len(), ty.size, "constant bytes do not match type size");
        let data_ptr = self.arena.alloc_bytes(bytes);
        let id = ConstId(self.consts.len() as u32);
        self.consts.push(ConstRecord { ty, data_ptr });
        id
    }

    pub fn add_shared_object(&mut self, name: impl Into<String>) -> SharedObjectId {
        let name = name.into();
        if let Some(pos) = self.shared_objects.iter().position(|n| *n == name) {
            return SharedObjectId(pos as u32);
        }
        let id = SharedObjectId(self.shared_objects.len() as u32);
        self.shared_objects.push(name);
        id
    }

    pub fn add_extern(
        &mut self,
        name: impl Into<String>,
        shared_object: SharedObjectId,
        ty: &'static Type,
    ) -> ExternId {
        let id = ExternId(self.externs.len() as u32);
        self.externs.push(ExternSym {
            name: name.into(),
            shared_object,
            ty,
        });
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn instruction(&self, idx: usize) -> &Instruction {
        &self.instructions[idx]
    }

    pub fn global_ty(&self, idx: u32) -> &'static Type {
        self.globals[idx as usize]
    }

    pub fn const_record(&self, id: ConstId) -> &ConstRecord {
        &self.consts[id.index()]
    }

    pub fn shared_object_name(&self, id: SharedObjectId) -> &str {
        &self.shared_objects[id.index()]
    }

    pub fn extern_sym(&self, id: ExternId) -> &ExternSym {
        &self.externs[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }
}
