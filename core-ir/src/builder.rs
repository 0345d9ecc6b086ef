//! The stateful API a front end drives to emit IR: start a function, start
//! a block within it, emit instructions into the current block, repeat.

use core_types::Type;

use crate::error::BuilderError;
use crate::opcode::Opcode;
use crate::program::{BlockId, ExternId, FunctionId, Instruction, InstrArg, IrProgram, SharedObjectId};
use crate::reference::{RefKind, Reference};

pub struct Builder<'p> {
    program: &'p mut IrProgram,
    current_function: Option<FunctionId>,
    current_block: Option<BlockId>,
}

impl<'p> Builder<'p> {
    pub fn new(program: &'p mut IrProgram) -> Self {
        Builder {
            program,
            current_function: None,
            current_block: None,
        }
    }

    pub fn program(&self) -> &IrProgram {
        self.program
    }

    pub fn program_mut(&mut self) -> &mut IrProgram {
        self.program
    }

    /// Begin a function and make its entry block current.
    pub fn start_function(&mut self, name: impl Into<String>, ty: &'static Type) -> FunctionId {
        let id = self.program.push_function(name, ty);
        let entry = self.program.push_block(id, "entry");
        self.current_function = Some(id);
        self.current_block = Some(entry);
        tracing::debug!(function = id.0, "started function");
        id
    }

    /// Close the function opened by `start_function`. Panics if the last
    /// block emitted has no terminator; use [`Builder::try_finish_function`]
    /// to probe instead.
    pub fn finish_function(&mut self) {
        self.try_finish_function()
            .expect("finish_function: builder misuse");
    }

    pub fn try_finish_function(&mut self) -> Result<(), BuilderError> {
        let function = self.current_function.ok_or(BuilderError::NoOpenFunction)?;
        let block = self.current_block.ok_or(BuilderError::NoOpenBlock)?;
        let last_terminates = self
            .program
            .block(block)
            .instrs
            .last()
            .map(|&idx| self.program.instruction(idx).opcode.is_terminator())
            .unwrap_or(false);
        if !last_terminates {
            return Err(BuilderError::MissingTerminator(function));
        }
        tracing::debug!(function = function.0, "finished function");
        self.current_function = None;
        self.current_block = None;
        Ok(())
    }

    pub fn create_label(&mut self, name: impl Into<String>) -> BlockId {
        let function = self.current_function.expect("create_label outside a function");
        self.program.push_block(function, name)
    }

    pub fn start_block(&mut self, label: BlockId) {
        self.try_start_block(label).expect("start_block: builder misuse");
    }

    pub fn try_start_block(&mut self, label: BlockId) -> Result<(), BuilderError> {
        let function = self.current_function.ok_or(BuilderError::NoOpenFunction)?;
        if !self.program.function(function).blocks.contains(&label) {
            return Err(BuilderError::BlockNotInFunction(label));
        }
        self.current_block = Some(label);
        Ok(())
    }

    pub fn gen(&mut self, instr: Instruction) -> usize {
        self.try_gen(instr).expect("gen: no block is open")
    }

    pub fn try_gen(&mut self, instr: Instruction) -> Result<usize, BuilderError> {
        let block = self.current_block.ok_or(BuilderError::NoOpenBlock)?;
        Ok(self.program.push_instruction(block, instr))
    }

    pub fn make_local_var(&mut self, ty: &'static Type) -> Reference {
        let function = self.current_function.expect("make_local_var outside a function");
        let idx = self.program.add_local(function, ty);
        self.make_frame_ref(idx, ty)
    }

    pub fn make_global_var(&mut self, ty: &'static Type) -> Reference {
        let idx = self.program.add_global(ty);
        self.make_global_ref(idx, ty)
    }

    pub fn make_frame_ref(&self, local_index: u32, ty: &'static Type) -> Reference {
        Reference::new(RefKind::Frame, local_index, ty)
    }

    pub fn make_arg_ref(&self, arg_index: u32, ty: &'static Type) -> Reference {
        Reference::new(RefKind::Arg, arg_index, ty)
    }

    pub fn make_ret_ref(&self, ty: &'static Type) -> Reference {
        Reference::new(RefKind::Ret, 0, ty)
    }

    pub fn make_global_ref(&self, global_index: u32, ty: &'static Type) -> Reference {
        Reference::new(RefKind::Global, global_index, ty)
    }

    /// Build a reference to an interned constant. Named for the bytecode
    /// storage class ("rodata") it lowers to, even though at the IR level
    /// the reference's kind is `Const`.
    pub fn make_rodata_ref(&mut self, ty: &'static Type, bytes: &[u8]) -> Reference {
        let id = self.program.add_const(ty, bytes);
        Reference::new(RefKind::Const, id.0, ty)
    }

    pub fn make_reg_ref(&self, reg_id: u32, ty: &'static Type) -> Reference {
        Reference::new(RefKind::Reg, reg_id, ty)
    }

    pub fn declare_shared_object(&mut self, name: impl Into<String>) -> SharedObjectId {
        self.program.add_shared_object(name)
    }

    pub fn declare_extern_proc(
        &mut self,
        name: impl Into<String>,
        proc_ty: &'static Type,
        so: SharedObjectId,
    ) -> ExternId {
        self.program.add_extern(name, so, proc_ty)
    }

    pub fn declare_extern_data(
        &mut self,
        name: impl Into<String>,
        ty: &'static Type,
        so: SharedObjectId,
    ) -> ExternId {
        self.program.add_extern(name, so, ty)
    }

    pub fn make_extern_proc_ref(&self, id: ExternId, ty: &'static Type) -> Reference {
        Reference::new(RefKind::ExtSym, id.0, ty)
    }

    pub fn make_extern_data_ref(&self, id: ExternId, ty: &'static Type) -> Reference {
        Reference::new(RefKind::ExtSym, id.0, ty)
    }

    /// Emit a call to a sibling function defined in this same program.
    pub fn call_native(&mut self, ret: Reference, callee: FunctionId, call_args: Reference) -> usize {
        self.gen(instr3(
            Opcode::Call,
            InstrArg::Ref(ret),
            InstrArg::Function(callee),
            InstrArg::Ref(call_args),
        ))
    }

    /// Emit a call to an external (`Cdecl`) procedure reached via the FFI
    /// trampoline.
    pub fn call_foreign(&mut self, ret: Reference, callee: Reference, call_args: Reference) -> usize {
        self.gen(instr3(
            Opcode::Call,
            InstrArg::Ref(ret),
            InstrArg::Ref(callee),
            InstrArg::Ref(call_args),
        ))
    }
}

/// Convenience constructors for instructions with up to three reference
/// operands; unused slots are `InstrArg::None`.
pub fn instr0(opcode: Opcode) -> Instruction {
    Instruction {
        opcode,
        args: [InstrArg::None, InstrArg::None, InstrArg::None],
    }
}

pub fn instr1(opcode: Opcode, a: InstrArg) -> Instruction {
    Instruction {
        opcode,
        args: [a, InstrArg::None, InstrArg::None],
    }
}

pub fn instr2(opcode: Opcode, a: InstrArg, b: InstrArg) -> Instruction {
    Instruction {
        opcode,
        args: [a, b, InstrArg::None],
    }
}

pub fn instr3(opcode: Opcode, a: InstrArg, b: InstrArg, c: InstrArg) -> Instruction {
    Instruction { opcode, args: [a, b, c] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ty::{CallConv, NumericKind};
    use core_types::ty::INTERNER;

    #[test]
    fn builds_add_function_with_terminator() {
        let i64_t = INTERNER.get_numeric(NumericKind::I64);
        let args_t = INTERNER.get_tuple(&[i64_t, i64_t]);
        let fn_t = INTERNER.get_procedure(&[i64_t, i64_t], i64_t, CallConv::Native, false);
        let _ = args_t;

        let mut program = IrProgram::new();
        let mut b = Builder::new(&mut program);
        b.start_function("add", fn_t);
        let a = b.make_arg_ref(0, i64_t);
        let c = b.make_arg_ref(1, i64_t);
        let ret = b.make_ret_ref(i64_t);
        b.gen(instr3(
            Opcode::Add,
            InstrArg::Ref(ret),
            InstrArg::Ref(a),
            InstrArg::Ref(c),
        ));
        b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
        b.try_finish_function().expect("terminated function should finish");

        let (_id, f) = program.functions().next().unwrap();
        assert_eq!(f.name, "add");
        assert_eq!(f.blocks.len(), 1);
    }

    #[test]
    fn finishing_without_terminator_fails() {
        let i64_t = INTERNER.get_numeric(NumericKind::I64);
        let fn_t = INTERNER.get_procedure(&[], i64_t, CallConv::Native, false);
        let mut program = IrProgram::new();
        let mut b = Builder::new(&mut program);
        b.start_function("broken", fn_t);
        b.gen(instr0(Opcode::Nop));
        assert!(matches!(
            b.try_finish_function(),
            Err(BuilderError::MissingTerminator(_))
        ));
    }
}
