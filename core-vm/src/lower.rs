//! Bytecode lowering: translates one IR function into a [`BcFunction`],
//! resolving external symbols and materializing globals along the way.
//! Idempotent — a function already lowered returns its cached result — and
//! functions reachable through `call` are lowered transitively.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use core_ir::{BlockId, FunctionId, InstrArg, IrProgram, Reference, RefKind};
use core_types::ty::{NumericKind, Typeclass};
use core_types::Type;

use crate::error::{LowerError, LowerResult};
use crate::program::BcProgram;

/// Which base pointer (or absolute-address convention) a [`BcRef`] resolves
/// against. Order matches the interpreter's base-pointer array exactly;
/// reordering this enum without updating [`crate::interp::InterpContext`]
/// would silently corrupt every resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BcKind {
    None,
    Frame,
    Arg,
    Ret,
    Reg,
    /// Absolute address of an interned constant.
    Rodata,
    /// Absolute address of a lazily-materialized global.
    Data,
    /// Index into the owning function's instruction array (jump target).
    Instr,
}

/// `(offset, post_offset, type, bc_kind, is_indirect)`.
#[derive(Debug, Clone, Copy)]
pub struct BcRef {
    pub offset: i64,
    pub post_offset: i64,
    pub ty: &'static Type,
    pub kind: BcKind,
    pub is_indirect: bool,
}

impl BcRef {
    pub fn none() -> BcRef {
        BcRef {
            offset: 0,
            post_offset: 0,
            ty: core_types::ty::INTERNER.get_void(),
            kind: BcKind::None,
            is_indirect: false,
        }
    }
}

/// Bit width used by `mov`/`jmpz`/`jmpnz`/`eq`/`ne` specialization for
/// scalar operands whose size is a power of two no larger than a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    fn from_size(size: usize) -> Option<Width> {
        match size {
            1 => Some(Width::W8),
            2 => Some(Width::W16),
            4 => Some(Width::W32),
            8 => Some(Width::W64),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }
}

/// The specialized opcode. Lowering picks one of these per IR instruction;
/// the numeric-kind/width payload on a variant *is* the specialization the
/// distilled opcode names describe (`add_i64`, `mov_32`, `cast_f64_i32`,
/// ...), expressed as enum payload instead of one identifier per
/// combination — the same information, carried the way a Rust sum type
/// carries it rather than as a generated symbol table.
#[derive(Debug, Clone, Copy)]
pub enum BcOp {
    Nop,
    Ret,
    Jmp,
    Jmpz(Width),
    Jmpnz(Width),
    Enter,
    Leave,
    /// Calls a function already known, at lowering time, to be native IR.
    /// Resolved lazily (and cached) at the first `call_jmp` to this callee;
    /// see [`lower_function`].
    CallJmp(FunctionId),
    /// Calls through the FFI trampoline; the callee address lives in the
    /// instruction's second operand (a resolved `Rodata` reference).
    Call,
    Mov(Width),
    MovBytes,
    Lea,
    Neg(NumericKind),
    Compl(NumericKind),
    Not,
    Add(NumericKind),
    Sub(NumericKind),
    Mul(NumericKind),
    Div(NumericKind),
    Mod(NumericKind),
    BitAnd(NumericKind),
    BitOr(NumericKind),
    Xor(NumericKind),
    Lsh(NumericKind),
    Rsh(NumericKind),
    And,
    Or,
    Eq(Width),
    Ne(Width),
    Ge(NumericKind),
    Gt(NumericKind),
    Le(NumericKind),
    Lt(NumericKind),
    Cast { dst: NumericKind, src: NumericKind },
}

#[derive(Debug, Clone, Copy)]
pub struct BcInstr {
    pub op: BcOp,
    pub args: [BcRef; 3],
}

pub struct BcFunction {
    pub name: String,
    pub instrs: Vec<BcInstr>,
    pub frame_size: usize,
    pub frame_align: usize,
    pub arg_ty: &'static Type,
    pub ret_ty: &'static Type,
    pub function_id: FunctionId,
}

impl BcFunction {
    /// A human-readable dump of the lowered instruction stream, in the
    /// spirit of the original's bytecode disassembly — useful to an
    /// embedder for debugging without this crate owning a CLI.
    pub fn fmt_disassembly(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        writeln!(
            out,
            "function {} ({} bytes frame, align {})",
            self.name, self.frame_size, self.frame_align
        )
        .unwrap();
        for (i, instr) in self.instrs.iter().enumerate() {
            writeln!(out, "  {i:>4}: {:?} {:?}", instr.op, instr.args).unwrap();
        }
        out
    }
}

struct Relocation {
    instr_index: usize,
    arg_slot: usize,
    target: BlockId,
}

/// Lower `function_id`, or return the cached result if it was already
/// lowered. Transitively lowers any native-IR callee discovered along the
/// way.
pub fn lower_function(
    program: &IrProgram,
    bc: &BcProgram,
    function_id: FunctionId,
) -> LowerResult<Arc<BcFunction>> {
    let function = program.function(function_id);
    let cached = function
        .lowered
        .get_or_try_init(|| -> LowerResult<Box<dyn Any + Send + Sync>> {
            let lowered = lower_function_uncached(program, bc, function_id)?;
            Ok(Box::new(lowered))
        })?;
    Ok(Arc::clone(
        cached
            .downcast_ref::<Arc<BcFunction>>()
            .expect("lowered cache holds the wrong type"),
    ))
}

fn lower_function_uncached(
    program: &IrProgram,
    bc: &BcProgram,
    function_id: FunctionId,
) -> LowerResult<Arc<BcFunction>> {
    let function = program.function(function_id);
    tracing::debug!(function = function_id.0, name = %function.name, "lowering function");

    let (arg_types, ret_ty) = match &function.ty.class {
        Typeclass::Procedure { args, ret, .. } => (args.clone(), *ret),
        _ => panic!("function type is not a procedure"),
    };
    let arg_ty = core_types::ty::INTERNER.get_tuple(&arg_types);

    let arg_offsets = offsets_of(&arg_types);
    let local_offsets = offsets_of(&function.locals);

    let mut instrs: Vec<BcInstr> = Vec::new();
    let mut block_start: HashMap<BlockId, usize> = HashMap::new();
    let mut relocations: Vec<Relocation> = Vec::new();

    for &block_id in &function.blocks {
        block_start.insert(block_id, instrs.len());
        let block = program.block(block_id);
        for &instr_idx in &block.instrs {
            let ir_instr = program.instruction(instr_idx);
            let bc_instr_idx = instrs.len();
            let mut args = [BcRef::none(); 3];
            let mut callee_function: Option<FunctionId> = None;
            for (slot, arg) in ir_instr.args.iter().enumerate() {
                match arg {
                    InstrArg::None => {}
                    InstrArg::Ref(r) => {
                        args[slot] = translate_ref(program, bc, &local_offsets, &arg_offsets, r)?;
                    }
                    InstrArg::Block(target) => {
                        relocations.push(Relocation {
                            instr_index: bc_instr_idx,
                            arg_slot: slot,
                            target: *target,
                        });
                        args[slot] = BcRef {
                            kind: BcKind::Instr,
                            ..BcRef::none()
                        };
                    }
                    InstrArg::NumericKind(_) => {}
                    InstrArg::Function(callee) => callee_function = Some(*callee),
                }
            }

            let op = specialize(ir_instr, &args, callee_function);
            instrs.push(BcInstr { op, args });
        }
    }

    for reloc in &relocations {
        let target_idx = *block_start
            .get(&reloc.target)
            .ok_or(LowerError::DanglingRelocation(reloc.target))?;
        instrs[reloc.instr_index].args[reloc.arg_slot].offset = target_idx as i64;
    }

    let frame_layout = core_types::layout_fields(
        &function
            .locals
            .iter()
            .map(|t| (t.size, t.align, 1))
            .collect::<Vec<_>>(),
    );

    let lowered = Arc::new(BcFunction {
        name: function.name.clone(),
        instrs,
        frame_size: frame_layout.size,
        frame_align: frame_layout.align,
        arg_ty,
        ret_ty,
        function_id,
    });

    Ok(lowered)
}

/// Byte offset of each element in a flat, densely packed sequence of types
/// (used for both the frame's locals and the argument tuple — the same
/// layout rule as `core_types::layout_fields`, specialized to `count == 1`).
fn offsets_of(types: &[&'static Type]) -> Vec<i64> {
    let fields: Vec<(usize, usize, usize)> = types.iter().map(|t| (t.size, t.align, 1)).collect();
    core_types::layout_fields(&fields)
        .fields
        .into_iter()
        .map(|f| f.offset as i64)
        .collect()
}

fn translate_ref(
    program: &IrProgram,
    bc: &BcProgram,
    local_offsets: &[i64],
    arg_offsets: &[i64],
    r: &Reference,
) -> LowerResult<BcRef> {
    let (kind, offset) = match r.kind {
        RefKind::None => (BcKind::None, 0),
        RefKind::Frame => (BcKind::Frame, local_offsets[r.index as usize]),
        RefKind::Arg => (BcKind::Arg, arg_offsets[r.index as usize]),
        RefKind::Ret => (BcKind::Ret, 0),
        RefKind::Reg => (BcKind::Reg, (r.index as i64) * core_types::WORD_SIZE as i64),
        RefKind::Global => {
            let ptr = bc.materialize_global(program, r.index);
            (BcKind::Data, ptr as i64)
        }
        RefKind::Const => {
            let rec = program.const_record(core_ir::ConstId(r.index));
            (BcKind::Rodata, rec.data_ptr as i64)
        }
        RefKind::ExtSym => {
            let ptr = bc.resolve_extern(program, core_ir::ExternId(r.index))?;
            (BcKind::Rodata, ptr as i64)
        }
    };
    Ok(BcRef {
        offset: offset + r.offset,
        post_offset: r.post_offset,
        ty: r.ty,
        kind,
        is_indirect: r.is_indirect,
    })
}

fn specialize(
    instr: &core_ir::program::Instruction,
    args: &[BcRef; 3],
    callee_function: Option<FunctionId>,
) -> BcOp {
    use core_ir::Opcode as O;
    let numeric_kind_of = |ty: &Type| match ty.class {
        Typeclass::Numeric(k) => Some(k),
        Typeclass::Pointer(_) | Typeclass::Typeref => Some(NumericKind::U64),
        _ => None,
    };
    let width_of = |ty: &Type| Width::from_size(ty.size);

    match instr.opcode {
        O::Nop => BcOp::Nop,
        O::Ret => BcOp::Ret,
        O::Jmp => BcOp::Jmp,
        O::Jmpz => BcOp::Jmpz(width_of(args[1].ty).unwrap_or(Width::W64)),
        O::Jmpnz => BcOp::Jmpnz(width_of(args[1].ty).unwrap_or(Width::W64)),
        O::Enter => BcOp::Enter,
        O::Leave => BcOp::Leave,
        O::Call => match callee_function {
            Some(callee) => BcOp::CallJmp(callee),
            None => BcOp::Call,
        },
        O::Mov => match width_of(args[0].ty) {
            Some(w) => BcOp::Mov(w),
            None => BcOp::MovBytes,
        },
        O::Lea => BcOp::Lea,
        O::Neg => BcOp::Neg(numeric_kind_of(args[0].ty).expect("neg on non-numeric")),
        O::Compl => BcOp::Compl(numeric_kind_of(args[0].ty).expect("compl on non-numeric")),
        O::Not => BcOp::Not,
        O::Add => BcOp::Add(numeric_kind_of(args[0].ty).expect("add on non-numeric")),
        O::Sub => BcOp::Sub(numeric_kind_of(args[0].ty).expect("sub on non-numeric")),
        O::Mul => BcOp::Mul(numeric_kind_of(args[0].ty).expect("mul on non-numeric")),
        O::Div => BcOp::Div(numeric_kind_of(args[0].ty).expect("div on non-numeric")),
        O::Mod => BcOp::Mod(numeric_kind_of(args[0].ty).expect("mod on non-numeric")),
        O::BitAnd => BcOp::BitAnd(numeric_kind_of(args[0].ty).expect("bitand on non-numeric")),
        O::BitOr => BcOp::BitOr(numeric_kind_of(args[0].ty).expect("bitor on non-numeric")),
        O::Xor => BcOp::Xor(numeric_kind_of(args[0].ty).expect("xor on non-numeric")),
        O::Lsh => BcOp::Lsh(numeric_kind_of(args[0].ty).expect("lsh on non-numeric")),
        O::Rsh => BcOp::Rsh(numeric_kind_of(args[0].ty).expect("rsh on non-numeric")),
        O::And => BcOp::And,
        O::Or => BcOp::Or,
        O::Eq => BcOp::Eq(width_of(args[1].ty).unwrap_or(Width::W64)),
        O::Ne => BcOp::Ne(width_of(args[1].ty).unwrap_or(Width::W64)),
        O::Ge => BcOp::Ge(numeric_kind_of(args[1].ty).expect("ge on non-numeric")),
        O::Gt => BcOp::Gt(numeric_kind_of(args[1].ty).expect("gt on non-numeric")),
        O::Le => BcOp::Le(numeric_kind_of(args[1].ty).expect("le on non-numeric")),
        O::Lt => BcOp::Lt(numeric_kind_of(args[1].ty).expect("lt on non-numeric")),
        O::Cast => BcOp::Cast {
            dst: numeric_kind_of(args[0].ty).expect("cast dst non-numeric"),
            src: numeric_kind_of(args[1].ty).expect("cast src non-numeric"),
        },
    }
}
