//! The bytecode interpreter: a straightforward switch-dispatch loop over
//! one function's [`BcInstr`] stream at a time, threading frame/argument/
//! return/register base pointers through a thread-local [`InterpContext`].
//!
//! Calls into a sibling native function push a [`ControlFrame`] and switch
//! the dispatch loop to the callee's instruction stream in place, rather
//! than recursing through Rust's call stack — `call_jmp` is a loop
//! continuation, not a function call. Calls through the FFI trampoline are
//! a single synchronous step (libffi owns the native call stack for that
//! frame) and do not touch the control stack at all.

use std::cell::RefCell;
use std::sync::Arc;

use core_ir::{FunctionId, IrProgram};
use core_types::ty::Typeclass;
use core_types::Value;

use crate::error::{RuntimeError, RuntimeResult};
use crate::ffi;
use crate::lower::{self, BcFunction, BcKind, BcOp, BcRef, Width};
use crate::numops::{self, NumOps};
use crate::program::BcProgram;

/// Fixed-capacity bump allocator backing the call stack. Addresses handed
/// out remain valid for as long as nothing unwinds past the mark they were
/// allocated under, so the backing storage is allocated once and never
/// moved; growth is therefore "none" rather than chunked, trading the
/// unbounded depth a chunked allocator would give for pointer stability
/// with no reallocation bookkeeping on every push.
struct StackAllocator {
    storage: Box<[u8]>,
    top: usize,
}

impl StackAllocator {
    fn new(capacity: usize) -> Self {
        StackAllocator {
            storage: vec![0u8; capacity].into_boxed_slice(),
            top: 0,
        }
    }

    fn mark(&self) -> usize {
        self.top
    }

    fn reset_to(&mut self, mark: usize) {
        self.top = mark;
    }

    fn is_empty(&self) -> bool {
        self.top == 0
    }

    fn alloc(&mut self, size: usize, align: usize) -> *mut u8 {
        let base = (self.top + align - 1) & !(align - 1);
        let end = base.checked_add(size).expect("stack allocator size overflow");
        if end > self.storage.len() {
            panic!("call stack exhausted (capacity {} bytes)", self.storage.len());
        }
        self.top = end;
        unsafe { self.storage.as_mut_ptr().add(base) }
    }
}

/// One saved caller activation. `callee` is `None` only for the sentinel
/// frame `invoke` pushes for the outermost call, whose `ret`/`leave` ends
/// the dispatch loop instead of resuming a caller.
struct ControlFrame {
    caller: Option<CallerState>,
    stack_mark: usize,
}

struct CallerState {
    func: Arc<BcFunction>,
    pc: usize,
    base_frame: *mut u8,
    base_arg: *mut u8,
    base_ret: *mut u8,
}

/// Per-thread interpreter state: the call stack, the control stack of
/// saved caller activations, and the six scratch registers `Reg` refs
/// address. Lazily created on first use and reused by re-entrant `invoke`
/// calls on the same thread (a nested call simply continues the bump
/// allocator from wherever the outer call's frame left it).
pub struct InterpContext {
    stack: StackAllocator,
    control: Vec<ControlFrame>,
    scopes: Vec<usize>,
    regs: [u8; 48],
    /// Set while an outermost `invoke` is active on this thread; cleared on
    /// its matching outermost return, at which point the call stack and
    /// control stack must both be empty again.
    is_initialized: bool,
}

const DEFAULT_STACK_CAPACITY: usize = 1 << 20;

impl InterpContext {
    fn new() -> Self {
        InterpContext {
            stack: StackAllocator::new(DEFAULT_STACK_CAPACITY),
            control: Vec::new(),
            scopes: Vec::new(),
            regs: [0u8; 48],
            is_initialized: false,
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<InterpContext> = RefCell::new(InterpContext::new());
}

/// Resolve a [`BcRef`] to the address it currently denotes, given the
/// active frame/arg/ret/reg base pointers.
unsafe fn addr_of(ctx: &mut InterpContext, bases: &CallerState, r: &BcRef) -> *mut u8 {
    let base: *mut u8 = match r.kind {
        BcKind::None => std::ptr::null_mut(),
        BcKind::Frame => bases.base_frame,
        BcKind::Arg => bases.base_arg,
        BcKind::Ret => bases.base_ret,
        BcKind::Reg => ctx.regs.as_mut_ptr(),
        // Rodata/Data/Instr offsets are absolute addresses (or, for
        // Instr, an instruction index rather than an address at all;
        // callers never resolve Instr refs through `addr_of`).
        BcKind::Rodata | BcKind::Data | BcKind::Instr => std::ptr::null_mut(),
    };
    let mut p = base.wrapping_offset(r.offset as isize);
    if r.is_indirect {
        p = unsafe { *(p as *mut *mut u8) };
    }
    unsafe { p.offset(r.post_offset as isize) }
}

fn read_bool(p: *const u8) -> bool {
    unsafe { *p != 0 }
}

fn write_bool(p: *mut u8, v: bool) {
    unsafe { *p = v as u8 };
}

macro_rules! numeric_binop {
    ($kind:expr, $dst:expr, $a:expr, $b:expr, |$x:ident, $y:ident| $expr:expr) => {
        match $kind {
            core_types::ty::NumericKind::I8 => {
                let $x: i8 = unsafe { numops::read($a) };
                let $y: i8 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::I16 => {
                let $x: i16 = unsafe { numops::read($a) };
                let $y: i16 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::I32 => {
                let $x: i32 = unsafe { numops::read($a) };
                let $y: i32 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::I64 => {
                let $x: i64 = unsafe { numops::read($a) };
                let $y: i64 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U8 => {
                let $x: u8 = unsafe { numops::read($a) };
                let $y: u8 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U16 => {
                let $x: u16 = unsafe { numops::read($a) };
                let $y: u16 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U32 => {
                let $x: u32 = unsafe { numops::read($a) };
                let $y: u32 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U64 => {
                let $x: u64 = unsafe { numops::read($a) };
                let $y: u64 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::F32 => {
                let $x: f32 = unsafe { numops::read($a) };
                let $y: f32 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::F64 => {
                let $x: f64 = unsafe { numops::read($a) };
                let $y: f64 = unsafe { numops::read($b) };
                unsafe { numops::write($dst, $expr) };
            }
        }
    };
}

macro_rules! numeric_cmp {
    ($kind:expr, $dst:expr, $a:expr, $b:expr, |$x:ident, $y:ident| $expr:expr) => {
        numeric_binop!($kind, $dst, $a, $b, |$x, $y| $expr as u8)
    };
}

macro_rules! numeric_unop {
    ($kind:expr, $dst:expr, $a:expr, |$x:ident| $expr:expr) => {
        match $kind {
            core_types::ty::NumericKind::I8 => {
                let $x: i8 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::I16 => {
                let $x: i16 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::I32 => {
                let $x: i32 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::I64 => {
                let $x: i64 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U8 => {
                let $x: u8 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U16 => {
                let $x: u16 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U32 => {
                let $x: u32 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::U64 => {
                let $x: u64 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::F32 => {
                let $x: f32 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
            core_types::ty::NumericKind::F64 => {
                let $x: f64 = unsafe { numops::read($a) };
                unsafe { numops::write($dst, $expr) };
            }
        }
    };
}

fn read_width_as_u64(p: *const u8, w: Width) -> u64 {
    unsafe {
        match w {
            Width::W8 => numops::read::<u8>(p) as u64,
            Width::W16 => numops::read::<u16>(p) as u64,
            Width::W32 => numops::read::<u32>(p) as u64,
            Width::W64 => numops::read::<u64>(p),
        }
    }
}

fn copy_width(dst: *mut u8, src: *const u8, w: Width) {
    unsafe {
        std::ptr::copy_nonoverlapping(src, dst, w.bytes());
    }
}

/// Run `func` to completion starting at instruction 0, using `caller` as
/// the active frame/arg/ret bases, and returning once its `ret` pops the
/// control frame this call pushed. All nested `call_jmp`s are handled
/// in-loop; this only recurses through Rust's stack for foreign calls
/// (which libffi itself may recurse through) and is otherwise iterative.
fn run(
    ctx_cell: &RefCell<InterpContext>,
    program: &IrProgram,
    bc: &BcProgram,
    mut func: Arc<BcFunction>,
    mut bases: CallerState,
    control_floor: usize,
) -> RuntimeResult<()> {
    let mut pc = 0usize;
    loop {
        let instr = func.instrs[pc];
        let mut ctx = ctx_cell.borrow_mut();
        match instr.op {
            BcOp::Nop => {}
            BcOp::Jmp => {
                let target = instr.args[0].offset as usize;
                drop(ctx);
                pc = target;
                continue;
            }
            BcOp::Jmpz(w) | BcOp::Jmpnz(w) => {
                let cond_addr = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let v = read_width_as_u64(cond_addr, w);
                let target = instr.args[0].offset as usize;
                let take = matches!(instr.op, BcOp::Jmpz(_)) == (v == 0);
                drop(ctx);
                if take {
                    pc = target;
                    continue;
                }
            }
            BcOp::Enter => {
                let mark = ctx.stack.mark();
                ctx.scopes.push(mark);
            }
            BcOp::Leave => {
                let mark = ctx.scopes.pop().expect("leave without matching enter");
                ctx.stack.reset_to(mark);
            }
            BcOp::Ret => {
                let frame = ctx.control.pop().expect("ret without an active control frame");
                ctx.stack.reset_to(frame.stack_mark);
                match frame.caller {
                    None => {
                        if ctx.control.is_empty() {
                            assert!(
                                ctx.stack.is_empty(),
                                "call stack allocator not empty at outermost return"
                            );
                            ctx.is_initialized = false;
                        }
                        return Ok(());
                    }
                    Some(caller) => {
                        func = caller.func;
                        pc = caller.pc;
                        bases = CallerState {
                            func: Arc::clone(&func),
                            pc,
                            base_frame: caller.base_frame,
                            base_arg: caller.base_arg,
                            base_ret: caller.base_ret,
                        };
                        if ctx.control.len() < control_floor {
                            return Ok(());
                        }
                        drop(ctx);
                        continue;
                    }
                }
            }
            BcOp::CallJmp(callee_id) => {
                let ret_addr = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let args_addr = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                drop(ctx);
                let callee = lower::lower_function(program, bc, callee_id).map_err(RuntimeError::Lower)?;
                let frame_ptr = {
                    let mut ctx = ctx_cell.borrow_mut();
                    let mark = ctx.stack.mark();
                    ctx.control.push(ControlFrame {
                        caller: Some(CallerState {
                            func: Arc::clone(&func),
                            pc: pc + 1,
                            base_frame: bases.base_frame,
                            base_arg: bases.base_arg,
                            base_ret: bases.base_ret,
                        }),
                        stack_mark: mark,
                    });
                    ctx.stack.alloc(callee.frame_size.max(1), callee.frame_align.max(1))
                };
                bases = CallerState {
                    func: Arc::clone(&callee),
                    pc: 0,
                    base_frame: frame_ptr,
                    base_arg: args_addr,
                    base_ret: ret_addr,
                };
                func = callee;
                pc = 0;
                continue;
            }
            BcOp::Call => {
                let ret_addr = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let callee_addr = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let args_addr = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                let ret_ty = instr.args[0].ty;
                let proc_ty = instr.args[1].ty;
                let args_ty = instr.args[2].ty;
                drop(ctx);
                let mut ret = unsafe { Value::new(ret_addr, ret_ty) };
                let args = unsafe { Value::new(args_addr, args_ty) };
                unsafe {
                    ffi::invoke_foreign(callee_addr as *const (), proc_ty, &mut ret, &args)
                        .map_err(RuntimeError::Ffi)?;
                }
            }
            BcOp::Mov(w) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                copy_width(dst, src, w);
            }
            BcOp::MovBytes => {
                let size = instr.args[0].ty.size;
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                unsafe { std::ptr::copy_nonoverlapping(src, dst, size) };
            }
            BcOp::Lea => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                unsafe { numops::write(dst, src as usize) };
            }
            BcOp::Neg(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                numeric_unop!(k, dst, src, |x| x.w_neg());
            }
            BcOp::Compl(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                numeric_unop!(k, dst, src, |x| x.bit_not());
            }
            BcOp::Not => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                write_bool(dst, !read_bool(src));
            }
            BcOp::Add(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.w_add(y));
            }
            BcOp::Sub(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.w_sub(y));
            }
            BcOp::Mul(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.w_mul(y));
            }
            BcOp::Div(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.w_div(y));
            }
            BcOp::Mod(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.w_rem(y));
            }
            BcOp::BitAnd(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.bit_and(y));
            }
            BcOp::BitOr(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.bit_or(y));
            }
            BcOp::Xor(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.bit_xor(y));
            }
            BcOp::Lsh(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.shl(y));
            }
            BcOp::Rsh(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_binop!(k, dst, a, b, |x, y| x.shr(y));
            }
            BcOp::And => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                write_bool(dst, read_bool(a) && read_bool(b));
            }
            BcOp::Or => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                write_bool(dst, read_bool(a) || read_bool(b));
            }
            BcOp::Eq(w) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                write_bool(dst, read_width_as_u64(a, w) == read_width_as_u64(b, w));
            }
            BcOp::Ne(w) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                write_bool(dst, read_width_as_u64(a, w) != read_width_as_u64(b, w));
            }
            BcOp::Ge(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_cmp!(k, dst, a, b, |x, y| x.ge(y));
            }
            BcOp::Gt(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_cmp!(k, dst, a, b, |x, y| x.gt(y));
            }
            BcOp::Le(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_cmp!(k, dst, a, b, |x, y| x.le(y));
            }
            BcOp::Lt(k) => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let a = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                let b = unsafe { addr_of(&mut ctx, &bases, &instr.args[2]) };
                numeric_cmp!(k, dst, a, b, |x, y| x.lt(y));
            }
            BcOp::Cast { dst: dst_k, src: src_k } => {
                let dst = unsafe { addr_of(&mut ctx, &bases, &instr.args[0]) };
                let src = unsafe { addr_of(&mut ctx, &bases, &instr.args[1]) };
                unsafe { numops::cast(dst, dst_k, src, src_k) };
            }
        }
        pc += 1;
    }
}

/// Execute `function_id`, lazily lowering it (and, transitively, anything
/// it `call_jmp`s) on first use. `args` must hold the function's argument
/// tuple contiguously and `ret` must have room for its return type; both
/// addresses are read directly, with no marshaling, matching the IR's own
/// reference model. Re-entrant: a foreign call reached from inside this
/// invocation that calls back into the interpreter runs on the same
/// thread-local stack, continuing from wherever this call's frame left it.
pub fn invoke(
    program: &IrProgram,
    bc: &BcProgram,
    function_id: FunctionId,
    ret: &mut Value,
    args: &Value,
) -> RuntimeResult<()> {
    let func = lower::lower_function(program, bc, function_id).map_err(RuntimeError::Lower)?;
    match &program.function(function_id).ty.class {
        Typeclass::Procedure { .. } => {}
        _ => panic!("invoke: function type is not a procedure"),
    }

    CONTEXT.with(|ctx_cell| {
        let control_floor = {
            let mut ctx = ctx_cell.borrow_mut();
            if ctx.control.is_empty() {
                ctx.is_initialized = true;
            }
            let mark = ctx.stack.mark();
            ctx.control.push(ControlFrame {
                caller: None,
                stack_mark: mark,
            });
            ctx.control.len()
        };
        let bases = {
            let mut ctx = ctx_cell.borrow_mut();
            let frame_ptr = ctx.stack.alloc(func.frame_size.max(1), func.frame_align.max(1));
            CallerState {
                func: Arc::clone(&func),
                pc: 0,
                base_frame: frame_ptr,
                base_arg: args.data_ptr(),
                base_ret: ret.data_ptr(),
            }
        };
        run(ctx_cell, program, bc, func, bases, control_floor)
    })
}

/// True when this thread's interpreter context is fully unwound: no
/// invocation in progress, no saved caller activations, and no call-stack
/// space in use. Holds between every pair of top-level `invoke` calls on a
/// given thread; exposed for tests of that teardown invariant.
pub fn is_idle() -> bool {
    CONTEXT.with(|ctx_cell| {
        let ctx = ctx_cell.borrow();
        !ctx.is_initialized && ctx.control.is_empty() && ctx.stack.is_empty()
    })
}
