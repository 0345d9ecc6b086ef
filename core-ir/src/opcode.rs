//! The IR-level opcode set. The IR itself is type-uniform; opcode
//! specialization by operand width and numeric kind happens only during
//! bytecode lowering (`core-vm`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Opcode {
    Nop,
    Ret,
    Jmp,
    Jmpz,
    Jmpnz,
    Enter,
    Leave,
    Call,
    Mov,
    Lea,
    Neg,
    Compl,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    Xor,
    Lsh,
    Rsh,
    And,
    Or,
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
    Cast,
}

impl Opcode {
    /// Opcodes that end a block's control flow. The builder does not verify
    /// every path reaches one of these, but lowering assumes it has.
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Jmp | Opcode::Jmpz | Opcode::Jmpnz)
    }
}
