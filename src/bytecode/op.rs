use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - the fixed instruction set
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // jumps, target address on top of the stack
    Jmp,
    Jeq,
    Jnq,
    Jgt,
    Jlt,

    // random access, index counted from the bottom of the stack
    Get,
    Set,

    // stack ops
    Dup,
    Pop,
    Ppos,
    Size,
    Swap,
    Dbg,

    // I/O
    Print,
    Cprint,
    Read,
    Cread,
}

impl Opcode {
    pub const ALL: [Opcode; 21] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Jmp,
        Opcode::Jeq,
        Opcode::Jnq,
        Opcode::Jgt,
        Opcode::Jlt,
        Opcode::Get,
        Opcode::Set,
        Opcode::Dup,
        Opcode::Pop,
        Opcode::Ppos,
        Opcode::Size,
        Opcode::Swap,
        Opcode::Dbg,
        Opcode::Print,
        Opcode::Cprint,
        Opcode::Read,
        Opcode::Cread,
    ];

    /// Source spelling of the opcode.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Jmp => "jmp",
            Opcode::Jeq => "jeq",
            Opcode::Jnq => "jnq",
            Opcode::Jgt => "jgt",
            Opcode::Jlt => "jlt",
            Opcode::Get => "get",
            Opcode::Set => "set",
            Opcode::Dup => "dup",
            Opcode::Pop => "pop",
            Opcode::Ppos => "ppos",
            Opcode::Size => "size",
            Opcode::Swap => "swap",
            Opcode::Dbg => "dbg",
            Opcode::Print => "print",
            Opcode::Cprint => "cprint",
            Opcode::Read => "read",
            Opcode::Cread => "cread",
        }
    }

    pub fn from_mnemonic(word: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.mnemonic() == word)
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jeq | Opcode::Jnq | Opcode::Jgt | Opcode::Jlt
        )
    }

    /// Returns (pops, pushes) for the opcode.
    pub fn effect(self) -> (usize, usize) {
        use Opcode::*;
        match self {
            Add | Sub | Mul | Div => (2, 1),

            Jmp => (1, 0),
            Jeq | Jnq | Jgt | Jlt => (3, 0),

            Get => (1, 1),
            Set => (2, 0),

            Dup => (1, 2),
            Pop => (1, 0),
            Ppos | Size => (0, 1),
            Swap => (2, 2),
            Dbg => (0, 0),

            Print | Cprint => (1, 0),
            Read | Cread => (0, 1),
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// =============================================================================
// INSTRUCTION - what a resolved program is made of
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    PushInt(i64),
    Op(Opcode),
}

impl Instruction {
    pub fn effect(self) -> (usize, usize) {
        match self {
            Instruction::PushInt(_) => (0, 1),
            Instruction::Op(op) => op.effect(),
        }
    }
}

impl From<Opcode> for Instruction {
    fn from(op: Opcode) -> Self {
        Instruction::Op(op)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::PushInt(n) => write!(f, "{}", n),
            Instruction::Op(op) => write!(f, "{}", op),
        }
    }
}
