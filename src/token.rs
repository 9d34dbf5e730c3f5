use serde::{Deserialize, Serialize};

use crate::bytecode::op::Instruction;

/// Where a token starts in its source file. `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Location {
            file: file.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.file, self.line, self.column
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `:name:` marks the address of the next instruction.
    LabelDef(String),

    /// `@name` pushes the address of a label.
    LabelRef(String),

    Instr(Instruction),
}

impl Token {
    /// Returns true if this token occupies an address once resolved.
    pub fn occupies_address(&self) -> bool {
        matches!(self, Token::LabelRef(_) | Token::Instr(_))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LabelDef(name) => write!(f, ":{}:", name),
            Token::LabelRef(name) => write!(f, "@{}", name),
            Token::Instr(inst) => write!(f, "{}", inst),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub location: Location,
}

impl Spanned {
    pub fn new(token: Token, location: Location) -> Self {
        Spanned { token, location }
    }
}
