use thiserror::Error;

use crate::bytecode::op::{Instruction, Opcode};
use crate::token::{Location, Spanned, Token};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} in {location}")]
pub struct LexerError {
    pub message: String,
    pub location: Location,
}

pub struct Lexer {
    file: String,
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    /// `file` only names the source in locations; nothing is read from disk.
    pub fn new(file: impl Into<String>, source: &str) -> Self {
        Lexer {
            file: file.into(),
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn location(&self) -> Location {
        Location::new(self.file.clone(), self.line, self.col)
    }

    fn error_here(&self, message: impl Into<String>) -> LexerError {
        LexerError {
            message: message.into(),
            location: self.location(),
        }
    }

    /// Skips whitespace and `#` comments.
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '#' => {
                    while let Some(c) = self.advance() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphabetic() {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn read_label_name(&mut self) -> Result<String, LexerError> {
        let name = self.read_word();
        if name.is_empty() {
            return Err(self.error_here("expected a label name"));
        }
        Ok(name)
    }

    /// `:name:`
    fn read_label_def(&mut self) -> Result<Token, LexerError> {
        self.advance(); // ':'
        let name = self.read_label_name()?;

        if self.current() != Some(':') {
            return Err(self.error_here("expected ':'"));
        }
        self.advance();

        Ok(Token::LabelDef(name))
    }

    /// `@name`
    fn read_label_ref(&mut self) -> Result<Token, LexerError> {
        self.advance(); // '@'
        let name = self.read_label_name()?;
        Ok(Token::LabelRef(name))
    }

    fn read_number(&mut self, start: &Location) -> Result<Token, LexerError> {
        let is_negative = self.current() == Some('-');
        if is_negative {
            self.advance();
        }

        if !self.current().is_some_and(|c| c.is_ascii_digit()) {
            return Err(self.error_here("expected a digit (0-9)"));
        }

        let mut digits = String::new();
        if is_negative {
            digits.push('-');
        }
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let value: i64 = digits.parse().map_err(|_| LexerError {
            message: format!("integer literal out of range: {}", digits),
            location: start.clone(),
        })?;

        Ok(Token::Instr(Instruction::PushInt(value)))
    }

    fn read_command(&mut self, start: &Location) -> Result<Token, LexerError> {
        let word = self.read_word();

        match Opcode::from_mnemonic(&word) {
            Some(op) => Ok(Token::Instr(Instruction::Op(op))),
            None => Err(LexerError {
                message: format!("unexpected command '{}'", word),
                location: start.clone(),
            }),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let location = self.location();

            let token = match self.current() {
                None => break,
                Some(':') => self.read_label_def()?,
                Some('@') => self.read_label_ref()?,
                Some(ch) if ch == '-' || ch.is_ascii_digit() => self.read_number(&location)?,
                Some(ch) if ch.is_ascii_alphabetic() => self.read_command(&location)?,
                Some(ch) => {
                    return Err(self.error_here(format!("unexpected character '{}'", ch)));
                }
            };

            tokens.push(Spanned { token, location });
        }

        Ok(tokens)
    }
}
