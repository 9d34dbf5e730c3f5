use std::io::{self, BufRead, Stdout, StdinLock, Write};

use tracing::{debug, trace};

use crate::bytecode::ir::{Address, Program};
use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::resolve::resolve;
use crate::bytecode::resolve_error::ResolveError;
use crate::runtime::runtime_error::RuntimeError;
use crate::token::{Location, Spanned};

#[derive(Debug, Clone, Default)]
pub struct MachineConfig {
    /// Upper bound on instructions executed by one `run`.
    pub max_steps: Option<usize>,
}

/// The stack machine.
///
/// The first program loaded fixes the base address; after that, address
/// `base + i` is the `i`-th loaded instruction. Programs are appended by
/// `load`, so a REPL can resolve each new line with `start = len()` and keep
/// the stack between lines.
pub struct Machine<R = StdinLock<'static>, W = Stdout> {
    base: Address,
    instructions: Vec<Instruction>,
    locations: Vec<Location>,
    pc: Address,
    stack: Vec<i64>,
    config: MachineConfig,
    steps: usize,
    input: R,
    output: W,
    diagnostics: Box<dyn Write>,
}

impl Machine {
    /// A machine wired to the process stdin, stdout and stderr.
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self::with_io(config, io::stdin().lock(), io::stdout())
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead, W: Write> Machine<R, W> {
    pub fn with_io(config: MachineConfig, input: R, output: W) -> Self {
        Self {
            base: 0,
            instructions: Vec::new(),
            locations: Vec::new(),
            pc: 0,
            stack: Vec::new(),
            config,
            steps: 0,
            input,
            output,
            diagnostics: Box::new(io::stderr()),
        }
    }

    /// Where `dbg` writes the stack. Defaults to stderr.
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Write>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    // Loading

    /// Appends a resolved program after the instructions already loaded.
    ///
    /// An empty machine takes the program's start as its base address and
    /// program counter. Otherwise the program must start at `len()`; the stack
    /// and program counter are left alone.
    pub fn load(&mut self, program: Program) -> Result<(), RuntimeError> {
        if program.end().is_none() {
            return Err(RuntimeError::AddressOverflow {
                start: program.start,
                len: program.len(),
            });
        }
        if self.is_empty() {
            self.base = program.start;
            self.pc = program.start;
        } else if program.start != self.len() {
            return Err(RuntimeError::AddressMismatch {
                start: program.start,
                expected: self.len(),
            });
        }
        self.append(program);
        Ok(())
    }

    /// Resolves `tokens` at the next free address and loads them.
    pub fn load_tokens(&mut self, tokens: &[Spanned]) -> Result<(), ResolveError> {
        let program = resolve(tokens, self.len())?;
        self.append(program);
        Ok(())
    }

    fn append(&mut self, program: Program) {
        debug!(
            start = program.start,
            instructions = program.len(),
            total = self.instructions.len() + program.len(),
            "loaded program"
        );
        self.instructions.extend(program.instructions);
        self.locations.extend(program.locations);
    }

    /// Next free address.
    pub fn len(&self) -> Address {
        self.base + self.instructions.len() as Address
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Drops the program, the stack and the program counter.
    pub fn reset(&mut self) {
        self.instructions.clear();
        self.locations.clear();
        self.stack.clear();
        self.base = 0;
        self.pc = 0;
        self.steps = 0;
    }

    // Introspection

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn top(&self) -> Option<i64> {
        self.stack.last().copied()
    }

    pub fn pc(&self) -> Address {
        self.pc
    }

    /// Moves the program counter without executing anything.
    pub fn set_pc(&mut self, pc: Address) {
        self.pc = pc;
    }

    /// True while the program counter points at a loaded instruction.
    pub fn is_running(&self) -> bool {
        self.index_of(self.pc).is_some()
    }

    pub fn current_instruction(&self) -> Option<Instruction> {
        self.index_of(self.pc).map(|i| self.instructions[i])
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.index_of(self.pc).map(|i| &self.locations[i])
    }

    pub fn input_mut(&mut self) -> &mut R {
        &mut self.input
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// The stream `dbg` writes to.
    pub fn diagnostics_mut(&mut self) -> &mut dyn Write {
        self.diagnostics.as_mut()
    }

    fn index_of(&self, addr: Address) -> Option<usize> {
        addr.checked_sub(self.base)
            .and_then(|offset| usize::try_from(offset).ok())
            .filter(|&i| i < self.instructions.len())
    }

    // Execution

    /// Runs until the program counter leaves the loaded program.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.steps = 0;
        let result = self.run_inner();
        self.output.flush()?;
        result
    }

    fn run_inner(&mut self) -> Result<(), RuntimeError> {
        while self.is_running() {
            if let Some(max) = self.config.max_steps {
                if self.steps >= max {
                    return Err(RuntimeError::StepLimitExceeded(max));
                }
            }
            self.step()?;
            self.steps += 1;
        }
        Ok(())
    }

    /// Executes the instruction at the program counter.
    ///
    /// On error nothing has changed: operand counts, divisors and indices are
    /// all checked before the stack is touched.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        let at = self
            .index_of(self.pc)
            .ok_or(RuntimeError::EndOfProgram { pc: self.pc })?;
        let inst = self.instructions[at];

        trace!(pc = self.pc, %inst, depth = self.stack.len(), "step");

        let (pops, _) = inst.effect();
        if self.stack.len() < pops {
            return Err(self.underflow(at));
        }

        let mut next = self.pc + 1;

        match inst {
            Instruction::PushInt(n) => self.push(n),

            Instruction::Op(op) => match op {
                // Arithmetic
                Opcode::Add => self.binary(at, i64::wrapping_add)?,
                Opcode::Sub => self.binary(at, i64::wrapping_sub)?,
                Opcode::Mul => self.binary(at, i64::wrapping_mul)?,
                Opcode::Div => {
                    if self.peek(0) == Some(0) {
                        return Err(RuntimeError::DivisionByZero {
                            location: self.locations[at].clone(),
                        });
                    }
                    self.binary(at, i64::wrapping_div)?;
                }

                // Jumps
                Opcode::Jmp => next = self.pop(at)?,
                Opcode::Jeq | Opcode::Jnq | Opcode::Jgt | Opcode::Jlt => {
                    let addr = self.pop(at)?;
                    let b = self.pop(at)?;
                    let a = self.pop(at)?;
                    let taken = match op {
                        Opcode::Jeq => a == b,
                        Opcode::Jnq => a != b,
                        Opcode::Jgt => a > b,
                        _ => a < b,
                    };
                    if taken {
                        next = addr;
                    }
                }

                // Random access
                Opcode::Get => {
                    let index = self.checked_index(at, 1)?;
                    self.pop(at)?;
                    let value = self.stack[index];
                    self.push(value);
                }
                Opcode::Set => {
                    let index = self.checked_index(at, 2)?;
                    self.pop(at)?;
                    let value = self.pop(at)?;
                    self.stack[index] = value;
                }

                // Stack operations
                Opcode::Dup => {
                    let v = self.pop(at)?;
                    self.push(v);
                    self.push(v);
                }
                Opcode::Pop => {
                    self.pop(at)?;
                }
                Opcode::Ppos | Opcode::Size => {
                    let depth = self.stack.len() as i64;
                    self.push(depth);
                }
                Opcode::Swap => {
                    let b = self.pop(at)?;
                    let a = self.pop(at)?;
                    self.push(b);
                    self.push(a);
                }
                Opcode::Dbg => {
                    let line = format_stack(&self.stack);
                    writeln!(self.diagnostics, "{}", line)?;
                    self.diagnostics.flush()?;
                }

                // I/O
                Opcode::Print => {
                    if let Some(v) = self.peek(0) {
                        write!(self.output, "{}", v)?;
                    }
                    self.pop(at)?;
                }
                Opcode::Cprint => {
                    if let Some(v) = self.peek(0) {
                        self.output.write_all(&[v as u8])?;
                    }
                    self.pop(at)?;
                }
                Opcode::Read => {
                    self.output.flush()?;
                    let n = self.read_integer(at)?;
                    self.push(n);
                }
                Opcode::Cread => {
                    self.output.flush()?;
                    let c = self.read_byte()?;
                    self.push(c.map_or(-1, i64::from));
                }
            },
        }

        self.pc = next;
        Ok(())
    }

    // Stack operations

    fn push(&mut self, value: i64) {
        self.stack.push(value);
    }

    fn pop(&mut self, at: usize) -> Result<i64, RuntimeError> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => Err(self.underflow(at)),
        }
    }

    /// Value `depth` slots below the top.
    fn peek(&self, depth: usize) -> Option<i64> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.stack[i])
    }

    fn binary(&mut self, at: usize, f: fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let b = self.pop(at)?;
        let a = self.pop(at)?;
        self.push(f(a, b));
        Ok(())
    }

    /// Validates the index on top of the stack against the depth left after
    /// `operands` values are popped.
    fn checked_index(&self, at: usize, operands: usize) -> Result<usize, RuntimeError> {
        let raw = self.peek(0).ok_or_else(|| self.underflow(at))?;
        let size = self.stack.len() - operands;
        match usize::try_from(raw) {
            Ok(index) if index < size => Ok(index),
            _ => Err(RuntimeError::InvalidIndex {
                location: self.locations[at].clone(),
                index: raw,
                size,
            }),
        }
    }

    fn underflow(&self, at: usize) -> RuntimeError {
        RuntimeError::StackUnderflow {
            location: self.locations[at].clone(),
            instruction: self.instructions[at].to_string(),
        }
    }

    // Input

    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.fill_buf()?.first().copied())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.peek_byte()?;
        if byte.is_some() {
            self.input.consume(1);
        }
        Ok(byte)
    }

    /// Reads an optionally signed decimal integer, skipping leading
    /// whitespace. The first byte after the digits is left unread.
    fn read_integer(&mut self, at: usize) -> Result<i64, RuntimeError> {
        while let Some(b) = self.peek_byte()? {
            if !is_space(b) {
                break;
            }
            self.input.consume(1);
        }

        let mut text = String::new();
        if let Some(sign @ (b'-' | b'+')) = self.peek_byte()? {
            text.push(sign as char);
            self.input.consume(1);
        }

        let mut digits = 0;
        while let Some(b) = self.peek_byte()? {
            if !b.is_ascii_digit() {
                break;
            }
            text.push(b as char);
            digits += 1;
            self.input.consume(1);
        }

        if digits == 0 {
            return Err(RuntimeError::InvalidInput {
                location: self.locations[at].clone(),
                message: "expected an integer".to_string(),
            });
        }

        text.parse().map_err(|_| RuntimeError::InvalidInput {
            location: self.locations[at].clone(),
            message: format!("integer out of range: {}", text),
        })
    }
}

/// Whitespace as C's `isspace` sees it.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// `[1, 2, 3]`, bottom of the stack first.
pub fn format_stack(stack: &[i64]) -> String {
    let items: Vec<String> = stack.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}
