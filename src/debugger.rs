//! Single-step execution driven by the user pressing enter.

use std::io::{BufRead, Write};

use crate::bytecode::{Instruction, Opcode};
use crate::runtime::{Machine, RuntimeError, format_stack};

/// Steps through the loaded program from the current program counter.
///
/// Before each instruction its location and text are shown and one line of
/// input is consumed; after it the stack is shown. At end of input the
/// remaining instructions run without waiting.
pub fn run<R: BufRead, W: Write>(machine: &mut Machine<R, W>) -> Result<(), RuntimeError> {
    writeln!(
        machine.output_mut(),
        "Running script (press enter to execute instructions)"
    )?;

    let mut line = String::new();
    let mut waiting = true;

    while let Some(inst) = machine.current_instruction() {
        let banner = match machine.current_location() {
            Some(loc) => format!(
                "<Running {} line {}, column {}> {}",
                loc.file, loc.line, loc.column, inst
            ),
            None => break,
        };
        write!(machine.output_mut(), "{}", banner)?;
        machine.output_mut().flush()?;

        if waiting {
            line.clear();
            waiting = machine.input_mut().read_line(&mut line)? > 0;
        }
        if !waiting {
            writeln!(machine.output_mut())?;
        }

        machine.step()?;

        if inst == Instruction::Op(Opcode::Cprint) {
            writeln!(machine.output_mut())?;
        }
        let stack = format_stack(machine.stack());
        writeln!(machine.output_mut(), "{}", stack)?;
    }

    machine.output_mut().flush()?;
    Ok(())
}
