//! Line-at-a-time interactive session.
//!
//! Every line is resolved at the machine's next free address, so labels from
//! earlier lines stay reachable by address while the stack carries over.

use std::io::{BufRead, Write};

use tracing::debug;

use crate::frontend::Lexer;
use crate::runtime::{Machine, RuntimeError, format_stack};

/// File name reported in locations of REPL input.
pub const REPL_FILE: &str = "CIN";

const PROMPT: &str = "> ";

/// Runs the session until the input is exhausted.
///
/// Lexer and label errors go to the machine's diagnostics stream and the
/// line is dropped. A runtime error ends the session and is returned to the
/// caller.
pub fn run<R: BufRead, W: Write>(machine: &mut Machine<R, W>) -> Result<(), RuntimeError> {
    let mut line = String::new();

    loop {
        write!(machine.output_mut(), "{}", PROMPT)?;
        machine.output_mut().flush()?;

        line.clear();
        if machine.input_mut().read_line(&mut line)? == 0 {
            writeln!(machine.output_mut())?;
            break;
        }

        let tokens = match Lexer::new(REPL_FILE, &line).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                report(machine, &e)?;
                continue;
            }
        };

        let start = machine.len();
        if let Err(e) = machine.load_tokens(&tokens) {
            report(machine, &e)?;
            continue;
        }
        debug!(start, end = machine.len(), "repl line loaded");

        machine.set_pc(start);
        machine.run()?;

        let stack = format_stack(machine.stack());
        writeln!(machine.output_mut(), "{}", stack)?;
    }

    machine.output_mut().flush()?;
    Ok(())
}

fn report<R: BufRead, W: Write>(
    machine: &mut Machine<R, W>,
    err: &dyn std::error::Error,
) -> std::io::Result<()> {
    // keep the prompt ahead of the message when both streams share a terminal
    machine.output_mut().flush()?;
    let diagnostics = machine.diagnostics_mut();
    writeln!(diagnostics, "error: {}", err)?;
    diagnostics.flush()
}
