use std::collections::BTreeSet;
use std::fmt::Write;

use crate::bytecode::ir::{Address, Program};
use crate::bytecode::op::Instruction;
use crate::token::Spanned;

/// Render a resolved program, one instruction per line.
///
/// ```text
///       ┌──────────────────────────────────
/// 0002 ► dup         ; loop.tstk:3:1
/// 0003   1           ; loop.tstk:3:5
/// ```
pub fn format_program(program: &Program) -> String {
    let jump_targets = collect_jump_targets(program);
    let mut out = String::new();

    match program.end() {
        Some(end) => {
            let _ = writeln!(
                out,
                "; {} instructions, addresses {}..{}",
                program.len(),
                program.start,
                end
            );
        }
        None => {
            let _ = writeln!(
                out,
                "; {} instructions from address {} (past the last address)",
                program.len(),
                program.start
            );
        }
    }

    for (addr, inst, loc) in program.iter() {
        let is_target = jump_targets.contains(&addr);
        if is_target {
            let _ = writeln!(out, "      ┌──────────────────────────────────");
        }

        let marker = if is_target { "►" } else { " " };
        let text = format_instruction(program, addr, inst);
        let _ = writeln!(
            out,
            "{:04} {} {:<12}; {}:{}:{}",
            addr, marker, text, loc.file, loc.line, loc.column
        );
    }

    out
}

/// Render a token stream as `[line:col] KIND token`.
pub fn format_tokens(tokens: &[Spanned]) -> String {
    use crate::token::Token::*;

    let mut out = String::new();
    for s in tokens {
        let kind = match &s.token {
            LabelDef(_) => "LABEL",
            LabelRef(_) => "REFER",
            Instr(Instruction::PushInt(_)) => "INT",
            Instr(Instruction::Op(_)) => "OP",
        };
        let _ = writeln!(
            out,
            "[{:02}:{:02}] {:<6} {}",
            s.location.line, s.location.column, kind, s.token
        );
    }
    out
}

fn format_instruction(program: &Program, addr: Address, inst: &Instruction) -> String {
    match inst {
        Instruction::PushInt(n) if feeds_jump(program, addr) => format!("{} (→ {:04})", n, n),
        other => other.to_string(),
    }
}

/// True if the instruction at `addr` is a push consumed as a jump target.
fn feeds_jump(program: &Program, addr: Address) -> bool {
    let next = addr.wrapping_sub(program.start).wrapping_add(1) as usize;
    matches!(
        program.instructions.get(next),
        Some(Instruction::Op(op)) if op.is_jump()
    )
}

fn collect_jump_targets(program: &Program) -> BTreeSet<Address> {
    program
        .iter()
        .filter_map(|(addr, inst, _)| match inst {
            Instruction::PushInt(target) if feeds_jump(program, addr) => Some(*target),
            _ => None,
        })
        .collect()
}
