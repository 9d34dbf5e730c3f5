//! C backend.
//!
//! The generated program keeps the stack in a fixed `int64_t` array and runs
//! a `switch` on the program counter, one `case` per address. Every case does
//! what the interpreter does for the same instruction, and jump targets are
//! the very addresses the resolver produced, so both agree on output.

use tracing::debug;

use crate::bytecode::ir::{Address, Program};
use crate::bytecode::op::{Instruction, Opcode};
use crate::token::Location;

/// Stack capacity used when none is given on the command line.
pub const DEFAULT_STACK_SIZE: usize = 1024;

const PRELUDE: &str = r#"#include <inttypes.h>
#include <stdint.h>
#include <stdio.h>
#include <stdlib.h>

static int64_t stack[STACK_SIZE > 0 ? STACK_SIZE : 1];
static int64_t sp = 0;

static void fail(const char *message) {
    fflush(stdout);
    fprintf(stderr, "Error: %s\n", message);
    exit(1);
}

static void push(int64_t value) {
    if (sp >= STACK_SIZE) fail("stack overflow");
    stack[sp++] = value;
}

static int64_t pop(void) {
    if (sp <= 0) fail("stack underflow");
    return stack[--sp];
}

static int64_t checked_index(int64_t index, int64_t size) {
    if (index < 0 || index >= size) fail("invalid stack index");
    return index;
}

static int64_t wrap_add(int64_t a, int64_t b) { return (int64_t)((uint64_t)a + (uint64_t)b); }
static int64_t wrap_sub(int64_t a, int64_t b) { return (int64_t)((uint64_t)a - (uint64_t)b); }
static int64_t wrap_mul(int64_t a, int64_t b) { return (int64_t)((uint64_t)a * (uint64_t)b); }

static int64_t wrap_div(int64_t a, int64_t b) {
    if (b == 0) fail("division by zero");
    if (a == INT64_MIN && b == -1) return INT64_MIN;
    return a / b;
}

static void dump_stack(void) {
    int64_t i;
    fputc('[', stderr);
    for (i = 0; i < sp; i++) {
        if (i > 0) fputs(", ", stderr);
        fprintf(stderr, "%" PRId64, stack[i]);
    }
    fputs("]\n", stderr);
}

static int is_space(int c) {
    return c == ' ' || c == '\t' || c == '\n' || c == '\r' || c == '\v' || c == '\f';
}

static int64_t read_int(void) {
    int c = getchar();
    int negative = 0;
    uint64_t limit;
    uint64_t n = 0;

    while (is_space(c)) c = getchar();
    if (c == '-' || c == '+') {
        negative = c == '-';
        c = getchar();
    }
    if (c < '0' || c > '9') fail("invalid input");

    limit = negative ? (uint64_t)INT64_MAX + 1 : (uint64_t)INT64_MAX;
    while (c >= '0' && c <= '9') {
        uint64_t digit = (uint64_t)(c - '0');
        if (n > (limit - digit) / 10) fail("invalid input");
        n = n * 10 + digit;
        c = getchar();
    }
    if (c != EOF) ungetc(c, stdin);

    return negative ? (int64_t)(0 - n) : (int64_t)n;
}

static int64_t read_char(void) {
    int c = getchar();
    return c == EOF ? -1 : (int64_t)c;
}
"#;

struct CEmitter {
    out: String,
}

impl CEmitter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn emit_line(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    /// Emits one `case` of the dispatch switch.
    fn emit_case(&mut self, addr: Address, inst: &Instruction, loc: &Location) {
        self.emit_line(&format!(
            "        case {}: /* {} @ {} */",
            int_literal(addr),
            inst,
            comment_safe(&format!("{}:{}:{}", loc.file, loc.line, loc.column))
        ));

        let body: &[&str] = match inst {
            Instruction::PushInt(n) => {
                let line = format!("            push({});", int_literal(*n));
                self.emit_line(&line);
                &["            break;"]
            }
            Instruction::Op(op) => op_body(*op),
        };

        for line in body {
            self.emit_line(line);
        }
    }
}

fn op_body(op: Opcode) -> &'static [&'static str] {
    match op {
        Opcode::Add => &["            b = pop(); a = pop(); push(wrap_add(a, b));", "            break;"],
        Opcode::Sub => &["            b = pop(); a = pop(); push(wrap_sub(a, b));", "            break;"],
        Opcode::Mul => &["            b = pop(); a = pop(); push(wrap_mul(a, b));", "            break;"],
        Opcode::Div => &["            b = pop(); a = pop(); push(wrap_div(a, b));", "            break;"],

        Opcode::Jmp => &["            pc = pop();", "            continue;"],
        Opcode::Jeq => &[
            "            t = pop(); b = pop(); a = pop();",
            "            if (a == b) { pc = t; continue; }",
            "            break;",
        ],
        Opcode::Jnq => &[
            "            t = pop(); b = pop(); a = pop();",
            "            if (a != b) { pc = t; continue; }",
            "            break;",
        ],
        Opcode::Jgt => &[
            "            t = pop(); b = pop(); a = pop();",
            "            if (a > b) { pc = t; continue; }",
            "            break;",
        ],
        Opcode::Jlt => &[
            "            t = pop(); b = pop(); a = pop();",
            "            if (a < b) { pc = t; continue; }",
            "            break;",
        ],

        Opcode::Get => &[
            "            t = pop();",
            "            t = checked_index(t, sp);",
            "            push(stack[t]);",
            "            break;",
        ],
        Opcode::Set => &[
            "            t = pop(); a = pop();",
            "            t = checked_index(t, sp);",
            "            stack[t] = a;",
            "            break;",
        ],

        Opcode::Dup => &["            a = pop(); push(a); push(a);", "            break;"],
        Opcode::Pop => &["            (void)pop();", "            break;"],
        Opcode::Ppos | Opcode::Size => &["            push(sp);", "            break;"],
        Opcode::Swap => &["            b = pop(); a = pop(); push(b); push(a);", "            break;"],
        Opcode::Dbg => &["            dump_stack();", "            break;"],

        Opcode::Print => &["            printf(\"%\" PRId64, pop());", "            break;"],
        Opcode::Cprint => &["            putchar((unsigned char)pop());", "            break;"],
        Opcode::Read => &["            push(read_int());", "            break;"],
        Opcode::Cread => &["            push(read_char());", "            break;"],
    }
}

/// A C expression for `n` that is valid for the whole `int64_t` range.
fn int_literal(n: i64) -> String {
    if n == i64::MIN {
        "INT64_MIN".to_string()
    } else {
        format!("INT64_C({})", n)
    }
}

fn comment_safe(text: &str) -> String {
    text.replace("*/", "* /")
}

/// Lowers a resolved program to a standalone C program whose stack holds
/// `stack_size` values.
pub fn generate(program: &Program, stack_size: usize) -> String {
    let mut e = CEmitter::new();

    e.emit_line("/* Generated by tstk. */");
    e.emit_line(&format!("#define STACK_SIZE {}", stack_size));
    e.emit_line("");
    e.out.push_str(PRELUDE);
    e.emit_line("");
    e.emit_line("int main(void) {");
    e.emit_line(&format!("    int64_t pc = {};", int_literal(program.start)));
    e.emit_line("    int64_t a = 0, b = 0, t = 0;");
    e.emit_line("    (void)a; (void)b; (void)t;");
    e.emit_line("");
    e.emit_line("    for (;;) {");
    e.emit_line("        switch (pc) {");

    for (addr, inst, loc) in program.iter() {
        e.emit_case(addr, inst, loc);
    }

    e.emit_line("        default:");
    e.emit_line("            fflush(stdout);");
    e.emit_line("            return 0;");
    e.emit_line("        }");
    e.emit_line("        pc++;");
    e.emit_line("    }");
    e.emit_line("}");

    debug!(
        instructions = program.len(),
        stack_size,
        bytes = e.out.len(),
        "generated C"
    );

    e.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::resolve::resolve;
    use crate::frontend::lexer::Lexer;

    fn compile(source: &str, stack_size: usize) -> String {
        let tokens = Lexer::new("t.tstk", source).tokenize().unwrap();
        generate(&resolve(&tokens, 0).unwrap(), stack_size)
    }

    #[test]
    fn test_stack_size_is_configurable() {
        assert!(compile("1", 64).contains("#define STACK_SIZE 64\n"));
        assert!(compile("1", DEFAULT_STACK_SIZE).contains("#define STACK_SIZE 1024\n"));
    }

    #[test]
    fn test_one_case_per_address() {
        let c = compile("2 3 add print", 16);

        for addr in 0..4 {
            assert!(c.contains(&format!("case INT64_C({}):", addr)), "case {}", addr);
        }
        assert!(!c.contains("case INT64_C(4):"));
        assert!(c.contains("push(INT64_C(2));"));
        assert!(c.contains("push(wrap_add(a, b));"));
        assert!(c.contains("printf(\"%\" PRId64, pop());"));
    }

    #[test]
    fn test_jump_targets_are_resolved_addresses() {
        let c = compile("0 :top: 1 add @top jmp", 16);

        // @top is the push at address 3 and it pushes address 1
        assert!(c.contains("case INT64_C(3): /* 1 @ t.tstk:1:15 */\n            push(INT64_C(1));"));
        assert!(c.contains("pc = pop();\n            continue;"));
    }

    #[test]
    fn test_start_address_is_initial_pc() {
        let tokens = Lexer::new("CIN", "dbg").tokenize().unwrap();
        let c = generate(&resolve(&tokens, 5).unwrap(), 8);

        assert!(c.contains("int64_t pc = INT64_C(5);"));
        assert!(c.contains("case INT64_C(5):"));
    }

    #[test]
    fn test_min_literal() {
        let c = compile("-9223372036854775808 print", 8);
        assert!(c.contains("push(INT64_MIN);"));
    }

    #[test]
    fn test_every_opcode_has_a_case_body() {
        let source: Vec<&str> = Opcode::ALL.iter().map(|op| op.mnemonic()).collect();
        let c = compile(&source.join(" "), 8);

        assert_eq!(c.matches("        case ").count(), Opcode::ALL.len());
        assert!(c.contains("dump_stack();"));
        assert!(c.contains("push(read_int());"));
        assert!(c.contains("push(read_char());"));
        assert!(c.contains("putchar((unsigned char)pop());"));
    }

    #[test]
    fn test_empty_program() {
        let c = generate(&Program::new(0), 8);
        assert!(!c.contains("        case "));
        assert!(c.contains("default:"));
    }

    #[test]
    fn test_output_is_deterministic() {
        assert_eq!(compile("1 2 swap dbg", 32), compile("1 2 swap dbg", 32));
    }

    #[test]
    fn test_file_names_cannot_close_comments() {
        let tokens = Lexer::new("evil*/name", "1").tokenize().unwrap();
        let c = generate(&resolve(&tokens, 0).unwrap(), 8);
        assert!(c.contains("evil* /name"));
        assert!(!c.contains("evil*/"));
    }
}
