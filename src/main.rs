use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tstk::bytecode::disasm::{format_program, format_tokens};
use tstk::bytecode::{Program, resolve};
use tstk::codegen::c::{self, DEFAULT_STACK_SIZE};
use tstk::frontend::Lexer;
use tstk::token::Spanned;
use tstk::{Machine, MachineConfig, debugger, repl};

/// Extension of binary program images written by `--emit-image`.
const IMAGE_EXTENSION: &str = "tsti";

/// Interpreter, debugger and C compiler for the tstk stack language
#[derive(Parser, Debug)]
#[command(name = "tstk", version, about, long_about = None)]
struct Cli {
    /// Source files (resolved together) or a single .tsti program image
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Compile to C instead of interpreting
    #[arg(short, long, conflicts_with = "interpret")]
    compile: bool,

    /// Run the step-wise debugger
    #[arg(short, long, conflicts_with = "compile")]
    debug: bool,

    /// Start the REPL (after running files, if any)
    #[arg(short, long)]
    interpret: bool,

    /// Output file for compilation (stdout by default)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Stack capacity of the generated C program
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_STACK_SIZE)]
    stack_size: usize,

    /// Print the resolved program and exit
    #[arg(long, conflicts_with_all = ["compile", "debug", "interpret", "tokens", "emit_image"])]
    listing: bool,

    /// Print the token stream and exit
    #[arg(long, conflicts_with_all = ["compile", "debug", "interpret", "emit_image"])]
    tokens: bool,

    /// Write the resolved program as a binary image
    #[arg(long, value_name = "FILE", conflicts_with_all = ["compile", "debug", "interpret"])]
    emit_image: Option<PathBuf>,

    /// Abort the interpreter after N instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = MachineConfig {
        max_steps: cli.max_steps,
    };

    if cli.files.is_empty() {
        let mut machine = Machine::with_config(config);
        repl::run(&mut machine)?;
        return Ok(());
    }

    let program = match load_input(&cli)? {
        Some(program) => program,
        None => return Ok(()),
    };

    if let Some(path) = &cli.emit_image {
        let bytes = program.to_bytes()?;
        fs::write(path, bytes)
            .with_context(|| format!("could not write image {}", path.display()))?;
        debug!(path = %path.display(), "wrote program image");
        return Ok(());
    }

    if cli.listing {
        print!("{}", format_program(&program));
        return Ok(());
    }

    if cli.compile {
        let source = c::generate(&program, cli.stack_size);
        match &cli.output {
            Some(path) => fs::write(path, source)
                .with_context(|| format!("could not write {}", path.display()))?,
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(source.as_bytes())?;
                stdout.flush()?;
            }
        }
        return Ok(());
    }

    let mut machine = Machine::with_config(config);
    machine.load(program)?;

    if cli.debug {
        debugger::run(&mut machine)?;
    } else {
        machine.run()?;
    }

    if cli.interpret {
        repl::run(&mut machine)?;
    }

    Ok(())
}

/// Reads every input file into one resolved program.
///
/// Returns `None` when `--tokens` asked only for the token stream.
fn load_input(cli: &Cli) -> anyhow::Result<Option<Program>> {
    let (images, sources): (Vec<&PathBuf>, Vec<&PathBuf>) =
        cli.files.iter().partition(|path| is_image(path));

    if !images.is_empty() {
        if cli.files.len() > 1 {
            bail!("a program image cannot be combined with other input files");
        }
        let path = images[0];
        let bytes =
            fs::read(path).with_context(|| format!("could not read file {}", path.display()))?;
        let program = Program::from_bytes(&bytes)
            .with_context(|| format!("could not load image {}", path.display()))?;
        if cli.tokens {
            bail!("{} is a program image and has no tokens", path.display());
        }
        return Ok(Some(program));
    }

    let mut tokens: Vec<Spanned> = Vec::new();
    for path in sources {
        let source = fs::read_to_string(path)
            .with_context(|| format!("could not read file {}", path.display()))?;
        let file = path.display().to_string();
        tokens.extend(Lexer::new(file, &source).tokenize()?);
    }

    if cli.tokens {
        print!("{}", format_tokens(&tokens));
        return Ok(None);
    }

    Ok(Some(resolve(&tokens, 0)?))
}

fn is_image(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tstk").chain(args.iter().copied()))
    }

    fn assert_conflict(args: &[&str]) {
        match parse(args) {
            Ok(cli) => panic!("expected {:?} to be rejected, got {:?}", args, cli),
            Err(e) => assert_eq!(e.kind(), ErrorKind::ArgumentConflict, "{:?}", args),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["a.tstk"]).unwrap();
        assert_eq!(cli.stack_size, DEFAULT_STACK_SIZE);
        assert!(!cli.compile && !cli.debug && !cli.interpret);
        assert_eq!(cli.max_steps, None);
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&["-c", "-o", "out.c", "-s", "64", "a.tstk", "b.tstk"]).unwrap();
        assert!(cli.compile);
        assert_eq!(cli.output, Some(PathBuf::from("out.c")));
        assert_eq!(cli.stack_size, 64);
        assert_eq!(cli.files.len(), 2);
    }

    #[test]
    fn test_exiting_modes_reject_other_actions() {
        for action in ["-c", "-d", "-i"] {
            assert_conflict(&["--listing", action, "a.tstk"]);
            assert_conflict(&["--tokens", action, "a.tstk"]);
            assert_conflict(&["--emit-image", "a.tsti", action, "a.tstk"]);
        }
        assert_conflict(&["--listing", "--tokens", "a.tstk"]);
        assert_conflict(&["--listing", "--emit-image", "a.tsti", "a.tstk"]);
    }

    #[test]
    fn test_compile_excludes_running() {
        assert_conflict(&["-c", "-d", "a.tstk"]);
        assert_conflict(&["-c", "-i", "a.tstk"]);
        assert!(parse(&["-d", "-i", "a.tstk"]).is_ok());
    }

    #[test]
    fn test_image_extension() {
        assert!(is_image(Path::new("prog.tsti")));
        assert!(!is_image(Path::new("prog.tstk")));
    }
}
