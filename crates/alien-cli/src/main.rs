//! Alien interpreter entry point
//!
//! Runs a script file through the compile-and-execute pipeline. Exit
//! codes follow the BSD sysexits convention: 64 for a usage error, 69
//! when the source file cannot be read. Language errors exit 0 with
//! diagnostics on stderr.

use std::fs;
use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use alien_runtime::{InterpretResult, Vm};

const EX_USAGE: u8 = 64;
const EX_UNAVAILABLE: u8 = 69;

/// Run an Alien script
#[derive(Parser)]
#[command(name = "alien", version, about)]
struct Cli {
    /// Path to the script to run
    file: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EX_USAGE),
            };
        }
    };

    let source = match read_source(&cli.file) {
        Ok(source) => source,
        Err(err) => {
            report(&format!("{err:#}"));
            return ExitCode::from(EX_UNAVAILABLE);
        }
    };

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        InterpretResult::Ok => {}
        InterpretResult::ParseError => report("parse error"),
        InterpretResult::CompileError => report("compile error"),
        InterpretResult::RuntimeError => report("runtime error"),
    }
    ExitCode::SUCCESS
}

fn read_source(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("couldn't open file '{path}'"))
}

/// Write a red `error:` line to stderr
fn report(message: &str) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {message}");
}
