//! AST dump tool
//!
//! Parses a script and writes its AST to a JSON file. A diagnostic aid
//! independent of execution; shares the interpreter's exit conventions.

use std::fs;
use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use alien_runtime::ast_dump::program_to_json;
use alien_runtime::{Lexer, Parser as AlienParser};

const EX_USAGE: u8 = 64;
const EX_UNAVAILABLE: u8 = 69;

/// Dump the AST of an Alien script as JSON
#[derive(Parser)]
#[command(name = "alien-ast", version, about)]
struct Cli {
    /// Path to the script to parse
    source: String,
    /// Path of the JSON file to write
    output: String,
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

    let source = match fs::read_to_string(&cli.source) {
        Ok(source) => source,
        Err(err) => {
            report(&format!("couldn't open file '{}': {err}", cli.source));
            return ExitCode::from(EX_UNAVAILABLE);
        }
    };

    let (tokens, mut diagnostics) = Lexer::new(&source).tokenize();
    let (program, parse_diagnostics) = AlienParser::new(tokens).parse();
    diagnostics.extend(parse_diagnostics);
    if !diagnostics.is_empty() {
        for diagnostic in &diagnostics {
            eprintln!("{diagnostic}");
        }
        report("parse error");
        return ExitCode::SUCCESS;
    }

    match write_json(&cli.output, &program) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&format!("{err:#}"));
            ExitCode::from(EX_UNAVAILABLE)
        }
    }
}

fn write_json(path: &str, program: &alien_runtime::ast::Program) -> Result<()> {
    let json = serde_json::to_string_pretty(&program_to_json(program))
        .context("couldn't serialize the AST")?;
    fs::write(path, json).with_context(|| format!("couldn't write '{path}'"))
}

/// Write a red `error:` line to stderr
fn report(message: &str) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {message}");
}
