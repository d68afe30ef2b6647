// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Momentum - a small scripting language with cooperative tasks
//!
//! This is the main entry point for the momentum CLI/REPL.
//!
//! ## Features
//!
//! - Interactive REPL with syntax highlighting and history
//! - Script execution on a single-threaded tokio runtime
//! - Bytecode disassembly

mod repl;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use momentum_core::{AsyncEngine, Config, Error, StdConsole};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line interface
#[derive(Parser, Debug)]
#[command(name = "momentum", version, about = "Run Momentum scripts or start the REPL")]
struct Cli {
    /// Script to execute; starts the REPL when omitted
    file: Option<PathBuf>,

    /// Evaluate a snippet and print its value
    #[arg(short, long, value_name = "CODE", conflicts_with = "file")]
    eval: Option<String>,

    /// Print the compiled bytecode instead of running
    #[arg(short, long)]
    disassemble: bool,

    /// Override a configuration value, e.g. `-c max-call-depth=256`
    #[arg(short, long = "config", value_name = "KEY=VALUE")]
    config: Vec<String>,

    /// Enable debug logging
    #[arg(short, long, env = "MOMENTUM_VERBOSE")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = match Config::load(&cwd) {
        Ok(config) => config,
        Err(e) => {
            print_error(&e);
            return ExitCode::FAILURE;
        }
    };
    for pair in &cli.config {
        match pair.split_once('=') {
            Some((key, value)) => config.set(key.trim(), value.trim()),
            None => {
                eprintln!("{}: expected KEY=VALUE, got '{}'", "Error".red().bold(), pair.cyan());
                return ExitCode::FAILURE;
            }
        }
    }

    init_tracing(&config, cli.verbose);

    match (&cli.file, &cli.eval) {
        (None, None) => run_repl(config),
        _ => run_script(&cli, config),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &Config, verbose: bool) {
    let default = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Start the interactive REPL
fn run_repl(config: Config) -> ExitCode {
    match repl::Repl::new(config) {
        Ok(mut repl) => {
            if let Err(e) = repl.run() {
                eprintln!("{}: {:?}", "REPL Error".red().bold(), e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: Failed to initialize REPL: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run_script(cli: &Cli, config: Config) -> ExitCode {
    if cli.disassemble {
        return disassemble(cli).await;
    }

    let mut engine = AsyncEngine::with_console(config, Rc::new(RefCell::new(StdConsole)));

    let result = match (&cli.eval, &cli.file) {
        (Some(code), _) => engine.eval_interactive(code).await.map(|value| {
            if !value.is_none() {
                println!("{}", value.repr());
            }
        }),
        (None, Some(path)) => run_file(&mut engine, path).await,
        (None, None) => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Exit(code)) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run_file(engine: &mut AsyncEngine, path: &Path) -> Result<(), Error> {
    if !path.exists() {
        return Err(Error::Io(format!("file not found '{}'", path.display())));
    }
    engine.eval_file(path).await.map(|_| ())
}

async fn disassemble(cli: &Cli) -> ExitCode {
    let source = match (&cli.eval, &cli.file) {
        (Some(code), _) => Ok(code.clone()),
        (None, Some(path)) => tokio::fs::read_to_string(path).await.map_err(Error::from),
        (None, None) => Ok(String::new()),
    };

    match source.and_then(|source| AsyncEngine::compile(&source)) {
        Ok(program) => {
            print!("{}", program.main.chunk.disassemble(&program.main.name));
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Print a formatted error message, with the call trace for runtime errors.
pub(crate) fn print_error(error: &Error) {
    let text = error.to_string();
    match text.split_once(':') {
        Some((kind, message)) => eprintln!("{}:{}", kind.red().bold(), message),
        None => eprintln!("{}", text.red()),
    }
    if let Some(runtime) = error.as_runtime() {
        if !runtime.trace.is_empty() {
            eprintln!("{}", runtime.render_trace().dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["momentum", "script.mn", "--disassemble", "-c", "trace-limit=4"]);
        assert_eq!(cli.file, Some(PathBuf::from("script.mn")));
        assert!(cli.disassemble);
        assert_eq!(cli.config, vec!["trace-limit=4".to_string()]);
    }

    #[test]
    fn test_cli_eval_conflicts_with_file() {
        assert!(Cli::try_parse_from(["momentum", "script.mn", "-e", "print 1"]).is_err());
    }
}
