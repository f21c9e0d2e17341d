//! Command-line front end for the IR textual format.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use ir::{check_program, parse_program, print_program};

/// IR checker and printer
#[derive(Parser)]
#[command(name = "irc")]
#[command(about = "Parse, check, and print the SSA textual IR format", long_about = None)]
struct Cli {
    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a program and report well-formedness issues
    Check {
        /// Path to the textual IR source
        path: PathBuf,
    },
    /// Parse a program and print its canonical textual form
    Print {
        /// Path to the textual IR source
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.verbose {
        0 => log::set_max_level(log::LevelFilter::Info),
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Check { path } => check(&path),
        Commands::Print { path } => print(&path),
    }
}

fn check(path: &PathBuf) -> Result<()> {
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let program = parse_program(&source).with_context(|| format!("parsing {}", path.display()))?;
    let issues = check_program(&program);
    if issues.is_empty() {
        log::info!("{}: no issues found", path.display());
        return Ok(());
    }
    for issue in &issues {
        println!("{issue:?}");
    }
    bail!("{} checker issue(s) found", issues.len());
}

fn print(path: &PathBuf) -> Result<()> {
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let program = parse_program(&source).with_context(|| format!("parsing {}", path.display()))?;
    print!("{}", print_program(&program));
    Ok(())
}
