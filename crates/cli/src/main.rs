//! `glyph`: a command-line harness over the evaluator substrate. Not
//! part of the core/runtime contract — this crate only wires together
//! a config file, a demo reader, and `Engine::run_source`/`run_array`.

mod config;
mod demo_scanner;

use clap::{Parser, Subcommand};
use config::Config;
use demo_scanner::DemoScanner;
use glyph_runtime::api::Engine;
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "glyph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run glyph source through the evaluator substrate", long_about = None)]
struct Cli {
    /// Path to a glyph.toml config file (defaults to ./glyph.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file to completion and print its result
    Run {
        /// Input source file
        input: PathBuf,
    },
    /// Read expressions from stdin one line at a time, printing each result
    Repl,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("glyph_cli=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("glyph.toml"));
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config {}: {}", config_path.display(), e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Run { input } => run_file(&input, &config),
        Commands::Repl => run_repl(&config),
    }
}

fn run_file(input: &PathBuf, config: &Config) {
    let text = match std::fs::read_to_string(input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    let mut engine = Engine::with_depletion_threshold(config.gc.depletion_threshold);
    match engine.run_source(&text, &DemoScanner) {
        Ok(result) => println!("{:?}", result),
        Err(thrown) => {
            eprintln!("Uncaught throw: {:?}", thrown.value);
            process::exit(1);
        }
    }
}

fn run_repl(config: &Config) {
    let mut engine = Engine::with_depletion_threshold(config.gc.depletion_threshold);
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match engine.run_source(&line, &DemoScanner) {
            Ok(result) => println!("{:?}", result),
            Err(thrown) => println!("Uncaught throw: {:?}", thrown.value),
        }
        engine.collect();
    }
}
