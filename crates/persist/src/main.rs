use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error};
use persist::{Config, RewriteStrategy, document::LoadedDocument};

/// Archive an object document as a replayable Python script
#[derive(Parser, Debug)]
#[command(name = "persist", version, about, long_about = None)]
struct Cli {
    /// TOML object document to archive
    input: PathBuf,

    /// TOML configuration file; overrides the document's `[config]` table
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the script here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Template rewriting strategy (heuristic or structural)
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<RewriteStrategy>,

    /// Maximum number of reduction passes
    #[arg(long, value_name = "N")]
    passes: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let text = read(&cli.input)?;
    let document = LoadedDocument::from_toml_str(&text)
        .with_context(|| format!("Failed to load object document {}", cli.input.display()))?;

    let config = resolve_config(cli, document.config.clone())?;
    debug!("Effective configuration: {config:?}");

    let archive = document.archive(config)?;
    let script = archive
        .render()
        .with_context(|| format!("Failed to archive {}", cli.input.display()))?;

    match &cli.output {
        Some(path) => fs::write(path, format!("{script}\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{script}").context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Defaults, then the document's `[config]`, then `--config`, then flags
fn resolve_config(cli: &Cli, from_document: Option<Config>) -> Result<Config> {
    let mut config = from_document.unwrap_or_default();
    if let Some(path) = &cli.config {
        config = Config::from_toml_str(&read(path)?)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
    }
    if let Some(strategy) = cli.strategy {
        config.rewrite = strategy;
    }
    if let Some(passes) = cli.passes {
        config.reduce_passes = passes;
    }
    Ok(config)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
