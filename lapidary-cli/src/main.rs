//! # lapidary CLI
//!
//! Command-line interface for the lapidary document compiler.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config::Config;
use lapidary_core::{gem, shard, Processor};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lapidary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input document (reads stdin when omitted or `-`)
    input: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra include directory, searched before the config's
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Page width in cells
    #[arg(short, long)]
    width: Option<usize>,

    /// Skip the built-in stylesheet
    #[arg(long)]
    no_prelude: bool,

    /// Write an intermediate stage as JSON instead of the document
    #[arg(long, value_enum)]
    dump: Option<DumpStage>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum DumpStage {
    Shards,
    Gems,
    Schedule,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let mut options = config.compile_options();
    if let Some(width) = cli.width {
        options.width = width;
    }
    if cli.no_prelude {
        options.prelude = false;
    }
    options.include_dirs.splice(0..0, cli.include.iter().cloned());

    let (name, text) = read_input(cli.input.as_deref())?;
    let mut processor = Processor::with_fs_loader(options);

    let rendered = match cli.dump {
        None => processor
            .compile(&name, &text)
            .with_context(|| format!("Failed to compile {}", name))?,
        Some(stage) => dump(&mut processor, stage, &name, &text)?,
    };

    for diagnostic in processor.diagnostics() {
        eprintln!("{}", diagnostic);
    }
    write_output(cli.output.as_deref(), &rendered)
}

fn dump(processor: &mut Processor, stage: DumpStage, name: &str, text: &str) -> Result<String> {
    let context = || format!("Failed to compile {}", name);
    let value = match stage {
        DumpStage::Shards => {
            let shards = processor.parse_only(name, text).with_context(context)?;
            shard::dump(shards, shards.root())
        }
        DumpStage::Gems => {
            let gems = processor.grind_only(name, text).with_context(context)?;
            gem::dump(gems, gems.root())
        }
        DumpStage::Schedule => {
            let schedule = processor.schedule(name, text).with_context(context)?;
            serde_json::to_value(&schedule)?
        }
    };
    let mut out = serde_json::to_string_pretty(&value)?;
    out.push('\n');
    Ok(out)
}

fn read_input(path: Option<&Path>) -> Result<(String, String)> {
    match path {
        Some(path) if path != Path::new("-") => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok((path.display().to_string(), text))
        }
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(("<stdin>".to_string(), text))
        }
    }
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
