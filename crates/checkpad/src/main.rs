//! Checkpad CLI
//!
//! Replays a pad stored as JSON and reports whether its history is intact.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use padsync::Pad;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "checkpad")]
#[command(about = "Verify the revision history of a stored pad", long_about = None)]
struct Cli {
    /// Pad snapshot as written by `Pad::to_json`
    path: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Print the text as of this revision instead of checking
    #[arg(long)]
    rev: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let json = std::fs::read_to_string(&cli.path)
        .with_context(|| format!("reading {}", cli.path.display()))?;
    let pad = Pad::from_json(&json).with_context(|| format!("parsing {}", cli.path.display()))?;
    info!(path = %cli.path.display(), revisions = pad.revisions().len(), "loaded pad");

    if let Some(rev) = cli.rev {
        let atext = pad.atext_at(rev).with_context(|| format!("rebuilding revision {rev}"))?;
        print!("{}", atext.text);
        return Ok(());
    }

    let report = pad.check().context("pad failed its integrity check")?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("ok: {} revisions, {} chars", report.revisions, report.text_len);
        for author in &report.authors {
            println!("author: {author}");
        }
    }
    Ok(())
}
