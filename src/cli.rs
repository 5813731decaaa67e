use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::config::load_config;

#[derive(Parser)]
#[command(name = "loam", version)]
#[command(about = "Inspect an agent's cold-storage conversation memory")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show resolved paths and archive counts
    Status,
    /// Print an archived chunk as a transcript
    Inspect {
        /// 8-character hex chunk ID
        #[arg(long)]
        chunk_id: String,
    },
    /// Scan the archive and report unreadable chunk files
    Verify,
}

fn print_report(report: &CommandReport) {
    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        println!("issue: {issue}");
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config()?;

    let report = match cli.command {
        Commands::Status => commands::status::run(&cfg)?,
        Commands::Inspect { chunk_id } => commands::inspect::run(&cfg, &chunk_id)?,
        Commands::Verify => commands::verify::run(&cfg)?,
    };

    print_report(&report);
    if !report.ok {
        bail!("{} found {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
