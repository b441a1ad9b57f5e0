//! Command surface for working with ledger JSON documents produced by a
//! review simulation: summary counts, Mermaid diagram, transcripts, and
//! the reconstructed workflow view.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use review_audit_core::{summarize, Ledger, Summary};
use review_audit_report::{markdown_transcript, mermaid_diagram, text_transcript, workflow_outline};
use review_audit_workflow::reconstruct;

#[derive(Debug, Parser)]
#[command(name = "review-audit")]
#[command(about = "Interaction ledger review artifacts for simulated cases")]
pub struct Cli {
    /// Path to a ledger JSON document.
    #[arg(long)]
    ledger: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print aggregate interaction counts and duration.
    Summary(SummaryArgs),
    /// Emit the Mermaid sequence diagram.
    Mermaid(OutputArgs),
    /// Emit a human-review transcript.
    Transcript(TranscriptArgs),
    /// Emit the reconstructed draft/revision workflow view.
    Workflow(WorkflowArgs),
    /// Structurally validate a ledger document.
    Validate,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Write to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TranscriptArgs {
    #[arg(long, value_enum, default_value_t = TranscriptFormat::Markdown)]
    format: TranscriptFormat,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct WorkflowArgs {
    #[arg(long)]
    json: bool,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TranscriptFormat {
    Markdown,
    Text,
}

/// Executes the parsed CLI command graph.
///
/// # Errors
/// Returns an error when the ledger file cannot be read or decoded, when
/// a reader is pointed at an unfinalized ledger, or when output writing
/// fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let ledger = load_ledger(&cli.ledger)?;

    match cli.command {
        Command::Summary(args) => run_summary(&ledger, &args),
        Command::Mermaid(args) => {
            let diagram = mermaid_diagram(&ledger)?;
            emit(&diagram, args.output.as_deref())
        }
        Command::Transcript(args) => {
            let transcript = match args.format {
                TranscriptFormat::Markdown => markdown_transcript(&ledger)?,
                TranscriptFormat::Text => text_transcript(&ledger)?,
            };
            emit(&transcript, args.output.as_deref())
        }
        Command::Workflow(args) => {
            let body = if args.json {
                let sections = reconstruct(&ledger)?;
                serde_json::to_string_pretty(&sections)?
            } else {
                workflow_outline(&ledger)?
            };
            emit(&body, args.output.as_deref())
        }
        Command::Validate => {
            println!(
                "ledger OK: case {} with {} interactions ({})",
                ledger.case_id(),
                ledger.interactions().len(),
                if ledger.is_finalized() {
                    "finalized"
                } else {
                    "in progress"
                }
            );
            Ok(())
        }
    }
}

fn load_ledger(path: &Path) -> Result<Ledger> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ledger file {}", path.display()))?;
    let ledger = Ledger::from_json_str(&body)
        .with_context(|| format!("failed to decode ledger file {}", path.display()))?;
    Ok(ledger)
}

fn run_summary(ledger: &Ledger, args: &SummaryArgs) -> Result<()> {
    let Some(simulation_end) = ledger.simulation_end() else {
        bail!(
            "ledger for case {} is not finalized; summary is only defined for finalized ledgers",
            ledger.case_id()
        );
    };
    let summary: Summary = match ledger.summary() {
        Some(summary) => summary.clone(),
        None => summarize(
            ledger.interactions(),
            ledger.simulation_start(),
            simulation_end,
        ),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Case: {}", ledger.case_id());
    println!("Total interactions: {}", summary.total_interactions);
    println!(
        "Duration: {:.2} seconds",
        summary.simulation_duration_seconds
    );
    println!("By phase:");
    for (phase, count) in &summary.interactions_by_phase {
        println!("  {phase}: {count}");
    }
    println!("By agent:");
    for (agent, count) in &summary.interactions_by_agent {
        println!("  {agent}: {count}");
    }
    Ok(())
}

fn emit(body: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(body.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            Ok(())
        }
        None => {
            println!("{body}");
            Ok(())
        }
    }
}
