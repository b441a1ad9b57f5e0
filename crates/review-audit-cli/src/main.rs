use anyhow::Result;
use clap::Parser;
use review_audit_cli::{run_cli, Cli};

fn main() -> Result<()> {
    run_cli(Cli::parse())
}
