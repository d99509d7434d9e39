use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::commands::sync::{SourceKind, SyncOptions};
use crate::logging::{self, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "aspace-sync",
    version,
    about = "Mirror AtoM archival descriptions into ArchivesSpace"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run bootstrap, reconcile, link and sweep against the target.
    Sync {
        #[arg(long, value_enum)]
        source: SourceKind,
        /// CSV export to read; defaults to the configured path.
        #[arg(long)]
        csv_path: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show paths, checkpoint progress and run-lock state.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Clear the checkpoint so the next sync starts from the beginning.
    Reset {
        #[arg(long)]
        json: bool,
    },
}

fn render_text(report: &CommandReport) -> String {
    let mut out = format!(
        "{} {}\n",
        report.command,
        if report.ok { "ok" } else { "failed" }
    );
    for detail in &report.details {
        out.push_str(detail);
        out.push('\n');
    }
    for issue in &report.issues {
        out.push_str("issue: ");
        out.push_str(issue);
        out.push('\n');
    }
    out
}

fn emit(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", render_text(report));
    }
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogFormat::from_env());

    match cli.command {
        Command::Sync {
            source,
            csv_path,
            json,
        } => {
            let report = commands::sync::run(&SyncOptions { source, csv_path })?;
            emit(&report, json)
        }
        Command::Status { json } => emit(&commands::status::run()?, json),
        Command::Reset { json } => emit(&commands::reset::run()?, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_report_lists_details_then_issues() {
        let mut report = CommandReport::new("status");
        report.detail("offset=60");
        report.issue("checkpoint: unreadable");
        assert_eq!(
            render_text(&report),
            "status failed\noffset=60\nissue: checkpoint: unreadable\n"
        );
    }

    #[test]
    fn sync_requires_a_known_source() {
        assert!(Cli::try_parse_from(["aspace-sync", "sync", "--source", "csv"]).is_ok());
        assert!(Cli::try_parse_from(["aspace-sync", "sync", "--source", "ftp"]).is_err());
        assert!(Cli::try_parse_from(["aspace-sync", "sync"]).is_err());
    }
}
