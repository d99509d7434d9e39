use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use std::time::Duration;

use crate::aspace::client::AspaceClient;
use crate::atom::reader::AtomSource;
use crate::atom::retry::RetryPolicy;
use crate::atom::transport::HttpTransport;
use crate::commands::CommandReport;
use crate::error::SyncError;
use crate::sync::alert::{self, AlertEvent};
use crate::sync::config::{SyncConfig, load_config};
use crate::sync::lock;
use crate::sync::mapping::MappingContext;
use crate::sync::paths::{SyncPaths, resolve_paths};
use crate::sync::pipeline::{SyncOutcome, SyncSettings, run_sync};
use crate::sync::source::CsvSource;
use crate::sync::{audit, upsert::WriteTally};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    Atom,
    Csv,
}

impl SourceKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Atom => "atom",
            Self::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub source: SourceKind,
    pub csv_path: Option<PathBuf>,
}

fn settings_for(cfg: &SyncConfig, source: SourceKind) -> SyncSettings {
    let wait_secs = match source {
        SourceKind::Atom => cfg.atom.wait_secs,
        SourceKind::Csv => cfg.csv.wait_secs,
    };
    SyncSettings {
        repository_id: cfg.target.repository_id.trim().to_string(),
        page_limit: cfg.run.page_limit,
        throttle: Duration::from_secs(wait_secs),
        sweep_delay: Duration::from_secs(cfg.run.sweep_delay_secs.unwrap_or(wait_secs)),
        max_page_failures: cfg.run.max_page_failures,
        mapping: MappingContext {
            public_url: cfg.atom.public_url.clone(),
            now: Local::now().naive_local(),
        },
    }
}

fn tally_line(label: &str, tally: &WriteTally) -> String {
    format!(
        "{label}: created={} updated={} conflict_retries={} failed={}",
        tally.created, tally.updated, tally.conflict_retries, tally.failed
    )
}

pub fn outcome_report(outcome: &SyncOutcome) -> CommandReport {
    let mut report = CommandReport::new("sync");
    report.detail(format!("source={}", outcome.source));
    for (kind, count) in &outcome.cached {
        report.detail(format!("cached_{}={count}", kind.replace(' ', "_")));
    }
    report.detail(format!("resumed_at={}", outcome.resumed_at));
    report.detail(format!(
        "total={}",
        outcome.total.map(|t| t.to_string()).unwrap_or_else(|| "unknown".to_string())
    ));
    report.detail(format!("pages={}", outcome.pages));
    report.detail(tally_line("records", &outcome.records.writes));
    report.detail(format!(
        "records_skipped={} records_errored={}",
        outcome.records.unavailable, outcome.records.errored
    ));
    report.detail(tally_line("subjects", &outcome.link.subjects));
    report.detail(tally_line("agents", &outcome.link.agents));
    report.detail(tally_line("links", &outcome.link.resources));

    let failed_writes = outcome.records.writes.failed
        + outcome.records.errored
        + outcome.link.subjects.failed
        + outcome.link.agents.failed
        + outcome.link.resources.failed;
    if failed_writes > 0 {
        report.issue(format!("{failed_writes} target writes failed; see log for details"));
    }
    if outcome.link.resources_missing > 0 {
        report.issue(format!(
            "{} resources had associations but no cached handle",
            outcome.link.resources_missing
        ));
    }

    match &outcome.sweep {
        Some(sweep) => {
            report.detail(format!("orphans_deleted={}", sweep.deleted.len()));
            if !sweep.failed.is_empty() {
                report.issue(format!(
                    "failed to delete orphaned resources: {}",
                    sweep.failed.join(", ")
                ));
            }
            report.detail("checkpoint=reset");
        }
        None => {
            report.issue(
                "source listing unavailable; sweep skipped and checkpoint kept for resume",
            );
        }
    }
    report
}

fn acquire_lock(paths: &SyncPaths, source: SourceKind) -> Result<lock::RunLock> {
    lock::acquire(paths).inspect_err(|err| {
        if let Some(sync_err) = err.downcast_ref::<SyncError>() {
            let message = sync_err.to_string();
            audit::append_event_or_warn(paths, "fatal", "failed", &message);
            alert::emit(&AlertEvent {
                code: sync_err.code().as_str(),
                stage: "lock",
                source: source.as_str(),
                offset: None,
                reason: "run lock held",
                err: &message,
            });
        }
    })
}

pub fn run(opts: &SyncOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths.config_file)?;
    let creds = cfg.require_target()?;
    let atom_key = match opts.source {
        SourceKind::Atom => Some(cfg.require_atom_key()?.to_string()),
        SourceKind::Csv => None,
    };

    let run_lock = acquire_lock(&paths, opts.source)?;
    tracing::info!(
        source = opts.source.as_str(),
        lock = %run_lock.path().display(),
        "sync started"
    );

    let target = AspaceClient::connect(&creds)?;
    let settings = settings_for(&cfg, opts.source);

    let outcome = match (opts.source, atom_key) {
        (SourceKind::Atom, Some(key)) => {
            let transport = HttpTransport::new(&key, cfg.atom.cert_path.as_deref())?;
            let mut source = AtomSource::new(
                transport,
                &cfg.atom.api_url,
                &cfg.atom.query,
                RetryPolicy::default(),
            );
            run_sync(&target, &mut source, &paths, &settings)?
        }
        _ => {
            let csv_path = opts.csv_path.as_ref().unwrap_or(&cfg.csv.path);
            let mut source = CsvSource::open(csv_path)?;
            tracing::info!(path = %csv_path.display(), rows = source.len(), "loaded CSV export");
            run_sync(&target, &mut source, &paths, &settings)?
        }
    };

    tracing::info!(complete = outcome.complete, "sync finished");
    drop(run_lock);
    Ok(outcome_report(&outcome))
}
