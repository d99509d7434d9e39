use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::sync::config::load_config;
use crate::sync::lock;
use crate::sync::paths::resolve_paths;
use crate::sync::state;

include!(concat!(env!("OUT_DIR"), "/env_allowlist.rs"));

const SECRET_MARKERS: [&str; 3] = ["PASS", "TOKEN", "KEY"];

fn masked(key: &str, value: &str) -> String {
    if SECRET_MARKERS.iter().any(|marker| key.contains(marker)) {
        "***".to_string()
    } else {
        value.to_string()
    }
}

/// Recognised environment keys that are currently set, secrets masked.
pub fn env_overrides() -> Vec<String> {
    GENERATED_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| {
            let value = env::var(key).ok()?;
            Some(format!("env {key}={}", masked(key, &value)))
        })
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_id={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("state_file={}", paths.state_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("config_file={}", paths.config_file.display()));

    match load_config(&paths.config_file) {
        Ok(cfg) => {
            report.detail(format!("repository_id={}", cfg.target.repository_id));
            report.detail(format!("page_limit={}", cfg.run.page_limit));
            report.detail(format!(
                "target_configured={}",
                cfg.require_target().is_ok()
            ));
        }
        Err(err) => report.issue(format!("config: {err:#}")),
    }

    match state::load(&paths.state_file) {
        Ok(checkpoint) => {
            report.detail(format!("offset={}", checkpoint.skip));
            report.detail(format!(
                "total={}",
                checkpoint
                    .total
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ));
            report.detail(format!("processed={}", checkpoint.processed));
            report.detail(format!("unique_subjects={}", checkpoint.unique_subjects.len()));
            report.detail(format!("unique_places={}", checkpoint.unique_places.len()));
            report.detail(format!("unique_names={}", checkpoint.unique_names.len()));
            report.detail(format!("pending_associations={}", checkpoint.access_points.len()));
            report.detail(format!("resumable={}", !checkpoint.is_pristine()));
        }
        Err(err) => report.issue(format!("checkpoint: {err:#}")),
    }

    match lock::is_held(&paths) {
        Ok(held) => report.detail(format!("run_in_progress={held}")),
        Err(err) => report.issue(format!("run lock: {err:#}")),
    }

    for line in env_overrides() {
        report.detail(line);
    }

    Ok(report)
}
