use anyhow::Result;

use crate::commands::CommandReport;
use crate::sync::audit;
use crate::sync::config::load_config;
use crate::sync::lock;
use crate::sync::paths::resolve_paths;
use crate::sync::state;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths.config_file)?;
    let mut report = CommandReport::new("reset");

    let _lock = lock::acquire(&paths)?;
    let previous = match state::load(&paths.state_file) {
        Ok(checkpoint) => Some(checkpoint),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "discarding unreadable checkpoint");
            report.detail("previous_checkpoint=unreadable");
            None
        }
    };
    if let Some(previous) = &previous {
        report.detail(format!("previous_offset={}", previous.skip));
        report.detail(format!("previous_processed={}", previous.processed));
        report.detail(format!("previous_associations={}", previous.access_points.len()));
    }

    state::reset(&paths.state_file, cfg.run.page_limit)?;
    audit::append_event(&paths, "reset", "ok", "checkpoint cleared manually")?;
    tracing::info!(state_file = %paths.state_file.display(), "checkpoint reset");

    report.detail(format!("state_file={}", paths.state_file.display()));
    report.detail(format!("page_limit={}", cfg.run.page_limit));
    Ok(report)
}
