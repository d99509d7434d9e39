use crate::aspace::{EntityKind, TargetApi};
use crate::error::SyncError;
use crate::sync::alert::{self, AlertEvent};
use crate::sync::audit::append_event_or_warn;
use crate::sync::cache::IdentityCache;
use crate::sync::linker::{LinkOutcome, link_access_points};
use crate::sync::mapping::MappingContext;
use crate::sync::paths::SyncPaths;
use crate::sync::reconcile::{ReconcileTally, SyncContext, reconcile_record};
use crate::sync::source::RecordSource;
use crate::sync::state;
use crate::sync::sweep::{SweepOutcome, sweep_orphans};
use crate::sync::util::pause;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub repository_id: String,
    pub page_limit: u64,
    /// Pause between records of a page and between failed page attempts.
    pub throttle: Duration,
    pub sweep_delay: Duration,
    pub max_page_failures: u32,
    pub mapping: MappingContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub source: String,
    pub cached: BTreeMap<String, usize>,
    pub resumed_at: u64,
    pub total: Option<u64>,
    pub pages: u64,
    pub records: ReconcileTally,
    pub link: LinkOutcome,
    /// `None` when paging stopped early and the sweep was withheld.
    pub sweep: Option<SweepOutcome>,
    pub complete: bool,
}

enum PageStep {
    Processed,
    Finished,
    SourceExhausted,
}

fn process_page<T: TargetApi, S: RecordSource>(
    target: &T,
    source: &mut S,
    ctx: &mut SyncContext,
    paths: &SyncPaths,
    settings: &SyncSettings,
    tally: &mut ReconcileTally,
) -> Result<PageStep> {
    let offset = ctx.state.skip;
    let page = source.next_page(offset, settings.page_limit)?;

    if page.exhausted {
        return Ok(PageStep::SourceExhausted);
    }
    if offset == 0 || ctx.state.total.is_none() {
        tracing::info!(total = page.total, source = source.name(), "source record count");
        ctx.state.total = Some(page.total);
    }
    if page.listed == 0 {
        return Ok(PageStep::Finished);
    }

    let total = ctx.state.total.unwrap_or(page.total);
    let count = page.entries.len();
    for (idx, entry) in page.entries.iter().enumerate() {
        tracing::info!("Processing record {} of {}", entry.position, total);
        let outcome = reconcile_record(target, source, ctx, entry, &settings.mapping);
        if let Err(err) = &outcome {
            tracing::error!(
                position = entry.position,
                record = %entry.label,
                error = %format!("{err:#}"),
                "failed to process record"
            );
        }
        tally.record(&outcome);
        if idx + 1 < count {
            pause(settings.throttle);
        }
    }

    ctx.state.skip = offset + page.listed;
    ctx.state.processed += count as u64;
    state::save(&paths.state_file, &ctx.state)?;
    append_event_or_warn(
        paths,
        "reconcile",
        "ok",
        &format!("offset={} processed={} total={total}", ctx.state.skip, ctx.state.processed),
    );
    Ok(PageStep::Processed)
}

/// Drive one full sync: bootstrap, page through the source, link access
/// points, then sweep orphans and reset the checkpoint.
///
/// The caller holds the run lock. The sweep and reset run only when every
/// page was read; a source that gave up mid-listing leaves the checkpoint in
/// place for the next run.
pub fn run_sync<T: TargetApi, S: RecordSource>(
    target: &T,
    source: &mut S,
    paths: &SyncPaths,
    settings: &SyncSettings,
) -> Result<SyncOutcome> {
    let mut checkpoint = state::load(&paths.state_file)?;
    checkpoint.page_limit = settings.page_limit;
    let resumed_at = checkpoint.skip;
    if resumed_at > 0 {
        tracing::info!(
            offset = resumed_at,
            processed = checkpoint.processed,
            "resuming from checkpoint"
        );
    }

    let (cache, _) = IdentityCache::bootstrap(target, &settings.repository_id)
        .context("failed to load identity cache from target")?;
    let cached = EntityKind::ALL
        .iter()
        .map(|kind| (kind.label().to_string(), cache.len(*kind)))
        .collect::<BTreeMap<_, _>>();
    append_event_or_warn(
        paths,
        "bootstrap",
        "ok",
        &cached
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(" "),
    );

    let mut ctx = SyncContext::new(cache, checkpoint, &settings.repository_id);
    let mut tally = ReconcileTally::default();
    let mut pages = 0u64;
    let mut failures = 0u32;
    let mut complete = true;

    while ctx.state.total.is_none_or(|total| ctx.state.skip < total) {
        match process_page(target, source, &mut ctx, paths, settings, &mut tally) {
            Ok(PageStep::Processed) => {
                failures = 0;
                pages += 1;
            }
            Ok(PageStep::Finished) => break,
            Ok(PageStep::SourceExhausted) => {
                tracing::error!(
                    offset = ctx.state.skip,
                    "source listing unavailable; stopping before sweep"
                );
                append_event_or_warn(
                    paths,
                    "reconcile",
                    "degraded",
                    &format!("source exhausted at offset={}", ctx.state.skip),
                );
                complete = false;
                break;
            }
            Err(err) => {
                failures += 1;
                let offset = ctx.state.skip;
                tracing::error!(
                    offset,
                    attempt = failures,
                    error = %format!("{err:#}"),
                    "page failed"
                );
                if failures >= settings.max_page_failures {
                    let fatal = SyncError::PageRetriesExhausted {
                        attempts: failures,
                        offset,
                        last_error: format!("{err:#}"),
                    };
                    append_event_or_warn(paths, "fatal", "failed", &fatal.to_string());
                    alert::emit(&AlertEvent {
                        code: fatal.code().as_str(),
                        stage: "reconcile",
                        source: source.name(),
                        offset: Some(offset),
                        reason: "page retries exhausted",
                        err: &format!("{err:#}"),
                    });
                    return Err(fatal.into());
                }
                pause(settings.throttle);
            }
        }
    }

    let link = link_access_points(target, &mut ctx);
    append_event_or_warn(
        paths,
        "link",
        if link.subjects.failed + link.agents.failed + link.resources.failed == 0 {
            "ok"
        } else {
            "degraded"
        },
        &format!(
            "subjects={} agents={} resources={} missing={}",
            link.subjects.created + link.subjects.updated,
            link.agents.created + link.agents.updated,
            link.resources.updated,
            link.resources_missing
        ),
    );

    let sweep = if complete {
        let swept = sweep_orphans(target, &mut ctx, settings.sweep_delay);
        append_event_or_warn(
            paths,
            "sweep",
            if swept.failed.is_empty() { "ok" } else { "degraded" },
            &format!("deleted={} failed={}", swept.deleted.len(), swept.failed.len()),
        );
        state::reset(&paths.state_file, settings.page_limit)?;
        append_event_or_warn(paths, "reset", "ok", "checkpoint cleared after complete run");
        Some(swept)
    } else {
        tracing::warn!("orphan sweep skipped; run incomplete");
        append_event_or_warn(paths, "sweep", "skipped", "run incomplete");
        None
    };

    Ok(SyncOutcome {
        source: source.name().to_string(),
        cached,
        resumed_at,
        total: ctx.state.total,
        pages,
        records: tally,
        link,
        sweep,
        complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspace::ApiError;
    use crate::aspace::fake::FakeTarget;
    use crate::sync::source::{CsvSource, Page, PendingRecord, SourceRecord};
    use crate::sync::state::{AccessPoints, Checkpoint};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn settings(page_limit: u64) -> SyncSettings {
        SyncSettings {
            repository_id: "2".to_string(),
            page_limit,
            throttle: Duration::ZERO,
            sweep_delay: Duration::ZERO,
            max_page_failures: 3,
            mapping: MappingContext {
                public_url: "https://catalogue.example".to_string(),
                now: NaiveDate::from_ymd_opt(2026, 2, 1)
                    .and_then(|d| d.and_hms_opt(12, 0, 0))
                    .expect("timestamp"),
            },
        }
    }

    fn csv(rows: u64, subject: &str) -> CsvSource {
        let mut raw = String::from("referenceCode,title,subjectAccessPoints\n");
        for i in 1..=rows {
            raw.push_str(&format!("GR-{i:04},Record {i},{subject}\n"));
        }
        CsvSource::from_bytes(raw.as_bytes()).expect("csv")
    }

    /// Serves the first page from a CSV, then reports its retry ceiling hit.
    struct GivesUpAfterFirstPage(CsvSource);

    impl RecordSource for GivesUpAfterFirstPage {
        fn name(&self) -> &'static str {
            "atom"
        }

        fn next_page(&mut self, offset: u64, limit: u64) -> Result<Page> {
            if offset == 0 {
                return self.0.next_page(offset, limit);
            }
            Ok(Page {
                exhausted: true,
                ..Page::default()
            })
        }

        fn resolve(&mut self, entry: &PendingRecord) -> Option<SourceRecord> {
            self.0.resolve(entry)
        }
    }

    struct AlwaysFails;

    impl RecordSource for AlwaysFails {
        fn name(&self) -> &'static str {
            "atom"
        }

        fn next_page(&mut self, _offset: u64, _limit: u64) -> Result<Page> {
            anyhow::bail!("listing response missing `results` array")
        }

        fn resolve(&mut self, _entry: &PendingRecord) -> Option<SourceRecord> {
            None
        }
    }

    #[test]
    fn second_run_updates_without_duplicating() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());
        let target = FakeTarget::new();

        let first = run_sync(&target, &mut csv(3, "Fishing"), &paths, &settings(2))
            .expect("first run");
        assert!(first.complete);
        assert_eq!(first.records.writes.created, 3);
        assert_eq!(first.pages, 2);

        target.clear_calls();
        let second = run_sync(&target, &mut csv(3, "Fishing"), &paths, &settings(2))
            .expect("second run");

        assert_eq!(second.records.writes.created, 0);
        assert_eq!(second.records.writes.updated, 3);
        assert_eq!(second.link.subjects.created, 0);
        assert_eq!(target.count_calls("create"), 0);
        assert_eq!(target.docs_in("/repositories/2/resources").len(), 3);
        assert_eq!(target.docs_in("/subjects").len(), 1);
        assert!(state::load(&paths.state_file).expect("state").is_pristine());
    }

    #[test]
    fn resume_only_touches_remaining_records_and_keeps_prior_terms() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());
        let target = FakeTarget::new();

        let mut checkpoint = Checkpoint {
            skip: 60,
            total: Some(90),
            processed: 60,
            ..Checkpoint::default()
        };
        for i in 1..=60 {
            let id_0 = format!("GR-{i:04}");
            target.seed("/repositories/2/resources", json!({"id_0": id_0, "title": "Earlier"}));
            checkpoint.record_access_points(
                &id_0,
                AccessPoints {
                    subject: vec!["Prior".to_string()],
                    ..AccessPoints::default()
                },
            );
        }
        state::save(&paths.state_file, &checkpoint).expect("save checkpoint");

        let outcome = run_sync(&target, &mut csv(90, "Fishing"), &paths, &settings(30))
            .expect("run");

        assert_eq!(outcome.resumed_at, 60);
        assert_eq!(outcome.records.writes.created, 30);
        assert_eq!(outcome.records.writes.updated, 0);
        assert_eq!(target.count_calls("create /repositories/2/resources"), 30);
        assert_eq!(target.count_calls("delete"), 0);
        assert_eq!(target.docs_in("/repositories/2/resources").len(), 90);

        let terms = target
            .docs_in("/subjects")
            .iter()
            .filter_map(|doc| doc["terms"][0]["term"].as_str().map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(terms, vec!["Fishing", "Prior"]);
        assert_eq!(outcome.link.resources.updated, 90);
    }

    #[test]
    fn repeated_page_failures_stop_the_run() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());
        let target = FakeTarget::new();

        let err = run_sync(&target, &mut AlwaysFails, &paths, &settings(30))
            .expect_err("must fail");

        let sync_err = err.downcast_ref::<SyncError>().expect("sync error");
        assert!(matches!(
            sync_err,
            SyncError::PageRetriesExhausted { attempts: 3, offset: 0, .. }
        ));
        let audit_log = fs::read_to_string(paths.audit_log()).expect("audit log");
        assert!(audit_log.contains("\"phase\":\"fatal\""));
        assert_eq!(target.count_calls("create"), 0);
    }

    #[test]
    fn exhausted_source_skips_sweep_and_keeps_checkpoint() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());
        let target = FakeTarget::new();
        target.seed("/repositories/2/resources", json!({"id_0": "GR-9999"}));

        let mut source = GivesUpAfterFirstPage(csv(4, "Fishing"));
        let outcome = run_sync(&target, &mut source, &paths, &settings(2)).expect("run");

        assert!(!outcome.complete);
        assert!(outcome.sweep.is_none());
        assert_eq!(target.count_calls("delete"), 0);
        assert_eq!(target.docs_in("/repositories/2/resources").len(), 3);
        assert_eq!(outcome.link.resources.updated, 2);

        let saved = state::load(&paths.state_file).expect("state");
        assert_eq!(saved.skip, 2);
        assert_eq!(saved.total, Some(4));
        assert!(saved.unique_subjects.contains("Fishing"));
    }

    #[test]
    fn failed_record_writes_do_not_stop_the_run_or_orphan_resources() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());
        let target = FakeTarget::new();
        let existing = target.seed(
            "/repositories/2/resources",
            json!({"id_0": "GR-0001", "title": "Earlier"}),
        );
        target.fail_next_post(ApiError::Status {
            status: 500,
            body: "internal error".to_string(),
        });
        target.fail_next_create(ApiError::Status {
            status: 500,
            body: "internal error".to_string(),
        });

        let outcome = run_sync(&target, &mut csv(3, "Fishing"), &paths, &settings(30))
            .expect("run");

        assert!(outcome.complete);
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.records.writes.created, 1);
        assert_eq!(outcome.records.writes.failed, 2);
        assert_eq!(outcome.records.errored, 0);
        assert_eq!(outcome.link.resources_missing, 1);
        assert_eq!(outcome.sweep.expect("sweep ran").deleted, Vec::<String>::new());
        assert_eq!(target.doc(&existing).expect("kept")["title"], "Earlier");
        assert_eq!(target.count_calls("delete"), 0);
    }

    #[test]
    fn complete_run_sweeps_orphans() {
        let tmp = tempdir().expect("tempdir");
        let paths = SyncPaths::rooted_at(tmp.path().to_path_buf());
        let target = FakeTarget::new();
        target.seed("/repositories/2/resources", json!({"id_0": "GR-9999"}));

        let outcome = run_sync(&target, &mut csv(2, ""), &paths, &settings(30)).expect("run");

        let sweep = outcome.sweep.expect("sweep ran");
        assert_eq!(sweep.deleted, vec!["GR-9999"]);
        assert_eq!(target.docs_in("/repositories/2/resources").len(), 2);
    }
}
