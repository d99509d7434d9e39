use crate::aspace::{EntityKind, TargetApi};
use crate::sync::cache::IdentityCache;
use crate::sync::mapping::{MappingContext, map_record};
use crate::sync::source::{PendingRecord, RecordSource};
use crate::sync::state::Checkpoint;
use crate::sync::upsert::{WriteOutcome, WriteTally, upsert};
use anyhow::Result;
use std::collections::BTreeSet;

/// Everything one run accumulates, owned by the run and threaded through
/// reconcile, link and sweep.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub cache: IdentityCache,
    pub state: Checkpoint,
    /// Resource identifiers observed in this run, including pages processed
    /// before a resume.
    pub seen: BTreeSet<String>,
    pub repository_id: String,
}

impl SyncContext {
    pub fn new(cache: IdentityCache, state: Checkpoint, repository_id: &str) -> Self {
        let seen = state.access_points.keys().cloned().collect();
        Self {
            cache,
            state,
            seen,
            repository_id: repository_id.to_string(),
        }
    }

    pub fn resource_collection(&self) -> String {
        EntityKind::Resource.collection(&self.repository_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Written(WriteOutcome),
    /// The source could not deliver the record; nothing was attempted.
    Unavailable,
}

/// Map one record, upsert it, and fold its access points into the checkpoint.
///
/// The identifier counts as seen even when the write fails, so a transient
/// target error never turns an existing resource into an orphan.
pub fn reconcile_record<T: TargetApi, S: RecordSource>(
    target: &T,
    source: &mut S,
    ctx: &mut SyncContext,
    entry: &PendingRecord,
    mapping: &MappingContext,
) -> Result<RecordOutcome> {
    let Some(record) = source.resolve(entry) else {
        tracing::warn!(
            position = entry.position,
            slug = %entry.label,
            "source record unavailable; skipping",
        );
        return Ok(RecordOutcome::Unavailable);
    };

    let mapped = map_record(&record, mapping);
    if mapped.id_0.trim().is_empty() {
        anyhow::bail!("mapped record has an empty identifier");
    }

    let collection = ctx.resource_collection();
    let outcome = upsert(
        target,
        &mut ctx.cache,
        EntityKind::Resource,
        &mapped.id_0,
        &collection,
        &mapped.resource,
    );
    if !outcome.is_ok() {
        tracing::warn!(id_0 = %mapped.id_0, "resource write failed; keeping it out of the sweep");
    }
    ctx.seen.insert(mapped.id_0.clone());
    ctx.state
        .record_access_points(&mapped.id_0, mapped.access_points);

    Ok(RecordOutcome::Written(outcome))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileTally {
    pub writes: WriteTally,
    pub unavailable: u64,
    pub errored: u64,
}

impl ReconcileTally {
    pub fn record(&mut self, outcome: &Result<RecordOutcome>) {
        match outcome {
            Ok(RecordOutcome::Written(write)) => self.writes.record(write),
            Ok(RecordOutcome::Unavailable) => self.unavailable += 1,
            Err(_) => self.errored += 1,
        }
    }
}
