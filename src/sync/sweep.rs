use crate::aspace::{EntityKind, TargetApi};
use crate::sync::reconcile::SyncContext;
use crate::sync::util::pause;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Cached resource identifiers that were not observed this run.
pub fn orphans(ctx: &SyncContext) -> Vec<String> {
    ctx.cache
        .keys(EntityKind::Resource)
        .filter(|id_0| !ctx.seen.contains(*id_0))
        .cloned()
        .collect()
}

/// Delete every orphaned resource. Subjects and agents are never swept.
///
/// A failed delete keeps its cache entry so the next run tries again.
pub fn sweep_orphans<T: TargetApi>(
    target: &T,
    ctx: &mut SyncContext,
    delay: Duration,
) -> SweepOutcome {
    let mut out = SweepOutcome::default();
    for id_0 in orphans(ctx) {
        let Some(entry) = ctx.cache.get(EntityKind::Resource, &id_0).cloned() else {
            continue;
        };
        pause(delay);
        match target.delete(&entry.uri) {
            Ok(()) => {
                tracing::info!(id_0 = %id_0, uri = %entry.uri, "deleted orphaned resource");
                ctx.cache.remove(EntityKind::Resource, &id_0);
                out.deleted.push(id_0);
            }
            Err(err) => {
                tracing::error!(
                    id_0 = %id_0,
                    uri = %entry.uri,
                    error = %err,
                    "failed to delete orphaned resource",
                );
                out.failed.push(id_0);
            }
        }
    }
    out
}
