use crate::aspace::{ApiError, EntityKind, TargetApi};
use crate::sync::cache::{CacheEntry, IdentityCache};
use crate::sync::util::truncate_with_ellipsis;
use serde::Serialize;
use serde_json::Value;

const MAX_LOGGED_BODY_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated { retried: bool },
    Failed(String),
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteTally {
    pub created: u64,
    pub updated: u64,
    pub conflict_retries: u64,
    pub failed: u64,
}

impl WriteTally {
    pub fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.created += 1,
            WriteOutcome::Updated { retried } => {
                self.updated += 1;
                if *retried {
                    self.conflict_retries += 1;
                }
            }
            WriteOutcome::Failed(_) => self.failed += 1,
        }
    }
}

fn describe(err: &ApiError) -> String {
    truncate_with_ellipsis(&err.to_string(), MAX_LOGGED_BODY_CHARS)
}

/// Submit a new record and cache the handle the target returns.
pub fn create<T: TargetApi>(
    target: &T,
    cache: &mut IdentityCache,
    kind: EntityKind,
    key: &str,
    collection: &str,
    document: &Value,
) -> WriteOutcome {
    let body = match target.create(collection, document) {
        Ok(body) => body,
        Err(err) => {
            let reason = describe(&err);
            tracing::error!(kind = kind.label(), id_0 = %key, error = %reason, "create failed");
            return WriteOutcome::Failed(reason);
        }
    };
    let Some(entry) = CacheEntry::from_response(&body) else {
        let reason = format!("create response missing id/uri/lock_version: {body}");
        tracing::error!(kind = kind.label(), id_0 = %key, error = %reason, "create failed");
        return WriteOutcome::Failed(reason);
    };
    tracing::info!(kind = kind.label(), id_0 = %key, uri = %entry.uri, "created");
    cache.insert(kind, key, entry);
    WriteOutcome::Created
}

fn current_lock_version(document: &Value) -> Option<u64> {
    document.get("lock_version").and_then(Value::as_u64)
}

fn merge_over(base: Value, fields: &Value) -> Option<Value> {
    let mut merged = match base {
        Value::Object(map) => map,
        _ => return None,
    };
    for (k, v) in fields.as_object()? {
        merged.insert(k.clone(), v.clone());
    }
    Some(Value::Object(merged))
}

/// Merge `fields` over the stored record and submit it.
///
/// The merge base is always fetched fresh. A version conflict triggers exactly
/// one refetch of the lock version and one resubmit; nothing retries after that.
pub fn update<T: TargetApi>(
    target: &T,
    cache: &mut IdentityCache,
    kind: EntityKind,
    key: &str,
    fields: &Value,
) -> WriteOutcome {
    let Some(entry) = cache.get(kind, key).cloned() else {
        return WriteOutcome::Failed(format!("{} {key} is not cached", kind.label()));
    };

    let base = match target.fetch(&entry.uri) {
        Ok(base) => base,
        Err(err) => {
            let reason = format!("failed to fetch merge base: {}", describe(&err));
            tracing::error!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                error = %reason,
                "cannot update"
            );
            return WriteOutcome::Failed(reason);
        }
    };
    let Some(lock_version) = current_lock_version(&base) else {
        let reason = "stored record has no lock_version".to_string();
        tracing::error!(
            kind = kind.label(),
            id_0 = %key,
            uri = %entry.uri,
            "cannot update: {reason}"
        );
        return WriteOutcome::Failed(reason);
    };
    let Some(mut merged) = merge_over(base, fields) else {
        return WriteOutcome::Failed("merge base or update fields are not JSON objects".to_string());
    };
    merged["uri"] = Value::String(entry.uri.clone());
    merged["lock_version"] = Value::from(lock_version);

    let retried = match target.post(&entry.uri, &merged) {
        Ok(body) => {
            record_new_version(cache, kind, key, &body, lock_version);
            tracing::info!(kind = kind.label(), id_0 = %key, uri = %entry.uri, "updated");
            return WriteOutcome::Updated { retried: false };
        }
        Err(err) if err.is_conflict() => {
            tracing::warn!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                "version conflict; refetching lock_version and retrying once"
            );
            true
        }
        Err(err) => {
            let reason = describe(&err);
            tracing::error!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                error = %reason,
                "update failed"
            );
            return WriteOutcome::Failed(reason);
        }
    };

    let refetched = match target.fetch(&entry.uri).map(|doc| current_lock_version(&doc)) {
        Ok(Some(version)) => version,
        Ok(None) => {
            let reason = "lock_version missing after refetch".to_string();
            tracing::error!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                "cannot update: {reason}"
            );
            return WriteOutcome::Failed(reason);
        }
        Err(err) => {
            let reason = format!("refetch after conflict failed: {}", describe(&err));
            tracing::error!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                error = %reason,
                "cannot update"
            );
            return WriteOutcome::Failed(reason);
        }
    };
    merged["lock_version"] = Value::from(refetched);

    match target.post(&entry.uri, &merged) {
        Ok(body) => {
            record_new_version(cache, kind, key, &body, refetched);
            tracing::info!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                "updated after retry"
            );
            WriteOutcome::Updated { retried }
        }
        Err(err) => {
            let reason = format!("update failed after retry: {}", describe(&err));
            tracing::error!(
                kind = kind.label(),
                id_0 = %key,
                uri = %entry.uri,
                error = %reason,
                "giving up on update"
            );
            WriteOutcome::Failed(reason)
        }
    }
}

fn record_new_version(
    cache: &mut IdentityCache,
    kind: EntityKind,
    key: &str,
    body: &Value,
    submitted: u64,
) {
    let version = current_lock_version(body).unwrap_or(submitted + 1);
    cache.set_lock_version(kind, key, version);
}

/// Update when the key is cached, otherwise create.
pub fn upsert<T: TargetApi>(
    target: &T,
    cache: &mut IdentityCache,
    kind: EntityKind,
    key: &str,
    collection: &str,
    document: &Value,
) -> WriteOutcome {
    if cache.contains(kind, key) {
        update(target, cache, kind, key, document)
    } else {
        create(target, cache, kind, key, collection, document)
    }
}
