use crate::aspace::{ApiError, EntityKind, TargetApi};
use serde_json::Value;
use std::collections::BTreeMap;

/// The target system's handle for one business identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub internal_id: u64,
    pub uri: String,
    pub lock_version: u64,
}

impl CacheEntry {
    /// Read `{id, uri, lock_version}` from a stored record or a create response.
    pub fn from_response(body: &Value) -> Option<Self> {
        Some(Self {
            internal_id: body.get("id").and_then(Value::as_u64)?,
            uri: body.get("uri").and_then(Value::as_str)?.to_string(),
            lock_version: body.get("lock_version").and_then(Value::as_u64)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapStats {
    pub listed: usize,
    pub cached: usize,
    pub unkeyed: usize,
    pub fetch_failed: usize,
}

/// Business identifier → target handle, one independent map per entity kind.
#[derive(Debug, Clone, Default)]
pub struct IdentityCache {
    resources: BTreeMap<String, CacheEntry>,
    subjects: BTreeMap<String, CacheEntry>,
    agents: BTreeMap<String, CacheEntry>,
}

impl IdentityCache {
    fn map(&self, kind: EntityKind) -> &BTreeMap<String, CacheEntry> {
        match kind {
            EntityKind::Resource => &self.resources,
            EntityKind::Subject => &self.subjects,
            EntityKind::Agent => &self.agents,
        }
    }

    fn map_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<String, CacheEntry> {
        match kind {
            EntityKind::Resource => &mut self.resources,
            EntityKind::Subject => &mut self.subjects,
            EntityKind::Agent => &mut self.agents,
        }
    }

    pub fn get(&self, kind: EntityKind, key: &str) -> Option<&CacheEntry> {
        self.map(kind).get(key)
    }

    pub fn contains(&self, kind: EntityKind, key: &str) -> bool {
        self.map(kind).contains_key(key)
    }

    pub fn insert(&mut self, kind: EntityKind, key: &str, entry: CacheEntry) {
        self.map_mut(kind).insert(key.to_string(), entry);
    }

    pub fn remove(&mut self, kind: EntityKind, key: &str) -> Option<CacheEntry> {
        self.map_mut(kind).remove(key)
    }

    pub fn set_lock_version(&mut self, kind: EntityKind, key: &str, lock_version: u64) {
        if let Some(entry) = self.map_mut(kind).get_mut(key) {
            entry.lock_version = lock_version;
        }
    }

    pub fn keys(&self, kind: EntityKind) -> impl Iterator<Item = &String> {
        self.map(kind).keys()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.map(kind).len()
    }

    /// List and fetch every record of one kind and index it by business key.
    ///
    /// A failed listing is fatal for the run; a failed single fetch or a record
    /// without a key only drops that record from the cache.
    pub fn load_kind<T: TargetApi>(
        &mut self,
        target: &T,
        kind: EntityKind,
        repository_id: &str,
    ) -> Result<BootstrapStats, ApiError> {
        let collection = kind.collection(repository_id);
        let ids = target.list_all_ids(&collection)?;
        let mut stats = BootstrapStats {
            listed: ids.len(),
            ..BootstrapStats::default()
        };

        for id in ids {
            let uri = format!("{collection}/{id}");
            let record = match target.fetch(&uri) {
                Ok(record) => record,
                Err(err) => {
                    stats.fetch_failed += 1;
                    tracing::warn!(
                        kind = kind.label(),
                        %uri,
                        error = %err,
                        "skipping record during cache bootstrap",
                    );
                    continue;
                }
            };
            let Some(key) = kind.business_key(&record) else {
                stats.unkeyed += 1;
                tracing::warn!(
                    kind = kind.label(),
                    %uri,
                    "record has no business key; left out of the cache",
                );
                continue;
            };
            let entry = CacheEntry {
                internal_id: id,
                uri: record
                    .get("uri")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| uri.clone()),
                lock_version: record
                    .get("lock_version")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            };
            if self.map_mut(kind).insert(key.clone(), entry).is_some() {
                tracing::warn!(
                    kind = kind.label(),
                    %key,
                    %uri,
                    "duplicate business key in target; later record wins",
                );
            }
            stats.cached += 1;
        }

        Ok(stats)
    }

    pub fn bootstrap<T: TargetApi>(
        target: &T,
        repository_id: &str,
    ) -> Result<(Self, BTreeMap<EntityKind, BootstrapStats>), ApiError> {
        let mut cache = Self::default();
        let mut stats = BTreeMap::new();
        for kind in EntityKind::ALL {
            let kind_stats = cache.load_kind(target, kind, repository_id)?;
            tracing::info!(
                kind = kind.label(),
                listed = kind_stats.listed,
                cached = kind_stats.cached,
                unkeyed = kind_stats.unkeyed,
                fetch_failed = kind_stats.fetch_failed,
                "identity cache loaded"
            );
            stats.insert(kind, kind_stats);
        }
        Ok((cache, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspace::fake::FakeTarget;
    use serde_json::json;

    #[test]
    fn bootstrap_indexes_each_kind_separately() {
        let target = FakeTarget::new();
        target.seed("/repositories/2/resources", json!({"id_0": "Fishing"}));
        target.seed("/subjects", json!({"terms": [{"term": "Fishing"}]}));
        target.seed(
            "/agents/corporate_entities",
            json!({"names": [{"primary_name": "Dept. of Fisheries"}]}),
        );

        let (cache, stats) = IdentityCache::bootstrap(&target, "2").expect("bootstrap");

        let resource = cache.get(EntityKind::Resource, "Fishing").expect("resource");
        let subject = cache.get(EntityKind::Subject, "Fishing").expect("subject");
        assert_ne!(resource.uri, subject.uri);
        assert!(cache.contains(EntityKind::Agent, "Dept. of Fisheries"));
        assert_eq!(stats[&EntityKind::Resource].cached, 1);
    }

    #[test]
    fn records_without_keys_or_failed_fetches_are_left_out() {
        let target = FakeTarget::new();
        target.seed("/repositories/2/resources", json!({"id_0": "GR-0001"}));
        target.seed("/repositories/2/resources", json!({"title": "no identifier"}));
        let broken = target.seed("/repositories/2/resources", json!({"id_0": "GR-0003"}));
        target.fail_fetch(&broken);

        let mut cache = IdentityCache::default();
        let stats = cache
            .load_kind(&target, EntityKind::Resource, "2")
            .expect("load");

        assert_eq!(stats.listed, 3);
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.unkeyed, 1);
        assert_eq!(stats.fetch_failed, 1);
        assert_eq!(cache.len(EntityKind::Resource), 1);
    }

    #[test]
    fn create_response_yields_cache_entry() {
        let entry = CacheEntry::from_response(&json!({
            "status": "Created", "id": 7, "uri": "/subjects/7", "lock_version": 0
        }))
        .expect("entry");
        assert_eq!(entry.internal_id, 7);
        assert_eq!(entry.uri, "/subjects/7");
        assert!(CacheEntry::from_response(&json!({"status": "Created"})).is_none());
    }
}
