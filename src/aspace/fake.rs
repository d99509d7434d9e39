use crate::aspace::{ApiError, ApiResult, TargetApi};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// In-memory stand-in for the target system with optimistic locking and
/// scriptable failures.
#[derive(Default)]
pub struct FakeTarget {
    docs: RefCell<BTreeMap<String, Value>>,
    next_id: RefCell<u64>,
    post_failures: RefCell<VecDeque<ApiError>>,
    create_failures: RefCell<VecDeque<ApiError>>,
    fetch_failures: RefCell<BTreeSet<String>>,
    delete_failures: RefCell<BTreeSet<String>>,
    calls: RefCell<Vec<String>>,
}

pub fn conflict() -> ApiError {
    ApiError::Status {
        status: 409,
        body: r#"{"error":{"lock_version":["The record you tried to update has been modified since you fetched it."]}}"#
            .to_string(),
    }
}

fn not_found(uri: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("{{\"error\":\"Record not found: {uri}\"}}"),
    }
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self, collection: &str) -> (u64, String) {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        (*next, format!("{}/{}", collection.trim_end_matches('/'), *next))
    }

    /// Store a record directly, bypassing the call log.
    pub fn seed(&self, collection: &str, mut document: Value) -> String {
        let (id, uri) = self.allocate(collection);
        document["id"] = json!(id);
        document["uri"] = json!(uri);
        document["lock_version"] = json!(0);
        self.docs.borrow_mut().insert(uri.clone(), document);
        uri
    }

    pub fn fail_next_post(&self, err: ApiError) {
        self.post_failures.borrow_mut().push_back(err);
    }

    pub fn fail_next_create(&self, err: ApiError) {
        self.create_failures.borrow_mut().push_back(err);
    }

    pub fn fail_fetch(&self, uri: &str) {
        self.fetch_failures.borrow_mut().insert(uri.to_string());
    }

    pub fn fail_delete(&self, uri: &str) {
        self.delete_failures.borrow_mut().insert(uri.to_string());
    }

    /// Simulate another editor saving the record.
    pub fn bump_lock_version(&self, uri: &str) {
        if let Some(doc) = self.docs.borrow_mut().get_mut(uri) {
            let current = doc["lock_version"].as_u64().unwrap_or(0);
            doc["lock_version"] = json!(current + 1);
        }
    }

    pub fn doc(&self, uri: &str) -> Option<Value> {
        self.docs.borrow().get(uri).cloned()
    }

    pub fn docs_in(&self, collection: &str) -> Vec<Value> {
        let prefix = format!("{}/", collection.trim_end_matches('/'));
        self.docs
            .borrow()
            .iter()
            .filter(|(uri, _)| uri.starts_with(&prefix))
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn log(&self, line: String) {
        self.calls.borrow_mut().push(line);
    }
}

impl TargetApi for FakeTarget {
    fn list_all_ids(&self, collection: &str) -> ApiResult<Vec<u64>> {
        self.log(format!("list {collection}"));
        Ok(self
            .docs_in(collection)
            .iter()
            .filter_map(|doc| doc["id"].as_u64())
            .collect())
    }

    fn fetch(&self, uri: &str) -> ApiResult<Value> {
        self.log(format!("fetch {uri}"));
        if self.fetch_failures.borrow().contains(uri) {
            return Err(ApiError::Transport(format!("connection reset fetching {uri}")));
        }
        self.doc(uri).ok_or_else(|| not_found(uri))
    }

    fn create(&self, collection: &str, document: &Value) -> ApiResult<Value> {
        self.log(format!("create {collection}"));
        if let Some(err) = self.create_failures.borrow_mut().pop_front() {
            return Err(err);
        }
        let uri = self.seed(collection, document.clone());
        let stored = self.doc(&uri).unwrap_or_default();
        Ok(json!({
            "status": "Created",
            "id": stored["id"],
            "lock_version": 0,
            "uri": uri,
            "warnings": [],
        }))
    }

    fn post(&self, uri: &str, document: &Value) -> ApiResult<Value> {
        self.log(format!("post {uri}"));
        if let Some(err) = self.post_failures.borrow_mut().pop_front() {
            return Err(err);
        }
        let mut docs = self.docs.borrow_mut();
        let Some(stored) = docs.get_mut(uri) else {
            return Err(not_found(uri));
        };
        let current = stored["lock_version"].as_u64().unwrap_or(0);
        if document.get("lock_version").and_then(Value::as_u64) != Some(current) {
            return Err(conflict());
        }
        let id = stored["id"].clone();
        let mut next = document.clone();
        next["lock_version"] = json!(current + 1);
        next["id"] = id.clone();
        *stored = next;
        Ok(json!({
            "status": "Updated",
            "id": id,
            "lock_version": current + 1,
            "uri": uri,
        }))
    }

    fn delete(&self, uri: &str) -> ApiResult<()> {
        self.log(format!("delete {uri}"));
        if self.delete_failures.borrow().contains(uri) {
            return Err(ApiError::Status {
                status: 500,
                body: "delete refused".to_string(),
            });
        }
        match self.docs.borrow_mut().remove(uri) {
            Some(_) => Ok(()),
            None => Err(not_found(uri)),
        }
    }
}
