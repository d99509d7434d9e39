pub mod client;
#[cfg(test)]
pub mod fake;

use serde_json::Value;
use thiserror::Error;

const CONFLICT_MARKER: &str = "modified since you fetched it";

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for an optimistic-lock rejection: the record changed since it was fetched.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 409, body } if body.contains(CONFLICT_MARKER))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Authenticated operations against the target archival system.
///
/// Implementations do not retry; callers own the retry policy.
pub trait TargetApi {
    fn list_all_ids(&self, collection: &str) -> ApiResult<Vec<u64>>;
    fn fetch(&self, uri: &str) -> ApiResult<Value>;
    fn create(&self, collection: &str, document: &Value) -> ApiResult<Value>;
    fn post(&self, uri: &str, document: &Value) -> ApiResult<Value>;
    fn delete(&self, uri: &str) -> ApiResult<()>;
}

/// The three target collections the sync keeps an identity cache for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    Resource,
    Subject,
    Agent,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Resource, Self::Subject, Self::Agent];

    pub fn label(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Subject => "subject",
            Self::Agent => "corporate agent",
        }
    }

    pub fn collection(self, repository_id: &str) -> String {
        match self {
            Self::Resource => format!("/repositories/{repository_id}/resources"),
            Self::Subject => "/subjects".to_string(),
            Self::Agent => "/agents/corporate_entities".to_string(),
        }
    }

    /// Business key of a stored record: `id_0`, first term, or first primary name.
    pub fn business_key(self, record: &Value) -> Option<String> {
        let key = match self {
            Self::Resource => record.get("id_0").and_then(Value::as_str),
            Self::Subject => record
                .get("terms")
                .and_then(Value::as_array)
                .and_then(|terms| terms.first())
                .and_then(|term| term.get("term"))
                .and_then(Value::as_str),
            Self::Agent => record
                .get("names")
                .and_then(Value::as_array)
                .and_then(|names| names.first())
                .and_then(|name| name.get("primary_name"))
                .and_then(Value::as_str),
        }?;
        let key = key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}
