use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config invalid or incomplete: {0}")]
    InvalidConfig(String),
    #[error("another sync run holds the lock: {0}")]
    Locked(String),
    #[error("source paging failed {attempts} times in a row at offset {offset}: {last_error}")]
    PageRetriesExhausted {
        attempts: u32,
        offset: u64,
        last_error: String,
    },
    #[error("checkpoint file unreadable: {0}")]
    StateCorrupt(String),
}

impl SyncError {
    pub fn code(&self) -> SyncErrorCode {
        match self {
            Self::InvalidConfig(_) => SyncErrorCode::E002ConfigInvalid,
            Self::Locked(_) => SyncErrorCode::E001Locked,
            Self::PageRetriesExhausted { .. } => SyncErrorCode::E003SourceUnreachable,
            Self::StateCorrupt(_) => SyncErrorCode::E004StateCorrupt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCode {
    E001Locked,
    E002ConfigInvalid,
    E003SourceUnreachable,
    E004StateCorrupt,
}

impl SyncErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ConfigInvalid => "E002_CONFIG_INVALID",
            Self::E003SourceUnreachable => "E003_SOURCE_UNREACHABLE",
            Self::E004StateCorrupt => "E004_STATE_CORRUPT",
        }
    }
}
