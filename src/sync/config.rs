use crate::error::SyncError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const SOURCE_RETRY_MAX_ATTEMPTS: u32 = 288;
pub const SOURCE_RETRY_INTERVAL_SECS: u64 = 300;
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub repository_id: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            repository_id: "2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomConfig {
    pub api_url: String,
    pub api_key: String,
    pub query: String,
    pub public_url: String,
    pub cert_path: Option<PathBuf>,
    pub wait_secs: u64,
}

impl Default for AtomConfig {
    fn default() -> Self {
        Self {
            api_url: "https://search-bcarchives.royalbcmuseum.bc.ca/api".to_string(),
            api_key: String::new(),
            query: "sq0=GR*&sf0=referenceCode&levels=197".to_string(),
            public_url: "https://search-bcarchives.royalbcmuseum.bc.ca".to_string(),
            cert_path: None,
            wait_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub path: PathBuf,
    pub wait_secs: u64,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.csv"),
            wait_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub page_limit: u64,
    pub max_page_failures: u32,
    /// Falls back to the active source's wait when unset.
    pub sweep_delay_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            page_limit: 30,
            max_page_failures: 10,
            sweep_delay_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    pub target: TargetConfig,
    pub atom: AtomConfig,
    pub csv: CsvConfig,
    pub run: RunConfig,
}

/// Credentials needed before any call against the target system.
#[derive(Debug, Clone)]
pub struct TargetCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl SyncConfig {
    pub fn require_target(&self) -> Result<TargetCredentials, SyncError> {
        let mut missing = Vec::new();
        if self.target.base_url.trim().is_empty() {
            missing.push("ARCHIVESSPACE_URL");
        }
        if self.target.username.trim().is_empty() {
            missing.push("ARCHIVESSPACE_USER");
        }
        if self.target.password.is_empty() {
            missing.push("ARCHIVESSPACE_PASS");
        }
        if !missing.is_empty() {
            return Err(SyncError::InvalidConfig(format!(
                "missing target settings: {}",
                missing.join(", ")
            )));
        }
        Ok(TargetCredentials {
            base_url: self.target.base_url.trim().trim_end_matches('/').to_string(),
            username: self.target.username.trim().to_string(),
            password: self.target.password.clone(),
        })
    }

    pub fn require_atom_key(&self) -> Result<&str, SyncError> {
        let key = self.atom.api_key.trim();
        if key.is_empty() {
            return Err(SyncError::InvalidConfig(
                "missing source setting: ATOM_API_TOKEN".to_string(),
            ));
        }
        Ok(key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSyncConfig {
    target: Option<TargetConfig>,
    atom: Option<AtomConfig>,
    csv: Option<CsvConfig>,
    run: Option<RunConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_opt_u64(var: &str, fallback: Option<u64>) -> Option<u64> {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_path(var: &str, fallback: &Path) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback.to_path_buf(),
    }
}

fn validate(cfg: &SyncConfig) -> Result<(), SyncError> {
    let invalid = |msg: String| Err(SyncError::InvalidConfig(msg));
    if cfg.run.page_limit == 0 {
        return invalid("invalid page limit: must be >= 1".to_string());
    }
    if cfg.run.max_page_failures == 0 {
        return invalid("invalid max page failures: must be >= 1".to_string());
    }
    if cfg.atom.query.trim().is_empty() {
        return invalid("invalid source query: cannot be empty".to_string());
    }
    if cfg.target.repository_id.trim().parse::<u64>().is_err() {
        return invalid(format!(
            "invalid repository id `{}`: must be numeric",
            cfg.target.repository_id
        ));
    }
    Ok(())
}

fn merge_file_config(base: &mut SyncConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialSyncConfig = toml::from_str(&raw).map_err(|err| {
        SyncError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(target) = parsed.target {
        base.target = target;
    }
    if let Some(atom) = parsed.atom {
        base.atom = atom;
    }
    if let Some(csv) = parsed.csv {
        base.csv = csv;
    }
    if let Some(run) = parsed.run {
        base.run = run;
    }
    Ok(())
}

fn apply_env(cfg: &mut SyncConfig) {
    cfg.target.base_url = env_or_string("ARCHIVESSPACE_URL", &cfg.target.base_url);
    cfg.target.username = env_or_string("ARCHIVESSPACE_USER", &cfg.target.username);
    if let Ok(pass) = env::var("ARCHIVESSPACE_PASS") {
        if !pass.is_empty() {
            cfg.target.password = pass;
        }
    }
    cfg.target.repository_id = env_or_string("REPOSITORY_ID", &cfg.target.repository_id);

    cfg.atom.api_url = env_or_string("ATOM_API_URL", &cfg.atom.api_url);
    cfg.atom.api_key = env_or_string("ATOM_API_TOKEN", &cfg.atom.api_key);
    cfg.atom.query = env_or_string("ATOM_INFORMATION_OBJECTS_QUERY", &cfg.atom.query);
    cfg.atom.public_url = env_or_string("ATOM_PUBLIC_URL", &cfg.atom.public_url);
    if let Ok(cert) = env::var("ATOM_CERT_PATH") {
        if !cert.trim().is_empty() {
            cfg.atom.cert_path = Some(PathBuf::from(cert.trim()));
        }
    }
    cfg.atom.wait_secs = env_or_u64("ATOM_WAIT_SECONDS", cfg.atom.wait_secs);

    cfg.csv.path = env_or_path("ASPACE_SYNC_CSV_PATH", &cfg.csv.path);
    cfg.csv.wait_secs = env_or_u64("ASPACE_SYNC_CSV_WAIT_SECONDS", cfg.csv.wait_secs);

    cfg.run.page_limit = env_or_u64("ASPACE_SYNC_PAGE_LIMIT", cfg.run.page_limit);
    cfg.run.max_page_failures = env_or_u64(
        "ASPACE_SYNC_MAX_PAGE_FAILURES",
        u64::from(cfg.run.max_page_failures),
    )
    .try_into()
    .unwrap_or(u32::MAX);
    cfg.run.sweep_delay_secs =
        env_or_opt_u64("ASPACE_SYNC_SWEEP_DELAY_SECS", cfg.run.sweep_delay_secs);
}

pub fn load_config(config_file: &Path) -> Result<SyncConfig> {
    let mut cfg = SyncConfig::default();
    merge_file_config(&mut cfg, config_file)?;
    apply_env(&mut cfg);
    cfg.atom.api_url = cfg.atom.api_url.trim_end_matches('/').to_string();
    cfg.atom.public_url = cfg.atom.public_url.trim_end_matches('/').to_string();

    validate(&cfg)?;
    Ok(cfg)
}
