use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SyncPaths {
    pub home: PathBuf,
    pub state_file: PathBuf,
    pub logs_dir: PathBuf,
    pub config_file: PathBuf,
}

impl SyncPaths {
    /// Lay out every path under a single directory.
    pub fn rooted_at(home: PathBuf) -> Self {
        Self {
            state_file: home.join("state").join("state.json"),
            logs_dir: home.join("logs"),
            config_file: home.join("config.toml"),
            home,
        }
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }

    pub fn run_lock(&self) -> PathBuf {
        self.logs_dir.join("aspace-sync.run.lock")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<SyncPaths> {
    let home = match env::var("ASPACE_SYNC_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".aspace-sync"),
    };
    let defaults = SyncPaths::rooted_at(home);

    Ok(SyncPaths {
        state_file: env_or_default_path("ASPACE_SYNC_STATE_FILE", defaults.state_file),
        logs_dir: env_or_default_path("ASPACE_SYNC_LOGS_DIR", defaults.logs_dir),
        config_file: env_or_default_path("ASPACE_SYNC_CONFIG_PATH", defaults.config_file),
        home: defaults.home,
    })
}
