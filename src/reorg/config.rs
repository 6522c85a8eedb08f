use crate::error::FolioError;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioStoreConfig {
    pub backend: String,
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub proxy_url: String,
    #[serde(default)]
    pub local_root: String,
    pub request_timeout_secs: u64,
}

impl Default for FolioStoreConfig {
    fn default() -> Self {
        Self {
            backend: "github".to_string(),
            api_base: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            proxy_url: String::new(),
            local_root: String::new(),
            request_timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioRetryConfig {
    pub max_attempts: u64,
    pub base_backoff_ms: u64,
}

impl Default for FolioRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FolioConfig {
    pub store: FolioStoreConfig,
    pub retry: FolioRetryConfig,
}

impl FolioConfig {
    pub fn uses_local_backend(&self) -> bool {
        self.store.backend == "local"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialFolioConfig {
    store: Option<FolioStoreConfig>,
    retry: Option<FolioRetryConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn validate(cfg: &FolioConfig) -> Result<()> {
    let store = &cfg.store;
    match store.backend.as_str() {
        "github" => {
            if store.owner.trim().is_empty() || store.repo.trim().is_empty() {
                return Err(anyhow!(
                    "invalid github store: set FOLIO_GITHUB_OWNER and FOLIO_GITHUB_REPO"
                ));
            }
            if !store.api_base.starts_with("http://") && !store.api_base.starts_with("https://")
            {
                return Err(anyhow!("invalid github api base: must be an http(s) URL"));
            }
            if store.branch.trim().is_empty() {
                return Err(anyhow!("invalid github branch: cannot be empty"));
            }
        }
        "local" => {
            if store.local_root.trim().is_empty() {
                return Err(anyhow!(
                    "invalid local store: set FOLIO_LOCAL_ROOT to the site checkout"
                ));
            }
        }
        other => {
            return Err(anyhow!(
                "invalid store backend `{other}`: use `github` or `local`"
            ));
        }
    }
    if store.request_timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    if cfg.retry.max_attempts == 0 {
        return Err(anyhow!("invalid retry max attempts: must be >= 1"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("FOLIO_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    if let Ok(home) = env::var("FOLIO_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed).join("folio.toml"));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".folio").join("folio.toml"))
}

fn merge_file_config(base: &mut FolioConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialFolioConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse folio config {}: {err}", path.display()))?;
    if let Some(store) = parsed.store {
        base.store = store;
    }
    if let Some(retry) = parsed.retry {
        base.retry = retry;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut FolioConfig) {
    cfg.store.backend = env_or_string("FOLIO_STORE_BACKEND", &cfg.store.backend);
    cfg.store.api_base = env_or_string("FOLIO_GITHUB_API_BASE", &cfg.store.api_base);
    cfg.store.owner = env_or_string("FOLIO_GITHUB_OWNER", &cfg.store.owner);
    cfg.store.repo = env_or_string("FOLIO_GITHUB_REPO", &cfg.store.repo);
    cfg.store.branch = env_or_string("FOLIO_GITHUB_BRANCH", &cfg.store.branch);
    cfg.store.proxy_url = env_or_string("FOLIO_PROXY_URL", &cfg.store.proxy_url);
    cfg.store.local_root = env_or_string("FOLIO_LOCAL_ROOT", &cfg.store.local_root);
    cfg.store.request_timeout_secs = env_or_u64(
        "FOLIO_REQUEST_TIMEOUT_SECS",
        cfg.store.request_timeout_secs,
    );
    cfg.retry.max_attempts = env_or_u64("FOLIO_RETRY_MAX_ATTEMPTS", cfg.retry.max_attempts);
    cfg.retry.base_backoff_ms = env_or_u64("FOLIO_RETRY_BACKOFF_MS", cfg.retry.base_backoff_ms);
}

pub fn load_config() -> Result<FolioConfig> {
    let mut cfg = FolioConfig::default();
    merge_file_config(&mut cfg).map_err(|err| FolioError::InvalidConfig(format!("{err:#}")))?;
    apply_env_overrides(&mut cfg);
    validate(&cfg).map_err(|err| FolioError::InvalidConfig(err.to_string()))?;
    Ok(cfg)
}

/// Token for the contents API; kept out of the config file on purpose.
pub fn github_token() -> Option<String> {
    match env::var("FOLIO_GITHUB_TOKEN") {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}
