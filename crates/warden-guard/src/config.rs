//! Configuration loading and enforcement-mode hot reload

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use warden_audit::AuditConfig;
use warden_cache::CacheConfig;

use crate::error::Result;
use crate::mode::{EnforcementMode, EnforcementModeHandle};
use crate::principal::HeaderPrincipalResolver;
use crate::rate_limit::RateLimitConfig;

/// Environment variable prefix; nested keys use `__`, e.g. `WARDEN_AUDIT__QUEUE_CAPACITY`
pub const ENV_PREFIX: &str = "WARDEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_seconds: u64,
    /// Bound on entries held by the in-process store; unbounded when absent
    pub max_entries: Option<usize>,
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.ttl_seconds),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: CacheConfig::default().ttl.as_secs(),
            max_entries: None,
        }
    }
}

/// Top-level Warden configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub mode: EnforcementMode,
    /// Trusted header carrying the authenticated user id
    pub principal_header: String,
    /// Role document (JSON or YAML)
    pub roles_file: Option<PathBuf>,
    /// JSON Lines audit file; audit stays in memory when absent
    pub audit_file: Option<PathBuf>,
    pub cache: CacheSettings,
    pub audit: AuditConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::default(),
            principal_header: HeaderPrincipalResolver::DEFAULT_HEADER.to_string(),
            roles_file: None,
            audit_file: None,
            cache: CacheSettings::default(),
            audit: AuditConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Load defaults, then the optional file, then `WARDEN_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from a file only, ignoring the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Re-read `path` and apply its enforcement mode to `handle`
pub fn reload_mode(path: &Path, handle: &EnforcementModeHandle) -> Result<EnforcementMode> {
    let config = WardenConfig::from_file(path)?;
    handle.set(config.mode);
    Ok(config.mode)
}

/// Applies the enforcement mode whenever the config file changes.
///
/// Watching stops when this value is dropped.
pub struct ModeWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ModeWatcher {
    /// Watch `path` and push mode changes into `handle`.
    ///
    /// The parent directory is watched so editors that replace the file on
    /// save are still picked up. A file that fails to parse leaves the
    /// current mode untouched.
    pub fn spawn(path: impl Into<PathBuf>, handle: EnforcementModeHandle) -> Result<Self> {
        let path: PathBuf = path.into();
        let watched = path.clone();
        let file_name = path.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|changed| changed.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_file {
                        return;
                    }
                    match reload_mode(&watched, &handle) {
                        Ok(mode) => info!(
                            path = %watched.display(),
                            mode = %mode,
                            "Reloaded enforcement mode"
                        ),
                        Err(e) => warn!(
                            path = %watched.display(),
                            error = %e,
                            "Ignoring unreadable config change"
                        ),
                    }
                }
                Err(e) => error!("Config watch error: {}", e),
            },
            notify::Config::default(),
        )?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = WardenConfig::load(None).unwrap();
        assert_eq!(config.principal_header, "x-user-id");
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.audit.queue_capacity, 10_000);
    }

    #[test]
    fn test_missing_file_is_optional_for_load() {
        let dir = TempDir::new().unwrap();
        let config = WardenConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(
            &path,
            r#"
mode = "dry-run"
principal_header = "x-authenticated-user"

[cache]
ttl_seconds = 30
max_entries = 5000

[audit]
queue_capacity = 256

[rate_limit]
max_requests = 10

[rate_limit.route_limits."/login"]
max_requests = 3
window_seconds = 300
"#,
        )
        .unwrap();

        let config = WardenConfig::from_file(&path).unwrap();
        assert_eq!(config.mode, EnforcementMode::DryRun);
        assert_eq!(config.principal_header, "x-authenticated-user");
        assert_eq!(config.cache.cache_config().ttl, Duration::from_secs(30));
        assert_eq!(config.cache.max_entries, Some(5000));
        assert_eq!(config.audit.queue_capacity, 256);
        assert_eq!(config.audit.batch_size, 100);
        assert_eq!(config.rate_limit.limit_for("/login").max_requests, 3);
        assert_eq!(config.rate_limit.limit_for("/other").max_requests, 10);
    }

    #[test]
    fn test_reload_mode_applies_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.yaml");
        std::fs::write(&path, "mode: disabled\n").unwrap();

        let handle = EnforcementModeHandle::new(EnforcementMode::Enforce);
        assert_eq!(reload_mode(&path, &handle).unwrap(), EnforcementMode::Disabled);
        assert_eq!(handle.get(), EnforcementMode::Disabled);
    }

    #[test]
    fn test_reload_mode_keeps_mode_on_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.yaml");
        std::fs::write(&path, "mode: sideways\n").unwrap();

        let handle = EnforcementModeHandle::new(EnforcementMode::DryRun);
        assert!(reload_mode(&path, &handle).is_err());
        assert_eq!(handle.get(), EnforcementMode::DryRun);
    }
}
