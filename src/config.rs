//! Layered configuration.
//!
//! Sources, lowest to highest priority: built-in defaults, the user file
//! `~/.nexus/config.toml`, the project file `<project>/.nexus.toml`, then
//! `NEXUS_*` environment variables. Files may set any subset of keys.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestration::{EngineOptions, ErrorStrategy};
use crate::{nlog_debug, nlog_warn, Error, Result};

pub const PROJECT_CONFIG_FILE: &str = ".nexus.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_parallel_tasks: usize,
    pub task_timeout_minutes: u64,
    pub error_strategy: ErrorStrategy,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 5,
            task_timeout_minutes: 10,
            error_strategy: ErrorStrategy::Ask,
            max_retries: 3,
            retry_delay_seconds: 5,
        }
    }
}

impl From<&ExecutionConfig> for EngineOptions {
    fn from(config: &ExecutionConfig) -> Self {
        EngineOptions {
            max_parallel: config.max_parallel_tasks.max(1),
            task_timeout: Duration::from_secs(config.task_timeout_minutes.saturating_mul(60)),
            error_strategy: config.error_strategy,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relative paths resolve against the project root.
    pub checkpoint_dir: String,
    pub log_dir: String,
    pub execution: ExecutionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_dir: ".nexus-temp/checkpoints".to_string(),
            log_dir: ".nexus-temp/logs".to_string(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Config {
    pub fn nexus_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".nexus"))
    }

    pub fn user_config_path() -> Result<PathBuf> {
        Ok(Self::nexus_dir()?.join("config.toml"))
    }

    pub fn project_config_path(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_CONFIG_FILE)
    }

    /// Load the effective configuration for a project.
    pub fn load(project_root: &Path) -> Result<Self> {
        let user = Self::user_config_path().ok();
        let project = Self::project_config_path(project_root);
        Self::load_layers(user.as_deref(), Some(&project), |key| std::env::var(key).ok())
    }

    /// Merge the given files (missing files are skipped) and then apply
    /// environment overrides read through `env`.
    pub fn load_layers<F>(user: Option<&Path>, project: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = toml::Value::try_from(Self::default())?;
        for path in [user, project].into_iter().flatten() {
            if !path.exists() {
                nlog_debug!("Config layer not found: {}", path.display());
                continue;
            }
            nlog_debug!("Config::load layer={}", path.display());
            let layer: toml::Value = toml::from_str(&fs::read_to_string(path)?)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            merge_toml(&mut merged, layer);
        }

        let mut config: Self = merged
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(e.to_string()))?;
        config.apply_env(env);
        config.validate()?;
        nlog_debug!(
            "Config loaded: max_parallel={} timeout_min={} strategy={} max_retries={} delay_s={}",
            config.execution.max_parallel_tasks,
            config.execution.task_timeout_minutes,
            config.execution.error_strategy,
            config.execution.max_retries,
            config.execution.retry_delay_seconds
        );
        Ok(config)
    }

    /// Apply `NEXUS_*` overrides. Values that fail to parse are logged and
    /// ignored.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let exec = &mut self.execution;
        if let Some(v) = parse_env(&env, "NEXUS_MAX_PARALLEL_TASKS") {
            exec.max_parallel_tasks = v;
        }
        if let Some(v) = parse_env(&env, "NEXUS_TASK_TIMEOUT") {
            exec.task_timeout_minutes = v;
        }
        if let Some(v) = parse_env(&env, "NEXUS_ERROR_STRATEGY") {
            exec.error_strategy = v;
        }
        if let Some(v) = parse_env(&env, "NEXUS_MAX_RETRIES") {
            exec.max_retries = v;
        }
        if let Some(v) = parse_env(&env, "NEXUS_RETRY_DELAY") {
            exec.retry_delay_seconds = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.max_parallel_tasks == 0 {
            return Err(Error::Config(
                "execution.max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        if self.execution.task_timeout_minutes == 0 {
            return Err(Error::Config(
                "execution.task_timeout_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::from(&self.execution)
    }

    pub fn checkpoint_dir(&self, project_root: &Path) -> PathBuf {
        resolve_dir(&self.checkpoint_dir, project_root)
    }

    pub fn log_dir(&self, project_root: &Path) -> PathBuf {
        resolve_dir(&self.log_dir, project_root)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write this configuration as the project file.
    pub fn save_project(&self, project_root: &Path) -> Result<PathBuf> {
        let path = Self::project_config_path(project_root);
        fs::write(&path, self.to_toml()?)?;
        nlog_debug!("Config saved to {}", path.display());
        Ok(path)
    }
}

fn parse_env<F, T>(env: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            nlog_warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, other values
/// replace.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn resolve_dir(dir: &str, project_root: &Path) -> PathBuf {
    let path = expand_tilde(dir);
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
