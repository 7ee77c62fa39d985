//! Configuration for distfork.
//!
//! Configuration is read from a TOML file and then adjusted by `DFK_*`
//! environment overrides:
//!
//! ```toml
//! [general]
//! log_level = "warn"
//! work_root = "/var/tmp/distfork"
//!
//! [[workers]]
//! name = "builder-1"
//! labels = ["linux", "x86_64"]
//! executors = 4
//!
//! [[clouds]]
//! name = "spot"
//! labels = ["linux"]
//!
//! [security]
//! build_principals = ["*"]
//! ```

pub mod env;

pub use env::{EnvError, EnvParser};

use crate::errors::DfkError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Wildcard granting a permission to every principal.
pub const ANY_PRINCIPAL: &str = "*";

/// Top-level distfork configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DfkConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub clouds: Vec<CloudConfig>,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Root under which workers without an explicit `root` keep scratch dirs.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            work_root: default_work_root(),
        }
    }
}

/// A worker node able to run tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Directory holding this worker's scratch dirs.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Number of tasks the worker runs concurrently.
    #[serde(default = "default_executors")]
    pub executors: u32,
    #[serde(default = "default_true")]
    pub online: bool,
    /// Overrides `security.build_principals` for this worker.
    #[serde(default)]
    pub build_principals: Option<Vec<String>>,
}

/// A provisioner that could bring up workers on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Overrides `security.provision_principals` for this cloud.
    #[serde(default)]
    pub provision_principals: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Principals allowed to build on workers (`*` for everyone).
    #[serde(default = "default_any")]
    pub build_principals: Vec<String>,
    /// Principals allowed to provision on clouds.
    #[serde(default)]
    pub provision_principals: Vec<String>,
    /// Principals holding build permission on the root ACL, which also
    /// covers every cloud.
    #[serde(default)]
    pub root_build: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            build_principals: default_any(),
            provision_principals: Vec::new(),
            root_build: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("distfork")
}

fn default_executors() -> u32 {
    2
}

fn default_any() -> Vec<String> {
    vec![ANY_PRINCIPAL.to_string()]
}

/// Whether `principal` is listed in `allowed` (directly or via `*`).
pub fn principal_listed(allowed: &[String], principal: &str) -> bool {
    allowed
        .iter()
        .any(|p| p == ANY_PRINCIPAL || p == principal)
}

impl DfkConfig {
    /// Default config file location (`<config dir>/distfork/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "distfork")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, `$DFK_CONFIG`, or the default location, then apply
    /// environment overrides. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, DfkError> {
        let mut parser = EnvParser::new();
        let explicit = path.map(Path::to_path_buf).or_else(|| parser.get_path("CONFIG"));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(&mut parser);
        if parser.has_errors() {
            let messages: Vec<String> = parser
                .take_errors()
                .into_iter()
                .map(|e| e.to_string())
                .collect();
            return Err(DfkError::ConfigEnv(messages.join("; ")));
        }

        config.ensure_local_worker();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DfkError> {
        debug!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| DfkError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
            .map_err(|e| DfkError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self, parser: &mut EnvParser) {
        if let Some(level) = parser.get_log_level("LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(root) = parser.get_path("WORK_ROOT") {
            self.general.work_root = root;
        }
        if let Some(executors) = parser.get_u32_range("EXECUTORS", 1, 1024) {
            for worker in &mut self.workers {
                worker.executors = executors;
            }
        }
    }

    /// Without any configured worker, run everything on this host.
    fn ensure_local_worker(&mut self) {
        if self.workers.is_empty() {
            self.workers.push(WorkerConfig {
                name: "local".to_string(),
                labels: vec![std::env::consts::OS.to_string()],
                root: None,
                executors: default_executors(),
                online: true,
                build_principals: None,
            });
        }
    }

    fn validate(&self) -> Result<(), DfkError> {
        let mut seen = std::collections::HashSet::new();
        for worker in &self.workers {
            if worker.name.is_empty() {
                return Err(DfkError::Config("worker name must not be empty".into()));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(DfkError::Config(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
            if worker.executors == 0 {
                return Err(DfkError::Config(format!(
                    "worker '{}' needs at least one executor",
                    worker.name
                )));
            }
        }
        Ok(())
    }

    /// Scratch root for `worker`.
    pub fn worker_root(&self, worker: &WorkerConfig) -> PathBuf {
        worker
            .root
            .clone()
            .unwrap_or_else(|| self.general.work_root.join(&worker.name))
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
