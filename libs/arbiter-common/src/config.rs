// Grader configuration, read from the environment
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 15000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Where harness units are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Child process per harness unit: own process group, rlimits, temp workspace.
    Process,
    /// Throwaway Docker container per harness unit.
    Docker,
}

impl Backend {
    /// Whether submissions are cut off from the host filesystem and network
    pub fn isolates_host(&self) -> bool {
        matches!(self, Backend::Docker)
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Backend::Process),
            "docker" => Ok(Backend::Docker),
            other => Err(ConfigError::Invalid {
                key: "ARBITER_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    pub timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub memory_limit_mb: Option<u64>,
    pub max_concurrent_submissions: usize,
    pub worker_slots: usize,
    pub max_output_bytes: usize,
    pub backend: Backend,
    pub languages_path: PathBuf,
    pub problems_path: PathBuf,
    pub entry_points_path: Option<PathBuf>,
    pub bind_addr: String,
    pub redis_url: Option<String>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            memory_limit_mb: None,
            max_concurrent_submissions: cpus,
            worker_slots: cpus,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            backend: Backend::Process,
            languages_path: PathBuf::from("config/languages.json"),
            problems_path: PathBuf::from("config/problems.json"),
            entry_points_path: None,
            bind_addr: "0.0.0.0:3000".to_string(),
            redis_url: None,
        }
    }
}

impl GraderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset keys keep their
    /// defaults, empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("ARBITER_TIMEOUT_MS") {
            config.timeout_ms = parse_positive("ARBITER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("ARBITER_COMPILE_TIMEOUT_MS") {
            config.compile_timeout_ms = parse_positive("ARBITER_COMPILE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("ARBITER_MEMORY_LIMIT_MB") {
            config.memory_limit_mb = Some(parse_positive("ARBITER_MEMORY_LIMIT_MB", &v)?);
        }
        if let Some(v) = get("ARBITER_MAX_CONCURRENT_SUBMISSIONS") {
            config.max_concurrent_submissions =
                parse_positive("ARBITER_MAX_CONCURRENT_SUBMISSIONS", &v)?;
        }
        if let Some(v) = get("ARBITER_WORKER_SLOTS") {
            config.worker_slots = parse_positive("ARBITER_WORKER_SLOTS", &v)?;
        }
        if let Some(v) = get("ARBITER_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse_positive("ARBITER_MAX_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = get("ARBITER_BACKEND") {
            config.backend = v.parse()?;
        }
        if let Some(v) = get("ARBITER_LANGUAGES_PATH") {
            config.languages_path = PathBuf::from(v);
        }
        if let Some(v) = get("ARBITER_PROBLEMS_PATH") {
            config.problems_path = PathBuf::from(v);
        }
        config.entry_points_path = get("ARBITER_ENTRY_POINTS_PATH").map(PathBuf::from);
        if let Some(v) = get("ARBITER_BIND_ADDR") {
            config.bind_addr = v;
        }
        config.redis_url = get("REDIS_URL");

        Ok(config)
    }
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let parsed: T = value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })?;
    if parsed == T::default() {
        return Err(ConfigError::Zero { key });
    }
    Ok(parsed)
}
