/// Sandbox - Abstraction for Isolated Execution
///
/// **Core Responsibility:**
/// Materialize a `HarnessUnit`, compile it if the language needs it, run it
/// under resource limits and report what happened.
///
/// **Boundary:**
/// - A sandbox knows HOW to execute (local processes, Docker)
/// - A sandbox does NOT read the output slot or judge correctness
/// - Reports are raw: captured streams, termination, elapsed time
///
/// Every sandbox guarantees that a unit which exceeds its time limit, or
/// whose submission is cancelled, is killed with everything it spawned and
/// that its workspace is removed before `execute` returns.
mod docker;
mod process;

use crate::harness::HarnessUnit;
use crate::pool::CancelToken;
use arbiter_common::config::{Backend, GraderConfig};
use std::future::Future;
use std::time::Duration;

pub use docker::DockerSandbox;
pub use process::ProcessSandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Wall-clock limit of the run stage
    pub timeout: Duration,
    /// Wall-clock limit of the compile stage
    pub compile_timeout: Duration,
    /// Overrides the per-language memory limit when set
    pub memory_limit_mb: Option<u64>,
    /// Captured bytes per stream; the rest is discarded
    pub max_output_bytes: usize,
}

impl ResourceLimits {
    pub fn from_config(config: &GraderConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            compile_timeout: Duration::from_millis(config.compile_timeout_ms),
            memory_limit_mb: config.memory_limit_mb,
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_config(&GraderConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    TimedOut,
    Cancelled,
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

/// Raw result of one stage
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
    pub elapsed: Duration,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct SandboxReport {
    /// Present when the language has a compile stage
    pub compile: Option<StageReport>,
    /// Absent when compilation did not succeed
    pub run: Option<StageReport>,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("{0}")]
    Container(String),
    #[error("harness unit has an empty {0} command")]
    EmptyCommand(&'static str),
}

pub trait Sandbox: Send + Sync {
    fn execute(
        &self,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> impl Future<Output = Result<SandboxReport, SandboxError>> + Send;
}

/// Backend selected by configuration
pub enum SandboxBackend {
    Process(ProcessSandbox),
    Docker(DockerSandbox),
}

impl SandboxBackend {
    pub fn from_config(config: &GraderConfig) -> Result<Self, SandboxError> {
        match config.backend {
            Backend::Process => Ok(SandboxBackend::Process(ProcessSandbox::new())),
            Backend::Docker => Ok(SandboxBackend::Docker(DockerSandbox::connect()?)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SandboxBackend::Process(_) => "process",
            SandboxBackend::Docker(_) => "docker",
        }
    }
}

impl Sandbox for SandboxBackend {
    async fn execute(
        &self,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> Result<SandboxReport, SandboxError> {
        match self {
            SandboxBackend::Process(sandbox) => sandbox.execute(unit, limits, cancel).await,
            SandboxBackend::Docker(sandbox) => sandbox.execute(unit, limits, cancel).await,
        }
    }
}

/// Effective memory limit for a unit
pub(crate) fn memory_limit_mb(unit: &HarnessUnit, limits: &ResourceLimits) -> u64 {
    limits
        .memory_limit_mb
        .unwrap_or(u64::from(unit.profile.memory_limit_mb))
}

/// Append `chunk` to `buf` up to `cap` bytes; returns whether anything was dropped.
pub(crate) fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    if chunk.len() > room {
        buf.extend_from_slice(&chunk[..room]);
        true
    } else {
        buf.extend_from_slice(chunk);
        false
    }
}
