/// Docker Sandbox
///
/// **Execution Rules:**
/// 1. Pulls the language image if it is not cached
/// 2. Creates one throwaway container per harness unit:
///    - network disabled, all capabilities dropped
///    - memory, CPU and pid limits enforced
/// 3. Uploads the harness files into `/code` as a tar archive
/// 4. Compiles once (if the language needs it) and runs the unit
/// 5. Kills the container on timeout or cancellation
/// 6. Force-removes the container before returning; a drop guard covers
///    panics and dropped futures
use super::{
    memory_limit_mb, push_capped, ResourceLimits, Sandbox, SandboxError, SandboxReport,
    StageReport, Termination,
};
use crate::harness::{HarnessFile, HarnessUnit};
use crate::pool::CancelToken;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const WORKDIR: &str = "/code";
const PIDS_LIMIT: i64 = 128;
const FILE_MODE: u32 = 0o644;
/// Containers outlive no unit; this only bounds a leaked one
const KEEPALIVE_SECONDS: &str = "3600";

/// Removes the container when dropped unless `remove` already did
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    removed: bool,
}

impl ContainerGuard {
    fn new(docker: &Docker, container_id: String) -> Self {
        Self {
            docker: docker.clone(),
            container_id,
            removed: false,
        }
    }

    async fn remove(mut self) {
        if let Err(e) = remove_container(&self.docker, &self.container_id).await {
            warn!(container_id = %self.container_id, error = %e, "Failed to remove container");
        }
        self.removed = true;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        // cannot await in Drop
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container_id = %self.container_id, "No runtime to remove container");
            return;
        };
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();
        handle.spawn(async move {
            if let Err(e) = remove_container(&docker, &container_id).await {
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

async fn remove_container(docker: &Docker, container_id: &str) -> Result<(), bollard::errors::Error> {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    docker.remove_container(container_id, Some(options)).await
}

/// Output of one exec inside the container
struct ExecOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
    exit_code: Option<i64>,
}

pub struct DockerSandbox {
    docker: Docker,
}

impl DockerSandbox {
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Image cache check; pulls synchronously on a miss.
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image cache hit");
            return Ok(());
        }

        warn!(image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result?;
        }

        info!(image, "Image pulled");
        Ok(())
    }

    async fn create_container(
        &self,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
    ) -> Result<String, SandboxError> {
        let memory_bytes = (memory_limit_mb(unit, limits) * 1024 * 1024) as i64;
        let nano_cpus = (f64::from(unit.profile.cpu_limit) * 1_000_000_000.0) as i64;

        let config = Config {
            image: Some(unit.profile.image.clone()),
            cmd: Some(vec!["sleep".to_string(), KEEPALIVE_SECONDS.to_string()]),
            entrypoint: Some(vec![]),
            working_dir: Some(WORKDIR.to_string()),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                memory: Some(memory_bytes),
                memory_swap: Some(memory_bytes),
                nano_cpus: Some(nano_cpus),
                pids_limit: Some(PIDS_LIMIT),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                readonly_rootfs: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let name = format!("arbiter-{}", uuid::Uuid::new_v4());
        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };
        let container = self.docker.create_container(Some(options), config).await?;
        Ok(container.id)
    }

    async fn upload_files(&self, container_id: &str, files: &[HarnessFile]) -> Result<(), SandboxError> {
        let archive = archive(files).map_err(SandboxError::Workspace)?;
        let options = UploadToContainerOptions {
            path: WORKDIR,
            ..Default::default()
        };
        self.docker
            .upload_to_container(container_id, Some(options), archive.into())
            .await?;
        Ok(())
    }

    async fn exec(
        &self,
        container_id: &str,
        cmd: Vec<String>,
        max_output_bytes: usize,
    ) -> Result<ExecOutput, SandboxError> {
        let exec_config = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(WORKDIR.to_string()),
            ..Default::default()
        };
        let exec = self.docker.create_exec(container_id, exec_config).await?;

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        let mut out = ExecOutput {
            stdout: Vec::new(),
            stderr: Vec::new(),
            truncated: false,
            exit_code: None,
        };

        match self.docker.start_exec(&exec.id, Some(start_config)).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg? {
                        LogOutput::StdOut { message } => {
                            out.truncated |= push_capped(&mut out.stdout, &message, max_output_bytes);
                        }
                        LogOutput::StdErr { message } => {
                            out.truncated |= push_capped(&mut out.stderr, &message, max_output_bytes);
                        }
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::Container(
                    "failed to attach to exec".to_string(),
                ));
            }
        }

        out.exit_code = self.docker.inspect_exec(&exec.id).await?.exit_code;
        Ok(out)
    }

    /// Run one stage under `timeout`, racing cancellation.
    async fn run_stage(
        &self,
        container_id: &str,
        cmd: &[String],
        timeout: Duration,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> Result<StageReport, SandboxError> {
        let start = Instant::now();
        let exec = self.exec(container_id, cmd.to_vec(), limits.max_output_bytes);

        let result = tokio::select! {
            result = exec => Some(result?),
            _ = tokio::time::sleep(timeout) => None,
            _ = cancel.cancelled() => None,
        };
        let elapsed = start.elapsed();

        let Some(output) = result else {
            if let Err(e) = self
                .docker
                .kill_container(container_id, None::<KillContainerOptions<String>>)
                .await
            {
                warn!(container_id, error = %e, "Failed to kill container");
            }
            let termination = if cancel.is_cancelled() {
                Termination::Cancelled
            } else {
                Termination::TimedOut
            };
            return Ok(StageReport {
                stdout: String::new(),
                stderr: String::new(),
                termination,
                elapsed,
                truncated: false,
            });
        };

        Ok(StageReport {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            termination: termination_of(output.exit_code),
            elapsed,
            truncated: output.truncated,
        })
    }

    async fn execute_in_container(
        &self,
        container_id: &str,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> Result<SandboxReport, SandboxError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;

        if !unit.files.is_empty() {
            self.upload_files(container_id, &unit.files).await?;
        }

        let mut compile = None;
        if let Some(command) = &unit.profile.compile {
            if command.is_empty() {
                return Err(SandboxError::EmptyCommand("compile"));
            }
            let report = self
                .run_stage(container_id, command, limits.compile_timeout, limits, cancel)
                .await?;
            let compiled = report.termination.is_success();
            compile = Some(report);
            if !compiled {
                return Ok(SandboxReport { compile, run: None });
            }
        }

        if unit.profile.run.is_empty() {
            return Err(SandboxError::EmptyCommand("run"));
        }
        let run = self
            .run_stage(container_id, &unit.profile.run, limits.timeout, limits, cancel)
            .await?;

        Ok(SandboxReport {
            compile,
            run: Some(run),
        })
    }
}

impl Sandbox for DockerSandbox {
    async fn execute(
        &self,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> Result<SandboxReport, SandboxError> {
        self.ensure_image(&unit.profile.image).await?;

        let container_id = self.create_container(unit, limits).await?;
        debug!(container_id = %container_id, language = %unit.language, "Created container");
        let guard = ContainerGuard::new(&self.docker, container_id.clone());

        let result = self
            .execute_in_container(&container_id, unit, limits, cancel)
            .await;

        guard.remove().await;
        result
    }
}

/// Tar archive of the harness files, rooted at the upload directory
fn archive(files: &[HarnessFile]) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let contents = file.contents.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(FILE_MODE);
        header.set_cksum();
        builder.append_data(&mut header, &file.name, contents)?;
    }
    builder.into_inner()
}

/// Exit codes above 128 are the shell convention for death by signal
fn termination_of(exit_code: Option<i64>) -> Termination {
    match exit_code {
        Some(code) if (129..=192).contains(&code) => Termination::Signaled((code - 128) as i32),
        Some(code) => Termination::Exited(i32::try_from(code).unwrap_or(-1)),
        None => Termination::Exited(-1),
    }
}
