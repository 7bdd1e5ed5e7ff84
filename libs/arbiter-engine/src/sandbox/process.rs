/// Process Sandbox
///
/// Runs each harness unit as a child process:
/// - fresh temporary workspace, removed when the unit finishes
/// - cleared environment (PATH and a locale only; HOME points at the workspace)
/// - stdin closed, stdout/stderr captured up to `max_output_bytes`
/// - own process group, so a timeout, cancellation or dropped future kills
///   every descendant
/// - rlimits: CPU seconds, file size, no core dumps, and address space for
///   runtimes that tolerate it
///
/// It does not restrict network or filesystem access; use the Docker backend
/// where submissions are untrusted.
use super::{
    memory_limit_mb, push_capped, ResourceLimits, Sandbox, SandboxError, SandboxReport,
    StageReport, Termination,
};
use crate::harness::HarnessUnit;
use crate::pool::CancelToken;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const MAX_FILE_SIZE_BYTES: u64 = 16 * 1024 * 1024;
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
/// How long stream readers may lag behind process exit
const READER_GRACE: Duration = Duration::from_millis(500);

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type RlimitResource = libc::c_int;

#[derive(Debug, Clone, Copy)]
struct StageLimits {
    timeout: Duration,
    cpu_seconds: u64,
    address_space_bytes: Option<u64>,
    max_output_bytes: usize,
}

impl StageLimits {
    fn new(timeout: Duration, address_space_bytes: Option<u64>, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            cpu_seconds: timeout.as_secs() + 1,
            address_space_bytes,
            max_output_bytes,
        }
    }
}

enum Waited {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Default, Clone)]
pub struct ProcessSandbox {
    work_root: Option<Utf8PathBuf>,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create workspaces under `root` instead of the system temp directory.
    pub fn with_work_root(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            work_root: Some(root.into()),
        }
    }

    fn workspace(&self) -> io::Result<camino_tempfile::Utf8TempDir> {
        let mut builder = camino_tempfile::Builder::new();
        builder.prefix("arbiter-");
        match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

impl Sandbox for ProcessSandbox {
    async fn execute(
        &self,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> Result<SandboxReport, SandboxError> {
        let workspace = self.workspace().map_err(SandboxError::Workspace)?;
        for file in &unit.files {
            tokio::fs::write(workspace.path().join(&file.name), &file.contents)
                .await
                .map_err(SandboxError::Workspace)?;
        }

        let mut compile = None;
        if let Some(command) = &unit.profile.compile {
            let stage = StageLimits::new(limits.compile_timeout, None, limits.max_output_bytes);
            let report = run_stage(command, workspace.path(), stage, cancel, "compile").await?;
            let compiled = report.termination.is_success();
            compile = Some(report);
            if !compiled {
                return Ok(SandboxReport { compile, run: None });
            }
        }

        let address_space = unit
            .profile
            .limit_address_space
            .then(|| memory_limit_mb(unit, limits) * 1024 * 1024);
        let stage = StageLimits::new(limits.timeout, address_space, limits.max_output_bytes);
        let run = run_stage(&unit.profile.run, workspace.path(), stage, cancel, "run").await?;

        Ok(SandboxReport {
            compile,
            run: Some(run),
        })
    }
}

async fn run_stage(
    command: &[String],
    dir: &Utf8Path,
    limits: StageLimits,
    cancel: &CancelToken,
    stage: &'static str,
) -> Result<StageReport, SandboxError> {
    let (program, args) = command
        .split_first()
        .ok_or(SandboxError::EmptyCommand(stage))?;

    // relative paths such as ./main refer to the workspace
    let program_path = if program.contains('/') && !program.starts_with('/') {
        dir.join(program).into_string()
    } else {
        program.clone()
    };

    let mut cmd = Command::new(&program_path);
    cmd.args(args)
        .current_dir(dir)
        .env_clear()
        .env(
            "PATH",
            std::env::var_os("PATH").unwrap_or_else(|| FALLBACK_PATH.into()),
        )
        .env("HOME", dir)
        .env("TMPDIR", dir)
        .env("LANG", "C.UTF-8")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    // SAFETY: only async-signal-safe calls (setrlimit) run between fork and exec
    unsafe {
        cmd.pre_exec(move || apply_rlimits(&limits));
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: program.clone(),
        source,
    })?;
    // armed until the group is killed and the leader reaped, so a dropped
    // future still tears down every descendant
    let mut group = ProcessGroup::new(child.id());

    let stdout = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(read_capped(pipe, limits.max_output_bytes)));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(read_capped(pipe, limits.max_output_bytes)));

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status.map_err(SandboxError::Wait)?),
        _ = tokio::time::sleep(limits.timeout) => Waited::TimedOut,
        _ = cancel.cancelled() => Waited::Cancelled,
    };
    let elapsed = start.elapsed();

    // descendants may outlive the group leader and hold the pipes open
    group.kill();

    let termination = match waited {
        Waited::Exited(status) => termination_of(status),
        Waited::TimedOut => {
            reap(&mut child).await;
            Termination::TimedOut
        }
        Waited::Cancelled => {
            reap(&mut child).await;
            Termination::Cancelled
        }
    };

    group.disarm();

    let (stdout, stdout_truncated) = collect(stdout).await;
    let (stderr, stderr_truncated) = collect(stderr).await;

    debug!(
        stage,
        program = %program,
        termination = ?termination,
        elapsed_ms = elapsed.as_millis() as u64,
        "Stage finished"
    );

    Ok(StageReport {
        stdout,
        stderr,
        termination,
        elapsed,
        truncated: stdout_truncated || stderr_truncated,
    })
}

fn apply_rlimits(limits: &StageLimits) -> io::Result<()> {
    set_rlimit(libc::RLIMIT_CPU, limits.cpu_seconds)?;
    set_rlimit(libc::RLIMIT_FSIZE, MAX_FILE_SIZE_BYTES)?;
    set_rlimit(libc::RLIMIT_CORE, 0)?;
    if let Some(bytes) = limits.address_space_bytes {
        set_rlimit(libc::RLIMIT_AS, bytes)?;
    }
    Ok(())
}

fn set_rlimit(resource: RlimitResource, value: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: plain syscall on a stack value
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// SIGKILLs the child's process group on drop unless disarmed
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            kill_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            debug!(pgid, "Killing process group of abandoned stage");
            kill_group(pgid);
        }
    }
}

fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: signalling our own child's process group; ESRCH is fine
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

async fn reap(child: &mut tokio::process::Child) {
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap killed process");
    }
}

fn termination_of(status: ExitStatus) -> Termination {
    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(signal)) => Termination::Signaled(signal),
        (None, None) => Termination::Exited(-1),
    }
}

async fn read_capped<R>(mut reader: R, cap: usize) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    // keep draining past the cap so the child never blocks on a full pipe
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => truncated |= push_capped(&mut buf, &chunk[..n], cap),
        }
    }
    (buf, truncated)
}

async fn collect(task: Option<JoinHandle<(Vec<u8>, bool)>>) -> (String, bool) {
    let Some(mut task) = task else {
        return (String::new(), false);
    };
    match tokio::time::timeout(READER_GRACE, &mut task).await {
        Ok(Ok((bytes, truncated))) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        Ok(Err(e)) => {
            warn!(error = %e, "Output reader failed");
            (String::new(), false)
        }
        Err(_) => {
            task.abort();
            warn!("Output reader did not finish after process exit");
            (String::new(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{ExecutionProfile, HarnessFile};
    use arbiter_common::types::LanguageId;

    fn unit(files: Vec<HarnessFile>, compile: Option<&[&str]>, run: &[&str]) -> HarnessUnit {
        let owned = |cmd: &[&str]| cmd.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        HarnessUnit {
            language: LanguageId::Python,
            entry_point: "solve".to_string(),
            files,
            profile: ExecutionProfile {
                image: "unused".to_string(),
                compile: compile.map(owned),
                run: owned(run),
                memory_limit_mb: 256,
                cpu_limit: 1.0,
                limit_address_space: false,
            },
            marker: "@@m@@".to_string(),
        }
    }

    fn limits(timeout_ms: u64) -> ResourceLimits {
        ResourceLimits {
            timeout: Duration::from_millis(timeout_ms),
            compile_timeout: Duration::from_millis(timeout_ms),
            memory_limit_mb: None,
            max_output_bytes: 64 * 1024,
        }
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let files = vec![HarnessFile::new("main.sh", "echo \"out:$(cat data.txt)\"; echo err >&2")];
        let mut u = unit(files, None, &["sh", "main.sh"]);
        u.files.push(HarnessFile::new("data.txt", "42"));

        let report = ProcessSandbox::new()
            .execute(&u, &limits(5000), &CancelToken::new())
            .await
            .unwrap();
        let run = report.run.unwrap();
        assert!(report.compile.is_none());
        assert_eq!(run.termination, Termination::Exited(0));
        assert_eq!(run.stdout, "out:42\n");
        assert_eq!(run.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_workspace_removed_and_env_cleared() {
        let u = unit(vec![], None, &["sh", "-c", "pwd; echo \"user=${USER:-unset}\""]);
        let report = ProcessSandbox::new()
            .execute(&u, &limits(5000), &CancelToken::new())
            .await
            .unwrap();
        let stdout = report.run.unwrap().stdout;
        let mut lines = stdout.lines();
        let workspace = lines.next().unwrap();
        assert_eq!(lines.next(), Some("user=unset"));
        assert!(!std::path::Path::new(workspace).exists());
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let u = unit(vec![], None, &["sh", "-c", "sleep 30 & sleep 30"]);
        let start = Instant::now();
        let report = ProcessSandbox::new()
            .execute(&u, &limits(200), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.run.unwrap().termination, Termination::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    /// Running means present in /proc and not a zombie
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map_or(false, |state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_execution_kills_descendants() {
        let dir = camino_tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pids");
        let script = format!("sleep 30 & echo $! > {pid_file}; sleep 30 & echo $! >> {pid_file}; wait");
        let u = unit(vec![], None, &["sh", "-c", &script]);

        let sandbox = ProcessSandbox::new();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(300),
            sandbox.execute(&u, &limits(30_000), &CancelToken::new()),
        )
        .await;
        assert!(abandoned.is_err());

        let pids: Vec<i32> = std::fs::read_to_string(&pid_file)
            .unwrap()
            .lines()
            .map(|line| line.trim().parse().unwrap())
            .collect();
        assert_eq!(pids.len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        for pid in pids {
            assert!(!is_running(pid), "descendant {} survived", pid);
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_run() {
        let u = unit(vec![], None, &["sleep", "30"]);
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let report = ProcessSandbox::new()
            .execute(&u, &limits(30_000), &token)
            .await
            .unwrap();
        assert_eq!(report.run.unwrap().termination, Termination::Cancelled);
    }

    #[tokio::test]
    async fn test_compile_failure_skips_run() {
        let u = unit(
            vec![],
            Some(&["sh", "-c", "echo 'syntax error' >&2; exit 1"]),
            &["sh", "-c", "echo ran"],
        );
        let report = ProcessSandbox::new()
            .execute(&u, &limits(5000), &CancelToken::new())
            .await
            .unwrap();

        let compile = report.compile.unwrap();
        assert_eq!(compile.termination, Termination::Exited(1));
        assert_eq!(compile.stderr, "syntax error\n");
        assert!(report.run.is_none());
    }

    #[tokio::test]
    async fn test_compiled_artifact_runs_from_workspace() {
        let u = unit(
            vec![HarnessFile::new("src.sh", "echo built")],
            Some(&["sh", "-c", "cp src.sh main && chmod +x main"]),
            &["sh", "./main"],
        );
        let report = ProcessSandbox::new()
            .execute(&u, &limits(5000), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.run.unwrap().stdout, "built\n");
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let u = unit(vec![], None, &["sh", "-c", "head -c 100000 /dev/zero"]);
        let mut l = limits(5000);
        l.max_output_bytes = 1000;
        let report = ProcessSandbox::new()
            .execute(&u, &l, &CancelToken::new())
            .await
            .unwrap();
        let run = report.run.unwrap();
        assert!(run.truncated);
        assert_eq!(run.stdout.len(), 1000);
        assert_eq!(run.termination, Termination::Exited(0));
    }

    #[tokio::test]
    async fn test_signal_termination() {
        let u = unit(vec![], None, &["sh", "-c", "kill -SEGV $$"]);
        let report = ProcessSandbox::new()
            .execute(&u, &limits(5000), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.run.unwrap().termination, Termination::Signaled(libc::SIGSEGV));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let u = unit(vec![], None, &["definitely-not-a-real-binary-arbiter"]);
        let err = ProcessSandbox::new()
            .execute(&u, &limits(5000), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }
}
