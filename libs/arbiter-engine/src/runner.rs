/// Isolated Runner
///
/// **Core Responsibility:**
/// Run one harness unit inside a sandbox while holding a worker lease, and
/// turn the raw sandbox report into an `ExecutionOutcome`.
///
/// **Outcome Rules:**
/// - compile stage failed or timed out → `CompilationError`, elapsed 0
/// - run stage timed out → `Timeout`, elapsed == configured timeout
/// - output slot holds a value → success with that value
/// - output slot holds an error, or the process died before writing it →
///   `RuntimeError`
/// - sandbox infrastructure failure → `RuntimeError("sandbox failure: ...")`
///
/// Nothing here is thrown past the runner: every fault is data.
use crate::harness::{read_output_slot, HarnessUnit, SlotValue};
use crate::pool::{CancelToken, WorkerPool};
use crate::sandbox::{ResourceLimits, Sandbox, SandboxReport, StageReport, Termination};
use arbiter_common::types::{ExecutionOutcome, Fault};
use tracing::{error, warn};

/// Longest diagnostic tail carried inside a fault message
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

pub struct IsolatedRunner<S> {
    sandbox: S,
    workers: WorkerPool,
}

impl<S: Sandbox> IsolatedRunner<S> {
    pub fn new(sandbox: S, workers: WorkerPool) -> Self {
        Self { sandbox, workers }
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    pub async fn run(&self, unit: &HarnessUnit, limits: &ResourceLimits) -> ExecutionOutcome {
        self.run_with_cancel(unit, limits, &CancelToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        unit: &HarnessUnit,
        limits: &ResourceLimits,
        cancel: &CancelToken,
    ) -> ExecutionOutcome {
        let _lease = tokio::select! {
            lease = self.workers.lease() => match lease {
                Ok(lease) => lease,
                Err(e) => return sandbox_failure(e),
            },
            _ = cancel.cancelled() => {
                return ExecutionOutcome::faulted(Fault::RuntimeError("cancelled".to_string()), 0)
            }
        };

        match self.sandbox.execute(unit, limits, cancel).await {
            Ok(report) => interpret(unit, limits, report),
            Err(e) => {
                error!(language = %unit.language, error = %e, "Sandbox failure");
                sandbox_failure(e)
            }
        }
    }
}

fn sandbox_failure(e: impl std::fmt::Display) -> ExecutionOutcome {
    ExecutionOutcome::faulted(Fault::RuntimeError(format!("sandbox failure: {}", e)), 0)
}

/// Turn a raw sandbox report into an outcome
pub fn interpret(unit: &HarnessUnit, limits: &ResourceLimits, report: SandboxReport) -> ExecutionOutcome {
    if let Some(compile) = &report.compile {
        if !compile.termination.is_success() {
            let fault = match compile.termination {
                Termination::TimedOut => Fault::CompilationError(format!(
                    "compilation timed out after {} ms",
                    limits.compile_timeout.as_millis()
                )),
                Termination::Cancelled => Fault::RuntimeError("cancelled".to_string()),
                _ => Fault::CompilationError(compiler_diagnostics(compile)),
            };
            return ExecutionOutcome::faulted(fault, 0);
        }
    }

    let Some(run) = report.run else {
        return sandbox_failure("no run stage was reported");
    };
    let elapsed_millis = run.elapsed.as_millis() as u64;

    match run.termination {
        Termination::TimedOut => {
            return ExecutionOutcome::faulted(Fault::Timeout, limits.timeout_ms());
        }
        Termination::Cancelled => {
            return ExecutionOutcome::faulted(
                Fault::RuntimeError("cancelled".to_string()),
                elapsed_millis,
            );
        }
        _ => {}
    }

    // a run that finished within the limit never reports more than the limit
    let elapsed_millis = elapsed_millis.min(limits.timeout_ms());

    match read_output_slot(&run.stdout, &unit.marker) {
        Some(SlotValue::Returned(value)) => ExecutionOutcome::success(value, elapsed_millis),
        Some(SlotValue::Raised(message)) => {
            ExecutionOutcome::faulted(Fault::RuntimeError(message), elapsed_millis)
        }
        Some(SlotValue::Malformed(e)) => {
            warn!(language = %unit.language, error = %e, "Malformed output slot");
            ExecutionOutcome::faulted(
                Fault::RuntimeError(format!("malformed result: {}", e)),
                elapsed_millis,
            )
        }
        None => ExecutionOutcome::faulted(
            Fault::RuntimeError(abnormal_exit(&run)),
            elapsed_millis,
        ),
    }
}

fn compiler_diagnostics(stage: &StageReport) -> String {
    let text = if stage.stderr.trim().is_empty() {
        stage.stdout.trim()
    } else {
        stage.stderr.trim()
    };
    if text.is_empty() {
        format!("compiler {}", describe(stage.termination))
    } else {
        tail(text, MAX_DIAGNOSTIC_BYTES).to_string()
    }
}

/// The process ended without writing its output slot
fn abnormal_exit(stage: &StageReport) -> String {
    let mut message = format!("process {}", describe(stage.termination));
    if stage.truncated {
        message.push_str(" (output limit exceeded)");
    }
    let stderr = stage.stderr.trim();
    if !stderr.is_empty() {
        message.push_str(": ");
        message.push_str(tail(stderr, MAX_DIAGNOSTIC_BYTES));
    }
    message
}

fn describe(termination: Termination) -> String {
    match termination {
        Termination::Exited(0) => "exited without producing a result".to_string(),
        Termination::Exited(code) => format!("exited with status {}", code),
        Termination::Signaled(libc::SIGKILL) => "was killed (memory limit exceeded?)".to_string(),
        Termination::Signaled(libc::SIGXCPU) => "exceeded its CPU time limit".to_string(),
        Termination::Signaled(libc::SIGXFSZ) => "exceeded its file size limit".to_string(),
        Termination::Signaled(libc::SIGSEGV) => "crashed with a segmentation fault".to_string(),
        Termination::Signaled(libc::SIGABRT) => "aborted".to_string(),
        Termination::Signaled(signal) => format!("was killed by signal {}", signal),
        Termination::TimedOut => "timed out".to_string(),
        Termination::Cancelled => "was cancelled".to_string(),
    }
}

/// Last `max` bytes of `text`, on a char boundary
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
