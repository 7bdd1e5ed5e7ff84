/// Grading Orchestrator
///
/// **Control Flow:**
/// 1. Resolve the language (unsupported → fail fast, zero executions)
/// 2. Pass admission control (queue, never reject, when the cap is reached)
/// 3. Resolve the entry point once per submission
/// 4. For every test case, concurrently and bounded by the worker pool:
///    decode input → build harness → run isolated → outcome
/// 5. Aggregate outcomes in test-case order into a `Verdict`
///
/// Faults of a submission are data inside the verdict. The only early
/// terminations are an unsupported language, an unknown problem, a problem
/// without test cases, and caller cancellation.
use crate::catalog::{CatalogError, ProblemCatalog};
use crate::config::LanguageConfigManager;
use crate::decoder::decode;
use crate::entry_point::{EntryPoint, EntryPointRegistry};
use crate::evaluator::{self, AggregateError};
use crate::harness::{HarnessBuilder, HarnessError};
use crate::pool::{CancelToken, WorkerPool};
use crate::runner::IsolatedRunner;
use crate::sandbox::{ResourceLimits, Sandbox, SandboxBackend};
use anyhow::Context;
use arbiter_common::config::GraderConfig;
use arbiter_common::types::{
    ExecutionOutcome, Fault, GradeRequest, LanguageId, Submission, TestCase, Verdict,
};
use futures_util::future::join_all;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("problem not found: {0}")]
    NotFound(String),
    #[error("problem has no test cases")]
    NoTestCases,
    #[error("grading was cancelled")]
    Cancelled,
    #[error(transparent)]
    Catalog(CatalogError),
    #[error(transparent)]
    Aggregate(AggregateError),
}

impl From<CatalogError> for GradeError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(id) => GradeError::NotFound(id),
            other => GradeError::Catalog(other),
        }
    }
}

impl From<AggregateError> for GradeError {
    fn from(e: AggregateError) -> Self {
        match e {
            AggregateError::NoTestCases => GradeError::NoTestCases,
            other => GradeError::Aggregate(other),
        }
    }
}

pub struct Grader<S = SandboxBackend> {
    harness: HarnessBuilder,
    runner: IsolatedRunner<S>,
    admission: WorkerPool,
    limits: ResourceLimits,
}

impl Grader<SandboxBackend> {
    /// Build a grader from configuration: language table, entry-point
    /// registry and the configured sandbox backend.
    pub fn from_config(config: &GraderConfig) -> anyhow::Result<Self> {
        let languages = LanguageConfigManager::load_or_builtin(&config.languages_path)
            .context("Failed to load language configuration")?;
        let entry_points = match &config.entry_points_path {
            Some(path) => EntryPointRegistry::load(path)?,
            None => EntryPointRegistry::default(),
        };
        let sandbox =
            SandboxBackend::from_config(config).context("Failed to initialize sandbox backend")?;

        info!(
            backend = sandbox.name(),
            languages = ?languages.list_languages(),
            worker_slots = config.worker_slots,
            max_concurrent_submissions = config.max_concurrent_submissions,
            timeout_ms = config.timeout_ms,
            "Grader initialized"
        );

        Ok(Self::new(HarnessBuilder::new(languages, entry_points), sandbox, config))
    }
}

impl<S: Sandbox> Grader<S> {
    pub fn new(harness: HarnessBuilder, sandbox: S, config: &GraderConfig) -> Self {
        Self {
            harness,
            runner: IsolatedRunner::new(sandbox, WorkerPool::new(config.worker_slots)),
            admission: WorkerPool::new(config.max_concurrent_submissions),
            limits: ResourceLimits::from_config(config),
        }
    }

    pub fn harness(&self) -> &HarnessBuilder {
        &self.harness
    }

    pub fn runner(&self) -> &IsolatedRunner<S> {
        &self.runner
    }

    pub fn admission(&self) -> &WorkerPool {
        &self.admission
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn supported_languages(&self) -> Vec<LanguageId> {
        self.harness.supported_languages()
    }

    pub async fn grade(&self, submission: &Submission) -> Result<Verdict, GradeError> {
        self.grade_with_cancel(submission, &CancelToken::new()).await
    }

    #[tracing::instrument(
        skip_all,
        fields(language = %submission.language, cases = submission.test_cases.len())
    )]
    pub async fn grade_with_cancel(
        &self,
        submission: &Submission,
        cancel: &CancelToken,
    ) -> Result<Verdict, GradeError> {
        let language = self
            .harness
            .resolve_language(&submission.language)
            .map_err(|_| GradeError::UnsupportedLanguage(submission.language.clone()))?;

        if submission.test_cases.is_empty() {
            return Err(GradeError::NoTestCases);
        }

        let _admitted = match self.admission.try_lease() {
            Some(lease) => lease,
            None => {
                info!(
                    capacity = self.admission.size(),
                    "Submission queued for admission"
                );
                tokio::select! {
                    lease = self.admission.lease() => lease.map_err(|_| GradeError::Cancelled)?,
                    _ = cancel.cancelled() => return Err(GradeError::Cancelled),
                }
            }
        };

        debug!(in_use = self.admission.in_use(), "Submission admitted");

        let start = Instant::now();
        let entry_point = self
            .harness
            .resolve_entry_point(language, &submission.source_code)
            .map_err(|_| GradeError::UnsupportedLanguage(submission.language.clone()))?;

        let outcomes = join_all(submission.test_cases.iter().enumerate().map(|(idx, test_case)| {
            self.run_case(language, &entry_point, &submission.source_code, idx, test_case, cancel)
        }))
        .await;

        if cancel.is_cancelled() {
            warn!("Grading cancelled, discarding partial results");
            return Err(GradeError::Cancelled);
        }

        let verdict = evaluator::aggregate(submission, outcomes)?;
        info!(
            status = %verdict.overall_status,
            passed = verdict.passed_count(),
            total = verdict.case_results.len(),
            wall_ms = start.elapsed().as_millis() as u64,
            "Submission graded"
        );
        Ok(verdict)
    }

    /// Resolve the problem's test cases, then grade.
    pub async fn grade_request(
        &self,
        request: &GradeRequest,
        catalog: &dyn ProblemCatalog,
    ) -> Result<Verdict, GradeError> {
        self.grade_request_with_cancel(request, catalog, &CancelToken::new())
            .await
    }

    pub async fn grade_request_with_cancel(
        &self,
        request: &GradeRequest,
        catalog: &dyn ProblemCatalog,
        cancel: &CancelToken,
    ) -> Result<Verdict, GradeError> {
        let test_cases = catalog.test_cases(&request.problem_id)?;
        let submission = Submission {
            source_code: request.source_code.clone(),
            language: request.language.clone(),
            test_cases,
        };
        self.grade_with_cancel(&submission, cancel).await
    }

    async fn run_case(
        &self,
        language: LanguageId,
        entry_point: &EntryPoint,
        source: &str,
        idx: usize,
        test_case: &TestCase,
        cancel: &CancelToken,
    ) -> ExecutionOutcome {
        if cancel.is_cancelled() {
            return ExecutionOutcome::faulted(Fault::RuntimeError("cancelled".to_string()), 0);
        }

        let arguments = decode(&test_case.input);
        let outcome = match self.harness.build_for(language, source, entry_point, &arguments) {
            Ok(unit) => self.runner.run_with_cancel(&unit, &self.limits, cancel).await,
            Err(e) => ExecutionOutcome::faulted(build_fault(e), 0),
        };

        if let Some(fault) = &outcome.fault {
            warn!(case = idx + 1, fault = %fault, "Test case faulted");
        }
        outcome
    }
}

fn build_fault(error: HarnessError) -> Fault {
    match error {
        HarnessError::UnresolvedEntryPoint(_) => Fault::RuntimeError(error.to_string()),
        HarnessError::UnrepresentableArgument { .. } => Fault::CompilationError(error.to_string()),
        HarnessError::UnsupportedLanguage(language) => Fault::UnsupportedLanguage(language),
    }
}
