/// Verdict Aggregator - Language-Agnostic Scoring Logic
///
/// **Core Responsibility:**
/// Compare execution outcomes against expected outputs and fold them into a
/// single `Verdict`.
///
/// **Critical Properties:**
/// - Knows nothing about sandboxes or language runtimes
/// - Pure function: (submission, outcomes) → verdict
///
/// **Comparison Rule:**
/// - `formatted_output = canonical_serialize(raw_output)`
/// - `passed = fault.is_none() && formatted_output == expected_output`
/// - Expected output is already canonical; exact string equality, no
///   trimming and no structural diffing
///
/// **Status Precedence** (first match wins over all cases):
/// Timeout → TimeLimitExceeded, CompilationError, RuntimeError,
/// any failed case → WrongAnswer, otherwise Accepted.
use crate::canonical::canonical_serialize;
use arbiter_common::types::{
    CaseResult, ExecutionOutcome, Fault, Submission, SubmissionStatus, TestCase, Verdict,
};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("a verdict needs at least one test case")]
    NoTestCases,
    #[error("{outcomes} outcomes for {test_cases} test cases")]
    LengthMismatch { outcomes: usize, test_cases: usize },
}

/// Evaluate a single test case outcome
pub fn evaluate_case(outcome: ExecutionOutcome, test_case: &TestCase) -> CaseResult {
    let formatted_output = match outcome.fault {
        Some(_) => String::new(),
        None => canonical_serialize(outcome.raw_output.as_ref()),
    };
    let passed = outcome.fault.is_none() && formatted_output == test_case.output;

    CaseResult {
        test_case: test_case.clone(),
        formatted_output,
        expected_output: test_case.output.clone(),
        passed,
        elapsed_millis: outcome.elapsed_millis,
        fault: outcome.fault,
    }
}

/// First matching rule wins
pub fn overall_status(case_results: &[CaseResult]) -> SubmissionStatus {
    let any_fault = |pred: fn(&Fault) -> bool| {
        case_results
            .iter()
            .any(|case| case.fault.as_ref().is_some_and(pred))
    };

    if any_fault(|f| matches!(f, Fault::Timeout)) {
        SubmissionStatus::TimeLimitExceeded
    } else if any_fault(|f| matches!(f, Fault::CompilationError(_))) {
        SubmissionStatus::CompilationError
    } else if any_fault(|f| matches!(f, Fault::RuntimeError(_) | Fault::UnsupportedLanguage(_))) {
        SubmissionStatus::RuntimeError
    } else if case_results.iter().any(|case| !case.passed) {
        SubmissionStatus::WrongAnswer
    } else {
        SubmissionStatus::Accepted
    }
}

/// Arithmetic mean rounded to the nearest integer, halves rounding up
pub fn average_runtime(case_results: &[CaseResult]) -> Option<u64> {
    if case_results.is_empty() {
        return None;
    }
    let n = case_results.len() as u64;
    let total: u64 = case_results.iter().map(|case| case.elapsed_millis).sum();
    Some((total + n / 2) / n)
}

/// Fold per-case outcomes (in test-case order) into a verdict
pub fn aggregate(
    submission: &Submission,
    outcomes: Vec<ExecutionOutcome>,
) -> Result<Verdict, AggregateError> {
    if submission.test_cases.is_empty() {
        return Err(AggregateError::NoTestCases);
    }
    if outcomes.len() != submission.test_cases.len() {
        return Err(AggregateError::LengthMismatch {
            outcomes: outcomes.len(),
            test_cases: submission.test_cases.len(),
        });
    }

    let case_results: Vec<CaseResult> = outcomes
        .into_iter()
        .zip(&submission.test_cases)
        .map(|(outcome, test_case)| evaluate_case(outcome, test_case))
        .collect();

    for (idx, case) in case_results.iter().enumerate() {
        debug!(
            case = idx + 1,
            passed = case.passed,
            elapsed_ms = case.elapsed_millis,
            fault = ?case.fault,
            "Evaluated test case"
        );
    }

    let overall_status = overall_status(&case_results);
    let average_runtime_millis = average_runtime(&case_results).ok_or(AggregateError::NoTestCases)?;

    let verdict = Verdict {
        overall_status,
        case_results,
        average_runtime_millis,
    };

    info!(
        language = %submission.language,
        status = %verdict.overall_status,
        passed = verdict.passed_count(),
        total = verdict.case_results.len(),
        average_runtime_ms = verdict.average_runtime_millis,
        "Verdict aggregated"
    );

    Ok(verdict)
}
