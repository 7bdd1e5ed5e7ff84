use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Languages the grading engine knows how to build a harness for.
///
/// A language is only gradable when it is also present in the language
/// configuration; see `arbiter_engine::config::LanguageConfigManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    Javascript,
    Python,
    Java,
    Cpp,
}

impl LanguageId {
    pub const ALL: [LanguageId; 4] = [
        LanguageId::Javascript,
        LanguageId::Python,
        LanguageId::Java,
        LanguageId::Cpp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageId::Javascript => "javascript",
            LanguageId::Python => "python",
            LanguageId::Java => "java",
            LanguageId::Cpp => "cpp",
        }
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for LanguageId {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Ok(LanguageId::Javascript),
            "python" | "py" | "python3" => Ok(LanguageId::Python),
            "java" => Ok(LanguageId::Java),
            "cpp" | "c++" | "cxx" => Ok(LanguageId::Cpp),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

/// One hidden test case, owned by the problem catalog.
///
/// `input` holds comma separated JSON-like arguments (`"[2,7,11,15],9"`),
/// `output` the expected return value in canonical form (`"[0,1]"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// A submission to grade. `language` is kept as the raw requested value so
/// that unsupported languages can be rejected by the orchestrator itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub source_code: String,
    pub language: String,
    pub test_cases: Vec<TestCase>,
}

/// Inbound request from the UI layer; test cases are resolved through the
/// problem catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub problem_id: String,
    pub language: String,
    pub source_code: String,
}

/// Per-case failure, always carried as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum Fault {
    Timeout,
    RuntimeError(String),
    CompilationError(String),
    UnsupportedLanguage(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Timeout => f.write_str("time limit exceeded"),
            Fault::RuntimeError(msg) => write!(f, "runtime error: {}", msg),
            Fault::CompilationError(msg) => write!(f, "compilation error: {}", msg),
            Fault::UnsupportedLanguage(lang) => write!(f, "unsupported language: {}", lang),
        }
    }
}

/// Result of running one harness instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub raw_output: Option<serde_json::Value>,
    pub elapsed_millis: u64,
    pub fault: Option<Fault>,
}

impl ExecutionOutcome {
    pub fn success(raw_output: serde_json::Value, elapsed_millis: u64) -> Self {
        Self {
            raw_output: Some(raw_output),
            elapsed_millis,
            fault: None,
        }
    }

    pub fn faulted(fault: Fault, elapsed_millis: u64) -> Self {
        Self {
            raw_output: None,
            elapsed_millis,
            fault: Some(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub test_case: TestCase,
    pub formatted_output: String,
    pub expected_output: String,
    pub passed: bool,
    pub elapsed_millis: u64,
    pub fault: Option<Fault>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionStatus {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    RuntimeError,
    CompilationError,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::WrongAnswer => "wrongAnswer",
            SubmissionStatus::TimeLimitExceeded => "timeLimitExceeded",
            SubmissionStatus::RuntimeError => "runtimeError",
            SubmissionStatus::CompilationError => "compilationError",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of one submission. Built once by the evaluator and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub overall_status: SubmissionStatus,
    pub case_results: Vec<CaseResult>,
    pub average_runtime_millis: u64,
}

impl Verdict {
    pub fn passed_count(&self) -> usize {
        self.case_results.iter().filter(|c| c.passed).count()
    }

    pub fn is_accepted(&self) -> bool {
        self.overall_status == SubmissionStatus::Accepted
    }
}

/// What the API persists after grading. The engine never builds one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub problem_id: String,
    pub language: String,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub runtime_millis: u64,
    pub verdict: Verdict,
}

impl SubmissionRecord {
    pub fn new(request: &GradeRequest, verdict: Verdict) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem_id: request.problem_id.clone(),
            language: request.language.clone(),
            submitted_at: Utc::now(),
            status: verdict.overall_status,
            runtime_millis: verdict.average_runtime_millis,
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("javascript".parse::<LanguageId>(), Ok(LanguageId::Javascript));
        assert_eq!("Python".parse::<LanguageId>(), Ok(LanguageId::Python));
        assert_eq!("c++".parse::<LanguageId>(), Ok(LanguageId::Cpp));
        assert!("ruby".parse::<LanguageId>().is_err());
    }

    #[test]
    fn test_language_display_round_trips() {
        for lang in LanguageId::ALL {
            assert_eq!(lang.to_string().parse::<LanguageId>(), Ok(lang));
        }
    }

    #[test]
    fn test_fault_wire_format() {
        let json = serde_json::to_string(&Fault::RuntimeError("boom".into())).unwrap();
        assert_eq!(json, r#"{"kind":"runtimeError","message":"boom"}"#);

        let json = serde_json::to_string(&Fault::Timeout).unwrap();
        assert_eq!(json, r#"{"kind":"timeout"}"#);
    }

    #[test]
    fn test_status_matches_wire_names() {
        let json = serde_json::to_string(&SubmissionStatus::TimeLimitExceeded).unwrap();
        assert_eq!(json, format!("\"{}\"", SubmissionStatus::TimeLimitExceeded.as_str()));
    }

    #[test]
    fn test_grade_request_accepts_camel_case() {
        let req: GradeRequest = serde_json::from_str(
            r#"{"problemId":"two-sum","language":"javascript","sourceCode":"var x;"}"#,
        )
        .unwrap();
        assert_eq!(req.problem_id, "two-sum");
        assert_eq!(req.source_code, "var x;");
    }
}
