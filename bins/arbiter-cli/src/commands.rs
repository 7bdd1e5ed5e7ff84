// CLI commands for grading submissions locally
use anyhow::{Context, Result};
use arbiter_common::config::GraderConfig;
use arbiter_common::types::{CaseResult, GradeRequest, Verdict};
use arbiter_engine::canonical::canonical_value;
use arbiter_engine::config::LanguageConfigManager;
use arbiter_engine::decoder::{decode, try_decode};
use arbiter_engine::{CancelToken, FileCatalog, GradeError, Grader};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Longest input or output shown per case in the text report
const PREVIEW_CHARS: usize = 60;

fn load_config(timeout_ms: Option<u64>) -> Result<GraderConfig> {
    let mut config = GraderConfig::from_env().context("Invalid grader configuration")?;
    if let Some(timeout_ms) = timeout_ms {
        anyhow::ensure!(timeout_ms > 0, "--timeout-ms must be greater than zero");
        config.timeout_ms = timeout_ms;
    }
    Ok(config)
}

/// Grade `file` against `problem_id`. Returns whether the verdict is Accepted.
pub async fn grade(
    problem_id: &str,
    language: &str,
    file: &Path,
    problems: Option<&Path>,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<bool> {
    let config = load_config(timeout_ms)?;
    let problems_path = problems.unwrap_or(config.problems_path.as_path());
    let catalog = FileCatalog::load(problems_path)
        .with_context(|| format!("Failed to load problem catalog from {}", problems_path.display()))?;

    let source_code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file {}", file.display()))?;

    let grader = Grader::from_config(&config)?;

    // Ctrl-C tears down in-flight executions instead of orphaning them
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling submission...");
            trigger.cancel();
        }
    });

    let request = GradeRequest {
        problem_id: problem_id.to_string(),
        language: language.to_string(),
        source_code,
    };
    let result = grader
        .grade_request_with_cancel(&request, &catalog, &cancel)
        .await;
    ctrl_c.abort();

    let verdict = match result {
        Ok(verdict) => verdict,
        Err(GradeError::UnsupportedLanguage(lang)) => {
            let supported: Vec<String> = grader
                .supported_languages()
                .iter()
                .map(|l| l.to_string())
                .collect();
            anyhow::bail!(
                "Language '{}' is not supported (available: {})",
                lang,
                supported.join(", ")
            );
        }
        Err(e) => return Err(e).context("Grading failed"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print!("{}", render_verdict(problem_id, language, &verdict));
    }

    Ok(verdict.is_accepted())
}

/// Human-readable verdict report
pub fn render_verdict(problem_id: &str, language: &str, verdict: &Verdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Problem: {}  Language: {}", problem_id, language);

    for (idx, case) in verdict.case_results.iter().enumerate() {
        let _ = writeln!(out, "  {}", render_case(idx + 1, case));
    }

    let icon = if verdict.is_accepted() { "✅" } else { "❌" };
    let _ = writeln!(
        out,
        "{} {} ({}/{} passed, avg {} ms)",
        icon,
        verdict.overall_status,
        verdict.passed_count(),
        verdict.case_results.len(),
        verdict.average_runtime_millis
    );
    out
}

fn render_case(number: usize, case: &CaseResult) -> String {
    let mut line = format!(
        "#{:<3} {:<5} {:>6} ms  input={}",
        number,
        if case.passed { "PASS" } else { "FAIL" },
        case.elapsed_millis,
        preview(&case.test_case.input)
    );
    match &case.fault {
        Some(fault) => {
            let _ = write!(line, "\n       {}", preview(&fault.to_string()));
        }
        None if !case.passed => {
            let _ = write!(
                line,
                "\n       expected {} got {}",
                preview(&case.expected_output),
                preview(&case.formatted_output)
            );
        }
        None => {}
    }
    line
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > PREVIEW_CHARS || first_line.len() < text.trim_end().len() {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    } else {
        first_line.to_string()
    }
}

/// List gradable languages with their default entry points
pub fn list_languages() -> Result<()> {
    let config = load_config(None)?;
    let manager = LanguageConfigManager::load_or_builtin(&config.languages_path)?;

    println!("{:<12} {:<8} {:<14} {}", "LANGUAGE", "VERSION", "ENTRY POINT", "IMAGE");
    for lang in manager.list_languages() {
        let lang_config = manager.get_config(&lang)?;
        println!(
            "{:<12} {:<8} {:<14} {}",
            lang.to_string(),
            lang_config.version,
            lang_config.default_entry_point,
            lang_config.image
        );
    }
    Ok(())
}

/// Print the decoded argument list, one canonical argument per line
pub fn decode_input(input: &str, strict: bool) -> Result<()> {
    let arguments = if strict {
        try_decode(input).context("Input does not decode")?
    } else {
        decode(input)
    };

    println!("{} argument(s)", arguments.len());
    for (idx, value) in arguments.values().iter().enumerate() {
        println!("  [{}] {}", idx, canonical_value(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::types::{ExecutionOutcome, Fault, Submission, TestCase};
    use arbiter_engine::evaluator::aggregate;
    use serde_json::json;

    fn verdict() -> Verdict {
        let submission = Submission {
            source_code: String::new(),
            language: "python".to_string(),
            test_cases: vec![
                TestCase::new("[2,7,11,15],9", "[0,1]"),
                TestCase::new("[3,2,4],6", "[1,2]"),
                TestCase::new("[3,3],6", "[0,1]"),
            ],
        };
        aggregate(
            &submission,
            vec![
                ExecutionOutcome::success(json!([0, 1]), 12),
                ExecutionOutcome::success(json!([2, 1]), 10),
                ExecutionOutcome::faulted(Fault::RuntimeError("IndexError: list index out of range".to_string()), 8),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_verdict() {
        let report = render_verdict("two-sum", "python", &verdict());

        assert!(report.starts_with("Problem: two-sum  Language: python\n"));
        assert!(report.contains("PASS"));
        assert!(report.contains("expected [1,2] got [2,1]"));
        assert!(report.contains("runtime error: IndexError"));
        assert!(report.contains("runtimeError (1/3 passed, avg 10 ms)"));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("a\nb"), "a…");
        let long = "x".repeat(PREVIEW_CHARS + 5);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 1);
    }
}
