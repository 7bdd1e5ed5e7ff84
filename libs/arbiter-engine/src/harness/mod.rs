/// Harness Builder
///
/// **Core Responsibility:**
/// Wrap submission source into a self-contained executable unit that calls
/// the submission's entry point with the decoded arguments and writes the
/// return value to a single output slot.
///
/// **Output Slot:**
/// After the call the harness writes one line to the real stdout:
/// `<marker>{"ok":true,"value":<json>}` or `<marker>{"ok":false,"error":"..."}`.
/// The marker is random per unit. Everything else the submission prints is
/// swallowed or ignored and can never be read as the answer.
///
/// **Dispatch:**
/// One `LanguageRunner` per `LanguageId` in a lookup table; adding a language
/// means adding a runner and a configuration entry.
mod cpp;
mod java;
mod javascript;
mod literal;
mod python;

use crate::config::{LanguageConfig, LanguageConfigManager};
use crate::decoder::DecodedArguments;
use crate::entry_point::{EntryPoint, EntryPointRegistry, Resolution};
use arbiter_common::types::LanguageId;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

pub use cpp::CppRunner;
pub use java::JavaRunner;
pub use javascript::JavascriptRunner;
pub use python::PythonRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessFile {
    pub name: String,
    pub contents: String,
}

impl HarnessFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// How a unit is executed; taken from the language configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionProfile {
    pub image: String,
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    pub limit_address_space: bool,
}

impl From<&LanguageConfig> for ExecutionProfile {
    fn from(config: &LanguageConfig) -> Self {
        Self {
            image: config.image.clone(),
            compile: config.execution.compile.clone(),
            run: config.execution.run.clone(),
            memory_limit_mb: config.memory_limit_mb,
            cpu_limit: config.cpu_limit,
            limit_address_space: config.limit_address_space,
        }
    }
}

/// A self-contained executable unit: files to materialize plus the commands
/// that compile and run them.
#[derive(Debug, Clone)]
pub struct HarnessUnit {
    pub language: LanguageId,
    pub entry_point: String,
    pub files: Vec<HarnessFile>,
    pub profile: ExecutionProfile,
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("entry point `{0}` is not defined")]
    UnresolvedEntryPoint(String),
    #[error("argument {index} cannot be expressed as a {language} literal")]
    UnrepresentableArgument { index: usize, language: LanguageId },
}

/// Per-language harness generation strategy
pub trait LanguageRunner: Send + Sync {
    fn language(&self) -> LanguageId;

    /// Compiled languages cannot reference an undeclared entry point at all,
    /// so an unresolved one is reported before execution.
    fn is_compiled(&self) -> bool;

    /// Whether `name` is declared as a function or method in `source`
    fn declares(&self, source: &str, name: &str) -> bool;

    /// Produce the source files of the harness
    fn render(
        &self,
        source: &str,
        entry_point: &EntryPoint,
        arguments: &DecodedArguments,
        marker: &str,
    ) -> Result<Vec<HarnessFile>, HarnessError>;
}

pub struct HarnessBuilder {
    runners: HashMap<LanguageId, Box<dyn LanguageRunner>>,
    languages: LanguageConfigManager,
    entry_points: EntryPointRegistry,
}

impl HarnessBuilder {
    pub fn new(languages: LanguageConfigManager, entry_points: EntryPointRegistry) -> Self {
        let mut builder = Self {
            runners: HashMap::new(),
            languages,
            entry_points,
        };
        builder.register(Box::new(JavascriptRunner));
        builder.register(Box::new(PythonRunner));
        builder.register(Box::new(JavaRunner));
        builder.register(Box::new(CppRunner));
        builder
    }

    pub fn register(&mut self, runner: Box<dyn LanguageRunner>) {
        self.runners.insert(runner.language(), runner);
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    /// Languages that have both a runner and a configuration entry
    pub fn supported_languages(&self) -> Vec<LanguageId> {
        self.languages
            .list_languages()
            .into_iter()
            .filter(|lang| self.runners.contains_key(lang))
            .collect()
    }

    pub fn resolve_language(&self, requested: &str) -> Result<LanguageId, HarnessError> {
        let unsupported = || HarnessError::UnsupportedLanguage(requested.to_string());
        let language: LanguageId = requested.parse().map_err(|_| unsupported())?;
        if self.runners.contains_key(&language) && self.languages.is_enabled(&language) {
            Ok(language)
        } else {
            Err(unsupported())
        }
    }

    /// Static entry-point detection for one submission
    pub fn resolve_entry_point(
        &self,
        language: LanguageId,
        source: &str,
    ) -> Result<EntryPoint, HarnessError> {
        let (runner, config) = self.lookup(language)?;
        let entry = self
            .entry_points
            .resolve(&config.default_entry_point, |name| runner.declares(source, name));

        match entry.resolution {
            Resolution::Registered => {
                debug!(language = %language, entry_point = %entry.name, "Resolved entry point")
            }
            Resolution::Fallback => warn!(
                language = %language,
                entry_point = %entry.name,
                "No registered signature declared; using the language default entry point"
            ),
            Resolution::Unresolved => warn!(
                language = %language,
                entry_point = %entry.name,
                "No registered signature or default entry point declared in source"
            ),
        }
        Ok(entry)
    }

    /// Build a harness unit for a raw language name.
    pub fn build(
        &self,
        language: &str,
        source: &str,
        arguments: &DecodedArguments,
    ) -> Result<HarnessUnit, HarnessError> {
        let language = self.resolve_language(language)?;
        let entry_point = self.resolve_entry_point(language, source)?;
        self.build_for(language, source, &entry_point, arguments)
    }

    /// Build a harness unit once language and entry point are known.
    pub fn build_for(
        &self,
        language: LanguageId,
        source: &str,
        entry_point: &EntryPoint,
        arguments: &DecodedArguments,
    ) -> Result<HarnessUnit, HarnessError> {
        let (runner, config) = self.lookup(language)?;

        if runner.is_compiled() && !entry_point.is_declared() {
            return Err(HarnessError::UnresolvedEntryPoint(entry_point.name.clone()));
        }
        if let Some(arity) = entry_point.arity {
            if arity != arguments.len() {
                warn!(
                    entry_point = %entry_point.name,
                    arity,
                    arguments = arguments.len(),
                    "Argument count differs from the registered arity"
                );
            }
        }

        let marker = new_marker();
        let files = runner.render(source, entry_point, arguments, &marker)?;

        Ok(HarnessUnit {
            language,
            entry_point: entry_point.name.clone(),
            files,
            profile: ExecutionProfile::from(config),
            marker,
        })
    }

    fn lookup(
        &self,
        language: LanguageId,
    ) -> Result<(&dyn LanguageRunner, &LanguageConfig), HarnessError> {
        let unsupported = || HarnessError::UnsupportedLanguage(language.to_string());
        let runner = self.runners.get(&language).ok_or_else(unsupported)?;
        let config = self.languages.get_config(&language).map_err(|_| unsupported())?;
        Ok((runner.as_ref(), config))
    }
}

fn new_marker() -> String {
    format!("@@arbiter:{}@@", uuid::Uuid::new_v4().simple())
}

/// What the harness reported through its output slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Returned(Value),
    Raised(String),
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct SlotEnvelope {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Read the output slot from captured stdout. Only the last marker occurrence
/// counts; `None` means the harness never reached the slot.
pub fn read_output_slot(stdout: &str, marker: &str) -> Option<SlotValue> {
    let start = stdout.rfind(marker)? + marker.len();
    let payload = stdout[start..].lines().next().unwrap_or("").trim();

    let slot = match serde_json::from_str::<SlotEnvelope>(payload) {
        Ok(envelope) if envelope.ok => SlotValue::Returned(envelope.value),
        Ok(envelope) => SlotValue::Raised(
            envelope
                .error
                .unwrap_or_else(|| "entry point raised an error".to_string()),
        ),
        Err(e) => SlotValue::Malformed(e.to_string()),
    };
    Some(slot)
}

/// Regex-escaped name for declaration patterns
pub(crate) fn escaped(name: &str) -> String {
    regex::escape(name)
}

/// Shared declaration check for C-family languages: a type token (optionally
/// templated, array-suffixed or pointer/reference) followed by `name(`.
/// Keywords that can precede a call are not types.
pub(crate) fn declares_typed_function(source: &str, name: &str) -> bool {
    let pattern = format!(
        r"(\w+)(?:\s*<[^;{{}}()]*>)?(?:\s*\[\s*\])*(?:\s+|\s*[*&]+\s*){}\s*\(",
        escaped(name)
    );
    let Ok(re) = regex::Regex::new(&pattern) else {
        return false;
    };
    let declared = re.captures_iter(source).any(|caps| {
        !matches!(
            caps.get(1).map(|m| m.as_str()),
            Some("return" | "new" | "throw" | "else" | "case" | "delete" | "co_return")
        )
    });
    declared
}

pub(crate) fn matches_pattern(pattern: &str, source: &str) -> bool {
    regex::Regex::new(pattern)
        .map(|re| re.is_match(source))
        .unwrap_or(false)
}
