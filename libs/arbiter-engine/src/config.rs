// Language configuration management for the grading engine
use anyhow::{bail, Context, Result};
use arbiter_common::types::LanguageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageExecution {
    /// Compile stage, run inside the harness workspace. `None` for interpreters.
    #[serde(default)]
    pub compile: Option<Vec<String>>,
    /// Run stage, run inside the harness workspace
    pub run: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    pub image: String,
    pub execution: LanguageExecution,
    pub default_entry_point: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    /// Whether RLIMIT_AS can be applied; JVM and V8 reserve far more address
    /// space than they use and die under it.
    #[serde(default)]
    pub limit_address_space: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Language configuration manager
///
/// The set of languages it holds is the authoritative list of gradable
/// languages: an enumerated `LanguageId` without a configuration entry is
/// reported as unsupported.
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: BTreeMap<LanguageId, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;

        let languages_json: LanguagesJson =
            serde_json::from_str(&content).context("Failed to parse languages.json")?;

        let mut configs = BTreeMap::new();
        for lang in languages_json.languages {
            let id: LanguageId = lang
                .name
                .parse()
                .with_context(|| format!("Unknown language '{}' in languages.json", lang.name))?;
            if lang.execution.run.is_empty() {
                bail!("Language '{}' has an empty run command", lang.name);
            }
            configs.insert(id, lang);
        }

        if configs.is_empty() {
            bail!("No languages configured in {}", config_path.display());
        }

        Ok(Self { configs })
    }

    /// Load from `config_path`, falling back to the built-in table when the
    /// file does not exist. A file that exists but is invalid is an error.
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            warn!(
                path = %config_path.display(),
                "Language config not found, using built-in language table"
            );
            Ok(Self::builtin())
        }
    }

    /// Built-in configuration for every `LanguageId`
    pub fn builtin() -> Self {
        let mut configs = BTreeMap::new();

        configs.insert(
            LanguageId::Javascript,
            LanguageConfig {
                name: "javascript".to_string(),
                version: "20".to_string(),
                image: "node:20-alpine".to_string(),
                execution: LanguageExecution {
                    compile: None,
                    run: args(&["node", "main.js"]),
                },
                default_entry_point: "solve".to_string(),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                limit_address_space: false,
            },
        );
        configs.insert(
            LanguageId::Python,
            LanguageConfig {
                name: "python".to_string(),
                version: "3.12".to_string(),
                image: "python:3.12-alpine".to_string(),
                execution: LanguageExecution {
                    compile: None,
                    run: args(&["python3", "-I", "main.py"]),
                },
                default_entry_point: "solve".to_string(),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                limit_address_space: true,
            },
        );
        configs.insert(
            LanguageId::Java,
            LanguageConfig {
                name: "java".to_string(),
                version: "21".to_string(),
                image: "eclipse-temurin:21-jdk".to_string(),
                execution: LanguageExecution {
                    compile: Some(args(&[
                        "javac",
                        "-encoding",
                        "UTF-8",
                        "-d",
                        ".",
                        "Solution.java",
                        "Main.java",
                    ])),
                    run: args(&["java", "-Xmx256m", "-Xss64m", "-XX:+UseSerialGC", "-cp", ".", "Main"]),
                },
                default_entry_point: "solve".to_string(),
                memory_limit_mb: 512,
                cpu_limit: 1.0,
                limit_address_space: false,
            },
        );
        configs.insert(
            LanguageId::Cpp,
            LanguageConfig {
                name: "cpp".to_string(),
                version: "17".to_string(),
                image: "gcc:13".to_string(),
                execution: LanguageExecution {
                    compile: Some(args(&["g++", "-std=c++17", "-O2", "-o", "main", "main.cpp"])),
                    run: args(&["./main"]),
                },
                default_entry_point: "solve".to_string(),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                limit_address_space: true,
            },
        );

        Self { configs }
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &LanguageId) -> Result<&LanguageConfig> {
        self.configs
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", language))
    }

    pub fn is_enabled(&self, language: &LanguageId) -> bool {
        self.configs.contains_key(language)
    }

    /// List all configured languages
    pub fn list_languages(&self) -> Vec<LanguageId> {
        self.configs.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::NamedUtf8TempFile;
    use std::io::Write;

    fn write_config(contents: &str) -> NamedUtf8TempFile {
        let mut file = NamedUtf8TempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_builtin_covers_every_language() {
        let manager = LanguageConfigManager::builtin();
        for lang in LanguageId::ALL {
            assert!(manager.is_enabled(&lang), "{lang} missing");
            assert!(!manager.get_config(&lang).unwrap().execution.run.is_empty());
        }
    }

    #[test]
    fn test_load_subset() {
        let file = write_config(
            r#"{"languages":[{
                "name":"python","version":"3.11","image":"python:3.11-slim",
                "execution":{"run":["python3","main.py"]},
                "default_entry_point":"main","memory_limit_mb":128,"cpu_limit":0.25
            }]}"#,
        );
        let manager = LanguageConfigManager::load(file.path().as_std_path()).unwrap();

        assert_eq!(manager.list_languages(), vec![LanguageId::Python]);
        assert!(!manager.is_enabled(&LanguageId::Java));
        let config = manager.get_config(&LanguageId::Python).unwrap();
        assert_eq!(config.default_entry_point, "main");
        assert!(config.execution.compile.is_none());
        assert!(!config.limit_address_space);
        assert_eq!(config.image, "python:3.11-slim");
    }

    #[test]
    fn test_unknown_language_rejected() {
        let file = write_config(
            r#"{"languages":[{
                "name":"ruby","version":"3","image":"ruby:3",
                "execution":{"run":["ruby","main.rb"]},
                "default_entry_point":"solve","memory_limit_mb":128,"cpu_limit":0.5
            }]}"#,
        );
        let err = LanguageConfigManager::load(file.path().as_std_path()).unwrap_err();
        assert!(err.to_string().contains("ruby"));
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let manager =
            LanguageConfigManager::load_or_builtin(Path::new("does/not/exist/languages.json")).unwrap();
        assert_eq!(manager.list_languages().len(), LanguageId::ALL.len());
        assert!(LanguageConfigManager::load(Path::new("does/not/exist/languages.json")).is_err());
    }

    #[test]
    fn test_bundled_languages_json() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/languages.json");
        let manager = LanguageConfigManager::load(&path).unwrap();
        let builtin = LanguageConfigManager::builtin();
        assert_eq!(manager.list_languages(), builtin.list_languages());
        for lang in LanguageId::ALL {
            let (file, table) = (manager.get_config(&lang).unwrap(), builtin.get_config(&lang).unwrap());
            assert_eq!(file.execution.run, table.execution.run);
            assert_eq!(file.execution.compile, table.execution.compile);
            assert_eq!(file.limit_address_space, table.limit_address_space);
        }
    }
}
