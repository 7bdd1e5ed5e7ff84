// Problem catalog: resolves a problem id to its test cases
use arbiter_common::types::TestCase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("problem not found: {0}")]
    NotFound(String),
    #[error("failed to read problem catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse problem catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate problem id in catalog: {0}")]
    Duplicate(String),
}

pub trait ProblemCatalog: Send + Sync {
    fn test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>, CatalogError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
struct ProblemsFile {
    problems: Vec<Problem>,
}

/// Catalog loaded from `problems.json`
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    problems: BTreeMap<String, Problem>,
}

impl FileCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: ProblemsFile = serde_json::from_str(content)?;
        Self::from_problems(file.problems)
    }

    pub fn from_problems(problems: Vec<Problem>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for problem in problems {
            if map.contains_key(&problem.id) {
                return Err(CatalogError::Duplicate(problem.id));
            }
            map.insert(problem.id.clone(), problem);
        }
        Ok(Self { problems: map })
    }

    pub fn problem(&self, problem_id: &str) -> Option<&Problem> {
        self.problems.get(problem_id)
    }

    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.problems.values()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl ProblemCatalog for FileCatalog {
    fn test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>, CatalogError> {
        self.problems
            .get(problem_id)
            .map(|problem| problem.test_cases.clone())
            .ok_or_else(|| CatalogError::NotFound(problem_id.to_string()))
    }
}
