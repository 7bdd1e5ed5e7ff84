/// Entry-Point Resolution
///
/// Problems declare the signature a submission is expected to implement.
/// Resolution is a static heuristic over the source text, never execution:
/// the first registered signature whose name is *declared* in the source wins,
/// otherwise the language's configured fallback name is used and the
/// fallback is reported, not hidden.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub arity: usize,
}

impl Signature {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A registered signature is declared in the source
    Registered,
    /// Nothing matched; the language default name is used and is declared
    Fallback,
    /// Nothing matched and the default name is not declared either
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub arity: Option<usize>,
    pub resolution: Resolution,
}

impl EntryPoint {
    pub fn is_declared(&self) -> bool {
        self.resolution != Resolution::Unresolved
    }
}

#[derive(Debug, Deserialize)]
struct SignaturesFile {
    signatures: Vec<Signature>,
}

/// Prioritized list of known signatures for the active problem set
#[derive(Debug, Clone)]
pub struct EntryPointRegistry {
    signatures: Vec<Signature>,
}

impl Default for EntryPointRegistry {
    fn default() -> Self {
        Self::new(vec![
            Signature::new("twoSum", 2),
            Signature::new("addTwoNumbers", 2),
            Signature::new("lengthOfLongestSubstring", 1),
            Signature::new("isPalindrome", 1),
            Signature::new("longestValidParentheses", 1),
            Signature::new("maxPathSum", 1),
        ])
    }
}

impl EntryPointRegistry {
    pub fn new(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// Load signatures from a JSON file `{ "signatures": [{ "name", "arity" }] }`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read entry points from {}", path.display()))?;
        let file: SignaturesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse entry points in {}", path.display()))?;
        Ok(Self::new(file.signatures))
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Resolve the callable for `source`. `declares` answers whether a name is
    /// declared as a function/method in the source's language.
    pub fn resolve<F>(&self, fallback: &str, declares: F) -> EntryPoint
    where
        F: Fn(&str) -> bool,
    {
        if let Some(sig) = self.signatures.iter().find(|sig| declares(&sig.name)) {
            return EntryPoint {
                name: sig.name.clone(),
                arity: Some(sig.arity),
                resolution: Resolution::Registered,
            };
        }

        let resolution = if declares(fallback) {
            Resolution::Fallback
        } else {
            Resolution::Unresolved
        };
        EntryPoint {
            name: fallback.to_string(),
            arity: None,
            resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declared_signature_wins() {
        let registry = EntryPointRegistry::default();
        let entry = registry.resolve("solve", |name| name == "isPalindrome" || name == "maxPathSum");
        assert_eq!(entry.name, "isPalindrome");
        assert_eq!(entry.arity, Some(1));
        assert_eq!(entry.resolution, Resolution::Registered);
    }

    #[test]
    fn test_fallback_is_reported() {
        let registry = EntryPointRegistry::default();

        let entry = registry.resolve("solve", |name| name == "solve");
        assert_eq!(entry.resolution, Resolution::Fallback);
        assert!(entry.is_declared());

        let entry = registry.resolve("solve", |_| false);
        assert_eq!(entry.name, "solve");
        assert_eq!(entry.resolution, Resolution::Unresolved);
        assert!(!entry.is_declared());
    }

    #[test]
    fn test_custom_registry_order() {
        let registry = EntryPointRegistry::new(vec![
            Signature::new("second", 1),
            Signature::new("first", 1),
        ]);
        let entry = registry.resolve("solve", |_| true);
        assert_eq!(entry.name, "second");
    }

    #[test]
    fn test_bundled_registry_matches_default() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/entry_points.json");
        let registry = EntryPointRegistry::load(&path).unwrap();
        assert_eq!(registry.signatures(), EntryPointRegistry::default().signatures());
    }
}
