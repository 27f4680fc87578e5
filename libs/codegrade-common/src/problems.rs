// Problem definitions management
// Loads and validates problem_<id>.json files from a directory

use crate::types::ProblemSpec;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_PROBLEMS_DIR: &str = "problems";

/// Listing entry; never includes test case contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub visible_tests: usize,
    pub hidden_tests: usize,
}

impl From<&ProblemSpec> for ProblemSummary {
    fn from(problem: &ProblemSpec) -> Self {
        Self {
            id: problem.id.clone(),
            title: problem.title.clone(),
            difficulty: problem.difficulty.clone(),
            visible_tests: problem.test_cases.len(),
            hidden_tests: problem.hidden_test_cases.len(),
        }
    }
}

/// Registry of loaded problems, keyed by id.
/// Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct ProblemRegistry {
    problems: BTreeMap<String, ProblemSpec>,
}

impl ProblemRegistry {
    /// Read and validate one problem file
    pub fn load_file(path: &Path) -> Result<ProblemSpec> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let problem: ProblemSpec = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        problem
            .validate()
            .with_context(|| format!("Invalid problem definition in {}", path.display()))?;
        Ok(problem)
    }

    /// Load every `problem_*.json` in `dir`. Invalid files are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("Problems directory not found: {}", dir.display());
        }

        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("problem_") && name.ends_with(".json"))
            })
            .collect();
        paths.sort();

        let mut registry = Self::default();
        for path in paths {
            match Self::load_file(&path) {
                Ok(problem) => {
                    if registry.problems.contains_key(&problem.id) {
                        warn!(id = %problem.id, path = %path.display(), "Duplicate problem id, keeping first");
                        continue;
                    }
                    registry.insert(problem);
                }
                Err(e) => warn!(path = %path.display(), error = %format!("{:#}", e), "Skipping problem file"),
            }
        }

        info!(dir = %dir.display(), count = registry.len(), "Problems loaded");
        Ok(registry)
    }

    pub fn insert(&mut self, problem: ProblemSpec) {
        self.problems.insert(problem.id.clone(), problem);
    }

    pub fn get(&self, id: &str) -> Option<&ProblemSpec> {
        self.problems.get(id)
    }

    pub fn summaries(&self) -> Vec<ProblemSummary> {
        self.problems.values().map(ProblemSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "id": "002",
        "title": "Valid Parentheses",
        "difficulty": "Easy",
        "testCases": [{ "label": "simple", "args": "isValid('()')", "expected": true }],
        "hiddenTestCases": [{ "label": "nested", "args": "isValid('([)]')", "expected": false }]
    }"#;

    #[test]
    fn test_load_dir_filters_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("problem_002.json"), VALID).unwrap();
        fs::write(dir.path().join("notes.json"), VALID).unwrap();
        fs::write(
            dir.path().join("problem_003.json"),
            r#"{ "id": "003", "title": "Empty", "testCases": [] }"#,
        )
        .unwrap();
        fs::write(dir.path().join("problem_004.json"), "{ not json").unwrap();

        let registry = ProblemRegistry::load_dir(dir.path()).unwrap();

        assert_eq!(registry.len(), 1);
        let problem = registry.get("002").unwrap();
        assert_eq!(problem.title, "Valid Parentheses");
        assert!(registry.get("003").is_none());

        let summaries = registry.summaries();
        assert_eq!(summaries[0].visible_tests, 1);
        assert_eq!(summaries[0].hidden_tests, 1);
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        assert!(ProblemRegistry::load_dir(Path::new("no/such/dir")).is_err());
    }

    #[test]
    fn test_load_file_rejects_zero_weight() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("problem_009.json");
        fs::write(
            &path,
            r#"{ "id": "009", "title": "Bad", "testCases": [{ "args": "f()", "expected": 1, "weight": 0 }] }"#,
        )
        .unwrap();

        let err = ProblemRegistry::load_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("non-positive weight"));
    }
}
