// Evaluator configuration, loaded once at process start
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/evaluator.json";
pub const CONFIG_PATH_ENV: &str = "CODEGRADE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    /// Fresh interpreter process per test case
    Process,
    /// Disposable container per test case
    Docker,
}

impl std::str::FromStr for SandboxBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "process" => Ok(SandboxBackend::Process),
            "docker" => Ok(SandboxBackend::Docker),
            other => bail!("Unknown sandbox backend '{}' (expected process or docker)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    pub image: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: SandboxBackend,
    pub python_bin: String,
    pub timeout_seconds: u64,
    /// Upper bound on concurrently running test-case processes
    pub max_parallel_tests: usize,
    pub max_source_bytes: usize,
    pub docker: DockerSettings,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::Process,
            python_bin: "python3".to_string(),
            timeout_seconds: 5,
            max_parallel_tests: 4,
            max_source_bytes: 1024 * 1024,
            docker: DockerSettings::default(),
        }
    }
}

/// Thresholds shared by the tree-based analyzers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisLimits {
    pub max_line_length: usize,
    pub cyclomatic_threshold: u32,
    pub cyclomatic_penalty: u32,
    pub nesting_threshold: u32,
    pub nesting_penalty: u32,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_line_length: 100,
            cyclomatic_threshold: 10,
            cyclomatic_penalty: 20,
            nesting_threshold: 2,
            nesting_penalty: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub sandbox: SandboxConfig,
    pub analysis: AnalysisLimits,
}

impl EvaluatorConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Evaluator config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EvaluatorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to built-in defaults when the file is absent
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            warn!(
                path = %config_path.display(),
                "Evaluator config not found, using built-in defaults"
            );
            Ok(Self::default())
        }
    }

    /// `CODEGRADE_CONFIG` if set, else `config/evaluator.json`
    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Startup path used by the binaries: file (or defaults) plus env overrides
    pub fn load_from_env() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_or_default(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            path = %path.display(),
            backend = ?config.sandbox.backend,
            python_bin = %config.sandbox.python_bin,
            "Evaluator configuration loaded"
        );
        Ok(config)
    }

    /// Apply `CODEGRADE_SANDBOX` and `PYTHON_BIN`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("CODEGRADE_SANDBOX") {
            self.sandbox.backend = backend
                .parse()
                .context("Invalid CODEGRADE_SANDBOX value")?;
        }
        if let Some(python_bin) = lookup("PYTHON_BIN") {
            self.sandbox.python_bin = python_bin;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_seconds == 0 {
            bail!("sandbox.timeout_seconds must be greater than zero");
        }
        if self.sandbox.max_parallel_tests == 0 {
            bail!("sandbox.max_parallel_tests must be greater than zero");
        }
        if self.sandbox.python_bin.trim().is_empty() {
            bail!("sandbox.python_bin cannot be empty");
        }
        if self.analysis.max_line_length == 0 {
            bail!("analysis.max_line_length must be greater than zero");
        }
        Ok(())
    }
}
