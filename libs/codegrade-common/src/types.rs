use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Problem definition owned by the problem store.
///
/// Accepts both the snake_case field names used throughout this workspace and
/// the camelCase names used by existing problem files (`testCases`, `args`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "functionSignature")]
    pub function_signature: String,
    #[serde(default, alias = "testCases")]
    pub test_cases: Vec<TestCase>,
    #[serde(default, alias = "hiddenTestCases", skip_serializing_if = "Vec::is_empty")]
    pub hidden_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub preamble: String,
}

impl ProblemSpec {
    /// Visible cases followed by hidden cases, each tagged with its visibility.
    pub fn all_test_cases(&self) -> Vec<TestCase> {
        let visible = self.test_cases.iter().map(|tc| TestCase {
            hidden: false,
            ..tc.clone()
        });
        let hidden = self.hidden_test_cases.iter().map(|tc| TestCase {
            hidden: true,
            ..tc.clone()
        });
        visible.chain(hidden).collect()
    }

    /// Copy safe to hand to clients: hidden cases removed.
    pub fn public_view(&self) -> ProblemSpec {
        ProblemSpec {
            hidden_test_cases: Vec::new(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("Problem id cannot be empty");
        }
        if self.test_cases.is_empty() && self.hidden_test_cases.is_empty() {
            bail!("Problem '{}' defines no test cases", self.id);
        }
        for tc in self.test_cases.iter().chain(&self.hidden_test_cases) {
            if !(tc.weight.is_finite() && tc.weight > 0.0) {
                bail!(
                    "Test case '{}' in problem '{}' has non-positive weight {}",
                    tc.label,
                    self.id,
                    tc.weight
                );
            }
            if tc.invocation.trim().is_empty() {
                bail!("Test case '{}' in problem '{}' has no invocation", tc.label, self.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default = "default_label")]
    pub label: String,
    /// Expression evaluated against the submission, e.g. `twoSum([2, 7], 9)`.
    #[serde(alias = "args")]
    pub invocation: String,
    #[serde(default)]
    pub expected: Value,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub hidden: bool,
}

fn default_label() -> String {
    "Unnamed test".to_string()
}

fn default_ordered() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

/// Result of running one test invocation in the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success(Value),
    RuntimeFailure(String),
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Passed,
    Failed,
    RuntimeError,
    TimeLimitExceeded,
}

impl TestStatus {
    pub fn is_pass(self) -> bool {
        self == TestStatus::Passed
    }
}

/// Per-case outcome. Hidden cases never carry expected/actual/error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub label: String,
    pub status: TestStatus,
    pub hidden: bool,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectnessResult {
    pub score: u32,
    pub passed: usize,
    pub total: usize,
    pub earned_weight: f64,
    pub total_weight: f64,
    pub test_results: Vec<TestCaseResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    pub name: String,
    pub line: usize,
    pub line_count: usize,
    pub cyclomatic_complexity: u32,
    pub max_nesting_depth: u32,
    pub is_recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityResult {
    pub score: u32,
    pub functions: Vec<FunctionMetrics>,
    pub builtin_hints: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleCategory {
    NamingConvention,
    MissingDocstring,
    MagicNumber,
    LineTooLong,
    EmptyExcept,
    BareExcept,
    MutableDefault,
    UnusedImport,
}

impl StyleCategory {
    /// Points deducted per violation.
    pub fn penalty(self) -> u32 {
        match self {
            StyleCategory::NamingConvention => 3,
            StyleCategory::MissingDocstring => 4,
            StyleCategory::MagicNumber => 2,
            StyleCategory::LineTooLong => 1,
            StyleCategory::EmptyExcept => 8,
            StyleCategory::BareExcept => 6,
            StyleCategory::MutableDefault => 7,
            StyleCategory::UnusedImport => 3,
        }
    }
}

impl fmt::Display for StyleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StyleCategory::NamingConvention => "naming convention",
            StyleCategory::MissingDocstring => "missing docstring",
            StyleCategory::MagicNumber => "magic number",
            StyleCategory::LineTooLong => "line too long",
            StyleCategory::EmptyExcept => "empty except",
            StyleCategory::BareExcept => "bare except",
            StyleCategory::MutableDefault => "mutable default",
            StyleCategory::UnusedImport => "unused import",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleViolation {
    pub category: StyleCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleResult {
    pub score: u32,
    pub violations: BTreeMap<StyleCategory, Vec<StyleViolation>>,
    pub total_violations: usize,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn deduction(self) -> u32 {
        match self {
            Severity::Critical => 30,
            Severity::High => 15,
            Severity::Medium => 8,
            Severity::Low => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCategory {
    DynamicCodeExecution,
    DynamicImport,
    ShellInjection,
    UnsafeDeserialization,
    HardcodedCredential,
    SqlInjection,
    AssertForSecurity,
}

impl SecurityCategory {
    pub fn severity(self) -> Severity {
        match self {
            SecurityCategory::DynamicCodeExecution => Severity::Critical,
            SecurityCategory::HardcodedCredential => Severity::Critical,
            SecurityCategory::DynamicImport => Severity::High,
            SecurityCategory::ShellInjection => Severity::High,
            SecurityCategory::UnsafeDeserialization => Severity::High,
            SecurityCategory::SqlInjection => Severity::High,
            SecurityCategory::AssertForSecurity => Severity::High,
        }
    }

    /// Points deducted per finding in this category.
    pub fn penalty(self) -> u32 {
        self.severity().deduction()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub category: SecurityCategory,
    pub severity: Severity,
    pub message: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityResult {
    pub score: u32,
    pub findings: Vec<SecurityFinding>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// The four evaluation axes, in recommendation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Correctness,
    Security,
    Complexity,
    Style,
}

/// Common view over the four dimension results.
pub trait DimensionResult {
    fn dimension(&self) -> Dimension;
    fn score(&self) -> u32;
}

impl DimensionResult for CorrectnessResult {
    fn dimension(&self) -> Dimension {
        Dimension::Correctness
    }
    fn score(&self) -> u32 {
        self.score
    }
}

impl DimensionResult for ComplexityResult {
    fn dimension(&self) -> Dimension {
        Dimension::Complexity
    }
    fn score(&self) -> u32 {
        self.score
    }
}

impl DimensionResult for StyleResult {
    fn dimension(&self) -> Dimension {
        Dimension::Style
    }
    fn score(&self) -> u32 {
        self.score
    }
}

impl DimensionResult for SecurityResult {
    fn dimension(&self) -> Dimension {
        Dimension::Security
    }
    fn score(&self) -> u32 {
        self.score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub correctness: f64,
    pub complexity: f64,
    pub style: f64,
    pub security: f64,
}

impl ScoreWeights {
    pub const STANDARD: ScoreWeights = ScoreWeights {
        correctness: 0.50,
        complexity: 0.20,
        style: 0.15,
        security: 0.15,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimensions {
    pub correctness: CorrectnessResult,
    pub complexity: ComplexityResult,
    pub style: StyleResult,
    pub security: SecurityResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub problem_id: String,
    pub problem_title: String,
    pub difficulty: String,
    pub code_length: usize,
    pub overall_score: u32,
    pub grade: String,
    pub grade_label: String,
    pub score_weights: ScoreWeights,
    pub dimensions: Dimensions,
    pub recommendations: Vec<String>,
}
