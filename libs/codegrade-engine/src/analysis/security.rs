/// Security Analyzer - Dangerous Construct Catalogue
///
/// **Findings:**
/// - dynamic code execution (`eval`, `exec`, `compile`) - critical
/// - dynamic import (`__import__`, `importlib.import_module`) - high
/// - shell injection surface (`os.system`, `shell=True`, ...) - high
/// - unsafe deserialization (`pickle`, `marshal`, `yaml.load`, ...) - high
/// - hardcoded credentials (regex over raw text) - critical
/// - SQL text built by `+`, `%`, f-string or `.format()` - high
/// - `assert` guarding auth/permission logic - high
///
/// score = 100 - sum(severity deduction per finding), floored at 0.

use super::{descendants, line_of, SourceTree};
use crate::error::EvalError;
use crate::report::Advise;
use codegrade_common::types::{SecurityCategory, SecurityFinding, SecurityResult, Severity};
use lazy_static::lazy_static;
use regex::Regex;
use tree_sitter::Node;

lazy_static! {
    static ref SECRET_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r#"(?i)(password|passwd|pwd)\s*=\s*['"].{3,}['"]"#).unwrap(),
            "Hardcoded password",
        ),
        (
            Regex::new(r#"(?i)(api_key|apikey|secret_key)\s*=\s*['"].{8,}['"]"#).unwrap(),
            "Hardcoded API key",
        ),
        (
            Regex::new(r#"(?i)(token)\s*=\s*['"][a-zA-Z0-9+/=]{16,}['"]"#).unwrap(),
            "Hardcoded token",
        ),
        (
            Regex::new(r#"(?i)aws_secret_access_key\s*=\s*['"].+['"]"#).unwrap(),
            "Hardcoded AWS secret",
        ),
    ];
}

const SECURITY_KEYWORDS: &[&str] = &["auth", "admin", "permission", "valid", "token", "role", "access"];

const SHELL_ALWAYS: &[(&str, &str)] = &[
    ("os.system", "os.system() is vulnerable to shell injection. Use subprocess with a list."),
    ("os.popen", "os.popen() is vulnerable to shell injection."),
    ("subprocess.getoutput", "subprocess.getoutput() runs its command through the shell."),
    ("subprocess.getstatusoutput", "subprocess.getstatusoutput() runs its command through the shell."),
];

const SHELL_FLAGGED: &[&str] = &[
    "subprocess.run",
    "subprocess.call",
    "subprocess.Popen",
    "subprocess.check_output",
    "subprocess.check_call",
];

const DESERIALIZERS: &[&str] = &[
    "pickle.load",
    "pickle.loads",
    "cPickle.load",
    "cPickle.loads",
    "dill.load",
    "dill.loads",
    "marshal.load",
    "marshal.loads",
    "shelve.open",
    "yaml.unsafe_load",
];

const QUERY_METHODS: &[&str] = &["execute", "executemany", "executescript", "raw"];

pub trait SecurityRule {
    fn category(&self) -> SecurityCategory;

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding>;

    fn finding(&self, line: usize, message: String) -> SecurityFinding {
        let category = self.category();
        SecurityFinding {
            category,
            severity: category.severity(),
            message,
            line,
        }
    }
}

const CATALOGUE: &[&dyn SecurityRule] = &[
    &DynamicExecutionRule,
    &DynamicImportRule,
    &ShellInjectionRule,
    &UnsafeDeserializationRule,
    &HardcodedCredentialRule,
    &SqlInjectionRule,
    &AssertForSecurityRule,
];

pub fn analyze(tree: &SourceTree) -> SecurityResult {
    let mut findings: Vec<SecurityFinding> =
        CATALOGUE.iter().flat_map(|rule| rule.scan(tree)).collect();
    findings.sort_by_key(|f| f.line);

    let deduction: u32 = findings.iter().map(|f| f.category.penalty()).sum();
    let score = 100u32.saturating_sub(deduction);

    SecurityResult {
        score,
        summary: summarize(&findings),
        findings,
        parse_error: None,
    }
}

/// Parse and analyze in one step
pub fn analyze_source(source: &str) -> SecurityResult {
    match SourceTree::parse(source) {
        Ok(tree) => analyze(&tree),
        Err(e) => parse_failure(&e),
    }
}

pub fn parse_failure(error: &EvalError) -> SecurityResult {
    SecurityResult {
        score: 0,
        findings: Vec::new(),
        summary: format!("Syntax error — security checks skipped: {}", error),
        parse_error: Some(error.to_string()),
    }
}

fn summarize(findings: &[SecurityFinding]) -> String {
    if findings.is_empty() {
        return "No security issues detected.".to_string();
    }
    let parts: Vec<String> = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        .into_iter()
        .filter_map(|severity| {
            let count = findings.iter().filter(|f| f.severity == severity).count();
            (count > 0).then(|| format!("{} {}", count, severity))
        })
        .collect();
    format!(
        "Found {} security finding(s): {}.",
        findings.len(),
        parts.join(", ")
    )
}

fn calls(tree: &SourceTree) -> Vec<Node<'_>> {
    descendants(tree.root())
        .into_iter()
        .filter(|n| n.kind() == "call")
        .collect()
}

/// First positional argument of a call
fn first_argument(call: Node<'_>) -> Option<Node<'_>> {
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments
        .named_children(&mut cursor)
        .find(|arg| !matches!(arg.kind(), "keyword_argument" | "comment"));
    first
}

struct DynamicExecutionRule;

impl SecurityRule for DynamicExecutionRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::DynamicCodeExecution
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        calls(tree)
            .into_iter()
            .filter_map(|call| {
                let message = match tree.call_target(call)? {
                    "eval" => "eval() executes arbitrary code. Never use on untrusted input.",
                    "exec" => "exec() executes arbitrary code. Never use on untrusted input.",
                    "compile" => "compile() builds code objects from text. Never use on untrusted input.",
                    _ => return None,
                };
                Some(self.finding(line_of(call), message.to_string()))
            })
            .collect()
    }
}

struct DynamicImportRule;

impl SecurityRule for DynamicImportRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::DynamicImport
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        calls(tree)
            .into_iter()
            .filter_map(|call| {
                let message = match tree.call_target(call)? {
                    "__import__" => "__import__() bypasses normal import controls.",
                    "importlib.import_module" => {
                        "importlib.import_module() loads a module chosen at runtime."
                    }
                    _ => return None,
                };
                Some(self.finding(line_of(call), message.to_string()))
            })
            .collect()
    }
}

struct ShellInjectionRule;

impl SecurityRule for ShellInjectionRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::ShellInjection
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        let mut findings = Vec::new();
        for call in calls(tree) {
            let Some(target) = tree.call_target(call) else {
                continue;
            };
            if let Some((_, message)) = SHELL_ALWAYS.iter().find(|(name, _)| *name == target) {
                findings.push(self.finding(line_of(call), message.to_string()));
            } else if SHELL_FLAGGED.contains(&target)
                && tree
                    .keyword_argument(call, "shell")
                    .is_some_and(|value| value.kind() == "true")
            {
                findings.push(self.finding(
                    line_of(call),
                    format!(
                        "{}() called with shell=True — vulnerable to shell injection if input is user-controlled.",
                        target
                    ),
                ));
            }
        }
        findings
    }
}

struct UnsafeDeserializationRule;

impl SecurityRule for UnsafeDeserializationRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::UnsafeDeserialization
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        let mut findings = Vec::new();
        for call in calls(tree) {
            let Some(target) = tree.call_target(call) else {
                continue;
            };
            if DESERIALIZERS.contains(&target) {
                findings.push(self.finding(
                    line_of(call),
                    format!(
                        "{}() on untrusted data enables arbitrary code execution.",
                        target
                    ),
                ));
            } else if target == "yaml.load" && !has_safe_loader(tree, call) {
                findings.push(self.finding(
                    line_of(call),
                    "yaml.load() without a safe Loader is unsafe. Use yaml.safe_load().".to_string(),
                ));
            }
        }
        findings
    }
}

/// `yaml.load(data, Loader=yaml.SafeLoader)` or `yaml.load(data, SafeLoader)`
fn has_safe_loader(tree: &SourceTree, call: Node<'_>) -> bool {
    if let Some(loader) = tree.keyword_argument(call, "Loader") {
        return tree.text(loader).contains("Safe");
    }
    let Some(arguments) = call.child_by_field_name("arguments") else {
        return false;
    };
    let mut cursor = arguments.walk();
    let positional: Vec<Node<'_>> = arguments
        .named_children(&mut cursor)
        .filter(|arg| !matches!(arg.kind(), "keyword_argument" | "comment"))
        .collect();
    positional
        .get(1)
        .is_some_and(|loader| tree.text(*loader).contains("Safe"))
}

struct HardcodedCredentialRule;

impl SecurityRule for HardcodedCredentialRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::HardcodedCredential
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        let source = tree.source();
        let mut findings = Vec::new();
        for (pattern, label) in SECRET_PATTERNS.iter() {
            for found in pattern.find_iter(source) {
                let line = source[..found.start()].matches('\n').count() + 1;
                findings.push(self.finding(
                    line,
                    format!(
                        "{} detected at line {}. Store secrets in environment variables or a secrets manager.",
                        label, line
                    ),
                ));
            }
        }
        findings
    }
}

struct SqlInjectionRule;

impl SecurityRule for SqlInjectionRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::SqlInjection
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        calls(tree)
            .into_iter()
            .filter(|call| {
                tree.call_short_name(*call)
                    .is_some_and(|name| QUERY_METHODS.contains(&name))
            })
            .filter(|call| first_argument(*call).is_some_and(|query| is_built_query(tree, query)))
            .map(|call| {
                let line = line_of(call);
                self.finding(
                    line,
                    format!(
                        "Possible SQL injection at line {}. Use parameterised queries instead of string formatting.",
                        line
                    ),
                )
            })
            .collect()
    }
}

/// Query text assembled at runtime rather than passed with parameters
fn is_built_query(tree: &SourceTree, query: Node<'_>) -> bool {
    match query.kind() {
        "binary_operator" => query
            .child_by_field_name("operator")
            .is_some_and(|op| matches!(tree.text(op), "+" | "%")),
        "string" => {
            let mut cursor = query.walk();
            let has_interpolation = query
                .named_children(&mut cursor)
                .any(|part| part.kind() == "interpolation");
            has_interpolation
        }
        "call" => tree.call_short_name(query) == Some("format")
            && query
                .child_by_field_name("function")
                .is_some_and(|f| f.kind() == "attribute"),
        _ => false,
    }
}

struct AssertForSecurityRule;

impl SecurityRule for AssertForSecurityRule {
    fn category(&self) -> SecurityCategory {
        SecurityCategory::AssertForSecurity
    }

    fn scan(&self, tree: &SourceTree) -> Vec<SecurityFinding> {
        descendants(tree.root())
            .into_iter()
            .filter(|n| n.kind() == "assert_statement")
            .filter(|statement| {
                statement.named_child(0).is_some_and(|condition| {
                    let condition = tree.text(condition).to_lowercase();
                    SECURITY_KEYWORDS.iter().any(|kw| condition.contains(kw))
                })
            })
            .map(|statement| {
                let line = line_of(statement);
                self.finding(
                    line,
                    format!(
                        "assert used for security check at line {}. Assertions are stripped with `python -O`. Use explicit if/raise.",
                        line
                    ),
                )
            })
            .collect()
    }
}

impl Advise for SecurityResult {
    fn recommendations(&self) -> Vec<String> {
        if let Some(error) = &self.parse_error {
            return vec![super::parse_failure_advice(error)];
        }
        self.findings
            .iter()
            .filter(|f| matches!(f.severity, Severity::Critical | Severity::High))
            .take(3)
            .map(|f| format!("[Security] {}", f.message))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(result: &SecurityResult) -> Vec<SecurityCategory> {
        result.findings.iter().map(|f| f.category).collect()
    }

    #[test]
    fn test_clean_code() {
        let result = analyze_source("def f(x):\n    return x * 2\n");
        assert_eq!(result.score, 100);
        assert!(result.findings.is_empty());
        assert_eq!(result.summary, "No security issues detected.");
    }

    #[test]
    fn test_eval_is_critical() {
        let result = analyze_source("def run(user_input):\n    return eval(user_input)\n");

        assert_eq!(categories(&result), vec![SecurityCategory::DynamicCodeExecution]);
        assert_eq!(result.findings[0].severity, Severity::Critical);
        assert_eq!(result.findings[0].line, 2);
        assert_eq!(result.score, 70);
        assert_eq!(result.summary, "Found 1 security finding(s): 1 critical.");
    }

    #[test]
    fn test_method_named_eval_is_not_flagged() {
        let result = analyze_source("model.eval()\n");
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_shell_injection() {
        let result = analyze_source(
            "import os, subprocess\nos.system(cmd)\nsubprocess.run(cmd, shell=True)\nsubprocess.run(['ls'], shell=False)\n",
        );

        assert_eq!(
            categories(&result),
            vec![SecurityCategory::ShellInjection, SecurityCategory::ShellInjection]
        );
        assert_eq!(result.findings[1].line, 3);
        assert_eq!(result.score, 70);
    }

    #[test]
    fn test_deserialization_and_yaml_loader() {
        let result = analyze_source(
            "import pickle, yaml\npickle.loads(blob)\nyaml.load(doc)\nyaml.load(doc, Loader=yaml.SafeLoader)\nyaml.safe_load(doc)\n",
        );

        assert_eq!(result.findings.len(), 2);
        assert!(result.findings.iter().all(|f| f.category == SecurityCategory::UnsafeDeserialization));
        assert_eq!(result.findings[1].line, 3);
    }

    #[test]
    fn test_hardcoded_credentials() {
        let result = analyze_source(
            "API_KEY = 'abcd1234efgh'\npassword = \"hunter22\"\nname = 'bob'\n",
        );

        assert_eq!(
            categories(&result),
            vec![SecurityCategory::HardcodedCredential, SecurityCategory::HardcodedCredential]
        );
        assert!(result.findings[0].message.starts_with("Hardcoded API key detected at line 1"));
        assert!(result.findings[1].message.starts_with("Hardcoded password detected at line 2"));
        assert_eq!(result.score, 40);
    }

    #[test]
    fn test_sql_injection_shapes() {
        let result = analyze_source(concat!(
            "cursor.execute(\"SELECT * FROM users WHERE id = \" + user_id)\n",
            "cursor.execute(\"SELECT * FROM users WHERE id = %s\" % user_id)\n",
            "cursor.execute(f\"SELECT * FROM users WHERE id = {user_id}\")\n",
            "cursor.execute(\"SELECT * FROM users WHERE id = {}\".format(user_id))\n",
            "cursor.execute(\"SELECT * FROM users WHERE id = %s\", (user_id,))\n",
        ));

        let lines: Vec<usize> = result.findings.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
        assert!(result.findings.iter().all(|f| f.category == SecurityCategory::SqlInjection));
    }

    #[test]
    fn test_assert_for_security() {
        let result = analyze_source(
            "def delete(user):\n    assert user.is_admin, 'admins only'\n    assert len(user.name) > 0\n",
        );

        assert_eq!(categories(&result), vec![SecurityCategory::AssertForSecurity]);
        assert_eq!(result.findings[0].line, 2);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let source: String = (0..5).map(|i| format!("eval('x{}')\n", i)).collect();
        assert_eq!(analyze_source(&source).score, 0);
    }

    #[test]
    fn test_recommendations_cap_at_three() {
        let source: String = (0..5).map(|i| format!("exec('x{}')\n", i)).collect();
        let result = analyze_source(&source);
        let recommendations = result.recommendations();

        assert_eq!(recommendations.len(), 3);
        assert!(recommendations[0].starts_with("[Security] exec()"));
    }
}
