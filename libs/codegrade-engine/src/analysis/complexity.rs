/// Complexity Analyzer - Structural Metrics Per Function
///
/// **Per function (module-level functions and methods of module-level classes):**
/// - Cyclomatic complexity = 1 + decision points in the subtree
/// - Maximum nesting depth of `if` / `for` / `while` blocks
/// - Direct recursion (call to own name, or `self.` / `cls.` + own name)
///
/// **Scoring Rules:**
/// - Start at 100
/// - Minus `cyclomatic_penalty` per function above `cyclomatic_threshold`
/// - Minus `nesting_penalty` per function above `nesting_threshold`
/// - Floor at 0
///
/// Builtin hints are advisory text and never affect the score.

use super::{descendants, line_of, SourceTree};
use crate::error::EvalError;
use crate::report::Advise;
use codegrade_common::config::AnalysisLimits;
use codegrade_common::types::{ComplexityResult, FunctionMetrics};
use tree_sitter::Node;

const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "except_group_clause",
    "case_clause",
    "boolean_operator",
    "if_clause",
    "conditional_expression",
];

const NESTING_KINDS: &[&str] = &["if_statement", "for_statement", "while_statement"];

const BUILTIN_HINTS: &[(&str, &str)] = &[
    ("sorted", "Uses sorted() — O(n log n) time."),
    ("sort", "Uses list.sort() — O(n log n) in-place."),
    ("set", "Uses set() — O(n) construction, O(1) average lookup."),
    ("dict", "Uses dict() — O(n) construction, O(1) average lookup."),
    ("reversed", "Uses reversed() — O(n) traversal."),
    ("heappush", "Uses heapq.heappush() — O(log n) per insertion."),
    ("heappop", "Uses heapq.heappop() — O(log n) per removal."),
    ("heapify", "Uses heapq.heapify() — O(n) heap construction."),
    ("bisect_left", "Uses bisect — O(log n) search in a sorted sequence."),
    ("bisect_right", "Uses bisect — O(log n) search in a sorted sequence."),
    ("deque", "Uses deque — O(1) appends and pops at both ends."),
    ("Counter", "Uses Counter — O(n) construction, O(1) average lookup."),
];

pub fn analyze(tree: &SourceTree, limits: &AnalysisLimits) -> ComplexityResult {
    let functions: Vec<FunctionMetrics> = tree
        .top_level_functions()
        .into_iter()
        .map(|(name, def)| function_metrics(tree, name, def))
        .collect();

    let score = score(&functions, limits);
    let warnings = warnings(&functions, limits);
    let builtin_hints = builtin_hints(tree);

    let summary = if functions.is_empty() {
        "No top-level functions detected.".to_string()
    } else {
        let average = functions
            .iter()
            .map(|f| f64::from(f.cyclomatic_complexity))
            .sum::<f64>()
            / functions.len() as f64;
        format!(
            "Analysed {} function(s). Average cyclomatic complexity: {:.1}. {}",
            functions.len(),
            average,
            if score >= 80 {
                "No major complexity issues detected."
            } else {
                "Complexity issues found — see warnings."
            }
        )
    };

    ComplexityResult {
        score,
        functions,
        builtin_hints,
        warnings,
        summary,
        parse_error: None,
    }
}

/// Parse and analyze in one step
pub fn analyze_source(source: &str, limits: &AnalysisLimits) -> ComplexityResult {
    match SourceTree::parse(source) {
        Ok(tree) => analyze(&tree, limits),
        Err(e) => parse_failure(&e),
    }
}

pub fn parse_failure(error: &EvalError) -> ComplexityResult {
    ComplexityResult {
        score: 0,
        functions: Vec::new(),
        builtin_hints: Vec::new(),
        warnings: vec![error.to_string()],
        summary: format!("Could not parse submission: {}", error),
        parse_error: Some(error.to_string()),
    }
}

fn function_metrics(tree: &SourceTree, name: String, def: Node<'_>) -> FunctionMetrics {
    let nodes = descendants(def);
    let decisions = nodes
        .iter()
        .filter(|n| DECISION_KINDS.contains(&n.kind()))
        .count() as u32;

    let bare_name = tree.definition_name(def);
    let is_recursive = nodes
        .iter()
        .filter(|n| n.kind() == "call")
        .filter_map(|call| tree.call_target(*call))
        .any(|target| {
            target == bare_name
                || target.strip_prefix("self.") == Some(bare_name)
                || target.strip_prefix("cls.") == Some(bare_name)
        });

    let max_nesting_depth = def
        .child_by_field_name("body")
        .map(nesting_depth)
        .unwrap_or(0);

    FunctionMetrics {
        name,
        line: line_of(def),
        line_count: def.end_position().row - def.start_position().row + 1,
        cyclomatic_complexity: 1 + decisions,
        max_nesting_depth,
        is_recursive,
    }
}

/// Deepest chain of nesting blocks under `body`; iterative so deeply nested
/// expressions cannot exhaust the thread stack
fn nesting_depth(body: Node<'_>) -> u32 {
    let mut deepest = 0;
    let mut stack = vec![(body, 0u32)];
    while let Some((node, depth)) = stack.pop() {
        let depth = if NESTING_KINDS.contains(&node.kind()) {
            depth + 1
        } else {
            depth
        };
        deepest = deepest.max(depth);
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor).map(|child| (child, depth)));
    }
    deepest
}

fn score(functions: &[FunctionMetrics], limits: &AnalysisLimits) -> u32 {
    let deduction: u32 = functions
        .iter()
        .map(|f| {
            let mut penalty = 0;
            if f.cyclomatic_complexity > limits.cyclomatic_threshold {
                penalty += limits.cyclomatic_penalty;
            }
            if f.max_nesting_depth > limits.nesting_threshold {
                penalty += limits.nesting_penalty;
            }
            penalty
        })
        .sum();
    100u32.saturating_sub(deduction)
}

fn warnings(functions: &[FunctionMetrics], limits: &AnalysisLimits) -> Vec<String> {
    let mut warnings = Vec::new();
    for f in functions {
        if f.cyclomatic_complexity > limits.cyclomatic_threshold {
            warnings.push(format!(
                "'{}' has high cyclomatic complexity ({}). Consider breaking it into smaller functions.",
                f.name, f.cyclomatic_complexity
            ));
        }
        if f.max_nesting_depth > limits.nesting_threshold {
            warnings.push(format!(
                "'{}' has deep nesting (depth={}). This often indicates O(n^k) time complexity.",
                f.name, f.max_nesting_depth
            ));
        }
        if f.is_recursive {
            warnings.push(format!(
                "'{}' is recursive. Ensure base cases are correct and consider memoisation for overlapping subproblems.",
                f.name
            ));
        }
    }
    warnings
}

fn builtin_hints(tree: &SourceTree) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for call in descendants(tree.root()).into_iter().filter(|n| n.kind() == "call") {
        let Some(name) = tree.call_short_name(call) else {
            continue;
        };
        if let Some((_, hint)) = BUILTIN_HINTS.iter().find(|(builtin, _)| *builtin == name) {
            if !hints.iter().any(|h| h == hint) {
                hints.push(hint.to_string());
            }
        }
    }
    hints
}

impl Advise for ComplexityResult {
    fn recommendations(&self) -> Vec<String> {
        if let Some(error) = &self.parse_error {
            return vec![super::parse_failure_advice(error)];
        }
        self.warnings
            .iter()
            .take(2)
            .map(|w| format!("[Complexity] {}", w))
            .collect()
    }
}
