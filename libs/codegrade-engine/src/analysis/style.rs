/// Style Analyzer - Fixed Rule Catalogue
///
/// **Rules:**
/// - snake_case names (functions, assignment and loop targets)
/// - docstring on every function and class
/// - magic numbers outside {0, 1, -1, 2, 10, 100}
/// - line length limit
/// - empty `except` bodies, bare `except:`
/// - mutable default arguments
/// - imports never referenced
///
/// **Scoring Rules:**
/// score = 100 - sum(category penalty * violations in category), floored at 0.
/// Every rule is independent; adding one means adding a `StyleRule` to `CATALOGUE`.

use super::{descendants, is_constant_name, line_of, SourceTree};
use crate::error::EvalError;
use crate::report::Advise;
use codegrade_common::config::AnalysisLimits;
use codegrade_common::types::{StyleCategory, StyleResult, StyleViolation};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tree_sitter::Node;

lazy_static! {
    static ref SNAKE_CASE: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
}

const ALLOWED_NUMBERS: &[f64] = &[0.0, 1.0, -1.0, 2.0, 10.0, 100.0];

/// Recommendation priority: first violation of these categories comes first
const HIGH_IMPACT: &[StyleCategory] = &[
    StyleCategory::EmptyExcept,
    StyleCategory::MutableDefault,
    StyleCategory::BareExcept,
    StyleCategory::MissingDocstring,
];

pub trait StyleRule {
    fn category(&self) -> StyleCategory;

    fn check(&self, tree: &SourceTree, limits: &AnalysisLimits) -> Vec<StyleViolation>;

    fn violation(&self, line: usize, message: String) -> StyleViolation {
        StyleViolation {
            category: self.category(),
            message,
            line: Some(line),
        }
    }
}

const CATALOGUE: &[&dyn StyleRule] = &[
    &NamingRule,
    &DocstringRule,
    &MagicNumberRule,
    &LineLengthRule,
    &EmptyExceptRule,
    &BareExceptRule,
    &MutableDefaultRule,
    &UnusedImportRule,
];

pub fn analyze(tree: &SourceTree, limits: &AnalysisLimits) -> StyleResult {
    let mut violations: BTreeMap<StyleCategory, Vec<StyleViolation>> = BTreeMap::new();
    for rule in CATALOGUE {
        let found = rule.check(tree, limits);
        if !found.is_empty() {
            violations.entry(rule.category()).or_default().extend(found);
        }
    }

    let total_violations: usize = violations.values().map(Vec::len).sum();
    let deduction: u32 = violations
        .iter()
        .map(|(category, found)| category.penalty() * found.len() as u32)
        .sum();
    let score = 100u32.saturating_sub(deduction);

    let summary = if total_violations > 0 {
        format!(
            "Found {} style violation(s) across {} category/categories.",
            total_violations,
            violations.len()
        )
    } else {
        "No style violations detected. Clean code!".to_string()
    };

    StyleResult {
        score,
        violations,
        total_violations,
        summary,
        parse_error: None,
    }
}

/// Parse and analyze in one step
pub fn analyze_source(source: &str, limits: &AnalysisLimits) -> StyleResult {
    match SourceTree::parse(source) {
        Ok(tree) => analyze(&tree, limits),
        Err(e) => parse_failure(&e),
    }
}

pub fn parse_failure(error: &EvalError) -> StyleResult {
    StyleResult {
        score: 0,
        violations: BTreeMap::new(),
        total_violations: 0,
        summary: format!("Syntax error — style checks skipped: {}", error),
        parse_error: Some(error.to_string()),
    }
}

fn nodes_of_kind<'t>(tree: &'t SourceTree, kinds: &[&str]) -> Vec<Node<'t>> {
    descendants(tree.root())
        .into_iter()
        .filter(|n| kinds.contains(&n.kind()))
        .collect()
}

/// Identifiers bound by an assignment / loop target, in source order
fn target_identifiers(node: Node<'_>) -> Vec<Node<'_>> {
    let mut identifiers = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "identifier" => identifiers.push(current),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern"
            | "parenthesized_expression" | "tuple" | "list" => {
                let mut cursor = current.walk();
                let children: Vec<Node<'_>> = current.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
            _ => {}
        }
    }
    identifiers
}

fn body_statements(def: Node<'_>) -> Vec<Node<'_>> {
    let Some(body) = def.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut cursor = body.walk();
    let statements: Vec<Node<'_>> = body
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    statements
}

struct NamingRule;

impl StyleRule for NamingRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::NamingConvention
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        let mut seen = HashSet::new();
        let mut violations = Vec::new();

        for node in descendants(tree.root()) {
            let (kind, names) = match node.kind() {
                "function_definition" => (
                    "Function",
                    node.child_by_field_name("name").into_iter().collect(),
                ),
                "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => (
                    "Variable",
                    node.child_by_field_name("left")
                        .map(target_identifiers)
                        .unwrap_or_default(),
                ),
                "named_expression" => (
                    "Variable",
                    node.child_by_field_name("name").into_iter().collect(),
                ),
                _ => continue,
            };

            for name_node in names {
                let name = tree.text(name_node);
                if name.starts_with('_') || is_constant_name(name) || SNAKE_CASE.is_match(name) {
                    continue;
                }
                if seen.insert(name.to_string()) {
                    violations.push(self.violation(
                        line_of(name_node),
                        format!(
                            "{} '{}' at line {} should use snake_case (PEP 8).",
                            kind,
                            name,
                            line_of(name_node)
                        ),
                    ));
                }
            }
        }
        violations
    }
}

struct DocstringRule;

impl StyleRule for DocstringRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::MissingDocstring
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        nodes_of_kind(tree, &["function_definition", "class_definition"])
            .into_iter()
            .filter(|def| !has_docstring(*def))
            .map(|def| {
                self.violation(
                    line_of(def),
                    format!(
                        "'{}' at line {} is missing a docstring.",
                        tree.definition_name(def),
                        line_of(def)
                    ),
                )
            })
            .collect()
    }
}

fn has_docstring(def: Node<'_>) -> bool {
    body_statements(def).first().is_some_and(|first| {
        first.kind() == "expression_statement"
            && first
                .named_child(0)
                .is_some_and(|expr| matches!(expr.kind(), "string" | "concatenated_string"))
    })
}

struct MagicNumberRule;

impl StyleRule for MagicNumberRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::MagicNumber
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        let mut violations = Vec::new();
        for literal in nodes_of_kind(tree, &["integer", "float"]) {
            // `-5` is one literal, reported with its sign
            let negated = literal.parent().filter(|p| {
                p.kind() == "unary_operator"
                    && p.child_by_field_name("operator")
                        .is_some_and(|op| tree.text(op) == "-")
            });
            let expr = negated.unwrap_or(literal);

            let Some(value) = numeric_value(tree.text(literal)) else {
                continue;
            };
            let value = if negated.is_some() { -value } else { value };
            if ALLOWED_NUMBERS.contains(&value) || is_constant_definition(tree, expr) {
                continue;
            }

            violations.push(self.violation(
                line_of(expr),
                format!(
                    "Magic number '{}' at line {}. Consider extracting to a named constant.",
                    tree.text(expr),
                    line_of(expr)
                ),
            ));
        }
        violations
    }
}

fn numeric_value(text: &str) -> Option<f64> {
    let text = text.replace('_', "").to_ascii_lowercase();
    let radix = [("0x", 16), ("0o", 8), ("0b", 2)]
        .into_iter()
        .find(|(prefix, _)| text.starts_with(prefix));
    match radix {
        Some((prefix, radix)) => i64::from_str_radix(&text[prefix.len()..], radix)
            .ok()
            .map(|v| v as f64),
        None => text.trim_end_matches('l').parse::<f64>().ok(),
    }
}

/// `LIMIT = 500`: the value bound directly to an ALL_CAPS name
fn is_constant_definition(tree: &SourceTree, expr: Node<'_>) -> bool {
    let Some(parent) = expr.parent() else {
        return false;
    };
    parent.kind() == "assignment"
        && parent.child_by_field_name("right") == Some(expr)
        && parent
            .child_by_field_name("left")
            .is_some_and(|left| left.kind() == "identifier" && is_constant_name(tree.text(left)))
}

struct LineLengthRule;

impl StyleRule for LineLengthRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::LineTooLong
    }

    fn check(&self, tree: &SourceTree, limits: &AnalysisLimits) -> Vec<StyleViolation> {
        tree.source()
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let length = line.trim_end().chars().count();
                (length > limits.max_line_length).then(|| {
                    self.violation(
                        i + 1,
                        format!(
                            "Line {} is {} characters (limit: {}).",
                            i + 1,
                            length,
                            limits.max_line_length
                        ),
                    )
                })
            })
            .collect()
    }
}

/// `except:` with no exception type
fn is_bare_except(handler: Node<'_>) -> bool {
    let mut cursor = handler.walk();
    let named: Vec<Node<'_>> = handler
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    named.len() == 1 && named[0].kind() == "block"
}

/// Handler body is only `pass` or `...`
fn is_empty_handler(handler: Node<'_>) -> bool {
    let mut cursor = handler.walk();
    let block = handler
        .named_children(&mut cursor)
        .find(|n| n.kind() == "block");
    let Some(block) = block else {
        return false;
    };

    let mut block_cursor = block.walk();
    let statements: Vec<Node<'_>> = block
        .named_children(&mut block_cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    match statements.as_slice() {
        [only] if only.kind() == "pass_statement" => true,
        [only] if only.kind() == "expression_statement" => only
            .named_child(0)
            .is_some_and(|expr| expr.kind() == "ellipsis"),
        _ => false,
    }
}

struct EmptyExceptRule;

impl StyleRule for EmptyExceptRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::EmptyExcept
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        nodes_of_kind(tree, &["except_clause", "except_group_clause"])
            .into_iter()
            .filter(|handler| !is_bare_except(*handler) && is_empty_handler(*handler))
            .map(|handler| {
                self.violation(
                    line_of(handler),
                    format!(
                        "`except` at line {} has an empty body (`pass`). Silently swallowing exceptions hides bugs.",
                        line_of(handler)
                    ),
                )
            })
            .collect()
    }
}

struct BareExceptRule;

impl StyleRule for BareExceptRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::BareExcept
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        nodes_of_kind(tree, &["except_clause"])
            .into_iter()
            .filter(|handler| is_bare_except(*handler))
            .map(|handler| {
                self.violation(
                    line_of(handler),
                    format!(
                        "Bare `except:` at line {} catches ALL exceptions including SystemExit and KeyboardInterrupt. Be specific.",
                        line_of(handler)
                    ),
                )
            })
            .collect()
    }
}

struct MutableDefaultRule;

impl StyleRule for MutableDefaultRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::MutableDefault
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        let mut violations = Vec::new();
        for def in nodes_of_kind(tree, &["function_definition"]) {
            let Some(parameters) = def.child_by_field_name("parameters") else {
                continue;
            };
            let mut cursor = parameters.walk();
            let defaults = parameters
                .named_children(&mut cursor)
                .filter(|p| matches!(p.kind(), "default_parameter" | "typed_default_parameter"))
                .filter_map(|p| p.child_by_field_name("value"));

            for value in defaults {
                let Some(description) = mutable_kind(tree, value) else {
                    continue;
                };
                violations.push(self.violation(
                    line_of(def),
                    format!(
                        "'{}' at line {} uses a mutable default argument ({}). Use `None` and initialise inside.",
                        tree.definition_name(def),
                        line_of(def),
                        description
                    ),
                ));
            }
        }
        violations
    }
}

fn mutable_kind(tree: &SourceTree, value: Node<'_>) -> Option<&'static str> {
    match value.kind() {
        "list" | "list_comprehension" => Some("list literal"),
        "dictionary" | "dictionary_comprehension" => Some("dict literal"),
        "set" | "set_comprehension" => Some("set literal"),
        "call" => match tree.call_target(value) {
            Some("list") => Some("list() call"),
            Some("dict") => Some("dict() call"),
            Some("set") => Some("set() call"),
            _ => None,
        },
        _ => None,
    }
}

struct UnusedImportRule;

struct ImportBinding<'t> {
    bound: String,
    imported: String,
    module: Option<String>,
    node: Node<'t>,
}

impl StyleRule for UnusedImportRule {
    fn category(&self) -> StyleCategory {
        StyleCategory::UnusedImport
    }

    fn check(&self, tree: &SourceTree, _limits: &AnalysisLimits) -> Vec<StyleViolation> {
        let mut used = HashSet::new();
        collect_references(tree, &mut used);

        import_bindings(tree)
            .into_iter()
            .filter(|binding| !used.contains(binding.bound.as_str()))
            .map(|binding| {
                let line = line_of(binding.node);
                let message = match &binding.module {
                    Some(module) => format!(
                        "Import '{}' from '{}' at line {} appears unused.",
                        binding.imported, module, line
                    ),
                    None => format!("Import '{}' at line {} appears unused.", binding.imported, line),
                };
                self.violation(line, message)
            })
            .collect()
    }
}

fn import_bindings(tree: &SourceTree) -> Vec<ImportBinding<'_>> {
    let mut bindings = Vec::new();

    for statement in nodes_of_kind(tree, &["import_statement", "import_from_statement"]) {
        let module = if statement.kind() == "import_from_statement" {
            let module = statement
                .child_by_field_name("module_name")
                .map(|m| tree.text(m).to_string());
            if module.as_deref() == Some("__future__") {
                continue;
            }
            module
        } else {
            None
        };

        let mut cursor = statement.walk();
        let names: Vec<Node<'_>> = statement.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (imported, bound) = match name.kind() {
                "aliased_import" => {
                    let imported = name
                        .child_by_field_name("name")
                        .map(|n| tree.text(n))
                        .unwrap_or_default();
                    let alias = name
                        .child_by_field_name("alias")
                        .map(|n| tree.text(n))
                        .unwrap_or(imported);
                    (imported, alias.to_string())
                }
                "dotted_name" => {
                    let imported = tree.text(name);
                    let bound = if module.is_some() {
                        imported.to_string()
                    } else {
                        imported.split('.').next().unwrap_or(imported).to_string()
                    };
                    (imported, bound)
                }
                _ => continue,
            };
            bindings.push(ImportBinding {
                bound,
                imported: imported.to_string(),
                module: module.clone(),
                node: statement,
            });
        }
    }
    bindings
}

/// Identifiers referenced outside import statements (attribute names excluded)
fn collect_references<'t>(tree: &'t SourceTree, used: &mut HashSet<&'t str>) {
    // (node, is the `attribute` field of its parent)
    let mut stack = vec![(tree.root(), false)];
    while let Some((node, is_attribute_name)) = stack.pop() {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => continue,
            "identifier" => {
                if !is_attribute_name {
                    used.insert(tree.text(node));
                }
                continue;
            }
            _ => {}
        }

        let attribute = if node.kind() == "attribute" {
            node.child_by_field_name("attribute")
        } else {
            None
        };
        let mut cursor = node.walk();
        stack.extend(
            node.named_children(&mut cursor)
                .map(|child| (child, Some(child) == attribute)),
        );
    }
}

impl Advise for StyleResult {
    fn recommendations(&self) -> Vec<String> {
        if let Some(error) = &self.parse_error {
            return vec![super::parse_failure_advice(error)];
        }
        let high_impact = HIGH_IMPACT.iter();
        let others = self.violations.keys().filter(|c| !HIGH_IMPACT.contains(*c));
        high_impact
            .chain(others)
            .filter_map(|category| self.violations.get(category)?.first())
            .map(|violation| format!("[Style] {}", violation.message))
            .collect()
    }
}
