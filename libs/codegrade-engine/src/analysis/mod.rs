//! Tree-based static analysis of submissions.
//!
//! The source is parsed once into a [`SourceTree`]; the complexity, style and
//! security analyzers all read that same immutable tree.

pub mod complexity;
pub mod security;
pub mod style;

use crate::error::{EvalError, EvalResult};
use codegrade_common::config::AnalysisLimits;
use codegrade_common::types::{ComplexityResult, SecurityResult, StyleResult};
use serde::Serialize;
use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser, Tree};

/// Parsed submission plus the exact text it was parsed from.
pub struct SourceTree {
    source: String,
    tree: Tree,
}

impl SourceTree {
    pub fn parse(source: &str) -> EvalResult<Self> {
        let mut parser = Parser::new();
        let language: Language = tree_sitter_python::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|e| EvalError::Parse {
                message: format!("grammar could not be loaded ({})", e),
                line: 0,
            })?;

        let tree = parser.parse(source, None).ok_or_else(|| EvalError::Parse {
            message: "parser produced no tree".to_string(),
            line: 0,
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let line = descendants(root)
                .into_iter()
                .find(|n| n.is_error() || n.is_missing())
                .map(line_of)
                .unwrap_or(1);
            return Err(EvalError::Parse {
                message: "invalid syntax".to_string(),
                line,
            });
        }

        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Module-level functions and methods of module-level classes.
    /// Methods are named `Class.method`.
    pub fn top_level_functions(&self) -> Vec<(String, Node<'_>)> {
        let mut functions = Vec::new();
        let root = self.root();
        let mut cursor = root.walk();

        for child in root.named_children(&mut cursor) {
            match unwrap_decorated(child) {
                Some(def) if def.kind() == "function_definition" => {
                    functions.push((self.definition_name(def).to_string(), def));
                }
                Some(def) if def.kind() == "class_definition" => {
                    let class_name = self.definition_name(def);
                    let Some(body) = def.child_by_field_name("body") else {
                        continue;
                    };
                    let mut body_cursor = body.walk();
                    for member in body.named_children(&mut body_cursor) {
                        if let Some(method) = unwrap_decorated(member)
                            .filter(|m| m.kind() == "function_definition")
                        {
                            let name = format!("{}.{}", class_name, self.definition_name(method));
                            functions.push((name, method));
                        }
                    }
                }
                _ => {}
            }
        }
        functions
    }

    pub fn definition_name(&self, def: Node<'_>) -> &str {
        def.child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or("<anonymous>")
    }

    /// Name of the called function: `foo` for `foo()`, `os.system` for `os.system()`
    pub fn call_target(&self, call: Node<'_>) -> Option<&str> {
        call.child_by_field_name("function").map(|f| self.text(f))
    }

    /// Last segment of the call target (`sort` for `nums.sort()`)
    pub fn call_short_name(&self, call: Node<'_>) -> Option<&str> {
        let function = call.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(self.text(function)),
            "attribute" => function
                .child_by_field_name("attribute")
                .map(|attr| self.text(attr)),
            _ => None,
        }
    }

    /// Value node of keyword argument `name` in a call
    pub fn keyword_argument<'t>(&self, call: Node<'t>, name: &str) -> Option<Node<'t>> {
        let arguments = call.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        let found = arguments
            .named_children(&mut cursor)
            .filter(|arg| arg.kind() == "keyword_argument")
            .find(|arg| {
                arg.child_by_field_name("name")
                    .is_some_and(|n| self.text(n) == name)
            })
            .and_then(|arg| arg.child_by_field_name("value"));
        found
    }
}

fn unwrap_decorated(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")
    } else {
        Some(node)
    }
}

/// 1-based line of the node start
pub fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Every node under `node` (inclusive), in source order
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        nodes.push(current);
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    nodes
}

/// `MAX_SIZE`, `API_URL`: at least one uppercase letter and no lowercase
pub fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase()) && !name.chars().any(|c| c.is_ascii_lowercase())
}

/// Shared by all tree-based dimensions so the report lists it once
pub fn parse_failure_advice(error: &str) -> String {
    format!("Fix the syntax error so the code can be analysed: {}", error)
}

/// The three tree-based dimension results for one submission
#[derive(Debug, Clone, Serialize)]
pub struct StaticAnalysis {
    pub complexity: ComplexityResult,
    pub style: StyleResult,
    pub security: SecurityResult,
}

/// Parse once and run every tree-based analyzer against the same tree.
///
/// A parse failure yields a zero score with the reason in each dimension.
pub fn analyze_all(source: &str, limits: &AnalysisLimits) -> StaticAnalysis {
    match SourceTree::parse(source) {
        Ok(tree) => {
            debug!(bytes = source.len(), "Source parsed");
            StaticAnalysis {
                complexity: complexity::analyze(&tree, limits),
                style: style::analyze(&tree, limits),
                security: security::analyze(&tree),
            }
        }
        Err(e) => {
            warn!(error = %e, "Submission does not parse; static dimensions score 0");
            StaticAnalysis {
                complexity: complexity::parse_failure(&e),
                style: style::parse_failure(&e),
                security: security::parse_failure(&e),
            }
        }
    }
}
