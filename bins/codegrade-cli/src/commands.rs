// CLI commands for running evaluations locally
use anyhow::{Context, Result, bail};
use codegrade_common::config::EvaluatorConfig;
use codegrade_common::problems::{ProblemRegistry, DEFAULT_PROBLEMS_DIR};
use codegrade_engine::analysis;
use codegrade_engine::engine::dedent;
use codegrade_engine::Evaluator;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const SAMPLE_PROBLEM: &str = include_str!("../../../problems/problem_001.json");

/// Explicit `--config` must exist; otherwise the usual startup lookup applies
fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig> {
    match path {
        Some(path) => {
            let mut config = EvaluatorConfig::load(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config.validate()?;
            Ok(config)
        }
        None => EvaluatorConfig::load_from_env(),
    }
}

fn read_submission(path: &Path) -> Result<String> {
    let code = fs::read_to_string(path)
        .with_context(|| format!("Failed to read submission {}", path.display()))?;
    if code.trim().is_empty() {
        bail!("Submission {} is empty", path.display());
    }
    Ok(code)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}

/// Evaluate one submission against one problem file
pub async fn evaluate(
    problem_path: &Path,
    code_path: &Path,
    config_path: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let problem = ProblemRegistry::load_file(problem_path)?;
    let code = read_submission(code_path)?;

    let evaluator = Evaluator::from_config(&config)?;
    tracing::info!(
        problem_id = %problem.id,
        backend = evaluator.backend_name(),
        "Evaluating submission"
    );

    let report = evaluator
        .evaluate_checked(&code, &problem)
        .await
        .context("Evaluation rejected")?;

    print_json(&report, pretty)
}

/// Complexity, style and security only; the submission is never executed
pub fn analyze(code_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let code = read_submission(code_path)?;

    let result = analysis::analyze_all(&dedent(&code), &config.analysis);
    print_json(&result, true)
}

fn problems_dir(dir: Option<&Path>) -> PathBuf {
    dir.map(Path::to_path_buf)
        .or_else(|| std::env::var("PROBLEMS_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROBLEMS_DIR))
}

/// List problems in a directory
pub fn list_problems(dir: Option<&Path>) -> Result<()> {
    let dir = problems_dir(dir);
    let registry = ProblemRegistry::load_dir(&dir)?;

    if registry.is_empty() {
        println!("No problems found in {}", dir.display());
        return Ok(());
    }

    println!("📚 Problems in {}:\n", dir.display());
    println!(
        "{:<8} {:<32} {:<10} {:>8} {:>8}",
        "ID", "TITLE", "LEVEL", "VISIBLE", "HIDDEN"
    );
    for summary in registry.summaries() {
        println!(
            "{:<8} {:<32} {:<10} {:>8} {:>8}",
            summary.id, summary.title, summary.difficulty, summary.visible_tests, summary.hidden_tests
        );
    }

    Ok(())
}

/// Initialize a new evaluator workspace
pub fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing evaluator workspace at: {}", path);

    let project_path = Path::new(path);

    for dir in ["config", "problems"] {
        fs::create_dir_all(project_path.join(dir))
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    let config_path = project_path.join("config/evaluator.json");
    if config_path.exists() {
        println!("  ⏭️  Kept existing: config/evaluator.json");
    } else {
        let json_content = serde_json::to_string_pretty(&EvaluatorConfig::default())?;
        fs::write(&config_path, json_content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("  ✅ Created: config/evaluator.json");
    }

    let sample_path = project_path.join("problems/problem_001.json");
    if !sample_path.exists() {
        fs::write(&sample_path, SAMPLE_PROBLEM)
            .with_context(|| format!("Failed to write {}", sample_path.display()))?;
        println!("  ✅ Created: problems/problem_001.json");
    }

    println!("✅ Workspace initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Add problems as problems/problem_<id>.json");
    println!("  2. Evaluate: codegrade evaluate --problem problems/problem_001.json --code solution.py");

    Ok(())
}
