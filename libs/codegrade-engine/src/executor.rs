/// Evaluator - High-Level Orchestration
///
/// **Responsibility:**
/// Run one submission against one problem and return the full report.
///
/// **Architecture:**
/// 1. Correctness through the sandbox (evaluator.rs + engine.rs)
/// 2. Static analysis on a blocking thread, concurrently with step 1 (analysis/)
/// 3. Weighted aggregation (report.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How code is isolated (engine's job)
/// - How any dimension is scored (analyzers' job)
///
/// Dropping the returned future abandons in-flight test runs; their
/// interpreter processes are killed with it.

use crate::analysis::{self, StaticAnalysis};
use crate::engine::{dedent, SandboxRunner};
use crate::error::{EvalError, EvalResult};
use crate::evaluator;
use crate::report;
use anyhow::Result;
use codegrade_common::config::{AnalysisLimits, EvaluatorConfig};
use codegrade_common::types::{EvaluationReport, ProblemSpec};
use std::time::Instant;
use tracing::{error, info, instrument};

pub struct Evaluator {
    runner: SandboxRunner,
    limits: AnalysisLimits,
}

impl Evaluator {
    pub fn new(runner: SandboxRunner, limits: AnalysisLimits) -> Self {
        Self { runner, limits }
    }

    pub fn from_config(config: &EvaluatorConfig) -> Result<Self> {
        config.validate()?;
        let runner = SandboxRunner::from_config(&config.sandbox)?;
        Ok(Self::new(runner, config.analysis.clone()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.runner.backend_name()
    }

    /// Validate the problem first, then evaluate
    pub async fn evaluate_checked(
        &self,
        code: &str,
        problem: &ProblemSpec,
    ) -> EvalResult<EvaluationReport> {
        problem
            .validate()
            .map_err(|e| EvalError::InvalidProblem(e.to_string()))?;
        Ok(self.evaluate(code, problem).await)
    }

    /// Always completes with a fully structured report
    #[instrument(skip_all, fields(problem_id = %problem.id))]
    pub async fn evaluate(&self, code: &str, problem: &ProblemSpec) -> EvaluationReport {
        let start = Instant::now();
        let source = dedent(code);

        let static_source = source.clone();
        let limits = self.limits.clone();
        let static_task = tokio::task::spawn_blocking(move || {
            analysis::analyze_all(&static_source, &limits)
        });

        let (correctness, static_result) = tokio::join!(
            evaluator::evaluate(&source, problem, &self.runner),
            static_task
        );

        let StaticAnalysis {
            complexity,
            style,
            security,
        } = match static_result {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(error = %e, "Static analysis task failed; analysing inline");
                analysis::analyze_all(&source, &self.limits)
            }
        };

        let mut report = report::aggregate(correctness, complexity, style, security, problem);
        report.code_length = source.lines().count();

        info!(
            evaluation_id = %report.evaluation_id,
            overall_score = report.overall_score,
            grade = %report.grade,
            execution_ms = start.elapsed().as_millis() as u64,
            "Evaluation complete"
        );
        report
    }
}
