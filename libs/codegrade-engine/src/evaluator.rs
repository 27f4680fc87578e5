/// Correctness Evaluator - Weighted Test Scoring
///
/// **Core Responsibility:**
/// Run every test case of a problem through the sandbox and turn the
/// outcomes into a weighted 0-100 score.
///
/// **Critical Properties:**
/// - Knows nothing about HOW code is isolated (see `engine`)
/// - One independent sandbox run per test case; a crash never leaks across cases
/// - Cases run concurrently up to `max_parallel`, results keep declaration order
///
/// **Scoring Rules:**
/// - score = round(100 * passed weight / total weight)
/// - `passed` / `total` are plain case counts
/// - A problem without test cases scores 0
///
/// **Secrecy:**
/// Hidden cases report label, status and weight only.

use crate::engine::SandboxRunner;
use crate::matcher;
use codegrade_common::types::{
    CorrectnessResult, ExecutionOutcome, ProblemSpec, TestCase, TestCaseResult, TestStatus,
};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, instrument};

/// Classify one sandbox outcome against its test case
pub fn evaluate_test(
    outcome: ExecutionOutcome,
    test_case: &TestCase,
    execution_time_ms: u64,
) -> TestCaseResult {
    let (status, actual, error) = match outcome {
        ExecutionOutcome::Success(value) => {
            let status = if matcher::matches(&test_case.expected, &value, test_case.ordered) {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            (status, Some(value), None)
        }
        ExecutionOutcome::RuntimeFailure(message) => (TestStatus::RuntimeError, None, Some(message)),
        ExecutionOutcome::Timeout => (
            TestStatus::TimeLimitExceeded,
            None,
            Some("Execution timed out".to_string()),
        ),
    };

    if test_case.hidden {
        return TestCaseResult {
            label: test_case.label.clone(),
            status,
            hidden: true,
            weight: test_case.weight,
            expected: None,
            actual: None,
            error: None,
            execution_time_ms,
        };
    }

    TestCaseResult {
        label: test_case.label.clone(),
        status,
        hidden: false,
        weight: test_case.weight,
        expected: Some(test_case.expected.clone()),
        actual,
        error,
        execution_time_ms,
    }
}

/// Fold per-case results into the weighted dimension result
pub fn aggregate_results(test_results: Vec<TestCaseResult>) -> CorrectnessResult {
    let total_weight: f64 = test_results.iter().map(|r| r.weight).sum();
    let earned_weight: f64 = test_results
        .iter()
        .filter(|r| r.status.is_pass())
        .map(|r| r.weight)
        .sum();
    let passed = test_results.iter().filter(|r| r.status.is_pass()).count();

    let score = if total_weight > 0.0 {
        (100.0 * earned_weight / total_weight).round().clamp(0.0, 100.0) as u32
    } else {
        0
    };

    CorrectnessResult {
        score,
        passed,
        total: test_results.len(),
        earned_weight,
        total_weight,
        test_results,
    }
}

/// Run all visible then hidden cases of `problem` against `submission`
#[instrument(skip_all, fields(problem_id = %problem.id))]
pub async fn evaluate(
    submission: &str,
    problem: &ProblemSpec,
    runner: &SandboxRunner,
) -> CorrectnessResult {
    let cases = problem.all_test_cases();
    let timeout = runner.timeout();
    info!(
        cases = cases.len(),
        max_parallel = runner.max_parallel(),
        backend = runner.backend_name(),
        "Running test cases"
    );

    // `buffered` yields in input order, so results line up with declaration order
    let test_results: Vec<TestCaseResult> = stream::iter(0..cases.len())
        .map(|index| {
            let case = &cases[index];
            async move {
                let (outcome, execution_ms) = runner
                    .run_timed(submission, &problem.preamble, &case.invocation, timeout)
                    .await;
                let result = evaluate_test(outcome, case, execution_ms);
                debug!(
                    test = %case.label,
                    hidden = case.hidden,
                    status = ?result.status,
                    execution_ms,
                    "Test case finished"
                );
                result
            }
        })
        .buffered(runner.max_parallel())
        .collect()
        .await;

    let result = aggregate_results(test_results);
    info!(
        score = result.score,
        passed = result.passed,
        total = result.total,
        "Correctness evaluated"
    );
    result
}
