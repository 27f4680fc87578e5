/// Report Aggregator - Weighted Grade and Recommendations
///
/// **Overall score:**
/// round(0.50 * correctness + 0.20 * complexity + 0.15 * style + 0.15 * security)
///
/// **Grade bands (contiguous over 0..=100):**
/// A >= 90, B >= 80, C >= 70, D >= 60, F otherwise
///
/// **Recommendations:**
/// Each dimension below 100 contributes its own advice, in priority order
/// correctness -> security -> complexity -> style; duplicates dropped, at most 8.

use codegrade_common::types::{
    ComplexityResult, CorrectnessResult, DimensionResult, Dimensions, EvaluationReport,
    ProblemSpec, ScoreWeights, SecurityResult, StyleResult, TestStatus,
};
use std::collections::HashSet;
use uuid::Uuid;

pub const MAX_RECOMMENDATIONS: usize = 8;

const GRADE_BANDS: &[(u32, &str, &str)] = &[
    (90, "A", "Excellent — production-ready quality."),
    (80, "B", "Good — minor improvements suggested."),
    (70, "C", "Acceptable — several areas need attention."),
    (60, "D", "Below average — significant issues present."),
    (0, "F", "Failing — fundamental problems detected."),
];

/// A dimension that can explain its own shortfall.
pub trait Advise: DimensionResult {
    fn recommendations(&self) -> Vec<String>;
}

impl Advise for CorrectnessResult {
    fn recommendations(&self) -> Vec<String> {
        let failing = self.total - self.passed;
        if failing == 0 {
            return Vec::new();
        }

        let mut advice = vec![format!(
            "Fix {} failing test case(s). Start with visible failures before tackling hidden edge cases.",
            failing
        )];
        let timeouts = self
            .test_results
            .iter()
            .filter(|r| r.status == TestStatus::TimeLimitExceeded)
            .count();
        if timeouts > 0 {
            advice.push(format!(
                "{} test case(s) exceeded the time limit. Look for infinite loops or a more efficient algorithm.",
                timeouts
            ));
        }
        let errors = self
            .test_results
            .iter()
            .filter(|r| r.status == TestStatus::RuntimeError)
            .count();
        if errors > 0 {
            advice.push(format!(
                "{} test case(s) raised an error. Check edge cases such as empty input and invalid indices.",
                errors
            ));
        }
        advice
    }
}

/// Weighted overall score, rounded half away from zero
pub fn overall_score(
    correctness: u32,
    complexity: u32,
    style: u32,
    security: u32,
    weights: &ScoreWeights,
) -> u32 {
    let weighted = f64::from(correctness) * weights.correctness
        + f64::from(complexity) * weights.complexity
        + f64::from(style) * weights.style
        + f64::from(security) * weights.security;
    weighted.round().clamp(0.0, 100.0) as u32
}

/// Letter grade and label for a 0-100 score
pub fn grade(score: u32) -> (&'static str, &'static str) {
    GRADE_BANDS
        .iter()
        .find(|(threshold, _, _)| score >= *threshold)
        .map(|(_, letter, label)| (*letter, *label))
        .unwrap_or(("F", "Failing — fundamental problems detected."))
}

fn advice_of(dimension: &dyn Advise) -> Vec<String> {
    if dimension.score() >= 100 {
        Vec::new()
    } else {
        dimension.recommendations()
    }
}

/// Flattened, de-duplicated advice in dimension priority order
pub fn recommendations(dimensions: &[&dyn Advise]) -> Vec<String> {
    let mut seen = HashSet::new();
    dimensions
        .iter()
        .flat_map(|d| advice_of(*d))
        .filter(|r| seen.insert(r.clone()))
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

pub fn aggregate(
    correctness: CorrectnessResult,
    complexity: ComplexityResult,
    style: StyleResult,
    security: SecurityResult,
    problem: &ProblemSpec,
) -> EvaluationReport {
    let weights = ScoreWeights::STANDARD;
    let overall = overall_score(
        correctness.score,
        complexity.score,
        style.score,
        security.score,
        &weights,
    );
    let (letter, label) = grade(overall);
    let by_priority: [&dyn Advise; 4] = [&correctness, &security, &complexity, &style];
    let recommendations = recommendations(&by_priority);

    EvaluationReport {
        evaluation_id: Uuid::new_v4(),
        evaluated_at: chrono::Utc::now(),
        problem_id: problem.id.clone(),
        problem_title: problem.title.clone(),
        difficulty: problem.difficulty.clone(),
        code_length: 0,
        overall_score: overall,
        grade: letter.to_string(),
        grade_label: label.to_string(),
        score_weights: weights,
        dimensions: Dimensions {
            correctness,
            complexity,
            style,
            security,
        },
        recommendations,
    }
}
