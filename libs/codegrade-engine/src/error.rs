//! Classified failures of a single evaluation unit.

use std::time::Duration;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Every variant is contained at the smallest unit (one test case, one
/// analyzer); none of them aborts a whole evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Syntax error: {message} (line {line})")]
    Parse { message: String, line: usize },

    #[error("Exceeded {}s time limit", .0.as_secs())]
    SandboxTimeout(Duration),

    #[error("{0}")]
    SandboxRuntimeFailure(String),

    #[error("Could not read the result produced by the submission: {0}")]
    MalformedOutcome(String),

    #[error("Sandbox unavailable: {0}")]
    Sandbox(String),

    #[error("Invalid problem specification: {0}")]
    InvalidProblem(String),
}

impl EvalError {
    pub fn parse_line(&self) -> Option<usize> {
        match self {
            EvalError::Parse { line, .. } => Some(*line),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_classified() {
        let timeout = EvalError::SandboxTimeout(Duration::from_secs(5));
        assert_eq!(timeout.to_string(), "Exceeded 5s time limit");

        let parse = EvalError::Parse {
            message: "invalid syntax".to_string(),
            line: 3,
        };
        assert_eq!(parse.to_string(), "Syntax error: invalid syntax (line 3)");
        assert_eq!(parse.parse_line(), Some(3));
        assert_eq!(timeout.parse_line(), None);
    }
}
