pub mod analysis;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod matcher;
pub mod report;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{EvalError, EvalResult};
pub use executor::Evaluator;
