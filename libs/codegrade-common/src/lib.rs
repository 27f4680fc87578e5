pub mod config;
pub mod problems;
pub mod types;
