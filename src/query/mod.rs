//! Validation and execution of SQL against the configured table.

pub mod executor;
pub mod guard;

pub use executor::{clamp_max_results, execute, DEFAULT_MAX_RESULTS, MAX_RESULTS_LIMIT};
pub use guard::{validate, FORBIDDEN_KEYWORDS};
