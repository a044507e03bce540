//! Error Classification
//!
//! Every component error maps onto one of these classes. The HTTP layer
//! picks status codes from the class and the variant.

use serde::Serialize;

/// Coarse error taxonomy shared by all components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed or missing fields. Caller's fault, never retried.
    Validation,
    /// State forbids the request. Caller must re-decide.
    Conflict,
    /// Referenced player does not exist.
    NotFound,
    /// Lost a compare-and-swap race. Safe to retry once with fresh state.
    Concurrency,
    /// Store unreachable or corrupt.
    Persistence,
}

impl ErrorClass {
    /// Whether the whole operation may be retried unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Concurrency)
    }
}
