//! Shared error taxonomy.
//!
//! Every component defines its own `thiserror` error enum, but each variant
//! maps onto exactly one of the nine kinds below via [`HasErrorKind`]. Code
//! that crosses component boundaries (the scheduler, integration tests)
//! matches on [`ErrorKind`] rather than on a specific component's variants.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Closed set of error categories. Never add a variant without updating the
/// adapter-facing transport mapping this is meant to feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Precondition,
    /// Would violate a data-model invariant. Never retried, never caught by
    /// a component — it bubbles to the outer process.
    Invariant,
    Insufficient,
    Timeout,
    Backpressure,
    Internal,
}

/// Implemented by every component error enum so call sites can classify an
/// error without matching component-specific variants.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}

/// Structured detail payload attached to an error for field-level reporting.
pub fn details(fields: &[(&str, Value)]) -> Value {
    Value::Object(fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

/// Crate-level error for code spanning multiple components (the scheduler,
/// integration glue). Wraps the originating error's message and kind rather
/// than the concrete component type, so it stays a flat, cheap-to-match enum.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl HasErrorKind for CoreError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Lift any component error into a [`CoreError`]. Not a blanket `From` impl
/// on purpose: `CoreError` itself satisfies `HasErrorKind + Display`, which
/// would conflict with the standard library's reflexive `From<T> for T`.
pub fn lift<E>(e: E) -> CoreError
where
    E: HasErrorKind + std::fmt::Display,
{
    CoreError::new(e.kind(), e.to_string())
}

pub type CoreResult<T> = Result<T, CoreError>;
