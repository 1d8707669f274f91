//! Failure classification.
//!
//! # Responsibilities
//! - Turn the outcome of one handler invocation into a [`Verdict`]
//! - Recognize transient storage conflicts through a pluggable predicate
//! - Emit exactly one log event per failed invocation
//!
//! # Outcomes
//! ```text
//! Ok(value)                          → Success        (no log)
//! Failure, predicate says transient  → Retry          (WARN + backtrace)
//! Failure with explicit status       → Terminal(code) (WARN + backtrace)
//! anything else, including panics    → Terminal(500)  (ERROR + backtrace)
//! ```

use std::sync::Arc;

use axum::http::StatusCode;

use crate::dispatch::failure::Failure;
use crate::dispatch::panic::Caught;

/// SQLSTATE for a serialization failure.
pub const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE for a lock that could not be acquired (resource busy).
pub const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Decides whether an unclassified handler error is a transient conflict
/// raised by the data store, meaning the invocation can be re-run from
/// scratch.
pub trait TransientPredicate: Send + Sync + 'static {
    fn is_transient(&self, error: &anyhow::Error) -> bool;
}

impl<F> TransientPredicate for F
where
    F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
{
    fn is_transient(&self, error: &anyhow::Error) -> bool {
        self(error)
    }
}

/// A storage error identified by its SQLSTATE code.
///
/// Storage collaborators convert driver errors into this type (or attach it
/// as context) so the dispatcher can recognize conflicts without depending
/// on a particular driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage error {code}: {message}")]
pub struct SqlStateError {
    pub code: String,
    pub message: String,
}

impl SqlStateError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Treats a [`SqlStateError`] anywhere in the error chain as transient when
/// its code is in the configured set.
#[derive(Debug, Clone)]
pub struct SqlStatePredicate {
    codes: Vec<String>,
}

impl SqlStatePredicate {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SqlStatePredicate {
    fn default() -> Self {
        Self::new([SERIALIZATION_FAILURE, LOCK_NOT_AVAILABLE])
    }
}

impl TransientPredicate for SqlStatePredicate {
    fn is_transient(&self, error: &anyhow::Error) -> bool {
        error
            .chain()
            .filter_map(|cause| cause.downcast_ref::<SqlStateError>())
            .any(|e| self.codes.iter().any(|code| *code == e.code))
    }
}

/// What the dispatcher should do after an invocation.
#[derive(Debug)]
pub enum Verdict<T> {
    /// The handler produced a value.
    Success(T),
    /// Transient conflict; nothing was written, the handler may run again.
    Retry,
    /// Respond with this status and stop.
    Terminal(StatusCode),
}

/// Maps handler outcomes to verdicts.
#[derive(Clone)]
pub struct Classifier {
    predicate: Arc<dyn TransientPredicate>,
}

impl Classifier {
    pub fn new(predicate: impl TransientPredicate) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Classify one invocation. Logs exactly once unless the invocation
    /// succeeded.
    pub fn classify<T>(&self, path: &str, caught: Caught<T>) -> Verdict<T> {
        match caught {
            Ok(Ok(value)) => Verdict::Success(value),
            Ok(Err(failure)) => self.classify_failure(path, failure),
            Err(panic) => {
                tracing::error!(
                    path = %path,
                    panic = %panic.message(),
                    backtrace = ?panic.backtrace(),
                    "Handler panicked"
                );
                Verdict::Terminal(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn classify_failure<T>(&self, path: &str, failure: Failure) -> Verdict<T> {
        match failure.status() {
            Some(status) => {
                tracing::warn!(
                    path = %path,
                    status = status.as_u16(),
                    error = %failure,
                    backtrace = ?failure.backtrace(),
                    "Handler failed with explicit status"
                );
                Verdict::Terminal(status)
            }
            None if self.predicate.is_transient(failure.error()) => {
                tracing::warn!(
                    path = %path,
                    error = %failure,
                    backtrace = ?failure.backtrace(),
                    "Transient storage conflict"
                );
                Verdict::Retry
            }
            None => {
                tracing::error!(
                    path = %path,
                    error = %failure,
                    backtrace = ?failure.backtrace(),
                    "Handler failed"
                );
                Verdict::Terminal(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(SqlStatePredicate::default())
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}
