//! Handler failures.
//!
//! A [`Failure`] aborts the current handler invocation. It either carries an
//! explicit HTTP status ("fail with this code") or is unclassified, in which
//! case the classifier decides whether it is a transient storage conflict or
//! a generic server fault.
//!
//! Any error convertible into [`anyhow::Error`] converts into an
//! unclassified failure, so handlers can use `?` on storage calls directly.

use std::backtrace::Backtrace;
use std::fmt;

use axum::http::StatusCode;

/// Early-exit signal returned by handlers.
pub struct Failure {
    status: Option<StatusCode>,
    error: anyhow::Error,
    backtrace: Backtrace,
}

impl Failure {
    /// Fail the request with the given HTTP status.
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status: Some(status),
            error: error.into(),
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Fail the request with 403 Forbidden.
    pub fn forbidden(error: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, error)
    }

    /// Fail the request with 400 Bad Request.
    pub fn bad_request(error: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, error)
    }

    /// A failure without an explicit status.
    pub fn unclassified(error: impl Into<anyhow::Error>) -> Self {
        Self {
            status: None,
            error: error.into(),
            backtrace: Backtrace::force_capture(),
        }
    }

    /// The explicit status, if the handler declared one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The underlying error.
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// Where the failure was raised.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn into_error(self) -> anyhow::Error {
        self.error
    }
}

impl<E> From<E> for Failure
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        Self::unclassified(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {:#}", status.as_u16(), self.error),
            None => write!(f, "{:#}", self.error),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("status", &self.status)
            .field("error", &self.error)
            .finish()
    }
}

/// Attach an HTTP status to the error side of a `Result`.
pub trait OrStatus<T> {
    /// Convert an error into a failure with the given status.
    fn or_status(self, status: StatusCode) -> Result<T, Failure>;

    fn or_bad_request(self) -> Result<T, Failure>
    where
        Self: Sized,
    {
        self.or_status(StatusCode::BAD_REQUEST)
    }

    fn or_forbidden(self) -> Result<T, Failure>
    where
        Self: Sized,
    {
        self.or_status(StatusCode::FORBIDDEN)
    }
}

impl<T, E> OrStatus<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn or_status(self, status: StatusCode) -> Result<T, Failure> {
        self.map_err(|e| Failure::with_status(status, e))
    }
}
