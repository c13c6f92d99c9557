//! Fetch errors surfaced to query consumers.

use thiserror::Error;

/// How a fetch failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
  /// Network or server-side failure, worth retrying
  Transient,
  /// The backend refused the request (permissions, bad request)
  Permanent,
  /// The payload could not be converted to or from the query type
  Decode,
}

/// Error produced by a query fetcher.
///
/// Cloneable so that one in-flight request can hand the same failure to
/// every consumer that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
  kind: FetchErrorKind,
  message: String,
}

impl FetchError {
  pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn transient(message: impl Into<String>) -> Self {
    Self::new(FetchErrorKind::Transient, message)
  }

  pub fn permanent(message: impl Into<String>) -> Self {
    Self::new(FetchErrorKind::Permanent, message)
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::new(FetchErrorKind::Decode, message)
  }

  pub fn kind(&self) -> FetchErrorKind {
    self.kind
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  /// Only transient failures are retried automatically.
  pub fn is_retryable(&self) -> bool {
    self.kind == FetchErrorKind::Transient
  }
}
