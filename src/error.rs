//! Error types for the data-access layer.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the store, the registry and the cache.
///
/// `Clone` because a single in-flight fetch hands the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  #[error("{0} not found")]
  NotFound(String),

  #[error("operation `{0}` is already registered")]
  DuplicateOperation(String),

  #[error("`{operation}` failed: {source}")]
  ExecutorFailure {
    operation: String,
    source: Box<Error>,
  },

  #[error("invalid arguments: {0}")]
  InvalidArguments(String),

  #[error("failed to decode result: {0}")]
  Decode(String),
}

impl Error {
  pub fn not_found(what: impl std::fmt::Display, id: u64) -> Self {
    Error::NotFound(format!("{} #{}", what, id))
  }

  /// Wrap an executor error, leaving already-wrapped failures alone.
  pub fn executor(operation: &str, err: Error) -> Self {
    match err {
      Error::ExecutorFailure { .. } => err,
      other => Error::ExecutorFailure {
        operation: operation.to_string(),
        source: Box::new(other),
      },
    }
  }

  /// The underlying error kind, looking through `ExecutorFailure`.
  pub fn root(&self) -> &Error {
    match self {
      Error::ExecutorFailure { source, .. } => source.root(),
      other => other,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_executor_wraps_once() {
    let err = Error::executor("getTasks", Error::not_found("Tasks", 3));
    let again = Error::executor("other", err.clone());
    assert_eq!(err, again);
    assert_eq!(err.to_string(), "`getTasks` failed: Tasks #3 not found");
  }

  #[test]
  fn test_root_sees_through_wrapper() {
    let err = Error::executor("updateTaskStatus", Error::not_found("Tasks", 9));
    assert!(matches!(err.root(), Error::NotFound(_)));
  }
}
