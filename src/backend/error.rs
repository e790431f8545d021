//! Backend error channel
//!
//! Every library primitive reports through this one error type. Probe
//! failures are mapped to "not supported" by the callers, never surfaced
//! as panics.

/// Error raised by a codec-library primitive
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  #[error("codec not found: {0}")]
  CodecNotFound(String),

  #[error("failed to allocate {0}")]
  AllocationFailed(&'static str),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("operation failed: {0}")]
  Failed(String),

  #[error("input rejected, drain output first")]
  TryAgain,

  #[error("end of stream")]
  Eof,
}

pub type BackendResult<T> = Result<T, BackendError>;
