//! DOMException-style error type
//!
//! WebCodecs classifies failures by DOMException name. The same closed set
//! is kept here so callers can match on the class; helper constructors
//! mirror the places the names are produced.

/// WebCodecs error, tagged with its DOMException-style name
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
  /// Malformed argument or invariant violation
  #[error("TypeError: {0}")]
  Type(String),

  /// Operation against a closed or wrong-state object
  #[error("InvalidStateError: {0}")]
  InvalidState(String),

  /// Plane index, frame offset or destination size out of range
  #[error("RangeError: {0}")]
  Range(String),

  /// Codec probe failed or configuration outside coverage
  #[error("NotSupportedError: {0}")]
  NotSupported(String),

  /// The backend reported an encode/decode failure
  #[error("EncodingError: {0}")]
  Encoding(String),

  /// Produced by reset/close; suppressed from the error callback
  #[error("AbortError: {0}")]
  Abort(String),
}

impl Error {
  /// DOMException-style name for this error class
  pub fn name(&self) -> &'static str {
    match self {
      Error::Type(_) => "TypeError",
      Error::InvalidState(_) => "InvalidStateError",
      Error::Range(_) => "RangeError",
      Error::NotSupported(_) => "NotSupportedError",
      Error::Encoding(_) => "EncodingError",
      Error::Abort(_) => "AbortError",
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn type_error(message: &str) -> Error {
  Error::Type(message.to_string())
}

pub fn invalid_state_error(message: &str) -> Error {
  Error::InvalidState(message.to_string())
}

pub fn range_error(message: &str) -> Error {
  Error::Range(message.to_string())
}

pub fn not_supported_error(message: &str) -> Error {
  Error::NotSupported(message.to_string())
}

pub fn encoding_error(message: &str) -> Error {
  Error::Encoding(message.to_string())
}

pub fn abort_error(message: &str) -> Error {
  Error::Abort(message.to_string())
}
