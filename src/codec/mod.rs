//! Safe wrappers for backend codec operations
//!
//! This module pairs backend handles with the pool lease that produced
//! them, ensuring instances return to the pool when a context is dropped,
//! and provides the send-all/drain conveniences the codecs run on.

pub mod context;
pub mod graph;
pub mod scaler;

pub use context::{DecoderContext, EncoderContext};
pub use graph::AudioGraph;
pub use scaler::Scaler;

use crate::backend::{BackendError, Fraction, PixelFormat, SampleFormat};

/// Decoder configuration resolved from a WebCodecs config
#[derive(Debug, Clone)]
pub struct DecoderConfig {
  /// Backend codec name
  pub codec: String,
  /// Audio sample rate, 0 for video
  pub sample_rate: u32,
  /// Audio channel count, 0 for video
  pub channels: u32,
  /// Out-of-band side data (extradata)
  pub extradata: Option<Vec<u8>>,
  /// Coded size hint, 0 when unknown
  pub coded_width: u32,
  pub coded_height: u32,
  /// Favor low-delay output
  pub low_delay: bool,
}

/// Audio encoder configuration resolved from a WebCodecs config
#[derive(Debug, Clone)]
pub struct AudioEncoderSettings {
  pub codec: String,
  pub sample_rate: u32,
  pub channels: u32,
  pub bitrate: u64,
  /// Sample format the backend codec prefers on input
  pub sample_format: SampleFormat,
  /// Codec-private options
  pub options: Vec<(String, String)>,
}

/// Video encoder configuration resolved from a WebCodecs config
#[derive(Debug, Clone)]
pub struct VideoEncoderSettings {
  pub codec: String,
  pub width: u32,
  pub height: u32,
  pub pixel_format: PixelFormat,
  pub bitrate: u64,
  pub framerate: Option<f64>,
  pub sample_aspect: Option<Fraction>,
  pub options: Vec<(String, String)>,
}

/// Codec wrapper error type
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
  #[error("backend error: {0}")]
  Backend(#[from] BackendError),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("invalid state: {0}")]
  InvalidState(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
