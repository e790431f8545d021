//! EncodedVideoChunk and the video codec configuration records

use super::error::{range_error, Result};

/// Chunk type: sync point or dependent frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedVideoChunkType {
  Key,
  Delta,
}

/// Init record for constructing an EncodedVideoChunk
#[derive(Debug, Clone)]
pub struct EncodedVideoChunkInit {
  pub chunk_type: EncodedVideoChunkType,
  /// Timestamp in microseconds
  pub timestamp: i64,
  /// Duration in microseconds
  pub duration: Option<i64>,
  pub data: Vec<u8>,
}

/// One compressed video chunk; payload is immutable after construction
#[derive(Debug, Clone)]
pub struct EncodedVideoChunk {
  chunk_type: EncodedVideoChunkType,
  timestamp_us: i64,
  duration_us: Option<i64>,
  data: Vec<u8>,
}

impl EncodedVideoChunk {
  pub fn new(init: EncodedVideoChunkInit) -> Self {
    Self {
      chunk_type: init.chunk_type,
      timestamp_us: init.timestamp,
      duration_us: init.duration,
      data: init.data,
    }
  }

  pub fn chunk_type(&self) -> EncodedVideoChunkType {
    self.chunk_type
  }

  /// Timestamp in microseconds
  pub fn timestamp(&self) -> i64 {
    self.timestamp_us
  }

  /// Duration in microseconds
  pub fn duration(&self) -> Option<i64> {
    self.duration_us
  }

  pub fn byte_length(&self) -> usize {
    self.data.len()
  }

  /// Copy the payload into `dest`
  pub fn copy_to(&self, dest: &mut [u8]) -> Result<()> {
    if dest.len() < self.data.len() {
      return Err(range_error(&format!(
        "destination buffer too small: need {} bytes, got {}",
        self.data.len(),
        dest.len()
      )));
    }
    dest[..self.data.len()].copy_from_slice(&self.data);
    Ok(())
  }

  pub(crate) fn payload(&self) -> &[u8] {
    &self.data
  }
}

/// VideoDecoder configuration
#[derive(Debug, Clone)]
pub struct VideoDecoderConfig {
  /// Codec identifier, possibly with dot-separated sub-parameters
  /// ("vp8", "vp09.00.10.08", "av01.0.04M.08")
  pub codec: String,
  pub coded_width: Option<u32>,
  pub coded_height: Option<u32>,
  pub display_aspect_width: Option<u32>,
  pub display_aspect_height: Option<u32>,
  /// Accepted and ignored; color-space conversion is not performed
  pub color_space: Option<VideoColorSpaceInit>,
  pub optimize_for_latency: Option<bool>,
  pub description: Option<Vec<u8>>,
}

/// Color-space hints; carried through configs but never acted upon
#[derive(Debug, Clone, Default)]
pub struct VideoColorSpaceInit {
  pub primaries: Option<String>,
  pub transfer: Option<String>,
  pub matrix: Option<String>,
  pub full_range: Option<bool>,
}

/// Latency/quality trade-off for video encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoLatencyMode {
  #[default]
  Quality,
  /// Sets the backend's realtime usage hints
  Realtime,
}

/// VideoEncoder configuration
#[derive(Debug, Clone)]
pub struct VideoEncoderConfig {
  pub codec: String,
  pub width: u32,
  pub height: u32,
  pub display_width: Option<u32>,
  pub display_height: Option<u32>,
  /// Target bitrate in bits per second
  pub bitrate: Option<u64>,
  pub framerate: Option<f64>,
  pub latency_mode: Option<VideoLatencyMode>,
}

/// Result of `VideoDecoder::is_config_supported`
#[derive(Debug, Clone)]
pub struct VideoDecoderSupport {
  pub supported: bool,
  /// Normalized echo of the queried configuration
  pub config: VideoDecoderConfig,
}

/// Result of `VideoEncoder::is_config_supported`
#[derive(Debug, Clone)]
pub struct VideoEncoderSupport {
  pub supported: bool,
  pub config: VideoEncoderConfig,
}
