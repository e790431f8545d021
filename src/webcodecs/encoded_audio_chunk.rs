//! EncodedAudioChunk and the audio codec configuration records

use super::error::{range_error, Result};

/// Chunk type: sync point or dependent frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedAudioChunkType {
  Key,
  Delta,
}

/// Init record for constructing an EncodedAudioChunk
///
/// `data` is owned and moves into the chunk.
#[derive(Debug, Clone)]
pub struct EncodedAudioChunkInit {
  pub chunk_type: EncodedAudioChunkType,
  /// Timestamp in microseconds
  pub timestamp: i64,
  /// Duration in microseconds
  pub duration: Option<i64>,
  pub data: Vec<u8>,
}

/// One compressed audio chunk; payload is immutable after construction
#[derive(Debug, Clone)]
pub struct EncodedAudioChunk {
  chunk_type: EncodedAudioChunkType,
  timestamp_us: i64,
  duration_us: Option<i64>,
  data: Vec<u8>,
}

impl EncodedAudioChunk {
  pub fn new(init: EncodedAudioChunkInit) -> Self {
    Self {
      chunk_type: init.chunk_type,
      timestamp_us: init.timestamp,
      duration_us: init.duration,
      data: init.data,
    }
  }

  pub fn chunk_type(&self) -> EncodedAudioChunkType {
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

/// AudioDecoder configuration
#[derive(Debug, Clone)]
pub struct AudioDecoderConfig {
  /// Codec identifier, e.g. "opus", "vorbis", "flac"
  pub codec: String,
  pub sample_rate: u32,
  pub number_of_channels: u32,
  /// Out-of-band side data required by some codecs (stream info, setup
  /// packets)
  pub description: Option<Vec<u8>>,
}

/// Opus-specific encoder knobs, passed through as codec-private options
#[derive(Debug, Clone, Default)]
pub struct OpusEncoderConfig {
  /// Frame duration in microseconds
  pub frame_duration: Option<u64>,
  /// Expected packet loss percentage (0-100)
  pub packetlossperc: Option<u32>,
  pub useinbandfec: Option<bool>,
  /// Bitstream format ("opus" or "ogg")
  pub format: Option<String>,
}

/// FLAC-specific encoder knobs
#[derive(Debug, Clone, Default)]
pub struct FlacEncoderConfig {
  pub block_size: Option<u32>,
}

/// AudioEncoder configuration
#[derive(Debug, Clone)]
pub struct AudioEncoderConfig {
  pub codec: String,
  pub sample_rate: Option<u32>,
  pub number_of_channels: Option<u32>,
  /// Target bitrate in bits per second
  pub bitrate: Option<u64>,
  pub opus: Option<OpusEncoderConfig>,
  pub flac: Option<FlacEncoderConfig>,
}

/// Result of `AudioDecoder::is_config_supported`
#[derive(Debug, Clone)]
pub struct AudioDecoderSupport {
  pub supported: bool,
  /// Normalized echo of the queried configuration
  pub config: AudioDecoderConfig,
}

/// Result of `AudioEncoder::is_config_supported`
#[derive(Debug, Clone)]
pub struct AudioEncoderSupport {
  pub supported: bool,
  pub config: AudioEncoderConfig,
}
