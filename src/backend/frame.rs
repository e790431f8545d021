//! Raw frame exchange record
//!
//! A `Frame` is what the library hands back from decoders and filters and
//! what encoders consume: owned per-plane byte buffers plus the metadata
//! both sides negotiate in. Timestamps are in the owning context's time
//! base.

use super::types::{Crop, Fraction, PixelFormat, SampleFormat};

/// One uncompressed audio or video frame
#[derive(Debug, Clone, Default)]
pub struct Frame {
  /// Per-plane bytes. Audio planar: one buffer per channel; audio
  /// interleaved: a single buffer. Video: one buffer per format plane.
  pub planes: Vec<Vec<u8>>,
  /// Video row strides per plane, in bytes
  pub strides: Vec<usize>,

  // Video
  pub width: u32,
  pub height: u32,
  pub pixel_format: Option<PixelFormat>,
  pub key_frame: bool,
  pub sample_aspect: Option<Fraction>,
  pub crop: Option<Crop>,

  // Audio
  pub sample_format: Option<SampleFormat>,
  pub sample_rate: u32,
  pub nb_samples: u32,
  pub channels: u32,

  /// Presentation timestamp in the owning context's time base
  pub pts: i64,
  /// Duration in the same time base, 0 when unknown
  pub duration: i64,
}

impl Frame {
  /// Allocate a zero-filled video frame with tight-packed planes
  pub fn new_video(width: u32, height: u32, format: PixelFormat) -> Self {
    let planes = (0..format.plane_count())
      .map(|i| vec![0u8; format.row_bytes(i, width) * format.plane_rows(i, height)])
      .collect();
    let strides = (0..format.plane_count())
      .map(|i| format.row_bytes(i, width))
      .collect();
    Self {
      planes,
      strides,
      width,
      height,
      pixel_format: Some(format),
      ..Self::default()
    }
  }

  /// Allocate a zero-filled audio frame
  pub fn new_audio(nb_samples: u32, channels: u32, sample_rate: u32, format: SampleFormat) -> Self {
    let bps = format.bytes_per_sample();
    let planes = if format.is_planar() {
      (0..channels)
        .map(|_| vec![0u8; nb_samples as usize * bps])
        .collect()
    } else {
      vec![vec![0u8; nb_samples as usize * channels as usize * bps]]
    };
    Self {
      planes,
      sample_format: Some(format),
      sample_rate,
      nb_samples,
      channels,
      ..Self::default()
    }
  }

  pub fn is_audio(&self) -> bool {
    self.sample_format.is_some()
  }

  pub fn is_video(&self) -> bool {
    self.pixel_format.is_some()
  }
}
