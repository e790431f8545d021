//! AudioData - uncompressed audio container
//!
//! Owns the sample bytes it is constructed over. Planar data is stored as
//! one logical buffer with channel `i` starting at `i * frames * bytes`.

use std::sync::Mutex;

use crate::backend::{self, SampleFormat};

use super::error::{invalid_state_error, not_supported_error, range_error, type_error, Result};

/// Audio sample format (WebCodecs identifiers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSampleFormat {
  /// Unsigned 8-bit integer samples, interleaved
  U8,
  /// Signed 16-bit integer samples, interleaved
  S16,
  /// Signed 32-bit integer samples, interleaved
  S32,
  /// 32-bit float samples, interleaved
  F32,
  /// Unsigned 8-bit integer samples, planar
  U8Planar,
  /// Signed 16-bit integer samples, planar
  S16Planar,
  /// Signed 32-bit integer samples, planar
  S32Planar,
  /// 32-bit float samples, planar
  F32Planar,
}

impl AudioSampleFormat {
  /// WebCodecs identifier string
  pub fn as_str(&self) -> &'static str {
    match self {
      AudioSampleFormat::U8 => "u8",
      AudioSampleFormat::S16 => "s16",
      AudioSampleFormat::S32 => "s32",
      AudioSampleFormat::F32 => "f32",
      AudioSampleFormat::U8Planar => "u8-planar",
      AudioSampleFormat::S16Planar => "s16-planar",
      AudioSampleFormat::S32Planar => "s32-planar",
      AudioSampleFormat::F32Planar => "f32-planar",
    }
  }

  /// Map from the backend sample format
  pub fn from_backend(format: SampleFormat) -> Result<Self> {
    match format {
      SampleFormat::U8 => Ok(AudioSampleFormat::U8),
      SampleFormat::S16 => Ok(AudioSampleFormat::S16),
      SampleFormat::S32 => Ok(AudioSampleFormat::S32),
      SampleFormat::Flt => Ok(AudioSampleFormat::F32),
      SampleFormat::U8p => Ok(AudioSampleFormat::U8Planar),
      SampleFormat::S16p => Ok(AudioSampleFormat::S16Planar),
      SampleFormat::S32p => Ok(AudioSampleFormat::S32Planar),
      SampleFormat::Fltp => Ok(AudioSampleFormat::F32Planar),
    }
  }

  /// Map to the backend sample format
  pub fn to_backend(&self) -> SampleFormat {
    match self {
      AudioSampleFormat::U8 => SampleFormat::U8,
      AudioSampleFormat::S16 => SampleFormat::S16,
      AudioSampleFormat::S32 => SampleFormat::S32,
      AudioSampleFormat::F32 => SampleFormat::Flt,
      AudioSampleFormat::U8Planar => SampleFormat::U8p,
      AudioSampleFormat::S16Planar => SampleFormat::S16p,
      AudioSampleFormat::S32Planar => SampleFormat::S32p,
      AudioSampleFormat::F32Planar => SampleFormat::Fltp,
    }
  }

  /// Get bytes per sample
  pub fn bytes_per_sample(&self) -> usize {
    match self {
      AudioSampleFormat::U8 | AudioSampleFormat::U8Planar => 1,
      AudioSampleFormat::S16 | AudioSampleFormat::S16Planar => 2,
      AudioSampleFormat::S32
      | AudioSampleFormat::S32Planar
      | AudioSampleFormat::F32
      | AudioSampleFormat::F32Planar => 4,
    }
  }

  /// Check if this is a planar format
  pub fn is_planar(&self) -> bool {
    matches!(
      self,
      AudioSampleFormat::U8Planar
        | AudioSampleFormat::S16Planar
        | AudioSampleFormat::S32Planar
        | AudioSampleFormat::F32Planar
    )
  }
}

impl std::fmt::Display for AudioSampleFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Init record for constructing an AudioData
///
/// `data` is owned and moves into the container; Rust move semantics stand
/// in for a WebCodecs transfer list.
#[derive(Debug, Clone)]
pub struct AudioDataInit {
  pub format: AudioSampleFormat,
  /// Sample rate in Hz
  pub sample_rate: f64,
  /// Frames (samples per channel)
  pub number_of_frames: u32,
  pub number_of_channels: u32,
  /// Timestamp in microseconds
  pub timestamp: i64,
  /// Raw sample bytes, at least frames * channels * bytes_per_sample long
  pub data: Vec<u8>,
}

/// Options for `allocation_size` / `copy_to`
#[derive(Debug, Clone, Default)]
pub struct AudioDataCopyToOptions {
  /// Index of the plane to copy
  pub plane_index: u32,
  /// Frame offset to start copying from
  pub frame_offset: Option<u32>,
  /// Number of frames to copy, defaults to all remaining
  pub frame_count: Option<u32>,
  /// Destination format; only the source format itself or f32-planar
  pub format: Option<AudioSampleFormat>,
}

struct AudioDataInner {
  format: AudioSampleFormat,
  sample_rate: f64,
  number_of_frames: u32,
  number_of_channels: u32,
  data: Vec<u8>,
}

/// Uncompressed audio, exclusively owning its sample buffer
pub struct AudioData {
  inner: Mutex<Option<AudioDataInner>>,
  // Preserved after close
  timestamp_us: i64,
}

/// Resolved copy plan from the copy-element-count algorithm
struct CopyPlan {
  dest_format: AudioSampleFormat,
  plane_index: usize,
  frame_offset: usize,
  frame_count: usize,
  element_count: usize,
}

impl AudioData {
  /// Construct from an init record
  pub fn new(init: AudioDataInit) -> Result<Self> {
    if !init.sample_rate.is_finite() || init.sample_rate <= 0.0 {
      return Err(type_error("sampleRate must be greater than 0"));
    }
    if init.number_of_frames == 0 {
      return Err(type_error("numberOfFrames must be greater than 0"));
    }
    if init.number_of_channels == 0 {
      return Err(type_error("numberOfChannels must be greater than 0"));
    }

    let needed = init.number_of_frames as usize
      * init.number_of_channels as usize
      * init.format.bytes_per_sample();
    if init.data.len() < needed {
      return Err(type_error(&format!(
        "data buffer too small: need {} bytes, got {}",
        needed,
        init.data.len()
      )));
    }

    Ok(Self {
      inner: Mutex::new(Some(AudioDataInner {
        format: init.format,
        sample_rate: init.sample_rate,
        number_of_frames: init.number_of_frames,
        number_of_channels: init.number_of_channels,
        data: init.data,
      })),
      timestamp_us: init.timestamp,
    })
  }

  /// Wrap a decoded backend frame (decoder output path)
  pub(crate) fn from_backend_frame(frame: &backend::Frame, timestamp_us: i64) -> Result<Self> {
    let backend_format = frame
      .sample_format
      .ok_or_else(|| not_supported_error("backend frame carries no sample format"))?;
    let format = AudioSampleFormat::from_backend(backend_format)?;
    let bps = format.bytes_per_sample();
    let frames = frame.nb_samples as usize;
    let channels = frame.channels as usize;

    // Planar planes are concatenated into one logical buffer, channel i at
    // offset i * nb_samples * bytes.
    let mut data = Vec::with_capacity(frames * channels * bps);
    if format.is_planar() {
      for plane in frame.planes.iter().take(channels) {
        data.extend_from_slice(&plane[..frames * bps]);
      }
    } else if let Some(plane) = frame.planes.first() {
      data.extend_from_slice(&plane[..frames * channels * bps]);
    }

    Ok(Self {
      inner: Mutex::new(Some(AudioDataInner {
        format,
        sample_rate: frame.sample_rate as f64,
        number_of_frames: frame.nb_samples,
        number_of_channels: frame.channels,
        data,
      })),
      timestamp_us,
    })
  }

  /// Build a backend frame over this data (encoder input path).
  ///
  /// The caller assigns the pts in its own time base.
  pub(crate) fn to_backend_frame(&self) -> Result<backend::Frame> {
    let inner = self.lock();
    let inner = inner
      .as_ref()
      .ok_or_else(|| invalid_state_error("AudioData is closed"))?;

    let bps = inner.format.bytes_per_sample();
    let frames = inner.number_of_frames as usize;
    let channels = inner.number_of_channels as usize;
    let planes = if inner.format.is_planar() {
      (0..channels)
        .map(|ch| inner.data[ch * frames * bps..(ch + 1) * frames * bps].to_vec())
        .collect()
    } else {
      vec![inner.data[..frames * channels * bps].to_vec()]
    };

    Ok(backend::Frame {
      planes,
      sample_format: Some(inner.format.to_backend()),
      sample_rate: inner.sample_rate as u32,
      nb_samples: inner.number_of_frames,
      channels: inner.number_of_channels,
      ..backend::Frame::default()
    })
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Option<AudioDataInner>> {
    match self.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  // ========================================================================
  // Properties
  // ========================================================================

  /// Sample format, `None` once closed
  pub fn format(&self) -> Option<AudioSampleFormat> {
    self.lock().as_ref().map(|i| i.format)
  }

  /// Sample rate in Hz, 0 once closed
  pub fn sample_rate(&self) -> f64 {
    self.lock().as_ref().map_or(0.0, |i| i.sample_rate)
  }

  /// Frames per channel, 0 once closed
  pub fn number_of_frames(&self) -> u32 {
    self.lock().as_ref().map_or(0, |i| i.number_of_frames)
  }

  /// Channel count, 0 once closed
  pub fn number_of_channels(&self) -> u32 {
    self.lock().as_ref().map_or(0, |i| i.number_of_channels)
  }

  /// Duration in microseconds, derived from frames and rate
  pub fn duration(&self) -> i64 {
    self.lock().as_ref().map_or(0, |i| {
      (i.number_of_frames as f64 * 1_000_000.0 / i.sample_rate) as i64
    })
  }

  /// Timestamp in microseconds; survives close
  pub fn timestamp(&self) -> i64 {
    self.timestamp_us
  }

  /// Whether the buffer has been detached
  pub fn is_closed(&self) -> bool {
    self.lock().is_none()
  }

  // ========================================================================
  // Methods
  // ========================================================================

  /// Bytes required for `copy_to` with these options
  pub fn allocation_size(&self, options: &AudioDataCopyToOptions) -> Result<usize> {
    let inner = self.lock();
    let inner = inner
      .as_ref()
      .ok_or_else(|| invalid_state_error("AudioData is closed"))?;
    let plan = Self::copy_plan(inner, options)?;
    Ok(plan.element_count * plan.dest_format.bytes_per_sample())
  }

  /// Copy (and possibly convert) samples into `dest`
  pub fn copy_to(&self, dest: &mut [u8], options: &AudioDataCopyToOptions) -> Result<()> {
    let inner = self.lock();
    let inner = inner
      .as_ref()
      .ok_or_else(|| invalid_state_error("AudioData is closed"))?;
    let plan = Self::copy_plan(inner, options)?;

    let needed = plan.element_count * plan.dest_format.bytes_per_sample();
    if dest.len() < needed {
      return Err(range_error(&format!(
        "destination buffer too small: need {} bytes, got {}",
        needed,
        dest.len()
      )));
    }

    if plan.dest_format == inner.format {
      Self::copy_same_format(inner, dest, &plan);
    } else {
      // The only supported conversion target is f32-planar
      Self::convert_to_f32_planar(inner, dest, &plan);
    }
    Ok(())
  }

  /// Compute Copy Element Count
  fn copy_plan(inner: &AudioDataInner, options: &AudioDataCopyToOptions) -> Result<CopyPlan> {
    let dest_format = options.format.unwrap_or(inner.format);

    if dest_format != inner.format && dest_format != AudioSampleFormat::F32Planar {
      return Err(not_supported_error(&format!(
        "conversion from {} to {} is not supported",
        inner.format, dest_format
      )));
    }

    let plane_index = options.plane_index as usize;
    if dest_format.is_planar() {
      if plane_index >= inner.number_of_channels as usize {
        return Err(range_error(&format!(
          "planeIndex {} out of bounds ({} planes)",
          plane_index, inner.number_of_channels
        )));
      }
    } else if plane_index != 0 {
      return Err(range_error("planeIndex must be 0 for interleaved formats"));
    }

    let frame_offset = options.frame_offset.unwrap_or(0);
    if frame_offset >= inner.number_of_frames {
      return Err(range_error(&format!(
        "frameOffset {} out of bounds ({} frames)",
        frame_offset, inner.number_of_frames
      )));
    }

    let available = inner.number_of_frames - frame_offset;
    let frame_count = match options.frame_count {
      // Exact-fit copies are allowed
      Some(count) if count > available => {
        return Err(range_error(&format!(
          "frameCount {} exceeds the {} available frames",
          count, available
        )));
      }
      Some(count) => count,
      None => available,
    };

    let element_count = if dest_format.is_planar() {
      frame_count as usize
    } else {
      frame_count as usize * inner.number_of_channels as usize
    };

    Ok(CopyPlan {
      dest_format,
      plane_index,
      frame_offset: frame_offset as usize,
      frame_count: frame_count as usize,
      element_count,
    })
  }

  fn copy_same_format(inner: &AudioDataInner, dest: &mut [u8], plan: &CopyPlan) {
    let bps = inner.format.bytes_per_sample();
    let channels = inner.number_of_channels as usize;
    let frames = inner.number_of_frames as usize;

    if inner.format.is_planar() {
      let plane_base = plan.plane_index * frames * bps;
      let start = plane_base + plan.frame_offset * bps;
      let len = plan.frame_count * bps;
      dest[..len].copy_from_slice(&inner.data[start..start + len]);
    } else {
      let start = plan.frame_offset * channels * bps;
      let len = plan.frame_count * channels * bps;
      dest[..len].copy_from_slice(&inner.data[start..start + len]);
    }
  }

  /// Linear transform (sample - sub) / div into f32 samples
  fn convert_to_f32_planar(inner: &AudioDataInner, dest: &mut [u8], plan: &CopyPlan) {
    let bps = inner.format.bytes_per_sample();
    let channels = inner.number_of_channels as usize;
    let frames = inner.number_of_frames as usize;

    // Source index of element j of the requested plane: contiguous for
    // planar sources, strided by channel count for interleaved ones.
    let (base, stride) = if inner.format.is_planar() {
      (
        plan.plane_index * frames * bps + plan.frame_offset * bps,
        bps,
      )
    } else {
      (
        (plan.frame_offset * channels + plan.plane_index) * bps,
        channels * bps,
      )
    };

    for j in 0..plan.frame_count {
      let src = base + j * stride;
      let value = match inner.format {
        AudioSampleFormat::U8 | AudioSampleFormat::U8Planar => {
          (inner.data[src] as f32 - 128.0) / 128.0
        }
        AudioSampleFormat::S16 | AudioSampleFormat::S16Planar => {
          let v = i16::from_ne_bytes([inner.data[src], inner.data[src + 1]]);
          v as f32 / 32768.0
        }
        AudioSampleFormat::S32 | AudioSampleFormat::S32Planar => {
          let v = i32::from_ne_bytes([
            inner.data[src],
            inner.data[src + 1],
            inner.data[src + 2],
            inner.data[src + 3],
          ]);
          v as f32 / 2_147_483_648.0
        }
        AudioSampleFormat::F32 | AudioSampleFormat::F32Planar => f32::from_ne_bytes([
          inner.data[src],
          inner.data[src + 1],
          inner.data[src + 2],
          inner.data[src + 3],
        ]),
      };
      dest[j * 4..j * 4 + 4].copy_from_slice(&value.to_ne_bytes());
    }
  }

  /// Create an independent copy of this AudioData
  pub fn try_clone(&self) -> Result<AudioData> {
    let inner = self.lock();
    let inner = inner
      .as_ref()
      .ok_or_else(|| invalid_state_error("AudioData is closed"))?;

    Ok(AudioData {
      inner: Mutex::new(Some(AudioDataInner {
        format: inner.format,
        sample_rate: inner.sample_rate,
        number_of_frames: inner.number_of_frames,
        number_of_channels: inner.number_of_channels,
        data: inner.data.clone(),
      })),
      timestamp_us: self.timestamp_us,
    })
  }

  /// Detach the sample buffer
  pub fn close(&self) {
    *self.lock() = None;
  }
}

impl std::fmt::Debug for AudioData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let guard = self.lock();
    match &*guard {
      Some(inner) => f
        .debug_struct("AudioData")
        .field("format", &inner.format)
        .field("sample_rate", &inner.sample_rate)
        .field("number_of_frames", &inner.number_of_frames)
        .field("number_of_channels", &inner.number_of_channels)
        .field("timestamp", &self.timestamp_us)
        .finish(),
      None => f.debug_struct("AudioData").field("closed", &true).finish(),
    }
  }
}
