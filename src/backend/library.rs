//! The foreign codec-library interface
//!
//! The polyfill consumes these traits; the embedding provides the
//! implementation (installed through `backend::pool`). Send/receive follow
//! the library convention: `send_*` returns `Ok(false)` when the context
//! wants its output drained first, `receive_*` returns `Ok(None)` when more
//! input is needed or the stream has ended.

use super::error::BackendResult;
use super::frame::Frame;
use super::packet::Packet;
use super::types::{Fraction, PixelFormat, Rational, SampleFormat};

/// Parameters for opening a decoder
#[derive(Debug, Clone)]
pub struct DecoderSetup {
  /// Backend codec name (e.g. "libopus", "libvpx-vp9")
  pub codec: String,
  /// Time base timestamps are exchanged in
  pub time_base: Rational,
  /// Audio sample rate, 0 for video
  pub sample_rate: u32,
  /// Audio channel count, 0 for video
  pub channels: u32,
  /// Out-of-band codec side data (stream info, setup packets)
  pub extradata: Option<Vec<u8>>,
  /// Coded size hint, 0 when unknown
  pub coded_width: u32,
  pub coded_height: u32,
  /// Favor low-delay output over throughput
  pub low_delay: bool,
}

/// Parameters for opening an encoder
#[derive(Debug, Clone)]
pub struct EncoderSetup {
  /// Backend codec name
  pub codec: String,
  pub time_base: Rational,
  pub bitrate: u64,
  // Audio
  pub sample_rate: u32,
  pub channels: u32,
  pub sample_format: Option<SampleFormat>,
  // Video
  pub width: u32,
  pub height: u32,
  pub pixel_format: Option<PixelFormat>,
  pub framerate: Option<f64>,
  pub sample_aspect: Option<Fraction>,
  /// Codec-private options as key/value strings
  pub options: Vec<(String, String)>,
}

/// One side of an audio filter conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamSpec {
  pub sample_format: SampleFormat,
  pub channels: u32,
  pub sample_rate: u32,
}

/// Parameters for an `aresample` filter graph
#[derive(Debug, Clone)]
pub struct AudioFilterSpec {
  pub input: AudioStreamSpec,
  pub output: AudioStreamSpec,
  /// Fixed output frame size in samples, 0 for unconstrained
  pub frame_size: u32,
}

/// One side of a rescale conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureSpec {
  pub width: u32,
  pub height: u32,
  pub pixel_format: PixelFormat,
}

/// Parameters for a rescaler context
#[derive(Debug, Clone)]
pub struct ScalerSpec {
  pub input: PictureSpec,
  pub output: PictureSpec,
}

/// An opened decoder instance
pub trait DecoderHandle: Send {
  /// Submit a packet, or `None` to signal end of stream (drain)
  fn send_packet(&mut self, packet: Option<&Packet>) -> BackendResult<bool>;
  /// Fetch the next decoded frame if one is ready
  fn receive_frame(&mut self) -> BackendResult<Option<Frame>>;
}

/// An opened encoder instance
pub trait EncoderHandle: Send {
  /// Required input frame size in samples, 0 for unconstrained (video, PCM)
  fn frame_size(&self) -> u32;
  /// Negotiated input sample format for audio encoders
  fn sample_format(&self) -> Option<SampleFormat>;
  /// Out-of-band side data the encoder emits for decoder initialization
  fn extradata(&self) -> Option<Vec<u8>>;
  /// Submit a frame, or `None` to signal end of stream (drain)
  fn send_frame(&mut self, frame: Option<&Frame>) -> BackendResult<bool>;
  /// Fetch the next encoded packet if one is ready
  fn receive_packet(&mut self) -> BackendResult<Option<Packet>>;
}

/// An opened audio resample/reformat filter graph
pub trait AudioFilterHandle: Send {
  /// Push one frame through, returning zero or more converted frames
  fn push(&mut self, frame: &Frame) -> BackendResult<Vec<Frame>>;
  /// Flush buffered samples; the final frame may be shorter than frame_size
  fn drain(&mut self) -> BackendResult<Vec<Frame>>;
}

/// An opened rescaler context
pub trait ScalerHandle: Send {
  /// Convert one frame to the output geometry and pixel format
  fn scale(&mut self, src: &Frame) -> BackendResult<Frame>;
}

/// The codec library itself
///
/// A probe is an open followed by an immediate drop; implementations keep
/// open cheap enough for that to be reasonable.
pub trait CodecLibrary: Send + Sync {
  fn open_decoder(&self, setup: &DecoderSetup) -> BackendResult<Box<dyn DecoderHandle>>;
  fn open_encoder(&self, setup: &EncoderSetup) -> BackendResult<Box<dyn EncoderHandle>>;
  fn open_audio_filter(&self, spec: &AudioFilterSpec) -> BackendResult<Box<dyn AudioFilterHandle>>;
  fn open_scaler(&self, spec: &ScalerSpec) -> BackendResult<Box<dyn ScalerHandle>>;
}
