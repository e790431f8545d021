//! VideoEncoder - WebCodecs codec state machine
//!
//! Inputs matching the configured geometry and pixel format go straight to
//! the backend encoder; anything else passes through a rescaler keyed by
//! the input parameters. Non-square pixels are carried as a sample aspect
//! ratio on every submitted frame.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::{self, Fraction, PictureSpec, Rational};
use crate::codec::{CodecError, EncoderContext, Scaler, VideoEncoderSettings};

use super::audio_decoder::{DequeueCallback, ErrorCallback};
use super::codec_string::parse_video_codec_string;
use super::control::{flush_channel, CodecSignals, CodecState, ControlQueue, FlushHandle};
use super::error::{
  abort_error, encoding_error, invalid_state_error, not_supported_error, type_error, Result,
};
use super::{
  EncodedVideoChunk, EncodedVideoChunkInit, EncodedVideoChunkType, VideoEncoderConfig,
  VideoEncoderSupport, VideoFrame, VideoLatencyMode,
};

/// Decoder configuration attached to the first emitted chunk
#[derive(Debug, Clone)]
pub struct VideoDecoderConfigOutput {
  pub codec: String,
  /// The encoder's out-of-band side data, once emitted
  pub description: Option<Vec<u8>>,
}

/// Metadata accompanying the first chunk of a configuration epoch
#[derive(Debug, Clone)]
pub struct EncodedVideoChunkMetadata {
  pub decoder_config: Option<VideoDecoderConfigOutput>,
}

/// Per-call encode options
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoEncoderEncodeOptions {
  /// Force this frame to be encoded as a key frame
  pub key_frame: bool,
}

/// Callback receiving encoded chunks; metadata accompanies the first one
pub type EncodedVideoChunkOutput =
  Box<dyn FnMut(EncodedVideoChunk, Option<EncodedVideoChunkMetadata>) + Send>;

/// VideoEncoder init record: the two required callbacks
pub struct VideoEncoderInit {
  pub output: EncodedVideoChunkOutput,
  pub error: ErrorCallback,
}

struct Shared {
  context: Option<EncoderContext>,
  scaler: Option<Scaler>,
  library: Option<backend::LibraryLease>,
  /// Configured output geometry and pixel format
  sws_out: Option<PictureSpec>,
  /// Non-square-pixel aspect, absent for square pixels
  sample_aspect: Option<Fraction>,
  header: Option<VideoDecoderConfigOutput>,
  metadata_sent: bool,
  output: EncodedVideoChunkOutput,
  error: ErrorCallback,
  dequeue: Option<DequeueCallback>,
  error_fired: bool,
  signals: Arc<CodecSignals>,
}

impl Shared {
  fn fail(&mut self, err: super::Error) {
    self.scaler = None;
    self.context = None;
    self.library = None;
    self.signals.state.set(CodecState::Closed);
    if !self.error_fired {
      self.error_fired = true;
      warn!(error = %err, "video encoder closed on error");
      (self.error)(err);
    }
  }

  fn finish_step(&mut self) {
    self.signals.decrement_queue();
    if let Some(callback) = self.dequeue.as_mut() {
      callback();
    }
  }

  /// Encode one frame, rescaling when it differs from the configured output
  fn process_input(
    &mut self,
    mut frame: backend::Frame,
  ) -> std::result::Result<Vec<backend::Packet>, CodecError> {
    let sws_out = self
      .sws_out
      .ok_or_else(|| CodecError::InvalidState("encoder output spec missing".into()))?;
    if let Some(sample_aspect) = self.sample_aspect {
      frame.sample_aspect = Some(sample_aspect);
    }

    let matches_out = frame.width == sws_out.width
      && frame.height == sws_out.height
      && frame.pixel_format == Some(sws_out.pixel_format);

    let submitted = if matches_out {
      // The rescaler caches exactly one input key; a direct hit tears it down
      self.scaler = None;
      frame
    } else {
      let rebuild = !self
        .scaler
        .as_ref()
        .is_some_and(|scaler| scaler.matches_input(&frame));
      if rebuild {
        let input = PictureSpec {
          width: frame.width,
          height: frame.height,
          pixel_format: frame
            .pixel_format
            .ok_or_else(|| CodecError::InvalidConfig("input frame has no pixel format".into()))?,
        };
        let library = self
          .library
          .as_ref()
          .ok_or_else(|| CodecError::InvalidState("library lease missing".into()))?;
        self.scaler = Some(Scaler::open(&**library, input, sws_out)?);
      }
      match self.scaler.as_mut() {
        Some(scaler) => scaler.scale(&frame)?,
        None => frame,
      }
    };

    let context = self
      .context
      .as_mut()
      .ok_or_else(|| CodecError::InvalidState("encoder context missing".into()))?;
    context.encode(Some(&submitted))
  }

  /// Wrap packets as chunks; the first carries the decoder-config metadata
  fn deliver(&mut self, packets: Vec<backend::Packet>) {
    for packet in packets {
      let metadata = if self.metadata_sent {
        None
      } else {
        self.metadata_sent = true;
        let description = self.context.as_ref().and_then(|c| c.extradata());
        if let Some(header) = self.header.as_mut() {
          header.description = description;
        }
        Some(EncodedVideoChunkMetadata {
          decoder_config: self.header.clone(),
        })
      };

      let chunk = EncodedVideoChunk::new(EncodedVideoChunkInit {
        chunk_type: if packet.key {
          EncodedVideoChunkType::Key
        } else {
          EncodedVideoChunkType::Delta
        },
        timestamp: Rational::MILLIS.ticks_to_us(packet.pts),
        duration: (packet.duration > 0).then(|| Rational::MILLIS.ticks_to_us(packet.duration)),
        data: packet.data,
      });
      (self.output)(chunk, metadata);
    }
  }
}

/// WebCodecs-style video encoder
pub struct VideoEncoder {
  shared: Arc<Mutex<Shared>>,
  queue: ControlQueue<Shared>,
  signals: Arc<CodecSignals>,
}

impl VideoEncoder {
  pub fn new(init: VideoEncoderInit) -> Self {
    let signals = CodecSignals::new();
    let shared = Arc::new(Mutex::new(Shared {
      context: None,
      scaler: None,
      library: None,
      sws_out: None,
      sample_aspect: None,
      header: None,
      metadata_sent: false,
      output: init.output,
      error: init.error,
      dequeue: None,
      error_fired: false,
      signals: signals.clone(),
    }));
    let queue = ControlQueue::spawn(shared.clone());
    Self {
      shared,
      queue,
      signals,
    }
  }

  pub fn state(&self) -> CodecState {
    self.signals.state.get()
  }

  /// Number of pending encode steps
  pub fn encode_queue_size(&self) -> u32 {
    self.signals.queue_size()
  }

  /// Install or clear the dequeue event callback
  pub fn set_ondequeue(&self, callback: Option<DequeueCallback>) {
    if let Ok(mut shared) = self.shared.lock() {
      shared.dequeue = callback;
    }
  }

  /// Non-square pixels: sar = (displayWidth * height, displayHeight * width)
  fn resolve_sample_aspect(config: &VideoEncoderConfig) -> Result<Option<Fraction>> {
    match (config.display_width, config.display_height) {
      (Some(dw), Some(dh)) => {
        if dw == 0 || dh == 0 {
          return Err(type_error("displayWidth and displayHeight must be nonzero"));
        }
        let num = dw as u64 * config.height as u64;
        let den = dh as u64 * config.width as u64;
        Ok((num != den).then_some(Fraction::new(num, den)))
      }
      (None, None) => Ok(None),
      _ => Err(type_error(
        "displayWidth and displayHeight must be given together",
      )),
    }
  }

  fn resolve_settings(config: &VideoEncoderConfig) -> Result<Option<VideoEncoderSettings>> {
    if config.width == 0 || config.height == 0 {
      return Err(type_error("width and height must be nonzero"));
    }
    let parsed = match parse_video_codec_string(&config.codec)? {
      Some(parsed) => parsed,
      None => return Ok(None),
    };
    let sample_aspect = Self::resolve_sample_aspect(config)?;

    let mut options = parsed.options();
    if config.latency_mode == Some(VideoLatencyMode::Realtime) {
      // Backend quality/usage hints for realtime operation
      options.push(("deadline".to_string(), "realtime".to_string()));
      options.push(("cpu-used".to_string(), "8".to_string()));
    }

    Ok(Some(VideoEncoderSettings {
      codec: parsed.backend.to_string(),
      width: config.width,
      height: config.height,
      pixel_format: parsed.pixel_format(),
      bitrate: config.bitrate.unwrap_or(0),
      framerate: config.framerate,
      sample_aspect,
      options,
    }))
  }

  /// Configure the encoder; enqueues the backend init
  pub fn configure(&self, config: &VideoEncoderConfig) -> Result<()> {
    if self.signals.state.get() == CodecState::Closed {
      return Err(invalid_state_error("encoder is closed"));
    }
    let settings = Self::resolve_settings(config)?;

    self.signals.state.set(CodecState::Configured);
    let epoch = self.signals.epoch();
    debug!(codec = %config.codec, width = config.width, height = config.height, "video encoder configure");

    match settings {
      None => {
        let codec = config.codec.clone();
        self.queue.enqueue(move |shared| {
          if shared.signals.epoch() != epoch {
            return;
          }
          shared.fail(not_supported_error(&format!(
            "unsupported video codec: {}",
            codec
          )));
        });
      }
      Some(settings) => {
        let header = VideoDecoderConfigOutput {
          codec: config.codec.clone(),
          description: None,
        };
        self.queue.enqueue(move |shared| {
          if shared.signals.epoch() != epoch {
            return;
          }
          shared.scaler = None;
          shared.context = None;
          shared.library = None;
          let lease = match backend::acquire() {
            Some(lease) => lease,
            None => {
              shared.fail(not_supported_error("no codec library installed"));
              return;
            }
          };
          match EncoderContext::open_video(&*lease, &settings) {
            Ok(context) => {
              shared.sws_out = Some(PictureSpec {
                width: settings.width,
                height: settings.height,
                pixel_format: settings.pixel_format,
              });
              shared.sample_aspect = settings.sample_aspect;
              shared.context = Some(context);
              shared.library = Some(lease);
              shared.header = Some(header);
              shared.metadata_sent = false;
            }
            Err(err) => shared.fail(not_supported_error(&err.to_string())),
          }
        });
      }
    }
    Ok(())
  }

  /// Encode one VideoFrame; the input is cloned on entry
  pub fn encode(&self, frame: &VideoFrame, options: &VideoEncoderEncodeOptions) -> Result<()> {
    if self.signals.state.get() != CodecState::Configured {
      return Err(invalid_state_error("encoder is not configured"));
    }
    if frame.is_closed() {
      return Err(type_error("cannot encode a closed VideoFrame"));
    }
    let clone = frame.try_clone()?;
    let key_frame = options.key_frame;

    self.signals.increment_queue();
    let epoch = self.signals.epoch();

    self.queue.enqueue(move |shared| {
      if shared.signals.epoch() != epoch || shared.error_fired || shared.context.is_none() {
        shared.finish_step();
        return;
      }

      let frame = match clone.to_backend_frame() {
        Ok(mut frame) => {
          frame.pts = Rational::MILLIS.ticks_from_us(clone.timestamp());
          frame.duration = clone
            .duration()
            .map(|d| Rational::MILLIS.ticks_from_us(d))
            .unwrap_or(0);
          frame.key_frame = key_frame;
          frame
        }
        Err(err) => {
          shared.finish_step();
          shared.fail(err);
          return;
        }
      };
      shared.finish_step();

      match shared.process_input(frame) {
        Ok(packets) => shared.deliver(packets),
        Err(err) => shared.fail(encoding_error(&err.to_string())),
      }
    });
    Ok(())
  }

  /// Drain the encoder, emitting residual chunks
  pub fn flush(&self) -> Result<FlushHandle> {
    if self.signals.state.get() != CodecState::Configured {
      return Err(invalid_state_error("encoder is not configured"));
    }
    let (resolver, handle) = flush_channel();
    let epoch = self.signals.epoch();

    self.queue.enqueue(move |shared| {
      if shared.signals.epoch() != epoch || shared.error_fired {
        let _ = resolver.send(Err(abort_error("flush aborted")));
        return;
      }
      let result = match shared.context.as_mut() {
        Some(context) => context.flush(),
        None => {
          let _ = resolver.send(Err(invalid_state_error("encoder has no backend context")));
          return;
        }
      };
      match result {
        Ok(packets) => {
          shared.deliver(packets);
          let _ = resolver.send(Ok(()));
        }
        Err(err) => {
          let error = encoding_error(&err.to_string());
          shared.fail(error.clone());
          let _ = resolver.send(Err(error));
        }
      }
    });
    Ok(handle)
  }

  /// Return to Unconfigured, abandoning queued work
  pub fn reset(&self) -> Result<()> {
    if self.signals.state.get() == CodecState::Closed {
      return Err(invalid_state_error("encoder is closed"));
    }
    self.signals.state.set(CodecState::Unconfigured);
    self.signals.bump_epoch();
    debug!("video encoder reset");
    self.queue.enqueue(|shared| {
      shared.scaler = None;
      shared.context = None;
      shared.library = None;
    });
    Ok(())
  }

  /// Terminal close; idempotent, reports no error
  pub fn close(&self) {
    self.signals.state.set(CodecState::Closed);
    self.signals.bump_epoch();
    debug!("video encoder close");
    self.queue.enqueue(|shared| {
      shared.scaler = None;
      shared.context = None;
      shared.library = None;
    });
  }

  /// Probe whether a configuration is supported (init + free)
  pub fn is_config_supported(config: &VideoEncoderConfig) -> Result<VideoEncoderSupport> {
    let supported = match Self::resolve_settings(config)? {
      None => false,
      Some(settings) => match backend::acquire() {
        None => false,
        Some(lease) => EncoderContext::open_video(&*lease, &settings).is_ok(),
      },
    };
    Ok(VideoEncoderSupport {
      supported,
      config: config.clone(),
    })
  }
}

impl std::fmt::Debug for VideoEncoder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VideoEncoder")
      .field("state", &self.state())
      .field("encode_queue_size", &self.encode_queue_size())
      .finish()
  }
}
