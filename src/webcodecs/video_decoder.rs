//! VideoDecoder - WebCodecs codec state machine
//!
//! Decodes EncodedVideoChunk payloads into VideoFrames through the backend
//! library, at the fixed 1/1000 time base.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::{self, Packet, Rational};
use crate::codec::{DecoderConfig, DecoderContext};

use super::audio_decoder::{DequeueCallback, ErrorCallback};
use super::codec_string::parse_video_codec_string;
use super::control::{flush_channel, CodecSignals, CodecState, ControlQueue, FlushHandle};
use super::error::{abort_error, encoding_error, invalid_state_error, not_supported_error, Result};
use super::{EncodedVideoChunk, VideoDecoderConfig, VideoDecoderSupport, VideoFrame};

/// Callback receiving each decoded VideoFrame
pub type VideoFrameOutput = Box<dyn FnMut(VideoFrame) + Send>;

/// VideoDecoder init record: the two required callbacks
pub struct VideoDecoderInit {
  pub output: VideoFrameOutput,
  pub error: ErrorCallback,
}

struct Shared {
  context: Option<DecoderContext>,
  library: Option<backend::LibraryLease>,
  /// Display aspect override from the configuration
  display_aspect: Option<backend::Fraction>,
  output: VideoFrameOutput,
  error: ErrorCallback,
  dequeue: Option<DequeueCallback>,
  error_fired: bool,
  signals: Arc<CodecSignals>,
}

impl Shared {
  fn fail(&mut self, err: super::Error) {
    self.context = None;
    self.library = None;
    self.signals.state.set(CodecState::Closed);
    if !self.error_fired {
      self.error_fired = true;
      warn!(error = %err, "video decoder closed on error");
      (self.error)(err);
    }
  }

  fn finish_step(&mut self) {
    self.signals.decrement_queue();
    if let Some(callback) = self.dequeue.as_mut() {
      callback();
    }
  }

  fn deliver(&mut self, frames: Vec<backend::Frame>) {
    for frame in frames {
      let timestamp = Rational::MILLIS.ticks_to_us(frame.pts);
      match VideoFrame::from_backend_frame(&frame, timestamp, self.display_aspect) {
        Ok(video_frame) => (self.output)(video_frame),
        Err(err) => {
          self.fail(err);
          return;
        }
      }
    }
  }
}

/// WebCodecs-style video decoder
pub struct VideoDecoder {
  shared: Arc<Mutex<Shared>>,
  queue: ControlQueue<Shared>,
  signals: Arc<CodecSignals>,
}

impl VideoDecoder {
  pub fn new(init: VideoDecoderInit) -> Self {
    let signals = CodecSignals::new();
    let shared = Arc::new(Mutex::new(Shared {
      context: None,
      library: None,
      display_aspect: None,
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

  /// Number of pending decode steps
  pub fn decode_queue_size(&self) -> u32 {
    self.signals.queue_size()
  }

  /// Install or clear the dequeue event callback
  pub fn set_ondequeue(&self, callback: Option<DequeueCallback>) {
    if let Ok(mut shared) = self.shared.lock() {
      shared.dequeue = callback;
    }
  }

  /// Configure the decoder; enqueues the backend init
  pub fn configure(&self, config: &VideoDecoderConfig) -> Result<()> {
    if self.signals.state.get() == CodecState::Closed {
      return Err(invalid_state_error("decoder is closed"));
    }
    let parsed = parse_video_codec_string(&config.codec)?;

    self.signals.state.set(CodecState::Configured);
    let epoch = self.signals.epoch();
    debug!(codec = %config.codec, "video decoder configure");

    match parsed {
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
      Some(parsed) => {
        let decoder_config = DecoderConfig {
          codec: parsed.backend.to_string(),
          sample_rate: 0,
          channels: 0,
          extradata: config.description.clone(),
          coded_width: config.coded_width.unwrap_or(0),
          coded_height: config.coded_height.unwrap_or(0),
          low_delay: config.optimize_for_latency.unwrap_or(false),
        };
        let display_aspect = match (config.display_aspect_width, config.display_aspect_height) {
          (Some(w), Some(h)) if w > 0 && h > 0 => {
            Some(backend::Fraction::new(w as u64, h as u64))
          }
          _ => None,
        };
        self.queue.enqueue(move |shared| {
          if shared.signals.epoch() != epoch {
            return;
          }
          shared.context = None;
          shared.library = None;
          let lease = match backend::acquire() {
            Some(lease) => lease,
            None => {
              shared.fail(not_supported_error("no codec library installed"));
              return;
            }
          };
          match DecoderContext::open(&*lease, &decoder_config) {
            Ok(context) => {
              shared.context = Some(context);
              shared.library = Some(lease);
              shared.display_aspect = display_aspect;
            }
            Err(err) => shared.fail(not_supported_error(&err.to_string())),
          }
        });
      }
    }
    Ok(())
  }

  /// Decode one chunk; increments the queue counter synchronously
  pub fn decode(&self, chunk: &EncodedVideoChunk) -> Result<()> {
    if self.signals.state.get() != CodecState::Configured {
      return Err(invalid_state_error("decoder is not configured"));
    }

    self.signals.increment_queue();
    let data = chunk.payload().to_vec();
    let pts = Rational::MILLIS.ticks_from_us(chunk.timestamp());
    let duration = chunk
      .duration()
      .map(|d| Rational::MILLIS.ticks_from_us(d))
      .unwrap_or(0);
    let key = chunk.chunk_type() == super::EncodedVideoChunkType::Key;
    let epoch = self.signals.epoch();

    self.queue.enqueue(move |shared| {
      if shared.signals.epoch() != epoch || shared.error_fired {
        shared.finish_step();
        return;
      }
      let mut packet = Packet::new(data, pts);
      packet.duration = duration;
      packet.key = key;

      let result = match shared.context.as_mut() {
        Some(context) => context.decode(Some(&packet)),
        None => {
          shared.finish_step();
          return;
        }
      };
      shared.finish_step();
      match result {
        Ok(frames) => shared.deliver(frames),
        Err(err) => shared.fail(encoding_error(&err.to_string())),
      }
    });
    Ok(())
  }

  /// Drain the backend and deliver residual output
  pub fn flush(&self) -> Result<FlushHandle> {
    if self.signals.state.get() != CodecState::Configured {
      return Err(invalid_state_error("decoder is not configured"));
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
          let _ = resolver.send(Err(invalid_state_error("decoder has no backend context")));
          return;
        }
      };
      match result {
        Ok(frames) => {
          shared.deliver(frames);
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
      return Err(invalid_state_error("decoder is closed"));
    }
    self.signals.state.set(CodecState::Unconfigured);
    self.signals.bump_epoch();
    debug!("video decoder reset");
    self.queue.enqueue(|shared| {
      shared.context = None;
      shared.library = None;
    });
    Ok(())
  }

  /// Terminal close; idempotent, reports no error
  pub fn close(&self) {
    self.signals.state.set(CodecState::Closed);
    self.signals.bump_epoch();
    debug!("video decoder close");
    self.queue.enqueue(|shared| {
      shared.context = None;
      shared.library = None;
    });
  }

  /// Probe whether a configuration is supported (init + free)
  pub fn is_config_supported(config: &VideoDecoderConfig) -> Result<VideoDecoderSupport> {
    let supported = match parse_video_codec_string(&config.codec)? {
      None => false,
      Some(parsed) => match backend::acquire() {
        None => false,
        Some(lease) => {
          let decoder_config = DecoderConfig {
            codec: parsed.backend.to_string(),
            sample_rate: 0,
            channels: 0,
            extradata: config.description.clone(),
            coded_width: config.coded_width.unwrap_or(0),
            coded_height: config.coded_height.unwrap_or(0),
            low_delay: config.optimize_for_latency.unwrap_or(false),
          };
          DecoderContext::open(&*lease, &decoder_config).is_ok()
        }
      },
    };
    Ok(VideoDecoderSupport {
      supported,
      config: config.clone(),
    })
  }
}

impl std::fmt::Debug for VideoDecoder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VideoDecoder")
      .field("state", &self.state())
      .field("decode_queue_size", &self.decode_queue_size())
      .finish()
  }
}
