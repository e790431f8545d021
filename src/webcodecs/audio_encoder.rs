//! AudioEncoder - WebCodecs codec state machine
//!
//! Every input runs through an `aresample` graph converting it to the
//! backend codec's fixed sample format, rate and frame size. The graph is
//! keyed by the observed input parameters; when they drift it is drained
//! into the encoder and rebuilt. Output timestamps are derived from the
//! first filtered frame's pts and advanced by sample count, so only the
//! first input timestamp matters.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::{self, AudioStreamSpec, Rational};
use crate::codec::{AudioEncoderSettings, AudioGraph, CodecError, EncoderContext};

use super::audio_decoder::{DequeueCallback, ErrorCallback};
use super::codec_string::parse_audio_codec_string;
use super::control::{flush_channel, CodecSignals, CodecState, ControlQueue, FlushHandle};
use super::error::{
  abort_error, encoding_error, invalid_state_error, not_supported_error, type_error, Result,
};
use super::{
  AudioData, AudioEncoderConfig, AudioEncoderSupport, EncodedAudioChunk, EncodedAudioChunkInit,
  EncodedAudioChunkType,
};

/// Decoder configuration attached to the first emitted chunk
#[derive(Debug, Clone)]
pub struct AudioDecoderConfigOutput {
  pub codec: String,
  pub sample_rate: u32,
  pub number_of_channels: u32,
  /// The encoder's out-of-band side data, once emitted
  pub description: Option<Vec<u8>>,
}

/// Metadata accompanying the first chunk of a configuration epoch
#[derive(Debug, Clone)]
pub struct EncodedAudioChunkMetadata {
  pub decoder_config: Option<AudioDecoderConfigOutput>,
}

/// Callback receiving encoded chunks; metadata accompanies the first one
pub type EncodedAudioChunkOutput =
  Box<dyn FnMut(EncodedAudioChunk, Option<EncodedAudioChunkMetadata>) + Send>;

/// AudioEncoder init record: the two required callbacks
pub struct AudioEncoderInit {
  pub output: EncodedAudioChunkOutput,
  pub error: ErrorCallback,
}

struct Shared {
  context: Option<EncoderContext>,
  graph: Option<AudioGraph>,
  library: Option<backend::LibraryLease>,
  /// Fixed filter output, settled when the encoder opens
  output_spec: Option<AudioStreamSpec>,
  /// Required encoder frame size in samples, 0 for unconstrained
  frame_size: u32,
  /// Monotonic output pts in output-sample-rate units
  pts_cursor: Option<i64>,
  header: Option<AudioDecoderConfigOutput>,
  metadata_sent: bool,
  output: EncodedAudioChunkOutput,
  error: ErrorCallback,
  dequeue: Option<DequeueCallback>,
  error_fired: bool,
  signals: Arc<CodecSignals>,
}

/// Seed the cursor from the first filtered frame, then overwrite every
/// frame's pts and advance by its sample count.
fn relabel(cursor: &mut Option<i64>, frame: &mut backend::Frame) {
  let cursor_value = cursor.get_or_insert(frame.pts);
  frame.pts = *cursor_value;
  *cursor_value += frame.nb_samples as i64;
}

impl Shared {
  fn fail(&mut self, err: super::Error) {
    self.graph = None;
    self.context = None;
    self.library = None;
    self.signals.state.set(CodecState::Closed);
    if !self.error_fired {
      self.error_fired = true;
      warn!(error = %err, "audio encoder closed on error");
      (self.error)(err);
    }
  }

  fn finish_step(&mut self) {
    self.signals.decrement_queue();
    if let Some(callback) = self.dequeue.as_mut() {
      callback();
    }
  }

  /// Run one input frame through the filter chain and the encoder
  fn process_input(&mut self, frame: backend::Frame) -> std::result::Result<Vec<backend::Packet>, CodecError> {
    let mut packets = Vec::new();

    // Input drift: drain the old graph into the encoder first so no
    // samples are dropped, then rebuild. A partial tail frame cannot be
    // fed into a fixed-frame-size codec and is skipped.
    let drifted = self
      .graph
      .as_ref()
      .is_some_and(|graph| !graph.matches_input(&frame));
    if drifted {
      debug!("audio input parameters drifted, rebuilding resample graph");
      let tails = match self.graph.as_mut() {
        Some(graph) => graph.drain()?,
        None => Vec::new(),
      };
      let context = self
        .context
        .as_mut()
        .ok_or_else(|| CodecError::InvalidState("encoder context missing".into()))?;
      for mut tail in tails {
        relabel(&mut self.pts_cursor, &mut tail);
        if self.frame_size != 0 && tail.nb_samples != self.frame_size {
          continue;
        }
        packets.extend(context.encode(Some(&tail))?);
      }
      self.graph = None;
    }

    if self.graph.is_none() {
      let output_spec = self
        .output_spec
        .ok_or_else(|| CodecError::InvalidState("encoder output spec missing".into()))?;
      let library = self
        .library
        .as_ref()
        .ok_or_else(|| CodecError::InvalidState("library lease missing".into()))?;
      let input = AudioStreamSpec {
        sample_format: frame
          .sample_format
          .ok_or_else(|| CodecError::InvalidConfig("input frame has no sample format".into()))?,
        channels: frame.channels,
        sample_rate: frame.sample_rate,
      };
      self.graph = Some(AudioGraph::open(
        &**library,
        input,
        output_spec,
        self.frame_size,
      )?);
    }

    let outs = match self.graph.as_mut() {
      Some(graph) => graph.push(&frame)?,
      None => Vec::new(),
    };
    let context = self
      .context
      .as_mut()
      .ok_or_else(|| CodecError::InvalidState("encoder context missing".into()))?;
    for mut out in outs {
      relabel(&mut self.pts_cursor, &mut out);
      packets.extend(context.encode(Some(&out))?);
    }

    Ok(packets)
  }

  /// Drain the filter and the encoder; the final partial frame is submitted
  fn drain_all(&mut self) -> std::result::Result<Vec<backend::Packet>, CodecError> {
    let mut packets = Vec::new();
    let tails = match self.graph.as_mut() {
      Some(graph) => graph.drain()?,
      None => Vec::new(),
    };
    self.graph = None;
    let context = self
      .context
      .as_mut()
      .ok_or_else(|| CodecError::InvalidState("encoder context missing".into()))?;
    for mut tail in tails {
      relabel(&mut self.pts_cursor, &mut tail);
      packets.extend(context.encode(Some(&tail))?);
    }
    packets.extend(context.flush()?);
    Ok(packets)
  }

  /// Wrap packets as chunks; the first carries the decoder-config metadata
  fn deliver(&mut self, packets: Vec<backend::Packet>) {
    let rate = match self.output_spec {
      Some(spec) => spec.sample_rate,
      None => return,
    };
    let time_base = Rational::new(1, rate as i32);

    for packet in packets {
      let metadata = if self.metadata_sent {
        None
      } else {
        self.metadata_sent = true;
        let description = self.context.as_ref().and_then(|c| c.extradata());
        if let Some(header) = self.header.as_mut() {
          header.description = description;
        }
        Some(EncodedAudioChunkMetadata {
          decoder_config: self.header.clone(),
        })
      };

      let chunk = EncodedAudioChunk::new(EncodedAudioChunkInit {
        chunk_type: if packet.key {
          EncodedAudioChunkType::Key
        } else {
          EncodedAudioChunkType::Delta
        },
        timestamp: time_base.ticks_to_us(packet.pts).max(0),
        duration: (packet.duration > 0).then(|| time_base.ticks_to_us(packet.duration)),
        data: packet.data,
      });
      (self.output)(chunk, metadata);
    }
  }
}

/// WebCodecs-style audio encoder
pub struct AudioEncoder {
  shared: Arc<Mutex<Shared>>,
  queue: ControlQueue<Shared>,
  signals: Arc<CodecSignals>,
}

impl AudioEncoder {
  pub fn new(init: AudioEncoderInit) -> Self {
    let signals = CodecSignals::new();
    let shared = Arc::new(Mutex::new(Shared {
      context: None,
      graph: None,
      library: None,
      output_spec: None,
      frame_size: 0,
      pts_cursor: None,
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

  /// Map codec-specific config records to backend private options
  fn private_options(config: &AudioEncoderConfig) -> Vec<(String, String)> {
    let mut options = Vec::new();
    if let Some(opus) = &config.opus {
      if let Some(frame_duration) = opus.frame_duration {
        // Microseconds to the backend's milliseconds
        options.push((
          "frame_duration".to_string(),
          format!("{}", frame_duration as f64 / 1000.0),
        ));
      }
      if let Some(packet_loss) = opus.packetlossperc {
        options.push(("packet_loss".to_string(), packet_loss.to_string()));
      }
      if let Some(fec) = opus.useinbandfec {
        options.push(("fec".to_string(), if fec { "1" } else { "0" }.to_string()));
      }
      if let Some(format) = &opus.format {
        options.push(("format".to_string(), format.clone()));
      }
    }
    if let Some(flac) = &config.flac {
      if let Some(block_size) = flac.block_size {
        options.push(("block_size".to_string(), block_size.to_string()));
      }
    }
    options
  }

  fn resolve_settings(config: &AudioEncoderConfig) -> Result<Option<AudioEncoderSettings>> {
    let parsed = match parse_audio_codec_string(&config.codec)? {
      Some(parsed) => parsed,
      None => return Ok(None),
    };
    Ok(Some(AudioEncoderSettings {
      codec: parsed.backend.to_string(),
      sample_rate: config.sample_rate.unwrap_or(48_000),
      channels: config.number_of_channels.unwrap_or(2),
      bitrate: config.bitrate.unwrap_or(0),
      sample_format: parsed.sample_format,
      options: Self::private_options(config),
    }))
  }

  /// Configure the encoder; enqueues the backend init
  pub fn configure(&self, config: &AudioEncoderConfig) -> Result<()> {
    if self.signals.state.get() == CodecState::Closed {
      return Err(invalid_state_error("encoder is closed"));
    }
    let settings = Self::resolve_settings(config)?;

    self.signals.state.set(CodecState::Configured);
    let epoch = self.signals.epoch();
    debug!(codec = %config.codec, "audio encoder configure");

    match settings {
      None => {
        let codec = config.codec.clone();
        self.queue.enqueue(move |shared| {
          if shared.signals.epoch() != epoch {
            return;
          }
          shared.fail(not_supported_error(&format!(
            "unsupported audio codec: {}",
            codec
          )));
        });
      }
      Some(settings) => {
        // Partial output metadata; description is filled on first emission
        let header = AudioDecoderConfigOutput {
          codec: config.codec.clone(),
          sample_rate: settings.sample_rate,
          number_of_channels: settings.channels,
          description: None,
        };
        self.queue.enqueue(move |shared| {
          if shared.signals.epoch() != epoch {
            return;
          }
          shared.graph = None;
          shared.context = None;
          shared.library = None;
          let lease = match backend::acquire() {
            Some(lease) => lease,
            None => {
              shared.fail(not_supported_error("no codec library installed"));
              return;
            }
          };
          match EncoderContext::open_audio(&*lease, &settings) {
            Ok(context) => {
              shared.frame_size = context.frame_size();
              let negotiated = context.sample_format().unwrap_or(settings.sample_format);
              shared.output_spec = Some(AudioStreamSpec {
                sample_format: negotiated,
                channels: settings.channels,
                sample_rate: settings.sample_rate,
              });
              shared.context = Some(context);
              shared.library = Some(lease);
              shared.header = Some(header);
              shared.metadata_sent = false;
              shared.pts_cursor = None;
            }
            Err(err) => shared.fail(not_supported_error(&err.to_string())),
          }
        });
      }
    }
    Ok(())
  }

  /// Encode one AudioData; the input is cloned on entry
  pub fn encode(&self, data: &AudioData) -> Result<()> {
    if self.signals.state.get() != CodecState::Configured {
      return Err(invalid_state_error("encoder is not configured"));
    }
    if data.is_closed() {
      return Err(type_error("cannot encode a closed AudioData"));
    }
    let clone = data.try_clone()?;

    self.signals.increment_queue();
    let epoch = self.signals.epoch();

    self.queue.enqueue(move |shared| {
      if shared.signals.epoch() != epoch || shared.error_fired || shared.context.is_none() {
        shared.finish_step();
        return;
      }

      // Frame pts counts input samples; the filter rescales it to the
      // output rate before the cursor takes over.
      let frame = match clone.to_backend_frame() {
        Ok(mut frame) => {
          let input_base = Rational::new(1, frame.sample_rate.max(1) as i32);
          frame.pts = input_base.ticks_from_us(clone.timestamp());
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

  /// Drain the filter and the encoder, emitting residual chunks
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
      match shared.drain_all() {
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
    debug!("audio encoder reset");
    self.queue.enqueue(|shared| {
      shared.graph = None;
      shared.context = None;
      shared.library = None;
    });
    Ok(())
  }

  /// Terminal close; idempotent, reports no error
  pub fn close(&self) {
    self.signals.state.set(CodecState::Closed);
    self.signals.bump_epoch();
    debug!("audio encoder close");
    self.queue.enqueue(|shared| {
      shared.graph = None;
      shared.context = None;
      shared.library = None;
    });
  }

  /// Probe whether a configuration is supported (init + free)
  pub fn is_config_supported(config: &AudioEncoderConfig) -> Result<AudioEncoderSupport> {
    let supported = match Self::resolve_settings(config)? {
      None => false,
      Some(settings) => match backend::acquire() {
        None => false,
        Some(lease) => EncoderContext::open_audio(&*lease, &settings).is_ok(),
      },
    };
    Ok(AudioEncoderSupport {
      supported,
      config: config.clone(),
    })
  }
}

impl std::fmt::Debug for AudioEncoder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AudioEncoder")
      .field("state", &self.state())
      .field("encode_queue_size", &self.encode_queue_size())
      .finish()
  }
}
