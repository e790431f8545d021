#![allow(dead_code)]

//! Scripted in-process codec library backing the integration suite
//!
//! Implements the backend interface with deterministic stand-ins: fixed
//! frame sizes, synthetic payloads and an event log the tests inspect for
//! filter/rescaler lifecycle and aspect-ratio plumbing. Tests in one binary
//! share the process-wide pool, so `install` also serializes them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use webcodecs_shim::backend::{
  self, AudioFilterHandle, AudioFilterSpec, BackendError, BackendResult, CodecLibrary,
  DecoderHandle, DecoderSetup, EncoderHandle, EncoderSetup, Frame, Packet, PixelFormat,
  SampleFormat, ScalerHandle, ScalerSpec,
};

static TEST_LOCK: Mutex<()> = Mutex::new(());

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Holds the suite lock and the event log for one test
pub struct FakeSession {
  _guard: MutexGuard<'static, ()>,
  pub log: EventLog,
}

/// Install a fresh fake library into the global pool and serialize the test
pub fn install() -> FakeSession {
  let guard = match TEST_LOCK.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  };
  let log: EventLog = Arc::new(Mutex::new(Vec::new()));
  let factory_log = log.clone();
  backend::install(move || {
    Arc::new(FakeLibrary {
      log: factory_log.clone(),
    }) as Arc<dyn CodecLibrary>
  });
  webcodecs_shim::webcodecs::register_host_provider(None);
  FakeSession { _guard: guard, log }
}

pub fn record(log: &EventLog, event: String) {
  if let Ok(mut log) = log.lock() {
    log.push(event);
  }
}

/// Poll `condition` until it holds or two seconds elapse
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
  let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
  while std::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    std::thread::sleep(std::time::Duration::from_millis(2));
  }
  condition()
}

/// Count log entries containing `needle`
pub fn count(log: &EventLog, needle: &str) -> usize {
  log
    .lock()
    .map(|log| log.iter().filter(|e| e.contains(needle)).count())
    .unwrap_or(0)
}

pub struct FakeLibrary {
  log: EventLog,
}

impl CodecLibrary for FakeLibrary {
  fn open_decoder(&self, setup: &DecoderSetup) -> BackendResult<Box<dyn DecoderHandle>> {
    record(&self.log, format!("open_decoder:{}", setup.codec));
    match setup.codec.as_str() {
      "libopus" | "libvorbis" | "flac" => Ok(Box::new(FakeAudioDecoder {
        sample_rate: if setup.sample_rate > 0 {
          setup.sample_rate
        } else {
          48_000
        },
        channels: if setup.channels > 0 { setup.channels } else { 2 },
        frame_samples: match setup.codec.as_str() {
          "libopus" => 960,
          "libvorbis" => 1024,
          _ => 4608,
        },
        pending: VecDeque::new(),
      })),
      "libvpx" | "libvpx-vp9" | "libaom-av1" => Ok(Box::new(FakeVideoDecoder {
        width: if setup.coded_width > 0 {
          setup.coded_width
        } else {
          320
        },
        height: if setup.coded_height > 0 {
          setup.coded_height
        } else {
          240
        },
        pending: VecDeque::new(),
      })),
      other => Err(BackendError::CodecNotFound(other.to_string())),
    }
  }

  fn open_encoder(&self, setup: &EncoderSetup) -> BackendResult<Box<dyn EncoderHandle>> {
    let options = setup
      .options
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join(",");
    record(
      &self.log,
      format!("open_encoder:{} options[{}]", setup.codec, options),
    );
    match setup.codec.as_str() {
      "libopus" => Ok(Box::new(FakeAudioEncoder {
        log: self.log.clone(),
        frame_size: 960,
        sample_format: SampleFormat::Flt,
        sample_rate: setup.sample_rate,
        channels: setup.channels,
        extradata: b"OpusHead\x01\x02fake".to_vec(),
        pending: VecDeque::new(),
      })),
      "libvorbis" => Ok(Box::new(FakeAudioEncoder {
        log: self.log.clone(),
        frame_size: 1024,
        sample_format: SampleFormat::Fltp,
        sample_rate: setup.sample_rate,
        channels: setup.channels,
        extradata: b"\x02vorbis-setup".to_vec(),
        pending: VecDeque::new(),
      })),
      "flac" => Ok(Box::new(FakeAudioEncoder {
        log: self.log.clone(),
        frame_size: 4608,
        sample_format: SampleFormat::S32,
        sample_rate: setup.sample_rate,
        channels: setup.channels,
        extradata: b"fLaC\x00\x00\x00\x22streaminfo".to_vec(),
        pending: VecDeque::new(),
      })),
      "libvpx" | "libvpx-vp9" | "libaom-av1" => Ok(Box::new(FakeVideoEncoder {
        log: self.log.clone(),
        width: setup.width,
        height: setup.height,
        pixel_format: setup.pixel_format.unwrap_or(PixelFormat::Yuv420p),
        extradata: b"fake-codec-config".to_vec(),
        frames_seen: 0,
        pending: VecDeque::new(),
      })),
      other => Err(BackendError::CodecNotFound(other.to_string())),
    }
  }

  fn open_audio_filter(&self, spec: &AudioFilterSpec) -> BackendResult<Box<dyn AudioFilterHandle>> {
    record(
      &self.log,
      format!(
        "open_audio_filter:{}->{}",
        spec.input.sample_rate, spec.output.sample_rate
      ),
    );
    Ok(Box::new(FakeAudioFilter {
      spec: spec.clone(),
      available: 0,
      rate_accumulator: 0,
      next_pts: None,
    }))
  }

  fn open_scaler(&self, spec: &ScalerSpec) -> BackendResult<Box<dyn ScalerHandle>> {
    record(
      &self.log,
      format!(
        "open_scaler:{}x{}->{}x{}",
        spec.input.width, spec.input.height, spec.output.width, spec.output.height
      ),
    );
    Ok(Box::new(FakeScaler { spec: spec.clone() }))
  }
}

// ============================================================================
// Decoders
// ============================================================================

struct FakeAudioDecoder {
  sample_rate: u32,
  channels: u32,
  frame_samples: u32,
  pending: VecDeque<Frame>,
}

impl DecoderHandle for FakeAudioDecoder {
  fn send_packet(&mut self, packet: Option<&Packet>) -> BackendResult<bool> {
    if let Some(packet) = packet {
      let mut frame = Frame::new_audio(
        self.frame_samples,
        self.channels,
        self.sample_rate,
        SampleFormat::Fltp,
      );
      frame.pts = packet.pts;
      frame.duration = packet.duration;
      self.pending.push_back(frame);
    }
    Ok(true)
  }

  fn receive_frame(&mut self) -> BackendResult<Option<Frame>> {
    Ok(self.pending.pop_front())
  }
}

struct FakeVideoDecoder {
  width: u32,
  height: u32,
  pending: VecDeque<Frame>,
}

impl DecoderHandle for FakeVideoDecoder {
  fn send_packet(&mut self, packet: Option<&Packet>) -> BackendResult<bool> {
    if let Some(packet) = packet {
      let mut frame = Frame::new_video(self.width, self.height, PixelFormat::Yuv420p);
      frame.pts = packet.pts;
      frame.duration = packet.duration;
      frame.key_frame = packet.key;
      self.pending.push_back(frame);
    }
    Ok(true)
  }

  fn receive_frame(&mut self) -> BackendResult<Option<Frame>> {
    Ok(self.pending.pop_front())
  }
}

// ============================================================================
// Encoders
// ============================================================================

struct FakeAudioEncoder {
  log: EventLog,
  frame_size: u32,
  sample_format: SampleFormat,
  sample_rate: u32,
  channels: u32,
  extradata: Vec<u8>,
  pending: VecDeque<Packet>,
}

impl EncoderHandle for FakeAudioEncoder {
  fn frame_size(&self) -> u32 {
    self.frame_size
  }

  fn sample_format(&self) -> Option<SampleFormat> {
    Some(self.sample_format)
  }

  fn extradata(&self) -> Option<Vec<u8>> {
    Some(self.extradata.clone())
  }

  fn send_frame(&mut self, frame: Option<&Frame>) -> BackendResult<bool> {
    let Some(frame) = frame else {
      return Ok(true);
    };
    if frame.sample_format != Some(self.sample_format)
      || frame.sample_rate != self.sample_rate
      || frame.channels != self.channels
    {
      return Err(BackendError::InvalidConfig(format!(
        "audio encoder fed {:?}@{} ch{}, wants {:?}@{} ch{}",
        frame.sample_format,
        frame.sample_rate,
        frame.channels,
        self.sample_format,
        self.sample_rate,
        self.channels
      )));
    }
    // Only the final pre-drain frame may be shorter than the frame size
    if frame.nb_samples > self.frame_size {
      return Err(BackendError::InvalidConfig(format!(
        "audio encoder fed {} samples, frame size is {}",
        frame.nb_samples, self.frame_size
      )));
    }
    record(&self.log, format!("encode_audio:samples={}", frame.nb_samples));
    let mut packet = Packet::new(vec![0x5A; 48], frame.pts);
    packet.duration = frame.nb_samples as i64;
    packet.key = true;
    self.pending.push_back(packet);
    Ok(true)
  }

  fn receive_packet(&mut self) -> BackendResult<Option<Packet>> {
    Ok(self.pending.pop_front())
  }
}

struct FakeVideoEncoder {
  log: EventLog,
  width: u32,
  height: u32,
  pixel_format: PixelFormat,
  extradata: Vec<u8>,
  frames_seen: u64,
  pending: VecDeque<Packet>,
}

impl EncoderHandle for FakeVideoEncoder {
  fn frame_size(&self) -> u32 {
    0
  }

  fn sample_format(&self) -> Option<SampleFormat> {
    None
  }

  fn extradata(&self) -> Option<Vec<u8>> {
    Some(self.extradata.clone())
  }

  fn send_frame(&mut self, frame: Option<&Frame>) -> BackendResult<bool> {
    let Some(frame) = frame else {
      return Ok(true);
    };
    if frame.width != self.width
      || frame.height != self.height
      || frame.pixel_format != Some(self.pixel_format)
    {
      return Err(BackendError::InvalidConfig(format!(
        "video encoder fed {}x{} {:?}, wants {}x{} {:?}",
        frame.width, frame.height, frame.pixel_format, self.width, self.height, self.pixel_format
      )));
    }
    let sar = frame
      .sample_aspect
      .map(|sar| format!("{}/{}", sar.num, sar.den))
      .unwrap_or_else(|| "square".to_string());
    record(
      &self.log,
      format!("encode_video:pts={} sar={}", frame.pts, sar),
    );
    let key = frame.key_frame || self.frames_seen == 0;
    self.frames_seen += 1;
    let mut packet = Packet::new(vec![0xC3; 128], frame.pts);
    packet.duration = frame.duration;
    packet.key = key;
    self.pending.push_back(packet);
    Ok(true)
  }

  fn receive_packet(&mut self) -> BackendResult<Option<Packet>> {
    Ok(self.pending.pop_front())
  }
}

// ============================================================================
// Filter and scaler
// ============================================================================

struct FakeAudioFilter {
  spec: AudioFilterSpec,
  /// Buffered output samples not yet emitted
  available: u64,
  /// Rational remainder of the rate conversion, in input-rate units
  rate_accumulator: u64,
  /// Output pts of the next emitted frame, in output-rate units
  next_pts: Option<i64>,
}

impl FakeAudioFilter {
  fn emit(&mut self, include_partial: bool) -> Vec<Frame> {
    let frame_size = self.spec.frame_size as u64;
    let mut frames = Vec::new();
    loop {
      let take = if frame_size == 0 || (include_partial && self.available < frame_size) {
        self.available
      } else if self.available >= frame_size {
        frame_size
      } else {
        0
      };
      if take == 0 {
        break;
      }
      let mut frame = Frame::new_audio(
        take as u32,
        self.spec.output.channels,
        self.spec.output.sample_rate,
        self.spec.output.sample_format,
      );
      let pts = self.next_pts.unwrap_or(0);
      frame.pts = pts;
      self.next_pts = Some(pts + take as i64);
      self.available -= take;
      frames.push(frame);
    }
    frames
  }
}

impl AudioFilterHandle for FakeAudioFilter {
  fn push(&mut self, frame: &Frame) -> BackendResult<Vec<Frame>> {
    if frame.sample_format != Some(self.spec.input.sample_format)
      || frame.sample_rate != self.spec.input.sample_rate
      || frame.channels != self.spec.input.channels
    {
      return Err(BackendError::InvalidConfig(
        "frame does not match the filter input".to_string(),
      ));
    }

    let in_rate = self.spec.input.sample_rate as u64;
    let out_rate = self.spec.output.sample_rate as u64;
    if self.next_pts.is_none() {
      // First frame settles the output-side pts origin
      let rescaled = frame.pts as i128 * out_rate as i128 / in_rate as i128;
      self.next_pts = Some(rescaled as i64);
    }

    let numerator = self.rate_accumulator + frame.nb_samples as u64 * out_rate;
    self.available += numerator / in_rate;
    self.rate_accumulator = numerator % in_rate;

    Ok(self.emit(false))
  }

  fn drain(&mut self) -> BackendResult<Vec<Frame>> {
    Ok(self.emit(true))
  }
}

struct FakeScaler {
  spec: ScalerSpec,
}

impl ScalerHandle for FakeScaler {
  fn scale(&mut self, src: &Frame) -> BackendResult<Frame> {
    if src.width != self.spec.input.width
      || src.height != self.spec.input.height
      || src.pixel_format != Some(self.spec.input.pixel_format)
    {
      return Err(BackendError::InvalidConfig(
        "frame does not match the scaler input".to_string(),
      ));
    }
    Ok(Frame::new_video(
      self.spec.output.width,
      self.spec.output.height,
      self.spec.output.pixel_format,
    ))
  }
}
