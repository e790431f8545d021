//! Decoder and encoder contexts
//!
//! Thin safe wrappers over opened backend handles providing the
//! send-all/drain conveniences. The codec instance owns the pool lease the
//! handle was opened from and frees both together.

use tracing::debug;

use crate::backend::{
  CodecLibrary, DecoderSetup, EncoderSetup, Frame, Packet, Rational, SampleFormat,
};

use super::{AudioEncoderSettings, CodecResult, DecoderConfig, VideoEncoderSettings};

/// Safe wrapper around an opened backend decoder
pub struct DecoderContext {
  handle: Box<dyn crate::backend::DecoderHandle>,
}

impl DecoderContext {
  /// Open a decoder. The time base is fixed at 1/1000; timestamps cross
  /// this boundary in milliseconds.
  pub fn open(library: &dyn CodecLibrary, config: &DecoderConfig) -> CodecResult<Self> {
    let setup = DecoderSetup {
      codec: config.codec.clone(),
      time_base: Rational::MILLIS,
      sample_rate: config.sample_rate,
      channels: config.channels,
      extradata: config.extradata.clone(),
      coded_width: config.coded_width,
      coded_height: config.coded_height,
      low_delay: config.low_delay,
    };
    let handle = library.open_decoder(&setup)?;
    debug!(codec = %config.codec, "opened decoder");
    Ok(Self { handle })
  }

  /// Decode a packet and return all available frames
  ///
  /// Passing `None` drains the decoder.
  pub fn decode(&mut self, packet: Option<&Packet>) -> CodecResult<Vec<Frame>> {
    let mut frames = Vec::new();

    if !self.handle.send_packet(packet)? {
      // Decoder is full, drain first and retry
      while let Some(frame) = self.handle.receive_frame()? {
        frames.push(frame);
      }
      self.handle.send_packet(packet)?;
    }

    while let Some(frame) = self.handle.receive_frame()? {
      frames.push(frame);
    }

    Ok(frames)
  }

  /// Drain all buffered frames out of the decoder
  pub fn flush(&mut self) -> CodecResult<Vec<Frame>> {
    self.decode(None)
  }
}

/// Safe wrapper around an opened backend encoder
pub struct EncoderContext {
  handle: Box<dyn crate::backend::EncoderHandle>,
}

impl EncoderContext {
  /// Open an audio encoder; the time base is 1/sample_rate so packet pts
  /// counts output samples.
  pub fn open_audio(
    library: &dyn CodecLibrary,
    settings: &AudioEncoderSettings,
  ) -> CodecResult<Self> {
    let setup = EncoderSetup {
      codec: settings.codec.clone(),
      time_base: Rational::new(1, settings.sample_rate as i32),
      bitrate: settings.bitrate,
      sample_rate: settings.sample_rate,
      channels: settings.channels,
      sample_format: Some(settings.sample_format),
      width: 0,
      height: 0,
      pixel_format: None,
      framerate: None,
      sample_aspect: None,
      options: settings.options.clone(),
    };
    let handle = library.open_encoder(&setup)?;
    debug!(codec = %settings.codec, rate = settings.sample_rate, "opened audio encoder");
    Ok(Self { handle })
  }

  /// Open a video encoder at the fixed 1/1000 time base.
  pub fn open_video(
    library: &dyn CodecLibrary,
    settings: &VideoEncoderSettings,
  ) -> CodecResult<Self> {
    let setup = EncoderSetup {
      codec: settings.codec.clone(),
      time_base: Rational::MILLIS,
      bitrate: settings.bitrate,
      sample_rate: 0,
      channels: 0,
      sample_format: None,
      width: settings.width,
      height: settings.height,
      pixel_format: Some(settings.pixel_format),
      framerate: settings.framerate,
      sample_aspect: settings.sample_aspect,
      options: settings.options.clone(),
    };
    let handle = library.open_encoder(&setup)?;
    debug!(codec = %settings.codec, width = settings.width, height = settings.height, "opened video encoder");
    Ok(Self { handle })
  }

  /// Required input frame size in samples, 0 for unconstrained
  pub fn frame_size(&self) -> u32 {
    self.handle.frame_size()
  }

  /// Negotiated input sample format for audio encoders
  pub fn sample_format(&self) -> Option<SampleFormat> {
    self.handle.sample_format()
  }

  /// Side data the encoder emits for decoder initialization
  pub fn extradata(&self) -> Option<Vec<u8>> {
    self.handle.extradata()
  }

  /// Encode a frame and return all available packets
  ///
  /// Passing `None` drains the encoder.
  pub fn encode(&mut self, frame: Option<&Frame>) -> CodecResult<Vec<Packet>> {
    let mut packets = Vec::new();

    if !self.handle.send_frame(frame)? {
      // Encoder is full, drain first and retry
      while let Some(packet) = self.handle.receive_packet()? {
        packets.push(packet);
      }
      self.handle.send_frame(frame)?;
    }

    while let Some(packet) = self.handle.receive_packet()? {
      packets.push(packet);
    }

    Ok(packets)
  }

  /// Drain all buffered packets out of the encoder
  pub fn flush(&mut self) -> CodecResult<Vec<Packet>> {
    self.encode(None)
  }
}
