//! Codec lifecycle and queueing invariants
//!
//! State transitions, queue-depth accounting, dequeue events, the
//! at-most-once error callback and the close-with-pending-work behavior.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use webcodecs_shim::{
  AudioDecoder, AudioDecoderConfig, AudioDecoderInit, CodecState, EncodedVideoChunk,
  EncodedVideoChunkInit, EncodedVideoChunkType, Error, VideoDecoder, VideoDecoderConfig,
  VideoDecoderInit, VideoEncoder, VideoEncoderConfig, VideoEncoderEncodeOptions,
  VideoEncoderInit, VideoFrame, VideoFrameBufferInit, VideoPixelFormat,
};

fn vp8_decoder_config() -> VideoDecoderConfig {
  VideoDecoderConfig {
    codec: "vp8".to_string(),
    coded_width: Some(320),
    coded_height: Some(240),
    display_aspect_width: None,
    display_aspect_height: None,
    color_space: None,
    optimize_for_latency: None,
    description: None,
  }
}

fn key_chunk(timestamp: i64) -> EncodedVideoChunk {
  EncodedVideoChunk::new(EncodedVideoChunkInit {
    chunk_type: EncodedVideoChunkType::Key,
    timestamp,
    duration: None,
    data: vec![0x20; 32],
  })
}

fn i420_frame(timestamp: i64) -> VideoFrame {
  VideoFrame::new(VideoFrameBufferInit {
    format: VideoPixelFormat::I420,
    coded_width: 320,
    coded_height: 240,
    timestamp,
    duration: None,
    layout: None,
    visible_rect: None,
    display_width: None,
    display_height: None,
    data: vec![0u8; 320 * 240 + 2 * 160 * 120],
    transfer: false,
  })
  .unwrap()
}

#[test]
fn test_lifecycle_transitions() {
  let _session = common::install();

  let decoder = VideoDecoder::new(VideoDecoderInit {
    output: Box::new(|_| {}),
    error: Box::new(|_| {}),
  });

  // Every instance begins Unconfigured; work requires Configured
  assert_eq!(decoder.state(), CodecState::Unconfigured);
  assert!(matches!(
    decoder.decode(&key_chunk(0)),
    Err(Error::InvalidState(_))
  ));
  assert!(matches!(decoder.flush(), Err(Error::InvalidState(_))));

  decoder.configure(&vp8_decoder_config()).unwrap();
  assert_eq!(decoder.state(), CodecState::Configured);

  // Reset returns to Unconfigured
  decoder.reset().unwrap();
  assert_eq!(decoder.state(), CodecState::Unconfigured);
  assert!(matches!(
    decoder.decode(&key_chunk(0)),
    Err(Error::InvalidState(_))
  ));

  // Closed is terminal and idempotent
  decoder.configure(&vp8_decoder_config()).unwrap();
  decoder.close();
  decoder.close();
  assert_eq!(decoder.state(), CodecState::Closed);
  assert!(matches!(
    decoder.configure(&vp8_decoder_config()),
    Err(Error::InvalidState(_))
  ));
  assert!(matches!(decoder.reset(), Err(Error::InvalidState(_))));
}

#[test]
fn test_queue_accounting_and_dequeue_events() {
  let _session = common::install();

  let decoder = VideoDecoder::new(VideoDecoderInit {
    output: Box::new(|_| {}),
    error: Box::new(|err| panic!("unexpected error: {err}")),
  });
  let dequeues = Arc::new(AtomicU32::new(0));
  let dequeues_sink = dequeues.clone();
  decoder.set_ondequeue(Some(Box::new(move || {
    dequeues_sink.fetch_add(1, Ordering::SeqCst);
  })));

  decoder.configure(&vp8_decoder_config()).unwrap();
  for i in 0..25 {
    decoder.decode(&key_chunk(i * 40_000)).unwrap();
  }
  decoder.flush().unwrap().wait().unwrap();

  // One dequeue event per completed decode step, counter back to zero
  assert_eq!(dequeues.load(Ordering::SeqCst), 25);
  assert_eq!(decoder.decode_queue_size(), 0);
}

#[test]
fn test_error_callback_fires_at_most_once() {
  let _session = common::install();

  let errors = Arc::new(AtomicU32::new(0));
  let errors_sink = errors.clone();
  let decoder = AudioDecoder::new(AudioDecoderInit {
    output: Box::new(|_| {}),
    error: Box::new(move |_| {
      errors_sink.fetch_add(1, Ordering::SeqCst);
    }),
  });

  // An unsupported configure closes the instance; the decode step queued
  // behind it must not produce a second error report
  let config = AudioDecoderConfig {
    codec: "mp3".to_string(),
    sample_rate: 44_100,
    number_of_channels: 2,
    description: None,
  };
  decoder.configure(&config).unwrap();
  let chunk = webcodecs_shim::EncodedAudioChunk::new(webcodecs_shim::EncodedAudioChunkInit {
    chunk_type: webcodecs_shim::EncodedAudioChunkType::Key,
    timestamp: 0,
    duration: None,
    data: vec![1, 2, 3],
  });
  let _ = decoder.decode(&chunk);

  assert!(common::wait_until(|| decoder.state() == CodecState::Closed));
  assert!(common::wait_until(|| decoder.decode_queue_size() == 0));
  assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test]
fn test_detached_frame_rejects_encode() {
  let _session = common::install();

  let encoder = VideoEncoder::new(VideoEncoderInit {
    output: Box::new(|_, _| {}),
    error: Box::new(|err| panic!("unexpected error: {err}")),
  });
  encoder
    .configure(&VideoEncoderConfig {
      codec: "vp8".to_string(),
      width: 320,
      height: 240,
      display_width: None,
      display_height: None,
      bitrate: None,
      framerate: None,
      latency_mode: None,
    })
    .unwrap();

  let frame = i420_frame(0);
  frame.close();
  let result = encoder.encode(&frame, &VideoEncoderEncodeOptions::default());
  assert!(matches!(result, Err(Error::Type(_))));
  assert_eq!(encoder.encode_queue_size(), 0);
  assert_eq!(encoder.state(), CodecState::Configured);
}

#[test]
fn test_close_with_pending_work() {
  let _session = common::install();

  let outputs = Arc::new(AtomicU32::new(0));
  let errors = Arc::new(AtomicU32::new(0));
  let outputs_sink = outputs.clone();
  let errors_sink = errors.clone();
  let decoder = VideoDecoder::new(VideoDecoderInit {
    output: Box::new(move |_| {
      outputs_sink.fetch_add(1, Ordering::SeqCst);
    }),
    error: Box::new(move |_| {
      errors_sink.fetch_add(1, Ordering::SeqCst);
    }),
  });

  decoder.configure(&vp8_decoder_config()).unwrap();
  for i in 0..10 {
    decoder.decode(&key_chunk(i * 40_000)).unwrap();
  }
  decoder.close();

  // Closed synchronously; pending steps drain their counters
  assert_eq!(decoder.state(), CodecState::Closed);
  assert!(common::wait_until(|| decoder.decode_queue_size() == 0));

  // Once drained, no further output arrives and no error was reported
  let settled = outputs.load(Ordering::SeqCst);
  std::thread::sleep(std::time::Duration::from_millis(50));
  assert_eq!(outputs.load(Ordering::SeqCst), settled);
  assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reset_abandons_queued_work() {
  let _session = common::install();

  let outputs = Arc::new(AtomicU32::new(0));
  let outputs_sink = outputs.clone();
  let decoder = VideoDecoder::new(VideoDecoderInit {
    output: Box::new(move |_| {
      outputs_sink.fetch_add(1, Ordering::SeqCst);
    }),
    error: Box::new(|err| panic!("unexpected error: {err}")),
  });

  decoder.configure(&vp8_decoder_config()).unwrap();
  for i in 0..10 {
    decoder.decode(&key_chunk(i * 40_000)).unwrap();
  }
  decoder.reset().unwrap();

  assert_eq!(decoder.state(), CodecState::Unconfigured);
  assert!(common::wait_until(|| decoder.decode_queue_size() == 0));

  // The decoder is reusable after reset
  decoder.configure(&vp8_decoder_config()).unwrap();
  decoder.decode(&key_chunk(0)).unwrap();
  decoder.flush().unwrap().wait().unwrap();
  assert!(outputs.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_environment_resolution() {
  let _session = common::install();

  use webcodecs_shim::webcodecs::CodecRequest;

  let opus = AudioDecoderConfig {
    codec: "opus".to_string(),
    sample_rate: 48_000,
    number_of_channels: 2,
    description: None,
  };
  assert_eq!(
    webcodecs_shim::resolve_environment(&CodecRequest::AudioDecoder(&opus)).unwrap(),
    webcodecs_shim::Environment::Polyfill
  );

  let mp3 = AudioDecoderConfig {
    codec: "mp3".to_string(),
    ..opus.clone()
  };
  assert!(matches!(
    webcodecs_shim::resolve_environment(&CodecRequest::AudioDecoder(&mp3)),
    Err(Error::NotSupported(_))
  ));

  // A registered host claiming the configuration wins over the polyfill
  struct ClaimAll;
  impl webcodecs_shim::webcodecs::HostCodecProvider for ClaimAll {
    fn supports(&self, _request: &CodecRequest<'_>) -> bool {
      true
    }
  }
  webcodecs_shim::webcodecs::register_host_provider(Some(Arc::new(ClaimAll)));
  assert_eq!(
    webcodecs_shim::resolve_environment(&CodecRequest::AudioDecoder(&opus)).unwrap(),
    webcodecs_shim::Environment::Host
  );
  webcodecs_shim::webcodecs::register_host_provider(None);
}
