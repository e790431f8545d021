//! AudioDecoder integration tests
//!
//! Drives the decoder state machine against the scripted backend.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use webcodecs_shim::{
  AudioDecoder, AudioDecoderConfig, AudioDecoderInit, CodecState, EncodedAudioChunk,
  EncodedAudioChunkInit, EncodedAudioChunkType, Error,
};

fn opus_config() -> AudioDecoderConfig {
  AudioDecoderConfig {
    codec: "opus".to_string(),
    sample_rate: 48_000,
    number_of_channels: 2,
    description: None,
  }
}

fn opus_chunk(timestamp: i64) -> EncodedAudioChunk {
  EncodedAudioChunk::new(EncodedAudioChunkInit {
    chunk_type: EncodedAudioChunkType::Key,
    timestamp,
    duration: Some(20_000),
    data: vec![0xF8, 0x01, 0x02, 0x03],
  })
}

#[test]
fn test_opus_single_packet() {
  let _session = common::install();

  let outputs = Arc::new(Mutex::new(Vec::new()));
  let errors = Arc::new(AtomicU32::new(0));
  let outputs_sink = outputs.clone();
  let errors_sink = errors.clone();

  let decoder = AudioDecoder::new(AudioDecoderInit {
    output: Box::new(move |data| {
      outputs_sink.lock().unwrap().push((
        data.sample_rate(),
        data.number_of_channels(),
        data.number_of_frames(),
        data.timestamp(),
      ));
    }),
    error: Box::new(move |_| {
      errors_sink.fetch_add(1, Ordering::SeqCst);
    }),
  });

  decoder.configure(&opus_config()).unwrap();
  decoder.decode(&opus_chunk(0)).unwrap();
  decoder.flush().unwrap().wait().unwrap();

  let outputs = outputs.lock().unwrap();
  assert_eq!(outputs.len(), 1);
  assert_eq!(outputs[0], (48_000.0, 2, 960, 0));
  assert_eq!(decoder.decode_queue_size(), 0);
  assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[test]
fn test_outputs_preserve_submission_order() {
  let _session = common::install();

  let timestamps = Arc::new(Mutex::new(Vec::new()));
  let timestamps_sink = timestamps.clone();
  let decoder = AudioDecoder::new(AudioDecoderInit {
    output: Box::new(move |data| timestamps_sink.lock().unwrap().push(data.timestamp())),
    error: Box::new(|err| panic!("unexpected error: {err}")),
  });

  decoder.configure(&opus_config()).unwrap();
  for i in 0..20 {
    decoder.decode(&opus_chunk(i * 20_000)).unwrap();
  }
  decoder.flush().unwrap().wait().unwrap();

  let timestamps = timestamps.lock().unwrap();
  let expected: Vec<i64> = (0..20).map(|i| i * 20_000).collect();
  assert_eq!(*timestamps, expected);
}

#[test]
fn test_unsupported_codec_closes_with_error() {
  let _session = common::install();

  let errors = Arc::new(Mutex::new(Vec::new()));
  let errors_sink = errors.clone();
  let decoder = AudioDecoder::new(AudioDecoderInit {
    output: Box::new(|_| panic!("no output expected")),
    error: Box::new(move |err| errors_sink.lock().unwrap().push(err)),
  });

  // mp3 is recognized but outside coverage: the failure is asynchronous
  let config = AudioDecoderConfig {
    codec: "mp3".to_string(),
    sample_rate: 44_100,
    number_of_channels: 2,
    description: None,
  };
  decoder.configure(&config).unwrap();
  // The failure arrives on the control queue; flush is rejected either
  // synchronously (already closed) or through the aborted handle
  if let Ok(handle) = decoder.flush() {
    assert!(handle.wait().is_err());
  }

  assert!(common::wait_until(|| decoder.state() == CodecState::Closed));
  assert!(common::wait_until(|| errors.lock().unwrap().len() == 1));
  let errors = errors.lock().unwrap();
  assert!(matches!(errors[0], Error::NotSupported(_)));
}

#[test]
fn test_unknown_codec_is_synchronous_type_error() {
  let _session = common::install();

  let decoder = AudioDecoder::new(AudioDecoderInit {
    output: Box::new(|_| {}),
    error: Box::new(|_| {}),
  });
  let config = AudioDecoderConfig {
    codec: "speex".to_string(),
    sample_rate: 16_000,
    number_of_channels: 1,
    description: None,
  };
  assert!(matches!(decoder.configure(&config), Err(Error::Type(_))));
  // A rejected configure leaves the state machine untouched
  assert_eq!(decoder.state(), CodecState::Unconfigured);
}

#[test]
fn test_is_config_supported() {
  let _session = common::install();

  assert!(AudioDecoder::is_config_supported(&opus_config())
    .unwrap()
    .supported);

  let mp3 = AudioDecoderConfig {
    codec: "mp3".to_string(),
    sample_rate: 44_100,
    number_of_channels: 2,
    description: None,
  };
  assert!(!AudioDecoder::is_config_supported(&mp3).unwrap().supported);

  let unknown = AudioDecoderConfig {
    codec: "speex".to_string(),
    sample_rate: 16_000,
    number_of_channels: 1,
    description: None,
  };
  assert!(AudioDecoder::is_config_supported(&unknown).is_err());
}

#[test]
fn test_description_reaches_backend() {
  let session = common::install();

  let decoder = AudioDecoder::new(AudioDecoderInit {
    output: Box::new(|_| {}),
    error: Box::new(|err| panic!("unexpected error: {err}")),
  });
  let config = AudioDecoderConfig {
    codec: "vorbis".to_string(),
    sample_rate: 44_100,
    number_of_channels: 2,
    description: Some(vec![2, 0, 0]),
  };
  decoder.configure(&config).unwrap();
  decoder.flush().unwrap().wait().unwrap();
  assert_eq!(common::count(&session.log, "open_decoder:libvorbis"), 1);
}
