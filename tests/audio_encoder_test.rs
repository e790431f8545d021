//! AudioEncoder integration tests
//!
//! Covers the resample-filter lifecycle: fixed output frame sizes, the
//! input-drift rebuild and the sample-count-derived output timestamps.

mod common;

use std::sync::{Arc, Mutex};

use webcodecs_shim::{
  AudioData, AudioDataInit, AudioEncoder, AudioEncoderConfig, AudioEncoderInit,
  AudioSampleFormat, EncodedAudioChunkMetadata,
};

type ChunkRecord = (i64, Option<i64>, Option<EncodedAudioChunkMetadata>);

fn collecting_encoder(sink: Arc<Mutex<Vec<ChunkRecord>>>) -> AudioEncoder {
  AudioEncoder::new(AudioEncoderInit {
    output: Box::new(move |chunk, metadata| {
      sink
        .lock()
        .unwrap()
        .push((chunk.timestamp(), chunk.duration(), metadata));
    }),
    error: Box::new(|err| panic!("unexpected encoder error: {err}")),
  })
}

fn audio(
  format: AudioSampleFormat,
  sample_rate: f64,
  frames: u32,
  channels: u32,
  timestamp: i64,
) -> AudioData {
  AudioData::new(AudioDataInit {
    format,
    sample_rate,
    number_of_frames: frames,
    number_of_channels: channels,
    timestamp,
    data: vec![0u8; frames as usize * channels as usize * format.bytes_per_sample()],
  })
  .unwrap()
}

#[test]
fn test_flac_one_second_of_silence() {
  let _session = common::install();

  let chunks = Arc::new(Mutex::new(Vec::new()));
  let encoder = collecting_encoder(chunks.clone());

  encoder
    .configure(&AudioEncoderConfig {
      codec: "flac".to_string(),
      sample_rate: Some(48_000),
      number_of_channels: Some(2),
      bitrate: None,
      opus: None,
      flac: None,
    })
    .unwrap();

  // One second of f32-planar silence in 20 ms slices
  for i in 0..50 {
    let data = audio(AudioSampleFormat::F32Planar, 48_000.0, 960, 2, i * 20_000);
    encoder.encode(&data).unwrap();
  }
  encoder.flush().unwrap().wait().unwrap();

  let chunks = chunks.lock().unwrap();
  assert!(!chunks.is_empty());

  // First chunk carries the decoder config with non-empty extradata
  let first_metadata = chunks[0].2.as_ref().expect("first chunk has metadata");
  let decoder_config = first_metadata.decoder_config.as_ref().unwrap();
  assert_eq!(decoder_config.codec, "flac");
  assert_eq!(decoder_config.sample_rate, 48_000);
  assert_eq!(decoder_config.number_of_channels, 2);
  assert!(!decoder_config.description.as_ref().unwrap().is_empty());
  assert!(chunks[1..].iter().all(|(_, _, metadata)| metadata.is_none()));

  // Summed durations cover the second
  let total: i64 = chunks.iter().filter_map(|(_, duration, _)| *duration).sum();
  assert!((total - 1_000_000).abs() < 1_000, "total was {total}");

  assert_eq!(encoder.encode_queue_size(), 0);
}

#[test]
fn test_resample_filter_rebuild_on_input_drift() {
  let session = common::install();

  let chunks = Arc::new(Mutex::new(Vec::new()));
  let encoder = collecting_encoder(chunks.clone());

  encoder
    .configure(&AudioEncoderConfig {
      codec: "opus".to_string(),
      sample_rate: Some(48_000),
      number_of_channels: Some(2),
      bitrate: Some(96_000),
      opus: None,
      flac: None,
    })
    .unwrap();

  // 100 ms of s16 interleaved at 44.1 kHz, in 25 ms slices
  for i in 0..4 {
    let data = audio(
      AudioSampleFormat::S16,
      44_100.0,
      1_102,
      2,
      i * 25_000,
    );
    encoder.encode(&data).unwrap();
  }
  // then 100 ms of f32 planar at 48 kHz
  for i in 0..5 {
    let data = audio(
      AudioSampleFormat::F32Planar,
      48_000.0,
      960,
      2,
      100_000 + i * 20_000,
    );
    encoder.encode(&data).unwrap();
  }
  encoder.flush().unwrap().wait().unwrap();

  // Exactly one rebuild of the resample graph
  assert_eq!(common::count(&session.log, "open_audio_filter:44100->48000"), 1);
  assert_eq!(common::count(&session.log, "open_audio_filter:48000->48000"), 1);

  // Output timestamps are continuous and strictly increasing across the
  // rebuild, derived from sample counts rather than input timestamps
  let chunks = chunks.lock().unwrap();
  assert!(chunks.len() > 2);
  assert_eq!(chunks[0].0, 0);
  for pair in chunks.windows(2) {
    assert!(pair[1].0 > pair[0].0, "timestamps went backwards: {pair:?}");
  }
}

#[test]
fn test_opus_packets_are_twenty_milliseconds() {
  let _session = common::install();

  let chunks = Arc::new(Mutex::new(Vec::new()));
  let encoder = collecting_encoder(chunks.clone());

  encoder
    .configure(&AudioEncoderConfig {
      codec: "opus".to_string(),
      sample_rate: Some(48_000),
      number_of_channels: Some(2),
      bitrate: None,
      opus: None,
      flac: None,
    })
    .unwrap();

  // 200 ms at the output rate feeds exactly ten 960-sample packets
  for i in 0..2 {
    let data = audio(
      AudioSampleFormat::F32,
      48_000.0,
      4_800,
      2,
      i * 100_000,
    );
    encoder.encode(&data).unwrap();
  }
  encoder.flush().unwrap().wait().unwrap();

  let chunks = chunks.lock().unwrap();
  assert_eq!(chunks.len(), 10);
  for (i, (timestamp, duration, _)) in chunks.iter().enumerate() {
    assert_eq!(*timestamp, i as i64 * 20_000);
    assert_eq!(*duration, Some(20_000));
  }
}

#[test]
fn test_detached_input_is_synchronous_type_error() {
  let _session = common::install();

  let encoder = collecting_encoder(Arc::new(Mutex::new(Vec::new())));
  encoder
    .configure(&AudioEncoderConfig {
      codec: "opus".to_string(),
      sample_rate: Some(48_000),
      number_of_channels: Some(2),
      bitrate: None,
      opus: None,
      flac: None,
    })
    .unwrap();

  let data = audio(AudioSampleFormat::F32, 48_000.0, 960, 2, 0);
  data.close();
  let result = encoder.encode(&data);
  assert!(matches!(result, Err(webcodecs_shim::Error::Type(_))));
  assert_eq!(encoder.encode_queue_size(), 0);
}

#[test]
fn test_opus_private_options_reach_backend() {
  let session = common::install();

  let encoder = collecting_encoder(Arc::new(Mutex::new(Vec::new())));
  encoder
    .configure(&AudioEncoderConfig {
      codec: "opus".to_string(),
      sample_rate: Some(48_000),
      number_of_channels: Some(2),
      bitrate: Some(64_000),
      opus: Some(webcodecs_shim::webcodecs::OpusEncoderConfig {
        frame_duration: Some(20_000),
        packetlossperc: Some(10),
        useinbandfec: Some(true),
        format: None,
      }),
      flac: None,
    })
    .unwrap();
  encoder.flush().unwrap().wait().unwrap();

  assert_eq!(common::count(&session.log, "frame_duration=20"), 1);
  assert_eq!(common::count(&session.log, "packet_loss=10"), 1);
  assert_eq!(common::count(&session.log, "fec=1"), 1);
}
