#![deny(clippy::all)]

//! WebCodecs API surface for Rust
//!
//! This crate reproduces the WebCodecs contract - codec lifecycle, queueing,
//! ordering and error semantics - on top of a host-provided native media
//! library reached through the `backend` interface.

// Consumed codec-library interface (traits, exchange records, instance pool)
pub mod backend;

// Safe codec wrappers over backend handles
pub mod codec;

// WebCodecs API surface
pub mod webcodecs;

// Re-export WebCodecs types at crate root
pub use webcodecs::{
  // Environment selection
  resolve_environment,
  // Audio types
  AudioData,
  AudioDataCopyToOptions,
  AudioDataInit,
  AudioDecoder,
  AudioDecoderConfig,
  AudioDecoderInit,
  AudioDecoderSupport,
  AudioEncoder,
  AudioEncoderConfig,
  AudioEncoderInit,
  AudioEncoderSupport,
  AudioSampleFormat,
  CodecState,
  EncodedAudioChunk,
  EncodedAudioChunkInit,
  EncodedAudioChunkMetadata,
  EncodedAudioChunkType,
  EncodedVideoChunk,
  EncodedVideoChunkInit,
  EncodedVideoChunkMetadata,
  EncodedVideoChunkType,
  Environment,
  Error,
  FlushHandle,
  // Video types
  VideoDecoder,
  VideoDecoderConfig,
  VideoDecoderInit,
  VideoDecoderSupport,
  VideoEncoder,
  VideoEncoderConfig,
  VideoEncoderEncodeOptions,
  VideoEncoderInit,
  VideoEncoderSupport,
  VideoFrame,
  VideoFrameBufferInit,
  VideoFrameCopyToOptions,
  VideoFrameInit,
  VideoFrameRect,
  VideoLatencyMode,
  VideoPixelFormat,
};
