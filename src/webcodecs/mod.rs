//! WebCodecs API surface
//!
//! Codec state machines, raw-media containers and encoded chunks following
//! the WebCodecs contract: serialized per-instance control queues, strict
//! lifecycle transitions, exclusive buffer ownership and DOMException-style
//! error classes.

mod audio_data;
mod audio_decoder;
mod audio_encoder;
pub mod codec_string;
mod control;
mod encoded_audio_chunk;
mod encoded_video_chunk;
mod environment;
pub mod error;
mod video_decoder;
mod video_encoder;
mod video_frame;

pub use audio_data::{AudioData, AudioDataCopyToOptions, AudioDataInit, AudioSampleFormat};
pub use audio_decoder::{
  AudioDataOutput, AudioDecoder, AudioDecoderInit, DequeueCallback, ErrorCallback,
};
pub use audio_encoder::{
  AudioDecoderConfigOutput, AudioEncoder, AudioEncoderInit, EncodedAudioChunkMetadata,
  EncodedAudioChunkOutput,
};
pub use control::{CodecState, FlushHandle};
pub use encoded_audio_chunk::{
  AudioDecoderConfig, AudioDecoderSupport, AudioEncoderConfig, AudioEncoderSupport,
  EncodedAudioChunk, EncodedAudioChunkInit, EncodedAudioChunkType, FlacEncoderConfig,
  OpusEncoderConfig,
};
pub use encoded_video_chunk::{
  EncodedVideoChunk, EncodedVideoChunkInit, EncodedVideoChunkType, VideoColorSpaceInit,
  VideoDecoderConfig, VideoDecoderSupport, VideoEncoderConfig, VideoEncoderSupport,
  VideoLatencyMode,
};
pub use environment::{
  resolve_environment, register_host_provider, CodecRequest, Environment, HostCodecProvider,
};
pub use error::Error;
pub use video_decoder::{VideoDecoder, VideoDecoderInit, VideoFrameOutput};
pub use video_encoder::{
  EncodedVideoChunkMetadata, EncodedVideoChunkOutput, VideoDecoderConfigOutput, VideoEncoder,
  VideoEncoderEncodeOptions, VideoEncoderInit,
};
pub use video_frame::{
  PlaneLayout, VideoFrame, VideoFrameBufferInit, VideoFrameCopyToOptions, VideoFrameInit,
  VideoFrameRect, VideoPixelFormat,
};
