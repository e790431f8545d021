//! Environment resolver
//!
//! Selects, per configuration, whether a host-provided codec implementation
//! or this polyfill handles the work. The resolved environment is a
//! consistent triple - codec class, encoded-chunk class and raw-media class
//! are always drawn from the same side, never mixed.

use std::sync::{Arc, OnceLock, RwLock};

use super::error::{not_supported_error, Result};
use super::{
  AudioDecoder, AudioDecoderConfig, AudioEncoder, AudioEncoderConfig, VideoDecoder,
  VideoDecoderConfig, VideoEncoder, VideoEncoderConfig,
};

/// Which side serves a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
  /// A registered host implementation claims this configuration
  Host,
  /// This polyfill serves it
  Polyfill,
}

/// One codec request, by kind
#[derive(Debug, Clone)]
pub enum CodecRequest<'a> {
  AudioDecoder(&'a AudioDecoderConfig),
  AudioEncoder(&'a AudioEncoderConfig),
  VideoDecoder(&'a VideoDecoderConfig),
  VideoEncoder(&'a VideoEncoderConfig),
}

/// A host-provided WebCodecs implementation
pub trait HostCodecProvider: Send + Sync {
  /// Whether the host serves this configuration
  fn supports(&self, request: &CodecRequest<'_>) -> bool;
}

static HOST: OnceLock<RwLock<Option<Arc<dyn HostCodecProvider>>>> = OnceLock::new();

fn host() -> &'static RwLock<Option<Arc<dyn HostCodecProvider>>> {
  HOST.get_or_init(|| RwLock::new(None))
}

/// Register (or clear) the host implementation consulted before the polyfill
pub fn register_host_provider(provider: Option<Arc<dyn HostCodecProvider>>) {
  if let Ok(mut slot) = host().write() {
    *slot = provider;
  }
}

/// Resolve the environment serving `request`: the host when it claims the
/// configuration, otherwise the polyfill when its probe succeeds.
pub fn resolve_environment(request: &CodecRequest<'_>) -> Result<Environment> {
  if let Ok(slot) = host().read() {
    if let Some(provider) = slot.as_ref() {
      if provider.supports(request) {
        return Ok(Environment::Host);
      }
    }
  }

  let supported = match request {
    CodecRequest::AudioDecoder(config) => {
      AudioDecoder::is_config_supported(config).map(|s| s.supported)
    }
    CodecRequest::AudioEncoder(config) => {
      AudioEncoder::is_config_supported(config).map(|s| s.supported)
    }
    CodecRequest::VideoDecoder(config) => {
      VideoDecoder::is_config_supported(config).map(|s| s.supported)
    }
    CodecRequest::VideoEncoder(config) => {
      VideoEncoder::is_config_supported(config).map(|s| s.supported)
    }
  }
  .unwrap_or(false);

  if supported {
    Ok(Environment::Polyfill)
  } else {
    Err(not_supported_error(
      "no environment supports this configuration",
    ))
  }
}
