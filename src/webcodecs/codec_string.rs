//! Codec string parser
//!
//! Maps WebCodecs codec identifiers (with their dot-separated
//! sub-parameters) onto backend codec names and initial context settings.
//! Unrecognized identifiers are a TypeError; recognized identifiers outside
//! the polyfill's coverage parse to `None` and surface as "not supported".

use crate::backend::{PixelFormat, SampleFormat};

use super::error::{type_error, Result};

/// Audio codec resolved from an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAudioCodec {
  /// Backend codec name
  pub backend: &'static str,
  /// Sample format the backend encoder wants on input
  pub sample_format: SampleFormat,
}

/// Video codec resolved from an identifier and its sub-parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVideoCodec {
  /// Backend codec name
  pub backend: &'static str,
  pub profile: Option<u8>,
  pub level: Option<u8>,
  pub bit_depth: Option<u8>,
  /// Chroma subsampling (420, 422, 444)
  pub chroma_subsampling: Option<u16>,
}

impl ParsedVideoCodec {
  fn new(backend: &'static str) -> Self {
    Self {
      backend,
      profile: None,
      level: None,
      bit_depth: None,
      chroma_subsampling: None,
    }
  }

  /// Pixel format selected by the bit-depth/subsampling sub-parameters
  pub fn pixel_format(&self) -> PixelFormat {
    let chroma = self.chroma_subsampling.unwrap_or(420);
    match (self.bit_depth.unwrap_or(8), chroma) {
      (10, 422) => PixelFormat::Yuv422p10le,
      (10, 444) => PixelFormat::Yuv444p10le,
      (10, _) => PixelFormat::Yuv420p10le,
      (12, 422) => PixelFormat::Yuv422p12le,
      (12, 444) => PixelFormat::Yuv444p12le,
      (12, _) => PixelFormat::Yuv420p12le,
      (_, 422) => PixelFormat::Yuv422p,
      (_, 444) => PixelFormat::Yuv444p,
      _ => PixelFormat::Yuv420p,
    }
  }

  /// Codec-private options carrying profile and level to the backend
  pub fn options(&self) -> Vec<(String, String)> {
    let mut options = Vec::new();
    if let Some(profile) = self.profile {
      options.push(("profile".to_string(), profile.to_string()));
    }
    if let Some(level) = self.level {
      options.push(("level".to_string(), level.to_string()));
    }
    options
  }
}

/// Parse an audio codec identifier.
///
/// `Ok(None)` means recognized but outside coverage.
pub fn parse_audio_codec_string(codec: &str) -> Result<Option<ParsedAudioCodec>> {
  let lower = codec.to_ascii_lowercase();
  match lower.as_str() {
    "flac" => Ok(Some(ParsedAudioCodec {
      backend: "flac",
      sample_format: SampleFormat::S32,
    })),
    "opus" => Ok(Some(ParsedAudioCodec {
      backend: "libopus",
      sample_format: SampleFormat::Flt,
    })),
    "vorbis" => Ok(Some(ParsedAudioCodec {
      backend: "libvorbis",
      sample_format: SampleFormat::Fltp,
    })),
    // MPEG-family identifiers parse but are not covered
    "mp3" | "aac" | "alac" | "ac3" | "ac-3" => Ok(None),
    _ if lower.starts_with("mp4a") => Ok(None),
    _ if lower.starts_with("pcm-") => Ok(None),
    _ => Err(type_error(&format!("unknown audio codec: {}", codec))),
  }
}

/// Parse a video codec identifier with its sub-parameters.
///
/// `Ok(None)` means recognized but outside coverage.
pub fn parse_video_codec_string(codec: &str) -> Result<Option<ParsedVideoCodec>> {
  let lower = codec.to_ascii_lowercase();

  if lower == "vp8" {
    return Ok(Some(ParsedVideoCodec::new("libvpx")));
  }
  if lower == "vp09" || lower.starts_with("vp09.") {
    return Ok(Some(parse_vp9(codec)));
  }
  if lower == "av01" || lower.starts_with("av01.") {
    return Ok(Some(parse_av1(codec)));
  }

  // MPEG-family identifiers parse but are not covered
  if lower.starts_with("avc1")
    || lower.starts_with("avc3")
    || lower.starts_with("hev1")
    || lower.starts_with("hvc1")
    || lower.starts_with("mp4v")
  {
    return Ok(None);
  }

  Err(type_error(&format!("unknown video codec: {}", codec)))
}

/// VP9: vp09.PP.LL.DD.CC…
/// - PP: profile (00-03)
/// - LL: level (10-62)
/// - DD: bit depth (08, 10, 12)
/// - CC: chroma subsampling (00=420, 01=422, 02=444, 03=440)
fn parse_vp9(codec: &str) -> ParsedVideoCodec {
  let parts: Vec<&str> = codec.split('.').collect();
  let mut parsed = ParsedVideoCodec::new("libvpx-vp9");

  if let Some(profile) = parts.get(1).and_then(|p| p.parse::<u8>().ok()) {
    parsed.profile = Some(profile);
  }
  if let Some(level) = parts.get(2).and_then(|p| p.parse::<u8>().ok()) {
    parsed.level = Some(level);
  }
  if let Some(depth) = parts.get(3).and_then(|p| p.parse::<u8>().ok()) {
    parsed.bit_depth = Some(depth);
  }
  match parts.get(4).copied() {
    Some("00") => parsed.chroma_subsampling = Some(420),
    Some("01") => parsed.chroma_subsampling = Some(422),
    Some("02") => parsed.chroma_subsampling = Some(444),
    Some("03") => parsed.chroma_subsampling = Some(440),
    _ => {}
  }

  parsed
}

/// AV1: av01.P.LLT.DD.M.CCC…
/// - P: profile (0=Main, 1=High, 2=Professional)
/// - LLT: level index plus tier letter ("04M")
/// - DD: bit depth (08, 10, 12)
/// - M: monochrome flag
/// - CCC: chroma subsampling (110=420, 100=422, 000=444)
fn parse_av1(codec: &str) -> ParsedVideoCodec {
  let parts: Vec<&str> = codec.split('.').collect();
  let mut parsed = ParsedVideoCodec::new("libaom-av1");

  if let Some(profile) = parts.get(1).and_then(|p| p.parse::<u8>().ok()) {
    parsed.profile = Some(profile);
  }
  if let Some(level_tier) = parts.get(2) {
    let digits: String = level_tier
      .chars()
      .take_while(|c| c.is_ascii_digit())
      .collect();
    if let Ok(level) = digits.parse::<u8>() {
      parsed.level = Some(level);
    }
  }
  if let Some(depth) = parts.get(3).and_then(|p| p.parse::<u8>().ok()) {
    parsed.bit_depth = Some(depth);
  }
  match parts.get(5).copied() {
    Some("110") => parsed.chroma_subsampling = Some(420),
    Some("100") => parsed.chroma_subsampling = Some(422),
    Some("000") => parsed.chroma_subsampling = Some(444),
    _ => {}
  }

  parsed
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_audio_table() {
    let flac = parse_audio_codec_string("flac").unwrap().unwrap();
    assert_eq!(flac.backend, "flac");
    assert_eq!(flac.sample_format, SampleFormat::S32);

    let opus = parse_audio_codec_string("opus").unwrap().unwrap();
    assert_eq!(opus.backend, "libopus");
    assert_eq!(opus.sample_format, SampleFormat::Flt);

    let vorbis = parse_audio_codec_string("vorbis").unwrap().unwrap();
    assert_eq!(vorbis.backend, "libvorbis");
    assert_eq!(vorbis.sample_format, SampleFormat::Fltp);
  }

  #[test]
  fn test_audio_mpeg_family_not_supported() {
    assert!(parse_audio_codec_string("mp3").unwrap().is_none());
    assert!(parse_audio_codec_string("mp4a.40.2").unwrap().is_none());
  }

  #[test]
  fn test_audio_unknown_is_type_error() {
    assert!(parse_audio_codec_string("speex").is_err());
  }

  #[test]
  fn test_parse_vp8() {
    let parsed = parse_video_codec_string("vp8").unwrap().unwrap();
    assert_eq!(parsed.backend, "libvpx");
    assert_eq!(parsed.pixel_format(), PixelFormat::Yuv420p);
  }

  #[test]
  fn test_parse_vp9_full() {
    let parsed = parse_video_codec_string("vp09.00.10.08.00")
      .unwrap()
      .unwrap();
    assert_eq!(parsed.backend, "libvpx-vp9");
    assert_eq!(parsed.profile, Some(0));
    assert_eq!(parsed.level, Some(10));
    assert_eq!(parsed.bit_depth, Some(8));
    assert_eq!(parsed.chroma_subsampling, Some(420));
    assert_eq!(parsed.pixel_format(), PixelFormat::Yuv420p);
  }

  #[test]
  fn test_parse_vp9_ten_bit() {
    let parsed = parse_video_codec_string("vp09.02.10.10.01")
      .unwrap()
      .unwrap();
    assert_eq!(parsed.pixel_format(), PixelFormat::Yuv422p10le);
  }

  #[test]
  fn test_parse_av1_full() {
    let parsed = parse_video_codec_string("av01.0.04M.10.0.110")
      .unwrap()
      .unwrap();
    assert_eq!(parsed.backend, "libaom-av1");
    assert_eq!(parsed.profile, Some(0));
    assert_eq!(parsed.level, Some(4));
    assert_eq!(parsed.bit_depth, Some(10));
    assert_eq!(parsed.chroma_subsampling, Some(420));
    assert_eq!(parsed.pixel_format(), PixelFormat::Yuv420p10le);
  }

  #[test]
  fn test_parse_bare_identifiers() {
    let vp9 = parse_video_codec_string("vp09").unwrap().unwrap();
    assert_eq!(vp9.backend, "libvpx-vp9");
    assert_eq!(vp9.pixel_format(), PixelFormat::Yuv420p);

    let av1 = parse_video_codec_string("av01").unwrap().unwrap();
    assert_eq!(av1.backend, "libaom-av1");
    assert!(av1.options().is_empty());
  }

  #[test]
  fn test_video_mpeg_family_not_supported() {
    assert!(parse_video_codec_string("avc1.42001f").unwrap().is_none());
    assert!(parse_video_codec_string("hev1.1.6.L120.B0").unwrap().is_none());
  }

  #[test]
  fn test_video_unknown_is_type_error() {
    assert!(parse_video_codec_string("theora").is_err());
  }
}
