//! Compressed packet exchange record

/// One compressed packet, as produced by encoders and consumed by decoders
#[derive(Debug, Clone, Default)]
pub struct Packet {
  /// Owned payload bytes
  pub data: Vec<u8>,
  /// Presentation timestamp in the owning context's time base
  pub pts: i64,
  /// Duration in the same time base, 0 when unknown
  pub duration: i64,
  /// Sync-point flag
  pub key: bool,
}

impl Packet {
  pub fn new(data: Vec<u8>, pts: i64) -> Self {
    Self {
      data,
      pts,
      ..Self::default()
    }
  }

  pub fn byte_length(&self) -> usize {
    self.data.len()
  }
}
