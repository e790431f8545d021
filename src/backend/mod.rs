//! Consumed codec-library interface
//!
//! The polyfill core calls into, but does not define, a native media codec
//! library. This module is that boundary: the `CodecLibrary` trait with its
//! handle traits, the owned exchange records (`Frame`, `Packet`), the
//! backend-native format enumerations, and the process-wide instance pool.

pub mod error;
pub mod frame;
pub mod library;
pub mod packet;
pub mod pool;
pub mod types;

pub use error::{BackendError, BackendResult};
pub use frame::Frame;
pub use library::{
  AudioFilterHandle, AudioFilterSpec, AudioStreamSpec, CodecLibrary, DecoderHandle, DecoderSetup,
  EncoderHandle, EncoderSetup, PictureSpec, ScalerHandle, ScalerSpec,
};
pub use packet::Packet;
pub use pool::{acquire, install, LibraryLease};
pub use types::{Crop, Fraction, PixelFormat, Rational, SampleFormat};
