//! Rescaler context
//!
//! Wraps the backend scale context as an input-keyed cache of size one,
//! converting frames into the encoder's configured geometry and pixel
//! format. Rebuilt by the owner when the input drifts.

use tracing::debug;

use crate::backend::{CodecLibrary, Frame, PictureSpec, ScalerSpec};

use super::CodecResult;

/// One rescale context from a fixed input spec to a fixed output spec
pub struct Scaler {
  handle: Box<dyn crate::backend::ScalerHandle>,
  input: PictureSpec,
  output: PictureSpec,
}

impl Scaler {
  pub fn open(
    library: &dyn CodecLibrary,
    input: PictureSpec,
    output: PictureSpec,
  ) -> CodecResult<Self> {
    let handle = library.open_scaler(&ScalerSpec { input, output })?;
    debug!(
      src = ?(input.width, input.height, input.pixel_format),
      dst = ?(output.width, output.height, output.pixel_format),
      "opened rescaler"
    );
    Ok(Self {
      handle,
      input,
      output,
    })
  }

  /// Whether `frame` still matches the input spec this scaler was built for
  pub fn matches_input(&self, frame: &Frame) -> bool {
    frame.width == self.input.width
      && frame.height == self.input.height
      && frame.pixel_format == Some(self.input.pixel_format)
  }

  pub fn output(&self) -> PictureSpec {
    self.output
  }

  /// Rescale one frame, carrying pts, key-frame flag and aspect ratio over
  pub fn scale(&mut self, src: &Frame) -> CodecResult<Frame> {
    let mut dst = self.handle.scale(src)?;
    dst.pts = src.pts;
    dst.duration = src.duration;
    dst.key_frame = src.key_frame;
    dst.sample_aspect = src.sample_aspect;
    Ok(dst)
  }
}
