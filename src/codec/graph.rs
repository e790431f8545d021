//! Audio resample/reformat filter graph
//!
//! Wraps the backend `aresample` graph as an input-keyed cache of size one:
//! the graph converts whatever the caller last submitted into the fixed
//! output the encoder was configured with. When the input drifts the owner
//! drains this graph and builds a new one.

use tracing::debug;

use crate::backend::{AudioFilterSpec, AudioStreamSpec, CodecLibrary, Frame};

use super::CodecResult;

/// One `aresample` graph from an observed input spec to a fixed output spec
pub struct AudioGraph {
  handle: Box<dyn crate::backend::AudioFilterHandle>,
  input: AudioStreamSpec,
}

impl AudioGraph {
  /// Build a graph converting `input` into `output`, emitting frames of
  /// `frame_size` samples (0 for unconstrained).
  pub fn open(
    library: &dyn CodecLibrary,
    input: AudioStreamSpec,
    output: AudioStreamSpec,
    frame_size: u32,
  ) -> CodecResult<Self> {
    let handle = library.open_audio_filter(&AudioFilterSpec {
      input,
      output,
      frame_size,
    })?;
    debug!(
      in_rate = input.sample_rate,
      out_rate = output.sample_rate,
      frame_size,
      "opened aresample graph"
    );
    Ok(Self { handle, input })
  }

  /// Whether `frame` still matches the input spec this graph was built for
  pub fn matches_input(&self, frame: &Frame) -> bool {
    frame.sample_format == Some(self.input.sample_format)
      && frame.channels == self.input.channels
      && frame.sample_rate == self.input.sample_rate
  }

  /// Push one frame through, returning zero or more converted frames
  pub fn push(&mut self, frame: &Frame) -> CodecResult<Vec<Frame>> {
    Ok(self.handle.push(frame)?)
  }

  /// Flush buffered samples; the final frame may be partial
  pub fn drain(&mut self) -> CodecResult<Vec<Frame>> {
    Ok(self.handle.drain()?)
  }
}
