//! VideoFrame - uncompressed video container
//!
//! Owns the pixel bytes it is constructed over together with a per-plane
//! layout (offset + stride into the buffer). Geometry is split three ways:
//! the coded rect (full pixel grid), the visible rect (presentation
//! sub-rectangle) and the display size (on-screen dimensions, differing
//! from the visible size when pixels are non-square).

use std::sync::Mutex;

use crate::backend::{self, Fraction, PixelFormat};

use super::error::{invalid_state_error, not_supported_error, range_error, type_error, Result};

/// Video pixel format (WebCodecs identifiers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPixelFormat {
  /// Planar YUV 4:2:0
  I420,
  /// Planar YUV 4:2:0 with alpha
  I420A,
  /// Planar YUV 4:2:2
  I422,
  /// Planar YUV 4:2:2 with alpha
  I422A,
  /// Planar YUV 4:4:4
  I444,
  /// Planar YUV 4:4:4 with alpha
  I444A,
  /// Planar YUV 4:2:0, 10-bit
  I420P10,
  /// Planar YUV 4:2:0, 10-bit, with alpha
  I420AP10,
  /// Planar YUV 4:2:2, 10-bit
  I422P10,
  /// Planar YUV 4:2:2, 10-bit, with alpha
  I422AP10,
  /// Planar YUV 4:4:4, 10-bit
  I444P10,
  /// Planar YUV 4:4:4, 10-bit, with alpha
  I444AP10,
  /// Planar YUV 4:2:0, 12-bit
  I420P12,
  /// Planar YUV 4:2:2, 12-bit
  I422P12,
  /// Planar YUV 4:4:4, 12-bit
  I444P12,
  /// Semi-planar YUV 4:2:0 (luma plane + interleaved chroma plane)
  NV12,
  RGBA,
  /// RGBA with the alpha byte ignored
  RGBX,
  BGRA,
  /// BGRA with the alpha byte ignored
  BGRX,
}

impl VideoPixelFormat {
  /// Map from the backend pixel format
  pub fn from_backend(format: PixelFormat) -> Result<Self> {
    match format {
      PixelFormat::Yuv420p => Ok(VideoPixelFormat::I420),
      PixelFormat::Yuva420p => Ok(VideoPixelFormat::I420A),
      PixelFormat::Yuv422p => Ok(VideoPixelFormat::I422),
      PixelFormat::Yuva422p => Ok(VideoPixelFormat::I422A),
      PixelFormat::Yuv444p => Ok(VideoPixelFormat::I444),
      PixelFormat::Yuva444p => Ok(VideoPixelFormat::I444A),
      PixelFormat::Yuv420p10le => Ok(VideoPixelFormat::I420P10),
      PixelFormat::Yuva420p10le => Ok(VideoPixelFormat::I420AP10),
      PixelFormat::Yuv422p10le => Ok(VideoPixelFormat::I422P10),
      PixelFormat::Yuva422p10le => Ok(VideoPixelFormat::I422AP10),
      PixelFormat::Yuv444p10le => Ok(VideoPixelFormat::I444P10),
      PixelFormat::Yuva444p10le => Ok(VideoPixelFormat::I444AP10),
      PixelFormat::Yuv420p12le => Ok(VideoPixelFormat::I420P12),
      PixelFormat::Yuv422p12le => Ok(VideoPixelFormat::I422P12),
      PixelFormat::Yuv444p12le => Ok(VideoPixelFormat::I444P12),
      PixelFormat::Nv12 => Ok(VideoPixelFormat::NV12),
      PixelFormat::Rgba => Ok(VideoPixelFormat::RGBA),
      PixelFormat::Rgb0 => Ok(VideoPixelFormat::RGBX),
      PixelFormat::Bgra => Ok(VideoPixelFormat::BGRA),
      PixelFormat::Bgr0 => Ok(VideoPixelFormat::BGRX),
    }
  }

  /// Map to the backend pixel format
  pub fn to_backend(&self) -> PixelFormat {
    match self {
      VideoPixelFormat::I420 => PixelFormat::Yuv420p,
      VideoPixelFormat::I420A => PixelFormat::Yuva420p,
      VideoPixelFormat::I422 => PixelFormat::Yuv422p,
      VideoPixelFormat::I422A => PixelFormat::Yuva422p,
      VideoPixelFormat::I444 => PixelFormat::Yuv444p,
      VideoPixelFormat::I444A => PixelFormat::Yuva444p,
      VideoPixelFormat::I420P10 => PixelFormat::Yuv420p10le,
      VideoPixelFormat::I420AP10 => PixelFormat::Yuva420p10le,
      VideoPixelFormat::I422P10 => PixelFormat::Yuv422p10le,
      VideoPixelFormat::I422AP10 => PixelFormat::Yuva422p10le,
      VideoPixelFormat::I444P10 => PixelFormat::Yuv444p10le,
      VideoPixelFormat::I444AP10 => PixelFormat::Yuva444p10le,
      VideoPixelFormat::I420P12 => PixelFormat::Yuv420p12le,
      VideoPixelFormat::I422P12 => PixelFormat::Yuv422p12le,
      VideoPixelFormat::I444P12 => PixelFormat::Yuv444p12le,
      VideoPixelFormat::NV12 => PixelFormat::Nv12,
      VideoPixelFormat::RGBA => PixelFormat::Rgba,
      VideoPixelFormat::RGBX => PixelFormat::Rgb0,
      VideoPixelFormat::BGRA => PixelFormat::Bgra,
      VideoPixelFormat::BGRX => PixelFormat::Bgr0,
    }
  }

  /// Number of planes (1 packed RGB, 2 NV12, 3 YUV, 4 YUV + alpha)
  pub fn plane_count(&self) -> usize {
    self.to_backend().plane_count()
  }

  /// Bytes covering one sample position of plane `plane`
  pub fn bytes_per_sample(&self, plane: usize) -> usize {
    self.to_backend().bytes_per_sample(plane)
  }

  /// Horizontal subsampling factor of plane `plane`
  pub fn horizontal_sub(&self, plane: usize) -> u32 {
    self.to_backend().horizontal_sub(plane)
  }

  /// Vertical subsampling factor of plane `plane`
  pub fn vertical_sub(&self, plane: usize) -> u32 {
    self.to_backend().vertical_sub(plane)
  }
}

/// Rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrameRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// One plane's position inside the pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
  /// Byte offset of the plane's first row
  pub offset: usize,
  /// Bytes between consecutive rows, at least the effective row width
  pub stride: usize,
}

/// Init record for constructing a VideoFrame over a pixel buffer
#[derive(Debug, Clone)]
pub struct VideoFrameBufferInit {
  pub format: VideoPixelFormat,
  pub coded_width: u32,
  pub coded_height: u32,
  /// Timestamp in microseconds
  pub timestamp: i64,
  /// Duration in microseconds
  pub duration: Option<i64>,
  /// Per-plane layout; tight-packed when absent
  pub layout: Option<Vec<PlaneLayout>>,
  pub visible_rect: Option<VideoFrameRect>,
  pub display_width: Option<u32>,
  pub display_height: Option<u32>,
  /// Pixel bytes, owned
  pub data: Vec<u8>,
  /// Adopt the buffer whole instead of slicing it to the plane region
  pub transfer: bool,
}

/// Attribute overrides when constructing from an existing frame
#[derive(Debug, Clone, Default)]
pub struct VideoFrameInit {
  pub timestamp: Option<i64>,
  pub duration: Option<i64>,
  pub visible_rect: Option<VideoFrameRect>,
  pub display_width: Option<u32>,
  pub display_height: Option<u32>,
}

/// Options for `allocation_size` / `copy_to`
#[derive(Debug, Clone, Default)]
pub struct VideoFrameCopyToOptions {
  /// Source rectangle; the visible rect when absent
  pub rect: Option<VideoFrameRect>,
  /// Destination plane layout; tight-packed in plane order when absent
  pub layout: Option<Vec<PlaneLayout>>,
}

struct VideoFrameInner {
  format: VideoPixelFormat,
  coded_width: u32,
  coded_height: u32,
  visible: VideoFrameRect,
  display_width: u32,
  display_height: u32,
  layout: Vec<PlaneLayout>,
  data: Vec<u8>,
}

/// Uncompressed video, exclusively owning its pixel buffer
pub struct VideoFrame {
  inner: Mutex<Option<VideoFrameInner>>,
  // Preserved after close
  timestamp_us: i64,
  duration_us: Option<i64>,
}

/// Per-plane copy window resolved from the options
struct PlaneCopy {
  dest_offset: usize,
  dest_stride: usize,
  source_top: usize,
  source_height: usize,
  source_left_bytes: usize,
  source_width_bytes: usize,
}

impl VideoFrame {
  /// Construct from a pixel buffer and an init record
  pub fn new(init: VideoFrameBufferInit) -> Result<Self> {
    if init.coded_width == 0 || init.coded_height == 0 {
      return Err(type_error("codedWidth and codedHeight must be nonzero"));
    }

    let format = init.format;
    let layout = Self::resolve_layout(
      format,
      init.coded_width,
      init.coded_height,
      init.layout.as_deref(),
      init.data.len(),
    )?;

    let coded = VideoFrameRect {
      x: 0,
      y: 0,
      width: init.coded_width,
      height: init.coded_height,
    };
    let visible = match init.visible_rect {
      Some(rect) => {
        Self::check_rect(format, &rect, &coded)?;
        rect
      }
      None => coded,
    };

    let (display_width, display_height) = match (init.display_width, init.display_height) {
      (Some(w), Some(h)) => {
        if w == 0 || h == 0 {
          return Err(type_error("displayWidth and displayHeight must be nonzero"));
        }
        (w, h)
      }
      (None, None) => (visible.width, visible.height),
      _ => {
        return Err(type_error(
          "displayWidth and displayHeight must be given together",
        ));
      }
    };

    // Without a transfer only the bytes covering the plane rows are
    // retained; offsets are rebased onto the slice.
    let (data, layout) = if init.transfer {
      (init.data, layout)
    } else {
      Self::slice_to_planes(init.data, &layout, format, init.coded_height)
    };

    Ok(Self {
      inner: Mutex::new(Some(VideoFrameInner {
        format,
        coded_width: init.coded_width,
        coded_height: init.coded_height,
        visible,
        display_width,
        display_height,
        layout,
        data,
      })),
      timestamp_us: init.timestamp,
      duration_us: init.duration,
    })
  }

  /// Construct from an existing frame, reallocating and copying the pixels
  /// and inheriting attributes with init overrides.
  pub fn from_frame(source: &VideoFrame, init: &VideoFrameInit) -> Result<Self> {
    let guard = source.lock();
    let inner = guard
      .as_ref()
      .ok_or_else(|| invalid_state_error("VideoFrame is closed"))?;

    let coded = VideoFrameRect {
      x: 0,
      y: 0,
      width: inner.coded_width,
      height: inner.coded_height,
    };
    let visible = match init.visible_rect {
      Some(rect) => {
        Self::check_rect(inner.format, &rect, &coded)?;
        rect
      }
      None => inner.visible,
    };
    let (display_width, display_height) = match (init.display_width, init.display_height) {
      (Some(w), Some(h)) => {
        if w == 0 || h == 0 {
          return Err(type_error("displayWidth and displayHeight must be nonzero"));
        }
        (w, h)
      }
      (None, None) => (inner.display_width, inner.display_height),
      _ => {
        return Err(type_error(
          "displayWidth and displayHeight must be given together",
        ));
      }
    };

    Ok(Self {
      inner: Mutex::new(Some(VideoFrameInner {
        format: inner.format,
        coded_width: inner.coded_width,
        coded_height: inner.coded_height,
        visible,
        display_width,
        display_height,
        layout: inner.layout.clone(),
        data: inner.data.clone(),
      })),
      timestamp_us: init.timestamp.unwrap_or(source.timestamp_us),
      duration_us: init.duration.or(source.duration_us),
    })
  }

  /// Construct from a rasterized RGBA image at its intrinsic dimensions
  ///
  /// The rasterization itself is the caller's concern; this is the byte
  /// entry point: format RGBA with a single tight plane.
  pub fn from_rgba_image(width: u32, height: u32, data: Vec<u8>, timestamp: i64) -> Result<Self> {
    Self::new(VideoFrameBufferInit {
      format: VideoPixelFormat::RGBA,
      coded_width: width,
      coded_height: height,
      timestamp,
      duration: None,
      layout: Some(vec![PlaneLayout {
        offset: 0,
        stride: width as usize * 4,
      }]),
      visible_rect: None,
      display_width: None,
      display_height: None,
      data,
      transfer: true,
    })
  }

  /// Wrap a decoded backend frame (decoder output path)
  ///
  /// `display_aspect` overrides the SAR-derived display size by widening
  /// one dimension until the requested ratio holds.
  pub(crate) fn from_backend_frame(
    frame: &backend::Frame,
    timestamp_us: i64,
    display_aspect: Option<Fraction>,
  ) -> Result<Self> {
    let backend_format = frame
      .pixel_format
      .ok_or_else(|| not_supported_error("backend frame carries no pixel format"))?;
    let format = VideoPixelFormat::from_backend(backend_format)?;

    // Concatenate the planes into one buffer, keeping backend strides
    let mut layout = Vec::with_capacity(frame.planes.len());
    let mut data = Vec::new();
    for (i, plane) in frame.planes.iter().enumerate() {
      layout.push(PlaneLayout {
        offset: data.len(),
        stride: frame.strides.get(i).copied().unwrap_or(plane.len()),
      });
      data.extend_from_slice(plane);
    }

    let coded = VideoFrameRect {
      x: 0,
      y: 0,
      width: frame.width,
      height: frame.height,
    };
    let visible = match frame.crop {
      Some(crop)
        if crop.left + crop.right < frame.width && crop.top + crop.bottom < frame.height =>
      {
        VideoFrameRect {
          x: crop.left,
          y: crop.top,
          width: frame.width - crop.left - crop.right,
          height: frame.height - crop.top - crop.bottom,
        }
      }
      _ => coded,
    };

    // A sample aspect ratio stretches one display dimension
    let (mut display_width, mut display_height) = (visible.width, visible.height);
    if let Some(sar) = frame.sample_aspect {
      if sar.num != 0 && sar.den != 0 {
        if sar.num > sar.den {
          display_width = (visible.width as u64 * sar.num / sar.den) as u32;
        } else {
          display_height = (visible.height as u64 * sar.den / sar.num) as u32;
        }
      }
    }
    if let Some(aspect) = display_aspect {
      if aspect.num != 0 && aspect.den != 0 {
        if visible.width as u64 * aspect.den >= visible.height as u64 * aspect.num {
          display_width = visible.width;
          display_height = (visible.width as u64 * aspect.den / aspect.num) as u32;
        } else {
          display_width = (visible.height as u64 * aspect.num / aspect.den) as u32;
          display_height = visible.height;
        }
      }
    }

    Ok(Self {
      inner: Mutex::new(Some(VideoFrameInner {
        format,
        coded_width: frame.width,
        coded_height: frame.height,
        visible,
        display_width,
        display_height,
        layout,
        data,
      })),
      timestamp_us,
      duration_us: (frame.duration > 0).then_some(frame.duration),
    })
  }

  /// Build a backend frame over these pixels (encoder input path).
  ///
  /// The caller assigns pts and key-frame flags in its own time base.
  pub(crate) fn to_backend_frame(&self) -> Result<backend::Frame> {
    let guard = self.lock();
    let inner = guard
      .as_ref()
      .ok_or_else(|| invalid_state_error("VideoFrame is closed"))?;

    let format = inner.format.to_backend();
    let mut planes = Vec::with_capacity(inner.layout.len());
    let mut strides = Vec::with_capacity(inner.layout.len());
    for (i, plane) in inner.layout.iter().enumerate() {
      let rows = format.plane_rows(i, inner.coded_height);
      let span = plane.stride * rows;
      planes.push(inner.data[plane.offset..plane.offset + span].to_vec());
      strides.push(plane.stride);
    }

    Ok(backend::Frame {
      planes,
      strides,
      width: inner.coded_width,
      height: inner.coded_height,
      pixel_format: Some(format),
      ..backend::Frame::default()
    })
  }

  /// Non-square-pixel sample aspect ratio, when display and visible sizes
  /// differ
  pub fn sample_aspect(&self) -> Option<Fraction> {
    let guard = self.lock();
    let inner = guard.as_ref()?;
    if inner.display_width == inner.visible.width && inner.display_height == inner.visible.height {
      return None;
    }
    Some(Fraction::new(
      inner.display_width as u64 * inner.visible.height as u64,
      inner.display_height as u64 * inner.visible.width as u64,
    ))
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Option<VideoFrameInner>> {
    match self.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  /// Validate a rect against the coded grid; only the origin must be
  /// aligned to the per-plane subsampling
  fn check_rect(
    format: VideoPixelFormat,
    rect: &VideoFrameRect,
    coded: &VideoFrameRect,
  ) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
      return Err(type_error("rect must have nonzero dimensions"));
    }
    let right = rect.x.checked_add(rect.width);
    let bottom = rect.y.checked_add(rect.height);
    match (right, bottom) {
      (Some(r), Some(b)) if r <= coded.width && b <= coded.height => {}
      _ => return Err(type_error("rect does not fit inside the coded rect")),
    }
    for plane in 0..format.plane_count() {
      let hsub = format.horizontal_sub(plane);
      let vsub = format.vertical_sub(plane);
      if rect.x % hsub != 0 || rect.y % vsub != 0 {
        return Err(type_error(
          "rect origin is not aligned to the plane subsampling",
        ));
      }
    }
    Ok(())
  }

  /// Accept the caller's layout or compute a tight-packed one, validating
  /// that every plane's rows fit the buffer and that planes do not overlap.
  fn resolve_layout(
    format: VideoPixelFormat,
    coded_width: u32,
    coded_height: u32,
    layout: Option<&[PlaneLayout]>,
    data_len: usize,
  ) -> Result<Vec<PlaneLayout>> {
    let plane_count = format.plane_count();
    let resolved = match layout {
      Some(layout) => {
        if layout.len() != plane_count {
          return Err(type_error(&format!(
            "layout must describe {} planes, got {}",
            plane_count,
            layout.len()
          )));
        }
        layout.to_vec()
      }
      None => {
        let mut offset = 0usize;
        let mut planes = Vec::with_capacity(plane_count);
        for i in 0..plane_count {
          let stride = format.to_backend().row_bytes(i, coded_width);
          planes.push(PlaneLayout { offset, stride });
          offset += stride * format.to_backend().plane_rows(i, coded_height);
        }
        planes
      }
    };

    let mut spans = Vec::with_capacity(plane_count);
    for (i, plane) in resolved.iter().enumerate() {
      let min_row = format.to_backend().row_bytes(i, coded_width);
      if plane.stride < min_row {
        return Err(type_error(&format!(
          "plane {} stride {} is below the row width {}",
          i, plane.stride, min_row
        )));
      }
      let rows = format.to_backend().plane_rows(i, coded_height);
      let span = plane
        .stride
        .checked_mul(rows)
        .and_then(|s| s.checked_add(plane.offset));
      match span {
        Some(end) if end <= data_len => spans.push((plane.offset, end)),
        _ => {
          return Err(type_error(&format!(
            "plane {} does not fit inside the {} byte buffer",
            i, data_len
          )));
        }
      }
    }

    for (i, a) in spans.iter().enumerate() {
      for b in spans.iter().skip(i + 1) {
        if a.0 < b.1 && b.0 < a.1 {
          return Err(type_error("plane layouts overlap"));
        }
      }
    }

    Ok(resolved)
  }

  /// Slice the buffer to the region covering all plane rows and rebase the
  /// offsets onto it
  fn slice_to_planes(
    data: Vec<u8>,
    layout: &[PlaneLayout],
    format: VideoPixelFormat,
    coded_height: u32,
  ) -> (Vec<u8>, Vec<PlaneLayout>) {
    let backend = format.to_backend();
    let mut low = usize::MAX;
    let mut high = 0usize;
    for (i, plane) in layout.iter().enumerate() {
      low = low.min(plane.offset);
      high = high.max(plane.offset + plane.stride * backend.plane_rows(i, coded_height));
    }
    let sliced = data[low..high].to_vec();
    let rebased = layout
      .iter()
      .map(|plane| PlaneLayout {
        offset: plane.offset - low,
        stride: plane.stride,
      })
      .collect();
    (sliced, rebased)
  }

  // ========================================================================
  // Properties
  // ========================================================================

  /// Pixel format, `None` once closed
  pub fn format(&self) -> Option<VideoPixelFormat> {
    self.lock().as_ref().map(|i| i.format)
  }

  /// Coded width in pixels, 0 once closed
  pub fn coded_width(&self) -> u32 {
    self.lock().as_ref().map_or(0, |i| i.coded_width)
  }

  /// Coded height in pixels, 0 once closed
  pub fn coded_height(&self) -> u32 {
    self.lock().as_ref().map_or(0, |i| i.coded_height)
  }

  /// The full coded pixel grid as a rect
  pub fn coded_rect(&self) -> Option<VideoFrameRect> {
    self.lock().as_ref().map(|i| VideoFrameRect {
      x: 0,
      y: 0,
      width: i.coded_width,
      height: i.coded_height,
    })
  }

  /// The presentation sub-rectangle
  pub fn visible_rect(&self) -> Option<VideoFrameRect> {
    self.lock().as_ref().map(|i| i.visible)
  }

  /// Intended on-screen width, 0 once closed
  pub fn display_width(&self) -> u32 {
    self.lock().as_ref().map_or(0, |i| i.display_width)
  }

  /// Intended on-screen height, 0 once closed
  pub fn display_height(&self) -> u32 {
    self.lock().as_ref().map_or(0, |i| i.display_height)
  }

  /// Timestamp in microseconds; survives close
  pub fn timestamp(&self) -> i64 {
    self.timestamp_us
  }

  /// Duration in microseconds
  pub fn duration(&self) -> Option<i64> {
    self.duration_us
  }

  /// Whether the buffer has been detached
  pub fn is_closed(&self) -> bool {
    self.lock().is_none()
  }

  // ========================================================================
  // Methods
  // ========================================================================

  /// Bytes required for `copy_to` with these options
  pub fn allocation_size(&self, options: &VideoFrameCopyToOptions) -> Result<usize> {
    let guard = self.lock();
    let inner = guard
      .as_ref()
      .ok_or_else(|| invalid_state_error("VideoFrame is closed"))?;
    let plan = Self::parse_copy_options(inner, options)?;
    Ok(
      plan
        .iter()
        .map(|p| p.dest_offset + p.dest_stride * p.source_height)
        .max()
        .unwrap_or(0),
    )
  }

  /// Copy the requested rect into `dest`, plane by plane, row by row
  pub fn copy_to(&self, dest: &mut [u8], options: &VideoFrameCopyToOptions) -> Result<()> {
    let guard = self.lock();
    let inner = guard
      .as_ref()
      .ok_or_else(|| invalid_state_error("VideoFrame is closed"))?;
    let plan = Self::parse_copy_options(inner, options)?;

    let needed = plan
      .iter()
      .map(|p| p.dest_offset + p.dest_stride * p.source_height)
      .max()
      .unwrap_or(0);
    if dest.len() < needed {
      return Err(range_error(&format!(
        "destination buffer too small: need {} bytes, got {}",
        needed,
        dest.len()
      )));
    }

    for (i, plane) in plan.iter().enumerate() {
      let src_layout = &inner.layout[i];
      for row in 0..plane.source_height {
        let src = src_layout.offset
          + (plane.source_top + row) * src_layout.stride
          + plane.source_left_bytes;
        let dst = plane.dest_offset + row * plane.dest_stride;
        dest[dst..dst + plane.source_width_bytes]
          .copy_from_slice(&inner.data[src..src + plane.source_width_bytes]);
      }
    }
    Ok(())
  }

  /// Parse VideoFrameCopyToOptions into a combined per-plane plan
  fn parse_copy_options(
    inner: &VideoFrameInner,
    options: &VideoFrameCopyToOptions,
  ) -> Result<Vec<PlaneCopy>> {
    let coded = VideoFrameRect {
      x: 0,
      y: 0,
      width: inner.coded_width,
      height: inner.coded_height,
    };
    let rect = match options.rect {
      Some(rect) => {
        Self::check_rect(inner.format, &rect, &coded)?;
        rect
      }
      None => inner.visible,
    };

    let plane_count = inner.format.plane_count();
    if let Some(layout) = &options.layout {
      if layout.len() != plane_count {
        return Err(type_error(&format!(
          "layout must describe {} planes, got {}",
          plane_count,
          layout.len()
        )));
      }
    }

    let backend = inner.format.to_backend();
    let mut plan = Vec::with_capacity(plane_count);
    let mut next_offset = 0usize;
    for i in 0..plane_count {
      let hsub = backend.horizontal_sub(i);
      let vsub = backend.vertical_sub(i);
      let bps = backend.bytes_per_sample(i);
      let source_top = (rect.y / vsub) as usize;
      let source_height = (rect.height / vsub) as usize;
      let source_left_bytes = (rect.x / hsub) as usize * bps;
      let source_width_bytes = (rect.width / hsub) as usize * bps;

      let (dest_offset, dest_stride) = match &options.layout {
        Some(layout) => {
          if layout[i].stride < source_width_bytes {
            return Err(type_error(&format!(
              "destination stride of plane {} is below the copied row width",
              i
            )));
          }
          (layout[i].offset, layout[i].stride)
        }
        None => {
          let offset = next_offset;
          next_offset += source_width_bytes * source_height;
          (offset, source_width_bytes)
        }
      };

      plan.push(PlaneCopy {
        dest_offset,
        dest_stride,
        source_top,
        source_height,
        source_left_bytes,
        source_width_bytes,
      });
    }

    // Destination planes must not overlap
    let spans: Vec<(usize, usize)> = plan
      .iter()
      .map(|p| (p.dest_offset, p.dest_offset + p.dest_stride * p.source_height))
      .collect();
    for (i, a) in spans.iter().enumerate() {
      for b in spans.iter().skip(i + 1) {
        if a.0 < b.1 && b.0 < a.1 {
          return Err(type_error("destination plane layouts overlap"));
        }
      }
    }

    Ok(plan)
  }

  /// Create an independent copy of this VideoFrame
  pub fn try_clone(&self) -> Result<VideoFrame> {
    let guard = self.lock();
    let inner = guard
      .as_ref()
      .ok_or_else(|| invalid_state_error("VideoFrame is closed"))?;

    Ok(VideoFrame {
      inner: Mutex::new(Some(VideoFrameInner {
        format: inner.format,
        coded_width: inner.coded_width,
        coded_height: inner.coded_height,
        visible: inner.visible,
        display_width: inner.display_width,
        display_height: inner.display_height,
        layout: inner.layout.clone(),
        data: inner.data.clone(),
      })),
      timestamp_us: self.timestamp_us,
      duration_us: self.duration_us,
    })
  }

  /// Detach the pixel buffer
  pub fn close(&self) {
    *self.lock() = None;
  }
}

impl std::fmt::Debug for VideoFrame {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let guard = self.lock();
    match &*guard {
      Some(inner) => f
        .debug_struct("VideoFrame")
        .field("format", &inner.format)
        .field("coded", &(inner.coded_width, inner.coded_height))
        .field("visible", &inner.visible)
        .field("display", &(inner.display_width, inner.display_height))
        .field("timestamp", &self.timestamp_us)
        .finish(),
      None => f.debug_struct("VideoFrame").field("closed", &true).finish(),
    }
  }
}
