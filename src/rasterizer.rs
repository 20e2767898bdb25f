//! Resampling of captured frames to the output size.
//!
//! The output width comes from the settings; the height follows the source
//! aspect ratio (`floor(width * source_height / source_width)`). Both are
//! fixed by the first frame of a job and every later frame must match the
//! first frame's native size.

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::error::ConversionError;
use crate::source::RawFrame;

/// Largest dimension a GIF logical screen can declare.
const GIF_MAX_DIMENSION: u32 = u16::MAX as u32;

/// Filter used for every resize. Fixed so output is reproducible.
const RESAMPLING_FILTER: FilterType = FilterType::Triangle;

/// A frame at output resolution, ready for the encoder.
#[derive(Debug, Clone)]
pub struct ResizedFrame {
    /// Index into the frame schedule.
    pub index: u64,
    /// Pixels in RGBA8 at the job's output dimensions.
    pub pixels: RgbaImage,
    /// Display time of this frame in milliseconds.
    pub delay_ms: u32,
}

/// Compute the output size for `width` given the source size.
///
/// # Errors
///
/// Returns [`ConversionError::InvalidRange`] if the source has a zero
/// dimension, or if the height floors to zero or exceeds what a GIF can hold.
///
/// ```
/// assert_eq!(vidgif::output_dimensions(400, 1920, 1080)?, (400, 225));
/// # Ok::<(), vidgif::ConversionError>(())
/// ```
pub fn output_dimensions(
    width: u32,
    source_width: u32,
    source_height: u32,
) -> Result<(u32, u32), ConversionError> {
    if source_width == 0 || source_height == 0 {
        return Err(ConversionError::InvalidRange(format!(
            "source reports empty frames ({source_width}x{source_height})"
        )));
    }
    let height = u64::from(width) * u64::from(source_height) / u64::from(source_width);
    if height == 0 || height > u64::from(GIF_MAX_DIMENSION) {
        return Err(ConversionError::InvalidRange(format!(
            "{width}px wide output of a {source_width}x{source_height} source would be {height}px tall"
        )));
    }
    Ok((width, height as u32))
}

/// Resizes every frame of one job to the same output dimensions.
#[derive(Debug)]
pub struct Rasterizer {
    width: u32,
    delay_ms: u32,
    // (native, output) dimensions, fixed by the first frame.
    locked: Option<((u32, u32), (u32, u32))>,
}

impl Rasterizer {
    /// A rasterizer producing `width`-wide frames shown for `delay_ms` each.
    pub fn new(width: u32, delay_ms: u32) -> Self {
        Self {
            width,
            delay_ms,
            locked: None,
        }
    }

    /// Output dimensions, once the first frame has been seen.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.locked.map(|(_, output)| output)
    }

    /// Native dimensions of the first frame, once seen.
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.locked.map(|(native, _)| native)
    }

    /// Resize `frame` to the job's output dimensions.
    ///
    /// # Errors
    ///
    /// - [`ConversionError::DimensionMismatch`] if the frame's native size
    ///   differs from the first frame's.
    /// - [`ConversionError::InvalidRange`] if the first frame yields unusable
    ///   output dimensions.
    pub fn resize(&mut self, frame: RawFrame) -> Result<ResizedFrame, ConversionError> {
        let native = (frame.source_width(), frame.source_height());

        let (out_width, out_height) = match self.locked {
            Some((expected, output)) => {
                if native != expected {
                    return Err(ConversionError::DimensionMismatch {
                        frame_index: frame.index,
                        expected,
                        actual: native,
                    });
                }
                output
            }
            None => {
                let output = output_dimensions(self.width, native.0, native.1)?;
                log::debug!(
                    "Output size fixed at {}x{} from {}x{} source",
                    output.0,
                    output.1,
                    native.0,
                    native.1,
                );
                self.locked = Some((native, output));
                output
            }
        };

        let pixels = if native == (out_width, out_height) {
            frame.pixels
        } else {
            imageops::resize(&frame.pixels, out_width, out_height, RESAMPLING_FILTER)
        };

        Ok(ResizedFrame {
            index: frame.index,
            pixels,
            delay_ms: self.delay_ms,
        })
    }
}
