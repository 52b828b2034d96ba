//! Contains [`Attr`], the quantization configuration, and the [`SpeedSettings`] derived from it.

use crate::{Error, Histogram, Image, QuantizeResult, MAX_COLORS};
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

/// The slowest (highest quality) speed.
pub const MIN_SPEED: u8 = 1;

/// The fastest (lowest quality) speed.
pub const MAX_SPEED: u8 = 11;

/// The default speed.
pub const DEFAULT_SPEED: u8 = 4;

/// The maximum number of posterization bits.
pub const MAX_POSTERIZATION: u8 = 4;

/// Images with more pixels than this are sampled with a row stride at high speeds.
const SAMPLING_THRESHOLD: usize = 512 * 512;

/// The work budget for a given speed.
///
/// Lower speeds spend more time refining the palette and look at every pixel.
/// Higher speeds cap the histogram sooner, posterize colors that do not fit into the palette,
/// and skip rows of large images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSettings {
    /// The maximum number of refinement iterations.
    pub iterations: u16,
    /// Refinement stops once the total squared movement of all palette entries
    /// in one iteration is below this value.
    pub convergence_limit: f64,
    /// The maximum number of histogram entries before posterization is increased.
    pub max_histogram_entries: usize,
    /// The minimum number of posterization bits applied to the colors palette generation works on
    /// when there are more colors than fit into the palette.
    pub posterization_floor: u8,
    /// Whether pixels are weighted by the local contrast around them.
    pub contrast_weighting: bool,
    /// Every `row_stride`-th row of a large image is sampled.
    pub row_stride: u8,
}

impl SpeedSettings {
    /// Returns the settings for a speed in `1..=11`. Other values are clamped into that range.
    #[must_use]
    pub fn for_speed(speed: u8) -> Self {
        let speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        let i = u16::from(8u8.saturating_sub(speed));

        Self {
            iterations: i + i * i / 2,
            convergence_limit: 1.0 / f64::from(1u32 << (23 - speed)),
            max_histogram_entries: (1 << 17) + (1 << 18) * usize::from(10u8.saturating_sub(speed)),
            posterization_floor: u8::from(speed >= 8),
            contrast_weighting: speed <= 6,
            row_stride: match speed {
                1..=7 => 1,
                8 | 9 => 2,
                10 => 3,
                _ => 4,
            },
        }
    }

    /// Returns the row sampling stride for an image of the given size.
    #[must_use]
    pub fn stride_for(&self, width: u32, height: u32) -> usize {
        if width as usize * height as usize > SAMPLING_THRESHOLD {
            usize::from(self.row_stride)
        } else {
            1
        }
    }
}

/// A shared progress callback.
#[derive(Clone)]
struct ProgressCallback(Arc<dyn Fn(f32) -> bool + Send + Sync>);

impl Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressCallback")
    }
}

/// Quantization settings.
///
/// All setters validate their input and leave the [`Attr`] unchanged on error.
/// Cloning an [`Attr`] produces an independent copy.
///
/// # Examples
/// ```
/// # use palquant::{Attr, Image, PixelFormat};
/// # fn main() -> Result<(), palquant::Error> {
/// let pixels = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 0];
/// let image = Image::new(&pixels[..], 2, 2, PixelFormat::Rgb)?;
///
/// let mut attr = Attr::new();
/// attr.set_max_colors(16)?.set_quality(70, 99)?.set_speed(3)?;
///
/// let result = attr.quantize(&image)?;
/// assert_eq!(result.palette().len(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Attr {
    /// The maximum number of palette colors.
    max_colors: u16,
    /// The minimum acceptable quality.
    min_quality: u8,
    /// The quality at which palette generation may stop early.
    max_quality: u8,
    /// The speed/quality tradeoff.
    speed: u8,
    /// The minimum number of low bits dropped from each channel.
    min_posterization: u8,
    /// Called with the progress in percent; returning `false` aborts.
    progress: Option<ProgressCallback>,
}

impl Default for Attr {
    fn default() -> Self {
        Self::new()
    }
}

impl Attr {
    /// Creates a new [`Attr`] with the default settings:
    /// 256 colors, quality `0..=100`, speed `4`, and no posterization.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_colors: MAX_COLORS,
            min_quality: 0,
            max_quality: 100,
            speed: DEFAULT_SPEED,
            min_posterization: 0,
            progress: None,
        }
    }

    /// Returns the maximum number of palette colors.
    #[must_use]
    pub const fn max_colors(&self) -> u16 {
        self.max_colors
    }

    /// Sets the maximum number of palette colors.
    ///
    /// Palette colors are weighted averages taken in the gamma-adjusted, alpha-premultiplied space
    /// used for all color distances, not in sRGB. For example, with a single color an image of
    /// equal parts black and white yields `(144, 144, 144)` rather than the sRGB mean of `127.5`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `max_colors` is not in `1..=256`.
    pub fn set_max_colors(&mut self, max_colors: u32) -> Result<&mut Self, Error> {
        match u16::try_from(max_colors) {
            Ok(n @ 1..=MAX_COLORS) => {
                self.max_colors = n;
                Ok(self)
            }
            _ => Err(Error::OutOfRange {
                parameter: "max_colors",
                value: f64::from(max_colors),
                range: "1..=256",
            }),
        }
    }

    /// Returns the minimum acceptable quality.
    #[must_use]
    pub const fn min_quality(&self) -> u8 {
        self.min_quality
    }

    /// Returns the target quality.
    #[must_use]
    pub const fn max_quality(&self) -> u8 {
        self.max_quality
    }

    /// Sets the quality range.
    ///
    /// Quantization fails with [`Error::QualityBelowTarget`] if the palette does not reach `min`.
    /// Palette generation may use fewer colors once `max` is reached.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if either bound is above `100`,
    /// or [`Error::InvalidQualityRange`] if `min > max`.
    pub fn set_quality(&mut self, min: u32, max: u32) -> Result<&mut Self, Error> {
        for (parameter, value) in [("min_quality", min), ("max_quality", max)] {
            if value > 100 {
                return Err(Error::OutOfRange { parameter, value: f64::from(value), range: "0..=100" });
            }
        }

        if min > max {
            return Err(Error::InvalidQualityRange { min, max });
        }

        #[allow(clippy::cast_possible_truncation)]
        {
            self.min_quality = min as u8;
            self.max_quality = max as u8;
        }
        Ok(self)
    }

    /// Sets the quality range to `target / 2..=target`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `target` is above `100`.
    pub fn set_quality_target(&mut self, target: u32) -> Result<&mut Self, Error> {
        self.set_quality(target / 2, target)
    }

    /// Returns the speed.
    #[must_use]
    pub const fn speed(&self) -> u8 {
        self.speed
    }

    /// Sets the speed/quality tradeoff. `1` is the slowest and best, `11` the fastest.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `speed` is not in `1..=11`.
    pub fn set_speed(&mut self, speed: u32) -> Result<&mut Self, Error> {
        match u8::try_from(speed) {
            Ok(s @ MIN_SPEED..=MAX_SPEED) => {
                self.speed = s;
                Ok(self)
            }
            _ => Err(Error::OutOfRange { parameter: "speed", value: f64::from(speed), range: "1..=11" }),
        }
    }

    /// Returns the minimum number of posterization bits.
    #[must_use]
    pub const fn min_posterization(&self) -> u8 {
        self.min_posterization
    }

    /// Sets the number of low bits dropped from each color channel before building the histogram.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `bits` is not in `0..=4`.
    pub fn set_min_posterization(&mut self, bits: u32) -> Result<&mut Self, Error> {
        match u8::try_from(bits) {
            Ok(b @ 0..=MAX_POSTERIZATION) => {
                self.min_posterization = b;
                Ok(self)
            }
            _ => Err(Error::OutOfRange {
                parameter: "min_posterization",
                value: f64::from(bits),
                range: "0..=4",
            }),
        }
    }

    /// Sets a callback that is given the progress of quantization in percent.
    ///
    /// Quantization is aborted with [`Error::Aborted`] as soon as the callback returns `false`.
    pub fn set_progress_callback(
        &mut self,
        callback: impl Fn(f32) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.progress = Some(ProgressCallback(Arc::new(callback)));
        self
    }

    /// Removes the progress callback.
    pub fn clear_progress_callback(&mut self) -> &mut Self {
        self.progress = None;
        self
    }

    /// Returns the work budget for the current speed.
    #[must_use]
    pub fn speed_settings(&self) -> SpeedSettings {
        SpeedSettings::for_speed(self.speed)
    }

    /// The posterization applied to histogram colors before seeding, including the speed floor.
    pub(crate) fn seeding_posterization(&self) -> u8 {
        self.min_posterization.max(self.speed_settings().posterization_floor)
    }

    /// Reports progress, returning [`Error::Aborted`] if the callback asks to stop.
    pub(crate) fn report_progress(&self, percent: f32) -> Result<(), Error> {
        match &self.progress {
            Some(ProgressCallback(callback)) if !callback(percent) => Err(Error::Aborted),
            _ => Ok(()),
        }
    }

    /// Generates a palette for a single image.
    ///
    /// Use [`Histogram`] to generate one palette for multiple images.
    ///
    /// # Errors
    /// See [`Histogram::add_image`] and [`Histogram::quantize`].
    pub fn quantize(&self, image: &Image) -> Result<QuantizeResult, Error> {
        let mut histogram = Histogram::new(self);
        histogram.add_image(self, image)?;
        histogram.quantize(self)
    }
}
