//! Contains the crate's error type.

use std::fmt::{self, Display};
use thiserror::Error;

/// The kind of object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// An [`Attr`](crate::Attr) handle.
    Attr,
    /// An [`Image`](crate::Image) handle.
    Image,
    /// A [`QuantizeResult`](crate::QuantizeResult) handle.
    Result,
}

impl Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Attr => write!(f, "attr"),
            HandleKind::Image => write!(f, "image"),
            HandleKind::Result => write!(f, "result"),
        }
    }
}

/// The broad category of an [`Error`].
///
/// Callers that only care about the failure class (e.g., to relax the quality floor and retry)
/// can match on this instead of the individual [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A parameter was outside of its valid range. The object was left unchanged.
    Configuration,
    /// An image could not be created from the given dimensions or pixel buffer.
    ResourceCreation,
    /// Quantization could not produce a palette.
    Quantization,
    /// Quantization finished, but the achieved quality is below the requested minimum.
    QualityBelowTarget,
    /// The handle refers to an object that was already destroyed.
    UseAfterFree,
    /// A caller supplied output buffer has the wrong size.
    BufferSizeMismatch,
}

/// The error type returned by all fallible operations in this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A numeric parameter was outside of its valid range.
    #[error("{parameter} must be in {range}, got {value}")]
    OutOfRange {
        /// The name of the parameter.
        parameter: &'static str,
        /// The rejected value.
        value: f64,
        /// A human readable description of the valid range.
        range: &'static str,
    },
    /// The minimum quality was greater than the maximum quality.
    #[error("minimum quality {min} is greater than maximum quality {max}")]
    InvalidQualityRange {
        /// The requested minimum quality.
        min: u32,
        /// The requested maximum quality.
        max: u32,
    },
    /// An image with a different gamma was added to a histogram.
    #[error("image gamma {image} does not match histogram gamma {histogram}")]
    GammaMismatch {
        /// The gamma of the histogram.
        histogram: f64,
        /// The gamma of the rejected image.
        image: f64,
    },
    /// The width or height of an image was zero.
    #[error("image dimensions {width}x{height} must both be non-zero")]
    ZeroDimension {
        /// The requested width.
        width: u32,
        /// The requested height.
        height: u32,
    },
    /// The number of pixels is above [`MAX_PIXELS`](crate::MAX_PIXELS).
    #[error("image of {width}x{height} pixels is above the maximum of {} pixels", crate::MAX_PIXELS)]
    TooManyPixels {
        /// The requested width.
        width: u32,
        /// The requested height.
        height: u32,
    },
    /// The pixel buffer length does not equal `width * height * components`.
    #[error("pixel buffer has {actual} bytes but the image requires {expected}")]
    PixelBufferMismatch {
        /// The required number of bytes.
        expected: usize,
        /// The number of bytes given.
        actual: usize,
    },
    /// Only 3 (RGB) and 4 (RGBA) channels per pixel are supported.
    #[error("unsupported number of channels per pixel: {0}")]
    UnsupportedChannelCount(u32),
    /// An image or histogram already holds [`MAX_COLORS`](crate::MAX_COLORS) fixed colors.
    #[error("cannot add more than {} fixed colors", crate::MAX_COLORS)]
    TooManyFixedColors,
    /// There were no colors to quantize.
    #[error("the histogram is empty")]
    EmptyHistogram,
    /// There are more fixed colors than palette slots.
    #[error("{fixed} fixed colors do not fit into a palette of {max_colors} colors")]
    FixedColorsExceedMaxColors {
        /// The number of fixed colors.
        fixed: usize,
        /// The configured maximum number of colors.
        max_colors: u16,
    },
    /// A working buffer could not be allocated.
    #[error("failed to allocate {0} bytes")]
    OutOfMemory(usize),
    /// The progress callback requested cancellation.
    #[error("quantization was aborted by the progress callback")]
    Aborted,
    /// The achieved quality is below the configured minimum quality.
    #[error("achieved quality {achieved} is below the minimum quality {minimum}")]
    QualityBelowTarget {
        /// The quality of the palette that was found.
        achieved: u8,
        /// The configured minimum quality.
        minimum: u8,
    },
    /// The handle was destroyed or never issued by this session.
    #[error("{kind} handle is not valid (destroyed or never created)")]
    UseAfterFree {
        /// The kind of object the handle refers to.
        kind: HandleKind,
    },
    /// An output buffer has the wrong length.
    #[error("output buffer has {actual} bytes but {expected} are required")]
    BufferSizeMismatch {
        /// The required number of bytes.
        expected: usize,
        /// The number of bytes given.
        actual: usize,
    },
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfRange { .. }
            | Error::InvalidQualityRange { .. }
            | Error::GammaMismatch { .. } => ErrorKind::Configuration,
            Error::ZeroDimension { .. }
            | Error::TooManyPixels { .. }
            | Error::PixelBufferMismatch { .. }
            | Error::UnsupportedChannelCount(_)
            | Error::TooManyFixedColors => ErrorKind::ResourceCreation,
            Error::EmptyHistogram
            | Error::FixedColorsExceedMaxColors { .. }
            | Error::OutOfMemory(_)
            | Error::Aborted => ErrorKind::Quantization,
            Error::QualityBelowTarget { .. } => ErrorKind::QualityBelowTarget,
            Error::UseAfterFree { .. } => ErrorKind::UseAfterFree,
            Error::BufferSizeMismatch { .. } => ErrorKind::BufferSizeMismatch,
        }
    }
}

/// Allocates an empty `Vec` with room for `len` items, reporting allocation failure as an [`Error`].
pub(crate) fn try_with_capacity<T>(len: usize) -> Result<Vec<T>, Error> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory(len.saturating_mul(std::mem::size_of::<T>())))?;
    Ok(vec)
}
