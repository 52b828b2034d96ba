//! A color quantization engine: palette generation and dithered remapping of RGB and RGBA images.
//!
//! `palquant` reduces an image to a palette of at most 256 colors and maps every pixel
//! to an index into that palette. Palettes are seeded with median cut and refined with
//! weighted k-means in a gamma-adjusted, alpha-premultiplied color space.
//! Remapping supports Floyd–Steinberg error diffusion and ordered dithering.
//!
//! # Features
//! - `threads`: runs histogram construction, palette refinement, and non-diffusing remaps in parallel via [`rayon`].
//! - `image`: enables conversions from and to the [`image`](::image) crate's buffer types.
//!
//! # Example
//! ```
//! # use palquant::{Attr, Image, PixelFormat};
//! # fn main() -> Result<(), palquant::Error> {
//! let pixels = (0..16 * 16)
//!     .flat_map(|i: u32| [(i % 16 * 16) as u8, (i / 16 * 16) as u8, 128, 255])
//!     .collect::<Vec<_>>();
//!
//! let image = Image::new(pixels, 16, 16, PixelFormat::Rgba)?;
//!
//! let mut attr = Attr::new();
//! attr.set_max_colors(32)?.set_quality(0, 95)?.set_speed(3)?;
//!
//! let mut result = attr.quantize(&image)?;
//! result.set_dithering_level(1.0)?;
//! let remapped = result.remapped(&image)?;
//!
//! assert!(remapped.palette().len() <= 32);
//! assert_eq!(remapped.indices().len(), 16 * 16);
//! # Ok(())
//! # }
//! ```
//!
//! For callers that need explicit lifetimes behind opaque identifiers, see [`Session`].

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod attr;
mod color;
mod dither;
mod error;
mod handles;
mod histogram;
mod image;
mod kdtree;
mod kmeans;
mod median_cut;
mod pixels;
mod quantize;
mod remap;
mod result;
mod types;

#[cfg(test)]
mod tests;

pub use attr::{Attr, SpeedSettings, DEFAULT_SPEED, MAX_POSTERIZATION, MAX_SPEED, MIN_SPEED};
pub use color::DEFAULT_GAMMA;
pub use dither::DitherMode;
pub use error::{Error, ErrorKind, HandleKind};
pub use handles::{AttrHandle, Handle, HandleTable, ImageHandle, ResultHandle, Session};
pub use histogram::{Histogram, HistogramEntry};
pub use image::Image;
pub use pixels::PixelFormat;
pub use result::QuantizeResult;
pub use types::IndexedImage;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

/// The maximum supported number of palette colors is `256`.
pub const MAX_COLORS: u16 = u8::MAX as u16 + 1;

/// Parses a decimal version component at compile time.
const fn parse_version_part(part: &str) -> u32 {
    let bytes = part.as_bytes();
    let mut value = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

/// The crate version as a single integer: `major * 10000 + minor * 100 + patch`.
pub const VERSION: u32 = parse_version_part(env!("CARGO_PKG_VERSION_MAJOR")) * 10000
    + parse_version_part(env!("CARGO_PKG_VERSION_MINOR")) * 100
    + parse_version_part(env!("CARGO_PKG_VERSION_PATCH"));

/// Returns [`VERSION`].
#[must_use]
pub const fn version() -> u32 {
    VERSION
}
