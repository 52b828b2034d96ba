#![allow(dead_code)]

use std::sync::OnceLock;

use palquant::{Image, PixelFormat};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// A smooth two dimensional gradient with a little noise, similar to a photograph.
pub fn photo_like(width: u32, height: u32) -> Vec<u8> {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(42);
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let r = x * 255 / width;
            let g = y * 255 / height;
            let b = (x + y) * 127 / (width + height) + 64;
            for c in [r, g, b] {
                let noise = rng.gen_range(-6i32..=6);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                pixels.push((c as i32 + noise).clamp(0, 255) as u8);
            }
        }
    }
    pixels
}

/// Flat regions of a few colors with translucent borders, similar to a screenshot or icon.
pub fn flat_with_alpha(width: u32, height: u32) -> Vec<u8> {
    let colors = [[230, 230, 230], [30, 90, 200], [200, 40, 40], [20, 20, 20], [250, 200, 0]];
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = colors[((x / 37 + y / 23) % 5) as usize];
            let alpha = if x < 8 || y < 8 { (x.min(y) * 32).min(255) as u8 } else { 255 };
            pixels.extend([r, g, b, alpha]);
        }
    }
    pixels
}

static BENCHMARK_IMAGES: OnceLock<Vec<(String, Image<'static>)>> = OnceLock::new();

pub fn benchmark_images() -> &'static [(String, Image<'static>)] {
    BENCHMARK_IMAGES.get_or_init(|| {
        let mut images = Vec::new();
        for (width, height) in [(256, 256), (1024, 768)] {
            images.push((
                format!("photo_{width}x{height}"),
                Image::new(photo_like(width, height), width, height, PixelFormat::Rgb)
                    .expect("valid image"),
            ));
            images.push((
                format!("flat_{width}x{height}"),
                Image::new(flat_with_alpha(width, height), width, height, PixelFormat::Rgba)
                    .expect("valid image"),
            ));
        }
        images
    })
}
