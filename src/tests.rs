use crate::{
    color::{GammaLut, Point, DEFAULT_GAMMA},
    Attr, DitherMode, Error, ErrorKind, Histogram, Image, PixelFormat, QuantizeResult,
};
use palette::Srgba;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;
use std::sync::{Arc, Mutex};

pub(crate) fn test_colors(n: usize) -> Vec<Srgba<u8>> {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
    (0..n)
        .map(|_| Srgba::new(rng.gen(), rng.gen(), rng.gen(), rng.gen()))
        .collect()
}

pub(crate) fn test_points(n: usize) -> Vec<Point> {
    let lut = GammaLut::new(DEFAULT_GAMMA);
    test_colors(n).into_iter().map(|c| lut.to_point(c)).collect()
}

fn rgba_image(colors: &[Srgba<u8>], width: u32, height: u32) -> Image<'static> {
    let pixels = colors
        .iter()
        .flat_map(|c| [c.red, c.green, c.blue, c.alpha])
        .collect::<Vec<_>>();
    Image::new(pixels, width, height, PixelFormat::Rgba).unwrap()
}

fn gradient(width: u32, height: u32) -> Image<'static> {
    let colors = (0..width * height)
        .map(|i| {
            let x = (i % width * 255 / (width - 1)) as u8;
            let y = (i / width * 255 / (height - 1).max(1)) as u8;
            Srgba::new(x, y, 255 - x, 255)
        })
        .collect::<Vec<_>>();
    rgba_image(&colors, width, height)
}

fn attr(max_colors: u32, speed: u32) -> Attr {
    let mut attr = Attr::new();
    attr.set_max_colors(max_colors).unwrap().set_speed(speed).unwrap();
    attr
}

fn assert_indices_valid(result: &QuantizeResult, indices: &[u8]) {
    assert!(indices.iter().all(|&i| usize::from(i) < result.palette_len()));
}

#[test]
fn few_colors_are_kept_exactly() {
    let colors = [
        Srgba::new(200, 10, 10, 255),
        Srgba::new(10, 200, 10, 255),
        Srgba::new(10, 10, 200, 255),
        Srgba::new(10, 10, 200, 255),
    ];
    let image = rgba_image(&colors, 2, 2);
    let result = attr(8, 4).quantize(&image).unwrap();

    assert_eq!(result.palette_len(), 3);
    for color in &colors {
        assert!(result.palette().contains(color));
    }
    assert_eq!(result.mean_square_error(), 0.0);
    assert_eq!(result.quality(), 100);

    let remapped = result.remapped(&image).unwrap();
    let bytes = remapped.to_rgba_bytes();
    let expected = colors
        .iter()
        .flat_map(|c| [c.red, c.green, c.blue, c.alpha])
        .collect::<Vec<_>>();
    assert_eq!(bytes, expected);
}

#[test]
fn single_color_palette_is_the_average() {
    let colors = (0..16)
        .map(|i| if i % 2 == 0 { Srgba::new(100, 100, 100, 255) } else { Srgba::new(110, 110, 110, 255) })
        .collect::<Vec<_>>();
    let image = rgba_image(&colors, 4, 4);
    let result = attr(1, 7).quantize(&image).unwrap();

    assert_eq!(result.palette_len(), 1);
    let color = result.palette()[0];
    assert_eq!(color.alpha, 255);
    for channel in [color.red, color.green, color.blue] {
        assert!((102..=108).contains(&channel), "{channel}");
    }

    let mut indices = vec![1; 16];
    result.remap_into(&image, &mut indices).unwrap();
    assert!(indices.iter().all(|&i| i == 0));
}

#[test]
fn single_color_is_averaged_after_gamma_adjustment() {
    let black = Srgba::new(0, 0, 0, 255);
    let white = Srgba::new(255, 255, 255, 255);

    // (0.5 ^ (0.45455 / 0.5499)) * 255, not the sRGB mean of 127.5
    let checkerboard = (0..16)
        .map(|i| if (i % 4 + i / 4) % 2 == 0 { black } else { white })
        .collect::<Vec<_>>();
    let result = attr(1, 7).quantize(&rgba_image(&checkerboard, 4, 4)).unwrap();
    let gray = result.palette()[0];
    for channel in [gray.red, gray.green, gray.blue] {
        assert!((143..=145).contains(&channel), "{gray:?}");
    }
    assert_eq!(gray.alpha, 255);

    // three quarters black: 0.25 ^ (0.45455 / 0.5499) * 255 instead of 64
    let mostly_black = (0..16).map(|i| if i % 4 == 0 { white } else { black }).collect::<Vec<_>>();
    let result = attr(1, 7).quantize(&rgba_image(&mostly_black, 4, 4)).unwrap();
    let gray = result.palette()[0];
    assert!((80..=82).contains(&gray.red), "{gray:?}");
}

#[test]
fn fast_speeds_keep_distinct_colors() {
    let colors = [Srgba::new(100, 100, 100, 255), Srgba::new(101, 101, 101, 255)];
    let image = rgba_image(&colors, 2, 1);

    for speed in [4, 8, 11] {
        let result = attr(256, speed).quantize(&image).unwrap();
        assert_eq!(result.palette_len(), 2, "speed {speed}");
        for color in &colors {
            assert!(result.palette().contains(color), "speed {speed}");
        }
        assert_eq!(result.mean_square_error(), 0.0);
        assert_eq!(result.quality(), 100);
    }
}

#[test]
fn fast_speeds_measure_error_against_input_colors() {
    // more colors than fit, so seeding works on posterized colors
    let colors = (0..64u8).map(|i| Srgba::new(i, i, i, 255)).collect::<Vec<_>>();
    let image = rgba_image(&colors, 8, 8);

    let result = attr(32, 11).quantize(&image).unwrap();
    assert!(result.palette_len() <= 32);
    assert!(result.mean_square_error() > 0.0);
    assert!(result.quality() < 100);
}

#[test]
fn remapping_is_repeatable() {
    let image = gradient(32, 8);
    for mode in [DitherMode::FloydSteinberg, DitherMode::Ordered] {
        let mut result = attr(8, 4).quantize(&image).unwrap();
        result.set_dither_mode(mode);

        let first = result.remapped(&image).unwrap();
        let second = result.remapped(&image).unwrap();
        assert_eq!(first, second);
        assert_indices_valid(&result, first.indices());
    }
}

#[test]
fn more_colors_never_increase_error() {
    let image = gradient(64, 4);
    let errors = [4, 16, 64]
        .map(|k| attr(k, 3).quantize(&image).unwrap().mean_square_error());

    assert!(errors[0] >= errors[1], "{errors:?}");
    assert!(errors[1] >= errors[2], "{errors:?}");
    assert!(errors[0] > 0.0);
}

#[test]
fn more_colors_never_increase_error_on_random_images() {
    for trial in 0..6 {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(trial);
        let colors = (0..32 * 32)
            .map(|_| Srgba::new(rng.gen(), rng.gen(), rng.gen(), 255))
            .collect::<Vec<_>>();
        let image = rgba_image(&colors, 32, 32);

        for speed in [1, 4] {
            let mut last = f64::INFINITY;
            for k in 2..=40 {
                let mse = attr(k, speed).quantize(&image).unwrap().mean_square_error();
                assert!(mse <= last, "trial {trial}, speed {speed}, {k} colors: {mse} > {last}");
                last = mse;
            }
        }
    }
}

#[test]
fn fixed_colors_are_in_the_palette() {
    let mut image = gradient(16, 16);
    let magenta = Srgba::new(255, 0, 255, 255);
    image.add_fixed_color(magenta).unwrap();
    let translucent = Srgba::new(0, 0, 0, 0);
    image.add_fixed_color(translucent).unwrap();

    let result = attr(8, 4).quantize(&image).unwrap();
    assert!(result.palette_len() <= 8);
    assert!(result.palette().contains(&magenta));
    assert_eq!(result.palette()[0], translucent);
}

#[test]
fn remapped_bytes_use_palette_colors() {
    let image = gradient(20, 10);
    let mut result = attr(16, 4).quantize(&image).unwrap();
    result.set_dithering_level(0.5).unwrap();
    let remapped = result.remapped(&image).unwrap();

    assert_eq!((remapped.width(), remapped.height()), (20, 10));
    let bytes = remapped.to_rgba_bytes();
    assert_eq!(bytes.len(), 20 * 10 * 4);
    for pixel in bytes.chunks_exact(4) {
        let color = Srgba::new(pixel[0], pixel[1], pixel[2], pixel[3]);
        assert!(remapped.palette().contains(&color));
    }
}

#[test]
fn setter_boundaries() {
    let mut attr = Attr::new();
    assert!(attr.set_max_colors(1).is_ok());
    assert!(attr.set_max_colors(256).is_ok());
    assert_eq!(attr.set_max_colors(0).unwrap_err().kind(), ErrorKind::Configuration);
    assert_eq!(attr.set_max_colors(257).unwrap_err().kind(), ErrorKind::Configuration);
    assert_eq!(attr.max_colors(), 256);

    assert!(attr.set_speed(1).is_ok());
    assert!(attr.set_speed(11).is_ok());
    assert!(attr.set_speed(0).is_err());
    assert!(attr.set_speed(12).is_err());

    assert!(attr.set_quality(0, 100).is_ok());
    assert_eq!(attr.set_quality(60, 40).unwrap_err(), Error::InvalidQualityRange { min: 60, max: 40 });
    assert!(attr.set_quality(0, 101).is_err());

    assert!(attr.set_min_posterization(4).is_ok());
    assert!(attr.set_min_posterization(5).is_err());
    assert_eq!(attr.min_posterization(), 4);

    let mut image = gradient(2, 2);
    assert!(image.set_gamma(0.0).is_err());
    assert!(image.set_gamma(1.0).is_err());
    assert!(image.set_gamma(0.5).is_ok());
}

#[test]
fn small_gradient_fits_the_palette() {
    let colors = (0..16u8)
        .map(|i| Srgba::new(i * 16, 255 - i * 16, i * 8, 255))
        .collect::<Vec<_>>();
    let image = rgba_image(&colors, 4, 4);

    let mut attr = attr(32, 3);
    attr.set_quality(80, 95).unwrap();
    let result = attr.quantize(&image).unwrap();

    assert_eq!(result.palette_len(), 16);
    assert_eq!(result.quality(), 100);
    let remapped = result.remapped(&image).unwrap();
    for (&i, color) in remapped.indices().iter().zip(&colors) {
        assert_eq!(&remapped.palette()[usize::from(i)], color);
    }
}

#[test]
fn uniform_image() {
    let color = Srgba::new(12, 34, 56, 255);
    let image = rgba_image(&[color; 64], 8, 8);
    let result = attr(256, 4).quantize(&image).unwrap();

    assert_eq!(result.palette(), &[color]);
    let remapped = result.remapped(&image).unwrap();
    assert!(remapped.indices().iter().all(|&i| i == 0));
}

#[test]
fn four_colors_and_white() {
    let colors = [
        Srgba::new(255, 0, 0, 255),
        Srgba::new(0, 255, 0, 255),
        Srgba::new(0, 0, 255, 255),
        Srgba::new(255, 255, 0, 255),
    ];
    let mut image = rgba_image(&colors, 2, 2);
    let white = Srgba::new(255, 255, 255, 255);
    image.add_fixed_color(white).unwrap();

    let mut attr = attr(16, 3);
    attr.set_quality(70, 99).unwrap();
    let result = attr.quantize(&image).unwrap();

    assert_eq!(result.palette_len(), 5);
    assert!(result.palette().contains(&white));

    let mut indices = [0; 4];
    result.remap_into(&image, &mut indices).unwrap();
    for (&i, color) in indices.iter().zip(&colors) {
        assert_eq!(&result.palette()[usize::from(i)], color);
    }
}

#[test]
fn histogram_of_multiple_images() {
    let attr = attr(256, 4);
    let red = rgba_image(&[Srgba::new(255, 0, 0, 255); 4], 2, 2);
    let blue = rgba_image(&[Srgba::new(0, 0, 255, 255); 9], 3, 3);

    let mut histogram = Histogram::new(&attr);
    histogram.add_image(&attr, &red).unwrap();
    histogram.add_image(&attr, &blue).unwrap();
    assert_eq!(histogram.len(), 2);

    let result = histogram.quantize(&attr).unwrap();
    assert_eq!(result.palette_len(), 2);
    // the more frequent color comes first
    assert_eq!(result.palette()[0], Srgba::new(0, 0, 255, 255));

    let mut other = blue.clone();
    other.set_gamma(0.8).unwrap();
    assert_eq!(
        histogram.add_image(&attr, &other).unwrap_err().kind(),
        ErrorKind::Configuration
    );
}

#[test]
fn progress_is_reported_and_can_abort() {
    let image = gradient(32, 32);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut attr = attr(8, 4);
    let record = Arc::clone(&seen);
    attr.set_progress_callback(move |percent| {
        record.lock().unwrap().push(percent);
        true
    });
    attr.quantize(&image).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&100.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    attr.set_progress_callback(|percent| percent < 50.0);
    assert_eq!(attr.quantize(&image).unwrap_err(), Error::Aborted);

    attr.clear_progress_callback();
    assert!(attr.quantize(&image).is_ok());
}

#[test]
fn channel_orders_and_premultiplied_alpha() {
    let bgr = Image::new(vec![255, 0, 0, 255, 0, 0], 2, 1, PixelFormat::Bgr).unwrap();
    let result = Attr::new().quantize(&bgr).unwrap();
    assert_eq!(result.palette(), &[Srgba::new(0, 0, 255, 255)]);

    let premultiplied =
        Image::new(vec![64, 0, 0, 128], 1, 1, PixelFormat::RgbaPremultiplied).unwrap();
    let result = Attr::new().quantize(&premultiplied).unwrap();
    assert_eq!(result.palette(), &[Srgba::new(128, 0, 0, 128)]);

    let transparent = Image::new(vec![9, 8, 7, 0, 1, 2, 3, 0], 2, 1, PixelFormat::Rgba).unwrap();
    let result = Attr::new().quantize(&transparent).unwrap();
    assert_eq!(result.palette(), &[Srgba::new(0, 0, 0, 0)]);
}

#[test]
fn undithered_remap_is_nearest_color() {
    let image = gradient(16, 16);
    let mut result = attr(4, 4).quantize(&image).unwrap();
    result.set_dithering_level(0.0).unwrap();

    let floyd = result.remapped(&image).unwrap();
    result.set_dither_mode(DitherMode::Ordered);
    let ordered = result.remapped(&image).unwrap();
    assert_eq!(floyd.indices(), ordered.indices());
}
