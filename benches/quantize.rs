#[path = "../util/util.rs"]
mod util;

use util::benchmark_images;

use std::time::Duration;

use criterion::{
    criterion_group, criterion_main, measurement::WallTime, Bencher, BenchmarkId, Criterion,
    SamplingMode,
};
use palquant::{Attr, Histogram, Image};

fn bench(
    c: &mut Criterion,
    group: &str,
    mut f: impl FnMut(&mut Bencher<WallTime>, &(u32, u32, &Image<'static>)),
) {
    let mut group = c.benchmark_group(group);
    group
        .sample_size(20)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_secs(2));

    for speed in [1, 4, 10] {
        for k in [256, 64, 16] {
            for (name, image) in benchmark_images() {
                group.bench_with_input(
                    BenchmarkId::new(format!("speed{speed}/{k}"), name),
                    &(speed, k, image),
                    &mut f,
                );
            }
        }
    }
}

fn attr(speed: u32, max_colors: u32) -> Attr {
    let mut attr = Attr::new();
    attr.set_speed(speed)
        .and_then(|attr| attr.set_max_colors(max_colors))
        .expect("valid settings");
    attr
}

fn quantize(c: &mut Criterion) {
    bench(c, "quantize", |b, &(speed, k, image)| {
        let attr = attr(speed, k);
        b.iter(|| attr.quantize(image).expect("quantized"));
    });
}

fn histogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("histogram");
    group.sample_size(30).warm_up_time(Duration::from_secs(2));

    for speed in [1, 10] {
        let attr = attr(speed, 256);
        for (name, image) in benchmark_images() {
            group.bench_with_input(BenchmarkId::new(format!("speed{speed}"), name), image, |b, image| {
                b.iter(|| {
                    let mut histogram = Histogram::new(&attr);
                    histogram.add_image(&attr, image).expect("added image");
                    histogram
                });
            });
        }
    }
}

criterion_group!(benches, quantize, histogram);
criterion_main!(benches);
