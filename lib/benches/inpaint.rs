use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use patch_inpaint as pi;
use pi::image::{GrayImage, Luma, Rgb, RgbImage};
use std::time::{Duration, Instant};

/// A busy but deterministic texture, so the nearest-neighbor search has
/// real work to do
fn texture(dim: u32) -> RgbImage {
    RgbImage::from_fn(dim, dim, |x, y| {
        let stripes = ((x + y / 3) % 11) as u8 * 20;
        let cells = if (x / 6 + y / 6) % 2 == 0 { 40 } else { 200 };
        Rgb([stripes, cells, stripes / 2 + cells / 2])
    })
}

/// A centered square hole covering `fraction` of each side
fn centered_hole(dim: u32, fraction: u32) -> GrayImage {
    let side = dim / fraction;
    let lo = (dim - side) / 2;
    GrayImage::from_fn(dim, dim, |x, y| {
        if x >= lo && x < lo + side && y >= lo && y < lo + side {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn bench_session(
    img: &RgbImage,
    mask: &GrayImage,
    configure: impl Fn(pi::SessionBuilder<'_>) -> pi::SessionBuilder<'_>,
    iters: u64,
) -> Duration {
    let mut total_elapsed = Duration::new(0, 0);
    for _i in 0..iters {
        let masked = pi::MaskedImage::from_images(img, mask).unwrap();
        let sess = configure(pi::Session::builder().masked_image(masked).seed(120))
            .build()
            .unwrap();

        let start = Instant::now();
        black_box(sess.run());
        total_elapsed += start.elapsed();
    }

    total_elapsed
}

fn image_size(c: &mut Criterion) {
    static DIM: u32 = 32;

    let mut group = c.benchmark_group("image_size");
    group.sample_size(10);

    for dim in [DIM, 2 * DIM, 4 * DIM, 8 * DIM].iter() {
        let img = texture(*dim);
        let mask = centered_hole(*dim, 4);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, _| {
            b.iter_custom(|iters| bench_session(&img, &mask, |sb| sb, iters));
        });
    }
    group.finish();
}

fn patch_radius(c: &mut Criterion) {
    static DIM: u32 = 96;

    let img = texture(DIM);
    let mask = centered_hole(DIM, 4);

    let mut group = c.benchmark_group("patch_radius");
    group.sample_size(10);

    for radius in [1, 2, 3, 5].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(radius), radius, |b, &radius| {
            b.iter_custom(|iters| bench_session(&img, &mask, |sb| sb.patch_radius(radius), iters));
        });
    }
    group.finish();
}

fn cropped(c: &mut Criterion) {
    static DIM: u32 = 256;

    let img = texture(DIM);
    let mask = centered_hole(DIM, 16);

    let mut group = c.benchmark_group("cropped");
    group.sample_size(10);

    for padding in [8, 32, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(padding), padding, |b, &padding| {
            b.iter_custom(|iters| bench_session(&img, &mask, |sb| sb.crop_padding(padding), iters));
        });
    }
    group.finish();
}

fn threads(c: &mut Criterion) {
    static DIM: u32 = 128;

    let img = texture(DIM);
    let mask = centered_hole(DIM, 3);

    let mut group = c.benchmark_group("threads");
    group.sample_size(10);

    for count in [1, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_custom(|iters| {
                bench_session(&img, &mask, |sb| sb.max_thread_count(count), iters)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, image_size, patch_radius, cropped, threads);
criterion_main!(benches);
