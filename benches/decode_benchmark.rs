//! Benchmarks for zenscan decoding

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Cursor;
use zenscan::{AlphaType, Codec, DecodeOptions, GrowingStream};

const WIDTH: u32 = 512;
const HEIGHT: u32 = 384;

fn rgb_pixels() -> Vec<u8> {
    let mut out = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            out.extend_from_slice(&[(x ^ y) as u8, (x * 3) as u8, (y * 5) as u8]);
        }
    }
    out
}

fn png_fixture(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, WIDTH, HEIGHT);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(rgb).unwrap();
    writer.finish().unwrap();
    out
}

fn bmp_fixture(rgb: &[u8]) -> Vec<u8> {
    let img = image::RgbImage::from_raw(WIDTH, HEIGHT, rgb.to_vec()).unwrap();
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Bmp).unwrap();
    out.into_inner()
}

fn ppm_fixture(rgb: &[u8]) -> Vec<u8> {
    let mut out = format!("P6\n{WIDTH} {HEIGHT}\n255\n").into_bytes();
    out.extend_from_slice(rgb);
    out
}

/// Single-frame GIF with literal-only LZW codes.
fn gif_fixture() -> Vec<u8> {
    let (w, h) = (WIDTH as u16, HEIGHT as u16);
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&w.to_le_bytes());
    out.extend_from_slice(&h.to_le_bytes());
    out.extend_from_slice(&[0xF7, 0, 0]);
    for i in 0..=255u8 {
        out.extend_from_slice(&[i, i.wrapping_mul(7), 255 - i]);
    }
    out.push(0x2C);
    for v in [0u16, 0, w, h] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&[0, 8]);

    let mut lzw = Vec::new();
    let (mut bits, mut nbits) = (0u32, 0);
    let mut emit = |code: u32, lzw: &mut Vec<u8>| {
        bits |= code << nbits;
        nbits += 9;
        while nbits >= 8 {
            lzw.push(bits as u8);
            bits >>= 8;
            nbits -= 8;
        }
    };
    let indices: Vec<u32> = (0..u32::from(w) * u32::from(h)).map(|i| (i / 3) % 256).collect();
    for chunk in indices.chunks(200) {
        emit(256, &mut lzw);
        for &i in chunk {
            emit(i, &mut lzw);
        }
    }
    emit(257, &mut lzw);
    if nbits > 0 {
        lzw.push(bits as u8);
    }
    for block in lzw.chunks(255) {
        out.push(block.len() as u8);
        out.extend_from_slice(block);
    }
    out.extend_from_slice(&[0, 0x3B]);
    out
}

fn fixtures() -> Vec<(&'static str, Vec<u8>)> {
    let rgb = rgb_pixels();
    vec![
        ("png", png_fixture(&rgb)),
        ("gif", gif_fixture()),
        ("bmp", bmp_fixture(&rgb)),
        ("ppm", ppm_fixture(&rgb)),
    ]
}

fn benchmark_whole_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("whole_image");
    group.throughput(Throughput::Elements(u64::from(WIDTH * HEIGHT)));
    for (name, bytes) in fixtures() {
        group.bench_function(name, |b| {
            b.iter(|| {
                let image = zenscan::decode(black_box(&bytes)).unwrap();
                black_box(image)
            });
        });
    }
    group.finish();
}

fn benchmark_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_4k_chunks");
    group.throughput(Throughput::Elements(u64::from(WIDTH * HEIGHT)));
    for (name, bytes) in fixtures() {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut fed = 4096.min(bytes.len());
                let mut codec = Codec::new(GrowingStream::with_prefix(&bytes[..fed])).unwrap();
                let target = codec.info().with_alpha_type(AlphaType::Unpremul);
                let row_bytes = target.min_row_bytes();
                let mut buf = vec![0u8; target.compute_byte_size(row_bytes)];
                let options = DecodeOptions::new();
                codec
                    .start_incremental_decode(&target, &mut buf, row_bytes, &options, None)
                    .unwrap();
                while !codec.incremental_decode(&mut buf).unwrap().is_complete() {
                    let next = (fed + 4096).min(bytes.len());
                    codec.stream_mut().push(&bytes[fed..next]);
                    fed = next;
                    if fed == bytes.len() {
                        codec.stream_mut().finish();
                    }
                }
                black_box(buf)
            });
        });
    }
    group.finish();
}

fn benchmark_scaled_scanlines(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanlines_sample_4");
    for (name, bytes) in fixtures() {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut codec = Codec::from_data(bytes.clone()).unwrap();
                let target = codec
                    .info()
                    .with_alpha_type(AlphaType::Unpremul)
                    .with_dimensions(WIDTH / 4, HEIGHT / 4);
                let row_bytes = target.min_row_bytes();
                codec
                    .start_scanline_decode(&target, &DecodeOptions::new(), None)
                    .unwrap();
                let mut row = vec![0u8; row_bytes];
                for _ in 0..target.height {
                    codec.get_scanlines(&mut row, 1, row_bytes).unwrap();
                    black_box(&row);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_whole_image,
    benchmark_incremental,
    benchmark_scaled_scanlines
);
criterion_main!(benches);
