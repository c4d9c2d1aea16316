//! Incremental decoding from streams that grow one byte at a time
//!
//! Every format must end up with exactly the pixels a whole-image decode
//! of the complete file produces.

mod common;

use common::*;
use zenscan::{
    Codec, DecodeMode, DecodeOptions, DecodeStatus, Error, GrowingStream, ImageInfo, ResultCode,
};

fn whole(bytes: &[u8], target: &ImageInfo) -> Vec<u8> {
    let mut codec = Codec::from_data(bytes.to_vec()).unwrap();
    let (pixels, report) = codec.pixels(target, &DecodeOptions::new(), None).unwrap();
    assert!(report.is_complete());
    pixels
}

/// Feed `bytes` one at a time, decoding after every byte.
fn byte_by_byte(bytes: &[u8]) -> (ImageInfo, Vec<u8>) {
    let (mut codec, mut fed) = codec_from_prefix(bytes);
    let target = codec.info();
    let row_bytes = target.min_row_bytes();
    let mut buf = vec![0u8; target.compute_byte_size(row_bytes)];
    codec
        .start_incremental_decode(&target, &mut buf, row_bytes, &DecodeOptions::new(), None)
        .unwrap();
    assert_eq!(codec.decode_mode(), DecodeMode::Incremental);

    let mut last_rows = 0;
    loop {
        let report = codec.incremental_decode(&mut buf).unwrap();
        assert!(report.rows_decoded >= last_rows, "rows went backwards");
        last_rows = report.rows_decoded;
        if report.is_complete() {
            assert_eq!(report.rows_decoded, target.height);
            break;
        }
        assert_eq!(report.status, DecodeStatus::IncompleteInput);
        assert!(fed < bytes.len(), "stream exhausted before the image completed");
        codec.stream_mut().push(&bytes[fed..fed + 1]);
        fed += 1;
        if fed == bytes.len() {
            codec.stream_mut().finish();
        }
    }
    (target, buf)
}

fn assert_equivalent(bytes: &[u8]) {
    let (target, incremental) = byte_by_byte(bytes);
    assert_eq!(incremental, whole(bytes, &target));
}

#[test]
fn png_byte_by_byte_matches_whole_image() {
    init_logging();
    let bytes = png_rgba(11, 9, &rgba_pattern(11, 9));
    assert_equivalent(&bytes);
}

#[test]
fn png_over_many_idat_chunks() {
    let rgb = rgb_pattern(10, 10);
    let bytes = RawPng::new(10, 10, 8, 2, 0)
        .idat(&unfiltered(&rgb, 30), 7)
        .finish();
    let (_, pixels) = byte_by_byte(&bytes);
    assert_eq!(pixels, opaque(&rgb));
}

#[test]
fn gif_byte_by_byte_matches_whole_image() {
    let palette = [[10, 20, 30], [200, 100, 0], [0, 0, 0], [255, 255, 255]];
    let indices: Vec<u8> = (0..12 * 9).map(|i| (i % 4) as u8).collect();
    let mut frame = GifFrame::new(0, 0, 12, 9, indices);
    frame.interlaced = true;
    let bytes = gif(12, 9, &palette, None, &[frame]);
    assert_equivalent(&bytes);
}

#[test]
fn bmp_byte_by_byte_matches_whole_image() {
    let bytes = bmp_24(6, 5, &rgb_pattern(6, 5), false);
    assert_equivalent(&bytes);
}

#[test]
fn pnm_byte_by_byte_matches_whole_image() {
    let bytes = ppm(7, 3, &rgb_pattern(7, 3));
    assert_equivalent(&bytes);
}

#[test]
fn incremental_requires_the_same_buffer() {
    let bytes = png_rgba(4, 4, &rgba_pattern(4, 4));
    let mut codec = Codec::from_data(bytes).unwrap();
    let info = codec.info();

    let mut buf = vec![0u8; 64];
    let err = codec.incremental_decode(&mut buf).unwrap_err();
    assert_eq!(err.into_inner().code(), ResultCode::InvalidParameters);

    codec
        .start_incremental_decode(&info, &mut buf, 16, &DecodeOptions::new(), None)
        .unwrap();
    let mut other = vec![0u8; 80];
    let err = codec.incremental_decode(&mut other).unwrap_err();
    assert_eq!(err.into_inner().code(), ResultCode::InvalidParameters);

    let report = codec.incremental_decode(&mut buf).unwrap();
    assert!(report.is_complete());
    // a finished decode keeps reporting completion
    let again = codec.incremental_decode(&mut buf).unwrap();
    assert_eq!(again, report);
}

#[test]
fn failed_incremental_decode_stays_failed() {
    let rgb = rgb_pattern(3, 4);
    let mut filtered = unfiltered(&rgb, 9);
    filtered[10] = 7;
    let bytes = RawPng::new(3, 4, 8, 2, 0).idat(&filtered, 64).finish();
    let mut codec = Codec::from_data(bytes).unwrap();
    let info = codec.info();
    let mut buf = vec![0u8; 48];
    codec
        .start_incremental_decode(&info, &mut buf, 12, &DecodeOptions::new(), None)
        .unwrap();
    let err = codec.incremental_decode(&mut buf).unwrap_err().into_inner();
    assert!(matches!(err, Error::ErrorInInput { rows_decoded: 1, .. }));
    let err = codec.incremental_decode(&mut buf).unwrap_err();
    assert_eq!(err.into_inner().code(), ResultCode::InvalidParameters);
}

#[test]
fn whole_image_decode_retries_after_more_input() {
    let rgb = rgb_pattern(16, 16);
    let bytes = RawPng::new(16, 16, 8, 2, 0)
        .idat(&unfiltered(&rgb, 48), 100)
        .finish();
    let cut = bytes.len() / 2;
    let mut codec = Codec::new(GrowingStream::with_prefix(&bytes[..cut])).unwrap();
    let info = codec.info();

    let (partial, report) = codec.pixels(&info, &DecodeOptions::new(), None).unwrap();
    assert_eq!(report.status, DecodeStatus::IncompleteInput);
    assert!(report.rows_decoded < 16);
    let rows = report.rows_decoded as usize;
    assert!(partial[rows * 64..].iter().all(|&b| b == 0));

    codec.stream_mut().push(&bytes[cut..]);
    codec.stream_mut().finish();
    let (pixels, report) = codec.pixels(&info, &DecodeOptions::new(), None).unwrap();
    assert!(report.is_complete());
    assert_eq!(pixels, opaque(&rgb));
    assert_eq!(codec.decode_mode(), DecodeMode::WholeImage);
}

#[test]
fn bmp_pixels_far_past_the_first_read() {
    let rgb = rgb_pattern(2, 2);
    let bytes = with_pixel_gap(&bmp_24(2, 2, &rgb, false), 10_000);
    let mut codec = Codec::from_data(bytes).unwrap();
    let info = codec.info();
    let (pixels, report) = codec.pixels(&info, &DecodeOptions::new(), None).unwrap();
    assert!(report.is_complete());
    assert_eq!(pixels, opaque(&rgb));
}

#[test]
fn bmp_pixel_offset_not_yet_received() {
    let rgb = rgb_pattern(2, 2);
    let bytes = with_pixel_gap(&bmp_24(2, 2, &rgb, true), 16);
    let mut codec = Codec::new(GrowingStream::with_prefix(&bytes[..60])).unwrap();
    let info = codec.info();
    let mut buf = vec![0u8; 16];
    codec
        .start_incremental_decode(&info, &mut buf, 8, &DecodeOptions::new(), None)
        .unwrap();
    let report = codec.incremental_decode(&mut buf).unwrap();
    assert_eq!(report.status, DecodeStatus::IncompleteInput);
    assert_eq!(report.rows_decoded, 0);

    codec.stream_mut().push(&bytes[60..]);
    codec.stream_mut().finish();
    let report = codec.incremental_decode(&mut buf).unwrap();
    assert!(report.is_complete());
    assert_eq!(buf, opaque(&rgb));
}

#[test]
fn bmp_with_gap_byte_by_byte() {
    let bytes = with_pixel_gap(&bmp_24(3, 2, &rgb_pattern(3, 2), false), 37);
    assert_equivalent(&bytes);
}

#[test]
fn construction_waits_for_a_complete_header() {
    let bytes = bmp_24(3, 3, &rgb_pattern(3, 3), true);
    let (codec, n) = codec_from_prefix(&bytes);
    assert_eq!(n, 54, "file header plus 40-byte info header");
    assert_eq!(codec.info().width, 3);

    let err = match Codec::new(GrowingStream::with_prefix(&bytes[..n - 1])) {
        Ok(_) => panic!("header is incomplete"),
        Err(e) => e.into_inner(),
    };
    assert!(err.is_retryable());
}
