#![no_main]

use libfuzzer_sys::fuzz_target;
use zenscan::{AlphaType, Codec, DecodeOptions, DecoderConfig, GrowingStream};

// First byte picks the feed size.
fuzz_target!(|data: &[u8]| {
    let Some((&step, data)) = data.split_first() else {
        return;
    };
    let step = usize::from(step).max(1);
    let config = DecoderConfig::new().frame_size_limit(1024 * 1024);

    let mut fed = step.min(data.len());
    let mut stream = GrowingStream::with_prefix(&data[..fed]);
    let mut codec = loop {
        if fed == data.len() {
            stream.finish();
        }
        match Codec::with_config(stream, &config) {
            Ok(codec) => break codec,
            Err(_) if fed < data.len() => {
                let next = (fed + step).min(data.len());
                stream = GrowingStream::with_prefix(&data[..next]);
                fed = next;
            }
            Err(_) => return,
        }
    };

    let target = codec.info().with_alpha_type(AlphaType::Unpremul);
    let row_bytes = target.min_row_bytes();
    let mut buf = vec![0u8; target.compute_byte_size(row_bytes)];
    if codec
        .start_incremental_decode(&target, &mut buf, row_bytes, &DecodeOptions::new(), None)
        .is_err()
    {
        return;
    }
    loop {
        match codec.incremental_decode(&mut buf) {
            Ok(report) if report.is_complete() => return,
            Ok(_) if fed < data.len() => {
                let next = (fed + step).min(data.len());
                codec.stream_mut().push(&data[fed..next]);
                fed = next;
                if fed == data.len() {
                    codec.stream_mut().finish();
                }
            }
            _ => return,
        }
    }
});
