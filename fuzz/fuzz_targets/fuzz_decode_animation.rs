#![no_main]

use libfuzzer_sys::fuzz_target;
use zenscan::{AlphaType, Codec, DecodeOptions, DecoderConfig};

fuzz_target!(|data: &[u8]| {
    let config = DecoderConfig::new()
        .frame_size_limit(1024 * 1024)
        .max_frames(16);
    let Ok(mut codec) = Codec::with_config(std::io::Cursor::new(data), &config) else {
        return;
    };
    let target = codec.info().with_alpha_type(AlphaType::Unpremul);
    for index in 0..codec.frame_count() {
        let options = DecodeOptions::new().frame_index(index);
        if codec.pixels(&target, &options, None).is_err() {
            break;
        }
    }
});
