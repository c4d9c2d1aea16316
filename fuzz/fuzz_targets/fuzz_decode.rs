#![no_main]

use libfuzzer_sys::fuzz_target;
use zenscan::DecoderConfig;

fuzz_target!(|data: &[u8]| {
    let config = DecoderConfig::new().frame_size_limit(4096 * 4096);
    let _ = zenscan::decode_with(data, &config);
});
