#![no_main]

use libfuzzer_sys::fuzz_target;
use zenscan::{Codec, ImageFormat};

fuzz_target!(|data: &[u8]| {
    let _ = ImageFormat::detect(data);
    if let Ok(mut codec) = Codec::from_data(data) {
        let _ = codec.info();
        let _ = codec.encoded_info();
        let _ = codec.origin();
        let _ = codec.frame_count();
        let _ = codec.valid_subset(zenscan::IRect::new(1, 1, 7, 7));
    }
});
