#![no_main]
use libfuzzer_sys::fuzz_target;
use geoql::data_section::DataDecoder;
use geoql::resolver::{parse_path, resolve};

fuzz_target!(|data: &[u8]| {
    let decoder = DataDecoder::new(data);
    let _ = decoder.decode(0);
    let _ = decoder.skip(0);
    if let Ok(value) = decoder.decode_ref(0) {
        let _ = decoder.materialize(value);
    }
    let _ = resolve(&decoder, 0, &parse_path("location.time_zone"));
    let _ = resolve(&decoder, 0, &parse_path("subdivisions.0.iso_code"));
});
