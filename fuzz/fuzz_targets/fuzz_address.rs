#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = geoql::address::parse_any(text);
    for len in [-1i64, 0, 8, 24, 32, 33, 64, 128, 129] {
        let _ = geoql::ipmask(Some(text), Some(len));
        let _ = geoql::ip6mask(Some(text), Some(len));
    }
});
