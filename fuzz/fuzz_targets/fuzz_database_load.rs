#![no_main]
use libfuzzer_sys::fuzz_target;
use geoql::resolver::parse_path;

fuzz_target!(|data: &[u8]| {
    // Never crash or panic, even on garbage input
    if let Ok(db) = geoql::Database::from_bytes(data.to_vec()) {
        for ip in ["1.1.1.1", "0.0.0.0", "255.255.255.255", "::", "2001:db8::1"] {
            if let Ok(Some(entry)) = db.lookup_str(ip) {
                let _ = entry.get(&parse_path("country.names.en"));
                let _ = entry.get(&parse_path("subdivisions.0.names.en"));
                let _ = entry.decode();
            }
        }
    }
});
