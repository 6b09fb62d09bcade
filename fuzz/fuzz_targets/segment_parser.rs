#![no_main]

use libfuzzer_sys::fuzz_target;
use mavmerge::segment::{parse_segments, Segment};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Neither form may panic, whatever the input
        let _ = input.parse::<Segment>();
        let _ = parse_segments(&[input.to_string()]);
    }
});
