#![no_main]

use libfuzzer_sys::fuzz_target;
use mavmerge::source::parse_line;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let _ = parse_line(1, &line);
});
