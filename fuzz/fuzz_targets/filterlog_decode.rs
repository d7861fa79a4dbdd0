#![no_main]

use libfuzzer_sys::fuzz_target;
use pfnotify_log_pipeline::parser::filterlog;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(entry) = filterlog::decode(content) {
            // anything that decodes is IPv4 and renders
            assert_eq!(entry.ip_version, 4);
            let _ = entry.to_string();
        }
    }
});
