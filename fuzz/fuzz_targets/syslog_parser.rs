#![no_main]

use libfuzzer_sys::fuzz_target;
use pfnotify_log_pipeline::parser::SyslogParser;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let parser = SyslogParser::new();

    // Ok or Err, never a panic
    let _ = parser.parse(&line);
});
