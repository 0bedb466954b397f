#![no_main]

use libfuzzer_sys::fuzz_target;
use logship_pipeline::{ParseOutcome, SyslogParser};

fuzz_target!(|data: &[u8]| {
    let parser = SyslogParser::new();

    // 패닉 없이 Parsed 또는 Unparsed를 반환해야 한다
    match parser.parse(data) {
        ParseOutcome::Parsed(record) => assert!(record.severity <= 7),
        ParseOutcome::Unparsed { .. } => {}
    }
});
