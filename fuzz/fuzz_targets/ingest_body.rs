#![no_main]

use libfuzzer_sys::fuzz_target;
use logship_pipeline::decode_ingest_body;

fuzz_target!(|data: &[u8]| {
    // 성공하면 모든 레코드가 원본 객체 텍스트를 가져야 한다
    if let Ok(records) = decode_ingest_body(data) {
        for record in records {
            let event = record.into_new_event("192.0.2.1");
            assert!(event.raw.starts_with('{'));
        }
    }
});
