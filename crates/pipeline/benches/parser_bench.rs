//! 로그 파서 벤치마크
//!
//! Syslog RFC5424, RFC3164 파서와 HTTP ingest 디코더의 처리량을 측정합니다.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use logship_pipeline::parser::{SyslogParser, decode_ingest_body};

/// Syslog RFC5424 짧은 메시지 (structured data 없음)
const SYSLOG_5424_SHORT: &[u8] =
    b"<34>1 2024-01-15T12:00:00Z myhost sshd 1234 - - Failed password for root";

/// Syslog RFC5424 긴 메시지 (structured data 포함)
const SYSLOG_5424_LONG: &[u8] = b"<34>1 2024-01-15T12:00:00.123456Z web-server-01 nginx 5678 ID123 [request user=\"admin\" path=\"/api/v1/users\" method=\"POST\" status=\"403\"][performance time=\"125ms\" cpu=\"45%\"] Unauthorized API access attempt from 192.168.1.100 to restricted endpoint /api/v1/users";

/// Syslog RFC3164 메시지
const SYSLOG_3164: &[u8] = b"<34>Jan 15 12:00:00 myhost sshd[42]: Failed password for root";

/// 파싱 불가 라인
const UNPARSED: &[u8] = b"plain text that is not syslog at all";

fn bench_syslog(c: &mut Criterion) {
    let parser = SyslogParser::new();
    let mut group = c.benchmark_group("syslog");
    group.throughput(Throughput::Elements(1));

    for (name, input) in [
        ("rfc5424_short", SYSLOG_5424_SHORT),
        ("rfc5424_long", SYSLOG_5424_LONG),
        ("rfc3164", SYSLOG_3164),
        ("unparsed", UNPARSED),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, input| {
            b.iter(|| parser.parse(black_box(input)))
        });
    }

    group.finish();
}

fn bench_ingest_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_body");

    for size in [1usize, 100, 1000] {
        let items: Vec<String> = (0..size)
            .map(|i| format!(r#"{{"host":"web-{i}","level":"info","message":"request {i} done"}}"#))
            .collect();
        let body = format!("[{}]", items.join(","));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), body.as_bytes(), |b, body| {
            b.iter(|| decode_ingest_body(black_box(body)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_syslog, bench_ingest_body);
criterion_main!(benches);
