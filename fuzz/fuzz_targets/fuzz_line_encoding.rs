#![no_main]

use libfuzzer_sys::fuzz_target;
use statsd_http_proxy::statsd::writer::{LineFormatter, StatsWriterSimple, StatsWriterTrait, Writer};
use statsd_http_proxy::statsd::StatsdType;

struct NullWriter;

impl Writer for NullWriter {
    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        assert!(buf.len() <= 64);
        Ok(buf.len())
    }
}

// Packed datagrams never exceed the packet size, whatever the key and value
fuzz_target!(|input: (String, i64, f32, u8)| {
    let (key, value, sample_rate, kind) = input;
    let metric_type = match kind % 4 {
        0 => StatsdType::Count,
        1 => StatsdType::Gauge,
        2 => StatsdType::Timing,
        _ => StatsdType::Set,
    };

    let mut writer = StatsWriterSimple::new(NullWriter, 64);
    let mut formatter = LineFormatter::default();
    for _ in 0..4 {
        let _ = formatter.write_to(&mut writer, &key, value, metric_type, sample_rate);
    }
    let _ = writer.flush();
});
