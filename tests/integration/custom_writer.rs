use statsd_http_proxy::statsd::writer::{push_line, LineFormatter, StatsWriterTrait};
use statsd_http_proxy::statsd::StatsdType;
use statsd_http_proxy::ProxyResult;

/// Collects lines in memory, one chunk per flush; no sockets involved
#[derive(Default)]
struct MemoryWriter {
    chunks: Vec<String>,
    current: String,
}

impl MemoryWriter {
    fn all_text(&self) -> String {
        self.chunks.concat()
    }
}

impl StatsWriterTrait for MemoryWriter {
    fn write(
        &mut self,
        key: &str,
        value: &str,
        metric_type: &str,
        sample_rate: &str,
    ) -> ProxyResult<()> {
        push_line(&mut self.current, key, value, metric_type, sample_rate);
        Ok(())
    }

    fn flush(&mut self) -> ProxyResult<usize> {
        if self.current.is_empty() {
            return Ok(0);
        }
        let size = self.current.len();
        self.chunks.push(std::mem::take(&mut self.current));
        Ok(size)
    }

    fn reset(&mut self) {
        self.current.clear();
    }
}

#[test]
fn test_formatter_drives_custom_writer() {
    let mut writer = MemoryWriter::default();
    let mut formatter = LineFormatter::default();

    formatter
        .write_to(&mut writer, "app.logins", 3, StatsdType::Count, 1.0)
        .unwrap();
    formatter
        .write_to(&mut writer, "app.logins", 1, StatsdType::Count, 0.1)
        .unwrap();
    formatter
        .write_to(&mut writer, "app.queue", -2, StatsdType::Gauge, 1.0)
        .unwrap();
    formatter
        .write_to(&mut writer, "app.db", 250, StatsdType::Timing, 0.5)
        .unwrap();
    formatter
        .write_to(&mut writer, "app.users", 9, StatsdType::Set, 1.0)
        .unwrap();

    let flushed = writer.flush().unwrap();
    assert_eq!(flushed, writer.all_text().len());
    assert_eq!(
        writer.all_text(),
        "app.logins:3|c\napp.logins:1|c|@0.1\napp.queue:-2|g\napp.db:250|ms|@0.5\napp.users:9|s\n"
    );
}

#[test]
fn test_reset_clears_pending_lines() {
    let mut writer = MemoryWriter::default();
    LineFormatter::default()
        .write_to(&mut writer, "pending", 7, StatsdType::Gauge, 1.0)
        .unwrap();
    writer.reset();

    assert_eq!(writer.flush().unwrap(), 0);
    assert!(writer.all_text().is_empty());
}

#[test]
fn test_sample_rate_of_one_or_more_is_omitted() {
    let mut line = String::new();
    let mut formatter = LineFormatter::default();
    formatter.encode(&mut line, "a", 1, StatsdType::Count, 1.0);
    formatter.encode(&mut line, "b", 1, StatsdType::Count, 2.0);
    formatter.encode(&mut line, "c", 1, StatsdType::Timing, 0.75);
    assert_eq!(line, "a:1|c\nb:1|c\nc:1|ms|@0.75\n");
}
