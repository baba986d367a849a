use crossbeam::channel::{tick, Receiver};
use crossbeam::select;
use tracing::{debug, error, warn};

use super::writer::{LineFormatter, StatsWriterSimple, StatsWriterTrait, UdpSocketWriter};
use super::{StatsdType, TransportOptions};
use crate::ProxyResult;

/// One event waiting for the next flush.
#[derive(Debug, Clone)]
pub struct QueuedMetric {
    pub key: String,
    pub value: i64,
    pub metric_type: StatsdType,
    pub sample_rate: f32,
}

struct FlushJob<W> {
    stats_writer: W,
    formatter: LineFormatter,
}

impl<W: StatsWriterTrait> FlushJob<W> {
    fn write(&mut self, metric: &QueuedMetric) {
        if let Err(err) = self.formatter.write_to(
            &mut self.stats_writer,
            &metric.key,
            metric.value,
            metric.metric_type,
            metric.sample_rate,
        ) {
            warn!(key = %metric.key, "Error queueing metric: {err}");
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.stats_writer.flush() {
            error!("Error sending metrics: {err}");
        }
    }
}

/// Runs until every sender of `receiver` is dropped, then sends what is left and returns.
pub fn run_flush_job(
    writer: UdpSocketWriter,
    options: &TransportOptions,
    receiver: &Receiver<QueuedMetric>,
) -> ProxyResult<()> {
    let mut job = FlushJob {
        stats_writer: StatsWriterSimple::new(writer, options.max_udp_packet_size),
        formatter: LineFormatter::default(),
    };

    let flush_tick = tick(options.flush_interval);

    loop {
        // wait for time to flush, a new metric or the shutdown signal
        select! {
            recv(flush_tick) -> _ => job.flush(),
            recv(receiver) -> metric => match metric {
                Ok(metric) => job.write(&metric),
                Err(_) => {
                    // queue is empty and every sender is gone: the transport was closed
                    job.flush();
                    debug!("StatsD flush job stopped");
                    return Ok(());
                }
            },
        }
    }
}
