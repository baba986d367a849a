use std::sync::Arc;
use std::thread::{spawn, JoinHandle};

use arc_swap::ArcSwapOption;
use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::job::{run_flush_job, QueuedMetric};
use super::writer::{LineFormatter, UdpSocketWriter, Writer};
use super::{StatsdTransport, StatsdType, TransportOptions};
use crate::{ProxyError, ProxyResult};

/// Sends every event as its own datagram.
///
/// The socket lives in an [`ArcSwapOption`] so the send path never takes a lock; `open` and
/// `close` swap it in and out.
pub struct UdpTransport {
    options: TransportOptions,
    socket: ArcSwapOption<UdpSocketWriter>,
    // serializes open/close only
    lifecycle: Mutex<()>,
}

impl UdpTransport {
    /// A closed transport; [`StatsdTransport::open`] binds the socket.
    #[must_use]
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            socket: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
        }
    }

    fn send(&self, key: &str, value: i64, metric_type: StatsdType, sample_rate: f32) {
        let guard = self.socket.load();
        let Some(socket) = &*guard else {
            debug!(key, "StatsD transport is closed, dropping metric");
            return;
        };

        let mut line = String::with_capacity(key.len() + 32);
        LineFormatter::default().encode(&mut line, key, value, metric_type, sample_rate);
        if line.len() > self.options.max_udp_packet_size as usize {
            warn!(
                key,
                "Metric is larger than {}", self.options.max_udp_packet_size
            );
            return;
        }

        // send errors are logged by the socket writer
        let _ = socket.as_ref().write(line.as_bytes());
    }
}

impl StatsdTransport for UdpTransport {
    fn open(&self) -> ProxyResult<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.socket.load().is_some() {
            return Ok(());
        }
        let writer =
            UdpSocketWriter::bind(self.options.destination).map_err(ProxyError::Connection)?;
        self.socket.store(Some(Arc::new(writer)));
        info!(destination = %self.options.destination, "StatsD transport opened");
        Ok(())
    }

    fn close(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.socket.swap(None).is_some() {
            info!("StatsD transport closed");
        }
    }

    fn count(&self, key: &str, delta: i64, sample_rate: f32) {
        self.send(key, delta, StatsdType::Count, sample_rate);
    }

    fn gauge(&self, key: &str, value: i64) {
        self.send(key, value, StatsdType::Gauge, 1.0);
    }

    fn set(&self, key: &str, member: i64) {
        self.send(key, member, StatsdType::Set, 1.0);
    }

    fn timing(&self, key: &str, duration_millis: i64, sample_rate: f32) {
        self.send(key, duration_millis, StatsdType::Timing, sample_rate);
    }
}

/// Queues events and sends them from a background thread, packed into as few datagrams as
/// the packet size allows.
///
/// Events are flushed every `flush_interval`; `close` drains the queue before returning.
pub struct BufferedTransport {
    options: TransportOptions,
    sender: ArcSwapOption<Sender<QueuedMetric>>,
    // only used in cold path
    job_handle: Mutex<Option<JoinHandle<ProxyResult<()>>>>,
}

impl BufferedTransport {
    /// A closed transport; [`StatsdTransport::open`] starts the flush thread.
    #[must_use]
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            sender: ArcSwapOption::empty(),
            job_handle: Mutex::new(None),
        }
    }

    fn send(&self, key: &str, value: i64, metric_type: StatsdType, sample_rate: f32) {
        let guard = self.sender.load();
        let Some(sender) = &*guard else {
            debug!(key, "StatsD transport is closed, dropping metric");
            return;
        };

        let metric = QueuedMetric {
            key: key.to_string(),
            value,
            metric_type,
            sample_rate,
        };
        if sender.send(metric).is_err() {
            debug!(key, "StatsD flush job is gone, dropping metric");
        }
    }
}

impl StatsdTransport for BufferedTransport {
    fn open(&self) -> ProxyResult<()> {
        let mut job_handle = self.job_handle.lock();
        if job_handle.is_some() {
            return Ok(());
        }

        let writer =
            UdpSocketWriter::bind(self.options.destination).map_err(ProxyError::Connection)?;
        let (sender, receiver) = unbounded::<QueuedMetric>();
        let options = self.options.clone();
        *job_handle = Some(spawn(move || run_flush_job(writer, &options, &receiver)));
        self.sender.store(Some(Arc::new(sender)));

        info!(
            destination = %self.options.destination,
            flush_interval = ?self.options.flush_interval,
            "buffered StatsD transport opened"
        );
        Ok(())
    }

    fn close(&self) {
        let mut job_handle = self.job_handle.lock();

        // Dropping the sender signals the background job to drain and stop.
        drop(self.sender.swap(None));

        if let Some(handle) = job_handle.take() {
            match handle.join() {
                Ok(Ok(())) => info!("buffered StatsD transport closed"),
                Ok(Err(err)) => error!("StatsD flush job failed: {err}"),
                Err(_) => error!("StatsD flush job panicked"),
            }
        }
    }

    fn count(&self, key: &str, delta: i64, sample_rate: f32) {
        self.send(key, delta, StatsdType::Count, sample_rate);
    }

    fn gauge(&self, key: &str, value: i64) {
        self.send(key, value, StatsdType::Gauge, 1.0);
    }

    fn set(&self, key: &str, member: i64) {
        self.send(key, member, StatsdType::Set, 1.0);
    }

    fn timing(&self, key: &str, duration_millis: i64, sample_rate: f32) {
        self.send(key, duration_millis, StatsdType::Timing, sample_rate);
    }
}

impl Drop for BufferedTransport {
    fn drop(&mut self) {
        self.close();
    }
}
