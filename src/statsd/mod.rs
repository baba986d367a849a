//! StatsD transports and the line format they write.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::{ProxyError, ProxyResult};

/// The `simple` and `buffered` transports.
pub mod client;
mod job;
/// Line encoding and datagram packing.
pub mod writer;

pub use client::{BufferedTransport, UdpTransport};

/// Identifier of the transport that sends one datagram per event.
pub const SIMPLE_TRANSPORT: &str = "simple";
/// Identifier of the transport that batches events on a background thread.
pub const BUFFERED_TRANSPORT: &str = "buffered";

/// StatsD line types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StatsdType {
    Count,
    Gauge,
    Timing,
    Set,
}

impl StatsdType {
    /// Type marker written after the `|`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "c",
            Self::Gauge => "g",
            Self::Timing => "ms",
            Self::Set => "s",
        }
    }
}

/// Interface to a StatsD-compatible sink.
///
/// One transport is shared by every in-flight request, so implementations synchronize
/// internally. Sends are fire-and-forget: failures are logged by the transport and never
/// surface to the caller.
pub trait StatsdTransport: Send + Sync {
    /// Opens the connection. Opening an open transport is a no-op.
    ///
    /// # Errors
    /// Returns [`ProxyError::Connection`] when the socket cannot be created.
    fn open(&self) -> ProxyResult<()>;

    /// Closes the connection, sending anything still buffered.
    fn close(&self);

    /// Sends `key:delta|c`, with `|@sample_rate` when the rate is below 1.
    fn count(&self, key: &str, delta: i64, sample_rate: f32);

    /// Sends `key:value|g`.
    fn gauge(&self, key: &str, value: i64);

    /// Sends `key:member|s`.
    fn set(&self, key: &str, member: i64);

    /// Sends `key:duration_millis|ms`, with `|@sample_rate` when the rate is below 1.
    fn timing(&self, key: &str, duration_millis: i64, sample_rate: f32);
}

impl<T: StatsdTransport + ?Sized> StatsdTransport for Arc<T> {
    fn open(&self) -> ProxyResult<()> {
        self.as_ref().open()
    }

    fn close(&self) {
        self.as_ref().close();
    }

    fn count(&self, key: &str, delta: i64, sample_rate: f32) {
        self.as_ref().count(key, delta, sample_rate);
    }

    fn gauge(&self, key: &str, value: i64) {
        self.as_ref().gauge(key, value);
    }

    fn set(&self, key: &str, member: i64) {
        self.as_ref().set(key, member);
    }

    fn timing(&self, key: &str, duration_millis: i64, sample_rate: f32) {
        self.as_ref().timing(key, duration_millis, sample_rate);
    }
}

/// Settings shared by the concrete transports.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// StatsD server address.
    pub destination: SocketAddr,
    /// Maximum size of a single UDP datagram in bytes. Recommended: 1432 for safe MTU.
    pub max_udp_packet_size: u16,
    /// How often the buffered transport sends what it has queued.
    pub flush_interval: Duration,
}

impl TransportOptions {
    /// Options for `destination` with the default packet size and flush interval.
    #[must_use]
    pub const fn new(destination: SocketAddr) -> Self {
        Self {
            destination,
            max_udp_packet_size: 1432,
            flush_interval: Duration::from_millis(100),
        }
    }
}

/// Identifiers accepted by [`build_transport`].
pub const TRANSPORT_NAMES: [&str; 2] = [SIMPLE_TRANSPORT, BUFFERED_TRANSPORT];

/// Creates the transport registered under `name`. The transport is returned closed.
///
/// # Errors
/// Returns [`ProxyError::Configuration`] for an unknown identifier.
pub fn build_transport(
    name: &str,
    options: TransportOptions,
) -> ProxyResult<Arc<dyn StatsdTransport>> {
    match name {
        SIMPLE_TRANSPORT => Ok(Arc::new(UdpTransport::new(options))),
        BUFFERED_TRANSPORT => Ok(Arc::new(BufferedTransport::new(options))),
        other => Err(ProxyError::Configuration(format!(
            "StatsD client '{other}' is not supported, expected one of {TRANSPORT_NAMES:?}"
        ))),
    }
}
