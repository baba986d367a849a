use std::fmt::Write as _;
use std::net::{SocketAddr, UdpSocket};

use itoa::Buffer;

use super::StatsdType;
use crate::ProxyResult;

/// Sends one finished datagram.
pub trait Writer {
    /// # Errors
    /// Any I/O error from the underlying socket.
    fn write(&self, buf: &[u8]) -> std::io::Result<usize>;
}

impl<T> Writer for &T
where
    T: Writer,
{
    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        (*self).write(buf)
    }
}

/// [`Writer`] over an unconnected UDP socket.
pub struct UdpSocketWriter {
    /// Local socket, bound to an ephemeral port.
    pub sock: UdpSocket,
    /// StatsD server every datagram goes to.
    pub destination_addr: SocketAddr,
}

impl UdpSocketWriter {
    /// Binds an ephemeral local socket of the same address family as `destination_addr`.
    ///
    /// # Errors
    /// Fails when no local socket can be bound.
    pub fn bind(destination_addr: SocketAddr) -> std::io::Result<Self> {
        let bind_addr: SocketAddr = match destination_addr {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        Ok(Self {
            sock: UdpSocket::bind(bind_addr)?,
            destination_addr,
        })
    }
}

impl Writer for UdpSocketWriter {
    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        let r = self.sock.send_to(buf, self.destination_addr);
        if let Err(ref err) = r {
            tracing::warn!("UDP send error: {err}");
        }
        r
    }
}

/// Trait for implementing custom StatsD line writers.
///
/// Implement this trait to send lines to custom destinations or to change the batching logic.
pub trait StatsWriterTrait {
    /// Appends one line. `sample_rate` is empty when the line carries none.
    ///
    /// # Errors
    /// Returns `ProxyResult::Err` if the line cannot be written.
    fn write(
        &mut self,
        key: &str,
        value: &str,
        metric_type: &str,
        sample_rate: &str,
    ) -> ProxyResult<()>;

    /// Sends whatever is buffered.
    ///
    /// # Errors
    /// Returns `ProxyResult::Err` on I/O failure.
    fn flush(&mut self) -> ProxyResult<usize>;

    /// Resets the writer state, clearing any internal buffers.
    fn reset(&mut self);
}

/// Length of the line [`push_line`] would append, newline included.
#[inline]
pub fn line_len(key: &str, value: &str, metric_type: &str, sample_rate: &str) -> usize {
    // format!("{}:{}|{}\n", key, value, metric_type) without a sample rate
    // format!("{}:{}|{}|@{}\n", key, value, metric_type, sample_rate) with one
    let mut len = key.len() + value.len() + metric_type.len() + 3; // ':' + '|' + '\n'
    if !sample_rate.is_empty() {
        len += sample_rate.len() + 2; // '|@'
    }
    len
}

/// Appends one encoded line to `out`.
pub fn push_line(out: &mut String, key: &str, value: &str, metric_type: &str, sample_rate: &str) {
    out.push_str(key);
    out.push(':');
    out.push_str(value);
    out.push('|');
    out.push_str(metric_type);
    if !sample_rate.is_empty() {
        out.push_str("|@");
        out.push_str(sample_rate);
    }
    out.push('\n');
}

/// Formats numeric parts of a line without allocating per call.
#[derive(Default)]
pub struct LineFormatter {
    value: Buffer,
    sample_rate: String,
}

impl LineFormatter {
    /// Writes `key`'s line through `writer`. The sample rate is only emitted when below one.
    ///
    /// # Errors
    /// Propagates the writer's error.
    pub fn write_to(
        &mut self,
        writer: &mut dyn StatsWriterTrait,
        key: &str,
        value: i64,
        metric_type: StatsdType,
        sample_rate: f32,
    ) -> ProxyResult<()> {
        self.sample_rate.clear();
        if sample_rate < 1.0 {
            let _ = write!(self.sample_rate, "{sample_rate}");
        }
        let value = self.value.format(value);
        writer.write(key, value, metric_type.as_str(), &self.sample_rate)
    }

    /// Encodes one line into `out`.
    pub fn encode(
        &mut self,
        out: &mut String,
        key: &str,
        value: i64,
        metric_type: StatsdType,
        sample_rate: f32,
    ) {
        self.sample_rate.clear();
        if sample_rate < 1.0 {
            let _ = write!(self.sample_rate, "{sample_rate}");
        }
        let value = self.value.format(value);
        push_line(out, key, value, metric_type.as_str(), &self.sample_rate);
    }
}

/// Packs lines into datagrams of at most `max_udp_packet_size` bytes.
pub struct StatsWriterSimple<T> {
    max_udp_packet_size: u16,
    writer: T,
    current_transmit: String,
}

impl<T: Writer> StatsWriterSimple<T> {
    /// Writer packing into datagrams of at most `max_udp_packet_size` bytes.
    pub fn new(writer: T, max_udp_packet_size: u16) -> Self {
        Self {
            max_udp_packet_size,
            writer,
            current_transmit: String::with_capacity(max_udp_packet_size as usize),
        }
    }

    fn flush_current_transmit(&mut self) -> ProxyResult<usize> {
        if !self.current_transmit.is_empty() {
            let result = self.writer.write(self.current_transmit.as_bytes());
            // the datagram is gone either way, a failed send is not retried
            self.current_transmit.clear();
            return Ok(result?);
        }
        Ok(0)
    }

    /// Bytes buffered for the next datagram.
    pub fn pending(&self) -> usize {
        self.current_transmit.len()
    }
}

impl<T: Writer> StatsWriterTrait for StatsWriterSimple<T> {
    fn write(
        &mut self,
        key: &str,
        value: &str,
        metric_type: &str,
        sample_rate: &str,
    ) -> ProxyResult<()> {
        let line_len = line_len(key, value, metric_type, sample_rate);

        if line_len > self.max_udp_packet_size as usize {
            return Err(format!("Metric is larger than {}", self.max_udp_packet_size).into());
        }

        // If not enough space, send what is queued first
        if self.current_transmit.len() + line_len > self.max_udp_packet_size as usize {
            self.flush_current_transmit()?;
        }

        push_line(
            &mut self.current_transmit,
            key,
            value,
            metric_type,
            sample_rate,
        );

        Ok(())
    }

    fn flush(&mut self) -> ProxyResult<usize> {
        self.flush_current_transmit()
    }

    fn reset(&mut self) {
        self.current_transmit.clear();
    }
}
