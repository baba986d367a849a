#![allow(dead_code)]

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use statsd_http_proxy::{ProxyResult, StatsdTransport};

// ============================================================================
// UDP receivers standing in for a StatsD server
// ============================================================================

/// Binds an ephemeral loopback socket and collects every datagram until it has been quiet
/// for `quiet`.
pub fn spawn_udp_receiver(quiet: Duration) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("couldn't bind to address");
    let addr = socket.local_addr().unwrap();
    socket
        .set_read_timeout(Some(quiet))
        .expect("set_read_timeout failed");

    let handle = std::thread::spawn(move || {
        let mut buf = [0; 10000];
        let mut received = Vec::<String>::new();
        while let Ok((number_of_bytes, _)) = socket.recv_from(&mut buf) {
            received.push(String::from_utf8(buf[..number_of_bytes].to_vec()).unwrap());
        }
        received
    });
    (addr, handle)
}

/// Binds an ephemeral loopback socket and collects exactly `expected_count` datagrams.
pub fn spawn_udp_receiver_exact(expected_count: usize) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("couldn't bind to address");
    let addr = socket.local_addr().unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set_read_timeout failed");

    let handle = std::thread::spawn(move || {
        let mut buf = [0; 10000];
        let mut received = Vec::<String>::with_capacity(expected_count);
        while received.len() < expected_count {
            let (number_of_bytes, _) = socket.recv_from(&mut buf).expect("Expected udp message");
            received.push(String::from_utf8(buf[..number_of_bytes].to_vec()).unwrap());
        }
        received
    });
    (addr, handle)
}

/// All lines of all datagrams, sorted.
pub fn lines(datagrams: &[String]) -> Vec<String> {
    let mut lines: Vec<String> = datagrams
        .iter()
        .flat_map(|datagram| datagram.lines())
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

// ============================================================================
// Transport doubles
// ============================================================================

/// Records counts and blocks each send for `delay`, simulating a slow sink.
pub struct SlowTransport {
    pub delay: Duration,
    pub counts: Mutex<Vec<(String, i64)>>,
    pub closed: Mutex<bool>,
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            counts: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        })
    }
}

impl StatsdTransport for SlowTransport {
    fn open(&self) -> ProxyResult<()> {
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock() = true;
    }

    fn count(&self, key: &str, delta: i64, _sample_rate: f32) {
        std::thread::sleep(self.delay);
        self.counts.lock().push((key.to_string(), delta));
    }

    fn gauge(&self, _key: &str, _value: i64) {}

    fn set(&self, _key: &str, _member: i64) {}

    fn timing(&self, _key: &str, _duration_millis: i64, _sample_rate: f32) {}
}

/// A transport whose connection can never be opened.
pub struct UnreachableTransport;

impl StatsdTransport for UnreachableTransport {
    fn open(&self) -> ProxyResult<()> {
        Err(statsd_http_proxy::ProxyError::Connection(
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "statsd is down"),
        ))
    }

    fn close(&self) {}

    fn count(&self, _key: &str, _delta: i64, _sample_rate: f32) {}

    fn gauge(&self, _key: &str, _value: i64) {}

    fn set(&self, _key: &str, _member: i64) {}

    fn timing(&self, _key: &str, _duration_millis: i64, _sample_rate: f32) {}
}
