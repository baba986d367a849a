use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::keys::MetricPrefix;
use crate::router::ROUTER_NAMES;
use crate::statsd::{TransportOptions, TRANSPORT_NAMES};
use crate::{ProxyError, ProxyResult};

/// Listen on loopback only unless told otherwise.
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
/// Default listener port.
pub const DEFAULT_HTTP_PORT: u16 = 8825;
/// Default for every HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(1);
/// Default StatsD host.
pub const DEFAULT_STATSD_HOST: &str = "127.0.0.1";
/// Standard StatsD port.
pub const DEFAULT_STATSD_PORT: u16 = 8125;
/// Header whose value becomes the `by_country` key segment.
pub const DEFAULT_KEY_PART_HEADER: &str = "Geoip-Country-Code";
/// Grace period for in-flight requests.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Largest datagram that fits a 1500 byte MTU with room for headers.
pub const DEFAULT_MAX_PACKET_SIZE: u16 = 1432;
/// How often the buffered transport sends.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Certificate and private key, both PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Certificate chain.
    pub cert_path: PathBuf,
    /// Private key for the first certificate.
    pub key_path: PathBuf,
}

/// Process-wide settings, fixed once the proxy starts.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Host or address the listener binds to.
    pub http_host: String,
    /// Listener port; 0 picks a free one.
    pub http_port: u16,
    /// Time allowed for a client to send the request headers.
    pub read_timeout: Duration,
    /// Time allowed to produce the response.
    pub write_timeout: Duration,
    /// Keep-alive timeout for idle connections.
    pub idle_timeout: Duration,
    /// Serve HTTPS when set.
    pub tls: Option<TlsConfig>,
    /// StatsD server host, resolved once at startup.
    pub statsd_host: String,
    /// StatsD server UDP port.
    pub statsd_port: u16,
    /// Prepended to every metric key.
    pub metric_prefix: MetricPrefix,
    /// Secret for HS256 tokens; `None` disables the token check.
    pub jwt_secret: Option<String>,
    /// One of [`ROUTER_NAMES`].
    pub router_name: String,
    /// One of [`TRANSPORT_NAMES`].
    pub transport_name: String,
    /// Header whose value becomes the extra key segment. Empty disables the extra key.
    pub key_part_header: String,
    /// Grace period for in-flight requests on shutdown.
    pub shutdown_timeout: Duration,
    /// Largest datagram the transports send.
    pub max_packet_size: u16,
    /// Flush period of the buffered transport.
    pub flush_interval: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            read_timeout: DEFAULT_HTTP_TIMEOUT,
            write_timeout: DEFAULT_HTTP_TIMEOUT,
            idle_timeout: DEFAULT_HTTP_TIMEOUT,
            tls: None,
            statsd_host: DEFAULT_STATSD_HOST.to_string(),
            statsd_port: DEFAULT_STATSD_PORT,
            metric_prefix: MetricPrefix::default(),
            jwt_secret: None,
            router_name: crate::router::STATIC_ROUTER.to_string(),
            transport_name: crate::statsd::SIMPLE_TRANSPORT.to_string(),
            key_part_header: DEFAULT_KEY_PART_HEADER.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl ProxyConfig {
    /// Builds the optional TLS section from the two paths; TLS is on only when both are given.
    ///
    /// # Errors
    /// Returns [`ProxyError::Configuration`] when exactly one of the two is given.
    pub fn tls_from_paths(
        cert_path: Option<PathBuf>,
        key_path: Option<PathBuf>,
    ) -> ProxyResult<Option<TlsConfig>> {
        let non_empty = |path: Option<PathBuf>| path.filter(|p| !p.as_os_str().is_empty());
        match (non_empty(cert_path), non_empty(key_path)) {
            (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
                cert_path,
                key_path,
            })),
            (None, None) => Ok(None),
            _ => Err("TLS needs both a certificate and a private key".into()),
        }
    }

    /// Checks the settings once at startup.
    ///
    /// # Errors
    /// Returns [`ProxyError::Configuration`] describing the first invalid setting.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.statsd_host.is_empty() {
            return Err("StatsD host must not be empty".into());
        }
        if self.max_packet_size == 0 {
            return Err("StatsD packet size must be positive".into());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown timeout must be positive".into());
        }
        if self.flush_interval.is_zero() {
            return Err("StatsD flush interval must be positive".into());
        }
        if !TRANSPORT_NAMES.contains(&self.transport_name.as_str()) {
            return Err(format!(
                "StatsD client '{}' is not supported, expected one of {TRANSPORT_NAMES:?}",
                self.transport_name
            )
            .into());
        }
        if !ROUTER_NAMES.contains(&self.router_name.as_str()) {
            return Err(format!(
                "HTTP router '{}' is not supported, expected one of {ROUTER_NAMES:?}",
                self.router_name
            )
            .into());
        }
        if self.jwt_secret.as_deref() == Some("") {
            return Err("JWT secret must not be empty when given".into());
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ProxyError::Configuration`] when the host does not resolve.
    pub fn http_addr(&self) -> ProxyResult<SocketAddr> {
        resolve(&self.http_host, self.http_port)
    }

    /// # Errors
    /// Returns [`ProxyError::Configuration`] when the host does not resolve.
    pub fn statsd_addr(&self) -> ProxyResult<SocketAddr> {
        resolve(&self.statsd_host, self.statsd_port)
    }

    /// # Errors
    /// Returns [`ProxyError::Configuration`] when the StatsD host does not resolve.
    pub fn transport_options(&self) -> ProxyResult<TransportOptions> {
        Ok(TransportOptions {
            destination: self.statsd_addr()?,
            max_udp_packet_size: self.max_packet_size,
            flush_interval: self.flush_interval,
        })
    }
}

fn resolve(host: &str, port: u16) -> ProxyResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|err| ProxyError::Configuration(format!("can't resolve {host}:{port}: {err}")))?
        .next()
        .ok_or_else(|| ProxyError::Configuration(format!("{host}:{port} resolved to nothing")))
}
