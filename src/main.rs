use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use statsd_http_proxy::config::{
    DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_KEY_PART_HEADER, DEFAULT_MAX_PACKET_SIZE,
    DEFAULT_STATSD_HOST, DEFAULT_STATSD_PORT,
};
use statsd_http_proxy::router::STATIC_ROUTER;
use statsd_http_proxy::statsd::SIMPLE_TRANSPORT;
use statsd_http_proxy::{logging, MetricPrefix, ProxyConfig, ProxyServer};
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
struct Options {
    #[arg(long, env = "STATSD_HTTP_PROXY_HTTP_HOST", default_value = DEFAULT_HTTP_HOST)]
    pub http_host: String,

    #[arg(long, env = "STATSD_HTTP_PROXY_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Seconds allowed for reading request headers.
    #[arg(long, env = "STATSD_HTTP_PROXY_HTTP_TIMEOUT_READ", default_value_t = 1)]
    pub http_timeout_read: u64,

    /// Seconds allowed for producing a response.
    #[arg(long, env = "STATSD_HTTP_PROXY_HTTP_TIMEOUT_WRITE", default_value_t = 1)]
    pub http_timeout_write: u64,

    /// Seconds an idle keep-alive connection is kept.
    #[arg(long, env = "STATSD_HTTP_PROXY_HTTP_TIMEOUT_IDLE", default_value_t = 1)]
    pub http_timeout_idle: u64,

    #[arg(long, env = "STATSD_HTTP_PROXY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "STATSD_HTTP_PROXY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    #[arg(long, env = "STATSD_HTTP_PROXY_STATSD_HOST", default_value = DEFAULT_STATSD_HOST)]
    pub statsd_host: String,

    #[arg(long, env = "STATSD_HTTP_PROXY_STATSD_PORT", default_value_t = DEFAULT_STATSD_PORT)]
    pub statsd_port: u16,

    #[arg(long, env = "STATSD_HTTP_PROXY_METRIC_PREFIX", default_value = "")]
    pub metric_prefix: String,

    /// Require an HS256 token signed with this secret on metric routes.
    #[arg(long, env = "STATSD_HTTP_PROXY_JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// `static` or `dynamic`.
    #[arg(long, env = "STATSD_HTTP_PROXY_HTTP_ROUTER_NAME", default_value = STATIC_ROUTER)]
    pub http_router_name: String,

    /// `simple` or `buffered`.
    #[arg(long, env = "STATSD_HTTP_PROXY_STATSD_CLIENT_NAME", default_value = SIMPLE_TRANSPORT)]
    pub statsd_client_name: String,

    /// Header whose value is added as an extra key segment; empty disables it.
    #[arg(long, env = "STATSD_HTTP_PROXY_KEYPART_HEADER", default_value = DEFAULT_KEY_PART_HEADER)]
    pub keypart_header: String,

    /// Seconds in-flight requests get to finish on shutdown.
    #[arg(long, env = "STATSD_HTTP_PROXY_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,

    #[arg(long, env = "STATSD_HTTP_PROXY_STATSD_MAX_PACKET_SIZE", default_value_t = DEFAULT_MAX_PACKET_SIZE)]
    pub statsd_max_packet_size: u16,

    /// Milliseconds between flushes of the buffered client.
    #[arg(long, env = "STATSD_HTTP_PROXY_STATSD_FLUSH_INTERVAL", default_value_t = 100)]
    pub statsd_flush_interval: u64,

    #[arg(long, env = "STATSD_HTTP_PROXY_VERBOSE")]
    pub verbose: bool,

    #[arg(long = "version")]
    pub version: bool,
}

impl Options {
    fn into_config(self) -> anyhow::Result<ProxyConfig> {
        let tls = ProxyConfig::tls_from_paths(self.tls_cert, self.tls_key)?;
        let jwt_secret = self.jwt_secret.filter(|secret| !secret.is_empty());
        Ok(ProxyConfig {
            http_host: self.http_host,
            http_port: self.http_port,
            read_timeout: Duration::from_secs(self.http_timeout_read),
            write_timeout: Duration::from_secs(self.http_timeout_write),
            idle_timeout: Duration::from_secs(self.http_timeout_idle),
            tls,
            statsd_host: self.statsd_host,
            statsd_port: self.statsd_port,
            metric_prefix: MetricPrefix::new(&self.metric_prefix),
            jwt_secret,
            router_name: self.http_router_name,
            transport_name: self.statsd_client_name,
            key_part_header: self.keypart_header,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
            max_packet_size: self.statsd_max_packet_size,
            flush_interval: Duration::from_millis(self.statsd_flush_interval),
        })
    }
}

fn main() -> anyhow::Result<()> {
    let opts = Options::parse();

    if opts.version {
        println!("statsd-http-proxy v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    logging::init(opts.verbose)?;
    let config = opts.into_config().context("invalid configuration")?;
    let server = ProxyServer::from_config(config).context("invalid configuration")?;

    let num_threads = std::thread::available_parallelism().unwrap_or_else(|_| {
        warn!("could not determine number of CPUs. Defaulting to 1");
        NonZeroUsize::MIN
    });
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_threads.into())
        .enable_all()
        .build()
        .context("can't start the tokio runtime")?;

    runtime.block_on(async {
        let signal = termination_signal()?;
        let running = server.start().await.context("can't start the proxy")?;
        running
            .run_until(signal)
            .await
            .context("proxy did not stop cleanly")
    })
}

#[cfg(unix)]
fn termination_signal() -> anyhow::Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("can't trap SIGINT")?;
    let mut sigterm = signal(SignalKind::terminate()).context("can't trap SIGTERM")?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn termination_signal() -> anyhow::Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c"),
            Err(err) => warn!("can't listen for ctrl-c: {err}"),
        }
    })
}
