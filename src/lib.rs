//! # statsd-http-proxy
//!
//! An HTTP front end for StatsD: clients that can't speak UDP post metrics over HTTP and the
//! proxy forwards them as StatsD lines.
//!
//! ## Endpoints
//!
//! - `POST /count/{key}` with optional `value` (default 1) and `sampleRate`
//! - `POST /gauge/{key}` with optional `value` (default 1)
//! - `POST /timing/{key}` with required `time` in milliseconds and optional `sampleRate`
//! - `POST /set/{key}` with optional `value` (default 1)
//! - `GET /heartbeat`
//!
//! When the configured dimension header (`Geoip-Country-Code` by default) is present, the
//! metric is sent a second time under `by_country.<value>.<key>`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use statsd_http_proxy::{ProxyConfig, ProxyServer};
//!
//! # async fn run() -> statsd_http_proxy::ProxyResult<()> {
//! let config = ProxyConfig {
//!     http_port: 0,
//!     ..ProxyConfig::default()
//! };
//! let running = ProxyServer::from_config(config)?.start().await?;
//! println!("listening on {}", running.local_addr());
//! running.run_until(async { tokio::signal::ctrl_c().await.unwrap_or(()) }).await
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::missing_errors_doc)]
#![warn(clippy::missing_panics_doc)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod auth;
/// Proxy settings and their defaults.
pub mod config;
/// Validated requests to StatsD events, fanned out over the derived keys.
pub mod dispatch;
mod error;
/// Metric prefix and key derivation.
pub mod keys;
/// Log setup for the binary.
pub mod logging;
pub mod request;
/// HTTP routing in front of the dispatcher.
pub mod router;
/// Proxy lifecycle: startup, serving and graceful shutdown.
pub mod server;
// https://github.com/statsd/statsd/blob/master/docs/metric_types.md
pub mod statsd;

pub use config::{ProxyConfig, TlsConfig};
pub use dispatch::RouteHandler;
pub use error::{ProxyError, ValidationError};
pub use keys::{MetricKeySet, MetricPrefix};
pub use request::{FormFields, MetricType};
pub use router::{build_router, HttpRouterAdapter};
pub use server::{LifecycleState, ProxyServer, RunningProxy};
pub use statsd::{build_transport, StatsdTransport, TransportOptions};

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
