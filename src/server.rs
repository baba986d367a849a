use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::auth::TokenValidator;
use crate::config::ProxyConfig;
use crate::dispatch::RouteHandler;
use crate::router::{build_router, make_app, HttpRouterAdapter};
use crate::statsd::{build_transport, StatsdTransport};
use crate::{ProxyError, ProxyResult};

/// Where a proxy is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Configured, nothing opened yet.
    Created,
    /// The transport is being opened and the listener bound.
    Starting,
    /// Accepting connections.
    Listening,
    /// In-flight requests are draining.
    ShuttingDown,
    /// Transport closed and listener gone, after a shutdown or a failed start.
    Stopped,
}

/// A proxy that has not been started yet.
pub struct ProxyServer {
    config: ProxyConfig,
    transport: Arc<dyn StatsdTransport>,
    router: Box<dyn HttpRouterAdapter>,
    state: watch::Sender<LifecycleState>,
}

impl ProxyServer {
    /// Wraps an already built transport and router.
    ///
    /// # Errors
    /// Returns [`ProxyError::Configuration`] when `config` does not validate.
    pub fn new(
        config: ProxyConfig,
        transport: Arc<dyn StatsdTransport>,
        router: Box<dyn HttpRouterAdapter>,
    ) -> ProxyResult<Self> {
        config.validate()?;
        let (state, _) = watch::channel(LifecycleState::Created);
        Ok(Self {
            config,
            transport,
            router,
            state,
        })
    }

    /// Builds the transport and router named in `config`.
    ///
    /// # Errors
    /// Returns [`ProxyError::Configuration`] for an invalid config or an unknown backend.
    pub fn from_config(config: ProxyConfig) -> ProxyResult<Self> {
        config.validate()?;
        let transport = build_transport(&config.transport_name, config.transport_options()?)?;
        let router = build_router(&config.router_name)?;
        Self::new(config, transport, router)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Notifies about every state change, including those made by [`Self::start`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Opens the transport, then binds the listener and starts serving in the background.
    ///
    /// Either both are up when this returns, or neither is.
    ///
    /// # Errors
    /// - [`ProxyError::Tls`] when the certificate or key cannot be loaded
    /// - [`ProxyError::Connection`] when the transport cannot be opened
    /// - [`ProxyError::Bind`] when the listener cannot be bound
    pub async fn start(self) -> ProxyResult<RunningProxy> {
        let Self {
            config,
            transport,
            router,
            state,
        } = self;
        state.send_replace(LifecycleState::Starting);

        let (local_addr, handle, serve_task) =
            match launch(&config, &transport, router.as_ref()).await {
                Ok(launched) => launched,
                Err(err) => {
                    state.send_replace(LifecycleState::Stopped);
                    return Err(err);
                }
            };

        state.send_replace(LifecycleState::Listening);
        info!(
            %local_addr,
            tls = config.tls.is_some(),
            router = router.name(),
            "HTTP listener started"
        );

        Ok(RunningProxy {
            local_addr,
            handle,
            serve_task,
            transport,
            shutdown_timeout: config.shutdown_timeout,
            state,
        })
    }

    /// Starts the proxy and serves until `signal` resolves, then shuts down.
    ///
    /// # Errors
    /// Any error from [`Self::start`] or [`RunningProxy::run_until`].
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> ProxyResult<()> {
        self.start().await?.run_until(signal).await
    }
}

type Launched = (SocketAddr, Handle, JoinHandle<io::Result<()>>);

async fn launch(
    config: &ProxyConfig,
    transport: &Arc<dyn StatsdTransport>,
    router: &dyn HttpRouterAdapter,
) -> ProxyResult<Launched> {
    let addr = config.http_addr()?;
    let tls = match &config.tls {
        Some(tls) => {
            // a no-op when the process already installed one
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
            Some(
                RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .await
                    .map_err(ProxyError::Tls)?,
            )
        }
        None => None,
    };

    transport.open()?;

    let handler = Arc::new(RouteHandler::new(
        transport.clone(),
        config.metric_prefix.clone(),
        config.key_part_header.clone(),
    ));
    let auth = config.jwt_secret.as_deref().map(TokenValidator::new);
    let app = make_app(router, handler, auth, config.write_timeout);

    let handle = Handle::new();
    let serve_task: JoinHandle<io::Result<()>> = match tls {
        Some(tls) => {
            let mut server = axum_server::bind_rustls(addr, tls).handle(handle.clone());
            configure_http(server.http_builder(), config);
            tokio::spawn(server.serve(app.into_make_service()))
        }
        None => {
            let mut server = axum_server::bind(addr).handle(handle.clone());
            configure_http(server.http_builder(), config);
            tokio::spawn(server.serve(app.into_make_service()))
        }
    };

    let Some(local_addr) = handle.listening().await else {
        let err = match serve_task.await {
            Ok(Err(err)) => err,
            Ok(Ok(())) => io::Error::other("listener stopped before accepting connections"),
            Err(err) => io::Error::other(err),
        };
        error!(%addr, "HTTP listener failed to start: {err}");
        close_transport(transport.clone()).await;
        return Err(ProxyError::Bind(err));
    };

    Ok((local_addr, handle, serve_task))
}

fn configure_http(builder: &mut auto::Builder<TokioExecutor>, config: &ProxyConfig) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .keep_alive(true)
        .header_read_timeout(config.read_timeout);

    builder
        .http2()
        .timer(TokioTimer::new())
        .keep_alive_timeout(config.idle_timeout);
}

async fn close_transport(transport: Arc<dyn StatsdTransport>) {
    // the buffered transport joins its flush thread
    if let Err(err) = tokio::task::spawn_blocking(move || transport.close()).await {
        error!("closing the StatsD transport failed: {err}");
    }
}

/// A proxy accepting connections.
pub struct RunningProxy {
    local_addr: SocketAddr,
    handle: Handle,
    serve_task: JoinHandle<io::Result<()>>,
    transport: Arc<dyn StatsdTransport>,
    shutdown_timeout: Duration,
    state: watch::Sender<LifecycleState>,
}

impl RunningProxy {
    /// Address the listener is bound to; differs from the configured one when port 0 was used.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Notifies about every state change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Stops accepting connections and lets in-flight requests finish within the grace
    /// period, then closes the transport.
    ///
    /// # Errors
    /// Returns [`ProxyError::ShutdownTimeout`] when the listener had to be stopped forcibly.
    /// The transport is closed either way.
    pub async fn shutdown(mut self) -> ProxyResult<()> {
        self.state.send_replace(LifecycleState::ShuttingDown);
        info!(grace_period = ?self.shutdown_timeout, "shutting down HTTP listener");
        self.handle.graceful_shutdown(None);

        let result = match tokio::time::timeout(self.shutdown_timeout, &mut self.serve_task).await
        {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(ProxyError::StdIo(err)),
            Ok(Err(err)) => Err(ProxyError::StdIo(io::Error::other(err))),
            Err(_) => {
                warn!(
                    grace_period = ?self.shutdown_timeout,
                    "in-flight requests did not finish, forcing shutdown"
                );
                self.handle.shutdown();
                self.serve_task.abort();
                Err(ProxyError::ShutdownTimeout(self.shutdown_timeout))
            }
        };

        self.stop().await;
        result
    }

    /// Serves until `signal` resolves, then shuts down.
    ///
    /// # Errors
    /// Returns [`ProxyError::Bind`] when the listener stops on its own, or any error from
    /// [`Self::shutdown`].
    pub async fn run_until(mut self, signal: impl Future<Output = ()>) -> ProxyResult<()> {
        let stopped = tokio::select! {
            () = signal => None,
            outcome = &mut self.serve_task => Some(outcome),
        };

        let Some(outcome) = stopped else {
            info!("termination signal received");
            return self.shutdown().await;
        };

        let err = match outcome {
            Ok(Ok(())) => io::Error::other("HTTP listener stopped unexpectedly"),
            Ok(Err(err)) => err,
            Err(err) => io::Error::other(err),
        };
        error!("HTTP listener failed: {err}");
        self.stop().await;
        Err(ProxyError::Bind(err))
    }

    async fn stop(self) {
        close_transport(self.transport).await;
        self.state.send_replace(LifecycleState::Stopped);
        info!("proxy stopped");
    }
}
