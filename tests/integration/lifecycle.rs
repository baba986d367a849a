mod common;

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use common::{SlowTransport, UnreachableTransport};
use statsd_http_proxy::config::TlsConfig;
use statsd_http_proxy::router::STATIC_ROUTER;
use statsd_http_proxy::{
    build_router, LifecycleState, MetricPrefix, ProxyConfig, ProxyError, ProxyServer,
};

fn config(shutdown_timeout: Duration) -> ProxyConfig {
    ProxyConfig {
        http_port: 0,
        write_timeout: Duration::from_secs(10),
        metric_prefix: MetricPrefix::new("app"),
        shutdown_timeout,
        ..ProxyConfig::default()
    }
}

fn server(config: ProxyConfig, transport: Arc<SlowTransport>) -> ProxyServer {
    ProxyServer::new(config, transport, build_router(STATIC_ROUTER).unwrap()).unwrap()
}

async fn post_count(addr: std::net::SocketAddr) -> reqwest::Result<reqwest::StatusCode> {
    reqwest::Client::new()
        .post(format!("http://{addr}/count/slow"))
        .body("value=4")
        .send()
        .await
        .map(|response| response.status())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_request_finishes_within_grace_period() {
    let transport = SlowTransport::new(Duration::from_millis(300));
    let proxy = server(config(Duration::from_secs(5)), transport.clone());
    assert_eq!(proxy.state(), LifecycleState::Created);

    let running = proxy.start().await.unwrap();
    assert_eq!(running.state(), LifecycleState::Listening);
    let mut states = running.subscribe();

    let request = tokio::spawn(post_count(running.local_addr()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.shutdown().await.unwrap();
    assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);

    assert_eq!(request.await.unwrap().unwrap(), reqwest::StatusCode::OK);
    assert_eq!(*transport.counts.lock(), vec![("app.slow".to_string(), 4)]);
    assert!(*transport.closed.lock());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_is_forced_after_grace_period() {
    let transport = SlowTransport::new(Duration::from_millis(1500));
    let running = server(config(Duration::from_millis(200)), transport.clone())
        .start()
        .await
        .unwrap();
    let states = running.subscribe();

    let request = tokio::spawn(post_count(running.local_addr()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = running.shutdown().await.unwrap_err();
    assert!(matches!(err, ProxyError::ShutdownTimeout(timeout) if timeout == Duration::from_millis(200)));
    assert_eq!(*states.borrow(), LifecycleState::Stopped);
    assert!(*transport.closed.lock());

    let _ = request.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_until_stops_on_signal() {
    let transport = SlowTransport::new(Duration::ZERO);
    let (trigger, signal) = tokio::sync::oneshot::channel::<()>();

    let proxy = server(config(Duration::from_secs(1)), transport.clone());
    let task = tokio::spawn(proxy.run_until(async {
        let _ = signal.await;
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert!(*transport.closed.lock());
}

#[tokio::test]
async fn test_bind_failure_is_fatal_and_closes_transport() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let transport = SlowTransport::new(Duration::ZERO);
    let proxy = server(
        ProxyConfig {
            http_port: occupied.local_addr().unwrap().port(),
            ..config(Duration::from_secs(1))
        },
        transport.clone(),
    );

    let states = proxy.subscribe();

    let err = proxy.start().await.err().unwrap();
    assert!(matches!(err, ProxyError::Bind(_)), "{err}");
    assert!(*transport.closed.lock());
    assert_eq!(*states.borrow(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_transport_open_failure_is_fatal() {
    let proxy = ProxyServer::new(
        config(Duration::from_secs(1)),
        Arc::new(UnreachableTransport),
        build_router(STATIC_ROUTER).unwrap(),
    )
    .unwrap();
    let states = proxy.subscribe();

    let err = proxy.start().await.err().unwrap();
    assert!(matches!(err, ProxyError::Connection(_)), "{err}");
    assert_eq!(*states.borrow(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_missing_tls_files_fail_startup() {
    let transport = SlowTransport::new(Duration::ZERO);
    let proxy = server(
        ProxyConfig {
            tls: Some(TlsConfig {
                cert_path: "/nonexistent/cert.pem".into(),
                key_path: "/nonexistent/key.pem".into(),
            }),
            ..config(Duration::from_secs(1))
        },
        transport.clone(),
    );
    let states = proxy.subscribe();

    let err = proxy.start().await.err().unwrap();
    assert!(matches!(err, ProxyError::Tls(_)), "{err}");
    assert_eq!(*states.borrow(), LifecycleState::Stopped);
    // the transport is never opened when TLS can't be set up
    assert!(!*transport.closed.lock());
}

#[test]
fn test_unknown_backends_fail_construction() {
    let err = ProxyServer::from_config(ProxyConfig {
        router_name: "GorillaMux".to_string(),
        ..ProxyConfig::default()
    })
    .err()
    .unwrap();
    assert!(matches!(err, ProxyError::Configuration(_)));

    let err = ProxyServer::from_config(ProxyConfig {
        transport_name: "Cactus".to_string(),
        ..ProxyConfig::default()
    })
    .err()
    .unwrap();
    assert!(matches!(err, ProxyError::Configuration(_)));
}
