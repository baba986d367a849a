mod common;

use std::fs;

use common::{lines, spawn_udp_receiver_exact};
use rcgen::{generate_simple_self_signed, CertifiedKey};
use reqwest::{Certificate, StatusCode};
use statsd_http_proxy::{MetricPrefix, ProxyConfig, ProxyServer, TlsConfig};
use tempfile::TempDir;

/// Writes a self-signed `localhost` certificate and its key into a fresh directory.
fn self_signed() -> (TempDir, TlsConfig, Certificate) {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    fs::write(&cert_path, cert.pem()).unwrap();
    fs::write(&key_path, key_pair.serialize_pem()).unwrap();

    let trusted = Certificate::from_pem(cert.pem().as_bytes()).unwrap();
    (
        dir,
        TlsConfig {
            cert_path,
            key_path,
        },
        trusted,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_over_https() {
    let (_dir, tls, trusted) = self_signed();
    let (statsd, receiver) = spawn_udp_receiver_exact(1);

    let proxy = ProxyServer::from_config(ProxyConfig {
        http_port: 0,
        tls: Some(tls),
        statsd_host: statsd.ip().to_string(),
        statsd_port: statsd.port(),
        metric_prefix: MetricPrefix::new("app"),
        ..ProxyConfig::default()
    })
    .unwrap()
    .start()
    .await
    .unwrap();

    let client = reqwest::Client::builder()
        .add_root_certificate(trusted)
        .resolve("localhost", proxy.local_addr())
        .build()
        .unwrap();
    let url = format!(
        "https://localhost:{}/count/logins",
        proxy.local_addr().port()
    );

    let response = client
        .post(&url)
        .header("content-type", "application/x-www-form-urlencoded")
        .body("value=2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // plain HTTP is not served on the TLS listener
    let plain = reqwest::Client::new()
        .post(format!("http://{}/count/logins", proxy.local_addr()))
        .body("value=2")
        .send()
        .await;
    assert!(plain.map_or(true, |response| !response.status().is_success()));

    assert_eq!(lines(&receiver.join().unwrap()), vec!["app.logins:2|c"]);
    proxy.shutdown().await.unwrap();
}
