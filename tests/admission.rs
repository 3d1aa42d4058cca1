//! End-to-end admission tests against a real listener and upstream.

use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use slack_gate::http::server::MIN_HEADER_BYTES;
use slack_gate::security::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

mod common;

use common::{client, gateway_config, now, signed_post, start_echo_upstream, start_gateway};

#[tokio::test]
async fn signed_request_is_forwarded_unchanged() {
    let upstream = start_echo_upstream(202).await;
    let gateway = start_gateway(gateway_config(upstream.addr)).await;

    let body = "token=xyz&team_id=T1&command=%2Fweather&text=94070";
    let response = signed_post(&client(), &gateway.url("/slack/commands?via=gate"), body)
        .header("x-custom", "kept")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let echoed = response.text().await.unwrap();
    let lower = echoed.to_ascii_lowercase();

    assert!(echoed.starts_with("POST /slack/commands?via=gate HTTP/1.1\r\n"));
    assert!(echoed.ends_with(body));
    assert!(lower.contains("x-custom: kept"));
    assert!(lower.contains("x-slack-signature: v0="));
    assert!(lower.contains("x-forwarded-for: 127.0.0.1"));
    assert!(lower.contains(&format!("host: {}", gateway.addrs[0])));
    assert_eq!(upstream.hits(), 1);

    gateway.stop().await;
}

#[tokio::test]
async fn disallowed_method_never_reaches_upstream() {
    let upstream = start_echo_upstream(200).await;
    let gateway = start_gateway(gateway_config(upstream.addr)).await;

    let response = client().get(gateway.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.text().await.unwrap(), "method not allowed\n");
    assert_eq!(upstream.hits(), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn disallowed_path_is_not_found() {
    let upstream = start_echo_upstream(200).await;
    let mut config = gateway_config(upstream.addr);
    config.policy.allowed_paths = vec!["/slack/".to_string()];
    let gateway = start_gateway(config).await;

    let client = client();
    let response = signed_post(&client, &gateway.url("/admin"), "payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "uri not found\n");

    let response = signed_post(&client, &gateway.url("/slack/events"), "payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.hits(), 1);

    gateway.stop().await;
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let upstream = start_echo_upstream(200).await;
    let mut config = gateway_config(upstream.addr);
    config.policy.max_body_bytes = 64;
    let gateway = start_gateway(config).await;

    let body = "this body is definitely longer than sixty-four bytes, by quite a margin";
    let response = signed_post(&client(), &gateway.url("/"), body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.text().await.unwrap(), "body over size limit\n");
    assert_eq!(upstream.hits(), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn wrong_signature_is_unauthorized() {
    let upstream = start_echo_upstream(200).await;
    let gateway = start_gateway(gateway_config(upstream.addr)).await;

    let response = client()
        .post(gateway.url("/"))
        .header(TIMESTAMP_HEADER, now())
        .header(SIGNATURE_HEADER, "v0=baad")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "verification failed\n");
    assert_eq!(upstream.hits(), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn malformed_headers_are_bad_requests() {
    let upstream = start_echo_upstream(200).await;
    let gateway = start_gateway(gateway_config(upstream.addr)).await;
    let client = client();

    let response = client
        .post(gateway.url("/"))
        .header(TIMESTAMP_HEADER, "lol123")
        .header(SIGNATURE_HEADER, "v0=baad")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "bad timestamp in X-Slack-Request-Timestamp\n"
    );

    let response = client
        .post(gateway.url("/"))
        .header(TIMESTAMP_HEADER, now())
        .header(SIGNATURE_HEADER, "v0=lolno")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "bad signature\n");
    assert_eq!(upstream.hits(), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn stale_request_is_expired() {
    let upstream = start_echo_upstream(200).await;
    let gateway = start_gateway(gateway_config(upstream.addr)).await;

    let response = client()
        .post(gateway.url("/"))
        .header(TIMESTAMP_HEADER, "1531420618")
        .header(
            SIGNATURE_HEADER,
            "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503",
        )
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "timestamp expired\n");

    gateway.stop().await;
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let gateway = start_gateway(gateway_config(addr)).await;
    let response = signed_post(&client(), &gateway.url("/"), "payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.text().await.unwrap(), "upstream unavailable\n");

    gateway.stop().await;
}

#[tokio::test]
async fn silent_upstream_times_out() {
    let addr = common::start_silent_upstream().await;
    let mut config = gateway_config(addr);
    config.timeouts.upstream_secs = 1;
    let gateway = start_gateway(config).await;

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        signed_post(&client(), &gateway.url("/"), "payload").send(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    gateway.stop().await;
}

#[tokio::test]
async fn every_listener_serves_the_same_chain() {
    let upstream = start_echo_upstream(200).await;
    let mut config = gateway_config(upstream.addr);
    config.listener.addresses = vec!["127.0.0.1:0".to_string(), "127.0.0.1:0".to_string()];
    let gateway = start_gateway(config).await;
    assert_eq!(gateway.addrs.len(), 2);

    let client = client();
    for addr in &gateway.addrs {
        let url = format!("http://{}/", addr);
        let response = signed_post(&client, &url, "payload").send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
    assert_eq!(upstream.hits(), 2);

    gateway.stop().await;
}

#[tokio::test]
async fn slow_response_hits_write_deadline() {
    let addr = common::start_silent_upstream().await;
    let mut config = gateway_config(addr);
    config.timeouts.upstream_secs = 30;
    config.timeouts.write_secs = 1;
    let gateway = start_gateway(config).await;

    let started = Instant::now();
    let response = tokio::time::timeout(
        Duration::from_secs(10),
        signed_post(&client(), &gateway.url("/"), "payload").send(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "response deadline exceeded\n");
    assert!(started.elapsed() < Duration::from_secs(10));

    gateway.stop().await;
}

/// Reads until the server closes the connection or resets it.
async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return received,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
        }
    }
}

#[tokio::test]
async fn oversized_request_head_is_refused() {
    let upstream = start_echo_upstream(200).await;
    let mut config = gateway_config(upstream.addr);
    config.policy.max_header_bytes = MIN_HEADER_BYTES;
    let gateway = start_gateway(config).await;

    // An unterminated head exactly at the limit: the server must give up
    // without waiting for the rest.
    let mut head = b"POST / HTTP/1.1\r\nHost: gateway\r\nX-Filler: ".to_vec();
    head.resize(MIN_HEADER_BYTES, b'a');

    let mut stream = TcpStream::connect(gateway.addrs[0]).await.unwrap();
    stream.write_all(&head).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), read_until_closed(&mut stream))
        .await
        .unwrap();
    let response = String::from_utf8_lossy(&received);
    assert!(response.starts_with("HTTP/1.1 431"), "got {response:?}");
    assert_eq!(upstream.hits(), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn quiet_connection_is_closed_after_idle_timeout() {
    let upstream = start_echo_upstream(200).await;
    let mut config = gateway_config(upstream.addr);
    config.timeouts.idle_secs = 1;
    config.timeouts.body_read_secs = 30;
    let gateway = start_gateway(config).await;

    let mut stream = TcpStream::connect(gateway.addrs[0]).await.unwrap();
    let started = Instant::now();
    let received = tokio::time::timeout(Duration::from_secs(10), read_until_closed(&mut stream))
        .await
        .unwrap();

    assert!(received.is_empty());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(started.elapsed() >= Duration::from_millis(900));

    gateway.stop().await;
}
