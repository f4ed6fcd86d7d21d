//! `HttpTransport` against a local mock server.
//!
//! Coverage:
//! - Streamed body with declared length
//! - Retry on 5xx until the server recovers
//! - Retry budget exhausted on persistent 5xx
//! - No retry on 4xx
//! - Connection refused surfaces as a request error

use std::time::Duration;

use futures_util::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modeldock_transport::{
    HttpTransport, RetryPolicy, Transport, TransportConfig, TransportError,
};

fn fast_config(max_retries: u32) -> TransportConfig {
    TransportConfig {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        total_timeout: Some(Duration::from_secs(10)),
        retry: RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
        },
        ..TransportConfig::default()
    }
}

async fn collect(mut body: modeldock_transport::TransferBody) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.stream.next().await {
        out.extend_from_slice(&chunk.expect("chunk should read"));
    }
    out
}

#[tokio::test]
async fn streams_body_with_declared_length() {
    let server = MockServer::start().await;
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/model.gguf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(fast_config(0)).unwrap();
    let body = transport
        .open(&format!("{}/model.gguf", server.uri()))
        .await
        .unwrap();

    assert_eq!(body.content_length, Some(payload.len() as u64));
    assert_eq!(collect(body).await, payload);
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky.gguf"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky.gguf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(fast_config(3)).unwrap();
    let body = transport
        .open(&format!("{}/flaky.gguf", server.uri()))
        .await
        .unwrap();

    assert_eq!(collect(body).await, b"ok".to_vec());
}

#[tokio::test]
async fn gives_up_after_retry_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down.gguf"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(fast_config(2)).unwrap();
    let err = transport
        .open(&format!("{}/down.gguf", server.uri()))
        .await
        .unwrap_err();

    match err {
        TransportError::Status { status, attempts } => {
            assert_eq!(status, 500);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing.gguf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(fast_config(3)).unwrap();
    let err = transport
        .open(&format!("{}/missing.gguf", server.uri()))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TransportError::Status { status: 404, attempts: 1 }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn connection_refused_is_a_request_error() {
    // Bind and drop a listener to get a port nobody is listening on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let transport = HttpTransport::new(fast_config(0)).unwrap();
    let err = transport
        .open(&format!("http://127.0.0.1:{port}/model.gguf"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TransportError::Request { attempts: 1, .. }),
        "unexpected error: {err:?}"
    );
}
