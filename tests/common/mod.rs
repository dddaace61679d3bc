//! Shared utilities for relay integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use wallet_relay::config::UpstreamConfig;
use wallet_relay::http::headers::Headers;
use wallet_relay::http::parser::{ParseError, parse_http_request};
use wallet_relay::http::request::{Method, Request};
use wallet_relay::proxy::Forwarder;
use wallet_relay::server::{AppState, listener};

pub const USER_ID: &str = "u-123";
pub const APP_KEY: &str = "app-key-1";

/// Start a mock upstream that answers every request with `response` and
/// reports each request it parsed.
pub async fn start_mock_upstream(
    response: &'static [u8],
) -> (SocketAddr, mpsc::UnboundedReceiver<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let request = loop {
                    match parse_http_request(&buf) {
                        Ok((request, _)) => break request,
                        Err(ParseError::Incomplete) => {}
                        Err(e) => panic!("mock upstream got a malformed request: {e:?}"),
                    }
                    let mut chunk = [0u8; 1024];
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                };
                let _ = tx.send(request);
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start the relay in front of `upstream` and return its address.
pub async fn start_relay(upstream: SocketAddr, methods: &[Method]) -> SocketAddr {
    let config = UpstreamConfig::new(&format!("http://{upstream}"), USER_ID)
        .unwrap()
        .with_app_key(APP_KEY);
    let app = Arc::new(AppState::new(
        Forwarder::new(config).unwrap(),
        methods.to_vec(),
    ));

    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(listener::serve(socket, app));
    addr
}

/// Write `request` and read until the relay closes the connection.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Split one serialized response into status, headers and body.
pub fn parse_response(raw: &[u8]) -> RawResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a header block");
    let head = std::str::from_utf8(&raw[..split]).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    RawResponse {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}
