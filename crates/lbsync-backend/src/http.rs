//! Minimal JSON-over-HTTP/1.1 client for REST adapters.
//!
//! Each request opens its own connection. Calls are not bounded here; the
//! scheduler wraps every backend call in its own timeout.

use bytes::Bytes;
use http::{Method, Request, header};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use lbsync_scheduler::{BackendError, BackendResult};
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    /// Fail with [`BackendError::Status`] unless the status is `expected`.
    pub fn expect_status(self, expected: u16) -> BackendResult<Self> {
        if self.status != expected {
            return Err(BackendError::Status {
                code: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            });
        }
        Ok(self)
    }

    pub fn json(&self) -> BackendResult<Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BackendError::Protocol(format!("response is not valid JSON: {e}")))
    }
}

/// Host and port to connect to; port 80 when `host` names none.
pub fn authority(host: &str) -> String {
    let has_port = match host.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    };
    if has_port && !host.ends_with(']') {
        host.to_string()
    } else {
        format!("{host}:80")
    }
}

/// Send one request with an optional JSON body and auth token.
pub async fn send_json(
    method: Method,
    host: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> BackendResult<HttpResponse> {
    let authority = authority(host);
    let uri = format!("http://{authority}{path}");

    let stream = TcpStream::connect(&authority)
        .await
        .map_err(|e| BackendError::Transport(format!("connect {authority}: {e}")))?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| BackendError::Transport(format!("handshake with {authority}: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            trace!(error = %e, "connection closed with error");
        }
    });

    let payload = match body {
        Some(value) => Bytes::from(
            serde_json::to_vec(value)
                .map_err(|e| BackendError::Protocol(format!("encoding request body: {e}")))?,
        ),
        None => Bytes::new(),
    };

    let mut builder = Request::builder()
        .method(method.clone())
        .uri(path)
        .header(header::HOST, &authority)
        .header(header::USER_AGENT, "lbsync/0.1")
        .header(header::ACCEPT, "application/json")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("x-auth-token", token);
    }
    let req = builder
        .body(Full::new(payload))
        .map_err(|e| BackendError::Protocol(format!("building request {method} {uri}: {e}")))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| BackendError::Transport(format!("{method} {uri}: {e}")))?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| BackendError::Transport(format!("reading response of {method} {uri}: {e}")))?
        .to_bytes();

    debug!(%method, %uri, status, bytes = body.len(), "http request done");
    Ok(HttpResponse { status, body })
}
