//! Minimal HTTP/1 client over a fresh TCP connection per request.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("request failed: {0}")]
    Request(String),
}

/// Status and collected body of a completed exchange.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: http::StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

pub async fn get(url: &str, timeout: Duration) -> Result<HttpResponse, HttpError> {
    send(http::Method::GET, url, None, timeout).await
}

pub async fn post_json(
    url: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    let bytes = serde_json::to_vec(body).map_err(|e| HttpError::Request(e.to_string()))?;
    send(http::Method::POST, url, Some(Bytes::from(bytes)), timeout).await
}

/// Send one request; the whole exchange, body included, is bounded by
/// `timeout`.
pub async fn send(
    method: http::Method,
    url: &str,
    body: Option<Bytes>,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|_| HttpError::InvalidUrl(url.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(HttpError::InvalidUrl(url.to_string()));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| HttpError::InvalidUrl(url.to_string()))?
        .clone();
    let addr = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let exchange = async move {
        let stream = tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(|e| HttpError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(path)
            .header(http::header::HOST, authority.as_str())
            .header(http::header::USER_AGENT, "powercycle/0.1");
        if body.is_some() {
            builder = builder.header(http::header::CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?
            .to_bytes();

        Ok::<_, HttpError>(HttpResponse { status, body })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%url, "http request timed out");
            Err(HttpError::Timeout(timeout))
        }
    }
}
