//! Upstream HTTP transport for the worker.
//!
//! ### Request
//! - Method and URL of the intercepted request; `Accept` and
//!   `Accept-Language` are forwarded, everything else is dropped.
//! - Pass-through requests may carry a body; its `Content-Type` goes along.
//! - Max redirects: 5
//!
//! ### Response
//! - Any HTTP status is returned as-is; only transport failures are errors.
//! - Body is streamed and capped at `max_bytes`.
//! - Hop-by-hop and encoding headers are stripped: reqwest has already
//!   decompressed the body, so the stored copy must not claim otherwise.

pub mod url;

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use kiosk_core::{AppConfig, Error};
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Client, Method};

pub use url::{UrlError, canonicalize, resolve};

use crate::worker::{Network, Request, Response};

const FORWARDED_HEADERS: [HeaderName; 2] = [header::ACCEPT, header::ACCEPT_LANGUAGE];

const STRIPPED_HEADERS: [HeaderName; 9] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
];

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "museum-kiosk/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 20MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
        }
    }
}

/// HTTP client the worker reaches the network through.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Send a request upstream, optionally with a body (proxied POSTs).
    pub async fn send(&self, request: &Request, body: Option<Bytes>) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self.http.request(request.method.clone(), request.url.as_str());
        for name in &FORWARDED_HEADERS {
            if let Some(value) = request.headers.get(name) {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = body
            && request.method != Method::GET
            && request.method != Method::HEAD
        {
            if let Some(content_type) = request.headers.get(header::CONTENT_TYPE) {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| transport_error(&request.url, &e))?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let headers = strip_headers(response.headers());

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&request.url, &e))?;
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(Response::new(status, headers, body.freeze()))
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.send(request, None).await
    }

    async fn forward(&self, request: &Request, body: Option<Bytes>) -> Result<Response, Error> {
        self.send(request, body).await
    }
}

fn transport_error(url: &reqwest::Url, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

/// Copy of `headers` without hop-by-hop and encoding headers.
pub fn strip_headers(headers: &HeaderMap) -> HeaderMap {
    let mut kept = headers.clone();
    for name in &STRIPPED_HEADERS {
        kept.remove(name);
    }
    kept.remove("keep-alive");
    kept
}
