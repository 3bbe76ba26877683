//! Intercepted requests and the responses handed back for them.

use bytes::Bytes;
use kiosk_core::StoredResponse;
use kiosk_core::cache::hash::compute_request_key;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

/// How the browser issued the request (`Sec-Fetch-Mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
    WebSocket,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` value; unknown values fall back to `Cors`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Self::Navigate,
            "same-origin" => Self::SameOrigin,
            "no-cors" => Self::NoCors,
            "websocket" => Self::WebSocket,
            _ => Self::Cors,
        }
    }
}

/// What the response will be used for (`Sec-Fetch-Dest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    Style,
    Script,
    Font,
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` value.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "image" => Self::Image,
            "style" => Self::Style,
            "script" => Self::Script,
            "font" => Self::Font,
            "empty" | "" => Self::Empty,
            _ => Self::Other,
        }
    }
}

/// A request intercepted by the worker.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Canonical absolute URL (no fragment).
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: HeaderMap,
}

impl Request {
    /// A plain GET request, as issued by a script or by the install step.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Cors,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
        }
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, destination: Destination::Document, ..Self::get(url) }
    }

    /// Build a request from browser fetch metadata headers.
    ///
    /// Missing `Sec-Fetch-Mode` / `Sec-Fetch-Dest` headers leave the
    /// defaults (`Cors` / `Empty`) in place, so older browsers are still
    /// classified by their `Accept` header.
    pub fn from_fetch_metadata(method: Method, url: Url, headers: HeaderMap) -> Self {
        let mode = headers
            .get("sec-fetch-mode")
            .and_then(|v| v.to_str().ok())
            .map(RequestMode::parse)
            .unwrap_or_default();
        let destination = headers
            .get("sec-fetch-dest")
            .and_then(|v| v.to_str().ok())
            .map(Destination::parse)
            .unwrap_or_default();

        Self { method, url, mode, destination, headers }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The `Accept` header, if present and valid UTF-8.
    pub fn accept(&self) -> Option<&str> {
        self.headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Identity key under which responses to this request are cached.
    pub fn cache_key(&self) -> String {
        compute_request_key(self.method.as_str(), self.url.as_str())
    }
}

/// Where a response handed back by the worker came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    RuntimeCache,
    ShellCache,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RuntimeCache => "runtime-cache",
            Self::ShellCache => "shell-cache",
        }
    }
}

/// A response produced by the network or replayed from a partition.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    /// A network response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into(), source: ResponseSource::Network }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Copy of this response keyed by the identity of `request`.
    pub fn to_stored(&self, request: &Request) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        StoredResponse::new(request.method.as_str(), request.url.as_str(), self.status.as_u16(), headers, self.body.to_vec())
    }

    /// Replay a stored response. Headers that no longer parse are dropped.
    pub fn from_stored(stored: StoredResponse, source: ResponseSource) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &stored.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);
        Self { status, headers, body: Bytes::from(stored.body), source }
    }

    /// Body as UTF-8 text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_from_fetch_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let req = Request::from_fetch_metadata(Method::GET, url("https://kiosk.local/"), headers);
        assert_eq!(req.mode, RequestMode::Navigate);
        assert_eq!(req.destination, Destination::Document);
        assert_eq!(req.accept(), Some("text/html"));
    }

    #[test]
    fn test_from_fetch_metadata_defaults() {
        let req = Request::from_fetch_metadata(Method::GET, url("https://kiosk.local/app.js"), HeaderMap::new());
        assert_eq!(req.mode, RequestMode::Cors);
        assert_eq!(req.destination, Destination::Empty);
    }

    #[test]
    fn test_parse_unknown_values() {
        assert_eq!(RequestMode::parse("bogus"), RequestMode::Cors);
        assert_eq!(Destination::parse("audioworklet"), Destination::Other);
        assert_eq!(Destination::parse("IMAGE"), Destination::Image);
    }

    #[test]
    fn test_cache_key_matches_core_hash() {
        let req = Request::get(url("https://kiosk.local/offline.html"));
        assert_eq!(req.cache_key(), compute_request_key("GET", "https://kiosk.local/offline.html"));
    }

    #[test]
    fn test_stored_round_trip_keeps_headers() {
        let req = Request::get(url("https://kiosk.local/manifest.json"));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = Response::new(StatusCode::OK, headers, r#"{"name":"kiosk"}"#);

        let stored = response.to_stored(&req);
        assert_eq!(stored.key, req.cache_key());

        let replayed = Response::from_stored(stored, ResponseSource::ShellCache);
        assert_eq!(replayed.status, StatusCode::OK);
        assert_eq!(replayed.source, ResponseSource::ShellCache);
        assert_eq!(replayed.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(replayed.text(), r#"{"name":"kiosk"}"#);
    }
}
