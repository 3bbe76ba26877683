//! Headless CMS (Content API) client.
//!
//! ### Endpoints
//!
//! - **Query**: `https://<project>.api.sanity.io/v<apiVersion>/data/query/<dataset>`
//!   (`apicdn.sanity.io` when the CDN is enabled).
//! - **Listen**: same host, `/data/listen/<dataset>`, server-sent events.
//! - Parameters travel as `$name=<json>` query pairs next to `query=<groq>`.
//! - Responses are wrapped in a `{ "result": ... }` envelope.
//!
//! No retries here: when the kiosk is offline the worker's cache answers
//! for these URLs, not this client.

pub mod assets;
pub mod error;
pub mod listen;
pub mod query;
pub mod types;

pub use error::ContentError;
pub use listen::{ListenEvent, Mutation, Subscription};
pub use query::{ExhibitFilter, Query};
pub use types::{Category, Exhibit, Exhibition, KioskDevice, LedPosition, MuseumInfo};

use std::time::{Duration, Instant};

use kiosk_core::AppConfig;
use kiosk_core::config::ContentConfig;
use reqwest::header;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Connect timeout of the long-lived listen connection.
const LISTEN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

/// Content API client.
#[derive(Debug, Clone)]
pub struct ContentClient {
    http: reqwest::Client,
    listen_http: reqwest::Client,
    config: ContentConfig,
}

impl ContentClient {
    /// Create a client; `timeout` bounds every query request.
    pub fn new(config: ContentConfig, timeout: Duration, user_agent: &str) -> Result<Self, ContentError> {
        if config.project_id.is_empty() || config.dataset.is_empty() {
            return Err(ContentError::InvalidConfig("project id and dataset are required".into()));
        }

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ContentError::InvalidConfig(e.to_string()))?;
        let listen_http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(LISTEN_CONNECT_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| ContentError::InvalidConfig(e.to_string()))?;

        Ok(Self { http, listen_http, config })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, ContentError> {
        Self::new(config.content.clone(), config.timeout(), &config.user_agent)
    }

    pub fn config(&self) -> &ContentConfig {
        &self.config
    }

    fn endpoint(&self, kind: &str) -> Result<Url, ContentError> {
        let host = if self.config.use_cdn { "apicdn.sanity.io" } else { "api.sanity.io" };
        let raw = format!(
            "https://{}.{host}/v{}/data/{kind}/{}",
            self.config.project_id, self.config.api_version, self.config.dataset
        );
        Url::parse(&raw).map_err(|e| ContentError::InvalidConfig(format!("{raw}: {e}")))
    }

    fn with_params(mut url: Url, query: &Query) -> Url {
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", &query.groq);
            for (name, value) in &query.params {
                pairs.append_pair(&format!("${name}"), &value.to_string());
            }
        }
        url
    }

    /// Full GET URL of a query. The worker caches Content API traffic by
    /// this URL.
    pub fn query_url(&self, query: &Query) -> Result<Url, ContentError> {
        Ok(Self::with_params(self.endpoint("query")?, query))
    }

    pub fn listen_url(&self, query: &Query) -> Result<Url, ContentError> {
        let mut url = Self::with_params(self.endpoint("listen")?, query);
        url.query_pairs_mut().append_pair("includeResult", "true");
        Ok(url)
    }

    /// Unwrap the `{ "result": ... }` envelope of a query response body.
    pub fn decode<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ContentError> {
        if !(200..300).contains(&status) {
            return Err(ContentError::HttpError { status });
        }
        let envelope: Envelope<T> = serde_json::from_slice(body)?;
        Ok(envelope.result)
    }

    /// Run a query and decode its result.
    pub async fn fetch<T: DeserializeOwned>(&self, query: &Query) -> Result<T, ContentError> {
        let start = Instant::now();
        let url = self.query_url(query)?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        tracing::debug!(status, bytes = body.len(), elapsed_ms = start.elapsed().as_millis() as u64, "content query");

        Self::decode(status, &body)
    }

    pub async fn exhibits(&self, filter: &ExhibitFilter) -> Result<Vec<Exhibit>, ContentError> {
        self.fetch(&query::exhibits(filter)).await
    }

    pub async fn exhibits_page(&self, filter: &ExhibitFilter) -> Result<Vec<Exhibit>, ContentError> {
        self.fetch(&query::exhibits_page(filter)).await
    }

    pub async fn exhibit_count(&self, filter: &ExhibitFilter) -> Result<u64, ContentError> {
        self.fetch(&query::exhibit_count(filter)).await
    }

    pub async fn exhibit(&self, id: &str) -> Result<Option<Exhibit>, ContentError> {
        self.fetch(&query::exhibit(id)).await
    }

    pub async fn exhibit_by_qr(&self, code: &str) -> Result<Option<Exhibit>, ContentError> {
        self.fetch(&query::exhibit_by_qr(code)).await
    }

    /// Exhibits by id; an empty (or unusable) id list answers without a request.
    pub async fn exhibits_by_ids(&self, ids: &[Value]) -> Result<Vec<Exhibit>, ContentError> {
        match query::exhibits_by_ids(ids) {
            Some(query) => self.fetch(&query).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ContentError> {
        self.fetch(&query::categories()).await
    }

    pub async fn museum_info(&self) -> Result<Option<MuseumInfo>, ContentError> {
        self.fetch(&query::museum_info()).await
    }

    pub async fn exhibitions(&self, featured: bool, active: bool) -> Result<Vec<Exhibition>, ContentError> {
        self.fetch(&query::exhibitions(featured, active)).await
    }

    pub async fn exhibition(&self, id_or_slug: &str) -> Result<Option<Exhibition>, ContentError> {
        self.fetch(&query::exhibition(id_or_slug)).await
    }

    pub async fn kiosk_config(&self, identifier: &str) -> Result<Option<KioskDevice>, ContentError> {
        self.fetch(&query::kiosk_config(identifier)).await
    }

    /// Subscribe to changes of every document of `document_type`.
    pub fn listen(&self, document_type: &str) -> Result<Subscription, ContentError> {
        let url = self.listen_url(&query::changes(document_type))?;
        Ok(Subscription::spawn(self.listen_http.clone(), url))
    }

    /// CDN URL of a `file-<id>-<ext>` asset reference.
    pub fn file_url(&self, asset_ref: &str) -> Option<String> {
        assets::file_url(&self.config.project_id, &self.config.dataset, asset_ref)
    }

    /// CDN URL of an `image-<id>-<WxH>-<ext>` asset reference.
    pub fn image_url(&self, asset_ref: &str) -> Option<String> {
        assets::image_url(&self.config.project_id, &self.config.dataset, asset_ref)
    }
}
