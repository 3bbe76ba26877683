//! HTTP surface of the kiosk worker.
//!
//! Routes:
//! - `GET  /_kiosk/health`               - worker state, partition sizes, messaging state
//! - `POST /_kiosk/interaction`          - visitor interaction → messaging
//! - `POST /_kiosk/exhibits/{id}/light`  - exhibit LED highlight → messaging
//! - everything else                     - intercepted by the cache worker

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use kiosk_client::content::query;
use kiosk_client::fetch::{canonicalize, resolve};
use kiosk_client::{
    CacheWorker, ContentClient, Exhibit, FetchOutcome, LightAction, MessagingClient, Network, Request,
    Response as WorkerResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::error::ProxyError;

/// Header naming where a proxied response came from.
pub const SOURCE_HEADER: &str = "x-kiosk-source";

/// Shared state of every handler.
pub struct AppState<N: Network> {
    pub worker: CacheWorker<N>,
    pub content: ContentClient,
    pub messaging: Arc<MessagingClient>,
    /// Origin that origin-form request targets resolve against.
    pub origin: Url,
}

/// Build the axum [`Router`] with all routes and shared state.
pub fn create_router<N: Network>(state: Arc<AppState<N>>) -> Router {
    Router::new()
        .route("/_kiosk/health", get(handle_health::<N>))
        .route("/_kiosk/interaction", post(handle_interaction::<N>))
        .route("/_kiosk/exhibits/{id}/light", post(handle_light::<N>))
        .fallback(handle_proxy::<N>)
        .with_state(state)
}

/// `GET /_kiosk/health`
async fn handle_health<N: Network>(State(state): State<Arc<AppState<N>>>) -> Result<Json<Value>, ProxyError> {
    let sizes = state.worker.partition_sizes().await?;
    Ok(Json(json!({
        "status": "ok",
        "worker": state.worker.state().await.as_str(),
        "version": state.worker.partitions().version,
        "partitions": {
            "shell": { "name": state.worker.partitions().shell, "entries": sizes.shell },
            "runtime": { "name": state.worker.partitions().runtime, "entries": sizes.runtime },
        },
        "messaging": state.messaging.state().as_str(),
        "time": chrono::Utc::now().to_rfc3339(),
    })))
}

#[derive(Debug, Deserialize)]
struct InteractionBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// `POST /_kiosk/interaction`
async fn handle_interaction<N: Network>(
    State(state): State<Arc<AppState<N>>>, Json(body): Json<InteractionBody>,
) -> Json<Value> {
    let data = if body.data.is_null() { json!({}) } else { body.data };
    let published = state.messaging.publish_interaction(&body.kind, data);
    Json(json!({ "published": published }))
}

#[derive(Debug, Deserialize)]
struct LightBody {
    #[serde(default = "default_action")]
    action: String,
}

fn default_action() -> String {
    "clicked".into()
}

/// `POST /_kiosk/exhibits/{id}/light`
///
/// The exhibit is looked up through the worker, so a cached Content API
/// answer still lights the strip while the CMS is unreachable.
async fn handle_light<N: Network>(
    State(state): State<Arc<AppState<N>>>, Path(id): Path<String>, body: Option<Json<LightBody>>,
) -> Result<Json<Value>, ProxyError> {
    let action = LightAction::parse(&body.map(|Json(b)| b.action).unwrap_or_else(default_action));
    let exhibit = load_exhibit(&state, &id)
        .await?
        .ok_or_else(|| ProxyError::NotFound(format!("exhibit {id}")))?;

    let published = state.messaging.publish_lightbulb_event(&exhibit, action);
    tracing::info!(exhibit = %id, action = action.as_str(), published, "exhibit light");
    Ok(Json(json!({ "exhibit": id, "action": action.as_str(), "published": published })))
}

async fn load_exhibit<N: Network>(state: &AppState<N>, id: &str) -> Result<Option<Exhibit>, ProxyError> {
    let exhibit_query = query::exhibit(id);
    let url = state.content.query_url(&exhibit_query)?;

    match state.worker.handle_fetch(&Request::get(url)).await {
        FetchOutcome::Handled(result) => {
            let response = result?;
            Ok(ContentClient::decode(response.status.as_u16(), &response.body)?)
        }
        FetchOutcome::Passthrough => Ok(state.content.fetch(&exhibit_query).await?),
    }
}

/// Upstream URL of a request target.
///
/// Absolute-form targets (forward proxy) are taken as they are; origin-form
/// targets resolve against the kiosk origin.
pub fn target_url(origin: &Url, uri: &Uri) -> Result<Url, ProxyError> {
    let result = if uri.scheme().is_some() {
        canonicalize(&uri.to_string())
    } else {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        resolve(origin, path)
    };
    result.map_err(|e| ProxyError::InvalidTarget(format!("{uri}: {e}")))
}

/// Everything else: offered to the cache worker, or forwarded untouched.
async fn handle_proxy<N: Network>(
    State(state): State<Arc<AppState<N>>>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes,
) -> Result<Response, ProxyError> {
    let url = target_url(&state.origin, &uri)?;
    let request = Request::from_fetch_metadata(method, url, headers);

    let response = match state.worker.handle_fetch(&request).await {
        FetchOutcome::Handled(result) => result?,
        FetchOutcome::Passthrough => {
            let body = (!body.is_empty()).then_some(body);
            state.worker.network().forward(&request, body).await?
        }
    };
    Ok(into_http(response))
}

fn into_http(response: WorkerResponse) -> Response {
    let source = response.source.as_str();
    let mut http = (response.status, response.headers, Body::from(response.body)).into_response();
    http.headers_mut()
        .insert(SOURCE_HEADER, HeaderValue::from_static(source));
    http
}
