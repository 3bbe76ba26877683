//! Scripted network used by the worker tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use kiosk_core::{AppConfig, Error};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use super::{Network, Request, Response};

/// Serves canned bodies by URL; unknown URLs answer 404. Going offline makes
/// every fetch fail with a network error.
pub(crate) struct FakeNetwork {
    online: AtomicBool,
    pages: Mutex<HashMap<String, (u16, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self { online: AtomicBool::new(true), pages: Mutex::new(HashMap::new()), calls: Mutex::new(Vec::new()) }
    }

    pub(crate) fn serve(&self, url: &str, status: u16, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait::async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{url}: connection refused")));
        }

        let (status, body) = self
            .pages
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or((404, "not found".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Ok(Response::new(StatusCode::from_u16(status).unwrap(), headers, body))
    }
}

/// Worker configuration rooted at `https://kiosk.local`.
pub(crate) fn kiosk_config(version: &str) -> AppConfig {
    AppConfig { origin: "https://kiosk.local".into(), cache_version: version.into(), ..Default::default() }
}

/// Serve the default bootstrap set.
pub(crate) fn serve_shell(net: &FakeNetwork) {
    net.serve("https://kiosk.local/", 200, "<html>home</html>");
    net.serve("https://kiosk.local/offline.html", 200, "<html>offline</html>");
    net.serve("https://kiosk.local/favicon.svg", 200, "<svg/>");
    net.serve("https://kiosk.local/manifest.json", 200, "{}");
}
