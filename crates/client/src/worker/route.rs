//! Request classification.
//!
//! The router is an ordered table of `(name, predicate, strategy)` rules.
//! Rules are evaluated top to bottom and the first match wins; a request no
//! rule matches is passed through untouched.

use std::fmt;
use std::sync::LazyLock;

use kiosk_core::Error;
use regex::Regex;

use super::request::{Destination, Request, RequestMode};

static IMAGE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|webp|gif|svg)$").expect("static regex is valid"));

/// How a matched request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Network, then runtime cache, then the offline document from the shell.
    NetworkFirstWithFallback,
    /// Network, then runtime cache; no substitute document.
    NetworkFirst,
    /// Cached copy immediately, refreshed from the network in the background.
    StaleWhileRevalidate,
}

/// Outcome of classifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Name of the rule that matched.
    pub rule: &'static str,
    pub strategy: Strategy,
}

type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync>;

/// One classification rule.
pub struct Rule {
    pub name: &'static str,
    pub strategy: Strategy,
    predicate: Predicate,
}

impl Rule {
    pub fn new(
        name: &'static str, strategy: Strategy, predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { name, strategy, predicate: Box::new(predicate) }
    }

    pub fn matches(&self, request: &Request) -> bool {
        (self.predicate)(request)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Top-level page load: navigate mode, or a GET that accepts HTML.
pub fn is_navigation(request: &Request) -> bool {
    request.mode == RequestMode::Navigate
        || (request.is_get() && request.accept().is_some_and(|accept| accept.contains("text/html")))
}

/// Request aimed at the Content API host.
pub fn is_content_api(request: &Request, host_pattern: &Regex) -> bool {
    request
        .url
        .host_str()
        .is_some_and(|host| host_pattern.is_match(host))
}

/// Image by destination or by file extension.
pub fn is_image(request: &Request) -> bool {
    request.destination == Destination::Image || IMAGE_EXTENSION.is_match(request.url.path())
}

/// Stylesheet, script or font.
pub fn is_static_asset(request: &Request) -> bool {
    matches!(request.destination, Destination::Style | Destination::Script | Destination::Font)
}

/// Ordered rule table.
#[derive(Debug, Default)]
pub struct Router {
    rules: Vec<Rule>,
}

impl Router {
    /// The kiosk rule table: navigation, content-api, image, static-asset.
    pub fn new(content_host: Regex) -> Self {
        Self::default()
            .with_rule(Rule::new("navigation", Strategy::NetworkFirstWithFallback, is_navigation))
            .with_rule(Rule::new("content-api", Strategy::NetworkFirst, move |req| is_content_api(req, &content_host)))
            .with_rule(Rule::new("image", Strategy::StaleWhileRevalidate, is_image))
            .with_rule(Rule::new("static-asset", Strategy::StaleWhileRevalidate, is_static_asset))
    }

    /// Build the kiosk rule table from a Content API host regex.
    pub fn from_host_pattern(pattern: &str) -> Result<Self, Error> {
        let content_host =
            Regex::new(pattern).map_err(|e| Error::InvalidInput(format!("content host pattern: {e}")))?;
        Ok(Self::new(content_host))
    }

    /// Append a rule; it is evaluated after every rule already present.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// First matching rule, or None for pass-through.
    pub fn classify(&self, request: &Request) -> Option<Route> {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| Route { rule: rule.name, strategy: rule.strategy })
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use reqwest::header::{ACCEPT, HeaderValue};
    use url::Url;

    fn router() -> Router {
        Router::from_host_pattern(r"(^|\.)sanity\.io$").unwrap()
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(router().rule_names(), vec!["navigation", "content-api", "image", "static-asset"]);
    }

    #[test]
    fn test_navigate_mode_is_navigation() {
        let req = Request::navigate(Url::parse("https://kiosk.local/exponate").unwrap());
        let route = router().classify(&req).unwrap();
        assert_eq!(route.rule, "navigation");
        assert_eq!(route.strategy, Strategy::NetworkFirstWithFallback);
    }

    #[test]
    fn test_html_accept_get_is_navigation() {
        let req = get("https://kiosk.local/").with_header(ACCEPT, HeaderValue::from_static("text/html,*/*"));
        assert_eq!(router().classify(&req).unwrap().rule, "navigation");
    }

    #[test]
    fn test_html_accept_post_is_not_navigation() {
        let mut req = get("https://kiosk.local/form").with_header(ACCEPT, HeaderValue::from_static("text/html"));
        req.method = Method::POST;
        assert!(router().classify(&req).is_none());
    }

    #[test]
    fn test_content_api_host() {
        let req = get("https://832k5je1.api.sanity.io/v2024-01-01/data/query/production?query=*");
        let route = router().classify(&req).unwrap();
        assert_eq!(route.rule, "content-api");
        assert_eq!(route.strategy, Strategy::NetworkFirst);

        assert!(router().classify(&get("https://notsanity.io.example.com/x")).is_none());
    }

    #[test]
    fn test_content_api_host_wins_over_image_extension() {
        let req = get("https://cdn.sanity.io/images/832k5je1/production/abc-800x600.jpg");
        assert_eq!(router().classify(&req).unwrap().rule, "content-api");

        let req = get("https://kiosk.local/assets/hero.JPEG");
        assert_eq!(router().classify(&req).unwrap().rule, "image");
    }

    #[test]
    fn test_image_by_destination() {
        let req = get("https://kiosk.local/thumb?id=1").with_destination(Destination::Image);
        let route = router().classify(&req).unwrap();
        assert_eq!(route.rule, "image");
        assert_eq!(route.strategy, Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_static_assets() {
        for dest in [Destination::Style, Destination::Script, Destination::Font] {
            let req = get("https://kiosk.local/_astro/index.abc123").with_destination(dest);
            assert_eq!(router().classify(&req).unwrap().rule, "static-asset");
        }
    }

    #[test]
    fn test_unmatched_passes_through() {
        assert!(router().classify(&get("https://kiosk.local/api/ping")).is_none());
        assert!(Router::default().classify(&get("https://kiosk.local/")).is_none());
    }

    #[test]
    fn test_invalid_host_pattern() {
        assert!(matches!(Router::from_host_pattern("(unclosed"), Err(Error::InvalidInput(_))));
    }
}
