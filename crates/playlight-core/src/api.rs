//! Platform API client.
//!
//! Read endpoints cache their first successful result and share one in-flight
//! request between concurrent callers. Nothing here returns an error to the
//! UI: failures are logged, reported once to the notification sink, and turn
//! into `None`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};
use url::Url;

use crate::error::TransportError;

/// Default platform API root.
pub const DEFAULT_API_URL: &str = "https://api.playlight.dev/platform";

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl Method {
    /// Method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A JSON request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// JSON body.
    pub body: Option<String>,
}

/// A raw response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: u16,
    /// Response text.
    pub body: String,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends requests. The browser implementation wraps `fetch`.
pub trait Transport {
    /// Send one request; every request carries `Content-Type: application/json`.
    fn send(&self, request: ApiRequest) -> LocalBoxFuture<'static, Result<ApiResponse, TransportError>>;
}

/// Game identifier; the platform uses both numeric and string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GameId {
    /// Numeric id.
    Number(u64),
    /// String id.
    Text(String),
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A game listed by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Identifier.
    pub id: GameId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Domain the game is served from.
    #[serde(default)]
    pub domain: Option<String>,
    /// Category.
    #[serde(default)]
    pub category: Option<String>,
    /// Fields the UI renders but the SDK core never reads.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of suggestions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Suggestions {
    /// Games on this page.
    pub games: Vec<Game>,
    /// Server page size.
    pub page_size: Option<usize>,
    /// Paging fields not used by the core.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct LikeResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Host name with a leading `www.` removed.
#[must_use]
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

type Pending = Shared<LocalBoxFuture<'static, Option<Value>>>;
type Notifier = Box<dyn Fn(&str)>;

struct ClientInner<T> {
    transport: T,
    base_url: String,
    host: String,
    categories: RefCell<Option<Vec<String>>>,
    current_game: RefCell<Option<Game>>,
    pending: RefCell<HashMap<String, (u64, Pending)>>,
    next_pending: Cell<u64>,
    notifier: RefCell<Option<Notifier>>,
}

/// Platform API client. Clones share caches.
pub struct ApiClient<T> {
    inner: Rc<ClientInner<T>>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("host", &self.inner.host)
            .finish_non_exhaustive()
    }
}

impl<T: Transport + 'static> ApiClient<T> {
    /// Create a client for the page served from `host`.
    pub fn new(transport: T, base_url: impl Into<String>, host: &str) -> Self {
        Self {
            inner: Rc::new(ClientInner {
                transport,
                base_url: base_url.into(),
                host: strip_www(host).to_string(),
                categories: RefCell::new(None),
                current_game: RefCell::new(None),
                pending: RefCell::new(HashMap::new()),
                next_pending: Cell::new(0),
                notifier: RefCell::new(None),
            }),
        }
    }

    /// Host name sent to the platform.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Route user-facing failure messages to `notifier`.
    pub fn set_notifier<F: Fn(&str) + 'static>(&self, notifier: F) {
        *self.inner.notifier.borrow_mut() = Some(Box::new(notifier));
    }

    fn endpoint(&self, segments: &[&str]) -> Option<Url> {
        let mut url = match Url::parse(&self.inner.base_url) {
            Ok(url) => url,
            Err(err) => {
                error!(base_url = %self.inner.base_url, error = %err, "invalid api base url");
                return None;
            }
        };
        url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
        Some(url)
    }

    async fn request(&self, method: Method, url: Url, body: Option<Value>, deduplicate: bool) -> Option<Value> {
        let key = url.to_string();
        if deduplicate {
            let existing = self.inner.pending.borrow().get(&key).map(|(_, p)| p.clone());
            if let Some(pending) = existing {
                debug!(url = %key, "joining in-flight request");
                return pending.await;
            }
        }

        let request = ApiRequest {
            method,
            url: key.clone(),
            body: body.map(|b| b.to_string()),
        };
        let inner = Rc::clone(&self.inner);
        let fut = async move { inner.perform(request).await }.boxed_local();
        if !deduplicate {
            return fut.await;
        }

        let shared = fut.shared();
        let ticket = self.inner.next_pending.get() + 1;
        self.inner.next_pending.set(ticket);
        self.inner
            .pending
            .borrow_mut()
            .insert(key.clone(), (ticket, shared.clone()));
        let result = shared.await;
        let mut pending = self.inner.pending.borrow_mut();
        if pending.get(&key).is_some_and(|(t, _)| *t == ticket) {
            pending.remove(&key);
        }
        result
    }

    /// All categories. Cached after the first success.
    pub async fn get_categories(&self) -> Option<Vec<String>> {
        if let Some(cached) = self.inner.categories.borrow().clone() {
            return Some(cached);
        }
        let url = self.endpoint(&["categories"])?;
        let value = self.request(Method::Get, url, None, true).await?;
        let categories: Vec<String> = decode(value)?;
        *self.inner.categories.borrow_mut() = Some(categories.clone());
        Some(categories)
    }

    /// One page of suggestions, excluding the current site.
    pub async fn get_suggestions(&self, category: Option<&str>, page: Option<u32>) -> Option<Suggestions> {
        let mut segments = vec!["suggestions"];
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            segments.push(category);
        }
        let mut url = self.endpoint(&segments)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(page) = page {
                query.append_pair("page", &page.to_string());
            }
            query.append_pair("without", &self.inner.host);
        }
        decode(self.request(Method::Get, url, None, false).await?)
    }

    /// The game served from this site. Cached after the first success.
    pub async fn get_current_game_info(&self) -> Option<Game> {
        if let Some(cached) = self.inner.current_game.borrow().clone() {
            return Some(cached);
        }
        let host = self.inner.host.clone();
        let url = self.endpoint(&["game-by-domain", &host])?;
        let game: Game = decode(self.request(Method::Get, url, None, true).await?)?;
        *self.inner.current_game.borrow_mut() = Some(game.clone());
        Some(game)
    }

    /// Record that discovery was opened.
    pub async fn track_open(&self, format: Option<&str>) {
        let Some(url) = self.endpoint(&["event", "open"]) else {
            return;
        };
        let mut body = json!({ "domain": self.inner.host });
        if let Some(format) = format {
            body["format"] = json!(format);
        }
        self.request(Method::Post, url, Some(body), false).await;
    }

    /// Record a click on a game.
    pub async fn track_click(&self, game_id: &GameId, format: Option<&str>) {
        let Some(url) = self.endpoint(&["event", "click"]) else {
            return;
        };
        let mut body = json!({ "sourceDomain": self.inner.host, "gameId": game_id });
        if let Some(format) = format {
            body["format"] = json!(format);
        }
        self.request(Method::Post, url, Some(body), false).await;
    }

    /// Like or unlike a game. Returns the server's success flag.
    pub async fn toggle_like(&self, game_id: &GameId, liked: bool) -> bool {
        let action = if liked { "like" } else { "unlike" };
        let id = game_id.to_string();
        let Some(url) = self.endpoint(&["rating", &id, action]) else {
            return false;
        };
        self.request(Method::Post, url, None, false)
            .await
            .and_then(decode::<LikeResponse>)
            .is_some_and(|r| r.success)
    }
}

impl<T: Transport> ClientInner<T> {
    async fn perform(&self, request: ApiRequest) -> Option<Value> {
        let url = request.url.clone();
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                self.report(&url, &err);
                return None;
            }
        };
        match response.status {
            404 => {
                warn!(%url, "game not found; expected in local or test environments");
                return None;
            }
            429 => {
                warn!(%url, "request rate limited");
                return None;
            }
            _ => {}
        }
        if !response.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&response.body)
                .ok()
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| response.status.to_string());
            self.report(
                &url,
                &TransportError::Status {
                    status: response.status,
                    message,
                },
            );
            return None;
        }
        match serde_json::from_str(&response.body) {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(&url, &TransportError::Decode(err.to_string()));
                None
            }
        }
    }

    fn report(&self, url: &str, err: &TransportError) {
        error!(%url, error = %err, "api request failed");
        if let Some(notify) = self.notifier.borrow().as_ref() {
            notify(&format!("Request failed: {err}"));
        }
    }
}

fn decode<D: for<'de> Deserialize<'de>>(value: Value) -> Option<D> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(error = %err, "unexpected api response shape");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::channel::oneshot;

    /// Transport answering from a route table and recording every request.
    #[derive(Default, Clone)]
    pub(crate) struct FakeTransport {
        pub(crate) routes: Rc<RefCell<Vec<(String, u16, String)>>>,
        pub(crate) log: Rc<RefCell<Vec<ApiRequest>>>,
        pub(crate) gates: Rc<RefCell<Vec<oneshot::Sender<()>>>>,
        pub(crate) hold: Rc<Cell<bool>>,
    }

    impl FakeTransport {
        pub(crate) fn route(&self, path_fragment: &str, status: u16, body: &str) {
            self.routes
                .borrow_mut()
                .push((path_fragment.to_string(), status, body.to_string()));
        }

        pub(crate) fn release(&self) {
            for gate in self.gates.borrow_mut().drain(..) {
                let _ = gate.send(());
            }
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.log.borrow().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, request: ApiRequest) -> LocalBoxFuture<'static, Result<ApiResponse, TransportError>> {
            let answer = self
                .routes
                .borrow()
                .iter()
                .find(|(fragment, _, _)| request.url.contains(fragment.as_str()))
                .map(|(_, status, body)| ApiResponse {
                    status: *status,
                    body: body.clone(),
                })
                .ok_or_else(|| TransportError::Network("connection refused".into()));
            self.log.borrow_mut().push(request);
            let gate = if self.hold.get() {
                let (tx, rx) = oneshot::channel();
                self.gates.borrow_mut().push(tx);
                Some(rx)
            } else {
                None
            };
            async move {
                if let Some(rx) = gate {
                    let _ = rx.await;
                }
                answer
            }
            .boxed_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeTransport;
    use super::*;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;

    fn client(transport: &FakeTransport) -> ApiClient<FakeTransport> {
        ApiClient::new(transport.clone(), DEFAULT_API_URL, "www.mygame.io")
    }

    #[test]
    fn test_host_without_www() {
        assert_eq!(strip_www("www.mygame.io"), "mygame.io");
        assert_eq!(strip_www("mygame.io"), "mygame.io");
    }

    #[test]
    fn test_categories_cached() {
        let transport = FakeTransport::default();
        transport.route("/categories", 200, r#"["action","puzzle"]"#);
        let api = client(&transport);
        let first = block_on(api.get_categories());
        let second = block_on(api.get_categories());
        assert_eq!(first, Some(vec!["action".to_string(), "puzzle".to_string()]));
        assert_eq!(first, second);
        assert_eq!(transport.log.borrow().len(), 1);
    }

    #[test]
    fn test_concurrent_reads_share_request() {
        let transport = FakeTransport::default();
        transport.route("/categories", 200, r#"["arcade"]"#);
        transport.hold.set(true);
        let api = client(&transport);

        let mut pool = LocalPool::new();
        let results = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..3 {
            let api = api.clone();
            let results = Rc::clone(&results);
            pool.spawner()
                .spawn_local(async move {
                    let categories = api.get_categories().await;
                    results.borrow_mut().push(categories);
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert_eq!(transport.log.borrow().len(), 1);

        transport.release();
        pool.run();
        assert_eq!(results.borrow().len(), 3);
        assert!(results
            .borrow()
            .iter()
            .all(|r| r.as_deref() == Some(&["arcade".to_string()][..])));
        assert!(api.inner.pending.borrow().is_empty());
    }

    #[test]
    fn test_suggestions_url() {
        let transport = FakeTransport::default();
        transport.route("/suggestions", 200, r#"{"games":[{"id":1,"name":"A"}],"pageSize":20}"#);
        let api = client(&transport);
        let page = block_on(api.get_suggestions(Some("puzzle"), Some(2))).unwrap();
        assert_eq!(page.games.len(), 1);
        assert_eq!(page.page_size, Some(20));
        assert_eq!(
            transport.urls(),
            vec!["https://api.playlight.dev/platform/suggestions/puzzle?page=2&without=mygame.io"]
        );
    }

    #[test]
    fn test_soft_failures_return_none_without_notification() {
        let transport = FakeTransport::default();
        transport.route("/game-by-domain/", 404, r#"{"error":"not found"}"#);
        transport.route("/suggestions", 429, "");
        let api = client(&transport);
        let notes = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = Rc::clone(&notes);
        api.set_notifier(move |m| sink.borrow_mut().push(m.to_string()));

        assert_eq!(block_on(api.get_current_game_info()), None);
        assert_eq!(block_on(api.get_suggestions(None, Some(1))), None);
        assert!(notes.borrow().is_empty());
    }

    #[test]
    fn test_hard_failure_notifies() {
        let transport = FakeTransport::default();
        transport.route("/categories", 500, r#"{"error":"database down"}"#);
        let api = client(&transport);
        let notes = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = Rc::clone(&notes);
        api.set_notifier(move |m| sink.borrow_mut().push(m.to_string()));

        assert_eq!(block_on(api.get_categories()), None);
        block_on(api.track_open(Some("sidebar")));
        assert_eq!(
            *notes.borrow(),
            vec![
                "Request failed: database down".to_string(),
                "Request failed: network error: connection refused".to_string(),
            ]
        );
    }

    #[test]
    fn test_tracking_bodies() {
        let transport = FakeTransport::default();
        transport.route("/event/", 200, "{}");
        let api = client(&transport);
        block_on(api.track_open(None));
        block_on(api.track_click(&GameId::Number(7), Some("carousel")));

        let log = transport.log.borrow();
        assert_eq!(log[0].method, Method::Post);
        let open: Value = serde_json::from_str(log[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(open, json!({ "domain": "mygame.io" }));
        let click: Value = serde_json::from_str(log[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(
            click,
            json!({ "sourceDomain": "mygame.io", "gameId": 7, "format": "carousel" })
        );
    }

    #[test]
    fn test_toggle_like() {
        let transport = FakeTransport::default();
        transport.route("/rating/abc/unlike", 200, r#"{"success":true}"#);
        let api = client(&transport);
        assert!(block_on(api.toggle_like(&GameId::Text("abc".into()), false)));
        assert!(!block_on(api.toggle_like(&GameId::Text("abc".into()), true)));
    }
}
