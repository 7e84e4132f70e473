//! Cached, deduplicating client for the restaurant REST backend.
//!
//! Reads (`GET`) are served from the `TieredCache` while fresh. Concurrent
//! reads of the same path share one in-flight network call. Writes always
//! hit the network and, once they succeed, drop every cached read of the
//! written table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::TieredCache;
use crate::config::ClientConfig;
use crate::models::{resource_path, table_of, ApiResponse, ResourceData};

use super::transport::{HttpRequest, Transport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Path segment of the REST API under the backend base URL.
const REST_PREFIX: &str = "rest/v1";

/// Prefix of cache keys for GET responses.
const CACHE_KEY_PREFIX: &str = "api_";

/// Asks the backend to echo created/updated rows back.
const PREFER_REPRESENTATION: &str = "return=representation";

type ReadResult = Result<ApiResponse, ApiError>;
type PendingRead = Shared<BoxFuture<'static, ReadResult>>;

/// Method, extra headers and body of a request. Defaults to a bare GET.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_string(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Request body not serializable: {}", e)))?;
        self.body = Some(body);
        Ok(self)
    }

    fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

/// Cache key for a GET of `path`.
pub fn cache_key(path: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, path)
}

/// Delay before retry number `attempt + 1`: `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// A registered read. `id` tells a settling read apart from a newer one
/// registered under the same path after a write.
struct InFlight {
    id: u64,
    read: PendingRead,
}

struct ClientInner {
    base_url: String,
    api_key: String,
    transport: Arc<dyn Transport>,
    cache: Arc<TieredCache<ResourceData>>,
    config: ClientConfig,
    pending: Mutex<HashMap<String, InFlight>>,
    /// Per-table write counter. A read only populates the cache if no
    /// write to its table succeeded while it was in flight.
    generations: Mutex<HashMap<String, u64>>,
    next_read_id: AtomicU64,
}

/// REST client with response caching and read deduplication.
/// Clone is cheap - all clones share the cache and the in-flight reads.
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<ClientInner>,
}

impl RequestClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        transport: Arc<dyn Transport>,
        cache: Arc<TieredCache<ResourceData>>,
        config: ClientConfig,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            inner: Arc::new(ClientInner {
                base_url,
                api_key: api_key.into(),
                transport,
                cache,
                config,
                pending: Mutex::new(HashMap::new()),
                generations: Mutex::new(HashMap::new()),
                next_read_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache<ResourceData>> {
        &self.inner.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Perform a request against `<base>/rest/v1/<path>`.
    pub async fn request(&self, path: &str, options: RequestOptions) -> ReadResult {
        if options.is_read() {
            self.read(path, options).await
        } else {
            self.write(path, options).await
        }
    }

    /// GET `table` filtered by a PostgREST `query` (may be empty).
    pub async fn get(&self, table: &str, query: &str) -> ReadResult {
        self.request(&resource_path(table, query), RequestOptions::default())
            .await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> ReadResult {
        let options = RequestOptions::new(Method::POST).json(body)?;
        self.request(table, options).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &str,
        body: &B,
    ) -> ReadResult {
        let options = RequestOptions::new(Method::PATCH).json(body)?;
        self.request(&resource_path(table, query), options).await
    }

    pub async fn delete(&self, table: &str, query: &str) -> ReadResult {
        self.request(&resource_path(table, query), RequestOptions::new(Method::DELETE))
            .await
    }

    /// Drop every cached read of `table`, whatever its query.
    pub fn invalidate_collection(&self, table: &str) -> usize {
        let removed = self
            .inner
            .cache
            .invalidate(|key| cached_table(key) == Some(table));
        debug!(table, removed, "Invalidated cached reads");
        removed
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Number of reads currently in flight.
    pub fn pending_reads(&self) -> usize {
        self.inner.pending().len()
    }

    async fn read(&self, path: &str, options: RequestOptions) -> ReadResult {
        let inner = &self.inner;
        let key = cache_key(path);

        if inner.config.cache_enabled {
            if let Some(data) = inner.cache.get(&key, inner.config.cache_ttl()) {
                debug!(path, "Serving cached response");
                return Ok(ApiResponse::Data(data));
            }
        }

        let (in_flight, started) = {
            let mut pending = inner.pending();
            match pending.get(path) {
                Some(existing) => {
                    debug!(path, "Joining in-flight request");
                    (existing.read.clone(), false)
                }
                None => {
                    let id = inner.next_read_id.fetch_add(1, Ordering::Relaxed);
                    let generation = inner.generation(table_of(path));
                    let read = Self::start_read(
                        Arc::clone(inner),
                        path.to_string(),
                        options,
                        id,
                        generation,
                    );
                    pending.insert(
                        path.to_string(),
                        InFlight {
                            id,
                            read: read.clone(),
                        },
                    );
                    (read, true)
                }
            }
        };

        // Drive the read on the runtime too, so it settles even if every
        // caller waiting on it is dropped.
        if started {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(in_flight.clone());
            }
        }

        in_flight.await
    }

    /// Build the shared future for a read. It settles itself: the cache is
    /// updated and the pending entry removed before any waiter sees the
    /// result.
    fn start_read(
        inner: Arc<ClientInner>,
        path: String,
        options: RequestOptions,
        id: u64,
        generation: u64,
    ) -> PendingRead {
        async move {
            let result = inner.execute(&path, &options).await;

            if inner.config.cache_enabled {
                if let Ok(response) = &result {
                    inner.store_read(&path, generation, response.data().cloned());
                }
            }
            inner.finish_read(&path, id);

            result
        }
        .boxed()
        .shared()
    }

    async fn write(&self, path: &str, options: RequestOptions) -> ReadResult {
        let options = options.header("Prefer", PREFER_REPRESENTATION);
        let response = self.inner.execute(path, &options).await?;

        let table = table_of(path);
        self.inner.bump_generation(table);
        let abandoned = {
            let mut pending = self.inner.pending();
            let before = pending.len();
            pending.retain(|p, _| table_of(p) != table);
            before - pending.len()
        };
        if abandoned > 0 {
            debug!(table, abandoned, "Detached in-flight reads overtaken by a write");
        }
        self.invalidate_collection(table);
        Ok(response)
    }
}

impl ClientInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.generations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self, table: &str) -> u64 {
        self.generations().get(table).copied().unwrap_or(0)
    }

    fn bump_generation(&self, table: &str) {
        *self.generations().entry(table.to_string()).or_insert(0) += 1;
    }

    /// Cache a settled read unless a write to its table succeeded since it
    /// was registered. The generation lock is held across the cache update
    /// so a concurrent write either sees the entry and invalidates it, or
    /// bumps first and the entry is never stored.
    fn store_read(&self, path: &str, generation: u64, data: Option<ResourceData>) {
        let generations = self.generations();
        let current = generations.get(table_of(path)).copied().unwrap_or(0);
        if current != generation {
            debug!(path, "Discarding read overtaken by a write");
            return;
        }
        self.cache
            .set(&cache_key(path), data, self.config.cache_ttl());
    }

    /// Remove the pending entry for `path` if it is still this read's.
    fn finish_read(&self, path: &str, id: u64) {
        let mut pending = self.pending();
        if pending.get(path).is_some_and(|entry| entry.id == id) {
            pending.remove(path);
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PREFIX, path)
    }

    /// Run a request with timeout and retry/backoff.
    async fn execute(&self, path: &str, options: &RequestOptions) -> ReadResult {
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            match self.attempt(path, &url, options).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.backoff_base(), attempt);
                    attempt += 1;
                    warn!(
                        url = %url,
                        retry = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.status() != Some(404) {
                        warn!(url = %url, method = %options.method, error = %err, "API request failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// One network exchange bounded by the configured timeout. Dropping
    /// the transport future on timeout cancels the call.
    async fn attempt(&self, path: &str, url: &str, options: &RequestOptions) -> ReadResult {
        let deadline = self.config.timeout();
        let request = self.build_request(url, options);

        let response = match tokio::time::timeout(deadline, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ApiError::from_transport(e, deadline)),
            Err(_elapsed) => return Err(ApiError::Timeout(deadline)),
        };

        if !response.status.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        ApiResponse::decode(path, &response.body)
    }

    fn build_request(&self, url: &str, options: &RequestOptions) -> HttpRequest {
        let mut headers = vec![
            ("apikey".to_string(), self.api_key.clone()),
            ("Authorization".to_string(), format!("Bearer {}", self.api_key)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        headers.extend(options.headers.iter().cloned());

        HttpRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers,
            body: options.body.clone(),
        }
    }
}

/// Table a cache key belongs to, if it is one of this client's keys.
fn cached_table(key: &str) -> Option<&str> {
    key.strip_prefix(CACHE_KEY_PREFIX).map(table_of)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::mock::{MockTransport, Step};
    use crate::api::transport::TransportError;
    use crate::cache::MemoryStore;
    use crate::config::CacheConfig;
    use crate::models::Category;
    use tokio::time::Instant;

    const CATEGORIES: &str = r#"[{"id":"c1","name_ar":"مشويات","is_active":true}]"#;

    fn client_with(transport: Arc<MockTransport>, config: ClientConfig) -> RequestClient {
        let cache = Arc::new(TieredCache::new(
            CacheConfig::default(),
            Arc::new(MemoryStore::default()),
        ));
        RequestClient::new("https://demo.supabase.co/", "anon-key", transport, cache, config)
    }

    fn client(transport: Arc<MockTransport>) -> RequestClient {
        client_with(transport, ClientConfig::default())
    }

    #[test]
    fn test_backoff_schedule() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
    }

    #[test]
    fn test_cached_table() {
        assert_eq!(cached_table("api_products?restaurant_id=eq.1"), Some("products"));
        assert_eq!(cached_table("api_products"), Some("products"));
        assert_eq!(cached_table("api_products_archive"), Some("products_archive"));
        assert_eq!(cached_table("session"), None);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        let client = client(transport.clone());

        client.get("categories", "restaurant_id=eq.r1").await.unwrap();
        client
            .post("categories", &serde_json::json!({"name_ar": "x"}))
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(
            requests[0].url,
            "https://demo.supabase.co/rest/v1/categories?restaurant_id=eq.r1"
        );
        assert!(requests[0]
            .headers
            .contains(&("apikey".to_string(), "anon-key".to_string())));
        assert!(!requests[0].headers.iter().any(|(name, _)| name == "Prefer"));

        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].body.as_deref(), Some(r#"{"name_ar":"x"}"#));
        assert!(requests[1]
            .headers
            .contains(&("Prefer".to_string(), "return=representation".to_string())));
    }

    #[tokio::test]
    async fn test_cached_read_skips_network() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        let client = client(transport.clone());

        let first = client.get("categories", "").await.unwrap();
        let second = client.get("categories", "").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);
        let rows = second.into_rows::<Category>().unwrap();
        assert_eq!(rows[0].id, "c1");
    }

    #[tokio::test]
    async fn test_cache_disabled_always_fetches() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        let config = ClientConfig {
            cache_enabled: false,
            ..ClientConfig::default()
        };
        let client = client_with(transport.clone(), config);

        client.get("categories", "").await.unwrap();
        client.get("categories", "").await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(client.cache().len_memory(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_call() {
        let transport = Arc::new(MockTransport::new(Step::delayed(
            CATEGORIES,
            Duration::from_millis(200),
        )));
        let client = client(transport.clone());

        let (a, b) = tokio::join!(
            client.get("categories", "restaurant_id=eq.r1"),
            client.get("categories", "restaurant_id=eq.r1"),
        );

        assert_eq!(transport.calls(), 1);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(client.pending_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_failure_and_do_not_cache() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        transport.push(Step::Reply {
            status: 404,
            body: "{}".to_string(),
            delay: Duration::from_millis(50),
        });
        let client = client(transport.clone());

        let (a, b) = tokio::join!(client.get("categories", ""), client.get("categories", ""));

        assert_eq!(transport.calls(), 1);
        assert!(matches!(a, Err(ApiError::Client { status: 404, .. })));
        assert_eq!(a, b);
        assert_eq!(client.pending_reads(), 0);
        assert_eq!(client.cache().len_memory(), 0);

        // The failed read left nothing behind, so the next one goes out again.
        client.get("categories", "").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_paths_are_not_coalesced() {
        let transport = Arc::new(MockTransport::new(Step::delayed(
            "[]",
            Duration::from_millis(100),
        )));
        let client = client(transport.clone());

        let (a, b) = tokio::join!(client.get("products", "id=eq.1"), client.get("products", "id=eq.2"));
        a.unwrap();
        b.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_read_completes_after_initiator_is_dropped() {
        let transport = Arc::new(MockTransport::new(Step::delayed(
            CATEGORIES,
            Duration::from_millis(100),
        )));
        let client = client(transport.clone());

        let first = client.clone();
        let started = tokio::spawn(async move { first.get("categories", "").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.pending_reads(), 1);
        started.abort();

        let joined = client.get("categories", "").await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(joined.data().map(ResourceData::len), Some(1));
        assert_eq!(client.pending_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_read_still_settles() {
        let transport = Arc::new(MockTransport::new(Step::delayed(
            CATEGORIES,
            Duration::from_millis(100),
        )));
        let client = client(transport.clone());

        let first = client.clone();
        let started = tokio::spawn(async move { first.get("categories", "").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        started.abort();

        // Nobody waits on the read any more; it still completes and caches.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.pending_reads(), 0);

        client.get("categories", "").await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    fn first_name(response: ApiResponse) -> String {
        let rows = response.into_rows::<Category>().unwrap();
        rows[0].name_ar.clone()
    }

    const OLD_NAME: &str = r#"[{"id":"c1","name_ar":"قديم","is_active":true}]"#;
    const NEW_NAME: &str = r#"[{"id":"c1","name_ar":"جديد","is_active":true}]"#;

    #[tokio::test(start_paused = true)]
    async fn test_read_settling_after_write_is_not_cached() {
        let transport = Arc::new(MockTransport::new(Step::ok(NEW_NAME)));
        transport.push(Step::delayed(OLD_NAME, Duration::from_millis(500)));
        transport.push(Step::status(204, ""));
        let client = client(transport.clone());

        let reader = client.clone();
        let slow = tokio::spawn(async move { reader.get("categories", "").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        client
            .patch("categories", "id=eq.c1", &serde_json::json!({"name_ar": "جديد"}))
            .await
            .unwrap();

        // The pre-write read still answers its own caller.
        let stale = slow.await.unwrap().unwrap();
        assert_eq!(first_name(stale), "قديم");

        let fresh = client.get("categories", "").await.unwrap();
        assert_eq!(first_name(fresh), "جديد");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_write_does_not_join_earlier_flight() {
        let transport = Arc::new(MockTransport::new(Step::ok(NEW_NAME)));
        transport.push(Step::delayed(OLD_NAME, Duration::from_millis(500)));
        transport.push(Step::status(204, ""));
        let client = client(transport.clone());

        let reader = client.clone();
        let slow = tokio::spawn(async move { reader.get("categories", "").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        client.delete("categories", "id=eq.c2").await.unwrap();
        let fresh = client.get("categories", "").await.unwrap();
        assert_eq!(first_name(fresh), "جديد");
        assert_eq!(transport.calls(), 3);

        slow.await.unwrap().unwrap();
        assert_eq!(client.pending_reads(), 0);

        // The fresh result stays cached; the late one did not replace it.
        let cached = client.get("categories", "").await.unwrap();
        assert_eq!(first_name(cached), "جديد");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_write_invalidates_collection() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        let client = client(transport.clone());

        client.get("categories", "restaurant_id=eq.r1").await.unwrap();
        client.get("categories", "id=eq.c1").await.unwrap();
        client.get("products", "").await.unwrap();
        assert_eq!(transport.calls(), 3);

        transport.push(Step::status(204, ""));
        let written = client
            .patch("categories", "id=eq.c1", &serde_json::json!({"is_active": false}))
            .await
            .unwrap();
        assert_eq!(written, ApiResponse::NoContent);

        client.get("categories", "restaurant_id=eq.r1").await.unwrap();
        client.get("categories", "id=eq.c1").await.unwrap();
        assert_eq!(transport.calls(), 6);

        // Other collections keep their cached reads.
        client.get("products", "").await.unwrap();
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        let client = client(transport.clone());

        client.get("categories", "").await.unwrap();
        transport.push(Step::status(400, r#"{"message":"bad"}"#));
        let err = client.delete("categories", "id=eq.c1").await.unwrap_err();
        assert!(matches!(err, ApiError::Client { status: 400, .. }));

        client.get("categories", "").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_never_coalesced_or_cached() {
        let transport = Arc::new(MockTransport::new(Step::delayed(
            CATEGORIES,
            Duration::from_millis(50),
        )));
        let client = client(transport.clone());
        let body = serde_json::json!({"name_ar": "x"});

        let (a, b) = tokio::join!(client.post("categories", &body), client.post("categories", &body));
        a.unwrap();
        b.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(client.cache().len_memory(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_retry_budget() {
        let transport = Arc::new(MockTransport::new(Step::Hang));
        let client = client(transport.clone());

        let started = Instant::now();
        let err = client.get("products", "").await.unwrap_err();

        assert_eq!(err, ApiError::Timeout(Duration::from_millis(8000)));
        assert_eq!(transport.calls(), 3);
        // Three 8s deadlines plus 500ms and 1000ms of backoff.
        assert_eq!(started.elapsed(), Duration::from_millis(3 * 8000 + 500 + 1000));
        assert_eq!(client.pending_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_recover() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        transport.push(Step::Fail(TransportError::Connection("reset".into())));
        transport.push(Step::status(429, ""));
        let client = client(transport.clone());

        let started = Instant::now();
        let response = client.get("categories", "").await.unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
        assert_eq!(response.data().map(ResourceData::len), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_surfaces_after_retries() {
        let transport = Arc::new(MockTransport::new(Step::status(429, "")));
        let client = client(transport.clone());

        let err = client.get("reviews", "").await.unwrap_err();
        assert_eq!(err, ApiError::RateLimited);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        transport.push(Step::status(503, "maintenance"));
        let client = client(transport.clone());

        client.get("users", "").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let transport = Arc::new(MockTransport::new(Step::status(404, "")));
        let client = client(transport.clone());

        let err = client.get("categories", "id=eq.missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Client { status: 404, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_payload_too_large_is_not_retried() {
        let transport = Arc::new(MockTransport::new(Step::status(413, "")));
        let client = client(transport.clone());

        let err = client
            .patch("restaurant_settings", "id=eq.s1", &serde_json::json!({"logo_url": "data:..."}))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::PayloadTooLarge);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_failure_not_retried() {
        let transport = Arc::new(MockTransport::new(Step::ok("{not json")));
        let client = client(transport.clone());

        let err = client.get("products", "").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_read_clears_cached_key() {
        let transport = Arc::new(MockTransport::new(Step::status(200, "")));
        let client = client(transport.clone());

        let response = client.get("reviews", "").await.unwrap();
        assert_eq!(response, ApiResponse::NoContent);
        assert_eq!(client.cache().len_memory(), 0);

        client.get("reviews", "").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let transport = Arc::new(MockTransport::new(Step::ok(CATEGORIES)));
        let client = client(transport.clone());

        client.get("categories", "").await.unwrap();
        client.clear_cache();
        client.get("categories", "").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }
}
