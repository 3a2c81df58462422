use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::http::{InFlightRegistry, Payload, RequestCache, RequestError, RetryPolicy, Sleeper, TokioSleeper};
use crate::session::{SessionStore, TOKEN_KEY};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(value: Method) -> Self {
        match value {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Global "request in progress" visual flag.
pub trait LoadingIndicator: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoading;

impl LoadingIndicator for NoLoading {
    fn show(&self) {}
    fn hide(&self) {}
}

/// Hides the indicator on drop, so success, failure and cancellation all clean up.
struct LoadingGuard {
    indicator: Arc<dyn LoadingIndicator>,
}

impl LoadingGuard {
    fn show(indicator: &Arc<dyn LoadingIndicator>) -> Self {
        indicator.show();
        Self {
            indicator: Arc::clone(indicator),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.indicator.hide();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    /// Extra headers on top of the JSON defaults and the bearer token.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Only honoured for GET.
    pub cache: bool,
    /// Overrides the cache's default TTL for this response.
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub retry: bool,
    pub show_loading: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::Get,
            headers: Vec::new(),
            body: None,
            cache: true,
            ttl: None,
            timeout: None,
            retry: true,
            show_loading: true,
        }
    }

    /// Non-idempotent verbs: never cached, not retried unless asked.
    pub fn write(method: Method, body: Option<Value>) -> Self {
        Self {
            method,
            body,
            cache: false,
            retry: false,
            ..Self::get()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.show_loading = false;
        self
    }
}

/// HTTP client with response caching, retry with backoff and GET coalescing.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    cache: Arc<RequestCache>,
    inflight: InFlightRegistry<Result<Payload, RequestError>>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    loading: Arc<dyn LoadingIndicator>,
    session: Option<Arc<dyn SessionStore>>,
    default_timeout: Duration,
}

impl HttpClient {
    pub fn new(cache: Arc<RequestCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache,
            inflight: InFlightRegistry::new(),
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            loading: Arc::new(NoLoading),
            session: None,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_loading(mut self, loading: Arc<dyn LoadingIndicator>) -> Self {
        self.loading = loading;
        self
    }

    /// Store the bearer token is read from on every request.
    pub fn with_session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub async fn get(&self, url: &str) -> Result<Payload, RequestError> {
        self.request(url, RequestOptions::get()).await
    }

    pub async fn post(&self, url: &str, body: Value) -> Result<Payload, RequestError> {
        self.request(url, RequestOptions::write(Method::Post, Some(body)))
            .await
    }

    pub async fn put(&self, url: &str, body: Value) -> Result<Payload, RequestError> {
        self.request(url, RequestOptions::write(Method::Put, Some(body)))
            .await
    }

    pub async fn patch(&self, url: &str, body: Value) -> Result<Payload, RequestError> {
        self.request(url, RequestOptions::write(Method::Patch, Some(body)))
            .await
    }

    pub async fn delete(&self, url: &str) -> Result<Payload, RequestError> {
        self.request(url, RequestOptions::write(Method::Delete, None))
            .await
    }

    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Payload, RequestError> {
        let is_get = options.method == Method::Get;
        let cacheable = is_get && options.cache;

        if cacheable {
            if let Some(hit) = self.cache.get(url) {
                tracing::debug!(url, "Cache hit");
                return Ok(hit);
            }
        }

        let dispatch = self.dispatch(url, &options);

        if !is_get {
            let _loading = options
                .show_loading
                .then(|| LoadingGuard::show(&self.loading));
            return log_outcome(options.method, url, dispatch.run().await);
        }

        let key = format!("{}:{}", options.method, url);
        let cache = Arc::clone(&self.cache);
        let ttl = options.ttl.unwrap_or_else(|| cache.default_ttl());
        let cache_key = url.to_string();

        // The factory only runs for the leader, so followers never touch the indicator.
        let mut loading = None;
        let flight = self.inflight.get_or_create(&key, || {
            if options.show_loading {
                loading = Some(LoadingGuard::show(&self.loading));
            }
            async move {
                let outcome = dispatch.run().await;
                if cacheable {
                    if let Ok(payload) = &outcome {
                        cache.put_with_ttl(&cache_key, payload.clone(), ttl);
                    }
                }
                outcome
            }
        });

        let leader = flight.is_leader();
        let outcome = flight.wait().await.unwrap_or(Err(RequestError::Aborted));
        drop(loading);

        // A follower shares the leader's response but keeps its own cache choice.
        if cacheable && !leader {
            if let Ok(payload) = &outcome {
                if self.cache.get(url).is_none() {
                    self.cache.put_with_ttl(url, payload.clone(), ttl);
                }
            }
        }
        log_outcome(options.method, url, outcome)
    }

    fn dispatch(&self, url: &str, options: &RequestOptions) -> Dispatch {
        Dispatch {
            http: self.http.clone(),
            method: options.method,
            url: url.to_string(),
            headers: self.headers(options),
            body: options.body.clone(),
            timeout: options.timeout.unwrap_or(self.default_timeout),
            policy: if options.retry {
                self.policy.clone()
            } else {
                RetryPolicy::none()
            },
            sleeper: Arc::clone(&self.sleeper),
        }
    }

    fn headers(&self, options: &RequestOptions) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let token = self.session.as_ref().and_then(|s| s.get(TOKEN_KEY));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Stored auth token is not a valid header value"),
            }
        }

        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid request header"),
            }
        }
        headers
    }
}

fn log_outcome(
    method: Method,
    url: &str,
    outcome: Result<Payload, RequestError>,
) -> Result<Payload, RequestError> {
    if let Err(err) = &outcome {
        tracing::error!(%method, url, error = %err, "Request failed");
    }
    outcome
}

/// Everything needed to perform one logical request, owned so it can be spawned.
struct Dispatch {
    http: reqwest::Client,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Value>,
    timeout: Duration,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Dispatch {
    async fn run(self) -> Result<Payload, RequestError> {
        let mut attempt = 1;
        loop {
            match self.send_once().await {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_retryable() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Request failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self) -> Result<Payload, RequestError> {
        let mut request = self
            .http
            .request(self.method.into(), &self.url)
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(RequestError::Http {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_string(),
                });
            }

            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.contains("application/json"))
                .unwrap_or(false);

            if is_json {
                Ok(Payload::Json(response.json::<Value>().await?))
            } else {
                Ok(Payload::Text(response.text().await?))
            }
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RequestError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
