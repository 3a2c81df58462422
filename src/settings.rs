use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::RetryPolicy;
use crate::router::UnknownRoutePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub api: Api,
    pub request: Request,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub router: Router,
    pub session: Session,
    #[serde(default)]
    pub access: Access,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Api {
    /// Backend REST root, e.g. http://localhost:8090/api
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub timeout_ms: u64,
    /// Total attempts for a retried request, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cache {
    pub ttl_ms: u64,
    /// Entry limit with least-recently-used eviction. Unbounded when unset.
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Router {
    #[serde(default)]
    pub unknown_route: UnknownRoutePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Path of the persisted session. Default: data/session.json
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Access {
    /// Optional KDL file layered over the built-in roles and routes
    pub policy_path: Option<PathBuf>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090/api".to_string(),
        }
    }
}

impl Default for Request {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            capacity: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/session.json"),
        }
    }
}

impl Request {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl Cache {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let request = Request::default();
        let mut builder = config::Config::builder()
            .set_default("api.base_url", Api::default().base_url)
            .into_diagnostic()?
            .set_default("request.timeout_ms", request.timeout_ms)
            .into_diagnostic()?
            .set_default("request.max_attempts", request.max_attempts)
            .into_diagnostic()?
            .set_default("request.base_delay_ms", request.base_delay_ms)
            .into_diagnostic()?
            .set_default("request.backoff_multiplier", request.backoff_multiplier)
            .into_diagnostic()?
            .set_default("cache.ttl_ms", Cache::default().ttl_ms)
            .into_diagnostic()?
            .set_default("router.unknown_route", "fallback")
            .into_diagnostic()?
            .set_default(
                "session.path",
                Session::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: MAICONSOFT__API__BASE_URL=http://..., etc.
        builder =
            builder.add_source(config::Environment::with_prefix("MAICONSOFT").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let s: Settings = cfg.try_deserialize().into_diagnostic()?;

        Ok(s)
    }
}
