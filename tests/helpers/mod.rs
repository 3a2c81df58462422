#![allow(dead_code)]

pub mod backend;
pub mod hosts;

use std::sync::Arc;
use std::time::Duration;

use maiconsoft::http::{HttpClient, ManualClock, RecordingSleeper, RequestCache};

pub use backend::MockBackend;
pub use hosts::RecordingHost;

/// Client wired with a recording sleeper and a manual clock, so retries and
/// cache expiry run without real waiting.
pub struct TestClient {
    pub client: HttpClient,
    pub sleeper: Arc<RecordingSleeper>,
    pub clock: Arc<ManualClock>,
}

impl TestClient {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let cache = Arc::new(RequestCache::with_clock(
            Duration::from_secs(300),
            clock.clone(),
        ));
        let client = HttpClient::new(cache).with_sleeper(sleeper.clone());
        Self {
            client,
            sleeper,
            clock,
        }
    }
}
