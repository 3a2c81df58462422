use std::sync::Mutex;

use maiconsoft::access::Route;
use maiconsoft::http::LoadingIndicator;
use maiconsoft::router::{HistoryHost, NoticeLevel, Notifier, SectionHost};

/// Records everything the router and the client ask the page host to do.
#[derive(Default)]
pub struct RecordingHost {
    visible: Mutex<Option<Route>>,
    shows: Mutex<Vec<Route>>,
    titles: Mutex<Vec<String>>,
    breadcrumbs: Mutex<Vec<String>>,
    notices: Mutex<Vec<(NoticeLevel, String)>>,
    history: Mutex<Vec<String>>,
    loading: Mutex<Vec<&'static str>>,
    missing: Mutex<Vec<Route>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragment present before the router starts.
    pub fn with_fragment(fragment: &str) -> Self {
        let host = Self::default();
        host.history.lock().unwrap().push(fragment.to_string());
        host
    }

    /// Make `show` report that the page has no section for `route`.
    pub fn without_section(self, route: Route) -> Self {
        self.missing.lock().unwrap().push(route);
        self
    }

    pub fn visible(&self) -> Option<Route> {
        *self.visible.lock().unwrap()
    }

    pub fn shows(&self) -> Vec<Route> {
        self.shows.lock().unwrap().clone()
    }

    pub fn last_title(&self) -> Option<String> {
        self.titles.lock().unwrap().last().cloned()
    }

    pub fn last_breadcrumbs(&self) -> Option<String> {
        self.breadcrumbs.lock().unwrap().last().cloned()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }

    pub fn loading_events(&self) -> Vec<&'static str> {
        self.loading.lock().unwrap().clone()
    }
}

impl SectionHost for RecordingHost {
    fn hide_all(&self) {
        *self.visible.lock().unwrap() = None;
    }

    fn show(&self, route: Route) -> bool {
        if self.missing.lock().unwrap().contains(&route) {
            return false;
        }
        *self.visible.lock().unwrap() = Some(route);
        self.shows.lock().unwrap().push(route);
        true
    }

    fn highlight(&self, _route: Route) {}

    fn set_title(&self, title: &str) {
        self.titles.lock().unwrap().push(title.to_string());
    }

    fn set_breadcrumbs(&self, trail: &[String]) {
        self.breadcrumbs.lock().unwrap().push(trail.join(" > "));
    }
}

impl Notifier for RecordingHost {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().unwrap().push((level, message.to_string()));
    }
}

impl HistoryHost for RecordingHost {
    fn push(&self, route: Route) {
        self.history.lock().unwrap().push(format!("#{route}"));
    }

    fn current_fragment(&self) -> Option<String> {
        self.history.lock().unwrap().last().cloned()
    }

    fn back(&self) -> Option<String> {
        let mut history = self.history.lock().unwrap();
        history.pop();
        history.last().cloned()
    }
}

impl LoadingIndicator for RecordingHost {
    fn show(&self) {
        self.loading.lock().unwrap().push("show");
    }

    fn hide(&self) {
        self.loading.lock().unwrap().push("hide");
    }
}
