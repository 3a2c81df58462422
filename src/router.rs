//! Hash-style page router with role and permission gating.
//!
//! The router owns the only [`RouterState`]. Every transition goes through
//! [`Router::navigate_to`], which checks the [`AccessPolicy`], swaps the
//! visible section and runs the page-load callback of the new route. Denied
//! navigations are redirected once to the user's default route and never
//! surface as errors.

use std::collections::HashMap;
use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::evaluator;
use crate::access::{AccessPolicy, Route};
use crate::session::{AuthProvider, User};

pub const TITLE_PREFIX: &str = "Maiconsoft";

#[derive(Debug, Error, Diagnostic)]
pub enum RouterError {
    #[error("Route `{0}` not found")]
    #[diagnostic(
        code(maiconsoft::router::route_not_found),
        help("Known routes: login, dashboard, cliente, vendas, usuarios, relatorios")
    )]
    RouteNotFound(String),

    #[error("Permission denied: {0}")]
    #[diagnostic(
        code(maiconsoft::router::permission_denied),
        help("Ask an administrator to grant the permission to your role")
    )]
    PermissionDenied(String),
}

/// What to do with a navigation target that names no route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownRoutePolicy {
    /// Substitute the default route and log a warning.
    #[default]
    Fallback,
    /// Fail the navigation with [`RouterError::RouteNotFound`].
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Shows and hides page sections. One section per route.
pub trait SectionHost: Send + Sync {
    fn hide_all(&self);
    /// Returns false when the host has no section for the route.
    fn show(&self, route: Route) -> bool;
    fn highlight(&self, route: Route);
    fn set_title(&self, title: &str);
    fn set_breadcrumbs(&self, trail: &[String]);
}

/// User-visible, dismissible messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Fragment history (the `#route` part of the location).
pub trait HistoryHost: Send + Sync {
    fn push(&self, route: Route);
    fn current_fragment(&self) -> Option<String>;
    /// Pops one entry and returns the fragment that is now current.
    fn back(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterState {
    /// `None` until the first successful navigation.
    pub current: Option<Route>,
    pub is_authenticated: bool,
    pub current_user: Option<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Shown(Route),
    /// Access to `from` was denied and the default route was shown instead.
    Redirected { from: Route, to: Route },
    /// Access was denied and no redirect was possible. The current route is unchanged.
    Denied(Route),
}

impl NavigationOutcome {
    /// The route visible after the navigation, if it changed.
    pub fn shown(&self) -> Option<Route> {
        match self {
            NavigationOutcome::Shown(r) => Some(*r),
            NavigationOutcome::Redirected { to, .. } => Some(*to),
            NavigationOutcome::Denied(_) => None,
        }
    }
}

pub type PageLoader = Box<dyn FnMut() + Send>;

pub struct Router {
    policy: Arc<AccessPolicy>,
    auth: Arc<dyn AuthProvider + Send + Sync>,
    sections: Arc<dyn SectionHost>,
    notifier: Arc<dyn Notifier>,
    history: Arc<dyn HistoryHost>,
    unknown_route: UnknownRoutePolicy,
    loaders: HashMap<Route, PageLoader>,
    state: RouterState,
}

impl Router {
    pub fn new(
        policy: Arc<AccessPolicy>,
        auth: Arc<dyn AuthProvider + Send + Sync>,
        sections: Arc<dyn SectionHost>,
        notifier: Arc<dyn Notifier>,
        history: Arc<dyn HistoryHost>,
    ) -> Self {
        Self {
            policy,
            auth,
            sections,
            notifier,
            history,
            unknown_route: UnknownRoutePolicy::default(),
            loaders: HashMap::new(),
            state: RouterState::default(),
        }
    }

    pub fn with_unknown_route(mut self, policy: UnknownRoutePolicy) -> Self {
        self.unknown_route = policy;
        self
    }

    /// Register the callback run each time `route` becomes visible.
    pub fn on_load(&mut self, route: Route, loader: impl FnMut() + Send + 'static) {
        self.loaders.insert(route, Box::new(loader));
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn current(&self) -> Option<Route> {
        self.state.current
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Landing route for the current auth state.
    pub fn default_route(&mut self) -> Route {
        self.refresh_auth();
        evaluator::default_route(&self.policy, self.user())
    }

    /// Initial navigation: the current fragment if any, else the default route.
    pub fn start(&mut self) -> Result<NavigationOutcome, RouterError> {
        let target = self
            .history
            .current_fragment()
            .filter(|f| !f.trim_start_matches('#').is_empty());
        match target {
            Some(fragment) => self.navigate(&fragment, false),
            None => {
                let route = self.default_route();
                Ok(self.navigate_to(route, false))
            }
        }
    }

    /// Navigate to a link target such as `vendas` or `#vendas`.
    pub fn navigate(
        &mut self,
        target: &str,
        update_history: bool,
    ) -> Result<NavigationOutcome, RouterError> {
        let route = match Route::parse(target) {
            Some(route) => route,
            None => match self.unknown_route {
                UnknownRoutePolicy::Fallback => {
                    let fallback = self.default_route();
                    tracing::warn!(requested = target, fallback = %fallback, "Route not found, using default route");
                    fallback
                }
                UnknownRoutePolicy::Reject => {
                    tracing::warn!(requested = target, "Route not found");
                    return Err(RouterError::RouteNotFound(target.to_string()));
                }
            },
        };
        Ok(self.navigate_to(route, update_history))
    }

    /// Browser back/forward: navigate without pushing a new history entry.
    pub fn on_history_pop(&mut self, fragment: Option<&str>) -> Result<NavigationOutcome, RouterError> {
        match fragment {
            Some(f) if !f.trim_start_matches('#').is_empty() => self.navigate(f, false),
            _ => {
                let route = self.default_route();
                Ok(self.navigate_to(route, false))
            }
        }
    }

    pub fn back(&mut self) -> Result<NavigationOutcome, RouterError> {
        let fragment = self.history.back();
        self.on_history_pop(fragment.as_deref())
    }

    pub fn navigate_to(&mut self, route: Route, update_history: bool) -> NavigationOutcome {
        self.refresh_auth();

        if evaluator::can_access(&self.policy, route, self.user()) {
            self.commit(route, update_history);
            return NavigationOutcome::Shown(route);
        }

        tracing::warn!(
            route = %route,
            role = self.user().map(|u| u.role.as_str()).unwrap_or("-"),
            "Access denied"
        );
        self.notifier
            .notify(NoticeLevel::Error, "Acesso negado para esta página");

        // One redirect at most: a default route that is itself denied stops here.
        let fallback = evaluator::default_route(&self.policy, self.user());
        if fallback != route && evaluator::can_access(&self.policy, fallback, self.user()) {
            self.commit(fallback, update_history);
            return NavigationOutcome::Redirected {
                from: route,
                to: fallback,
            };
        }

        NavigationOutcome::Denied(route)
    }

    /// Clear the session and return to the login page.
    pub fn logout(&mut self) -> NavigationOutcome {
        if let Err(e) = self.auth.logout() {
            tracing::error!(error = %e, "Failed to clear session");
        }
        self.navigate_to(Route::Login, true)
    }

    /// Run `action` only if the current user holds `permission`.
    pub fn guard<R>(
        &mut self,
        permission: &str,
        action: impl FnOnce() -> R,
    ) -> Result<R, RouterError> {
        self.refresh_auth();
        let allowed = self
            .user()
            .is_some_and(|u| evaluator::has_permission(&self.policy, permission, &u.role));
        evaluator::log_permission_attempt(permission, self.user(), allowed);

        if !allowed {
            let name = self
                .user()
                .and_then(|u| u.name.clone())
                .unwrap_or_else(|| "Usuário".to_string());
            let role = evaluator::role_display_name(self.user().map(|u| u.role.as_str()));
            self.notifier.notify(
                NoticeLevel::Error,
                &format!("{name} ({role}) não tem permissão para executar: {permission}"),
            );
            return Err(RouterError::PermissionDenied(permission.to_string()));
        }
        Ok(action())
    }

    pub fn breadcrumbs(&self, route: Route) -> Vec<String> {
        let mut trail = vec![self.policy.routes.get(Route::Dashboard).title.clone()];
        if route != Route::Dashboard {
            trail.push(self.policy.routes.get(route).title.clone());
        }
        trail
    }

    fn commit(&mut self, route: Route, update_history: bool) {
        self.state.current = Some(route);

        self.sections.hide_all();
        if self.sections.show(route) {
            if let Some(loader) = self.loaders.get_mut(&route) {
                loader();
            }
        } else {
            tracing::warn!(route = %route, section = route.section_id(), "No section for route");
        }

        if update_history {
            self.history.push(route);
        }

        let def = self.policy.routes.get(route);
        self.sections.highlight(route);
        self.sections
            .set_title(&format!("{TITLE_PREFIX} - {}", def.title));
        self.sections.set_breadcrumbs(&self.breadcrumbs(route));

        tracing::info!(route = %route, "Navigated");
    }

    fn refresh_auth(&mut self) {
        let authenticated = self.auth.is_authenticated();
        self.state.is_authenticated = authenticated;
        self.state.current_user = if authenticated {
            self.auth.current_user()
        } else {
            None
        };
    }

    fn user(&self) -> Option<&User> {
        self.state.current_user.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryStore, SessionAuth};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        fragments: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl SectionHost for Recorder {
        fn hide_all(&self) {
            self.record("hide".into());
        }
        fn show(&self, route: Route) -> bool {
            self.record(format!("show {route}"));
            true
        }
        fn highlight(&self, _route: Route) {}
        fn set_title(&self, title: &str) {
            self.record(format!("title {title}"));
        }
        fn set_breadcrumbs(&self, _trail: &[String]) {}
    }

    impl Notifier for Recorder {
        fn notify(&self, _level: NoticeLevel, message: &str) {
            self.record(format!("notify {message}"));
        }
    }

    impl HistoryHost for Recorder {
        fn push(&self, route: Route) {
            self.fragments.lock().unwrap().push(route.name().to_string());
        }
        fn current_fragment(&self) -> Option<String> {
            self.fragments.lock().unwrap().last().cloned()
        }
        fn back(&self) -> Option<String> {
            let mut fragments = self.fragments.lock().unwrap();
            fragments.pop();
            fragments.last().cloned()
        }
    }

    fn router(role: Option<&str>) -> (Router, Arc<Recorder>, SessionAuth) {
        let auth = SessionAuth::new(Arc::new(MemoryStore::new()));
        if let Some(role) = role {
            auth.login("tok", &User::new(role)).unwrap();
        }
        let host = Arc::new(Recorder::default());
        let router = Router::new(
            Arc::new(AccessPolicy::builtin()),
            Arc::new(auth.clone()),
            host.clone(),
            host.clone(),
            host.clone(),
        );
        (router, host, auth)
    }

    #[test]
    fn test_start_unauthenticated_lands_on_login() {
        let (mut router, host, _) = router(None);
        let outcome = router.start().unwrap();
        assert_eq!(outcome, NavigationOutcome::Shown(Route::Login));
        assert!(host.events().contains(&"title Maiconsoft - Login".to_string()));
    }

    #[test]
    fn test_denied_route_redirects_to_default() {
        let (mut router, host, _) = router(Some("funcionario"));
        let outcome = router.navigate("#usuarios", true).unwrap();
        assert_eq!(
            outcome,
            NavigationOutcome::Redirected {
                from: Route::Usuarios,
                to: Route::Cliente
            }
        );
        assert_eq!(router.current(), Some(Route::Cliente));
        assert!(host
            .events()
            .contains(&"notify Acesso negado para esta página".to_string()));
    }

    #[test]
    fn test_unknown_route_policy() {
        let (mut router, _, _) = router(Some("admin"));
        let outcome = router.navigate("estoque", true).unwrap();
        assert_eq!(outcome, NavigationOutcome::Shown(Route::Dashboard));

        let mut strict = router.with_unknown_route(UnknownRoutePolicy::Reject);
        let err = strict.navigate("estoque", true).unwrap_err();
        assert!(matches!(err, RouterError::RouteNotFound(ref r) if r == "estoque"));
        assert_eq!(strict.current(), Some(Route::Dashboard));
    }

    #[test]
    fn test_loader_runs_when_section_shown() {
        let (mut router, _, _) = router(Some("vendedor"));
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        router.on_load(Route::Vendas, move || *counter.lock().unwrap() += 1);

        router.navigate("vendas", true).unwrap();
        router.navigate("vendas", true).unwrap();
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_logout_returns_to_login() {
        let (mut router, _, auth) = router(Some("diretor"));
        router.start().unwrap();
        assert_eq!(router.current(), Some(Route::Dashboard));

        assert_eq!(router.logout(), NavigationOutcome::Shown(Route::Login));
        assert!(!auth.is_authenticated());
        assert!(!router.state().is_authenticated);
        assert!(router.state().current_user.is_none());
    }

    #[test]
    fn test_guard() {
        let (mut router, host, _) = router(Some("funcionario"));
        assert_eq!(router.guard("clientes:create", || 7).unwrap(), 7);

        let err = router.guard("clientes:delete", || 7).unwrap_err();
        assert!(matches!(err, RouterError::PermissionDenied(_)));
        assert!(host.events().iter().any(|e| e.starts_with("notify ")
            && e.contains("Funcionário")
            && e.contains("clientes:delete")));
    }

    #[test]
    fn test_breadcrumbs() {
        let (router, _, _) = router(None);
        assert_eq!(router.breadcrumbs(Route::Dashboard), vec!["Dashboard"]);
        assert_eq!(router.breadcrumbs(Route::Vendas), vec!["Dashboard", "Vendas"]);
    }
}
