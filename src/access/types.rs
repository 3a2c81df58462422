use std::collections::BTreeSet;
use std::fmt;

/// Every addressable page of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Route {
    Login,
    Dashboard,
    Cliente,
    Vendas,
    Usuarios,
    Relatorios,
}

impl Route {
    pub const COUNT: usize = 6;

    pub const ALL: [Route; Route::COUNT] = [
        Route::Login,
        Route::Dashboard,
        Route::Cliente,
        Route::Vendas,
        Route::Usuarios,
        Route::Relatorios,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Route::Login => "login",
            Route::Dashboard => "dashboard",
            Route::Cliente => "cliente",
            Route::Vendas => "vendas",
            Route::Usuarios => "usuarios",
            Route::Relatorios => "relatorios",
        }
    }

    /// Id of the page container the host shows for this route.
    pub fn section_id(&self) -> &'static str {
        match self {
            Route::Login => "page-login",
            Route::Dashboard => "page-dashboard",
            Route::Cliente => "page-cliente",
            Route::Vendas => "page-vendas",
            Route::Usuarios => "page-usuarios",
            Route::Relatorios => "page-relatorios",
        }
    }

    /// Accepts `vendas`, `#vendas` or `#/vendas`, case-insensitively.
    pub fn parse(s: &str) -> Option<Route> {
        let name = s.trim().trim_start_matches('#').trim_start_matches('/');
        Route::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access policy of one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDef {
    pub route: Route,
    pub title: String,
    pub allow_anonymous: bool,
    /// Uppercase role names. Empty means any authenticated role.
    pub allowed_roles: BTreeSet<String>,
    /// When set, decides access on its own and `allowed_roles` is ignored.
    pub required_permission: Option<String>,
}

impl RouteDef {
    pub fn allows_role(&self, role: &str) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.contains(&normalize_role(role))
    }
}

/// A permission group, e.g. CLIENTES with actions view/create/edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDef {
    /// Uppercase module name.
    pub name: String,
    /// Lowercase action names.
    pub actions: Vec<String>,
}

impl ModuleDef {
    /// Fully-qualified permission string for an action, e.g. `clientes:view`.
    pub fn permission(&self, action: &str) -> String {
        format!("{}:{}", self.name.to_lowercase(), action.to_lowercase())
    }

    pub fn permissions(&self) -> impl Iterator<Item = String> + '_ {
        self.actions.iter().map(|a| self.permission(a))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDef {
    /// Uppercase role name.
    pub name: String,
    /// Fully-qualified permissions like "vendas:approve"
    pub permissions: Vec<String>,
    /// Other role names this role inherits permissions from
    pub includes: Vec<String>,
    /// Landing route after login; `None` falls back to the cliente page.
    pub landing: Option<Route>,
}

/// A route override read from a policy document. Unset fields keep the
/// previous definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePatch {
    pub title: Option<String>,
    pub allow_anonymous: Option<bool>,
    pub allowed_roles: Option<BTreeSet<String>>,
    pub required_permission: Option<Option<String>>,
}

/// Intermediate result from parsing a single policy document.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub modules: Vec<ModuleDef>,
    pub roles: Vec<RoleDef>,
    pub routes: Vec<(Route, RoutePatch)>,
}

pub fn normalize_role(role: &str) -> String {
    role.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("vendas"), Some(Route::Vendas));
        assert_eq!(Route::parse("#relatorios"), Some(Route::Relatorios));
        assert_eq!(Route::parse("#/Dashboard"), Some(Route::Dashboard));
        assert_eq!(Route::parse(" login "), Some(Route::Login));
        assert_eq!(Route::parse("clientes"), None);
        assert_eq!(Route::parse(""), None);
    }

    #[test]
    fn test_route_index_matches_all_order() {
        for (i, route) in Route::ALL.iter().enumerate() {
            assert_eq!(route.index(), i);
            assert_eq!(Route::parse(route.name()), Some(*route));
        }
    }

    #[test]
    fn test_module_permission_strings() {
        let module = ModuleDef {
            name: "VENDAS".into(),
            actions: vec!["view".into(), "approve".into()],
        };
        assert_eq!(
            module.permissions().collect::<Vec<_>>(),
            vec!["vendas:view", "vendas:approve"]
        );
    }

    #[test]
    fn test_allows_role_case_insensitive() {
        let def = RouteDef {
            route: Route::Vendas,
            title: "Vendas".into(),
            allow_anonymous: false,
            allowed_roles: ["ADMIN".to_string(), "VENDEDOR".to_string()].into(),
            required_permission: None,
        };
        assert!(def.allows_role("vendedor"));
        assert!(def.allows_role("Admin"));
        assert!(!def.allows_role("funcionario"));

        let open = RouteDef {
            allowed_roles: BTreeSet::new(),
            ..def
        };
        assert!(open.allows_role("anything"));
    }
}
