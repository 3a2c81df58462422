pub mod errors;
pub mod evaluator;
pub mod loader;
pub mod policy;
pub mod types;

use std::collections::{BTreeSet, HashMap};

pub use errors::AccessError;
pub use types::{ModuleDef, RoleDef, Route, RouteDef, RoutePatch};

/// Fully compiled access policy: the permission registry plus the route table.
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    /// uppercase module name -> ModuleDef
    pub modules: HashMap<String, ModuleDef>,
    /// uppercase role name -> RoleDef (permissions + includes)
    pub roles: HashMap<String, RoleDef>,
    pub routes: RouteTable,
    /// role name -> effective permissions (pre-computed, includes inheritance)
    pub role_permissions: HashMap<String, BTreeSet<String>>,
}

impl AccessPolicy {
    /// The registry compiled in, with no policy file applied.
    pub fn builtin() -> Self {
        match loader::compile_policies(vec![loader::builtin_policy()]) {
            Ok(policy) => policy,
            // The built-in registry is covered by tests; an empty policy denies everything.
            Err(e) => {
                tracing::error!(error = %e, "Built-in access policy failed validation");
                Self {
                    modules: HashMap::new(),
                    roles: HashMap::new(),
                    routes: RouteTable::builtin(),
                    role_permissions: HashMap::new(),
                }
            }
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One definition per [`Route`], indexed by the enum discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    defs: [RouteDef; Route::COUNT],
}

impl RouteTable {
    pub fn builtin() -> Self {
        Self {
            defs: Route::ALL.map(loader::builtin_route),
        }
    }

    pub fn get(&self, route: Route) -> &RouteDef {
        &self.defs[route.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDef> {
        self.defs.iter()
    }

    pub(crate) fn apply(&mut self, route: Route, patch: RoutePatch) {
        let def = &mut self.defs[route.index()];
        if let Some(title) = patch.title {
            def.title = title;
        }
        if let Some(anonymous) = patch.allow_anonymous {
            def.allow_anonymous = anonymous;
        }
        if let Some(roles) = patch.allowed_roles {
            def.allowed_roles = roles;
        }
        if let Some(permission) = patch.required_permission {
            def.required_permission = permission;
        }
    }
}
