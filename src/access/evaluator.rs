use std::collections::BTreeSet;

use crate::access::types::{normalize_role, Route};
use crate::access::AccessPolicy;
use crate::session::User;

static NO_PERMISSIONS: BTreeSet<String> = BTreeSet::new();

/// Effective permissions of a role. Unknown roles hold none.
pub fn get_permissions<'a>(policy: &'a AccessPolicy, role: &str) -> &'a BTreeSet<String> {
    policy
        .role_permissions
        .get(&normalize_role(role))
        .unwrap_or(&NO_PERMISSIONS)
}

pub fn has_permission(policy: &AccessPolicy, permission: &str, role: &str) -> bool {
    get_permissions(policy, role).contains(permission)
}

/// True when the role holds at least one permission of the module.
pub fn can_access_module(policy: &AccessPolicy, module: &str, role: &str) -> bool {
    let Some(def) = policy.modules.get(&module.to_uppercase()) else {
        return false;
    };
    let held = get_permissions(policy, role);
    def.permissions().any(|p| held.contains(&p))
}

/// `action` must be declared by `module`; otherwise the answer is false.
pub fn can_perform_action(policy: &AccessPolicy, module: &str, action: &str, role: &str) -> bool {
    let Some(def) = policy.modules.get(&module.to_uppercase()) else {
        return false;
    };
    if !def.actions.iter().any(|a| a.eq_ignore_ascii_case(action)) {
        return false;
    }
    has_permission(policy, &def.permission(action), role)
}

/// Route access by name. `user` is `None` when nobody is logged in.
pub fn can_access_route(policy: &AccessPolicy, name: &str, user: Option<&User>) -> bool {
    match Route::parse(name) {
        Some(route) => can_access(policy, route, user),
        None => false,
    }
}

pub fn can_access(policy: &AccessPolicy, route: Route, user: Option<&User>) -> bool {
    let def = policy.routes.get(route);
    if def.allow_anonymous {
        return true;
    }
    let Some(user) = user else {
        return false;
    };

    // A required permission decides alone; the role list is only the fallback.
    match &def.required_permission {
        Some(permission) => has_permission(policy, permission, &user.role),
        None => def.allows_role(&user.role),
    }
}

/// Pages the user may open, in menu order. The login page is not listed.
pub fn accessible_routes(policy: &AccessPolicy, user: Option<&User>) -> Vec<Route> {
    Route::ALL
        .into_iter()
        .filter(|r| *r != Route::Login)
        .filter(|r| can_access(policy, *r, user))
        .collect()
}

/// Where a user lands after login or after a denied navigation.
pub fn default_route(policy: &AccessPolicy, user: Option<&User>) -> Route {
    let Some(user) = user else {
        return Route::Login;
    };
    policy
        .roles
        .get(&normalize_role(&user.role))
        .and_then(|r| r.landing)
        .unwrap_or(Route::Cliente)
}

pub fn role_display_name(role: Option<&str>) -> String {
    let Some(role) = role.filter(|r| !r.trim().is_empty()) else {
        return "Funcionário".to_string();
    };
    let display = match normalize_role(role).as_str() {
        "ADMIN" => "Administrador",
        "DIRETOR" => "Diretor",
        "FUNCIONARIO" => "Funcionário",
        "VENDEDOR" => "Vendedor",
        "SUPERVISOR" => "Supervisor",
        "GERENTE" => "Gerente",
        _ => role,
    };
    display.to_string()
}

/// Audit line for an explicit permission check.
pub fn log_permission_attempt(permission: &str, user: Option<&User>, allowed: bool) {
    let name = user.and_then(|u| u.name.as_deref()).unwrap_or("-");
    let role = user.map(|u| u.role.as_str()).unwrap_or("-");
    if allowed {
        tracing::info!(permission, user = name, role, allowed, "Permission check");
    } else {
        tracing::warn!(permission, user = name, role, allowed, "Permission check");
    }
}
