use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::access::errors::AccessError;
use crate::access::policy::parse_kdl_document;
use crate::access::types::*;
use crate::access::{AccessPolicy, RouteTable};

/// Load a KDL policy file layered over the built-in registry.
pub fn load_policy(path: &Path) -> Result<AccessPolicy, AccessError> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| AccessError::PolicyLoadError {
            path: path.display().to_string(),
            source,
        })?;
    let parsed = parse_kdl_document(&contents)?;
    let policy = compile_policies(vec![builtin_policy(), parsed])?;

    tracing::info!(
        path = %path.display(),
        modules = policy.modules.len(),
        roles = policy.roles.len(),
        "Loaded access policy"
    );

    Ok(policy)
}

/// The registry the application ships with.
pub fn builtin_policy() -> ParsedPolicy {
    let clientes_all = ["clientes:view", "clientes:create", "clientes:edit", "clientes:delete", "clientes:export"];
    let vendas_all = ["vendas:view", "vendas:create", "vendas:edit", "vendas:delete", "vendas:approve", "vendas:export"];
    let relatorios_all = ["relatorios:view", "relatorios:export", "relatorios:advanced"];
    let dashboard_all = ["dashboard:view", "dashboard:analytics"];

    let admin = [&dashboard_all[..], &clientes_all[..], &vendas_all[..], &relatorios_all[..]].concat();
    let diretor = [
        &admin[..],
        &["usuarios:view", "usuarios:create", "usuarios:edit", "usuarios:delete", "usuarios:permissions"][..],
        &["sistema:admin", "sistema:config", "sistema:logs"][..],
    ]
    .concat();

    ParsedPolicy {
        modules: vec![
            module("CLIENTES", &["view", "create", "edit", "delete", "export"]),
            module("VENDAS", &["view", "create", "edit", "delete", "approve", "export"]),
            module("USUARIOS", &["view", "create", "edit", "delete", "permissions"]),
            module("RELATORIOS", &["view", "export", "advanced"]),
            module("DASHBOARD", &["view", "analytics"]),
            module("SISTEMA", &["admin", "config", "logs"]),
        ],
        roles: vec![
            RoleDef {
                name: "ADMIN".into(),
                permissions: owned(&admin),
                includes: vec![],
                landing: Some(Route::Dashboard),
            },
            RoleDef {
                name: "DIRETOR".into(),
                permissions: owned(&diretor),
                includes: vec![],
                landing: Some(Route::Dashboard),
            },
            RoleDef {
                name: "FUNCIONARIO".into(),
                permissions: owned(&["clientes:view", "clientes:create"]),
                includes: vec![],
                landing: Some(Route::Cliente),
            },
            RoleDef {
                name: "VENDEDOR".into(),
                permissions: owned(&[
                    "clientes:view",
                    "clientes:create",
                    "clientes:edit",
                    "clientes:export",
                    "vendas:view",
                    "vendas:create",
                    "vendas:edit",
                    "vendas:export",
                    "dashboard:view",
                    "dashboard:analytics",
                ]),
                includes: vec![],
                landing: Some(Route::Cliente),
            },
        ],
        routes: vec![],
    }
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn role_set(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn module(name: &str, actions: &[&str]) -> ModuleDef {
    ModuleDef {
        name: name.to_string(),
        actions: owned(actions),
    }
}

/// Static route definitions. Exhaustive so a new route cannot ship without a policy.
pub fn builtin_route(route: Route) -> RouteDef {
    let (title, allow_anonymous, allowed_roles, required_permission) = match route {
        Route::Login => ("Login", true, BTreeSet::new(), None),
        Route::Dashboard => ("Dashboard", false, role_set(&["ADMIN", "DIRETOR"]), None),
        Route::Cliente => (
            "Clientes",
            false,
            role_set(&["ADMIN", "DIRETOR", "FUNCIONARIO", "VENDEDOR"]),
            None,
        ),
        Route::Vendas => ("Vendas", false, role_set(&["ADMIN", "DIRETOR", "VENDEDOR"]), None),
        Route::Usuarios => ("Usuários", false, role_set(&["DIRETOR"]), Some("usuarios:view")),
        Route::Relatorios => (
            "Relatórios",
            false,
            role_set(&["ADMIN", "DIRETOR"]),
            Some("relatorios:view"),
        ),
    };
    RouteDef {
        route,
        title: title.to_string(),
        allow_anonymous,
        allowed_roles,
        required_permission: required_permission.map(str::to_string),
    }
}

/// Merge parsed policies in order (later definitions win) and validate the result.
pub fn compile_policies(parsed: Vec<ParsedPolicy>) -> Result<AccessPolicy, AccessError> {
    let mut modules: HashMap<String, ModuleDef> = HashMap::new();
    let mut roles: HashMap<String, RoleDef> = HashMap::new();
    let mut routes = RouteTable::builtin();

    for p in parsed {
        for module in p.modules {
            modules.insert(module.name.clone(), module);
        }
        for role in p.roles {
            roles.insert(role.name.clone(), role);
        }
        for (route, patch) in p.routes {
            routes.apply(route, patch);
        }
    }

    let known_permissions: HashSet<String> =
        modules.values().flat_map(|m| m.permissions()).collect();

    for role in roles.values() {
        for included in &role.includes {
            if !roles.contains_key(included) {
                return Err(AccessError::UndefinedRole(format!(
                    "{included} (included by {})",
                    role.name
                )));
            }
        }
        for permission in &role.permissions {
            if !known_permissions.contains(permission) {
                return Err(AccessError::UndefinedPermission(permission.clone()));
            }
        }
    }

    check_role_cycles(&roles)?;

    for def in routes.iter() {
        for role in &def.allowed_roles {
            if !roles.contains_key(role) {
                return Err(AccessError::UndefinedRole(format!(
                    "{role} (allowed on route {})",
                    def.route
                )));
            }
        }
        if let Some(permission) = &def.required_permission {
            if !known_permissions.contains(permission) {
                return Err(AccessError::UndefinedPermission(permission.clone()));
            }
        }
    }

    let role_permissions = roles
        .keys()
        .map(|name| {
            let perms = collect_role_permissions(name, &roles, &mut HashSet::new());
            (name.clone(), perms)
        })
        .collect();

    Ok(AccessPolicy {
        modules,
        roles,
        routes,
        role_permissions,
    })
}

/// Check for cycles in role inheritance using DFS.
fn check_role_cycles(roles: &HashMap<String, RoleDef>) -> Result<(), AccessError> {
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    let mut names: Vec<&String> = roles.keys().collect();
    names.sort();
    for name in names {
        if !visited.contains(name.as_str()) {
            dfs_cycle_check(name, roles, &mut visited, &mut in_stack)?;
        }
    }
    Ok(())
}

fn dfs_cycle_check(
    name: &str,
    roles: &HashMap<String, RoleDef>,
    visited: &mut HashSet<String>,
    in_stack: &mut HashSet<String>,
) -> Result<(), AccessError> {
    visited.insert(name.to_string());
    in_stack.insert(name.to_string());

    if let Some(role) = roles.get(name) {
        for included in &role.includes {
            if in_stack.contains(included.as_str()) {
                return Err(AccessError::CyclicRoleInheritance(format!(
                    "{name} -> {included}"
                )));
            }
            if !visited.contains(included.as_str()) {
                dfs_cycle_check(included, roles, visited, in_stack)?;
            }
        }
    }

    in_stack.remove(name);
    Ok(())
}

/// Recursively collect all permissions from a role, following includes.
fn collect_role_permissions(
    role_name: &str,
    roles: &HashMap<String, RoleDef>,
    visited: &mut HashSet<String>,
) -> BTreeSet<String> {
    if !visited.insert(role_name.to_string()) {
        return BTreeSet::new();
    }

    let Some(role) = roles.get(role_name) else {
        return BTreeSet::new();
    };

    let mut perms: BTreeSet<String> = role.permissions.iter().cloned().collect();
    for included in &role.includes {
        perms.extend(collect_role_permissions(included, roles, visited));
    }

    perms
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn role(name: &str, permissions: &[&str], includes: &[&str]) -> RoleDef {
        RoleDef {
            name: name.into(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            includes: includes.iter().map(|r| r.to_string()).collect(),
            landing: None,
        }
    }

    #[test]
    fn test_builtin_compiles() {
        let policy = compile_policies(vec![builtin_policy()]).unwrap();
        assert_eq!(policy.modules.len(), 6);
        assert_eq!(policy.roles.len(), 4);
        assert_eq!(policy.role_permissions["FUNCIONARIO"].len(), 2);
        assert!(policy.role_permissions["DIRETOR"].contains("usuarios:view"));
        assert!(!policy.role_permissions["ADMIN"].contains("usuarios:view"));
    }

    #[test]
    fn test_includes_expand_permissions() {
        let mut extra = ParsedPolicy::default();
        extra.roles.push(role("SUPERVISOR", &["vendas:approve"], &["VENDEDOR"]));
        let policy = compile_policies(vec![builtin_policy(), extra]).unwrap();

        let perms = &policy.role_permissions["SUPERVISOR"];
        assert!(perms.contains("vendas:approve"));
        assert!(perms.contains("clientes:view"), "inherited from VENDEDOR");
    }

    #[test]
    fn test_cyclic_roles_detected() {
        let mut parsed = builtin_policy();
        parsed.roles.push(role("A", &[], &["B"]));
        parsed.roles.push(role("B", &[], &["A"]));
        let err = compile_policies(vec![parsed]).unwrap_err();
        assert!(matches!(err, AccessError::CyclicRoleInheritance(_)));
    }

    #[test]
    fn test_include_of_undefined_role_rejected() {
        let mut parsed = builtin_policy();
        parsed.roles.push(role("A", &[], &["GHOST"]));
        let err = compile_policies(vec![parsed]).unwrap_err();
        assert!(matches!(err, AccessError::UndefinedRole(_)));
    }

    #[test]
    fn test_permission_outside_modules_rejected() {
        let mut parsed = builtin_policy();
        parsed.roles.push(role("A", &["estoque:view"], &[]));
        let err = compile_policies(vec![parsed]).unwrap_err();
        assert!(matches!(err, AccessError::UndefinedPermission(ref p) if p == "estoque:view"));
    }

    #[test]
    fn test_route_with_undefined_role_rejected() {
        let mut parsed = builtin_policy();
        parsed.routes.push((
            Route::Vendas,
            RoutePatch {
                allowed_roles: Some(BTreeSet::from(["GERENTE".to_string()])),
                ..Default::default()
            },
        ));
        let err = compile_policies(vec![parsed]).unwrap_err();
        assert!(matches!(err, AccessError::UndefinedRole(_)));
    }

    #[test]
    fn test_later_definitions_override() {
        let mut extra = ParsedPolicy::default();
        extra.roles.push(RoleDef {
            landing: Some(Route::Vendas),
            ..role("FUNCIONARIO", &["clientes:view"], &[])
        });
        let policy = compile_policies(vec![builtin_policy(), extra]).unwrap();
        assert_eq!(policy.role_permissions["FUNCIONARIO"].len(), 1);
        assert_eq!(policy.roles["FUNCIONARIO"].landing, Some(Route::Vendas));
    }

    #[test]
    fn test_load_policy_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("access.kdl");
        std::fs::write(
            &path,
            r#"
role "gerente" landing="vendas" {
    includes {
        - "vendedor"
    }
    permissions {
        - "relatorios:view"
    }
}

route "relatorios" {
    roles {
        - "admin"
        - "diretor"
        - "gerente"
    }
}
"#,
        )
        .unwrap();

        let policy = load_policy(&path).unwrap();
        assert!(policy.role_permissions["GERENTE"].contains("relatorios:view"));
        assert!(policy.routes.get(Route::Relatorios).allowed_roles.contains("GERENTE"));
        // untouched fields survive the patch
        assert_eq!(
            policy.routes.get(Route::Relatorios).required_permission.as_deref(),
            Some("relatorios:view")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_policy(Path::new("/definitely/not/here.kdl")).unwrap_err();
        assert!(matches!(err, AccessError::PolicyLoadError { .. }));
    }
}
