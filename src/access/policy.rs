use std::collections::BTreeSet;

use crate::access::errors::AccessError;
use crate::access::types::*;
use kdl::KdlDocument;

/// Parse a KDL document string into typed policy structs.
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AccessError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AccessError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "module" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AccessError::InvalidPolicy(
                        "module node requires a string argument (e.g. module \"clientes\")".into(),
                    )
                })?;

                let mut actions = Vec::new();
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "actions" => {
                                actions = dash_list(child)
                                    .into_iter()
                                    .map(|a| a.to_lowercase())
                                    .collect();
                            }
                            other => {
                                return Err(AccessError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in module `{name}` (expected `actions`)"
                                )));
                            }
                        }
                    }
                }

                policy.modules.push(ModuleDef {
                    name: name.to_uppercase(),
                    actions,
                });
            }
            "role" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AccessError::InvalidPolicy(
                        "role node requires a string argument (e.g. role \"vendedor\")".into(),
                    )
                })?;

                let landing = match node.get("landing").and_then(|v| v.as_string()) {
                    Some(target) => Some(
                        Route::parse(target)
                            .ok_or_else(|| AccessError::UndefinedRoute(target.to_string()))?,
                    ),
                    None => None,
                };

                let mut permissions = Vec::new();
                let mut includes = Vec::new();

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "permissions" => {
                                permissions = dash_list(child);
                            }
                            "includes" => {
                                includes = dash_list(child)
                                    .iter()
                                    .map(|r| normalize_role(r))
                                    .collect();
                            }
                            other => {
                                return Err(AccessError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in role `{name}` (expected `permissions` or `includes`)"
                                )));
                            }
                        }
                    }
                }

                policy.roles.push(RoleDef {
                    name: normalize_role(&name),
                    permissions,
                    includes,
                    landing,
                });
            }
            "route" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AccessError::InvalidPolicy(
                        "route node requires a string argument (e.g. route \"vendas\")".into(),
                    )
                })?;
                let route = Route::parse(&name).ok_or_else(|| AccessError::UndefinedRoute(name))?;

                let mut patch = RoutePatch {
                    title: node
                        .get("title")
                        .and_then(|v| v.as_string())
                        .map(str::to_string),
                    ..Default::default()
                };

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "roles" => {
                                patch.allowed_roles = Some(
                                    dash_list(child)
                                        .iter()
                                        .map(|r| normalize_role(r))
                                        .collect::<BTreeSet<_>>(),
                                );
                            }
                            "permission" => {
                                // a bare `permission` node clears the requirement
                                patch.required_permission =
                                    Some(first_string_arg(child).filter(|p| !p.is_empty()));
                            }
                            "anonymous" => {
                                patch.allow_anonymous = Some(flag_arg(child)?);
                            }
                            other => {
                                return Err(AccessError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in route `{route}` (expected `roles`, `permission` or `anonymous`)"
                                )));
                            }
                        }
                    }
                }

                policy.routes.push((route, patch));
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// `anonymous` alone means true; otherwise the first argument decides.
fn flag_arg(node: &kdl::KdlNode) -> Result<bool, AccessError> {
    let Some(entry) = node.entries().iter().find(|e| e.name().is_none()) else {
        return Ok(true);
    };
    let value = entry.value();
    if let Some(b) = value.as_bool() {
        return Ok(b);
    }
    match value.as_string() {
        Some("true") | Some("yes") => Ok(true),
        Some("false") | Some("no") => Ok(false),
        _ => Err(AccessError::InvalidPolicy(format!(
            "`{}` expects a boolean argument",
            node.name().value()
        ))),
    }
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// actions {
///     - "view"
///     - "create"
/// }
/// ```
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
