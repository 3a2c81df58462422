use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    #[error("Failed to load access policy `{path}`")]
    #[diagnostic(
        code(maiconsoft::access::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(maiconsoft::access::invalid_policy),
        help("A policy file may contain `module`, `role` and `route` KDL nodes")
    )]
    InvalidPolicy(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(maiconsoft::access::undefined_role),
        help("Define the role with: role \"<name>\" {{ permissions {{ - \"module:action\" }} }}")
    )]
    UndefinedRole(String),

    #[error("Unknown route `{0}`")]
    #[diagnostic(
        code(maiconsoft::access::undefined_route),
        help("Known routes: login, dashboard, cliente, vendas, usuarios, relatorios")
    )]
    UndefinedRoute(String),

    #[error("Permission `{0}` does not belong to any module")]
    #[diagnostic(
        code(maiconsoft::access::undefined_permission),
        help("Declare the action under its module: module \"<name>\" {{ actions {{ - \"<action>\" }} }}")
    )]
    UndefinedPermission(String),

    #[error("Cyclic role inheritance detected: {0}")]
    #[diagnostic(
        code(maiconsoft::access::cyclic_roles),
        help("Check the `includes` lists in your role definitions for circular references")
    )]
    CyclicRoleInheritance(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(maiconsoft::access::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev")
    )]
    KdlParse(String),
}
