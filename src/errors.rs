use miette::Diagnostic;
use thiserror::Error;

use crate::access::AccessError;
use crate::http::RequestError;
use crate::router::RouterError;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(maiconsoft::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(maiconsoft::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(maiconsoft::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Router(#[from] RouterError),
}
