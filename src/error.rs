use thiserror::Error;

use crate::{
    config::LoadError,
    infra::error::InfraError,
    middleware::ConfigError,
    render::{BodyError, RenderError},
};

/// Top-level failure of the `ssr-bridge` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("failed to build render middleware: {0}")]
    Middleware(#[from] ConfigError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Body(#[from] BodyError),
    #[error("invalid URL path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
}
