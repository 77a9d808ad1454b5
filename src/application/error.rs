use std::error::Error as StdError;

use thiserror::Error;

use crate::config::LoadError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Error carried through the cache core. `Clone` because one failure is stored on the cache
/// entry and handed to every waiter of the same request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The request never completed or the server answered with a non-success status.
    #[error("`{operation}` failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
    /// The request succeeded but the logical result is empty.
    #[error("`{what}` returned no data")]
    EmptyResult { what: &'static str },
    /// Rejected client-side; never reaches the network.
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("cache entry `{key}` holds an unexpected payload")]
    PayloadMismatch { key: String },
}

impl CatalogError {
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    pub fn empty(what: &'static str) -> Self {
        Self::EmptyResult { what }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(DomainError::validation(message))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Top-level error of the `folio` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status: 2 for bad input, 3 for remote failures, 4 when nothing is
    /// available, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Catalog(CatalogError::Validation(_)) => 2,
            AppError::Catalog(CatalogError::Transport { .. }) | AppError::Infra(InfraError::Http(_)) => 3,
            AppError::Catalog(CatalogError::EmptyResult { .. }) => 4,
            AppError::Catalog(CatalogError::PayloadMismatch { .. })
            | AppError::Infra(_)
            | AppError::Unexpected(_) => 1,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Configuration is invalid",
            AppError::Catalog(CatalogError::Validation(_)) => "Input could not be accepted",
            AppError::Catalog(CatalogError::Transport { .. }) | AppError::Infra(InfraError::Http(_)) => {
                "Catalog service is unreachable or returned an error"
            }
            AppError::Catalog(CatalogError::EmptyResult { .. }) => "No data available",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Configuration { .. }) => "Client misconfigured",
            AppError::Catalog(CatalogError::PayloadMismatch { .. }) | AppError::Unexpected(_) => {
                "Unexpected error occurred"
            }
        }
    }
}

/// Flatten an error and its `source()` chain into display strings, outermost first.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}
