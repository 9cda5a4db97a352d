/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for engine operations
pub type UmaResult<T> = Result<T, UmaError>;

/// Policy store result
pub type StoreResult<T> = Result<T, StoreError>;

/// Directory lookup result
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Engine errors surfaced to the calling transport layer
///
/// A denied authorization is not an error; see `decision::Decision`.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum UmaError {
    #[error("Forbidden: {0}")]
    #[diagnostic(
        code(uma::forbidden),
        help("Only the resource owner may manage policies, and only on owner-managed resources.")
    )]
    Forbidden(String),

    #[error("Not found: {0}")]
    #[diagnostic(
        code(uma::not_found),
        help("The entity was deleted or never existed. Stop referencing this id.")
    )]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(
        code(uma::conflict),
        help("The permission changed concurrently. Re-read it and retry with fresh state.")
    )]
    Conflict(String),

    #[error("Invalid request: {0}")]
    #[diagnostic(code(uma::invalid_request))]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(uma::invalid_config), help("Check UMA_* environment variables."))]
    InvalidConfig(String),

    #[error("Policy store failure: {0}")]
    #[diagnostic(code(uma::store))]
    Store(#[from] StoreError),

    #[error("Directory failure: {0}")]
    #[diagnostic(code(uma::directory))]
    Directory(#[from] DirectoryError),
}

impl UmaError {
    /// Status code the web-service layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            UmaError::Forbidden(_) => 403,
            UmaError::NotFound(_) => 404,
            UmaError::Conflict(_) => 409,
            UmaError::InvalidRequest(_) => 400,
            UmaError::InvalidConfig(_) => 500,
            UmaError::Store(StoreError::Unavailable(_) | StoreError::Timeout(_)) => 503,
            UmaError::Store(_) => 500,
            UmaError::Directory(DirectoryError::Unavailable(_)) => 503,
            UmaError::Directory(_) => 500,
        }
    }

    /// Whether the caller may retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UmaError::Conflict(_)
                | UmaError::Store(StoreError::Unavailable(_) | StoreError::Timeout(_))
                | UmaError::Directory(DirectoryError::Unavailable(_))
        )
    }

    pub(crate) fn permission_not_found(id: impl std::fmt::Display) -> Self {
        UmaError::NotFound(format!("permission {} not found", id))
    }

    pub(crate) fn ticket_not_found(id: impl std::fmt::Display) -> Self {
        UmaError::NotFound(format!("ticket {} not found", id))
    }

    pub(crate) fn resource_not_found(id: impl std::fmt::Display) -> Self {
        UmaError::NotFound(format!("resource {} not found", id))
    }
}

/// Policy store errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    #[diagnostic(code(store::unavailable))]
    Unavailable(String),

    #[error("store operation timed out: {0}")]
    #[diagnostic(code(store::timeout))]
    Timeout(String),

    #[error("duplicate key: {0}")]
    #[diagnostic(code(store::duplicate))]
    Duplicate(String),

    #[error("missing entry: {0}")]
    #[diagnostic(code(store::missing))]
    Missing(String),
}

/// Directory service errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    #[diagnostic(code(directory::unavailable))]
    Unavailable(String),

    #[error("directory lookup failed: {0}")]
    #[diagnostic(code(directory::lookup_failed))]
    LookupFailed(String),
}
