use thiserror::Error;

/// Failure taxonomy for every portal operation. Nothing below escapes a
/// component boundary as a panic; handlers map each variant to an HTTP
/// status, collapsing `Forbidden` into `NotFound` externally so callers
/// cannot probe for other owners' records.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("not authenticated")]
    Unauthenticated,

    /// Entity exists but belongs to a different owner. Logged where it
    /// is raised; surfaced to clients as a plain not-found.
    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Precondition(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("{0} is not configured")]
    ConfigurationMissing(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PortalError>;
