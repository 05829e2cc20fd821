use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Holder not found")]
    HolderNotFound,

    #[error("Holder is inactive")]
    HolderInactive,

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Staff member not found")]
    StaffNotFound,

    #[error("Holder already has an active {0} credential")]
    DuplicateActiveCredential(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("PIN error: {0}")]
    Pin(anyhow::Error),

    #[error("Store invariant violated: {0}")]
    StoreInvariantViolation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::HolderNotFound => AppError::NotFound(anyhow::anyhow!("Holder not found")),
            ServiceError::HolderInactive => {
                AppError::Forbidden(anyhow::anyhow!("Holder is inactive"))
            }
            ServiceError::CredentialNotFound => {
                AppError::NotFound(anyhow::anyhow!("Credential not found"))
            }
            ServiceError::StaffNotFound => {
                AppError::NotFound(anyhow::anyhow!("Staff member not found"))
            }
            ServiceError::DuplicateActiveCredential(kind) => AppError::Conflict(anyhow::anyhow!(
                "Holder already has an active {} credential",
                kind
            )),
            ServiceError::InvalidInput(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Validation(e) => AppError::ValidationError(e),
            ServiceError::Pin(e) => AppError::InternalError(e),
            ServiceError::StoreInvariantViolation(e) => {
                AppError::InternalError(anyhow::anyhow!("Store invariant violated: {}", e))
            }
        }
    }
}
