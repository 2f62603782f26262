#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate match: {0}")]
    DuplicateMatch(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ProviderError::InvalidArgument(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// Turns a `NotFound` failure into `None`, keeping every other error.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, ProviderError>;
}

impl<T> OptionalExt<T> for Result<T, ProviderError> {
    fn optional(self) -> Result<Option<T>, ProviderError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
