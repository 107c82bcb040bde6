//! Error types for poster generation.

/// Errors that can occur while preparing or generating a poster.
#[derive(Debug, thiserror::Error)]
pub enum PosterError {
    /// The credential variable is missing or empty.
    #[error("{0} environment variable is not set.")]
    MissingCredential(String),

    /// Any failure talking to the generation service. Detail is logged, not carried.
    #[error("Failed to generate poster due to an API error.")]
    Generation,

    /// The selected image could not be read.
    #[error("Could not read the selected image: {0}")]
    ImageRead(String),

    /// A data URL could not be parsed or decoded.
    #[error("invalid data URL: {0}")]
    DataUrl(String),

    /// No session with this id exists.
    #[error("session {0} not found")]
    UnknownSession(u64),

    /// The upload did not contain an image field.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
}

impl PosterError {
    /// Returns true if the error came from the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ImageRead(_) | Self::DataUrl(_) | Self::InvalidUpload(_)
        )
    }
}

/// Result type alias for poster operations.
pub type Result<T> = std::result::Result<T, PosterError>;
