//! Hands a generated poster to a platform share facility.

use crate::encoder::EncodedImage;
use async_trait::async_trait;
use std::path::PathBuf;

pub const SHARE_FILE_NAME: &str = "football-poster.png";
pub const SHARE_TITLE: &str = "My Cinematic Football Poster";
pub const SHARE_TEXT: &str = "Check out this awesome football poster I created with AI!";

pub const NOTHING_TO_SHARE_MESSAGE: &str =
    "Sharing is not supported on this device or no image is available.";
pub const CANNOT_SHARE_MESSAGE: &str = "This poster can't be shared from this browser.";

/// Errors raised by a share target.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    /// The user dismissed the share prompt.
    #[error("share cancelled")]
    Cancelled,

    /// The poster could not be turned into a file.
    #[error("invalid poster: {0}")]
    InvalidPoster(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("share failed: {0}")]
    Failed(String),
}

impl ShareError {
    /// Message shown to the user. Detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        "Something went wrong while trying to share."
    }
}

/// A file handed to the share facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub files: Vec<ShareFile>,
    pub title: String,
    pub text: String,
}

impl SharePayload {
    /// Builds the poster payload from a generated data URL.
    pub fn from_data_url(url: &str) -> Result<Self, ShareError> {
        let encoded =
            EncodedImage::from_data_url(url).map_err(|e| ShareError::InvalidPoster(e.to_string()))?;
        let bytes = encoded
            .decode()
            .map_err(|e| ShareError::InvalidPoster(e.to_string()))?;

        Ok(Self {
            files: vec![ShareFile {
                name: SHARE_FILE_NAME.to_string(),
                mime_type: encoded.mime_type,
                bytes,
            }],
            title: SHARE_TITLE.to_string(),
            text: SHARE_TEXT.to_string(),
        })
    }
}

/// How a share request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Cancelled,
    Unsupported(&'static str),
}

/// A platform share facility.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    /// Capability check, asked before every share.
    fn can_share(&self, payload: &SharePayload) -> bool;

    async fn share(&self, payload: &SharePayload) -> Result<(), ShareError>;
}

/// Shares `poster` through `target`. Cancellation is absorbed; other failures are returned.
pub async fn share_poster(
    poster: Option<&str>,
    target: Option<&dyn ShareTarget>,
) -> Result<ShareOutcome, ShareError> {
    let (Some(poster), Some(target)) = (poster, target) else {
        return Ok(ShareOutcome::Unsupported(NOTHING_TO_SHARE_MESSAGE));
    };

    let payload = SharePayload::from_data_url(poster)?;
    if !target.can_share(&payload) {
        return Ok(ShareOutcome::Unsupported(CANNOT_SHARE_MESSAGE));
    }

    match target.share(&payload).await {
        Ok(()) => Ok(ShareOutcome::Shared),
        Err(ShareError::Cancelled) => {
            tracing::debug!("share dismissed by user");
            Ok(ShareOutcome::Cancelled)
        }
        Err(e) => {
            tracing::error!(error = %e, "share failed");
            Err(e)
        }
    }
}

/// Writes shared posters into an outbox directory.
#[derive(Debug, Clone)]
pub struct DirectoryShare {
    dir: PathBuf,
}

impl DirectoryShare {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ShareTarget for DirectoryShare {
    fn can_share(&self, payload: &SharePayload) -> bool {
        !payload.files.is_empty()
            && payload
                .files
                .iter()
                .all(|file| file.mime_type.starts_with("image/"))
    }

    async fn share(&self, payload: &SharePayload) -> Result<(), ShareError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        for file in &payload.files {
            let path = self.dir.join(&file.name);
            tokio::fs::write(&path, &file.bytes).await?;
            tracing::info!(
                path = %path.display(),
                title = %payload.title,
                "poster shared to outbox"
            );
        }
        Ok(())
    }
}
