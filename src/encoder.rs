//! Turns a selected image into a preview data URL and an inline transport payload.

use crate::error::{PosterError, Result};
use base64::{engine::general_purpose, Engine as _};

const FALLBACK_MIME: &str = "application/octet-stream";

/// An image picked by the user, held as raw bytes with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    /// Original file name, when the picker supplied one.
    pub file_name: Option<String>,
    /// MIME type reported for the file.
    pub mime_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// The transport form of an image: bare base64 payload plus MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl SelectedImage {
    /// Creates an image from bytes, sniffing the MIME type when none was declared.
    pub fn new(file_name: Option<String>, declared_mime: Option<&str>, bytes: Vec<u8>) -> Self {
        let mime_type = match declared_mime.map(str::trim) {
            Some(mime) if !mime.is_empty() => mime.to_string(),
            _ => sniff_mime(&bytes).unwrap_or(FALLBACK_MIME).to_string(),
        };

        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Reads an image from disk.
    pub async fn read(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PosterError::ImageRead(format!("{}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(Self::new(file_name, None, bytes))
    }

    /// Encodes the image for embedding in a request body.
    pub fn encode(&self) -> EncodedImage {
        EncodedImage {
            mime_type: self.mime_type.clone(),
            data: general_purpose::STANDARD.encode(&self.bytes),
        }
    }

    /// Returns the image as a data URL suitable for a preview `<img>`.
    pub fn preview_data_url(&self) -> String {
        self.encode().to_data_url()
    }
}

impl EncodedImage {
    /// Wraps the payload in a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Splits a base64 data URL back into MIME type and bare payload.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| PosterError::DataUrl("missing data: scheme".into()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| PosterError::DataUrl("missing payload separator".into()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| PosterError::DataUrl("payload is not base64".into()))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    /// Decodes the payload into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| PosterError::DataUrl(e.to_string()))
    }
}

/// Detects the MIME type of common image formats from their magic bytes.
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    use image::ImageFormat;

    let mime = match image::guess_format(bytes).ok()? {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Avif => "image/avif",
        _ => return None,
    };
    Some(mime)
}
