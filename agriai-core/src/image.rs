//! Image payloads handed to the classifier
//!
//! Images arrive as encoded bytes (JPEG, PNG, ...). The classification service
//! wants raw base64 plus a MIME type; the history and report feeds store the
//! same image as a data URL so it can be rendered without the original file.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Error, Result};

/// An encoded image and its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read an image file, inferring its MIME type from the extension.
    ///
    /// Missing files, unreadable files and unsupported extensions are all
    /// acquisition failures; nothing is retried.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime_type = mime_type_for(path).ok_or_else(|| {
            Error::Acquisition(format!("unsupported image type: {}", path.display()))
        })?;

        let bytes = std::fs::read(path)
            .map_err(|e| Error::Acquisition(format!("failed to read {}: {}", path.display(), e)))?;

        if bytes.is_empty() {
            return Err(Error::Acquisition(format!(
                "image file is empty: {}",
                path.display()
            )));
        }

        Ok(Self::new(mime_type, bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw base64 body, as sent to the classification service
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Data URL form, as stored alongside history and reports
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// MIME type for an image file extension, if supported.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}
