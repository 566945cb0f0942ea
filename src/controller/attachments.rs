//! Pending attachments and their preview URLs.
//!
//! Preview URLs are a manually scoped resource: whoever creates one through
//! [`PreviewUrls::create`] must hand it back to [`PreviewUrls::revoke`].

use std::path::Path;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{CoCreateError, CoCreateResult};
use crate::history::AttachmentRef;
use crate::llm::ImageInput;

/// A file picked by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentSource {
    /// File name shown to the user.
    pub display_name: String,
    /// MIME type.
    pub mime_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl AttachmentSource {
    /// Create a source from memory.
    #[must_use]
    pub fn new(display_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            display_name: display_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file, guessing its MIME type from the extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &Path) -> CoCreateResult<Self> {
        let bytes = std::fs::read(path)?;
        let display_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or("application/octet-stream", mime_for_extension)
            .to_string();
        Ok(Self::new(display_name, mime_type, bytes))
    }

    /// Whether this attachment is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Image payload for the gateway.
    ///
    /// # Errors
    /// Returns an error for non-image files.
    pub fn to_image(&self) -> CoCreateResult<ImageInput> {
        if !self.is_image() {
            return Err(CoCreateError::InvalidInput(format!(
                "{} is not an image",
                self.display_name
            )));
        }
        Ok(ImageInput::new(self.mime_type.clone(), self.bytes.clone()))
    }
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Mints and releases preview URLs.
pub trait PreviewUrls: Send + Sync {
    /// Create a preview URL for a source.
    fn create(&self, source: &AttachmentSource) -> String;

    /// Release a preview URL. Unknown URLs are ignored.
    fn revoke(&self, url: &str);
}

/// In-memory `blob:` URL registry.
#[derive(Debug, Default)]
pub struct BlobUrlRegistry {
    live: DashMap<String, usize>,
}

impl BlobUrlRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of URLs not yet revoked.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Whether `url` is still live.
    #[must_use]
    pub fn is_live(&self, url: &str) -> bool {
        self.live.contains_key(url)
    }
}

impl PreviewUrls for BlobUrlRegistry {
    fn create(&self, source: &AttachmentSource) -> String {
        let url = format!("blob:cocreate/{}", Uuid::new_v4());
        self.live.insert(url.clone(), source.bytes.len());
        url
    }

    fn revoke(&self, url: &str) {
        self.live.remove(url);
    }
}

/// An attachment between upload and submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAttachment {
    /// The file.
    pub source: AttachmentSource,
    /// Its preview URL.
    pub preview_url: String,
}

impl PendingAttachment {
    /// Transcript reference for this attachment.
    #[must_use]
    pub fn to_ref(&self) -> AttachmentRef {
        AttachmentRef {
            url: self.preview_url.clone(),
            display_name: self.source.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_tracks_live_urls() {
        let registry = BlobUrlRegistry::new();
        let source = AttachmentSource::new("cat.png", "image/png", vec![1, 2]);
        let url = registry.create(&source);
        assert!(url.starts_with("blob:"));
        assert!(registry.is_live(&url));

        registry.revoke(&url);
        registry.revoke("blob:unknown");
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_non_image_cannot_be_sent() {
        let source = AttachmentSource::new("notes.txt", "text/plain", vec![]);
        assert!(!source.is_image());
        assert!(source.to_image().is_err());
    }

    #[test]
    fn test_from_path_guesses_mime() {
        let tmp = tempfile::tempdir().ok();
        let Some(tmp) = tmp else { return };
        let path = tmp.path().join("photo.JPG");
        assert!(std::fs::write(&path, [0xFF, 0xD8]).is_ok());

        let source = AttachmentSource::from_path(&path).ok();
        assert_eq!(source.as_ref().map(|s| s.mime_type.as_str()), Some("image/jpeg"));
        assert_eq!(source.map(|s| s.display_name), Some("photo.JPG".to_string()));
    }
}
