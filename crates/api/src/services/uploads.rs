//! Image uploads stored on local disk and served under `/uploads`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// URL prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Errors that can occur when storing or removing uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file was provided")]
    Empty,

    #[error("file exceeds the {0} byte limit")]
    TooLarge(usize),

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file content does not match its declared type")]
    ContentMismatch,

    #[error("invalid file name")]
    InvalidName,

    #[error("file not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    const ALL: [Self; 4] = [Self::Jpeg, Self::Png, Self::Gif, Self::Webp];

    /// Parse a `Content-Type` value, ignoring parameters.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Detect the format from the leading bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
            Some(Self::Webp)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.extension() == ext)
    }
}

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUpload {
    pub name: String,
    pub url: String,
    pub content_type: &'static str,
    pub size: usize,
}

/// Writes uploads to a directory under random names.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    #[must_use]
    pub const fn new(dir: PathBuf, max_bytes: usize) -> Self {
        Self { dir, max_bytes }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Create the upload directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Io` if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Validate and store an image.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Empty`, `TooLarge`, `UnsupportedType` or
    /// `ContentMismatch` when the file is rejected, and `UploadError::Io`
    /// if it cannot be written.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn save(
        &self,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredUpload, UploadError> {
        let kind = self.validate(content_type, bytes)?;
        let name = format!("{}.{}", Uuid::new_v4(), kind.extension());

        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&name), bytes).await?;

        info!(name = %name, "Stored upload");
        Ok(StoredUpload {
            url: format!("{PUBLIC_PREFIX}/{name}"),
            name,
            content_type: kind.mime(),
            size: bytes.len(),
        })
    }

    /// Remove a stored upload by name.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::InvalidName` for anything that is not a name
    /// this store generated, `UploadError::NotFound` if the file is gone.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<(), UploadError> {
        let name = check_name(name)?;

        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => {
                info!(name = %name, "Deleted upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(UploadError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn validate(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<ImageKind, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge(self.max_bytes));
        }

        let declared = content_type.unwrap_or("application/octet-stream");
        let kind = ImageKind::from_content_type(declared)
            .ok_or_else(|| UploadError::UnsupportedType(declared.to_string()))?;

        if ImageKind::sniff(bytes) != Some(kind) {
            return Err(UploadError::ContentMismatch);
        }
        Ok(kind)
    }
}

/// Accept only `<uuid>.<known extension>`, which rules out separators and
/// `..` components.
fn check_name(name: &str) -> Result<&str, UploadError> {
    let (stem, ext) = name.rsplit_once('.').ok_or(UploadError::InvalidName)?;
    if Uuid::try_parse(stem).is_err() || ImageKind::from_extension(ext).is_none() {
        return Err(UploadError::InvalidName);
    }
    Ok(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const WEBP: &[u8] = b"RIFF\x24\0\0\0WEBPVP8 ";

    fn store() -> UploadStore {
        let dir = std::env::temp_dir().join(format!("emporium-uploads-{}", Uuid::new_v4()));
        UploadStore::new(dir, 1024)
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(WEBP), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"\xFF\xD8\xFF\xE0"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(b"GIF89a..."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"<svg></svg>"), None);
    }

    #[test]
    fn test_content_type_parsing() {
        assert_eq!(
            ImageKind::from_content_type("image/PNG; charset=binary"),
            Some(ImageKind::Png)
        );
        assert_eq!(ImageKind::from_content_type("image/svg+xml"), None);
    }

    #[test]
    fn test_validation_rejects() {
        let store = store();
        assert!(matches!(
            store.validate(Some("image/png"), b""),
            Err(UploadError::Empty)
        ));
        assert!(matches!(
            store.validate(Some("image/png"), &[0u8; 2048]),
            Err(UploadError::TooLarge(1024))
        ));
        assert!(matches!(
            store.validate(Some("text/html"), PNG),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            store.validate(Some("image/jpeg"), PNG),
            Err(UploadError::ContentMismatch)
        ));
        assert!(matches!(
            store.validate(None, PNG),
            Err(UploadError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_check_name_blocks_traversal() {
        assert!(check_name("../etc/passwd").is_err());
        assert!(check_name("..%2Fsecret.png").is_err());
        assert!(check_name("photo.png").is_err());
        assert!(check_name(&format!("{}.exe", Uuid::new_v4())).is_err());
        assert!(check_name(&format!("{}.webp", Uuid::new_v4())).is_ok());
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let store = store();
        let stored = store.save(Some("image/png"), PNG).await.unwrap();

        assert!(stored.url.starts_with("/uploads/"));
        assert!(stored.name.ends_with(".png"));
        assert!(store.dir().join(&stored.name).exists());

        store.delete(&stored.name).await.unwrap();
        assert!(matches!(
            store.delete(&stored.name).await,
            Err(UploadError::NotFound)
        ));

        let _ = std::fs::remove_dir_all(store.dir());
    }
}
