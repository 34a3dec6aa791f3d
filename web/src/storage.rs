//! Payment-proof storage.
//!
//! Uploads are checked by declared content type and by magic bytes, so a
//! renamed executable is refused even when the client claims `image/png`.
//! Only the returned URL is stored on the registration.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Upload failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Nothing was uploaded
    #[error("Upload is empty")]
    Empty,

    /// Not a JPEG or PNG image
    #[error("Unsupported file type: {0}. Upload a JPEG or PNG image")]
    UnsupportedType(String),

    /// Larger than the configured limit
    #[error("Upload is {size} bytes, the limit is {limit} bytes")]
    TooLarge {
        /// Upload size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Writing the file failed
    #[error("Storage failure: {0}")]
    Io(String),
}

/// Accepted image formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    /// `image/jpeg`
    Jpeg,
    /// `image/png`
    Png,
}

impl ImageKind {
    /// File extension
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Identifies an upload from its declared type and leading bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedType`] unless both agree on JPEG or
    /// PNG.
    pub fn detect(content_type: &str, bytes: &[u8]) -> Result<Self, StorageError> {
        let declared = match content_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/png" => Self::Png,
            other => return Err(StorageError::UnsupportedType(other.to_string())),
        };
        let matches = match declared {
            Self::Jpeg => bytes.starts_with(JPEG_MAGIC),
            Self::Png => bytes.starts_with(PNG_MAGIC),
        };
        if matches {
            Ok(declared)
        } else {
            Err(StorageError::UnsupportedType(format!(
                "{content_type} (content does not match)"
            )))
        }
    }
}

/// Stores payment-proof images and returns their URL.
pub trait ProofStorage: Send + Sync {
    /// Validates and stores one upload.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] for empty, oversized or non-image uploads and
    /// for write failures.
    fn store(
        &self,
        content_type: String,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + '_>>;

    /// Largest accepted upload in bytes
    fn max_bytes(&self) -> usize;
}

/// Writes uploads to a local directory served under `base_url`.
#[derive(Clone, Debug)]
pub struct LocalProofStorage {
    dir: PathBuf,
    base_url: String,
    max_bytes: usize,
}

impl LocalProofStorage {
    /// Creates a store writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, base_url: &str, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    fn check(&self, content_type: &str, bytes: &[u8]) -> Result<ImageKind, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        ImageKind::detect(content_type, bytes)
    }
}

impl ProofStorage for LocalProofStorage {
    fn store(
        &self,
        content_type: String,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let kind = self.check(&content_type, &bytes)?;
            let name = format!("{}.{}", Uuid::new_v4(), kind.extension());

            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
            tokio::fs::write(self.dir.join(&name), &bytes)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;

            tracing::debug!(file = %name, size = bytes.len(), "Payment proof stored");
            Ok(format!("{}/{name}", self.base_url))
        })
    }

    fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn png() -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(b"\0\0\0\rIHDR");
        bytes
    }

    #[test]
    fn declared_type_must_match_content() {
        assert_eq!(ImageKind::detect("image/png", &png()), Ok(ImageKind::Png));
        assert_eq!(
            ImageKind::detect("IMAGE/JPEG", &[0xFF, 0xD8, 0xFF, 0xE0]),
            Ok(ImageKind::Jpeg)
        );
        assert!(ImageKind::detect("image/jpeg", &png()).is_err());
        assert!(ImageKind::detect("application/pdf", b"%PDF-1.7").is_err());
    }

    #[tokio::test]
    async fn stores_images_under_base_url() {
        let dir = std::env::temp_dir().join(format!("eventpass-proofs-{}", Uuid::new_v4()));
        let storage = LocalProofStorage::new(&dir, "/uploads/", 1024);

        let url = storage.store("image/png".into(), png()).await.unwrap();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".png"));

        let name = url.trim_start_matches("/uploads/");
        assert_eq!(tokio::fs::read(dir.join(name)).await.unwrap(), png());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_uploads() {
        let storage = LocalProofStorage::new(std::env::temp_dir(), "/uploads", 8);
        assert_eq!(
            storage.store("image/png".into(), Vec::new()).await,
            Err(StorageError::Empty)
        );
        assert_eq!(
            storage.store("image/png".into(), png()).await,
            Err(StorageError::TooLarge { size: 16, limit: 8 })
        );
    }
}
