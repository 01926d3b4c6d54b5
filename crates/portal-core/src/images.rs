//! Image attachment normalization: an external URL is validated but
//! never fetched; uploaded bytes land in the storage directory under a
//! freshly generated name.

use std::path::PathBuf;

use anyhow::Result;
use portal_types::models::ImageRef;
use tokio::fs;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::PortalError;

/// Content types accepted for uploads, with the extension used for the
/// stored file name.
const ALLOWED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// On-disk upload area. Append-only by convention: every stored file
/// gets a new unique name, so no write ever races another.
pub struct UploadStorage {
    dir: PathBuf,
}

impl UploadStorage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Only names this component generated are addressable: a UUID plus
    /// one extension, nothing that could traverse out of the directory.
    fn file_path(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !name.contains("..");
        valid.then(|| self.dir.join(name))
    }

    pub async fn store(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self
            .file_path(name)
            .ok_or_else(|| anyhow::anyhow!("unaddressable upload name: {}", name))?;
        fs::write(&path, bytes).await?;
        Ok(())
    }

    /// `None` when the name is invalid or the file is gone.
    pub async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.file_path(name) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort cleanup of an orphaned upload; never fails the
    /// operation that triggered it.
    pub async fn remove(&self, name: &str) {
        let Some(path) = self.file_path(name) else {
            return;
        };
        match fs::remove_file(&path).await {
            Ok(()) => info!("Removed orphaned upload {}", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove upload {}: {}", name, e),
        }
    }
}

/// Validate an external image URL: absolute http/https with a host.
pub fn resolve_url(raw: &str) -> Result<ImageRef, PortalError> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|_| PortalError::InvalidImage(format!("'{}' is not an absolute URL", raw)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PortalError::InvalidImage(
            "only http and https image URLs are accepted".into(),
        ));
    }
    if url.host_str().is_none() {
        return Err(PortalError::InvalidImage(format!("'{}' has no host", raw)));
    }
    Ok(ImageRef::External {
        url: url.to_string(),
    })
}

/// Persist uploaded bytes and return the resulting reference. The
/// declared content type is checked against the allow-list here, at
/// upload time, never at send time.
pub async fn resolve_upload(
    storage: &UploadStorage,
    bytes: &[u8],
    content_type: &str,
) -> Result<ImageRef, PortalError> {
    if bytes.is_empty() {
        return Err(PortalError::InvalidImage("upload is empty".into()));
    }

    // "image/png; charset=..." → "image/png"
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let extension = ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(ct, _)| *ct == normalized)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            PortalError::InvalidImage(format!("unsupported content type '{}'", content_type))
        })?;

    // Random name, never the client's: rules out collisions, overwrites
    // and path traversal in one move.
    let name = format!("{}.{}", Uuid::new_v4().simple(), extension);
    storage.store(&name, bytes).await?;

    Ok(ImageRef::Uploaded {
        storage_path: name,
        content_type: normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, UploadStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path().join("uploads")).await.unwrap();
        (dir, storage)
    }

    #[test]
    fn url_validation() {
        assert!(resolve_url("https://example.com/a.png").is_ok());
        assert!(resolve_url("http://example.com/a.png").is_ok());

        for bad in ["", "not a url", "ftp://example.com/a.png", "/relative/a.png"] {
            assert!(
                matches!(resolve_url(bad), Err(PortalError::InvalidImage(_))),
                "expected rejection of {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn upload_rejects_non_image_types() {
        let (_dir, storage) = storage().await;

        let err = resolve_upload(&storage, b"hello", "text/plain").await;
        assert!(matches!(err, Err(PortalError::InvalidImage(_))));

        let err = resolve_upload(&storage, b"", "image/png").await;
        assert!(matches!(err, Err(PortalError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn upload_roundtrip() {
        let (_dir, storage) = storage().await;

        let image = resolve_upload(&storage, b"\x89PNG fake bytes", "image/png; charset=binary")
            .await
            .unwrap();
        let ImageRef::Uploaded {
            storage_path,
            content_type,
        } = &image
        else {
            panic!("expected an uploaded image ref");
        };

        assert_eq!(content_type, "image/png");
        assert!(storage_path.ends_with(".png"));
        let bytes = storage.read(storage_path).await.unwrap().unwrap();
        assert_eq!(bytes, b"\x89PNG fake bytes");
    }

    #[tokio::test]
    async fn traversal_names_are_unaddressable() {
        let (_dir, storage) = storage().await;

        assert!(storage.read("../etc/passwd").await.unwrap().is_none());
        assert!(storage.read(".hidden").await.unwrap().is_none());
        assert!(storage.read("a/b.png").await.unwrap().is_none());
        // Removing a bogus or missing name is silently fine.
        storage.remove("../etc/passwd").await;
        storage.remove("missing.png").await;
    }
}
