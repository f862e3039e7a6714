//! Form and agent bodies read from the manifest's checkout.

use async_trait::async_trait;
use gitsync_engine::{ContentError, ContentSource};
use std::path::{Component, Path, PathBuf};

/// Reads bodies relative to a root directory, normally the manifest's.
#[derive(Debug, Clone)]
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rejects absolute paths and `..` so a manifest cannot read outside its
    /// checkout.
    fn resolve(&self, path: &str) -> Result<PathBuf, ContentError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ContentError::Read {
                path: path.to_string(),
                message: "path must stay inside the manifest directory".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentSource for FsContentSource {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ContentError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ContentError::Read {
                path: path.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("forms")).unwrap();
        std::fs::write(dir.path().join("forms/intake.form"), b"email").unwrap();

        let source = FsContentSource::new(dir.path());
        let body = source.read("forms/intake.form").await.unwrap();
        assert_eq!(body.as_deref(), Some(&b"email"[..]));
    }

    #[tokio::test]
    async fn test_missing_body_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsContentSource::new(dir.path());
        assert!(source.read("agents/none.yaml").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsContentSource::new(dir.path());
        assert!(source.read("../secrets").await.is_err());
        assert!(source.read("/etc/passwd").await.is_err());
    }
}
