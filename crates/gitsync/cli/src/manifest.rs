//! Manifest files on disk.

use crate::error::{CliError, CliResult};
use gitsync_types::{Manifest, ManifestError};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    /// `.json` is JSON; anything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

pub fn parse_manifest(
    text: &str,
    format: ManifestFormat,
    origin: &str,
) -> Result<Manifest, ManifestError> {
    let parsed = match format {
        ManifestFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        ManifestFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ManifestError::Parse {
        path: origin.to_string(),
        message,
    })
}

pub async fn load_manifest(path: &Path) -> CliResult<Manifest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let manifest = parse_manifest(&text, ManifestFormat::from_path(path), &path.display().to_string())?;
    tracing::debug!(
        path = %path.display(),
        declarations = manifest.declaration_count(),
        "manifest loaded"
    );
    Ok(manifest)
}
