//! File adapter: Implementation of BundleStore.
//!
//! An artifact is two files in the model directory:
//! - `<stem>.bin`: the bincode-encoded artifact
//! - `<stem>.manifest.json`: format version, creation time, SHA-256 of the
//!   `.bin` file and the feature fingerprint the artifact was trained against
//!
//! The manifest binds the exact bytes that get decoded. Loading refuses an
//! artifact whose hash or feature fingerprint does not match.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::application::EnsembleBundle;
use crate::domain::features::feature_fingerprint;
use crate::ports::BundleStore;

/// Manifest format understood by this build.
pub const MANIFEST_VERSION: u32 = 1;

const ENSEMBLE_STEM: &str = "ensemble";

/// Error type for bundle store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersion(u32),

    #[error("Artifact hash mismatch for {file}: manifest says {expected}, file is {found}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        found: String,
    },

    #[error("Feature fingerprint mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Manifest present but artifact missing: {0}")]
    MissingArtifact(String),
}

/// Sidecar metadata written next to every artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub artifact_file: String,
    pub artifact_sha256: String,
    pub feature_fingerprint: String,
}

fn sha256_hex_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Write through a temporary sibling and rename, so readers never observe a
/// half-written file.
fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Directory-backed artifact store.
#[derive(Debug, Clone)]
pub struct FileBundleStore {
    dir: PathBuf,
    stem: String,
}

impl FileBundleStore {
    /// Store for the deterioration ensemble in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_stem(dir, ENSEMBLE_STEM)
    }

    /// Store for an arbitrary artifact named `stem` in `dir`.
    #[must_use]
    pub fn with_stem(dir: impl Into<PathBuf>, stem: &str) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.to_string(),
        }
    }

    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(format!("{}.bin", self.stem))
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}.manifest.json", self.stem))
    }

    /// Encode `value`, write it and its manifest.
    ///
    /// # Errors
    /// Returns error if encoding or any file write fails.
    pub fn write<T: Serialize>(
        &self,
        value: &T,
        fingerprint: &str,
    ) -> Result<ArtifactManifest, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let bytes = bincode::serialize(value)?;
        let artifact_path = self.artifact_path();
        write_replace(&artifact_path, &bytes)?;

        let manifest = ArtifactManifest {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            artifact_file: format!("{}.bin", self.stem),
            artifact_sha256: sha256_hex_bytes(&bytes),
            feature_fingerprint: fingerprint.to_string(),
        };
        write_replace(&self.manifest_path(), &serde_json::to_vec_pretty(&manifest)?)?;

        tracing::info!(
            path = %artifact_path.display(),
            bytes = bytes.len(),
            sha256 = %manifest.artifact_sha256,
            "Artifact saved"
        );
        Ok(manifest)
    }

    /// Read and verify an artifact. `Ok(None)` when nothing has been stored.
    ///
    /// # Errors
    /// Returns error if the manifest is unreadable or of an unknown version,
    /// the artifact bytes do not match the manifest hash, or decoding fails.
    pub fn read<T: DeserializeOwned>(&self) -> Result<Option<(T, ArtifactManifest)>, StoreError> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }
        let manifest: ArtifactManifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(StoreError::UnsupportedVersion(manifest.version));
        }

        let artifact_path = self.dir.join(&manifest.artifact_file);
        if !artifact_path.exists() {
            return Err(StoreError::MissingArtifact(manifest.artifact_file.clone()));
        }
        let bytes = fs::read(&artifact_path)?;
        let actual = sha256_hex_bytes(&bytes);
        if actual != manifest.artifact_sha256 {
            tracing::error!(file = %manifest.artifact_file, "Artifact hash mismatch");
            return Err(StoreError::IntegrityMismatch {
                file: manifest.artifact_file.clone(),
                expected: manifest.artifact_sha256.clone(),
                found: actual,
            });
        }

        let value = bincode::deserialize(&bytes)?;
        tracing::info!(path = %artifact_path.display(), created_at = %manifest.created_at, "Artifact loaded");
        Ok(Some((value, manifest)))
    }
}

impl BundleStore for FileBundleStore {
    type Error = StoreError;

    fn save(&self, bundle: &EnsembleBundle) -> Result<(), Self::Error> {
        self.write(bundle, bundle.fingerprint()).map(|_| ())
    }

    fn load(&self) -> Result<Option<EnsembleBundle>, Self::Error> {
        let Some((bundle, manifest)) = self.read::<EnsembleBundle>()? else {
            return Ok(None);
        };
        let expected = feature_fingerprint();
        for found in [manifest.feature_fingerprint.as_str(), bundle.fingerprint()] {
            if found != expected {
                tracing::error!(%expected, %found, "Bundle trained against a different feature ordering");
                return Err(StoreError::SchemaMismatch {
                    expected,
                    found: found.to_string(),
                });
            }
        }
        Ok(Some(bundle))
    }

    fn exists(&self) -> bool {
        self.manifest_path().exists() && self.artifact_path().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Toy {
        weights: Vec<f64>,
        name: String,
    }

    fn toy() -> Toy {
        Toy {
            weights: vec![0.5, 0.3, 0.2],
            name: "toy".into(),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().expect("tempdir");
        let store = FileBundleStore::with_stem(dir.path(), "toy");
        assert!(store.read::<Toy>().expect("read").is_none());

        let manifest = store.write(&toy(), "abc").expect("write");
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.artifact_sha256.len(), 64);

        let (loaded, read_manifest) = store.read::<Toy>().expect("read").expect("present");
        assert_eq!(loaded, toy());
        assert_eq!(read_manifest, manifest);
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = FileBundleStore::with_stem(dir.path(), "toy");
        store.write(&toy(), "abc").expect("write");

        let mut bytes = fs::read(store.artifact_path()).expect("bytes");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(store.artifact_path(), bytes).expect("tamper");

        assert!(matches!(
            store.read::<Toy>(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_manifest_version_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = FileBundleStore::with_stem(dir.path(), "toy");
        let mut manifest = store.write(&toy(), "abc").expect("write");
        manifest.version = 99;
        fs::write(
            store.manifest_path(),
            serde_json::to_vec(&manifest).expect("json"),
        )
        .expect("rewrite");
        assert!(matches!(
            store.read::<Toy>(),
            Err(StoreError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_missing_artifact_reported() {
        let dir = tempdir().expect("tempdir");
        let store = FileBundleStore::with_stem(dir.path(), "toy");
        store.write(&toy(), "abc").expect("write");
        fs::remove_file(store.artifact_path()).expect("remove");
        assert!(!store.exists());
        assert!(matches!(
            store.read::<Toy>(),
            Err(StoreError::MissingArtifact(_))
        ));
    }
}
