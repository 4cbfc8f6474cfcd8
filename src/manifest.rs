//! `manifest.json` records written next to a pair of artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};
use crate::verify::{digest_pair, DigestAlgorithm};

/// Description of one technique's output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub technique: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Artifact paths relative to the manifest; the first two are compared
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve the first two artifacts against the manifest's directory.
    pub fn artifact_paths(&self, manifest_path: &Path) -> Result<(PathBuf, PathBuf)> {
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        match self.artifacts.as_slice() {
            [a, b, ..] => Ok((base.join(a), base.join(b))),
            _ => Err(FormatError::Malformed("manifest must list at least two artifacts".to_string()).into()),
        }
    }
}

/// Digest comparison for the artifacts a manifest names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestCheck {
    pub technique: String,
    pub language: Option<String>,
    pub manifest: PathBuf,
    pub file_a: PathBuf,
    pub file_b: PathBuf,
    pub md5_equal: bool,
    pub sha256_differ: bool,
}

impl ManifestCheck {
    pub fn passed(&self) -> bool {
        self.md5_equal && self.sha256_differ
    }
}

pub fn verify_manifest(path: &Path) -> Result<ManifestCheck> {
    let manifest = Manifest::load(path)?;
    let (file_a, file_b) = manifest.artifact_paths(path)?;
    let a = fs::read(&file_a)?;
    let b = fs::read(&file_b)?;

    let (md5_a, md5_b) = digest_pair(&a, &b, DigestAlgorithm::Md5);
    let (sha_a, sha_b) = digest_pair(&a, &b, DigestAlgorithm::Sha256);
    let check = ManifestCheck {
        technique: manifest.technique,
        language: manifest.language,
        manifest: path.to_path_buf(),
        file_a,
        file_b,
        md5_equal: md5_a == md5_b,
        sha256_differ: sha_a != sha_b,
    };
    log::info!(
        "{}: MD5 equal {}, SHA-256 differs {}",
        check.technique,
        check.md5_equal,
        check.sha256_differ
    );
    Ok(check)
}
