//! Assembler: concatenate the parts of each file and write both once.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// The two finished files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPair {
    pub a: Vec<u8>,
    pub b: Vec<u8>,
}

/// `prefix ‖ block ‖ tail`
pub fn assemble(prefix: &[u8], block: &[u8], tail: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + block.len() + tail.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(block);
    out.extend_from_slice(tail);
    out
}

/// Write both artifacts.
///
/// Without `overwrite`, files are created exclusively and an existing
/// destination fails with [`Error::OutputConflict`] before anything is
/// written. If the second file cannot be written the first is removed
/// again. The files are not touched again after this call.
pub fn write_pair(artifacts: &ArtifactPair, path_a: &Path, path_b: &Path, overwrite: bool) -> Result<()> {
    if !overwrite {
        for path in [path_a, path_b] {
            if path.exists() {
                return Err(Error::OutputConflict(path.to_path_buf()));
            }
        }
    }
    write_one(&artifacts.a, path_a, overwrite)?;
    if let Err(e) = write_one(&artifacts.b, path_b, overwrite) {
        // Never leave half a pair behind
        if let Err(cleanup) = std::fs::remove_file(path_a) {
            log::warn!("Could not remove {}: {}", path_a.display(), cleanup);
        }
        return Err(e);
    }
    log::info!(
        "Wrote {} ({} bytes) and {} ({} bytes)",
        path_a.display(),
        artifacts.a.len(),
        path_b.display(),
        artifacts.b.len()
    );
    Ok(())
}

fn write_one(bytes: &[u8], path: &Path, overwrite: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Error::OutputConflict(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
