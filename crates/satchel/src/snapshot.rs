//! Durable snapshot persistence for the session collection.
//!
//! The snapshot is a single JSON document holding every record. Writes go
//! through a sibling temp file and a rename so a crashed flush never leaves
//! a half-written snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::record::SessionRecord;

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<SessionRecord>,
}

/// Load the snapshot at `path`.
///
/// Returns `Ok(None)` if no snapshot exists yet, which means a fresh,
/// empty store rather than an error.
pub fn load(path: &Path) -> Result<Option<Vec<SessionRecord>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Load {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion(snapshot.version));
    }

    debug!(
        path = %path.display(),
        records = snapshot.records.len(),
        "loaded session snapshot"
    );
    Ok(Some(snapshot.records))
}

/// Write `records` to `path` atomically.
pub fn write(path: &Path, records: Vec<SessionRecord>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|source| StoreError::Flush {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let count = records.len();
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        records,
    };
    let bytes = serde_json::to_vec(&snapshot)?;

    let tmp = tmp_path(path);
    fs::write(&tmp, &bytes)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|source| StoreError::Flush {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), records = count, "flushed session snapshot");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
