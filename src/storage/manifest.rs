//! Sidecar manifest
//!
//! `.manifest.json` records where each artifact came from, so origin never
//! has to be guessed from a filename that a user could have picked.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::Origin;
use crate::error::{Result, VoxError};

/// Manifest filename inside the storage root
pub const MANIFEST_FILE: &str = ".manifest.json";

const MANIFEST_VERSION: u32 = 1;

/// What the store knows about one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub origin: Origin,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the bytes written
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Load the manifest from `root`, or an empty one if none exists yet
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(VoxError::storage(path, e)),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    /// Write the manifest to `root`, replacing the previous copy atomically
    pub fn save(&self, root: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        let temp = stage_temp(root, MANIFEST_FILE, &content)?;
        let path = root.join(MANIFEST_FILE);
        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            VoxError::storage(path, e)
        })
    }

    pub fn get(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries.get(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn insert(&mut self, filename: &str, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(filename.to_string(), entry)
    }

    pub fn remove(&mut self, filename: &str) -> Option<ManifestEntry> {
        self.entries.remove(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose file no longer exists under `root`
    pub fn prune_missing(&mut self, root: &Path) -> Vec<String> {
        let missing: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !root.join(name.as_str()).exists())
            .cloned()
            .collect();
        for name in &missing {
            self.entries.remove(name);
        }
        missing
    }
}

/// Write `bytes` to a hidden temporary next to `filename` and flush it to disk
///
/// The caller renames the returned path into place. On failure the
/// temporary is removed.
pub(crate) fn stage_temp(root: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let temp = root.join(format!(".{}.{}.part", filename, Uuid::new_v4().simple()));

    let written = fs::File::create(&temp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    match written {
        Ok(()) => Ok(temp),
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(VoxError::storage(temp, e))
        }
    }
}

/// Hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
