//! Artifact storage
//!
//! A flat directory of audio files plus a hidden sidecar manifest. Every
//! change to the set of names (reserving, writing, deleting) happens under
//! one namespace lock; the slow parts (writing bytes, sleeping between delete
//! attempts for a busy file) are kept as short as the invariants allow.
//!
//! Layout of `storage.root`:
//! ```text
//! uploads/
//! ├── .manifest.json           # filename -> origin, size, created_at, sha256
//! ├── .clip_male.wav.<id>.part # in-progress write, never listed
//! ├── clip.wav                 # original
//! └── clip_male.wav            # derived
//! ```

mod manifest;
mod naming;
mod retry;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::codec::AudioFormat;
use crate::config::{RetryPolicy, StorageConfig};
use crate::error::{Result, VoxError};

pub use manifest::{sha256_hex, Manifest, ManifestEntry, MANIFEST_FILE};
pub use naming::{base_stem, check_plain, derived_candidate, sanitize_filename};
pub use retry::{delete_with_retry, is_transient};

/// Where an artifact came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Uploaded by a user
    Original,
    /// Produced by applying `effect_id` to `source_filename`
    Derived {
        source_filename: String,
        effect_id: String,
    },
}

impl Origin {
    pub fn is_original(&self) -> bool {
        matches!(self, Origin::Original)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Original => f.write_str("original"),
            Origin::Derived {
                source_filename,
                effect_id,
            } => write!(f, "{} of {}", effect_id, source_filename),
        }
    }
}

/// Descriptor of a stored artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub origin: Origin,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Recorded for artifacts written through the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Artifact store rooted at one directory
///
/// Cheap to clone; clones share the namespace lock.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    delete_retry: RetryPolicy,
    namespace: Mutex<Namespace>,
}

#[derive(Debug)]
struct Namespace {
    manifest: Manifest,
    /// Names handed out by `allocate_name` that are not yet written
    reserved: HashSet<String>,
}

impl Namespace {
    fn is_taken(&self, root: &Path, filename: &str) -> bool {
        self.reserved.contains(filename)
            || self.manifest.contains(filename)
            || root.join(filename).exists()
    }
}

/// A name held for one pending write
///
/// Dropping an unpersisted reservation releases the name.
#[derive(Debug)]
pub struct Reservation {
    store: ArtifactStore,
    filename: String,
    committed: bool,
}

impl Reservation {
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.store.namespace().reserved.remove(&self.filename);
            debug!(filename = %self.filename, "Reservation released");
        }
    }
}

impl ArtifactStore {
    /// Open (creating if needed) the store described by `config`
    ///
    /// Manifest entries whose file is gone are pruned and leftover temporaries
    /// from an interrupted write are removed.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let root = config.root.clone();
        fs::create_dir_all(&root).map_err(|e| VoxError::storage(&root, e))?;

        remove_stale_temporaries(&root);

        let mut manifest = Manifest::load(&root)?;
        let missing = manifest.prune_missing(&root);
        if !missing.is_empty() {
            for filename in &missing {
                warn!(filename = %filename, "Manifest entry without a file, pruned");
            }
            manifest.save(&root)?;
        }

        debug!(root = %root.display(), tracked = manifest.len(), "Artifact store opened");

        Ok(Self {
            inner: Arc::new(Inner {
                root,
                delete_retry: config.delete_retry.clone(),
                namespace: Mutex::new(Namespace {
                    manifest,
                    reserved: HashSet::new(),
                }),
            }),
        })
    }

    /// Open a store at `root` with default retry settings
    pub fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open(&StorageConfig {
            root: root.into(),
            ..StorageConfig::default()
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn namespace(&self) -> MutexGuard<'_, Namespace> {
        // A panic elsewhere never leaves the namespace half-updated
        self.inner
            .namespace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn path_of(&self, filename: &str) -> PathBuf {
        self.inner.root.join(filename)
    }

    // ------------------------------------------------------------------
    // Naming
    // ------------------------------------------------------------------

    /// Reserve a free name for the result of `effect_id` applied to `base_name`
    ///
    /// Tries `{stem}_{effect}.wav`, then `{stem}_{effect}_1.wav`, ... The
    /// reservation is atomic with respect to every other allocation, write and
    /// delete on this store.
    pub fn allocate_name(&self, base_name: &str, effect_id: &str) -> Result<Reservation> {
        let stem = base_stem(base_name);
        check_plain(stem)?;

        let filename = self.reserve_first_free(|n| derived_candidate(stem, effect_id, n));
        debug!(filename = %filename, base = base_name, effect = effect_id, "Name allocated");

        Ok(Reservation {
            store: self.clone(),
            filename,
            committed: false,
        })
    }

    fn reserve_first_free(&self, candidate: impl Fn(u32) -> String) -> String {
        let mut namespace = self.namespace();
        let mut n = 0;
        let filename = loop {
            let name = candidate(n);
            if !namespace.is_taken(&self.inner.root, &name) {
                break name;
            }
            n += 1;
        };
        namespace.reserved.insert(filename.clone());
        filename
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Write the bytes for a reserved name and record its origin
    pub fn persist(
        &self,
        mut reservation: Reservation,
        bytes: &[u8],
        origin: Origin,
    ) -> Result<Artifact> {
        let artifact = self.commit(&reservation.filename, bytes, origin, true)?;
        reservation.committed = true;
        Ok(artifact)
    }

    /// Atomically write `filename` and record its origin
    ///
    /// Bytes go to a hidden temporary first and are renamed into place, so a
    /// reader sees either the old file, or the complete new one. An existing
    /// file of the same name is replaced.
    ///
    /// # Errors
    /// * `InvalidFilename` - Not a plain filename
    /// * `StorageFailure` - Any write or rename failure (the temporary is removed),
    ///   or the name is reserved by a pending request
    pub fn write_atomic(&self, filename: &str, bytes: &[u8], origin: Origin) -> Result<Artifact> {
        check_plain(filename)?;
        self.commit(filename, bytes, origin, false)
    }

    fn commit(
        &self,
        filename: &str,
        bytes: &[u8],
        origin: Origin,
        owns_reservation: bool,
    ) -> Result<Artifact> {
        let root = &self.inner.root;
        let temp = manifest::stage_temp(root, filename, bytes)?;
        let path = self.path_of(filename);

        let mut namespace = self.namespace();

        if !owns_reservation && namespace.reserved.contains(filename) {
            let _ = fs::remove_file(&temp);
            return Err(VoxError::storage(
                path,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "name is reserved by a pending request",
                ),
            ));
        }

        let existed = path.exists();
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(VoxError::storage(path, e));
        }

        let entry = ManifestEntry {
            origin,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            sha256: sha256_hex(bytes),
        };
        let previous = namespace.manifest.insert(filename, entry.clone());

        if let Err(e) = namespace.manifest.save(root) {
            // Unrecorded files would read back as originals
            match previous {
                Some(previous) => {
                    namespace.manifest.insert(filename, previous);
                }
                None => {
                    namespace.manifest.remove(filename);
                }
            }
            if !existed {
                let _ = fs::remove_file(&path);
            }
            return Err(e);
        }

        if owns_reservation {
            namespace.reserved.remove(filename);
        }
        drop(namespace);

        info!(
            filename = filename,
            size_bytes = entry.size_bytes,
            origin = ?entry.origin,
            "Artifact written"
        );

        Ok(artifact_from(filename, entry))
    }

    /// Store uploaded bytes as a new original
    ///
    /// The requested name is sanitised and made unique (`clip_1.wav`, ...).
    /// Size and extension policy belong to the caller.
    pub fn import_original(&self, requested_name: &str, bytes: &[u8]) -> Result<Artifact> {
        let wanted = sanitize_filename(requested_name)?;
        let filename = self.reserve_first_free(|n| naming::numbered_candidate(&wanted, n));
        let reservation = Reservation {
            store: self.clone(),
            filename,
            committed: false,
        };
        self.persist(reservation, bytes, Origin::Original)
    }

    // ------------------------------------------------------------------
    // Deleting
    // ------------------------------------------------------------------

    /// Delete an artifact, retrying while the file is transiently busy
    ///
    /// Deleting a missing file succeeds. Derived artifacts of a deleted
    /// original are left in place. Returns whether a file was removed.
    ///
    /// # Errors
    /// * `InvalidFilename` - Not a plain filename
    /// * `DeleteFailed` - The file stayed busy for every attempt, or a
    ///   non-transient error occurred
    pub fn delete(&self, filename: &str) -> Result<bool> {
        check_plain(filename)?;
        let path = self.path_of(filename);

        let mut namespace = self.namespace();
        let removed = delete_with_retry(&path, &self.inner.delete_retry, |p| fs::remove_file(p))?;

        if namespace.manifest.remove(filename).is_some() {
            namespace.manifest.save(&self.inner.root)?;
        }
        drop(namespace);

        if removed {
            info!(filename = filename, "Artifact deleted");
        } else {
            debug!(filename = filename, "Delete of missing artifact ignored");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Descriptor of one artifact
    ///
    /// # Errors
    /// * `SourceNotFound` - No such file
    pub fn artifact(&self, filename: &str) -> Result<Artifact> {
        check_plain(filename)?;
        let path = self.path_of(filename);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(not_found(filename)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(filename)),
            Err(e) => return Err(VoxError::storage(path, e)),
        };

        let entry = self.namespace().manifest.get(filename).cloned();
        Ok(describe(filename, &metadata, entry))
    }

    /// Origin of one artifact (untracked files are originals)
    pub fn origin_of(&self, filename: &str) -> Result<Origin> {
        Ok(self.artifact(filename)?.origin)
    }

    /// True if `filename` exists in the namespace
    pub fn exists(&self, filename: &str) -> bool {
        check_plain(filename).is_ok() && self.path_of(filename).is_file()
    }

    /// Open an artifact for streaming
    pub fn open_file(&self, filename: &str) -> Result<fs::File> {
        check_plain(filename)?;
        let path = self.path_of(filename);
        fs::File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(filename),
            _ => VoxError::storage(path, e),
        })
    }

    /// Read a whole artifact into memory
    pub fn read(&self, filename: &str) -> Result<Vec<u8>> {
        check_plain(filename)?;
        let path = self.path_of(filename);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(filename),
            _ => VoxError::storage(path, e),
        })
    }

    /// All audio artifacts, sorted by filename
    ///
    /// Hidden files (manifest, temporaries) and non-audio files are skipped.
    pub fn list(&self) -> Result<Vec<Artifact>> {
        let manifest = self.namespace().manifest.clone();

        let mut artifacts: Vec<Artifact> = WalkDir::new(&self.inner.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let filename = entry.file_name().to_str()?.to_string();
                if naming::is_hidden(&filename) || AudioFormat::from_filename(&filename).is_err() {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                let record = manifest.get(&filename).cloned();
                Some(describe(&filename, &metadata, record))
            })
            .collect();

        artifacts.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(artifacts)
    }
}

fn not_found(filename: &str) -> VoxError {
    VoxError::SourceNotFound {
        filename: filename.to_string(),
    }
}

fn artifact_from(filename: &str, entry: ManifestEntry) -> Artifact {
    Artifact {
        filename: filename.to_string(),
        origin: entry.origin,
        size_bytes: entry.size_bytes,
        created_at: entry.created_at,
        sha256: Some(entry.sha256),
    }
}

/// Descriptor from file metadata, preferring recorded details
fn describe(filename: &str, metadata: &fs::Metadata, entry: Option<ManifestEntry>) -> Artifact {
    match entry {
        Some(entry) => Artifact {
            size_bytes: metadata.len(),
            ..artifact_from(filename, entry)
        },
        None => Artifact {
            filename: filename.to_string(),
            origin: Origin::Original,
            size_bytes: metadata.len(),
            created_at: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
            sha256: None,
        },
    }
}

/// Remove `.part` files left by a write that never reached its rename
fn remove_stale_temporaries(root: &Path) {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        let name = entry.file_name().to_string_lossy();
        if naming::is_hidden(&name) && name.ends_with(".part") {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(path = %entry.path().display(), "Stale temporary removed"),
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Cannot remove stale temporary"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::thread;
    use tempfile::tempdir;

    fn derived(source: &str, effect: &str) -> Origin {
        Origin::Derived {
            source_filename: source.to_string(),
            effect_id: effect.to_string(),
        }
    }

    #[test]
    fn test_allocate_name_skips_taken_names() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();

        let first = store.allocate_name("clip.wav", "robotic").unwrap();
        assert_eq!(first.filename(), "clip_robotic.wav");
        store.persist(first, b"one", derived("clip.wav", "robotic")).unwrap();

        let second = store.allocate_name("clip.wav", "robotic").unwrap();
        assert_eq!(second.filename(), "clip_robotic_1.wav");
        let third = store.allocate_name("clip.wav", "robotic").unwrap();
        assert_eq!(third.filename(), "clip_robotic_2.wav");
    }

    #[test]
    fn test_dropped_reservation_frees_name() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();

        let reservation = store.allocate_name("clip", "male").unwrap();
        assert_eq!(reservation.filename(), "clip_male.wav");
        drop(reservation);

        let again = store.allocate_name("clip", "male").unwrap();
        assert_eq!(again.filename(), "clip_male.wav");
        assert!(!dir.path().join("clip_male.wav").exists());
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.allocate_name("clip.wav", "baby").unwrap())
            })
            .collect();
        let reservations: Vec<Reservation> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let names: HashSet<&str> = reservations.iter().map(|r| r.filename()).collect();
        assert_eq!(names.len(), 16);
    }

    #[test]
    fn test_persist_records_origin() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();

        let reservation = store.allocate_name("clip.wav", "female").unwrap();
        let artifact = store
            .persist(reservation, b"RIFFdata", derived("clip.wav", "female"))
            .unwrap();

        assert_eq!(artifact.filename, "clip_female.wav");
        assert_eq!(artifact.size_bytes, 8);
        assert_eq!(artifact.sha256.as_deref(), Some(sha256_hex(b"RIFFdata").as_str()));
        assert_eq!(store.read("clip_female.wav").unwrap(), b"RIFFdata");

        // A fresh handle sees the same origin through the manifest
        let reopened = ArtifactStore::open_dir(dir.path()).unwrap();
        assert_eq!(
            reopened.origin_of("clip_female.wav").unwrap(),
            derived("clip.wav", "female")
        );
    }

    #[test]
    fn test_write_atomic_leaves_no_temporaries() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        store.write_atomic("take.wav", b"abc", Origin::Original).unwrap();

        let hidden: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".part"))
            .collect();
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_write_atomic_respects_reservations() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        let _held = store.allocate_name("clip", "robotic").unwrap();

        let err = store
            .write_atomic("clip_robotic.wav", b"x", Origin::Original)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert!(!dir.path().join("clip_robotic.wav").exists());
    }

    #[test]
    fn test_import_original_resolves_collisions() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();

        let first = store.import_original("my voice.wav", b"a").unwrap();
        let second = store.import_original("../my voice.wav", b"b").unwrap();

        assert_eq!(first.filename, "my_voice.wav");
        assert_eq!(second.filename, "my_voice_1.wav");
        assert!(second.origin.is_original());
        assert_eq!(
            store.import_original(".hidden.wav", b"c").unwrap_err().kind(),
            ErrorKind::InvalidFilename
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        store.import_original("clip.wav", b"a").unwrap();

        assert!(store.delete("clip.wav").unwrap());
        assert!(!store.delete("clip.wav").unwrap());
        assert!(!dir.path().join("clip.wav").exists());
        assert_eq!(
            store.artifact("clip.wav").unwrap_err().kind(),
            ErrorKind::SourceNotFound
        );
    }

    #[test]
    fn test_delete_original_keeps_derived() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        store.import_original("clip.wav", b"a").unwrap();
        let reservation = store.allocate_name("clip.wav", "male").unwrap();
        store
            .persist(reservation, b"b", derived("clip.wav", "male"))
            .unwrap();

        store.delete("clip.wav").unwrap();

        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].origin, derived("clip.wav", "male"));
    }

    #[test]
    fn test_list_skips_hidden_and_foreign_files() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        store.import_original("b.wav", b"bb").unwrap();
        store.import_original("a.mp3", b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("untracked.wav"), b"xyz").unwrap();

        let listed = store.list().unwrap();
        let names: Vec<&str> = listed.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "b.wav", "untracked.wav"]);

        let untracked = &listed[2];
        assert!(untracked.origin.is_original());
        assert_eq!(untracked.size_bytes, 3);
        assert_eq!(untracked.sha256, None);
    }

    #[test]
    fn test_open_prunes_and_cleans_up() {
        let dir = tempdir().unwrap();
        {
            let store = ArtifactStore::open_dir(dir.path()).unwrap();
            store.import_original("clip.wav", b"a").unwrap();
        }
        fs::remove_file(dir.path().join("clip.wav")).unwrap();
        fs::write(dir.path().join(".clip_male.wav.0000.part"), b"half").unwrap();

        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(!dir.path().join(".clip_male.wav.0000.part").exists());
        assert!(Manifest::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_lookups_reject_path_traversal() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open_dir(dir.path()).unwrap();
        assert_eq!(
            store.read("../secret.wav").unwrap_err().kind(),
            ErrorKind::InvalidFilename
        );
        assert_eq!(
            store.delete(MANIFEST_FILE).unwrap_err().kind(),
            ErrorKind::InvalidFilename
        );
    }
}
