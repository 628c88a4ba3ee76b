//! Storage Tests
//!
//! Artifact namespace behaviour seen from outside the crate: naming under
//! contention, atomic writes, retrying deletes.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::{Arc, Barrier};
use std::thread;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use voxshift::config::{RetryPolicy, StorageConfig};
use voxshift::storage::{delete_with_retry, Reservation, MANIFEST_FILE};
use voxshift::{ArtifactStore, ErrorKind, Origin};

fn store_at(root: &std::path::Path) -> ArtifactStore {
    ArtifactStore::open(&StorageConfig {
        root: root.to_path_buf(),
        delete_retry: RetryPolicy::immediate(5),
    })
    .unwrap()
}

#[test]
fn test_concurrent_allocations_never_collide() {
    let dir = tempdir().unwrap();
    let store = store_at(dir.path());
    store.import_original("clip.wav", b"RIFF").unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let reservation = store.allocate_name("clip.wav", "robotic").unwrap();
                // Half the callers write, half give their name back
                if i % 2 == 0 {
                    let filename = reservation.filename().to_string();
                    store
                        .persist(
                            reservation,
                            filename.as_bytes(),
                            Origin::Derived {
                                source_filename: "clip.wav".to_string(),
                                effect_id: "robotic".to_string(),
                            },
                        )
                        .unwrap();
                    Some(filename)
                } else {
                    None
                }
            })
        })
        .collect();

    let written: Vec<String> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    let unique: HashSet<&String> = written.iter().collect();
    assert_eq!(unique.len(), 4);

    // Every written file holds exactly the bytes of its own request
    for filename in &written {
        assert_eq!(store.read(filename).unwrap(), filename.as_bytes());
    }
}

#[test]
fn test_reservations_are_held_until_dropped() {
    let dir = tempdir().unwrap();
    let store = store_at(dir.path());

    let held: Vec<Reservation> = (0..3)
        .map(|_| store.allocate_name("take", "female").unwrap())
        .collect();
    let names: Vec<&str> = held.iter().map(|r| r.filename()).collect();
    assert_eq!(
        names,
        vec!["take_female.wav", "take_female_1.wav", "take_female_2.wav"]
    );

    drop(held);
    assert_eq!(
        store.allocate_name("take", "female").unwrap().filename(),
        "take_female.wav"
    );
}

#[test]
fn test_user_file_named_like_a_derived_artifact_is_original() {
    let dir = tempdir().unwrap();
    let store = store_at(dir.path());

    let uploaded = store.import_original("song_robotic.wav", b"RIFF").unwrap();
    assert!(store.origin_of(&uploaded.filename).unwrap().is_original());

    // And the real derived artifact steps around it
    let reservation = store.allocate_name("song.wav", "robotic").unwrap();
    assert_eq!(reservation.filename(), "song_robotic_1.wav");
}

#[test]
fn test_manifest_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = store_at(dir.path());
        store.import_original("clip.wav", b"one").unwrap();
        let reservation = store.allocate_name("clip.wav", "baby").unwrap();
        store
            .persist(
                reservation,
                b"two",
                Origin::Derived {
                    source_filename: "clip.wav".to_string(),
                    effect_id: "baby".to_string(),
                },
            )
            .unwrap();
    }
    assert!(dir.path().join(MANIFEST_FILE).exists());

    let store = store_at(dir.path());
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].filename, "clip.wav");
    assert_eq!(
        listed[1].origin,
        Origin::Derived {
            source_filename: "clip.wav".to_string(),
            effect_id: "baby".to_string(),
        }
    );
}

#[test]
fn test_busy_file_is_deleted_after_retries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("playing.wav");
    fs::write(&path, b"RIFF").unwrap();

    let mut attempts = 0;
    let removed = delete_with_retry(&path, &RetryPolicy::immediate(5), |p| {
        attempts += 1;
        if attempts <= 2 {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "held by a reader"))
        } else {
            fs::remove_file(p)
        }
    })
    .unwrap();

    assert!(removed);
    assert_eq!(attempts, 3);
    assert!(!path.exists());
}

#[test]
fn test_permanently_busy_file_reports_delete_failed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stuck.wav");
    fs::write(&path, b"RIFF").unwrap();

    let err = delete_with_retry(&path, &RetryPolicy::immediate(3), |_| {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "held by a reader"))
    })
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeleteFailed);
    assert!(err.is_retryable());
    assert!(path.exists());
}

#[test]
fn test_export_stream_matches_stored_bytes() {
    let dir = tempdir().unwrap();
    let store = store_at(dir.path());
    store.import_original("clip.mp3", b"ID3....").unwrap();

    let mut reader = store.open_file("clip.mp3").unwrap();
    let mut copied = Vec::new();
    io::copy(&mut reader, &mut copied).unwrap();
    assert_eq!(copied, b"ID3....");

    assert_eq!(
        store.open_file("missing.mp3").unwrap_err().kind(),
        ErrorKind::SourceNotFound
    );
}
