//! Semaphore set lifecycle tests.
//!
//! These tests verify that:
//! - Keys rendezvous independent handles on one set
//! - Deletion is guarded and never touches another key's set
//! - Owning handles release the kernel resource on every exit path

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use tempfile::tempdir;

use semmon::{SemError, SemKey, SemaphoreSet};

fn unique_key(tag: &str) -> SemKey {
    SemKey::from_name(&format!("semmon-{tag}-{}", uuid::Uuid::new_v4()))
}

#[test]
fn handles_opened_by_key_share_state() {
    let key = unique_key("share");
    let owner = Arc::new(SemaphoreSet::create(key, &[0]).unwrap());
    let (tx, rx) = bounded::<()>(1);

    let peer = thread::spawn(move || {
        let set = SemaphoreSet::open(key, 1).unwrap();
        set.wait(0).unwrap();
        tx.send(()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    owner.signal(0).unwrap();
    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    peer.join().unwrap();
}

#[test]
fn path_derived_keys_rendezvous() {
    let dir = tempdir().unwrap();
    let key_a = SemKey::from_path(dir.path(), 7).unwrap();
    let key_b = SemKey::from_path(dir.path(), 7).unwrap();
    assert_eq!(key_a, key_b);
    let _ = SemaphoreSet::remove_existing(key_a);

    let owner = SemaphoreSet::create(key_a, &[5]).unwrap();
    let peer = SemaphoreSet::open(key_b, 1).unwrap();
    assert_eq!(peer.value(0).unwrap(), 5);
    owner.delete().unwrap();
}

#[test]
fn double_delete_leaves_other_keys_alone() {
    let doomed = SemaphoreSet::create(unique_key("doomed"), &[1]).unwrap();
    let survivor = SemaphoreSet::create(unique_key("survivor"), &[3]).unwrap();

    doomed.delete().unwrap();
    doomed.delete().unwrap();
    drop(doomed);

    assert_eq!(survivor.value(0).unwrap(), 3);
    survivor.signal(0).unwrap();
    assert_eq!(survivor.value(0).unwrap(), 4);
}

#[test]
fn delete_after_peer_removed_set_is_a_warning() {
    let key = unique_key("peer-removed");
    let owner = SemaphoreSet::create(key, &[1]).unwrap();
    let peer = SemaphoreSet::open(key, 1).unwrap();

    peer.delete().unwrap();
    let err = owner.delete().unwrap_err();
    assert!(matches!(err, SemError::Cleanup { .. }));
    // Dropping the owner afterwards does not retry.
    drop(owner);
}

#[test]
fn dropping_owner_releases_the_key() {
    let key = unique_key("drop");
    {
        let _set = SemaphoreSet::create(key, &[1, 1]).unwrap();
        let err = SemaphoreSet::create(key, &[1, 1]).unwrap_err();
        assert!(err.is_already_exists());
    }

    let err = SemaphoreSet::open(key, 2).unwrap_err();
    assert!(matches!(err, SemError::Open { .. }));
    SemaphoreSet::create(key, &[1, 1]).unwrap();
}

#[test]
fn unwinding_releases_the_key() {
    let key = unique_key("panic");
    let result = thread::spawn(move || {
        let _set = SemaphoreSet::create(key, &[1]).unwrap();
        panic!("scenario aborted");
    })
    .join();
    assert!(result.is_err());

    assert!(SemaphoreSet::open(key, 1).is_err());
}

#[test]
fn remove_existing_reclaims_leaked_set() {
    let key = unique_key("leak");
    let leaked = SemaphoreSet::create(key, &[1]).unwrap();
    std::mem::forget(leaked);

    assert!(SemaphoreSet::create(key, &[1]).unwrap_err().is_already_exists());
    assert!(SemaphoreSet::remove_existing(key).unwrap());
    assert!(!SemaphoreSet::remove_existing(key).unwrap());
    SemaphoreSet::create(key, &[1]).unwrap();
}

#[test]
fn open_rejects_larger_count_than_created() {
    let key = unique_key("count");
    let _owner = SemaphoreSet::create(key, &[1, 1]).unwrap();
    assert!(SemaphoreSet::open(key, 3).is_err());
    assert!(matches!(
        SemaphoreSet::open(key, 0),
        Err(SemError::InvalidCount { count: 0, .. })
    ));
}
