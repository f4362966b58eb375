//! Crash-recovery behavior across real reopen cycles.

use parley_crypto::IdHash;
use parley_store::{ObjectStore, StoreError};
use parley_types::{ChatMessage, Clob, Object, Person, Unversioned as _};
use tempfile::TempDir;

fn message(text: &str) -> Object {
    ChatMessage {
        author: IdHash([1u8; 32]),
        text: text.into(),
        attachments: vec![],
        source: None,
    }
    .into_object()
}

#[test]
fn torn_tail_record_is_dropped_and_the_log_heals() {
    let dir = TempDir::new().unwrap();
    let keep;
    {
        let store = ObjectStore::open(dir.path()).unwrap();
        keep = store.put_unversioned(message("keep me")).unwrap();
        store.put_unversioned(message("torn away")).unwrap();
    }

    // Crash mid-write: cut the last record short.
    let segment = dir.path().join("objects").join("seg-00000.log");
    let bytes = std::fs::read(&segment).unwrap();
    std::fs::write(&segment, &bytes[..bytes.len() - 5]).unwrap();

    let store = ObjectStore::open(dir.path()).unwrap();
    assert!(store.get(&keep).unwrap().is_some());
    assert_eq!(store.object_count(), 1);

    // The healed log accepts new writes.
    let fresh = store.put_unversioned(message("after recovery")).unwrap();
    assert!(store.get(&fresh).unwrap().is_some());
}

#[test]
fn rewritten_rmap_matches_the_original_after_damage() {
    let dir = TempDir::new().unwrap();
    let payload;
    let referrer;
    {
        let store = ObjectStore::open(dir.path()).unwrap();
        payload = store.put_unversioned(message("payload")).unwrap();
        referrer = store
            .put_unversioned(
                parley_types::ChannelEntry { payload, previous: None, timestamp: 3 }.into_object(),
            )
            .unwrap();
    }

    // Scribble over the reverse-map segment; the sidecar now disagrees.
    let rmap = dir.path().join("rmap").join("seg-00000.rmap");
    let mut bytes = std::fs::read(&rmap).unwrap();
    for byte in bytes.iter_mut().take(16) {
        *byte ^= 0xff;
    }
    std::fs::write(&rmap, &bytes).unwrap();

    let store = ObjectStore::open(dir.path()).unwrap();
    assert_eq!(store.reverse_refs(&payload), vec![referrer]);
}

#[test]
fn missing_version_index_is_rebuilt_from_the_log() {
    let dir = TempDir::new().unwrap();
    let id;
    let head;
    {
        let store = ObjectStore::open(dir.path()).unwrap();
        store
            .put_versioned(Object::Person(Person { email: "a@x".into(), name: "A".into() }))
            .unwrap();
        let (got_id, got_head) = store
            .put_versioned(Object::Person(Person { email: "a@x".into(), name: "A two".into() }))
            .unwrap();
        id = got_id;
        head = got_head;
    }

    std::fs::remove_file(dir.path().join("versions.idx")).unwrap();

    let store = ObjectStore::open(dir.path()).unwrap();
    assert_eq!(store.head_of(&id), Some(head));
}

#[test]
fn damage_beyond_the_tail_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    {
        let store = ObjectStore::open(dir.path()).unwrap();
        store.put_unversioned(message("first")).unwrap();
        store.put_unversioned(message("second")).unwrap();
    }

    // Flip a byte inside the FIRST record; tail recovery cannot explain
    // that away.
    let segment = dir.path().join("objects").join("seg-00000.log");
    let mut bytes = std::fs::read(&segment).unwrap();
    bytes[6] ^= 0xff;
    std::fs::write(&segment, &bytes).unwrap();

    match ObjectStore::open(dir.path()) {
        Err(StoreError::Fatal(_)) => {}
        other => panic!("expected fatal fault, got {other:?}"),
    }
}

#[test]
fn store_size_is_stable_under_duplicate_writes_across_reopen() {
    let dir = TempDir::new().unwrap();
    let first;
    {
        let store = ObjectStore::open(dir.path()).unwrap();
        first = store.put_unversioned(Clob { text: "same".into() }.into_object()).unwrap();
    }
    let size_on_disk = std::fs::metadata(dir.path().join("objects").join("seg-00000.log"))
        .unwrap()
        .len();

    let store = ObjectStore::open(dir.path()).unwrap();
    let second = store.put_unversioned(Clob { text: "same".into() }.into_object()).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        std::fs::metadata(dir.path().join("objects").join("seg-00000.log")).unwrap().len(),
        size_on_disk
    );
}
