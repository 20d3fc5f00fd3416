//! End-to-end scenarios exercising `Engine` as a whole: registration,
//! ordered scans, structural splits/merges, persistence across restarts,
//! and concurrent access.

use std::sync::Arc;
use swiptree::{Config, Engine, StorageError, TreeOptions};

fn engine_in(dir: &std::path::Path) -> Arc<Engine> {
    let config = Config {
        ssd_path: dir.to_str().unwrap().to_string(),
        page_size: 4096,
        ram_budget_bytes: 4096 * 64,
        pp_threads: 2,
        ..Config::default()
    };
    Engine::open(config).unwrap()
}

#[test]
fn empty_tree_then_one_insert_then_probe() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine.register("t1", TreeOptions::default()).unwrap();

    assert_eq!(engine.lookup("t1", b"missing").unwrap(), None);

    engine.insert("t1", b"only-key", b"only-value").unwrap();
    assert_eq!(
        engine.lookup("t1", b"only-key").unwrap(),
        Some(b"only-value".to_vec())
    );
    assert_eq!(engine.lookup("t1", b"other-key").unwrap(), None);
}

#[test]
fn ordered_scan_of_one_hundred_keys() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine.register("t1", TreeOptions::default()).unwrap();

    for i in 0..100 {
        let key = format!("k{i:02}");
        let val = format!("v{i:02}");
        engine.insert("t1", key.as_bytes(), val.as_bytes()).unwrap();
    }

    let mut seen = Vec::new();
    engine
        .scan_asc("t1", b"", &mut |k: &[u8], v: &[u8]| {
            seen.push((k.to_vec(), v.to_vec()));
            true
        })
        .unwrap();

    assert_eq!(seen.len(), 100);
    for i in 0..100 {
        let key = format!("k{i:02}");
        let val = format!("v{i:02}");
        assert_eq!(seen[i].0, key.as_bytes());
        assert_eq!(seen[i].1, val.as_bytes());
    }

    let mut reversed = Vec::new();
    engine
        .scan_desc("t1", b"k99\xff", &mut |k: &[u8], v: &[u8]| {
            reversed.push((k.to_vec(), v.to_vec()));
            true
        })
        .unwrap();
    reversed.reverse();
    assert_eq!(reversed, seen);
}

#[test]
fn force_split_with_two_hundred_keys_grows_height() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine.register("t1", TreeOptions::default()).unwrap();

    for i in 0..200 {
        let key = format!("key-{i:05}");
        let val = vec![b'x'; 64];
        engine.insert("t1", key.as_bytes(), &val).unwrap();
    }

    let tree = engine.retrieve("t1").unwrap();
    assert!(
        tree.debug_height().unwrap() >= 2,
        "expected at least one split to have occurred"
    );

    for i in 0..200 {
        let key = format!("key-{i:05}");
        assert!(engine.lookup("t1", key.as_bytes()).unwrap().is_some());
    }
}

#[test]
fn removing_odd_keys_merges_underfull_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine.register("t1", TreeOptions::default()).unwrap();

    for i in 0..200 {
        let key = format!("key-{i:05}");
        engine.insert("t1", key.as_bytes(), b"v").unwrap();
    }

    for i in (1..200).step_by(2) {
        let key = format!("key-{i:05}");
        engine.remove("t1", key.as_bytes()).unwrap();
    }

    for i in 0..200 {
        let key = format!("key-{i:05}");
        let present = engine.lookup("t1", key.as_bytes()).unwrap().is_some();
        assert_eq!(present, i % 2 == 0, "key {i} presence mismatch");
    }

    // Removing an already-removed key is a clean not-found error, not a
    // leftover-merge artifact.
    assert!(matches!(
        engine.remove("t1", b"key-00001"),
        Err(StorageError::NotFound)
    ));
}

#[test]
fn persist_and_restore_recovers_three_trees() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = engine_in(dir.path());
        engine.register("t1", TreeOptions::default()).unwrap();
        engine.register("t2", TreeOptions::default()).unwrap();
        engine.register("t3", TreeOptions::default()).unwrap();

        for i in 0..50 {
            let key = format!("t1-{i}");
            engine.insert("t1", key.as_bytes(), b"v1").unwrap();
        }
        for i in 0..50 {
            let key = format!("t2-{i}");
            engine.insert("t2", key.as_bytes(), b"v2").unwrap();
        }
        engine.insert("t3", b"only", b"v3").unwrap();

        engine.persist().unwrap();
    }

    let engine = engine_in(dir.path());
    for i in 0..50 {
        let key = format!("t1-{i}");
        assert_eq!(engine.lookup("t1", key.as_bytes()).unwrap(), Some(b"v1".to_vec()));
    }
    for i in 0..50 {
        let key = format!("t2-{i}");
        assert_eq!(engine.lookup("t2", key.as_bytes()).unwrap(), Some(b"v2".to_vec()));
    }
    assert_eq!(engine.lookup("t3", b"only").unwrap(), Some(b"v3".to_vec()));
}

#[test]
fn concurrent_readers_and_a_writer_see_a_consistent_tree() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine.register("t1", TreeOptions::default()).unwrap();

    const TOTAL: usize = 10_000;

    let writer_engine = engine.clone();
    let writer = std::thread::spawn(move || {
        for i in 0..TOTAL {
            let key = format!("w-{i:06}");
            writer_engine.insert("t1", key.as_bytes(), b"v").unwrap();
        }
    });

    let mut readers = Vec::new();
    for _ in 0..4 {
        let reader_engine = engine.clone();
        readers.push(std::thread::spawn(move || {
            for _ in 0..200 {
                // Keys may or may not exist yet depending on writer
                // progress; the only requirement is that lookups never
                // panic, error spuriously, or return corrupted values.
                let probe = format!("w-{:06}", 42);
                if let Ok(Some(v)) = reader_engine.lookup("t1", probe.as_bytes()) {
                    assert_eq!(v, b"v");
                }
            }
        }));
    }

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    for i in 0..TOTAL {
        let key = format!("w-{i:06}");
        assert_eq!(engine.lookup("t1", key.as_bytes()).unwrap(), Some(b"v".to_vec()));
    }
}
