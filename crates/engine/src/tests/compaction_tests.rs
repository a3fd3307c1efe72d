use super::*;
use anyhow::Result;
use sstable::{Record, WriteOptions};
use tempfile::{tempdir, TempDir};

fn put(key: &str, ts: i64) -> Record {
    Record::put(key, format!("{}@{}", key, ts).into_bytes(), ts)
}

fn del(key: &str, ts: i64) -> Record {
    Record::tombstone(key, ts)
}

/// A bare level manager: `levels` levels, compaction at `max` tables.
fn manager(levels: usize, max: usize) -> Result<(TempDir, LevelManager)> {
    let dir = tempdir()?;
    let manifest = Manifest::load_or_create(dir.path())?;
    let lm = LevelManager::open(
        &dir.path().join(SSTABLE_DIR),
        manifest,
        levels,
        max,
        WriteOptions::default(),
    )?;
    Ok((dir, lm))
}

fn keys(table: &sstable::SsTable) -> Result<Vec<String>> {
    Ok(table
        .read_records()?
        .iter()
        .map(|r| r.key().to_string())
        .collect())
}

// -------------------- Level movement --------------------

#[test]
fn full_level_moves_merged_table_down() -> Result<()> {
    let (_dir, mut lm) = manager(3, 2)?;

    lm.flush(vec![put("a", 1), put("c", 1)])?;
    assert_eq!(lm.table_counts(), [1, 0, 0]);
    lm.flush(vec![put("b", 2), put("c", 2)])?;
    assert_eq!(lm.table_counts(), [0, 1, 0]);

    let merged = &lm.level(1)[0];
    assert_eq!(merged.level(), 1);
    assert_eq!(keys(merged)?, ["a", "b", "c"]);
    assert_eq!(merged.lookup("c")?.unwrap().timestamp(), 2);
    Ok(())
}

#[test]
fn compaction_cascades() -> Result<()> {
    let (_dir, mut lm) = manager(3, 2)?;
    for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
        lm.flush(vec![put(key, i as i64)])?;
    }
    assert_eq!(lm.table_counts(), [0, 0, 1]);
    assert_eq!(keys(&lm.level(2)[0])?, ["a", "b", "c", "d"]);
    Ok(())
}

#[test]
fn top_level_accumulates() -> Result<()> {
    let (_dir, mut lm) = manager(2, 2)?;
    for i in 0..6 {
        lm.flush(vec![put(&format!("k{}", i), i)])?;
    }
    assert_eq!(lm.table_counts(), [0, 3]);
    Ok(())
}

#[test]
fn compaction_deletes_merged_files() -> Result<()> {
    let (dir, mut lm) = manager(3, 2)?;
    lm.flush(vec![put("a", 1)])?;
    lm.flush(vec![put("b", 2)])?;

    let sst = dir.path().join(SSTABLE_DIR);
    for sub in sstable::SUBDIRS {
        assert_eq!(count_files(&sst.join(sub)), 1, "{} should hold one file", sub);
    }
    Ok(())
}

#[test]
fn manifest_tracks_compaction() -> Result<()> {
    let (dir, mut lm) = manager(3, 2)?;
    for i in 0..3 {
        lm.flush(vec![put(&format!("k{}", i), i)])?;
    }

    let saved = Manifest::load_or_create(dir.path())?;
    assert_eq!(saved.tables(0).len(), 1);
    assert_eq!(saved.tables(1).len(), 1);
    assert_eq!(saved.tables(2).len(), 0);
    assert_eq!(saved.next_index, 5);
    assert_eq!(saved.tables(1)[0], lm.level(1)[0].paths().toc_relative());
    Ok(())
}

// -------------------- Tombstones --------------------

#[test]
fn tombstones_drop_when_nothing_lies_below() -> Result<()> {
    let (dir, mut lm) = manager(3, 2)?;
    lm.flush(vec![put("a", 1), put("b", 1)])?;
    lm.flush(vec![del("a", 2)])?;

    assert_eq!(lm.table_counts(), [0, 1, 0]);
    assert_eq!(keys(&lm.level(1)[0])?, ["b"]);
    assert!(lm.lookup("a")?.is_none());
    assert_eq!(count_files(&dir.path().join(SSTABLE_DIR).join("data")), 1);
    Ok(())
}

#[test]
fn fully_cancelled_merge_forms_no_table() -> Result<()> {
    let (dir, mut lm) = manager(3, 2)?;
    lm.flush(vec![put("a", 1)])?;
    lm.flush(vec![del("a", 2)])?;

    assert_eq!(lm.table_count(), 0);
    assert_eq!(count_files(&dir.path().join(SSTABLE_DIR).join("data")), 0);
    Ok(())
}

#[test]
fn tombstones_survive_while_deeper_levels_hold_data() -> Result<()> {
    let (_dir, mut lm) = manager(3, 2)?;
    for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
        lm.flush(vec![put(key, i as i64 + 1)])?;
    }
    assert_eq!(lm.table_counts(), [0, 0, 1]);

    // L1 is empty but L2 still holds a@1
    lm.flush(vec![del("a", 5)])?;
    lm.flush(vec![put("e", 6)])?;
    assert_eq!(lm.table_counts(), [0, 1, 1]);

    let retained = lm.level(1)[0].read_records()?;
    assert!(retained.iter().any(|r| r.key() == "a" && r.is_tombstone()));
    assert!(lm.lookup("a")?.unwrap().is_tombstone());

    // merging into the non-empty top level keeps the tombstone too
    lm.flush(vec![put("f", 7)])?;
    lm.flush(vec![put("g", 8)])?;
    assert_eq!(lm.table_counts(), [0, 0, 2]);
    let a = lm.lookup("a")?.unwrap();
    assert!(a.is_tombstone());
    assert_eq!(a.timestamp(), 5);
    Ok(())
}

#[test]
fn engine_never_resurrects_deleted_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(with_limit(dir.path(), 1).with_levels(3, 2))?;

    for key in ["a", "b", "c", "d", "e"] {
        engine.put(key, b"old".to_vec())?;
    }
    assert_eq!(engine.level_table_counts(), [0, 0, 1]);

    assert!(engine.delete("a")?);
    for key in ["x", "y", "z", "w"] {
        engine.put(key, b"new".to_vec())?;
    }
    engine.force_flush()?;
    assert_eq!(engine.get("a")?, None);
    assert_eq!(get_str(&engine, "b").as_deref(), Some("old"));
    Ok(())
}

// -------------------- Reads --------------------

#[test]
fn lookup_prefers_greatest_timestamp() -> Result<()> {
    let (_dir, mut lm) = manager(3, 3)?;
    lm.flush(vec![put("k", 5)])?;
    lm.flush(vec![put("k", 9)])?;
    assert_eq!(lm.lookup("k")?.unwrap().timestamp(), 9);
    Ok(())
}

#[test]
fn lookup_tie_goes_to_newer_table() -> Result<()> {
    let (_dir, mut lm) = manager(3, 3)?;
    lm.flush(vec![Record::put("k", b"older".to_vec(), 4)])?;
    lm.flush(vec![Record::put("k", b"newer".to_vec(), 4)])?;
    assert_eq!(lm.lookup("k")?.unwrap().value(), b"newer");
    Ok(())
}

#[test]
fn reopen_restores_tables() -> Result<()> {
    let (dir, mut lm) = manager(3, 2)?;
    for i in 0..3 {
        lm.flush(vec![put(&format!("k{}", i), i)])?;
    }
    let counts = lm.table_counts();
    drop(lm);

    let lm = LevelManager::open(
        &dir.path().join(SSTABLE_DIR),
        Manifest::load_or_create(dir.path())?,
        3,
        2,
        WriteOptions::default(),
    )?;
    assert_eq!(lm.table_counts(), counts);
    assert!(lm.lookup("k0")?.is_some());
    assert!(lm.verify_all()?.iter().all(|(_, ok)| *ok));
    Ok(())
}
