use super::*;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn unknown_key_misses() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;
    assert_eq!(engine.get("nope")?, None);

    engine.put("a", b"1".to_vec())?;
    engine.force_flush()?;
    assert_eq!(engine.get("nope")?, None);
    assert_eq!(engine.cache_len(), 0);
    Ok(())
}

#[test]
fn get_from_sstable_populates_cache() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    engine.put("k", b"v".to_vec())?;
    // memtable hits do not touch the cache
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v"));
    assert_eq!(engine.cache_len(), 0);

    engine.force_flush()?;
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v"));
    assert_eq!(engine.cache_len(), 1);
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v"));
    assert_eq!(engine.cache_len(), 1);
    Ok(())
}

#[test]
fn put_invalidates_cached_value() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    engine.put("k", b"v1".to_vec())?;
    engine.force_flush()?;
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v1"));

    engine.put("k", b"v2".to_vec())?;
    engine.force_flush()?;
    assert_eq!(engine.cache_len(), 0);
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v2"));
    Ok(())
}

#[test]
fn delete_evicts_cached_value() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    engine.put("k", b"v".to_vec())?;
    engine.force_flush()?;
    assert!(engine.get("k")?.is_some());
    assert_eq!(engine.cache_len(), 1);

    assert!(engine.delete("k")?);
    assert_eq!(engine.cache_len(), 0);
    engine.force_flush()?;
    assert_eq!(engine.get("k")?, None);
    Ok(())
}

#[test]
fn memtable_tombstone_shadows_sstable() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    engine.put("k", b"v".to_vec())?;
    engine.force_flush()?;
    assert!(engine.delete("k")?);

    assert_eq!(engine.get("k")?, None);
    assert_eq!(engine.sstable_count(), 1);
    Ok(())
}

#[test]
fn newer_table_tombstone_shadows_older_table() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    engine.put("k", b"v".to_vec())?;
    engine.put("other", b"x".to_vec())?;
    engine.force_flush()?;
    assert!(engine.delete("k")?);
    engine.force_flush()?;

    assert_eq!(engine.level_table_counts()[0], 2);
    assert_eq!(engine.get("k")?, None);
    assert_eq!(get_str(&engine, "other").as_deref(), Some("x"));
    Ok(())
}

#[test]
fn greatest_timestamp_wins_across_levels() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()).with_levels(3, 2))?;

    engine.put("k", b"v1".to_vec())?;
    engine.force_flush()?;
    engine.put("k", b"v2".to_vec())?;
    engine.force_flush()?;
    // L0 reached 2 tables and merged into L1
    assert_eq!(engine.level_table_counts(), [0, 1, 0]);

    engine.put("k", b"v3".to_vec())?;
    engine.force_flush()?;
    assert_eq!(engine.level_table_counts(), [1, 1, 0]);
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v3"));
    Ok(())
}

#[test]
fn many_keys_across_many_tables() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(with_limit(dir.path(), 8).with_segment_size(50))?;

    for i in 0..200 {
        engine.put(&format!("key{:03}", i), format!("v{}", i).into_bytes())?;
    }
    for i in (0..200).step_by(3) {
        assert!(engine.delete(&format!("key{:03}", i))?);
    }
    assert!(engine.sstable_count() > 0);

    for i in 0..200 {
        let got = get_str(&engine, &format!("key{:03}", i));
        if i % 3 == 0 {
            assert_eq!(got, None, "key{:03} should be deleted", i);
        } else {
            assert_eq!(got, Some(format!("v{}", i)));
        }
    }
    Ok(())
}

#[test]
fn corrupted_value_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    engine.put("k", b"hello".to_vec())?;
    engine.force_flush()?;

    let data = engine.levels().level(0)[0].paths().data().to_path_buf();
    let mut bytes = fs::read(&data)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&data, bytes)?;

    assert!(engine.get("k").is_err());
    Ok(())
}

#[test]
fn verify_sstables_reports_every_table() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = Engine::open(config(dir.path()))?;

    for round in 0..3 {
        engine.put(&format!("k{}", round), b"v".to_vec())?;
        engine.force_flush()?;
    }
    let report = engine.verify_sstables()?;
    assert_eq!(report.len(), 3);
    assert!(report.iter().all(|(_, ok)| *ok));
    Ok(())
}
