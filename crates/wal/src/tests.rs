use super::*;
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn put(key: &str, value: &str, ts: i64) -> Record {
    Record::put(key, value.as_bytes().to_vec(), ts)
}

fn keys(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.key()).collect()
}

fn segment_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

// -------------------- Basic write & replay --------------------

#[test]
fn open_creates_first_segment() -> Result<()> {
    let dir = tempdir()?;
    let wal = Wal::open(dir.path().join("wal"), 5, true)?;

    assert_eq!(wal.segment_count(), 1);
    assert!(segment_path(wal.dir(), 1).exists());
    assert!(wal.replay()?.is_empty());
    Ok(())
}

#[test]
fn append_and_replay_in_order() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 5, true)?;
    wal.append(&put("k1", "v1", 1))?;
    wal.append(&Record::tombstone("k1", 2))?;
    wal.append(&put("k2", "v2", 3))?;

    let recs = wal.replay()?;
    assert_eq!(keys(&recs), ["k1", "k1", "k2"]);
    assert!(recs[1].is_tombstone());
    assert_eq!(recs[2].value(), b"v2");
    Ok(())
}

#[test]
fn reopen_continues_current_segment() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut wal = Wal::open(dir.path(), 3, false)?;
        wal.append(&put("a", "1", 1))?;
        wal.append(&put("b", "2", 2))?;
    }

    let mut wal = Wal::open(dir.path(), 3, false)?;
    assert_eq!(wal.records_in_current_segment(), 2);
    wal.append(&put("c", "3", 3))?;
    assert_eq!(wal.segment_count(), 1);
    wal.append(&put("d", "4", 4))?;
    assert_eq!(wal.segment_count(), 2);

    assert_eq!(keys(&wal.replay()?), ["a", "b", "c", "d"]);
    Ok(())
}

// -------------------- Segmentation --------------------

#[test]
fn rotates_when_segment_is_full() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 2, false)?;
    for i in 0..5 {
        wal.append(&put(&format!("k{}", i), "v", i))?;
    }

    assert_eq!(wal.segment_count(), 3);
    assert_eq!(wal.records_in_current_segment(), 1);
    assert_eq!(
        segment_files(dir.path()),
        ["wal_1.log", "wal_2.log", "wal_3.log"]
    );
    assert_eq!(keys(&wal.replay()?), ["k0", "k1", "k2", "k3", "k4"]);
    Ok(())
}

#[test]
fn replay_orders_segments_numerically() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 1, false)?;
    for i in 0..12 {
        wal.append(&put(&format!("k{:02}", i), "v", i))?;
    }
    // wal_10.log sorts before wal_2.log lexically
    let replayed = wal.replay()?;
    let expected: Vec<String> = (0..12).map(|i| format!("k{:02}", i)).collect();
    assert_eq!(keys(&replayed), expected);
    Ok(())
}

#[test]
fn truncate_all_resets_to_segment_one() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 2, false)?;
    for i in 0..5 {
        wal.append(&put(&format!("k{}", i), "v", i))?;
    }

    wal.truncate_all()?;
    assert_eq!(wal.segment_count(), 1);
    assert_eq!(segment_files(dir.path()), ["wal_1.log"]);
    assert!(wal.replay()?.is_empty());

    wal.append(&put("fresh", "v", 10))?;
    assert_eq!(keys(&wal.replay()?), ["fresh"]);
    Ok(())
}

// -------------------- Corruption detection --------------------

#[test]
fn crc_mismatch_is_corruption() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 5, true)?;
    wal.append(&put("k", "value", 1))?;

    let path = segment_path(dir.path(), 1);
    let mut data = fs::read(&path)?;
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data)?;

    let err = wal.replay().unwrap_err();
    assert!(matches!(
        err,
        WalError::Corrupt {
            source: RecordError::ChecksumMismatch { .. },
            ..
        }
    ));
    Ok(())
}

#[test]
fn truncated_tail_of_last_segment_is_tolerated() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 5, true)?;
    wal.append(&put("k1", "v1", 1))?;
    wal.append(&put("k2", "v2", 2))?;

    let path = segment_path(dir.path(), 1);
    let mut data = fs::read(&path)?;
    data.extend_from_slice(&put("k3", "v3", 3).encode()[..10]);
    fs::write(&path, &data)?;

    assert_eq!(keys(&wal.replay()?), ["k1", "k2"]);
    Ok(())
}

#[test]
fn truncated_record_in_earlier_segment_is_corruption() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 1, true)?;
    wal.append(&put("k1", "v1", 1))?;
    wal.append(&put("k2", "v2", 2))?;

    let path = segment_path(dir.path(), 1);
    let data = fs::read(&path)?;
    fs::write(&path, &data[..data.len() - 1])?;

    let err = wal.replay().unwrap_err();
    assert!(matches!(
        err,
        WalError::Corrupt {
            source: RecordError::Truncated,
            ..
        }
    ));
    Ok(())
}

#[test]
fn reopen_cuts_torn_tail_before_appending() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut wal = Wal::open(dir.path(), 5, true)?;
        wal.append(&put("k1", "v1", 1))?;
    }
    let path = segment_path(dir.path(), 1);
    let mut data = fs::read(&path)?;
    let good_len = data.len();
    data.extend_from_slice(&[1, 2, 3]);
    fs::write(&path, &data)?;

    let mut wal = Wal::open(dir.path(), 5, true)?;
    assert_eq!(fs::metadata(&path)?.len(), good_len as u64);
    wal.append(&put("k2", "v2", 2))?;
    assert_eq!(keys(&wal.replay()?), ["k1", "k2"]);
    Ok(())
}

// -------------------- Edge cases --------------------

#[test]
fn empty_value_and_sync_to_disk() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 5, false)?;
    wal.append(&put("k", "", 1))?;
    wal.sync_to_disk()?;

    let recs = wal.replay()?;
    assert!(recs[0].value().is_empty());
    assert!(!recs[0].is_tombstone());
    Ok(())
}

#[test]
fn ignores_unrelated_files() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("notes.txt"), b"hello")?;
    fs::write(dir.path().join("wal_x.log"), b"junk")?;

    let mut wal = Wal::open(dir.path(), 5, false)?;
    wal.append(&put("k", "v", 1))?;
    assert_eq!(keys(&wal.replay()?), ["k"]);
    Ok(())
}

#[test]
#[should_panic(expected = "segment_size must be > 0")]
fn zero_segment_size_panics() {
    let dir = tempdir().unwrap();
    let _ = Wal::open(dir.path(), 0, false);
}

// -------------------- Stress tests --------------------

#[test]
fn many_records_across_many_segments() -> Result<()> {
    let dir = tempdir()?;
    let mut wal = Wal::open(dir.path(), 7, false)?;
    for i in 0..500 {
        wal.append(&put(&format!("key{}", i), &"x".repeat(i as usize % 50), i))?;
    }
    assert_eq!(wal.segment_count(), 72);
    assert_eq!(wal.segment_paths()?.len(), 72);

    let recs = wal.replay()?;
    assert_eq!(recs.len(), 500);
    assert!(recs.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
    Ok(())
}
