use super::*;
use std::fs;
use tempfile::tempdir;

fn sample() -> Vec<Record> {
    vec![
        put("a", "apple", 1),
        put("b", "banana", 2),
        put("c", "", 3),
        del("d", 4),
    ]
}

// -------------------- Validation --------------------

#[test]
fn empty_input_is_rejected() {
    let dir = tempdir().unwrap();
    let paths = SsTablePaths::new(dir.path(), 0, 1);
    let err = SsTable::form(&[], &paths, WriteOptions::default()).unwrap_err();
    assert!(err.to_string().contains("empty"));
    assert!(!paths.toc().exists());
}

#[test]
fn unsorted_input_is_rejected() {
    let dir = tempdir().unwrap();
    let paths = SsTablePaths::new(dir.path(), 0, 1);
    let recs = vec![put("b", "1", 1), put("a", "2", 2)];
    assert!(SsTable::form(&recs, &paths, WriteOptions::default()).is_err());
}

#[test]
fn duplicate_keys_are_rejected() {
    let dir = tempdir().unwrap();
    let paths = SsTablePaths::new(dir.path(), 0, 1);
    let recs = vec![put("a", "1", 1), put("a", "2", 2)];
    assert!(SsTable::form(&recs, &paths, WriteOptions::default()).is_err());
}

// -------------------- Files on disk --------------------

#[test]
fn form_writes_all_six_files() -> Result<()> {
    let dir = tempdir()?;
    let table = form(dir.path(), 1, &sample())?;

    for file in table.paths().all() {
        assert!(file.exists(), "{:?} should exist", file);
    }
    let data = dir.path().join("data").join("usertable_0_1_data.db");
    let toc = dir.path().join("toc").join("usertable_0_1_toc.txt");
    assert_eq!(table.paths().data(), data.as_path());
    assert_eq!(table.paths().toc(), toc.as_path());
    Ok(())
}

#[test]
fn no_temp_files_left_behind() -> Result<()> {
    let dir = tempdir()?;
    form(dir.path(), 1, &sample())?;

    for sub in SUBDIRS {
        for entry in fs::read_dir(dir.path().join(sub))? {
            let name = entry?.file_name().into_string().unwrap();
            assert!(!name.ends_with(".tmp"), "leftover {}", name);
        }
    }
    Ok(())
}

#[test]
fn data_file_is_concatenated_records() -> Result<()> {
    let dir = tempdir()?;
    let recs = sample();
    let table = form(dir.path(), 1, &recs)?;

    let expected: Vec<u8> = recs.iter().flat_map(|r| r.encode()).collect();
    assert_eq!(fs::read(table.paths().data())?, expected);
    Ok(())
}

#[test]
fn index_file_maps_keys_to_data_offsets() -> Result<()> {
    let dir = tempdir()?;
    let recs = sample();
    let table = form(dir.path(), 1, &recs)?;

    let bytes = fs::read(table.paths().index_file())?;
    let mut r = &bytes[..];
    let mut offset = 0u64;
    for rec in &recs {
        let entry = IndexEntry::read_from(&mut r)?.unwrap();
        assert_eq!(entry, IndexEntry::new(rec.key(), offset));
        offset += rec.encoded_len() as u64;
    }
    assert!(IndexEntry::read_from(&mut r)?.is_none());
    Ok(())
}

#[test]
fn summary_samples_every_interval_plus_last() -> Result<()> {
    let dir = tempdir()?;
    let recs: Vec<Record> = (0..25).map(|i| put(&format!("k{:02}", i), "v", i)).collect();
    let table = form(dir.path(), 1, &recs)?;

    let summary = Summary::read_from(&mut &fs::read(table.paths().summary())?[..])?;
    let sampled: Vec<&str> = summary.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(sampled, ["k00", "k10", "k20", "k24"]);
    assert_eq!(summary.min_key, "k00");
    assert_eq!(summary.max_key, "k24");
    Ok(())
}

#[test]
fn summary_records_greatest_timestamp() -> Result<()> {
    let dir = tempdir()?;
    // key order and timestamp order differ; the tombstone carries the max
    let recs = vec![put("a", "v", 40), del("b", 90), put("c", "v", 15)];
    let table = form(dir.path(), 1, &recs)?;
    assert_eq!(table.max_timestamp(), 90);

    let reopened = SsTable::open(table.paths().clone())?;
    assert_eq!(reopened.max_timestamp(), 90);
    Ok(())
}

#[test]
fn custom_summary_interval() -> Result<()> {
    let dir = tempdir()?;
    let recs: Vec<Record> = (0..7).map(|i| put(&format!("k{}", i), "v", i)).collect();
    let opts = WriteOptions {
        summary_interval: 3,
        ..WriteOptions::default()
    };
    let table = SsTable::form(&recs, &SsTablePaths::new(dir.path(), 2, 9), opts)?;
    // k0, k3, k6 (last already sampled)
    assert_eq!(table.summary_len(), 3);
    assert_eq!(table.level(), 2);
    Ok(())
}

#[test]
fn toc_lists_relative_paths() -> Result<()> {
    let dir = tempdir()?;
    let table = form(dir.path(), 4, &sample())?;

    let toc = fs::read_to_string(table.paths().toc())?;
    assert!(toc.contains("level=0"));
    assert!(toc.contains("index=4"));
    let data_line = Path::new("data").join("usertable_0_4_data.db");
    assert!(toc.contains(&format!("data={}", data_line.display())));

    let reread = SsTablePaths::from_toc(dir.path(), &table.paths().toc_relative())?;
    assert_eq!(&reread, table.paths());
    Ok(())
}

#[test]
fn toc_missing_entries_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    SsTablePaths::create_dirs(dir.path())?;
    let rel = Path::new("toc").join("broken_toc.txt");
    fs::write(dir.path().join(&rel), "level=0\nindex=1\ndata=data/x.db\n")?;

    assert!(SsTablePaths::from_toc(dir.path(), &rel).is_err());
    Ok(())
}
