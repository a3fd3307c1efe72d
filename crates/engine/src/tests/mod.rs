mod compaction_tests;
mod read_tests;

use crate::*;
use std::fs;

/// Defaults under `dir`, without fsync.
pub(crate) fn config(dir: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_data_dir(dir)
        .with_wal_sync(false)
}

/// A config whose memtable flushes after `limit` distinct keys.
pub(crate) fn with_limit(dir: &Path, limit: usize) -> EngineConfig {
    config(dir).with_memtable(limit, 1.0)
}

/// Simulates a crash: no flush on drop, handles simply leak.
pub(crate) fn crash(engine: Engine) {
    std::mem::forget(engine);
}

/// Regular files directly inside `dir`.
pub(crate) fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .count()
}

pub(crate) fn get_str(engine: &Engine, key: &str) -> Option<String> {
    engine
        .get(key)
        .unwrap()
        .map(|v| String::from_utf8(v).unwrap())
}
