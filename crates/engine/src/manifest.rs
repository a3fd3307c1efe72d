/// # Manifest - SSTable Level Metadata
///
/// Records which SSTables belong to which level so the engine can rebuild its
/// level structure after a restart. Each table is identified by the path of
/// its TOC file, relative to the SSTable root.
///
/// ## File Format
///
/// ```text
/// # SlateKV level manifest
/// # Format: L<level>:<toc path>, oldest first within a level
/// next:12
/// L0:toc/usertable_0_10_toc.txt
/// L0:toc/usertable_0_11_toc.txt
/// L1:toc/usertable_1_9_toc.txt
/// ```
///
/// `next` is the index the next formed table will get. Lines starting with
/// `#` are comments; empty lines are ignored.
///
/// ## Crash Safety
///
/// The manifest is rewritten atomically: write to `MANIFEST.tmp`, fsync, then
/// rename over the existing file. A crash leaves either the old or the new
/// manifest, never a mix.
use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Name of the manifest file within the data directory.
pub const MANIFEST_FILENAME: &str = "MANIFEST";

const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    path: PathBuf,
    /// Index handed to the next formed table.
    pub next_index: u64,
    /// TOC paths per level, oldest first.
    pub levels: Vec<Vec<PathBuf>>,
}

impl Manifest {
    /// Loads `dir/MANIFEST`, or returns an empty manifest if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILENAME);
        // a leftover tmp is an interrupted save; the old manifest still stands
        let _ = fs::remove_file(dir.join(MANIFEST_TMP_FILENAME));

        let mut manifest = Self {
            path,
            next_index: 1,
            levels: Vec::new(),
        };
        if !manifest.path.exists() {
            return Ok(manifest);
        }

        let file = File::open(&manifest.path)
            .with_context(|| format!("failed to open manifest at {}", manifest.path.display()))?;
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.with_context(|| format!("failed to read manifest line {}", line_num + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (tag, value) = trimmed.split_once(':').ok_or_else(|| {
                anyhow!(
                    "manifest line {}: invalid format (expected 'L<n>:<toc>'): {}",
                    line_num + 1,
                    trimmed
                )
            })?;

            if tag == "next" {
                manifest.next_index = value.parse().with_context(|| {
                    format!("manifest line {}: bad next index {:?}", line_num + 1, value)
                })?;
                continue;
            }

            let level: usize = match tag.strip_prefix('L').map(str::parse::<usize>) {
                Some(Ok(level)) => level,
                _ => bail!("manifest line {}: unknown level '{}'", line_num + 1, tag),
            };
            if value.is_empty() {
                bail!("manifest line {}: empty TOC path", line_num + 1);
            }
            manifest.add(level, PathBuf::from(value));
        }

        Ok(manifest)
    }

    /// Appends `toc` as the newest table of `level` (does **not** save).
    pub fn add(&mut self, level: usize, toc: PathBuf) {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        self.levels[level].push(toc);
    }

    /// Returns a fresh table index and advances the counter (does **not** save).
    pub fn allocate_index(&mut self) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// TOC paths of `level`, oldest first.
    pub fn tables(&self, level: usize) -> &[PathBuf] {
        self.levels.get(level).map_or(&[][..], Vec::as_slice)
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists the manifest atomically (tmp + fsync + rename).
    pub fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| {
                    format!("failed to create manifest tmp at {}", tmp_path.display())
                })?;
            self.write_contents(&mut f)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("failed to rename manifest into {}", self.path.display())
        })?;
        Ok(())
    }

    fn write_contents(&self, f: &mut File) -> Result<()> {
        writeln!(f, "# SlateKV level manifest")?;
        writeln!(f, "# Format: L<level>:<toc path>, oldest first within a level")?;
        writeln!(f, "next:{}", self.next_index)?;
        for (level, tables) in self.levels.iter().enumerate() {
            for toc in tables {
                writeln!(f, "L{}:{}", level, toc.display())?;
            }
        }
        Ok(())
    }
}
