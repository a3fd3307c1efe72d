//! File naming for the six files of one SSTable, and the TOC that lists them.
//!
//! ```text
//! <root>/data/usertable_<level>_<index>_data.db
//! <root>/index/usertable_<level>_<index>_index.db
//! <root>/summary/usertable_<level>_<index>_summary.db
//! <root>/filter/usertable_<level>_<index>_filter.db
//! <root>/merkle/usertable_<level>_<index>_merkle.db
//! <root>/toc/usertable_<level>_<index>_toc.txt
//! ```
//!
//! The TOC is a small `key=value` text file. Its paths are relative to
//! `<root>` so a data directory can be moved as a whole.
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sub-directories created under the SSTable root.
pub const SUBDIRS: [&str; 6] = ["data", "index", "summary", "filter", "merkle", "toc"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsTablePaths {
    root: PathBuf,
    level: usize,
    index: u64,
    data: PathBuf,
    index_file: PathBuf,
    summary: PathBuf,
    filter: PathBuf,
    merkle: PathBuf,
    toc: PathBuf,
}

fn relative(kind: &str, level: usize, index: u64) -> PathBuf {
    let ext = if kind == "toc" { "txt" } else { "db" };
    Path::new(kind).join(format!("usertable_{}_{}_{}.{}", level, index, kind, ext))
}

impl SsTablePaths {
    /// Canonical paths of table `index` at `level` under `root`.
    pub fn new<P: AsRef<Path>>(root: P, level: usize, index: u64) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            data: root.join(relative("data", level, index)),
            index_file: root.join(relative("index", level, index)),
            summary: root.join(relative("summary", level, index)),
            filter: root.join(relative("filter", level, index)),
            merkle: root.join(relative("merkle", level, index)),
            toc: root.join(relative("toc", level, index)),
            root,
            level,
            index,
        }
    }

    /// Creates the sub-directories of `root`.
    pub fn create_dirs<P: AsRef<Path>>(root: P) -> Result<()> {
        for sub in SUBDIRS {
            let dir = root.as_ref().join(sub);
            fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
        }
        Ok(())
    }

    /// Reads the TOC at `toc` (relative to `root`) and returns the paths it lists.
    pub fn from_toc<P: AsRef<Path>>(root: P, toc: &Path) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let toc_path = root.join(toc);
        let content = fs::read_to_string(&toc_path)
            .with_context(|| format!("reading table of contents {:?}", toc_path))?;

        let mut level: Option<usize> = None;
        let mut index: Option<u64> = None;
        let mut files: [Option<PathBuf>; 5] = Default::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("malformed toc line in {:?}: {:?}", toc_path, line);
            };
            match key {
                "level" => level = Some(value.parse()?),
                "index" => index = Some(value.parse()?),
                "data" => files[0] = Some(root.join(value)),
                "index_file" => files[1] = Some(root.join(value)),
                "summary" => files[2] = Some(root.join(value)),
                "filter" => files[3] = Some(root.join(value)),
                "merkle" => files[4] = Some(root.join(value)),
                other => bail!("unknown toc key {:?} in {:?}", other, toc_path),
            }
        }

        let (Some(level), Some(index)) = (level, index) else {
            bail!("toc {:?} is missing level or index", toc_path);
        };
        let [Some(data), Some(index_file), Some(summary), Some(filter), Some(merkle)] = files else {
            bail!("toc {:?} does not list all five files", toc_path);
        };
        Ok(Self {
            root,
            level,
            index,
            data,
            index_file,
            summary,
            filter,
            merkle,
            toc: toc_path,
        })
    }

    /// Writes the TOC file, fsynced.
    pub fn write_toc(&self) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!("level={}\n", self.level));
        out.push_str(&format!("index={}\n", self.index));
        for (key, path) in [
            ("data", &self.data),
            ("index_file", &self.index_file),
            ("summary", &self.summary),
            ("filter", &self.filter),
            ("merkle", &self.merkle),
        ] {
            out.push_str(&format!("{}={}\n", key, self.relative_to_root(path).display()));
        }

        let tmp = self.toc.with_extension("txt.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(out.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, &self.toc)?;
        Ok(())
    }

    /// The TOC path relative to the root, as stored in the level manifest.
    pub fn toc_relative(&self) -> PathBuf {
        self.relative_to_root(&self.toc)
    }

    fn relative_to_root(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// All six files, TOC last.
    pub fn all(&self) -> [&Path; 6] {
        [
            &self.data,
            &self.index_file,
            &self.summary,
            &self.filter,
            &self.merkle,
            &self.toc,
        ]
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data(&self) -> &Path {
        &self.data
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    pub fn summary(&self) -> &Path {
        &self.summary
    }

    pub fn filter(&self) -> &Path {
        &self.filter
    }

    pub fn merkle(&self) -> &Path {
        &self.merkle
    }

    pub fn toc(&self) -> &Path {
        &self.toc
    }
}
