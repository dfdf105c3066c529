//! Sample classification and category discovery.
//!
//! Sample files follow a `<counter>_good` / `<counter>_bad` naming scheme once
//! reorganized. The scheme is parsed here, once, into a [`SampleKind`]; later
//! stages work with [`Sample`] values instead of re-inspecting file names.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::warn;
use regex::Regex;

/// Whether a sample is anomaly-free or carries a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleKind {
    Good,
    Defective,
}

impl SampleKind {
    /// Classify a file stem by its `_good` / `_bad` marker.
    ///
    /// A `_good` marker anywhere in the stem takes precedence over `_bad`.
    /// Returns `None` when neither marker is present.
    pub fn from_stem(stem: &str) -> Option<Self> {
        static MARKER: OnceLock<Regex> = OnceLock::new();
        let marker = MARKER.get_or_init(|| Regex::new(r"_(good|bad)").unwrap());

        let mut kind = None;
        for caps in marker.captures_iter(stem) {
            match &caps[1] {
                "good" => return Some(SampleKind::Good),
                _ => kind = Some(SampleKind::Defective),
            }
        }
        kind
    }

    /// Binary label used in manifests.
    pub fn label(self) -> u8 {
        match self {
            SampleKind::Good => 0,
            SampleKind::Defective => 1,
        }
    }

    /// Human-readable label used in manifests.
    pub fn label_name(self) -> &'static str {
        match self {
            SampleKind::Good => "good",
            SampleKind::Defective => "defective",
        }
    }

    /// Suffix used by the enumerated naming scheme.
    pub fn suffix(self) -> &'static str {
        match self {
            SampleKind::Good => "good",
            SampleKind::Defective => "bad",
        }
    }
}

/// Dataset partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// Name for the `counter`-th sample of the given kind, without extension.
pub fn enumerated_stem(counter: usize, kind: SampleKind) -> String {
    format!("{}_{}", counter, kind.suffix())
}

/// A classified sample file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub stem: String,
    pub kind: SampleKind,
    pub path: PathBuf,
}

impl Sample {
    /// Classify a file path. Returns `None` for unclassifiable names.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?.to_string();
        let kind = SampleKind::from_stem(&stem)?;
        Some(Self {
            stem,
            kind,
            path: path.to_path_buf(),
        })
    }

    /// File name of this sample with another extension.
    pub fn file_name_with(&self, extension: &str) -> String {
        format!("{}.{}", self.stem, extension)
    }
}

/// Samples found in one folder.
#[derive(Debug, Clone, Default)]
pub struct SampleScan {
    pub samples: Vec<Sample>,
    /// Files with the right extension but no good/bad marker
    pub unclassified: Vec<PathBuf>,
}

/// A dataset category folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub path: PathBuf,
}

/// List the files directly inside `dir`, sorted by path.
///
/// A missing or unreadable directory yields an empty list.
pub fn list_files(dir: &Path, extension: Option<&str>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| match extension {
            Some(ext) => path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    files.sort();
    files
}

/// List the subdirectories directly inside `dir`, sorted by path.
pub fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    dirs.sort();
    dirs
}

/// Classify every file with `extension` in `dir`.
///
/// Unclassifiable files are logged and returned separately.
pub fn scan_samples(dir: &Path, extension: &str) -> SampleScan {
    let mut scan = SampleScan::default();

    for path in list_files(dir, Some(extension)) {
        match Sample::from_path(&path) {
            Some(sample) => scan.samples.push(sample),
            None => {
                warn!("Unknown sample type, skipping: {}", path.display());
                scan.unclassified.push(path);
            }
        }
    }

    scan
}

/// Discover category folders under `root`, sorted by name.
///
/// Hidden folders and any name in `exclude` are skipped.
pub fn discover_categories(root: &Path, exclude: &[&str]) -> Vec<Category> {
    list_dirs(root)
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            if name.starts_with('.') || exclude.contains(&name.as_str()) {
                return None;
            }
            Some(Category { name, path })
        })
        .collect()
}
