//! Raw dataset reorganization.
//!
//! The raw layout keeps one folder per sensor inside each category and one
//! subfolder per defect type inside `test/` and `GT/`:
//!
//! ```text
//! <category>/Pointcloud/test/<defect>/*.stl
//! <category>/Pointcloud/GT/<defect>/*.txt
//! <category>/Pointcloud/test/good/*.stl
//! ```
//!
//! This module lifts the sensor folder into the category and flattens the
//! defect subfolders into enumerated `<n>_bad` / `<n>_good` names.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use super::catalog::{enumerated_stem, list_dirs, list_files, Category, SampleKind};
use crate::config::LayoutConfig;

/// Counts of samples renamed in one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReorganizeSummary {
    pub defective: usize,
    pub masks: usize,
    pub good: usize,
    pub train: usize,
    /// Files that could not be moved
    pub failed: usize,
}

impl ReorganizeSummary {
    fn merge(&mut self, other: ReorganizeSummary) {
        self.defective += other.defective;
        self.masks += other.masks;
        self.good += other.good;
        self.train += other.train;
        self.failed += other.failed;
    }
}

/// Extension of `path` including the leading dot, or an empty string.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Rename `from` into `to_dir` as `<stem><original extension>`.
fn move_as(from: &Path, to_dir: &Path, stem: &str) -> Result<PathBuf> {
    let dest = to_dir.join(format!("{}{}", stem, dotted_extension(from)));
    fs::rename(from, &dest)
        .with_context(|| format!("Failed to move {} -> {}", from.display(), dest.display()))?;
    Ok(dest)
}

/// Like [`move_as`], but a failure is logged and reported as `false`.
fn try_move_as(from: &Path, to_dir: &Path, stem: &str) -> bool {
    match move_as(from, to_dir, stem) {
        Ok(dest) => {
            debug!("{} -> {}", from.display(), dest.display());
            true
        }
        Err(e) => {
            warn!("{:#}", e);
            false
        }
    }
}

/// Remove a directory if it is empty; anything else is left alone.
fn remove_if_empty(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir(dir) {
            debug!("Keeping {}: {}", dir.display(), e);
        }
    }
}

/// Move every entry of `<category>/<sensor_dir>/` up into `<category>/`.
///
/// Entries whose destination already exists are left in place. The sensor
/// folder is removed once empty.
///
/// # Returns
///
/// The number of entries moved.
pub fn lift_sensor_folder(category: &Path, sensor_dir: &str) -> usize {
    let sensor_path = category.join(sensor_dir);
    if !sensor_path.is_dir() {
        return 0;
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(&sensor_path)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    let mut moved = 0;
    for entry in entries {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let dest = category.join(name);
        if dest.exists() {
            warn!("Not overwriting existing {}", dest.display());
            continue;
        }
        match fs::rename(&entry, &dest) {
            Ok(()) => moved += 1,
            Err(e) => warn!("Failed to move {}: {}", entry.display(), e),
        }
    }

    remove_if_empty(&sensor_path);
    moved
}

/// Lift the sensor folder of every category under `root`.
pub fn flatten_sensor_folders(root: &Path, categories: &[Category], layout: &LayoutConfig) -> usize {
    let mut total = 0;
    for category in categories {
        let moved = lift_sensor_folder(&category.path, &layout.sensor_dir);
        if moved > 0 {
            info!("{}: moved {} entries out of {}", category.name, moved, layout.sensor_dir);
        }
        total += moved;
    }
    debug!("Flattened sensor folders under {}", root.display());
    total
}

/// Flatten the defect subfolders of one category's `test/` and `GT/` folders.
///
/// Defect subfolders are visited in name order. The i-th file of
/// `test/<defect>/` and the i-th file of `GT/<defect>/` share the name
/// `<counter>_bad`, with the counter running across all defect types. Files of
/// `test/good/` then continue the counter as `<counter>_good`. Any
/// `test/color/` folder is deleted.
///
/// A file that cannot be moved is logged and counted in `failed`; its counter
/// value stays reserved and the remaining files are still processed.
pub fn reorganize_test_split(category: &Category, layout: &LayoutConfig) -> ReorganizeSummary {
    let test_dir = category.path.join(&layout.test_dir);
    let gt_dir = category.path.join(&layout.gt_dir);
    let mut summary = ReorganizeSummary::default();

    if !test_dir.is_dir() {
        return summary;
    }

    let mut counter = 0usize;

    for subfolder in list_dirs(&test_dir) {
        let Some(defect) = subfolder.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if layout.reserved_dirs.iter().any(|r| r == defect) {
            continue;
        }

        let gt_subfolder = gt_dir.join(defect);
        let test_files = list_files(&subfolder, None);
        let gt_files = list_files(&gt_subfolder, None);

        if test_files.len() != gt_files.len() {
            warn!(
                "{}/{}: {} samples but {} ground-truth files",
                category.name,
                defect,
                test_files.len(),
                gt_files.len()
            );
        }

        for i in 0..test_files.len().max(gt_files.len()) {
            let stem = enumerated_stem(counter, SampleKind::Defective);

            if let Some(file) = test_files.get(i) {
                if try_move_as(file, &test_dir, &stem) {
                    summary.defective += 1;
                } else {
                    summary.failed += 1;
                }
            }
            if let Some(file) = gt_files.get(i) {
                if try_move_as(file, &gt_dir, &stem) {
                    summary.masks += 1;
                } else {
                    summary.failed += 1;
                }
            }

            counter += 1;
        }

        remove_if_empty(&subfolder);
        remove_if_empty(&gt_subfolder);
    }

    let good_dir = test_dir.join("good");
    if good_dir.is_dir() {
        for file in list_files(&good_dir, None) {
            if try_move_as(&file, &test_dir, &enumerated_stem(counter, SampleKind::Good)) {
                summary.good += 1;
            } else {
                summary.failed += 1;
            }
            counter += 1;
        }
        remove_if_empty(&good_dir);
    }

    let color_dir = test_dir.join("color");
    if color_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&color_dir) {
            warn!("Failed to remove {}: {}", color_dir.display(), e);
        }
    }

    summary
}

/// Give every train sample an enumerated `<n>_good` name.
///
/// Files directly in `train/` and in an optional `train/good/` subfolder are
/// considered. Files already carrying a good marker keep their name; the
/// others take the next free counter values. Files that cannot be moved are
/// logged and counted in `failed`.
pub fn enumerate_train_split(category: &Category, layout: &LayoutConfig) -> ReorganizeSummary {
    let train_dir = category.path.join(&layout.train_dir);
    let mut summary = ReorganizeSummary::default();
    if !train_dir.is_dir() {
        return summary;
    }

    let good_dir = train_dir.join("good");
    let mut pending: Vec<PathBuf> = Vec::new();
    let mut taken = 0usize;

    for file in list_files(&train_dir, None) {
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if SampleKind::from_stem(stem) == Some(SampleKind::Good) {
            taken += 1;
        } else {
            pending.push(file);
        }
    }
    pending.extend(list_files(&good_dir, None));

    let mut counter = taken;
    for file in pending {
        let stem = loop {
            let candidate = enumerated_stem(counter, SampleKind::Good);
            counter += 1;
            let dest = train_dir.join(format!("{}{}", candidate, dotted_extension(&file)));
            if !dest.exists() {
                break candidate;
            }
        };
        if try_move_as(&file, &train_dir, &stem) {
            summary.train += 1;
        } else {
            summary.failed += 1;
        }
    }

    remove_if_empty(&good_dir);
    summary
}

/// Reorganize every category under `root`.
///
/// Failures are logged per file and do not stop the remaining files or
/// categories.
pub fn reorganize_categories(categories: &[Category], layout: &LayoutConfig) -> ReorganizeSummary {
    let mut total = ReorganizeSummary::default();

    for category in categories {
        let mut summary = reorganize_test_split(category, layout);
        summary.merge(enumerate_train_split(category, layout));

        info!(
            "{}: {} defective ({} masks), {} good, {} train renamed",
            category.name, summary.defective, summary.masks, summary.good, summary.train
        );
        if summary.failed > 0 {
            warn!("{}: {} files could not be moved", category.name, summary.failed);
        }
        total.merge(summary);
    }

    total
}
