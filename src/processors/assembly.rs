//! Directory replacement and final dataset assembly.
//!
//! Every folder the pipeline produces is rebuilt from scratch. Instead of
//! deleting the old folder up front, [`replace_dir`] builds the new content in
//! a sibling staging folder and only swaps it in once the build succeeded, so
//! a failed stage leaves the previous output untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use super::catalog::{discover_categories, list_dirs, list_files, Category, SampleKind};
use crate::config::LayoutConfig;

/// Errors raised while moving directory trees around.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' has no parent directory or file name")]
    InvalidTarget(PathBuf),
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssemblyError>;

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> AssemblyError {
    let path = path.to_path_buf();
    move |source| AssemblyError::Io {
        action,
        path,
        source,
    }
}

/// Sibling path `<parent>/.<name>.<tag>` used while swapping `target`.
fn sibling(target: &Path, tag: &str) -> Result<PathBuf> {
    let parent = target
        .parent()
        .ok_or_else(|| AssemblyError::InvalidTarget(target.to_path_buf()))?;
    let name = target
        .file_name()
        .ok_or_else(|| AssemblyError::InvalidTarget(target.to_path_buf()))?;
    Ok(parent.join(format!(".{}.{}", name.to_string_lossy(), tag)))
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(io_err("remove", path))
    } else if path.exists() {
        fs::remove_file(path).map_err(io_err("remove", path))
    } else {
        Ok(())
    }
}

/// Rebuild `target` from scratch.
///
/// `build` receives an empty staging directory next to `target` and fills it.
/// On success the staging directory takes the place of `target`; on failure
/// it is discarded and `target` is left as it was.
///
/// # Errors
///
/// Returns the error of `build`, or an [`AssemblyError`] if the staging
/// directory cannot be prepared or swapped in.
pub fn replace_dir<T, F>(target: &Path, build: F) -> anyhow::Result<T>
where
    F: FnOnce(&Path) -> anyhow::Result<T>,
{
    let staging = sibling(target, "staging")?;
    let retired = sibling(target, "old")?;

    remove_path(&staging)?;
    fs::create_dir_all(&staging).map_err(io_err("create", &staging))?;

    let value = match build(&staging) {
        Ok(value) => value,
        Err(e) => {
            if let Err(cleanup) = remove_path(&staging) {
                warn!("{}", cleanup);
            }
            return Err(e);
        }
    };

    remove_path(&retired)?;
    if target.exists() {
        fs::rename(target, &retired).map_err(io_err("move aside", target))?;
    }
    fs::rename(&staging, target).map_err(io_err("move into place", &staging))?;
    remove_path(&retired)?;

    debug!("Replaced {}", target.display());
    Ok(value)
}

/// Files handled by one [`copy_dir`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: usize,
    /// Files or subfolders that could not be copied
    pub failed: usize,
}

/// Recursively copy the contents of `src` into `dst`, creating `dst`.
///
/// A file that cannot be copied is logged, counted as failed and left out of
/// `dst`; the remaining files are still copied.
///
/// # Errors
///
/// Returns an error only if `dst` itself cannot be created.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<CopyStats> {
    fs::create_dir_all(dst).map_err(io_err("create", dst))?;

    let mut stats = CopyStats::default();
    for file in list_files(src, None) {
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = dst.join(name);
        match fs::copy(&file, &target) {
            Ok(_) => stats.copied += 1,
            Err(e) => {
                warn!("{}", io_err("copy", &file)(e));
                if let Err(cleanup) = remove_path(&target) {
                    warn!("{}", cleanup);
                }
                stats.failed += 1;
            }
        }
    }
    for dir in list_dirs(src) {
        let Some(name) = dir.file_name() else {
            continue;
        };
        match copy_dir(&dir, &dst.join(name)) {
            Ok(nested) => {
                stats.copied += nested.copied;
                stats.failed += nested.failed;
            }
            Err(e) => {
                warn!("{}", e);
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

/// Delete every mask of a good sample from a `GT/` folder.
///
/// Masks that cannot be removed are logged and kept.
///
/// # Returns
///
/// The number of masks removed.
pub fn remove_good_masks(gt_dir: &Path) -> usize {
    let mut removed = 0;
    for file in list_files(gt_dir, None) {
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if SampleKind::from_stem(stem) != Some(SampleKind::Good) {
            continue;
        }
        match fs::remove_file(&file) {
            Ok(()) => removed += 1,
            Err(e) => warn!("{}", io_err("remove", &file)(e)),
        }
    }
    removed
}

/// Default location of the assembled dataset: a sibling of the raw root.
pub fn default_output_dir(root: &Path, layout: &LayoutConfig) -> PathBuf {
    match root.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(&layout.output_name),
        _ => root.join("..").join(&layout.output_name),
    }
}

/// Counts describing one assembled dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblySummary {
    pub categories: usize,
    pub train: usize,
    pub test: usize,
    pub masks: usize,
    pub good_masks_removed: usize,
    /// Files left out because they could not be copied
    pub failed_files: usize,
    /// Categories left out of the dataset entirely
    pub failed_categories: usize,
}

impl AssemblySummary {
    fn merge(&mut self, other: AssemblySummary) {
        self.categories += other.categories;
        self.train += other.train;
        self.test += other.test;
        self.masks += other.masks;
        self.good_masks_removed += other.good_masks_removed;
        self.failed_files += other.failed_files;
        self.failed_categories += other.failed_categories;
    }
}

/// Copy one category's converted folders into `dest`.
///
/// Returns `None` when the category has none of the converted folders.
fn assemble_category(
    category: &Category,
    dest: &Path,
    layout: &LayoutConfig,
) -> Result<Option<AssemblySummary>> {
    let sources = [
        (layout.train_out_dir.as_str(), layout.train_dir.as_str()),
        (layout.test_out_dir.as_str(), layout.test_dir.as_str()),
        (layout.labels_dir.as_str(), layout.gt_dir.as_str()),
    ];

    if !sources.iter().any(|(src, _)| category.path.join(src).is_dir()) {
        debug!("{}: nothing to assemble", category.name);
        return Ok(None);
    }

    let mut counts = [0usize; 3];
    let mut failed_files = 0;
    for (count, (src, dst)) in counts.iter_mut().zip(sources.iter()) {
        let src_dir = category.path.join(src);
        if src_dir.is_dir() {
            let stats = copy_dir(&src_dir, &dest.join(dst))?;
            *count = stats.copied;
            failed_files += stats.failed;
        }
    }

    let good_masks_removed = remove_good_masks(&dest.join(&layout.gt_dir));

    Ok(Some(AssemblySummary {
        categories: 1,
        train: counts[0],
        test: counts[1],
        masks: counts[2] - good_masks_removed,
        good_masks_removed,
        failed_files,
        failed_categories: 0,
    }))
}

/// Assemble the final `<category>/{train,test,GT}` tree at `output`.
///
/// The output directory is replaced as a whole. Categories are discovered
/// under `root`, skipping the output folder itself when it lives there. A
/// category that cannot be assembled is logged and left out; the others are
/// still assembled.
pub fn create_final_dataset(
    root: &Path,
    output: &Path,
    layout: &LayoutConfig,
) -> anyhow::Result<AssemblySummary> {
    let output_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| layout.output_name.clone());
    let categories = discover_categories(root, &[output_name.as_str()]);

    let summary = replace_dir(output, |staging| {
        let mut total = AssemblySummary::default();
        for category in &categories {
            let dest = staging.join(&category.name);
            match assemble_category(category, &dest, layout) {
                Ok(Some(summary)) => {
                    info!(
                        "{}: {} train, {} test, {} masks",
                        category.name, summary.train, summary.test, summary.masks
                    );
                    if summary.failed_files > 0 {
                        warn!("{}: {} files could not be copied", category.name, summary.failed_files);
                    }
                    total.merge(summary);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!("{}: assembly failed: {}", category.name, e);
                    if let Err(cleanup) = remove_path(&dest) {
                        warn!("{}", cleanup);
                    }
                    total.failed_categories += 1;
                }
            }
        }
        Ok(total)
    })?;

    info!(
        "Assembled {} categories into {}",
        summary.categories,
        output.display()
    );
    Ok(summary)
}

/// Remove the intermediate folders from every category of the raw tree.
///
/// # Returns
///
/// The number of folders removed.
pub fn cleanup_intermediate(categories: &[Category], layout: &LayoutConfig) -> usize {
    let mut removed = 0;
    for category in categories {
        for name in layout.intermediate_dirs() {
            let dir = category.path.join(name);
            if !dir.is_dir() {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_text, file_names};
    use tempfile::TempDir;

    #[test]
    fn test_replace_dir_swaps_content() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("gt1");
        create_text(&target.join("stale.txt"), "old");

        let written = replace_dir(&target, |staging| {
            fs::write(staging.join("0_bad.txt"), "new")?;
            Ok(1)
        })
        .unwrap();

        assert_eq!(written, 1);
        assert_eq!(file_names(&target), vec!["0_bad.txt"]);
        assert_eq!(file_names(temp_dir.path()), vec!["gt1"]);
    }

    #[test]
    fn test_replace_dir_keeps_target_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("gt1");
        create_text(&target.join("keep.txt"), "old");

        let result: anyhow::Result<()> = replace_dir(&target, |staging| {
            fs::write(staging.join("partial.txt"), "x")?;
            anyhow::bail!("build failed")
        });

        assert!(result.is_err());
        assert_eq!(file_names(&target), vec!["keep.txt"]);
        assert_eq!(file_names(temp_dir.path()), vec!["gt1"]);
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        create_text(&src.join("a.pcd"), "a");
        create_text(&src.join("nested").join("b.pcd"), "b");

        let stats = copy_dir(&src, &temp_dir.path().join("dst")).unwrap();

        assert_eq!(stats, CopyStats { copied: 2, failed: 0 });
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("dst").join("nested").join("b.pcd")).unwrap(),
            "b"
        );
    }

    #[test]
    fn test_default_output_dir() {
        let layout = LayoutConfig::default();
        assert_eq!(
            default_output_dir(Path::new("/data/MulSen_AD"), &layout),
            PathBuf::from("/data/MulSen_AD_processed")
        );
    }

    #[test]
    fn test_create_final_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("raw");
        let cat = root.join("capsule");
        create_text(&cat.join("train1").join("0_good.pcd"), "");
        create_text(&cat.join("test1").join("0_bad.pcd"), "");
        create_text(&cat.join("test1").join("1_good.pcd"), "");
        create_text(&cat.join("gt1").join("0_bad.txt"), "");
        create_text(&cat.join("gt1").join("1_good.txt"), "");
        fs::create_dir_all(root.join("empty_category")).unwrap();

        let output = temp_dir.path().join("out");
        let summary = create_final_dataset(&root, &output, &LayoutConfig::default()).unwrap();

        assert_eq!(
            summary,
            AssemblySummary {
                categories: 1,
                train: 1,
                test: 2,
                masks: 1,
                good_masks_removed: 1,
                failed_files: 0,
                failed_categories: 0
            }
        );
        assert_eq!(file_names(&output), vec!["capsule"]);
        assert_eq!(file_names(&output.join("capsule")), vec!["GT", "test", "train"]);
        assert_eq!(file_names(&output.join("capsule").join("GT")), vec!["0_bad.txt"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unreadable_file_does_not_drop_other_categories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("raw");
        create_text(&root.join("capsule").join("train1").join("0_good.pcd"), "");
        create_text(&root.join("capsule").join("gt1").join("0_bad.txt"), "");
        let zipper_train = root.join("zipper").join("train1");
        create_text(&zipper_train.join("0_good.pcd"), "");
        // Listed as a regular file, but reading it fails
        std::os::unix::fs::symlink("/proc/self/mem", zipper_train.join("1_good.pcd")).unwrap();

        let output = temp_dir.path().join("out");
        let summary = create_final_dataset(&root, &output, &LayoutConfig::default()).unwrap();

        assert_eq!(summary.categories, 2);
        assert_eq!(summary.train, 2);
        assert_eq!(summary.failed_files, 1);
        assert_eq!(summary.failed_categories, 0);
        assert_eq!(file_names(&output), vec!["capsule", "zipper"]);
        assert_eq!(file_names(&output.join("capsule").join("GT")), vec!["0_bad.txt"]);
        assert_eq!(file_names(&output.join("zipper").join("train")), vec!["0_good.pcd"]);
    }

    #[test]
    fn test_remove_good_masks() {
        let temp_dir = TempDir::new().unwrap();
        let gt = temp_dir.path().join("GT");
        create_text(&gt.join("0_bad.txt"), "");
        create_text(&gt.join("1_good.txt"), "");

        assert_eq!(remove_good_masks(&gt), 1);
        assert_eq!(file_names(&gt), vec!["0_bad.txt"]);
    }

    #[test]
    fn test_output_inside_root_is_not_a_category() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_text(&root.join("capsule").join("train1").join("0_good.pcd"), "");
        let output = root.join("MulSen_AD_processed");

        create_final_dataset(root, &output, &LayoutConfig::default()).unwrap();
        let summary = create_final_dataset(root, &output, &LayoutConfig::default()).unwrap();

        assert_eq!(summary.categories, 1);
        assert_eq!(file_names(&output), vec!["capsule"]);
    }

    #[test]
    fn test_cleanup_intermediate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("capsule");
        create_text(&path.join("gt1").join("0_bad.txt"), "");
        create_text(&path.join("train1").join("0_good.pcd"), "");
        create_text(&path.join("train").join("0_good.stl"), "");
        let categories = vec![Category {
            name: "capsule".to_string(),
            path: path.clone(),
        }];

        let removed = cleanup_intermediate(&categories, &LayoutConfig::default());

        assert_eq!(removed, 2);
        assert_eq!(file_names(&path), vec!["train"]);
    }
}
