//! Consistency checks over an assembled dataset.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::catalog::{discover_categories, list_files, scan_samples, SampleKind};
use super::labeling::LABEL_EXTENSION;
use crate::config::LayoutConfig;
use crate::core::loaders::{load_label_points, load_pcd};

/// A single consistency problem.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Mask row count differs from the point count of its cloud
    MaskMismatch {
        mask: PathBuf,
        mask_rows: usize,
        points: usize,
    },
    /// A good sample still has a mask in `GT/`
    GoodMask(PathBuf),
    /// A file could not be read
    Unreadable { path: PathBuf, reason: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MaskMismatch {
                mask,
                mask_rows,
                points,
            } => write!(
                f,
                "{}: {} mask rows but {} points",
                mask.display(),
                mask_rows,
                points
            ),
            Violation::GoodMask(path) => write!(f, "{}: mask for a good sample", path.display()),
            Violation::Unreadable { path, reason } => write!(f, "{}: {}", path.display(), reason),
        }
    }
}

/// Outcome of [`verify_dataset`].
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub categories: usize,
    /// Defective samples whose mask was compared
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

fn compare_mask(pcd_path: &Path, mask_path: &Path) -> Option<Violation> {
    let points = match load_pcd(pcd_path) {
        Ok(cloud) => cloud.len(),
        Err(e) => {
            return Some(Violation::Unreadable {
                path: pcd_path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };
    let mask_rows = match load_label_points(mask_path) {
        Ok(labeled) => labeled.labels.len(),
        Err(e) => {
            return Some(Violation::Unreadable {
                path: mask_path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    (mask_rows != points).then(|| Violation::MaskMismatch {
        mask: mask_path.to_path_buf(),
        mask_rows,
        points,
    })
}

/// Check every category of an assembled dataset.
///
/// For each defective test cloud with a mask, the mask must have one row per
/// point. No mask of a good sample may remain in `GT/`.
pub fn verify_dataset(output: &Path, layout: &LayoutConfig) -> VerifyReport {
    let categories = discover_categories(output, &[]);
    let mut report = VerifyReport {
        categories: categories.len(),
        ..VerifyReport::default()
    };

    for category in &categories {
        let gt_dir = category.path.join(&layout.gt_dir);
        let scan = scan_samples(&category.path.join(&layout.test_dir), "pcd");

        for sample in scan.samples.iter().filter(|s| s.kind == SampleKind::Defective) {
            let mask_path = gt_dir.join(sample.file_name_with(LABEL_EXTENSION));
            if !mask_path.is_file() {
                continue;
            }
            report.checked += 1;
            if let Some(violation) = compare_mask(&sample.path, &mask_path) {
                report.violations.push(violation);
            }
        }

        for mask in list_files(&gt_dir, Some(LABEL_EXTENSION)) {
            let stem = mask.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if SampleKind::from_stem(stem) == Some(SampleKind::Good) {
                report.violations.push(Violation::GoodMask(mask));
            }
        }
    }

    for violation in &report.violations {
        warn!("{}", violation);
    }
    info!(
        "Verified {} masks across {} categories, {} problems",
        report.checked,
        report.categories,
        report.violations.len()
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PcdEncoding;
    use crate::core::writers::{write_labels_txt, write_pcd};
    use crate::test_support::{create_text, SQUARE};
    use tempfile::TempDir;

    #[test]
    fn test_consistent_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let cat = temp_dir.path().join("capsule");
        write_pcd(&cat.join("test").join("0_bad.pcd"), &SQUARE, PcdEncoding::Binary).unwrap();
        write_labels_txt(&cat.join("GT").join("0_bad.txt"), &SQUARE, &[1, 0, 0, 0]).unwrap();

        let report = verify_dataset(temp_dir.path(), &LayoutConfig::default());

        assert!(report.is_ok());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn test_detects_problems() {
        let temp_dir = TempDir::new().unwrap();
        let cat = temp_dir.path().join("capsule");
        write_pcd(&cat.join("test").join("0_bad.pcd"), &SQUARE, PcdEncoding::Binary).unwrap();
        write_labels_txt(&cat.join("GT").join("0_bad.txt"), &SQUARE[..2], &[1, 0]).unwrap();
        create_text(&cat.join("GT").join("1_good.txt"), "0,0,0,0\n");

        let report = verify_dataset(temp_dir.path(), &LayoutConfig::default());

        assert_eq!(report.violations.len(), 2);
        assert!(matches!(
            report.violations[0],
            Violation::MaskMismatch {
                mask_rows: 2,
                points: 4,
                ..
            }
        ));
        assert!(matches!(report.violations[1], Violation::GoodMask(_)));
    }
}
