//! Conversion of label artifacts and train meshes into PCD point clouds.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use super::assembly::replace_dir;
use super::catalog::{list_files, Category};
use super::labeling::LABEL_EXTENSION;
use crate::config::{LayoutConfig, PcdEncoding};
use crate::core::loaders::{load_label_points, load_stl_vertices, PointCloud};
use crate::core::transforms::normalize_cloud;
use crate::core::writers::write_pcd;

/// Counts describing one conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub test: usize,
    pub train: usize,
    pub failed: usize,
}

impl ConversionSummary {
    fn merge(&mut self, other: ConversionSummary) {
        self.test += other.test;
        self.train += other.train;
        self.failed += other.failed;
    }
}

/// Convert every file of `src_dir` with `extension` into `<out_dir>/<stem>.pcd`.
///
/// `read` produces the points to write. Per-file failures are logged and
/// counted, not propagated.
fn convert_folder<F>(
    src_dir: &Path,
    out_dir: &Path,
    extension: &str,
    encoding: PcdEncoding,
    read: F,
) -> Result<(usize, usize)>
where
    F: Fn(&Path) -> Result<PointCloud>,
{
    let files: Vec<PathBuf> = list_files(src_dir, Some(extension));

    replace_dir(out_dir, |staging| {
        let mut converted = 0;
        let mut failed = 0;

        for file in &files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let out_path = staging.join(format!("{}.pcd", stem));

            let result = read(file.as_path()).and_then(|cloud| {
                write_pcd(&out_path, cloud.as_slice(), encoding)?;
                Ok(cloud.len())
            });

            match result {
                Ok(points) => {
                    debug!("{} -> {} ({} points)", file.display(), out_path.display(), points);
                    converted += 1;
                }
                Err(e) => {
                    warn!("Failed to convert {}: {:#}", file.display(), e);
                    failed += 1;
                }
            }
        }

        Ok((converted, failed))
    })
}

/// Read the coordinate columns of a label artifact.
fn read_label_cloud(path: &Path) -> Result<PointCloud> {
    let labeled = load_label_points(path)
        .with_context(|| format!("Failed to read labels {}", path.display()))?;
    Ok(labeled.cloud)
}

/// Read a train mesh and center it on its centroid.
fn read_train_cloud(path: &Path) -> Result<PointCloud> {
    let cloud = load_stl_vertices(path)
        .with_context(|| format!("Failed to read mesh {}", path.display()))?;
    if cloud.is_empty() {
        anyhow::bail!("mesh has no vertices");
    }
    if !cloud.is_finite() {
        anyhow::bail!("mesh has non-finite vertices");
    }
    Ok(normalize_cloud(&cloud))
}

/// Convert one category.
///
/// Label artifacts become `<test_out_dir>/<stem>.pcd` and train meshes become
/// `<train_out_dir>/<stem>.pcd`. An output folder is only produced when its
/// source folder exists.
pub fn convert_category(
    category: &Category,
    layout: &LayoutConfig,
    encoding: PcdEncoding,
) -> Result<ConversionSummary> {
    let mut summary = ConversionSummary::default();

    let labels_dir = category.path.join(&layout.labels_dir);
    if labels_dir.is_dir() {
        let (converted, failed) = convert_folder(
            &labels_dir,
            &category.path.join(&layout.test_out_dir),
            LABEL_EXTENSION,
            encoding,
            read_label_cloud,
        )?;
        summary.test = converted;
        summary.failed += failed;
    }

    let train_dir = category.path.join(&layout.train_dir);
    if train_dir.is_dir() {
        let (converted, failed) = convert_folder(
            &train_dir,
            &category.path.join(&layout.train_out_dir),
            &layout.mesh_extension,
            encoding,
            read_train_cloud,
        )?;
        summary.train = converted;
        summary.failed += failed;
    }

    info!(
        "{}: converted {} test and {} train clouds",
        category.name, summary.test, summary.train
    );
    Ok(summary)
}

/// Convert every category. Failures are logged per category.
pub fn convert_categories(
    categories: &[Category],
    layout: &LayoutConfig,
    encoding: PcdEncoding,
) -> ConversionSummary {
    let mut total = ConversionSummary::default();
    for category in categories {
        match convert_category(category, layout, encoding) {
            Ok(summary) => total.merge(summary),
            Err(e) => warn!("{}: conversion failed: {:#}", category.name, e),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_pcd;
    use crate::test_support::{create_binary_stl, create_square_stl, create_text, file_names};
    use tempfile::TempDir;

    fn category(temp_dir: &TempDir) -> Category {
        Category {
            name: "capsule".to_string(),
            path: temp_dir.path().join("capsule"),
        }
    }

    #[test]
    fn test_convert_category() {
        let temp_dir = TempDir::new().unwrap();
        let cat = category(&temp_dir);
        create_text(
            &cat.path.join("gt1").join("0_bad.txt"),
            "-5.000000,-5.000000,0.000000,1\n5.000000,5.000000,0.000000,0\n",
        );
        create_square_stl(&cat.path.join("train").join("0_good.stl"));

        let summary = convert_category(&cat, &LayoutConfig::default(), PcdEncoding::Binary).unwrap();

        assert_eq!(summary, ConversionSummary { test: 1, train: 1, failed: 0 });

        let test_cloud = load_pcd(cat.path.join("test1").join("0_bad.pcd")).unwrap();
        assert_eq!(test_cloud.points, vec![[-5.0, -5.0, 0.0], [5.0, 5.0, 0.0]]);

        let train_cloud = load_pcd(cat.path.join("train1").join("0_good.pcd")).unwrap();
        assert_eq!(train_cloud.len(), 4);
        assert_eq!(train_cloud.points[0], [-5.0, -5.0, 0.0]);
    }

    #[test]
    fn test_train_mesh_with_nan_vertex_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let cat = category(&temp_dir);
        create_square_stl(&cat.path.join("train").join("0_good.stl"));
        create_binary_stl(
            &cat.path.join("train").join("1_good.stl"),
            &[[[0.0, f32::NAN, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]]],
        );

        let summary = convert_category(&cat, &LayoutConfig::default(), PcdEncoding::Binary).unwrap();

        assert_eq!(summary, ConversionSummary { test: 0, train: 1, failed: 1 });
        assert_eq!(file_names(&cat.path.join("train1")), vec!["0_good.pcd"]);
    }

    #[test]
    fn test_failed_files_are_counted() {
        let temp_dir = TempDir::new().unwrap();
        let cat = category(&temp_dir);
        create_text(&cat.path.join("gt1").join("0_bad.txt"), "1,2\n");
        create_text(&cat.path.join("gt1").join("1_good.txt"), "1,2,3,0\n");

        let summary = convert_category(&cat, &LayoutConfig::default(), PcdEncoding::Ascii).unwrap();

        assert_eq!(summary.test, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(file_names(&cat.path.join("test1")), vec!["1_good.pcd"]);
        assert!(!cat.path.join("train1").exists());
    }
}
