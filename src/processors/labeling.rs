//! Per-sample label artifact generation.
//!
//! For every test mesh of a category, the deduplicated vertices are labeled
//! (all zero for good samples, nearest-vertex matching against the sample's
//! ground-truth markers for defective ones) and written as a normalized
//! `x,y,z,label` artifact into the category's label folder.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use super::assembly::replace_dir;
use super::catalog::{scan_samples, Category, Sample, SampleKind};
use super::matching::mark_anomalies_with_stats;
use crate::config::{LabelingConfig, LayoutConfig};
use crate::core::loaders::{load_gt_points_or_empty, load_stl_vertices};
use crate::core::writers::write_labels_txt;

/// Extension of the label artifacts.
pub const LABEL_EXTENSION: &str = "txt";

/// Counts describing one labeling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelingSummary {
    pub categories: usize,
    pub good: usize,
    pub defective: usize,
    /// Meshes that could not be read, had no vertices, or had non-finite ones
    pub skipped: usize,
    /// Files without a good/bad marker
    pub unclassified: usize,
    pub anomalous_vertices: usize,
}

impl LabelingSummary {
    /// Number of label artifacts written.
    pub fn labeled(&self) -> usize {
        self.good + self.defective
    }

    fn merge(&mut self, other: LabelingSummary) {
        self.categories += other.categories;
        self.good += other.good;
        self.defective += other.defective;
        self.skipped += other.skipped;
        self.unclassified += other.unclassified;
        self.anomalous_vertices += other.anomalous_vertices;
    }
}

/// Label one sample and write its artifact into `out_dir`.
///
/// Returns the number of anomalous vertices, or `None` if the sample was
/// skipped.
fn label_sample(
    sample: &Sample,
    gt_dir: &Path,
    out_dir: &Path,
    labeling: &LabelingConfig,
) -> Result<Option<usize>> {
    let vertices = match load_stl_vertices(&sample.path) {
        Ok(cloud) => cloud,
        Err(e) => {
            warn!("Skipping {}: {}", sample.path.display(), e);
            return Ok(None);
        }
    };

    if vertices.is_empty() {
        warn!("Skipping {}: mesh has no vertices", sample.path.display());
        return Ok(None);
    }
    if !vertices.is_finite() {
        warn!("Skipping {}: mesh has non-finite vertices", sample.path.display());
        return Ok(None);
    }

    let labels = match sample.kind {
        SampleKind::Good => vec![0u8; vertices.len()],
        SampleKind::Defective => {
            let gt_path = gt_dir.join(sample.file_name_with(&labeling.gt_extension));
            let gt_points = load_gt_points_or_empty(&gt_path);
            let (labels, stats) =
                mark_anomalies_with_stats(vertices.as_slice(), gt_points.as_slice(), labeling.tolerance);
            debug!(
                "{}: {} vertices, {} gt points, {} matched, {} ignored",
                sample.stem,
                vertices.len(),
                stats.gt_points,
                stats.matched,
                stats.ignored
            );
            labels
        }
    };

    let anomalous = labels.iter().filter(|&&l| l == 1).count();
    let out_path = out_dir.join(sample.file_name_with(LABEL_EXTENSION));
    write_labels_txt(&out_path, vertices.as_slice(), &labels)
        .with_context(|| format!("Failed to write labels for {}", sample.stem))?;

    Ok(Some(anomalous))
}

/// Write label artifacts for every test mesh of one category.
///
/// The category's label folder is rebuilt as a whole. Categories without a
/// test folder are left untouched.
pub fn label_category(
    category: &Category,
    layout: &LayoutConfig,
    labeling: &LabelingConfig,
) -> Result<LabelingSummary> {
    let test_dir = category.path.join(&layout.test_dir);
    if !test_dir.is_dir() {
        debug!("{}: no {} folder", category.name, layout.test_dir);
        return Ok(LabelingSummary::default());
    }

    let gt_dir = category.path.join(&layout.gt_dir);
    let out_dir = category.path.join(&layout.labels_dir);
    let scan = scan_samples(&test_dir, &layout.mesh_extension);

    let summary = replace_dir(&out_dir, |staging| {
        let mut summary = LabelingSummary {
            categories: 1,
            unclassified: scan.unclassified.len(),
            ..LabelingSummary::default()
        };

        for sample in &scan.samples {
            match label_sample(sample, &gt_dir, staging, labeling) {
                Ok(Some(anomalous)) => {
                    match sample.kind {
                        SampleKind::Good => summary.good += 1,
                        SampleKind::Defective => summary.defective += 1,
                    }
                    summary.anomalous_vertices += anomalous;
                }
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    warn!("{:#}", e);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    })?;

    info!(
        "{}: labeled {} good and {} defective samples ({} anomalous vertices)",
        category.name, summary.good, summary.defective, summary.anomalous_vertices
    );
    Ok(summary)
}

/// Label every category. Failures are logged per category.
pub fn label_categories(
    categories: &[Category],
    layout: &LayoutConfig,
    labeling: &LabelingConfig,
) -> LabelingSummary {
    let mut total = LabelingSummary::default();
    for category in categories {
        match label_category(category, layout, labeling) {
            Ok(summary) => total.merge(summary),
            Err(e) => warn!("{}: labeling failed: {:#}", category.name, e),
        }
    }
    total
}
