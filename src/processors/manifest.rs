//! JSON-lines manifests for the assembled dataset.
//!
//! `train.json` and `test.json` list one record per point cloud:
//!
//! ```text
//! {"filename":"capsule/test/0_bad.pcd","label":1,"label_name":"defective","maskname":"capsule/GT/0_bad.txt","clsname":"capsule"}
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::catalog::{discover_categories, scan_samples, Category, SampleKind, Split};
use super::labeling::LABEL_EXTENSION;
use crate::config::{LayoutConfig, ManifestConfig};

/// One manifest line. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub filename: String,
    pub label: u8,
    pub label_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maskname: Option<String>,
    pub clsname: String,
}

/// Per-category sample counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub train: usize,
    pub test_good: usize,
    pub test_bad: usize,
}

/// Records of both splits.
#[derive(Debug, Clone, Default)]
pub struct Manifests {
    pub train: Vec<ManifestRecord>,
    pub test: Vec<ManifestRecord>,
    pub categories: usize,
}

impl Manifests {
    /// Sample counts keyed by category name.
    pub fn statistics(&self) -> BTreeMap<String, CategoryStats> {
        let mut stats: BTreeMap<String, CategoryStats> = BTreeMap::new();

        for record in &self.train {
            stats.entry(record.clsname.clone()).or_default().train += 1;
        }
        for record in &self.test {
            let entry = stats.entry(record.clsname.clone()).or_default();
            if record.label == 0 {
                entry.test_good += 1;
            } else {
                entry.test_bad += 1;
            }
        }

        stats
    }

    /// Records defective samples that have no mask.
    pub fn missing_masks(&self) -> usize {
        self.test
            .iter()
            .filter(|r| r.label == 1 && r.maskname.is_none())
            .count()
    }
}

/// Collect the records of one split of one category.
fn split_records(category: &Category, split: Split, layout: &LayoutConfig) -> Vec<ManifestRecord> {
    let split_dir = match split {
        Split::Train => &layout.train_dir,
        Split::Test => &layout.test_dir,
    };
    let gt_dir = category.path.join(&layout.gt_dir);
    let scan = scan_samples(&category.path.join(split_dir), "pcd");

    let mut records = Vec::with_capacity(scan.samples.len());
    for sample in scan.samples {
        let filename = format!("{}/{}/{}", category.name, split_dir, sample.file_name_with("pcd"));

        let maskname = match (split, sample.kind) {
            (Split::Train, SampleKind::Defective) => {
                warn!("Defective sample in train split, skipping: {}", filename);
                continue;
            }
            (Split::Test, SampleKind::Defective) => {
                let mask = sample.file_name_with(LABEL_EXTENSION);
                if gt_dir.join(&mask).is_file() {
                    Some(format!("{}/{}/{}", category.name, layout.gt_dir, mask))
                } else {
                    warn!("GT file not found for {}", filename);
                    None
                }
            }
            (_, SampleKind::Good) => None,
        };

        records.push(ManifestRecord {
            filename,
            label: sample.kind.label(),
            label_name: sample.kind.label_name().to_string(),
            maskname,
            clsname: category.name.clone(),
        });
    }

    records
}

/// Scan an assembled dataset and build the records of both splits.
///
/// Categories and files are visited in name order, so the result only depends
/// on the dataset content.
pub fn generate_manifests(output: &Path, layout: &LayoutConfig) -> Manifests {
    let categories = discover_categories(output, &[]);
    let mut manifests = Manifests {
        categories: categories.len(),
        ..Manifests::default()
    };

    for category in &categories {
        manifests.train.extend(split_records(category, Split::Train, layout));
        manifests.test.extend(split_records(category, Split::Test, layout));
    }

    manifests
}

/// Write records as newline-terminated JSON lines.
pub fn write_manifest(path: &Path, records: &[ManifestRecord]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a JSON-lines manifest back.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
        .collect()
}

/// Log per-category statistics and the first records of each manifest.
pub fn log_overview(manifests: &Manifests, preview_count: usize) {
    info!("Categories: {}", manifests.categories);
    for (name, stats) in manifests.statistics() {
        info!(
            "  {}: train={}, test_good={}, test_bad={}",
            name, stats.train, stats.test_good, stats.test_bad
        );
    }

    for (split, records) in [(Split::Train, &manifests.train), (Split::Test, &manifests.test)] {
        for record in records.iter().take(preview_count) {
            match serde_json::to_string_pretty(record) {
                Ok(json) => info!("{} preview:\n{}", split, json),
                Err(e) => warn!("Failed to render preview: {}", e),
            }
        }
    }
}

/// Generate and write both manifests at the dataset root.
pub fn write_manifests(
    output: &Path,
    layout: &LayoutConfig,
    config: &ManifestConfig,
) -> Result<Manifests> {
    let manifests = generate_manifests(output, layout);

    write_manifest(&output.join(&config.train_file), &manifests.train)?;
    write_manifest(&output.join(&config.test_file), &manifests.test)?;

    info!(
        "Generated {} with {} entries and {} with {} entries",
        config.train_file,
        manifests.train.len(),
        config.test_file,
        manifests.test.len()
    );
    log_overview(&manifests, config.preview_count);

    Ok(manifests)
}
