//! Full pipeline runner.
//!
//! Runs every stage in order over one raw dataset root:
//! flatten, reorganize, label, convert, assemble, cleanup, manifest.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::info;

use super::assembly::{cleanup_intermediate, create_final_dataset, AssemblySummary};
use super::catalog::{discover_categories, Category};
use super::conversion::{convert_categories, ConversionSummary};
use super::labeling::{label_categories, LabelingSummary};
use super::manifest::{write_manifests, Manifests};
use super::sorting::{flatten_sensor_folders, reorganize_categories, ReorganizeSummary};
use crate::config::{LayoutConfig, PipelineConfig};

/// Results of every stage of one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub categories: usize,
    pub flattened: usize,
    pub reorganized: ReorganizeSummary,
    pub labeling: LabelingSummary,
    pub conversion: ConversionSummary,
    pub assembly: AssemblySummary,
    pub cleaned: usize,
    pub manifests: Manifests,
}

/// Raw categories under `root`, skipping the output folder if it lives there.
pub fn raw_categories(root: &Path, output: &Path, layout: &LayoutConfig) -> Vec<Category> {
    let output_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| layout.output_name.clone());
    discover_categories(root, &[output_name.as_str()])
}

fn settle(delay_ms: u64) {
    if delay_ms > 0 {
        thread::sleep(Duration::from_millis(delay_ms));
    }
}

/// Run the whole pipeline from the raw tree at `root` to the dataset at `output`.
///
/// Sample-level problems are logged by each stage and never abort the run.
/// Errors are only returned when the output dataset or its manifests cannot
/// be written.
pub fn run_all(root: &Path, output: &Path, config: &PipelineConfig) -> Result<PipelineReport> {
    let layout = &config.layout;
    let delay = config.stages.stage_delay_ms;
    let categories = raw_categories(root, output, layout);
    info!("Found {} categories under {}", categories.len(), root.display());

    let mut report = PipelineReport {
        categories: categories.len(),
        ..PipelineReport::default()
    };

    info!("Stage 1/6: flattening sensor folders");
    report.flattened = flatten_sensor_folders(root, &categories, layout);
    settle(delay);

    info!("Stage 2/6: reorganizing samples");
    report.reorganized = reorganize_categories(&categories, layout);
    settle(delay);

    info!("Stage 3/6: labeling test meshes");
    report.labeling = label_categories(&categories, layout, &config.labeling);
    settle(delay);

    info!("Stage 4/6: converting to PCD");
    report.conversion = convert_categories(&categories, layout, config.conversion.encoding);
    settle(delay);

    info!("Stage 5/6: assembling {}", output.display());
    report.assembly = create_final_dataset(root, output, layout)?;
    if config.stages.cleanup {
        report.cleaned = cleanup_intermediate(&categories, layout);
    }
    settle(delay);

    info!("Stage 6/6: writing manifests");
    report.manifests = write_manifests(output, layout, &config.manifest)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{load_label_points, load_pcd};
    use crate::processors::manifest::read_manifest;
    use crate::test_support::{create_raw_category, file_names};
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.stages.stage_delay_ms = 0;
        config
    }

    #[test]
    fn test_run_all_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("MulSen_AD");
        create_raw_category(&root, "capsule");
        create_raw_category(&root, "spring_pad");
        let output = temp_dir.path().join("MulSen_AD_processed");

        let report = run_all(&root, &output, &test_config()).unwrap();

        assert_eq!(report.categories, 2);
        assert_eq!(report.labeling.defective, 2);
        assert_eq!(report.labeling.anomalous_vertices, 2);
        assert_eq!(report.assembly.good_masks_removed, 2);
        assert_eq!(report.cleaned, 6);

        let cat = output.join("capsule");
        assert_eq!(file_names(&cat.join("train")), vec!["0_good.pcd"]);
        assert_eq!(file_names(&cat.join("test")), vec!["0_bad.pcd", "1_good.pcd"]);
        assert_eq!(file_names(&cat.join("GT")), vec!["0_bad.txt"]);

        let mask = load_label_points(cat.join("GT").join("0_bad.txt")).unwrap();
        assert_eq!(mask.labels, vec![1, 0, 0, 0]);
        assert_eq!(load_pcd(cat.join("test").join("0_bad.pcd")).unwrap().len(), 4);

        let test = read_manifest(&output.join("test.json")).unwrap();
        assert_eq!(test.len(), 4);
        assert_eq!(test[0].maskname.as_deref(), Some("capsule/GT/0_bad.txt"));
        assert_eq!(read_manifest(&output.join("train.json")).unwrap().len(), 2);

        // Raw tree keeps no intermediate folders
        assert_eq!(file_names(&root.join("capsule")), vec!["GT", "test", "train"]);
    }

    #[test]
    fn test_run_twice_is_identical() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("MulSen_AD");
        create_raw_category(&root, "capsule");
        let output = temp_dir.path().join("MulSen_AD_processed");
        let mut config = test_config();
        config.stages.cleanup = false;

        let snapshot = |output: &Path| {
            [
                output.join("train.json"),
                output.join("test.json"),
                output.join("capsule").join("GT").join("0_bad.txt"),
                root.join("capsule").join("gt1").join("1_good.txt"),
            ]
            .map(|path| fs::read(path).unwrap())
        };

        run_all(&root, &output, &config).unwrap();
        let first = snapshot(&output);
        run_all(&root, &output, &config).unwrap();
        let second = snapshot(&output);

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("raw");
        fs::create_dir_all(&root).unwrap();
        let output = temp_dir.path().join("out");

        let report = run_all(&root, &output, &test_config()).unwrap();

        assert_eq!(report.categories, 0);
        assert!(output.join("train.json").exists());
        assert_eq!(fs::read_to_string(output.join("test.json")).unwrap(), "");
    }
}
