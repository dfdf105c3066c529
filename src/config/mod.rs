//! Configuration types for the dataset pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for per-vertex anomaly labeling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingConfig {
    /// Maximum nearest-vertex distance for a ground-truth point to mark a vertex.
    /// Expressed in the mesh's native units.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Extension of the ground-truth marker files next to each defective sample
    #[serde(default = "default_gt_extension")]
    pub gt_extension: String,
}

fn default_tolerance() -> f64 {
    1000.0
}

fn default_gt_extension() -> String {
    "txt".to_string()
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            gt_extension: default_gt_extension(),
        }
    }
}

/// Folder names used in the raw, intermediate and final trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Sensor folder whose contents are lifted into the category folder
    #[serde(default = "default_sensor_dir")]
    pub sensor_dir: String,

    /// Raw train folder
    #[serde(default = "default_train_dir")]
    pub train_dir: String,

    /// Raw test folder
    #[serde(default = "default_test_dir")]
    pub test_dir: String,

    /// Raw ground-truth folder
    #[serde(default = "default_gt_dir")]
    pub gt_dir: String,

    /// Intermediate folder for label artifacts
    #[serde(default = "default_labels_dir")]
    pub labels_dir: String,

    /// Intermediate folder for converted test clouds
    #[serde(default = "default_test_out_dir")]
    pub test_out_dir: String,

    /// Intermediate folder for converted train clouds
    #[serde(default = "default_train_out_dir")]
    pub train_out_dir: String,

    /// Name of the assembled dataset folder
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Test subfolders that never hold defect samples
    #[serde(default = "default_reserved_dirs")]
    pub reserved_dirs: Vec<String>,

    /// Mesh file extension
    #[serde(default = "default_mesh_extension")]
    pub mesh_extension: String,
}

fn default_sensor_dir() -> String {
    "Pointcloud".to_string()
}

fn default_train_dir() -> String {
    "train".to_string()
}

fn default_test_dir() -> String {
    "test".to_string()
}

fn default_gt_dir() -> String {
    "GT".to_string()
}

fn default_labels_dir() -> String {
    "gt1".to_string()
}

fn default_test_out_dir() -> String {
    "test1".to_string()
}

fn default_train_out_dir() -> String {
    "train1".to_string()
}

fn default_output_name() -> String {
    "MulSen_AD_processed".to_string()
}

fn default_reserved_dirs() -> Vec<String> {
    vec!["good".to_string(), "color".to_string()]
}

fn default_mesh_extension() -> String {
    "stl".to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            sensor_dir: default_sensor_dir(),
            train_dir: default_train_dir(),
            test_dir: default_test_dir(),
            gt_dir: default_gt_dir(),
            labels_dir: default_labels_dir(),
            test_out_dir: default_test_out_dir(),
            train_out_dir: default_train_out_dir(),
            output_name: default_output_name(),
            reserved_dirs: default_reserved_dirs(),
            mesh_extension: default_mesh_extension(),
        }
    }
}

impl LayoutConfig {
    /// Folders created by the pipeline inside each category.
    pub fn intermediate_dirs(&self) -> [&str; 3] {
        [
            self.labels_dir.as_str(),
            self.test_out_dir.as_str(),
            self.train_out_dir.as_str(),
        ]
    }
}

/// Encoding of the PCD payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcdEncoding {
    #[default]
    Binary,
    Ascii,
}

/// Configuration for point cloud conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default)]
    pub encoding: PcdEncoding,
}

/// Configuration for manifest emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "default_train_manifest")]
    pub train_file: String,

    #[serde(default = "default_test_manifest")]
    pub test_file: String,

    /// Number of records logged per manifest after writing
    #[serde(default = "default_preview_count")]
    pub preview_count: usize,
}

fn default_train_manifest() -> String {
    "train.json".to_string()
}

fn default_test_manifest() -> String {
    "test.json".to_string()
}

fn default_preview_count() -> usize {
    3
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            train_file: default_train_manifest(),
            test_file: default_test_manifest(),
            preview_count: default_preview_count(),
        }
    }
}

/// Configuration for the stage runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Pause between stages in milliseconds (0 disables)
    #[serde(default = "default_stage_delay_ms")]
    pub stage_delay_ms: u64,

    /// Remove intermediate folders from the raw tree after assembly
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,
}

fn default_stage_delay_ms() -> u64 {
    1000
}

fn default_cleanup() -> bool {
    true
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            stage_delay_ms: default_stage_delay_ms(),
            cleanup: default_cleanup(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub labeling: LabelingConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,

    #[serde(default)]
    pub stages: StageConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
