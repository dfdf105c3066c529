//! MulSen 3D anomaly-detection dataset pipeline.
//!
//! This crate provides tools for:
//! - Reorganizing raw per-category mesh folders into an enumerated layout
//! - Labeling mesh vertices against sparse ground-truth anomaly markers
//! - Converting labeled meshes and train meshes to PCD point clouds
//! - Assembling the final dataset tree and its JSON-lines manifests
//!
//! # Example
//!
//! ```no_run
//! use mulsen_pipeline::{processors::pipeline::run_all, PipelineConfig};
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let report = run_all(Path::new("MulSen_AD"), Path::new("MulSen_AD_processed"), &config).unwrap();
//! println!("{} test samples", report.manifests.test.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{LabelingConfig, LayoutConfig, PipelineConfig};
pub use core::loaders::{LabeledPoints, PointCloud};
pub use processors::matching::mark_anomalies;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
