//! Pipeline stages.

pub mod assembly;
pub mod catalog;
pub mod conversion;
pub mod labeling;
pub mod manifest;
pub mod matching;
pub mod pipeline;
pub mod sorting;
pub mod verify;

// Re-export key types for convenience
pub use assembly::{create_final_dataset, replace_dir, AssemblyError};
pub use catalog::{Category, Sample, SampleKind, Split};
pub use manifest::{ManifestRecord, Manifests};
pub use matching::{mark_anomalies, mark_anomalies_with_stats, MatchStats, VertexIndex};
pub use pipeline::{run_all, PipelineReport};
pub use verify::{verify_dataset, VerifyReport};
