//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{LabeledPoints, LoaderError, PointCloud};
pub use writers::{write_labels_txt, write_pcd, WriteError};
