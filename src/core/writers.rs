//! Data writers for label artifacts and PCD point clouds.
//!
//! This module provides functions for writing:
//! - Label artifacts: normalized `x,y,z,label` rows, no header
//! - PCD point clouds with x, y, z fields, binary or ASCII payload

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use thiserror::Error;

use super::transforms::normalize;
use crate::config::PcdEncoding;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("array length mismatch: coords has {coords_len} elements, labels has {labels_len} elements")]
    LengthMismatch { coords_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a per-vertex label artifact.
///
/// The vertices are centered on their centroid first, then one row per vertex
/// is written as `x,y,z,label` with six decimals for coordinates and an
/// integer label. There is no header row.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `vertices` - Raw mesh vertices
/// * `labels` - One 0/1 label per vertex
///
/// # Errors
///
/// Returns an error if:
/// - `vertices` and `labels` have different lengths
/// - Parent directories cannot be created
/// - File cannot be created or written to
///
/// # Example
///
/// ```no_run
/// use mulsen_pipeline::core::writers::write_labels_txt;
/// use std::path::Path;
///
/// let vertices = vec![[1.0f64, 2.0, 3.0], [3.0, 4.0, 5.0]];
/// let labels = vec![0u8, 1];
/// write_labels_txt(Path::new("0_bad.txt"), &vertices, &labels).unwrap();
/// ```
pub fn write_labels_txt(path: &Path, vertices: &[[f64; 3]], labels: &[u8]) -> Result<()> {
    if vertices.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            coords_len: vertices.len(),
            labels_len: labels.len(),
        });
    }

    ensure_parent_dirs(path)?;
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(buf_writer);

    let path_str = path.display().to_string();

    for (coord, label) in normalize(vertices).iter().zip(labels.iter()) {
        csv_writer
            .write_record(&[
                format!("{:.6}", coord[0]),
                format!("{:.6}", coord[1]),
                format!("{:.6}", coord[2]),
                label.to_string(),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Build the PCD v0.7 header for an unorganized x, y, z float cloud.
fn pcd_header(num_points: usize, encoding: PcdEncoding) -> String {
    let data = match encoding {
        PcdEncoding::Binary => "binary",
        PcdEncoding::Ascii => "ascii",
    };

    format!(
        "# .PCD v0.7 - Point Cloud Data file format\n\
         VERSION 0.7\n\
         FIELDS x y z\n\
         SIZE 4 4 4\n\
         TYPE F F F\n\
         COUNT 1 1 1\n\
         WIDTH {n}\n\
         HEIGHT 1\n\
         VIEWPOINT 0 0 0 1 0 0 0\n\
         POINTS {n}\n\
         DATA {data}\n",
        n = num_points,
        data = data
    )
}

/// Write points to a PCD file with x, y, z float fields.
///
/// Coordinates are stored as 32-bit floats; the binary payload is
/// little-endian. Nothing else (colors, normals, labels) is written.
///
/// # Errors
///
/// Returns an error if the file or its parent directories cannot be created,
/// or if writing fails.
pub fn write_pcd(path: &Path, points: &[[f64; 3]], encoding: PcdEncoding) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let wrap = |e: std::io::Error| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    writer
        .write_all(pcd_header(points.len(), encoding).as_bytes())
        .map_err(wrap)?;

    match encoding {
        PcdEncoding::Binary => {
            for p in points {
                for &v in p {
                    writer.write_f32::<LittleEndian>(v as f32).map_err(wrap)?;
                }
            }
        }
        PcdEncoding::Ascii => {
            for p in points {
                writeln!(writer, "{} {} {}", p[0] as f32, p[1] as f32, p[2] as f32)
                    .map_err(wrap)?;
            }
        }
    }

    writer.flush().map_err(wrap)?;
    Ok(())
}
