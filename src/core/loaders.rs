//! Data loaders for meshes, ground-truth markers, label artifacts and PCD clouds.
//!
//! This module provides parsers for:
//! - STL meshes (ASCII or binary), reduced to their deduplicated vertex set
//! - Ground-truth anomaly marker files (comma-delimited x, y, z rows)
//! - Label artifacts written by the label writer (x, y, z, label rows)
//! - PCD point clouds written by the conversion stage (x, y, z fields)

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};
use thiserror::Error;

use super::transforms::dedup_vertices;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid STL file {path}: {details}")]
    InvalidStl { path: PathBuf, details: String },

    #[error("Invalid PCD file: {0}")]
    InvalidPcd(String),

    #[error("Row {row} of {path} has {found} columns, expected at least 3")]
    MissingColumns {
        path: PathBuf,
        row: usize,
        found: usize,
    },

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LoaderError {
    /// True when the source simply does not exist, as opposed to being unreadable or corrupt.
    pub fn is_not_found(&self) -> bool {
        match self {
            LoaderError::NotFound(_) => true,
            LoaderError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Ordered set of 3D points.
///
/// Used both for mesh vertex sets and for sparse ground-truth marker sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates a point cloud that owns the given points.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.points.push([x, y, z]);
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.points.iter().flatten().all(|v| v.is_finite())
    }

    /// Borrow the points as a slice of `[x, y, z]` arrays.
    #[inline]
    pub fn as_slice(&self) -> &[[f64; 3]] {
        &self.points
    }
}

/// Coordinates read back from a label artifact together with their labels.
#[derive(Debug, Clone, Default)]
pub struct LabeledPoints {
    pub cloud: PointCloud,
    pub labels: Vec<u8>,
}

impl LabeledPoints {
    /// Number of vertices flagged anomalous.
    pub fn anomalous_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l != 0).count()
    }
}

/// Load the deduplicated vertex set of an STL mesh.
///
/// Both ASCII and binary STL are accepted. Coincident vertices are merged so
/// each returned point is unique; order follows first appearance in the file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not a valid STL.
pub fn load_stl_vertices<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mesh = stl_io::read_stl(&mut reader).map_err(|e| LoaderError::InvalidStl {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    debug!(
        "{}: {} vertices, {} triangles",
        path.display(),
        mesh.vertices.len(),
        mesh.faces.len()
    );

    let raw: Vec<[f64; 3]> = mesh
        .vertices
        .iter()
        .map(|v| [v.0[0] as f64, v.0[1] as f64, v.0[2] as f64])
        .collect();

    Ok(PointCloud::from_points(dedup_vertices(&raw)))
}

/// Open a headerless, comma-delimited text file of numeric rows.
///
/// Blank lines and `#` comments are skipped and fields are trimmed.
fn read_delimited_rows(path: &Path) -> Result<Vec<StringRecord>> {
    if !path.exists() {
        return Err(LoaderError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        rows.push(record);
    }
    Ok(rows)
}

fn parse_field(record: &StringRecord, idx: usize, path: &Path, row: usize) -> Result<f64> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<f64>().map_err(|_| {
        LoaderError::ParseError(format!(
            "{} row {} column {}: invalid number '{}'",
            path.display(),
            row,
            idx,
            raw
        ))
    })
}

fn parse_xyz(record: &StringRecord, path: &Path, row: usize) -> Result<[f64; 3]> {
    if record.len() < 3 {
        return Err(LoaderError::MissingColumns {
            path: path.to_path_buf(),
            row,
            found: record.len(),
        });
    }
    Ok([
        parse_field(record, 0, path, row)?,
        parse_field(record, 1, path, row)?,
        parse_field(record, 2, path, row)?,
    ])
}

/// Load sparse ground-truth anomaly coordinates.
///
/// Every row must have at least three numeric columns; only the first three
/// are kept. A single-row file yields a one-point set and an empty file yields
/// an empty set.
///
/// # Errors
///
/// - `LoaderError::NotFound` when the file does not exist
/// - `LoaderError::MissingColumns` when a row has fewer than three fields
/// - `LoaderError::ParseError` when a coordinate is not a number
pub fn load_gt_points<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let rows = read_delimited_rows(path)?;

    let mut cloud = PointCloud::with_capacity(rows.len());
    for (row, record) in rows.iter().enumerate() {
        let [x, y, z] = parse_xyz(record, path, row)?;
        cloud.push(x, y, z);
    }
    Ok(cloud)
}

/// Load ground-truth coordinates, treating any failure as "no known anomalies".
///
/// A missing file is logged at debug level, anything else at warn level.
pub fn load_gt_points_or_empty<P: AsRef<Path>>(path: P) -> PointCloud {
    let path = path.as_ref();
    match load_gt_points(path) {
        Ok(cloud) => cloud,
        Err(e) if e.is_not_found() => {
            debug!("no ground truth at {}", path.display());
            PointCloud::new()
        }
        Err(e) => {
            warn!("ignoring unreadable ground truth {}: {}", path.display(), e);
            PointCloud::new()
        }
    }
}

/// Load a label artifact (`x,y,z,label` rows).
///
/// Rows without a label column are read as label 0; any non-zero label is 1.
pub fn load_label_points<P: AsRef<Path>>(path: P) -> Result<LabeledPoints> {
    let path = path.as_ref();
    let rows = read_delimited_rows(path)?;

    let mut cloud = PointCloud::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());
    for (row, record) in rows.iter().enumerate() {
        let [x, y, z] = parse_xyz(record, path, row)?;
        let label = match record.get(3) {
            Some(raw) if !raw.is_empty() => {
                let value = parse_field(record, 3, path, row)?;
                u8::from(value != 0.0)
            }
            _ => 0,
        };
        cloud.push(x, y, z);
        labels.push(label);
    }

    Ok(LabeledPoints { cloud, labels })
}

/// Parsed subset of a PCD header.
#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub fields: Vec<String>,
    pub sizes: Vec<usize>,
    pub types: Vec<char>,
    pub points: usize,
    pub data: String,
}

fn read_pcd_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
    let mut fields: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut points: Option<usize> = None;
    let mut data: Option<String> = None;

    let mut line = String::new();
    while data.is_none() {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(LoaderError::InvalidPcd("missing DATA line".to_string()));
        }
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let mut parts = stripped.split_whitespace();
        let key = parts.next().unwrap_or_default();
        let values: Vec<&str> = parts.collect();
        match key {
            "FIELDS" => fields = values.iter().map(|s| s.to_string()).collect(),
            "SIZE" => {
                sizes = values
                    .iter()
                    .map(|s| s.parse::<usize>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| LoaderError::InvalidPcd(format!("bad SIZE line: {}", stripped)))?
            }
            "TYPE" => types = values.iter().filter_map(|s| s.chars().next()).collect(),
            "POINTS" => {
                points = values.first().and_then(|s| s.parse::<usize>().ok());
            }
            "DATA" => data = values.first().map(|s| s.to_string()),
            _ => {}
        }
    }

    let points = points.ok_or_else(|| LoaderError::InvalidPcd("missing POINTS".to_string()))?;
    let data = data.unwrap_or_default();

    if fields.len() < 3 || fields[..3] != ["x", "y", "z"] {
        return Err(LoaderError::InvalidPcd(format!(
            "expected leading x y z fields, found {:?}",
            fields
        )));
    }
    if sizes.len() != fields.len() || types.len() != fields.len() {
        return Err(LoaderError::InvalidPcd(
            "FIELDS, SIZE and TYPE lengths differ".to_string(),
        ));
    }

    Ok(PcdHeader {
        fields,
        sizes,
        types,
        points,
        data,
    })
}

/// Load the x, y, z coordinates of an ASCII or binary PCD file.
///
/// Binary payloads are read as little-endian; only `F` fields of size 4 or 8
/// are accepted for the coordinates.
pub fn load_pcd<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = read_pcd_header(&mut reader)?;

    let mut cloud = PointCloud::with_capacity(header.points);
    match header.data.as_str() {
        "ascii" => {
            for line in reader.lines() {
                if cloud.len() >= header.points {
                    break;
                }
                let line = line?;
                let values: Vec<&str> = line.split_whitespace().collect();
                if values.len() < 3 {
                    continue;
                }
                let mut xyz = [0.0f64; 3];
                for (axis, value) in xyz.iter_mut().enumerate() {
                    *value = values[axis].parse().map_err(|_| {
                        LoaderError::ParseError(format!("invalid coordinate '{}'", values[axis]))
                    })?;
                }
                cloud.push(xyz[0], xyz[1], xyz[2]);
            }
        }
        "binary" => {
            for i in 0..3 {
                if header.types[i] != 'F' || !(header.sizes[i] == 4 || header.sizes[i] == 8) {
                    return Err(LoaderError::InvalidPcd(format!(
                        "unsupported coordinate type {}{}",
                        header.types[i], header.sizes[i]
                    )));
                }
            }
            let trailing: usize = header.sizes[3..].iter().sum();
            let mut skip = vec![0u8; trailing];
            for _ in 0..header.points {
                let mut xyz = [0.0f64; 3];
                for (axis, value) in xyz.iter_mut().enumerate() {
                    *value = if header.sizes[axis] == 4 {
                        reader.read_f32::<LittleEndian>()? as f64
                    } else {
                        reader.read_f64::<LittleEndian>()?
                    };
                }
                reader.read_exact(&mut skip)?;
                cloud.push(xyz[0], xyz[1], xyz[2]);
            }
        }
        other => {
            return Err(LoaderError::InvalidPcd(format!(
                "unsupported DATA encoding '{}'",
                other
            )))
        }
    }

    if cloud.len() < header.points {
        return Err(LoaderError::InvalidPcd(format!(
            "Expected {} points, found {}",
            header.points,
            cloud.len()
        )));
    }

    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_binary_stl, write_square_stl};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_point_cloud_operations() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.as_slice()[1], [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_load_stl_vertices_deduplicates() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        write_square_stl(&mut file);
        file.flush().unwrap();

        let cloud = load_stl_vertices(file.path())?;

        // Two triangles, six corners, four distinct vertices
        assert_eq!(cloud.len(), 4);
        assert!(cloud.points.contains(&[0.0, 0.0, 0.0]));
        assert!(cloud.points.contains(&[10.0, 10.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_load_stl_vertices_binary() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        write_binary_stl(
            &mut file,
            &[
                [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]],
                [[10.0, 0.0, 0.0], [10.0, 10.0, 0.0], [0.0, 10.0, 0.0]],
            ],
        );
        file.flush().unwrap();

        let cloud = load_stl_vertices(file.path())?;

        assert_eq!(cloud.len(), 4);
        assert!(cloud.is_finite());
        assert!(cloud.points.contains(&[10.0, 10.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_load_stl_vertices_keeps_non_finite() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        write_binary_stl(
            &mut file,
            &[[[f32::NAN, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]]],
        );
        file.flush().unwrap();

        let cloud = load_stl_vertices(file.path())?;

        assert_eq!(cloud.len(), 3);
        assert!(!cloud.is_finite());
        Ok(())
    }

    #[test]
    fn test_load_stl_vertices_invalid() {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        writeln!(file, "not a mesh").unwrap();
        file.flush().unwrap();

        assert!(load_stl_vertices(file.path()).is_err());
    }

    #[test]
    fn test_load_gt_points_multiple_rows() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1.0,2.0,3.0,0.5").unwrap();
        writeln!(file, "4.0, 5.0, 6.0").unwrap();
        file.flush().unwrap();

        let cloud = load_gt_points(file.path())?;
        assert_eq!(cloud.points, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        Ok(())
    }

    #[test]
    fn test_load_gt_points_single_row() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "5.0,5.0,5.0").unwrap();
        file.flush().unwrap();

        let cloud = load_gt_points(file.path())?;
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.points[0], [5.0, 5.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_load_gt_points_without_trailing_newline() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "1,2,3").unwrap();
        file.flush().unwrap();

        assert_eq!(load_gt_points(file.path())?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_load_gt_points_empty_file() -> Result<()> {
        let file = NamedTempFile::new().unwrap();
        assert!(load_gt_points(file.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_gt_points_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_gt_points(dir.path().join("absent.txt")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_gt_points_too_few_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1.0,2.0").unwrap();
        file.flush().unwrap();

        match load_gt_points(file.path()).unwrap_err() {
            LoaderError::MissingColumns { found, .. } => assert_eq!(found, 2),
            other => panic!("Expected MissingColumns, got {other}"),
        }
    }

    #[test]
    fn test_load_gt_points_or_empty_on_corrupt() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a,b,c").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_gt_points(file.path()),
            Err(LoaderError::ParseError(_))
        ));
        assert!(load_gt_points_or_empty(file.path()).is_empty());
    }

    #[test]
    fn test_load_label_points() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "-1.000000,0.500000,0.000000,0").unwrap();
        writeln!(file, "1.000000,-0.500000,0.000000,1").unwrap();
        file.flush().unwrap();

        let labeled = load_label_points(file.path())?;
        assert_eq!(labeled.cloud.len(), 2);
        assert_eq!(labeled.labels, vec![0, 1]);
        assert_eq!(labeled.anomalous_count(), 1);
        Ok(())
    }

    #[test]
    fn test_load_pcd_ascii() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".pcd").unwrap();
        writeln!(file, "# .PCD v0.7 - Point Cloud Data file format").unwrap();
        writeln!(file, "VERSION 0.7").unwrap();
        writeln!(file, "FIELDS x y z").unwrap();
        writeln!(file, "SIZE 4 4 4").unwrap();
        writeln!(file, "TYPE F F F").unwrap();
        writeln!(file, "COUNT 1 1 1").unwrap();
        writeln!(file, "WIDTH 2").unwrap();
        writeln!(file, "HEIGHT 1").unwrap();
        writeln!(file, "VIEWPOINT 0 0 0 1 0 0 0").unwrap();
        writeln!(file, "POINTS 2").unwrap();
        writeln!(file, "DATA ascii").unwrap();
        writeln!(file, "1 2 3").unwrap();
        writeln!(file, "4 5 6").unwrap();
        file.flush().unwrap();

        let cloud = load_pcd(file.path())?;
        assert_eq!(cloud.points, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        Ok(())
    }

    #[test]
    fn test_load_pcd_truncated() {
        let mut file = NamedTempFile::with_suffix(".pcd").unwrap();
        writeln!(file, "FIELDS x y z").unwrap();
        writeln!(file, "SIZE 4 4 4").unwrap();
        writeln!(file, "TYPE F F F").unwrap();
        writeln!(file, "POINTS 3").unwrap();
        writeln!(file, "DATA ascii").unwrap();
        writeln!(file, "1 2 3").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_pcd(file.path()),
            Err(LoaderError::InvalidPcd(_))
        ));
    }
}
