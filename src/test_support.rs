//! Shared fixtures for unit tests.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

/// Corners of the two-triangle square used across tests.
pub const SQUARE: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [10.0, 0.0, 0.0],
    [0.0, 10.0, 0.0],
    [10.0, 10.0, 0.0],
];

/// Write an ASCII STL of a 10x10 square split into two triangles.
pub fn write_square_stl(file: &mut impl Write) {
    writeln!(file, "solid square").unwrap();
    for tri in [[0usize, 1, 2], [1, 3, 2]] {
        writeln!(file, "  facet normal 0 0 1").unwrap();
        writeln!(file, "    outer loop").unwrap();
        for idx in tri {
            let v = SQUARE[idx];
            writeln!(file, "      vertex {} {} {}", v[0], v[1], v[2]).unwrap();
        }
        writeln!(file, "    endloop").unwrap();
        writeln!(file, "  endfacet").unwrap();
    }
    writeln!(file, "endsolid square").unwrap();
}

/// Create `path` (and its parents) holding the square STL.
pub fn create_square_stl(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(path).unwrap();
    write_square_stl(&mut file);
}

/// Write a binary STL holding the given triangles.
pub fn write_binary_stl(file: &mut impl Write, triangles: &[[[f32; 3]; 3]]) {
    file.write_all(&[0u8; 80]).unwrap();
    file.write_u32::<LittleEndian>(triangles.len() as u32).unwrap();
    for tri in triangles {
        for v in [0.0f32, 0.0, 1.0] {
            file.write_f32::<LittleEndian>(v).unwrap();
        }
        for vertex in tri {
            for &v in vertex {
                file.write_f32::<LittleEndian>(v).unwrap();
            }
        }
        file.write_u16::<LittleEndian>(0).unwrap();
    }
}

/// Create `path` (and its parents) holding a binary STL of `triangles`.
pub fn create_binary_stl(path: &Path, triangles: &[[[f32; 3]; 3]]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(path).unwrap();
    write_binary_stl(&mut file, triangles);
}

/// Create `path` (and its parents) with the given text content.
pub fn create_text(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Sorted file names directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Build a raw MulSen-style category with one good and one defective test mesh.
///
/// Layout:
/// ```text
/// <root>/<name>/Pointcloud/train/a.stl
/// <root>/<name>/Pointcloud/test/good/g.stl
/// <root>/<name>/Pointcloud/test/crack/c.stl
/// <root>/<name>/Pointcloud/GT/crack/c.txt
/// <root>/<name>/Pointcloud/test/color/x.stl
/// ```
pub fn create_raw_category(root: &Path, name: &str) {
    let base = root.join(name).join("Pointcloud");
    create_square_stl(&base.join("train").join("a.stl"));
    create_square_stl(&base.join("test").join("good").join("g.stl"));
    create_square_stl(&base.join("test").join("crack").join("c.stl"));
    create_text(&base.join("GT").join("crack").join("c.txt"), "0.1,0.1,0\n");
    create_square_stl(&base.join("test").join("color").join("x.stl"));
}
