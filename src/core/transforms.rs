//! Geometric point set operations.
//!
//! Centering a point set on its centroid and removing coincident mesh
//! vertices. Everything here is pure and allocation-light.

use std::collections::HashSet;

use super::loaders::PointCloud;

/// Compute the arithmetic mean of a point set, component-wise.
///
/// Returns `None` for an empty set.
pub fn centroid(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }

    let mut sum = [0.0f64; 3];
    for p in points {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
    }

    let n = points.len() as f64;
    Some([sum[0] / n, sum[1] / n, sum[2] / n])
}

/// Translate a point set so its centroid sits at the origin.
///
/// Returns a new vector; an empty input yields an empty output.
///
/// # Example
///
/// ```
/// use mulsen_pipeline::core::transforms::normalize;
///
/// let centered = normalize(&[[0.0, 0.0, 0.0], [2.0, 4.0, 6.0]]);
/// assert_eq!(centered, vec![[-1.0, -2.0, -3.0], [1.0, 2.0, 3.0]]);
/// ```
pub fn normalize(points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    let Some(center) = centroid(points) else {
        return Vec::new();
    };

    points
        .iter()
        .map(|p| [p[0] - center[0], p[1] - center[1], p[2] - center[2]])
        .collect()
}

/// Point-cloud wrapper around [`normalize`].
pub fn normalize_cloud(cloud: &PointCloud) -> PointCloud {
    PointCloud::from_points(normalize(cloud.as_slice()))
}

/// Bit pattern of a coordinate with `-0.0` folded onto `0.0`.
#[inline]
fn coord_key(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

/// Remove exactly coincident vertices, keeping the first occurrence of each.
pub fn dedup_vertices(points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    let mut seen: HashSet<[u64; 3]> = HashSet::with_capacity(points.len());
    let mut unique = Vec::with_capacity(points.len());

    for p in points {
        let key = [coord_key(p[0]), coord_key(p[1]), coord_key(p[2])];
        if seen.insert(key) {
            unique.push(*p);
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_centroid_basic() {
        let points = vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [10.0, 10.0, 0.0]];
        assert_eq!(centroid(&points), Some([5.0, 5.0, 0.0]));
    }

    #[test]
    fn test_centroid_empty() {
        assert_eq!(centroid(&[]), None);
    }

    #[test]
    fn test_normalize_centers_on_origin() {
        let points = vec![[1.0, 2.0, 3.0], [3.0, 6.0, 9.0], [-4.0, 1.0, 0.0]];
        let centered = normalize(&points);

        assert_eq!(centered.len(), 3);
        assert_close(centroid(&centered).unwrap(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let points = vec![[1.5, -2.0, 7.25], [3.0, 6.0, 9.0], [100.0, 0.1, -3.0], [0.0, 0.0, 0.0]];
        let once = normalize(&points);
        let twice = normalize(&once);

        for (a, b) in once.iter().zip(twice.iter()) {
            assert_close(*a, *b);
        }
    }

    #[test]
    fn test_normalize_single_point() {
        assert_eq!(normalize(&[[4.0, 5.0, 6.0]]), vec![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_dedup_vertices_keeps_first_occurrence() {
        let points = vec![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, -0.0, 1.0],
            [0.0, 0.0, 1.0],
        ];
        let unique = dedup_vertices(&points);

        assert_eq!(unique, vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, -0.0, 1.0]]);
    }

    #[test]
    fn test_normalize_cloud() {
        let cloud = PointCloud::from_points(vec![[2.0, 2.0, 2.0], [4.0, 4.0, 4.0]]);
        let centered = normalize_cloud(&cloud);
        assert_eq!(centered.points, vec![[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]]);
    }
}
