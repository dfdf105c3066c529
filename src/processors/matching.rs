//! Per-vertex anomaly labeling by nearest-neighbor matching.
//!
//! Ground-truth anomaly markers are sparse points that rarely coincide with a
//! mesh vertex. Each marker claims the single vertex nearest to it, provided
//! that vertex lies strictly closer than the tolerance. This module uses a
//! `kiddo` KD-tree built once per mesh for O(log n) nearest-vertex queries.
//!
//! # Example
//!
//! ```
//! use mulsen_pipeline::processors::matching::mark_anomalies;
//!
//! let vertices = vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [10.0, 10.0, 0.0]];
//! let labels = mark_anomalies(&vertices, &[[0.1, 0.1, 0.0]], 1000.0);
//! assert_eq!(labels, vec![1, 0, 0, 0]);
//! ```

use kiddo::{ImmutableKdTree, SquaredEuclidean};

/// Default matching tolerance in the mesh's native units.
pub const DEFAULT_TOLERANCE: f64 = 1000.0;

/// Counters describing one labeling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Ground-truth points considered
    pub gt_points: usize,
    /// Ground-truth points that claimed a vertex
    pub matched: usize,
    /// Ground-truth points farther than the tolerance, or non-finite
    pub ignored: usize,
    /// Distinct vertices labeled anomalous
    pub anomalous_vertices: usize,
}

/// Nearest-vertex index over a mesh vertex set.
///
/// Vertices with a non-finite coordinate are left out of the tree and can
/// never be matched.
pub struct VertexIndex {
    tree: ImmutableKdTree<f64, 3>,
    /// Tree item to position in the original vertex slice
    positions: Vec<usize>,
    len: usize,
}

impl VertexIndex {
    /// Build the index. Returns `None` when no vertex is finite.
    pub fn new(vertices: &[[f64; 3]]) -> Option<Self> {
        let (positions, finite): (Vec<usize>, Vec<[f64; 3]>) = vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.iter().all(|c| c.is_finite()))
            .map(|(i, v)| (i, *v))
            .unzip();

        if finite.is_empty() {
            return None;
        }

        let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&finite);
        Some(Self {
            tree,
            positions,
            len: vertices.len(),
        })
    }

    /// Number of vertices a label vector covers.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; vertex sets without a finite vertex are rejected by
    /// [`VertexIndex::new`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the vertex nearest to `query` and its Euclidean distance.
    ///
    /// Ties between equidistant vertices are resolved by the tree.
    #[inline]
    pub fn nearest(&self, query: &[f64; 3]) -> (usize, f64) {
        let nn = self.tree.nearest_one::<SquaredEuclidean>(query);
        (self.positions[nn.item as usize], nn.distance.sqrt())
    }

    /// Label every vertex claimed by a ground-truth point within `tolerance`.
    ///
    /// Labels only ever go from 0 to 1, so several markers landing on one
    /// vertex leave it at 1.
    pub fn label(&self, gt_points: &[[f64; 3]], tolerance: f64) -> (Vec<u8>, MatchStats) {
        let mut labels = vec![0u8; self.len];
        let mut stats = MatchStats {
            gt_points: gt_points.len(),
            ..MatchStats::default()
        };

        for point in gt_points {
            if !point.iter().all(|v| v.is_finite()) {
                stats.ignored += 1;
                continue;
            }

            let (idx, distance) = self.nearest(point);
            if distance < tolerance {
                labels[idx] = 1;
                stats.matched += 1;
            } else {
                stats.ignored += 1;
            }
        }

        stats.anomalous_vertices = labels.iter().filter(|&&l| l == 1).count();
        (labels, stats)
    }
}

/// Produce the per-vertex label vector for one sample, with counters.
///
/// The result always has `vertices.len()` entries. With no ground-truth
/// points the vector is all zeros and no index is built. Non-finite
/// vertices always keep label 0.
pub fn mark_anomalies_with_stats(
    vertices: &[[f64; 3]],
    gt_points: &[[f64; 3]],
    tolerance: f64,
) -> (Vec<u8>, MatchStats) {
    if gt_points.is_empty() {
        return (vec![0u8; vertices.len()], MatchStats::default());
    }

    match VertexIndex::new(vertices) {
        Some(index) => index.label(gt_points, tolerance),
        None => (
            vec![0u8; vertices.len()],
            MatchStats {
                gt_points: gt_points.len(),
                ignored: gt_points.len(),
                ..MatchStats::default()
            },
        ),
    }
}

/// Produce the per-vertex label vector for one sample.
///
/// See [`mark_anomalies_with_stats`].
pub fn mark_anomalies(vertices: &[[f64; 3]], gt_points: &[[f64; 3]], tolerance: f64) -> Vec<u8> {
    mark_anomalies_with_stats(vertices, gt_points, tolerance).0
}
