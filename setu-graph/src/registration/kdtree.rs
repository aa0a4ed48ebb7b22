//! kd-tree wrapper over a point cloud.
//!
//! Scans are full of structure that a plain kd-tree handles badly: exact
//! duplicate returns and whole planes that share one coordinate. The
//! underlying tree cannot split a bucket whose items all share the split
//! axis value, so the index stores each distinct position once and keys
//! the tree in a fixed oblique frame. Rotations preserve distances, so
//! queries are answered in that frame without any correction.

use std::collections::HashMap;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Rotation3};

/// Euler angles of the oblique indexing frame.
const FRAME_ANGLES: (f64, f64, f64) = (0.614_213_562, 0.372_050_807, 0.836_660_026);

/// Nearest-neighbor index over a fixed set of points.
///
/// Item ids are indices into the slice the index was built from. Points
/// with non-finite coordinates are never returned.
pub struct PointIndex {
    tree: KdTree<f64, 3>,
    frame: Rotation3<f64>,
    /// Source indices per distinct position, lowest index first.
    groups: Vec<Vec<usize>>,
    len: usize,
}

impl PointIndex {
    /// Build from points.
    pub fn build(points: &[Point3<f64>]) -> Self {
        let frame = Rotation3::from_euler_angles(FRAME_ANGLES.0, FRAME_ANGLES.1, FRAME_ANGLES.2);
        let mut slots: HashMap<[u64; 3], usize> = HashMap::with_capacity(points.len());
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut tree: KdTree<f64, 3> = KdTree::with_capacity(points.len());
        let mut len = 0;

        for (i, p) in points.iter().enumerate() {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                continue;
            }
            len += 1;
            match slots.get(&position_key(p)) {
                Some(&slot) => groups[slot].push(i),
                None => {
                    let slot = groups.len();
                    slots.insert(position_key(p), slot);
                    groups.push(vec![i]);
                    tree.add(&to_frame(&frame, p), slot as u64);
                }
            }
        }

        Self {
            tree,
            frame,
            groups,
            len,
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Closest point as `(index, squared distance)`.
    ///
    /// Among duplicates of the closest position the lowest index wins.
    pub fn nearest(&self, query: &Point3<f64>) -> Option<(usize, f64)> {
        if self.len == 0 {
            return None;
        }
        let nn = self
            .tree
            .nearest_one::<SquaredEuclidean>(&to_frame(&self.frame, query));
        Some((self.groups[nn.item as usize][0], nn.distance))
    }

    /// Indices of all points within `radius`, unsorted.
    pub fn within(&self, query: &Point3<f64>, radius: f64) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }
        self.tree
            .within_unsorted::<SquaredEuclidean>(&to_frame(&self.frame, query), radius * radius)
            .into_iter()
            .flat_map(|nn| self.groups[nn.item as usize].iter().copied())
            .collect()
    }
}

fn to_frame(frame: &Rotation3<f64>, p: &Point3<f64>) -> [f64; 3] {
    let r = frame * p;
    [r.x, r.y, r.z]
}

/// Bit pattern of a position, with `-0.0` folded onto `0.0`.
fn position_key(p: &Point3<f64>) -> [u64; 3] {
    [p.x, p.y, p.z].map(|v| if v == 0.0 { 0u64 } else { v.to_bits() })
}
