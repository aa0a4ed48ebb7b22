//! Fast Point Feature Histograms.
//!
//! For a pair `(p_s, n_s)`, `(p_t, n_t)` with `d = p_t − p_s`, the Darboux
//! frame `u = n_s`, `v = u × d/|d|`, `w = u × v` gives three angles:
//!
//! ```text
//! α = v·n_t          ∈ [−1, 1]
//! φ = u·d/|d|        ∈ [−1, 1]
//! θ = atan2(w·n_t, u·n_t)  ∈ [−π, π]
//! ```
//!
//! Each is binned into 11 bins. The SPFH of a point pairs it with every
//! neighbor; the FPFH adds the distance-weighted SPFHs of the neighbors.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::kdtree::PointIndex;
use super::normals::SurfaceNormal;
use crate::core::PointCloud;

/// Bins per angle.
pub const BINS_PER_FEATURE: usize = 11;

/// Descriptor length.
pub const FPFH_BINS: usize = 3 * BINS_PER_FEATURE;

/// One FPFH descriptor. Each 11-bin block sums to 1 (or 0 if empty).
pub type FpfhSignature = [f64; FPFH_BINS];

/// Compute descriptors for `keypoints` using the full cloud as support.
pub fn compute_fpfh(
    cloud: &PointCloud,
    index: &PointIndex,
    normals: &[Option<SurfaceNormal>],
    keypoints: &[usize],
    radius: f64,
) -> Vec<FpfhSignature> {
    let neighborhoods: Vec<Vec<usize>> = cloud
        .points
        .par_iter()
        .map(|p| index.within(p, radius))
        .collect();

    let spfh: Vec<FpfhSignature> = (0..cloud.len())
        .into_par_iter()
        .map(|i| simplified_histogram(i, &neighborhoods[i], &cloud.points, normals))
        .collect();

    keypoints
        .par_iter()
        .map(|k| {
            let mut feature = spfh[*k];
            let neighbors: Vec<usize> = neighborhoods[*k].iter().copied().filter(|j| j != k).collect();
            if !neighbors.is_empty() {
                let scale = 1.0 / neighbors.len() as f64;
                for j in &neighbors {
                    let dist = (cloud.points[*j] - cloud.points[*k]).norm();
                    if dist < 1e-12 {
                        continue;
                    }
                    let weight = scale / dist;
                    for (f, s) in feature.iter_mut().zip(spfh[*j].iter()) {
                        *f += weight * s;
                    }
                }
            }
            normalize_blocks(&mut feature);
            feature
        })
        .collect()
}

/// Squared L2 distance between descriptors.
#[inline]
pub fn descriptor_distance_sq(a: &FpfhSignature, b: &FpfhSignature) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn simplified_histogram(
    i: usize,
    neighbors: &[usize],
    points: &[Point3<f64>],
    normals: &[Option<SurfaceNormal>],
) -> FpfhSignature {
    let mut histogram = [0.0; FPFH_BINS];
    let Some(own) = normals[i] else {
        return histogram;
    };

    for j in neighbors {
        if *j == i {
            continue;
        }
        let Some(other) = normals[*j] else {
            continue;
        };
        let Some((alpha, phi, theta)) = pair_features(&points[i], &own.normal, &points[*j], &other.normal) else {
            continue;
        };
        histogram[bin(alpha, -1.0, 1.0)] += 1.0;
        histogram[BINS_PER_FEATURE + bin(phi, -1.0, 1.0)] += 1.0;
        histogram[2 * BINS_PER_FEATURE + bin(theta, -PI, PI)] += 1.0;
    }

    normalize_blocks(&mut histogram);
    histogram
}

/// Darboux-frame angles of a point pair, with the source chosen so that
/// its normal makes the smaller angle with the connecting line.
fn pair_features(
    p1: &Point3<f64>,
    n1: &Vector3<f64>,
    p2: &Point3<f64>,
    n2: &Vector3<f64>,
) -> Option<(f64, f64, f64)> {
    let d = p2 - p1;
    let dist = d.norm();
    if dist < 1e-12 {
        return None;
    }
    let d = d / dist;

    let (ns, nt, d) = if n1.dot(&d).abs() >= n2.dot(&d).abs() {
        (n1, n2, d)
    } else {
        (n2, n1, -d)
    };

    let u = *ns;
    let v = u.cross(&d);
    let v_norm = v.norm();
    if v_norm < 1e-12 {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let alpha = v.dot(nt);
    let phi = u.dot(&d);
    let theta = w.dot(nt).atan2(u.dot(nt));
    Some((alpha, phi, theta))
}

fn bin(value: f64, lo: f64, hi: f64) -> usize {
    let t = (value - lo) / (hi - lo);
    ((t * BINS_PER_FEATURE as f64).floor().max(0.0) as usize).min(BINS_PER_FEATURE - 1)
}

fn normalize_blocks(histogram: &mut FpfhSignature) {
    for block in histogram.chunks_mut(BINS_PER_FEATURE) {
        let sum: f64 = block.iter().sum();
        if sum > 0.0 {
            block.iter_mut().for_each(|h| *h /= sum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pose3;
    use crate::registration::normals::estimate_normals;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn blob(seed: u64) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..300)
            .map(|_| {
                Point3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-0.5..0.5),
                )
            })
            .collect()
    }

    fn describe(cloud: &PointCloud) -> Vec<FpfhSignature> {
        let index = PointIndex::build(&cloud.points);
        let normals = estimate_normals(cloud, &index, 0.4);
        let keypoints: Vec<usize> = (0..cloud.len()).step_by(10).collect();
        compute_fpfh(cloud, &index, &normals, &keypoints, 0.5)
    }

    #[test]
    fn test_blocks_are_normalized() {
        let features = describe(&blob(3));
        assert_eq!(features.len(), 30);
        for f in &features {
            for block in f.chunks(BINS_PER_FEATURE) {
                let sum: f64 = block.iter().sum();
                assert!(sum == 0.0 || (sum - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_pair_features_rigid_invariant() {
        let p1 = Point3::new(0.1, 0.2, 0.3);
        let n1 = Vector3::new(0.0, 0.3, 1.0).normalize();
        let p2 = Point3::new(0.5, -0.1, 0.2);
        let n2 = Vector3::new(0.4, 0.1, 0.9).normalize();
        let t = Pose3::from_xyz_rpy(2.0, -1.0, 0.5, 0.3, -0.2, 1.1);

        let a = pair_features(&p1, &n1, &p2, &n2).unwrap();
        let b = pair_features(
            &t.transform_point(&p1),
            &t.rotate_vector(&n1),
            &t.transform_point(&p2),
            &t.rotate_vector(&n2),
        )
        .unwrap();
        assert_relative_eq!(a.0, b.0, epsilon = 1e-9);
        assert_relative_eq!(a.1, b.1, epsilon = 1e-9);
        assert_relative_eq!(a.2, b.2, epsilon = 1e-9);
    }

    #[test]
    fn test_bin_edges() {
        assert_eq!(bin(-1.0, -1.0, 1.0), 0);
        assert_eq!(bin(1.0, -1.0, 1.0), BINS_PER_FEATURE - 1);
        assert_eq!(bin(0.0, -1.0, 1.0), 5);
        assert_eq!(bin(f64::NAN, -1.0, 1.0), 0);
    }

    #[test]
    fn test_identical_clouds_identical_descriptors() {
        let cloud = blob(9);
        let a = describe(&cloud);
        let b = describe(&cloud.clone());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(descriptor_distance_sq(x, y), 0.0);
        }
    }
}
