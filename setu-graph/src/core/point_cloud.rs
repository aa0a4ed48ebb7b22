//! 3D point cloud.

use nalgebra::{Point3, Vector3};

use super::pose::Pose3;

/// Unordered set of 3D points in meters, expressed in the sensor frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// Points.
    pub points: Vec<Point3<f64>>,
}

impl PointCloud {
    /// Empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty cloud with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Wrap existing points.
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Append a point.
    #[inline]
    pub fn push(&mut self, point: Point3<f64>) {
        self.points.push(point);
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over points.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Point3<f64>> {
        self.points.iter()
    }

    /// Apply a rigid transform to every point.
    pub fn transform(&self, pose: &Pose3) -> PointCloud {
        PointCloud {
            points: self.points.iter().map(|p| pose.transform_point(p)).collect(),
        }
    }

    /// Mean of all points, `None` for an empty cloud.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.points.iter().map(|p| p.coords).sum();
        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// Subset of points by index.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        PointCloud {
            points: indices
                .iter()
                .filter_map(|&i| self.points.get(i).copied())
                .collect(),
        }
    }
}

impl FromIterator<Point3<f64>> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point3<f64>>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_centroid() {
        let cloud: PointCloud = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 4.0),
        ]
        .into_iter()
        .collect();
        let c = cloud.centroid().unwrap();
        assert_relative_eq!(c.coords, Vector3::new(2.0 / 3.0, 2.0 / 3.0, 4.0 / 3.0), epsilon = 1e-12);
        assert!(PointCloud::new().centroid().is_none());
    }

    #[test]
    fn test_transform_translation() {
        let cloud = PointCloud::from_points(vec![Point3::new(1.0, 0.0, 0.0)]);
        let moved = cloud.transform(&Pose3::from_translation(0.0, 1.0, 0.0));
        assert_relative_eq!(moved.points[0].coords, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_select_skips_out_of_range() {
        let cloud = PointCloud::from_points(vec![Point3::origin(), Point3::new(1.0, 1.0, 1.0)]);
        assert_eq!(cloud.select(&[1, 7]).len(), 1);
    }
}
