//! Full scan-to-scan verification pipeline.

use nalgebra::{Point3, Vector3};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::covariance::{self, CovarianceEstimate};
use super::fpfh::{FpfhSignature, compute_fpfh};
use super::icp::PointToPointIcp;
use super::kdtree::PointIndex;
use super::keypoints::harris_keypoints;
use super::normals::{SurfaceNormal, estimate_normals};
use super::sac_ia::{FeatureSet, sample_consensus};
use super::{Alignment, CovarianceMethod, InitMethod, RegistrationConfig, RegistrationError, RejectionReason};
use crate::core::{Key, PointCloud, Pose3};

/// One scan with its lazily built search structures.
struct PreparedScan<'a> {
    key: Key,
    cloud: &'a PointCloud,
    index: PointIndex,
    normals: Option<Vec<Option<SurfaceNormal>>>,
}

impl<'a> PreparedScan<'a> {
    fn new(key: Key, cloud: &'a PointCloud) -> Self {
        Self {
            key,
            cloud,
            index: PointIndex::build(&cloud.points),
            normals: None,
        }
    }

    fn normals(&mut self, radius: f64) -> &[Option<SurfaceNormal>] {
        let (cloud, index) = (self.cloud, &self.index);
        self.normals
            .get_or_insert_with(|| estimate_normals(cloud, index, radius))
    }
}

/// Verifies loop-closure candidates by registering their scans.
///
/// Owns the worker pool used for all per-point work; every parallel section
/// finishes before [`align`](Self::align) returns.
pub struct ScanAligner {
    config: RegistrationConfig,
    icp: PointToPointIcp,
    pool: ThreadPool,
}

impl ScanAligner {
    /// Create an aligner with its own thread pool of `icp.threads` workers.
    pub fn new(config: RegistrationConfig) -> Result<Self, RegistrationError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.icp.threads.max(1))
            .thread_name(|idx| format!("setu-align-{}", idx))
            .build()?;
        Ok(Self {
            icp: PointToPointIcp::new(config.icp.clone()),
            config,
            pool,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Register `scan_a` (taken at `pose_a`) against `scan_b` (at `pose_b`).
    ///
    /// On success the pose is that of `b` in the frame of `a`.
    pub fn align(
        &self,
        key_a: Key,
        scan_a: &PointCloud,
        pose_a: &Pose3,
        key_b: Key,
        scan_b: &PointCloud,
        pose_b: &Pose3,
    ) -> Result<Alignment, RejectionReason> {
        let min_points = self.config.icp.min_correspondences.max(3);
        for (key, scan) in [(key_a, scan_a), (key_b, scan_b)] {
            if scan.is_empty() {
                return Err(RejectionReason::EmptyScan(key));
            }
            if scan.len() < min_points {
                return Err(RejectionReason::TooFewPoints {
                    key,
                    count: scan.len(),
                });
            }
        }

        log::debug!("Aligning {} against {}", key_a, key_b);
        self.pool.install(|| {
            let mut source = PreparedScan::new(key_a, scan_a);
            let mut target = PreparedScan::new(key_b, scan_b);
            self.align_prepared(&mut source, pose_a, &mut target, pose_b)
        })
    }

    fn align_prepared(
        &self,
        source: &mut PreparedScan<'_>,
        pose_a: &Pose3,
        target: &mut PreparedScan<'_>,
        pose_b: &Pose3,
    ) -> Result<Alignment, RejectionReason> {
        let guess = self.initial_guess(source, pose_a, target, pose_b)?;

        let result = self
            .icp
            .align(source.cloud, target.cloud, &target.index, &guess);
        if !result.converged {
            log::debug!("ICP {} -> {}: not converged", source.key, target.key);
            return Err(RejectionReason::NotConverged);
        }
        if result.fitness > self.config.max_tolerable_fitness {
            log::debug!(
                "ICP {} -> {}: converged but fitness {:.4}",
                source.key,
                target.key,
                result.fitness
            );
            return Err(RejectionReason::FitnessTooHigh {
                fitness: result.fitness,
                max: self.config.max_tolerable_fitness,
            });
        }

        let estimate = self.covariance(
            &result.aligned,
            &result.correspondences,
            result.fitness,
            target,
        );

        log::debug!(
            "ICP {} -> {}: fitness {:.6} after {} iteration(s)",
            source.key,
            target.key,
            result.fitness,
            result.iterations
        );

        Ok(Alignment {
            pose: result.transform.inverse(),
            covariance: estimate.covariance,
            fitness: result.fitness,
            degraded_covariance: estimate.degraded,
        })
    }

    fn initial_guess(
        &self,
        source: &mut PreparedScan<'_>,
        pose_a: &Pose3,
        target: &mut PreparedScan<'_>,
        pose_b: &Pose3,
    ) -> Result<Pose3, RejectionReason> {
        match self.config.init_method {
            InitMethod::Identity => Ok(Pose3::identity()),
            InitMethod::Odometry => Ok(pose_b.between(pose_a)),
            InitMethod::OdometryRotation => {
                let relative = pose_b.between(pose_a);
                Ok(Pose3::new(relative.rotation, Vector3::zeros()))
            }
            InitMethod::Features => self.feature_guess(source, target),
        }
    }

    fn feature_guess(
        &self,
        source: &mut PreparedScan<'_>,
        target: &mut PreparedScan<'_>,
    ) -> Result<Pose3, RejectionReason> {
        let sac = &self.config.sac;
        let threshold = sac.fitness_score_threshold;

        let (src_points, src_features) = self.describe(source);
        let (dst_points, dst_features) = self.describe(target);

        let outcome = sample_consensus(
            &FeatureSet {
                points: &src_points,
                features: &src_features,
            },
            &FeatureSet {
                points: &dst_points,
                features: &dst_features,
            },
            sac,
            self.config.icp.corr_dist,
        );

        match outcome {
            Some(o) if o.fitness < threshold => Ok(o.transform),
            Some(o) => {
                log::info!("SAC fitness {:.4} too high", o.fitness);
                Err(RejectionReason::SacFitnessTooHigh {
                    fitness: o.fitness,
                    threshold,
                })
            }
            None => Err(RejectionReason::SacFitnessTooHigh {
                fitness: f64::INFINITY,
                threshold,
            }),
        }
    }

    /// Keypoint positions and FPFH descriptors of one scan.
    fn describe(&self, scan: &mut PreparedScan<'_>) -> (Vec<Point3<f64>>, Vec<FpfhSignature>) {
        let normals_radius = self.config.sac.normals_radius;
        let cloud = scan.cloud;
        scan.normals(normals_radius);
        let normals = scan.normals.as_deref().unwrap_or_default();

        let mut keypoints = harris_keypoints(cloud, &scan.index, normals, &self.config.harris);
        if keypoints.len() < 3 {
            log::debug!(
                "{}: only {} Harris keypoints, describing every point",
                scan.key,
                keypoints.len()
            );
            keypoints = (0..cloud.len()).collect();
        }

        let features = compute_fpfh(
            cloud,
            &scan.index,
            normals,
            &keypoints,
            self.config.sac.features_radius,
        );
        let points = keypoints.iter().map(|k| cloud.points[*k]).collect();
        (points, features)
    }

    fn covariance(
        &self,
        aligned: &PointCloud,
        correspondences: &[usize],
        fitness: f64,
        target: &mut PreparedScan<'_>,
    ) -> CovarianceEstimate {
        let cfg = &self.config;
        if cfg.fixed_covariance.enabled {
            let fixed = &cfg.fixed_covariance;
            return CovarianceEstimate::fixed(fixed.rot_sigma, fixed.trans_sigma);
        }

        match cfg.covariance_method {
            CovarianceMethod::PointToPoint => covariance::point_to_point(
                &aligned.points,
                fitness,
                cfg.eigen_lower_bound,
                cfg.eigen_upper_bound,
            ),
            CovarianceMethod::PointToPlane => {
                let normals = target.normals(cfg.sac.normals_radius);
                covariance::point_to_plane(
                    &aligned.points,
                    correspondences,
                    normals,
                    cfg.plane_sigma,
                    cfg.eigen_lower_bound,
                    cfg.eigen_upper_bound,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix6;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn room(seed: u64, n: usize) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let a = rng.random_range(0.0..4.0);
                let b = rng.random_range(0.0..2.5);
                let e = rng.random_range(-0.005..0.005);
                match i % 3 {
                    0 => Point3::new(a, b, e),
                    1 => Point3::new(e, a, b),
                    _ => Point3::new(a, e, b),
                }
            })
            .collect()
    }

    fn aligner(init_method: InitMethod) -> ScanAligner {
        let mut config = RegistrationConfig {
            init_method,
            ..RegistrationConfig::default()
        };
        config.sac.correspondence_randomness = 1;
        config.icp.threads = 2;
        ScanAligner::new(config).unwrap()
    }

    #[test]
    fn test_identical_scans_every_init_method() {
        let scan = room(11, 450);
        let pose = Pose3::from_xyz_rpy(3.0, -1.0, 0.0, 0.0, 0.0, 0.8);

        for method in [
            InitMethod::Identity,
            InitMethod::Odometry,
            InitMethod::OdometryRotation,
            InitMethod::Features,
        ] {
            let alignment = aligner(method)
                .align(Key(1), &scan, &pose, Key(9), &scan, &pose)
                .unwrap_or_else(|e| panic!("{:?}: {}", method, e));
            assert!(alignment.pose.is_close(&Pose3::identity(), 1e-6), "{:?}", method);
            assert!(alignment.fitness < 1e-10);
            assert!(!alignment.degraded_covariance);
            assert_relative_eq!(alignment.covariance, Matrix6::identity() * 1e-3, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_reported_pose_is_b_in_a() {
        let world = room(12, 600);
        let pose_a = Pose3::identity();
        let pose_b = Pose3::from_xyz_rpy(0.05, 0.03, 0.0, 0.0, 0.0, 0.03);
        let scan_a = world.transform(&pose_a.inverse());
        let scan_b = world.transform(&pose_b.inverse());

        let alignment = aligner(InitMethod::Odometry)
            .align(Key(0), &scan_a, &pose_a, Key(5), &scan_b, &pose_b)
            .unwrap();
        assert!(alignment.pose.is_close(&pose_a.between(&pose_b), 1e-6));
    }

    #[test]
    fn test_empty_and_sparse_scans_rejected() {
        let scan = room(13, 100);
        let empty = PointCloud::new();
        let sparse = PointCloud::from_points(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        let a = aligner(InitMethod::Identity);
        let id = Pose3::identity();

        assert_eq!(
            a.align(Key(0), &scan, &id, Key(1), &empty, &id),
            Err(RejectionReason::EmptyScan(Key(1)))
        );
        assert_eq!(
            a.align(Key(0), &sparse, &id, Key(1), &scan, &id),
            Err(RejectionReason::TooFewPoints { key: Key(0), count: 2 })
        );
    }

    #[test]
    fn test_distant_scans_not_converged() {
        let scan_a = room(14, 300);
        let scan_b = scan_a.transform(&Pose3::from_translation(40.0, 0.0, 0.0));
        let id = Pose3::identity();
        assert_eq!(
            aligner(InitMethod::Identity).align(Key(0), &scan_a, &id, Key(1), &scan_b, &id),
            Err(RejectionReason::NotConverged)
        );
    }

    #[test]
    fn test_fitness_bound() {
        let scan_a = room(15, 300);
        let scan_b = room(16, 300);
        let mut config = RegistrationConfig::default();
        config.max_tolerable_fitness = 1e-9;
        config.icp.iterations = 5;
        let aligner = ScanAligner::new(config).unwrap();
        let id = Pose3::identity();

        assert!(matches!(
            aligner.align(Key(0), &scan_a, &id, Key(1), &scan_b, &id),
            Err(RejectionReason::FitnessTooHigh { .. })
        ));
    }

    #[test]
    fn test_fixed_covariance() {
        let scan = room(17, 300);
        let mut config = RegistrationConfig::default();
        config.fixed_covariance.enabled = true;
        let aligner = ScanAligner::new(config).unwrap();
        let id = Pose3::identity();

        let alignment = aligner.align(Key(0), &scan, &id, Key(1), &scan, &id).unwrap();
        let expected = crate::core::PoseWithCovariance::diagonal_covariance(0.05, 0.1);
        assert_eq!(alignment.covariance, expected);
    }

    #[test]
    fn test_point_to_plane_covariance_bounded() {
        let scan = room(18, 600);
        let mut config = RegistrationConfig::default();
        config.covariance_method = CovarianceMethod::PointToPlane;
        let aligner = ScanAligner::new(config).unwrap();
        let id = Pose3::identity();

        let alignment = aligner.align(Key(0), &scan, &id, Key(1), &scan, &id).unwrap();
        assert!(!alignment.degraded_covariance);
        let eig = nalgebra::SymmetricEigen::new(alignment.covariance).eigenvalues;
        assert!(eig.iter().all(|v| *v >= 1e-3 - 1e-9 && *v <= 1e3 + 1e-6));
    }
}
