//! Foundation types: poses, covariances, keys and point clouds.

pub mod covariance;
pub mod key;
pub mod math;
pub mod point_cloud;
pub mod pose;

pub use covariance::PoseWithCovariance;
pub use key::{Key, KeyTag, TaggedKey};
pub use point_cloud::PointCloud;
pub use pose::Pose3;
