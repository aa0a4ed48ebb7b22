//! Main SetuConfig and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consistency::ConsistencyConfig;
use crate::loop_closure::LoopClosureConfig;
use crate::optimizer::SolverConfig;
use crate::registration::RegistrationConfig;

use super::error::ConfigLoadError;

/// Default location checked by [`SetuConfig::load_default`].
pub const DEFAULT_CONFIG_PATH: &str = "configs/setu.yaml";

/// Full SetuGraph configuration loaded from YAML
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SetuConfig {
    /// Nonlinear solver settings
    #[serde(default)]
    pub solver: SolverConfig,

    /// Odometric and pairwise consistency gating
    #[serde(default)]
    pub consistency: ConsistencyConfig,

    /// Scan registration for loop-closure verification
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Candidate queue handling
    #[serde(default)]
    pub loop_closure: LoopClosureConfig,
}

impl SetuConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Load from the default config path, falling back to built-in defaults
    pub fn load_default() -> Result<Self, ConfigLoadError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigLoadError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let invalid = |msg: &str| Err(ConfigLoadError::Invalid(msg.to_string()));

        if self.solver.max_iterations == 0 {
            return invalid("solver.max_iterations must be at least 1");
        }
        if self.solver.lambda_initial <= 0.0
            || self.solver.lambda_upper_bound < self.solver.lambda_initial
        {
            return invalid("solver lambda bounds must satisfy 0 < lambda_initial <= lambda_upper_bound");
        }
        if self.consistency.odometric_threshold <= 0.0 || self.consistency.pairwise_threshold <= 0.0
        {
            return invalid("consistency thresholds must be positive");
        }
        if self.consistency.max_candidates == 0 {
            return invalid("consistency.max_candidates must be at least 1");
        }

        let reg = &self.registration;
        if reg.icp.threads == 0 {
            return invalid("registration.icp.threads must be at least 1");
        }
        if reg.icp.iterations == 0 {
            return invalid("registration.icp.iterations must be at least 1");
        }
        if reg.icp.corr_dist <= 0.0 {
            return invalid("registration.icp.corr_dist must be positive");
        }
        if reg.eigen_lower_bound <= 0.0 || reg.eigen_upper_bound <= reg.eigen_lower_bound {
            return invalid("eigenvalue bounds must satisfy 0 < lower < upper");
        }
        if reg.sac.normals_radius <= 0.0 || reg.sac.features_radius <= 0.0 {
            return invalid("registration.sac radii must be positive");
        }
        Ok(())
    }
}
