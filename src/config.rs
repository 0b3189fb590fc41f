//! Scalar configuration fixed at setup.

use crate::error::{require_positive, ConfigError};
use crate::sort::{BlockLayout, DEFAULT_BLOCK_SIZE};

/// Sizes and timings of a simulation. Everything here is fixed once built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Number of particle slots `N`.
    pub particle_count: usize,
    /// Lifetime, in seconds, given to particles written by a spawner.
    pub lifetime: f32,
    /// Integration timestep in seconds.
    pub timestep: f32,
    /// Radix sort block size (power of two, at most 256).
    pub block_size: u32,
    /// Seed for spawner RNGs.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: 10_000,
            lifetime: 4.0,
            timestep: 1.0 / 60.0,
            block_size: DEFAULT_BLOCK_SIZE,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Check every field; returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        BlockLayout::new(self.particle_count, self.block_size)?;
        require_positive("lifetime", self.lifetime)?;
        require_positive("timestep", self.timestep)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_first_problem() {
        let config = SimulationConfig { particle_count: 0, timestep: -1.0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroParticles));

        let config = SimulationConfig { block_size: 100, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::BlockSize(100)));

        let config = SimulationConfig { timestep: f32::NAN, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { name: "timestep", .. })
        ));

        let config = SimulationConfig { lifetime: 0.0, ..Default::default() };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidParameter { name: "lifetime", value: 0.0 })
        );
    }
}
