use serde::{Deserialize, Serialize};

use crate::world::topology::{AdjacencyStrategy, MeshSource};

/// Lowest frequency at which icosphere tiles are too uneven for distance adjacency.
const ICOSPHERE_DISTANCE_FREQUENCY_LIMIT: u32 = 10;

/// Parameters used to build the world graph and classify terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldParams {
    /// Icosahedron subdivision frequency; the world has `10f² + 2` tiles.
    pub frequency: u32,
    /// Noise seed. 0 picks a random seed at startup.
    pub seed: u64,
    pub mesh: MeshSource,
    pub adjacency: AdjacencyStrategy,
    pub ocean_ratio: f64,
    pub mountain_threshold: f64,
    pub desert_threshold: f64,
    pub noise_octaves: usize,
    pub noise_frequency: f64,
}

impl Default for WorldParams {
    fn default() -> Self {
        WorldParams {
            frequency: 20,
            seed: 0,
            mesh: MeshSource::Icosphere,
            adjacency: AdjacencyStrategy::Dual,
            ocean_ratio: 0.67,
            mountain_threshold: 0.55,
            desert_threshold: 0.38,
            noise_octaves: 6,
            noise_frequency: 1.6,
        }
    }
}

impl WorldParams {
    /// Validate parameter ranges, appending one message per violation.
    pub fn collect_errors(&self, errors: &mut Vec<String>) {
        if !(1..=64).contains(&self.frequency) {
            errors.push(format!(
                "world.frequency must be 1-64, got {}. Example: frequency = 20",
                self.frequency
            ));
        }
        if !(0.0..=1.0).contains(&self.ocean_ratio) {
            errors.push(format!(
                "world.ocean_ratio must be 0.0-1.0, got {}. Example: ocean_ratio = 0.67",
                self.ocean_ratio
            ));
        }
        if !(0.0..=1.0).contains(&self.mountain_threshold) {
            errors.push(format!(
                "world.mountain_threshold must be 0.0-1.0, got {}. Example: mountain_threshold = 0.55",
                self.mountain_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.desert_threshold) {
            errors.push(format!(
                "world.desert_threshold must be 0.0-1.0, got {}. Example: desert_threshold = 0.38",
                self.desert_threshold
            ));
        }
        if !(1..=10).contains(&self.noise_octaves) {
            errors.push(format!(
                "world.noise_octaves must be 1-10, got {}. Example: noise_octaves = 6",
                self.noise_octaves
            ));
        }
        // Barycentric subdivision leaves tiles near the twelve pentagons too
        // uneven for a single centroid threshold at higher frequencies.
        if self.mesh == MeshSource::Icosphere
            && self.adjacency == AdjacencyStrategy::Distance
            && self.frequency >= ICOSPHERE_DISTANCE_FREQUENCY_LIMIT
        {
            errors.push(format!(
                "world.adjacency = \"distance\" needs mesh = \"hexasphere\" at frequency {} or more, got icosphere at {}. Example: adjacency = \"dual\"",
                ICOSPHERE_DISTANCE_FREQUENCY_LIMIT, self.frequency
            ));
        }
        if self.noise_frequency <= 0.0 {
            errors.push(format!(
                "world.noise_frequency must be > 0.0, got {}. Example: noise_frequency = 1.6",
                self.noise_frequency
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(params: &WorldParams) -> Vec<String> {
        let mut errors = Vec::new();
        params.collect_errors(&mut errors);
        errors
    }

    #[test]
    fn defaults_are_valid() {
        assert!(errors_for(&WorldParams::default()).is_empty());
    }

    #[test]
    fn invalid_frequency() {
        let params = WorldParams {
            frequency: 0,
            ..WorldParams::default()
        };
        let errors = errors_for(&params);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("frequency"), "{}", errors[0]);
    }

    #[test]
    fn invalid_ocean_ratio() {
        let params = WorldParams {
            ocean_ratio: 1.5,
            ..WorldParams::default()
        };
        let errors = errors_for(&params);
        assert!(
            errors.iter().any(|e| e.contains("ocean_ratio")),
            "Error should mention ocean_ratio: {:?}",
            errors
        );
    }

    #[test]
    fn distance_adjacency_on_fine_icosphere_rejected() {
        let params = WorldParams {
            adjacency: AdjacencyStrategy::Distance,
            ..WorldParams::default()
        };
        let errors = errors_for(&params);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("hexasphere"), "{}", errors[0]);

        let coarse = WorldParams {
            frequency: 4,
            ..params.clone()
        };
        assert!(errors_for(&coarse).is_empty());

        let hexasphere = WorldParams {
            mesh: MeshSource::Hexasphere,
            ..params
        };
        assert!(errors_for(&hexasphere).is_empty());
    }

    #[test]
    fn invalid_noise_settings_reported_together() {
        let params = WorldParams {
            noise_octaves: 0,
            noise_frequency: -1.0,
            ..WorldParams::default()
        };
        let errors = errors_for(&params);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn mesh_and_adjacency_parse_from_toml() {
        let params: WorldParams = toml::from_str(
            "mesh = \"hexasphere\"\nadjacency = \"distance\"\nfrequency = 8",
        )
        .unwrap();
        assert_eq!(params.mesh, MeshSource::Hexasphere);
        assert_eq!(params.adjacency, AdjacencyStrategy::Distance);
        assert_eq!(params.frequency, 8);
        assert_eq!(params.ocean_ratio, 0.67);
    }
}
