use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::config::generation::WorldParams;
use crate::world::tile::{Position, Terrain};

/// Offset applied to positions before sampling moisture, so the two fields are uncorrelated.
const MOISTURE_OFFSET: [f64; 3] = [37.1, -91.7, 53.3];

/// Stretch applied to raw fractal noise before mapping it to [0, 1].
const NOISE_CONTRAST: f64 = 1.6;

/// Maps sphere positions to terrain using two fractal noise fields sampled in 3D.
///
/// Sampling the 3D position rather than lat/lon avoids seams at the poles and
/// at the antimeridian.
pub struct TerrainClassifier {
    elevation: Fbm<Perlin>,
    moisture: Fbm<Perlin>,
    sea_level: f64,
    mountain_threshold: f64,
    desert_threshold: f64,
}

impl TerrainClassifier {
    /// Classifier with the sea level taken directly from `sea_level` (normalized elevation).
    pub fn new(seed: u32, params: &WorldParams, sea_level: f64) -> Self {
        let elevation = Fbm::<Perlin>::new(seed)
            .set_octaves(params.noise_octaves)
            .set_frequency(params.noise_frequency)
            .set_persistence(0.5);
        let moisture = Fbm::<Perlin>::new(seed.wrapping_add(1))
            .set_octaves(params.noise_octaves.saturating_sub(2).max(1))
            .set_frequency(params.noise_frequency * 1.3)
            .set_persistence(0.5);
        TerrainClassifier {
            elevation,
            moisture,
            sea_level: sea_level.clamp(0.0, 1.0),
            mountain_threshold: params.mountain_threshold,
            desert_threshold: params.desert_threshold,
        }
    }

    /// Classifier whose sea level puts `params.ocean_ratio` of `samples` under water.
    ///
    /// Elevations are ranked and the sea level is the elevation at the ocean
    /// percentile, so the water fraction is hit exactly on the sampled tiles.
    pub fn calibrated(seed: u32, params: &WorldParams, samples: &[Position]) -> Self {
        let mut classifier = TerrainClassifier::new(seed, params, 0.5);
        if samples.is_empty() {
            return classifier;
        }
        let mut elevations: Vec<f64> = samples.iter().map(|p| classifier.elevation_at(p)).collect();
        elevations.sort_by(|a, b| a.total_cmp(b));

        let ocean_count = (elevations.len() as f64 * params.ocean_ratio).round() as usize;
        classifier.sea_level = if ocean_count == 0 {
            0.0
        } else if ocean_count >= elevations.len() {
            1.0 + f64::EPSILON
        } else {
            elevations[ocean_count]
        };
        classifier
    }

    pub fn sea_level(&self) -> f64 {
        self.sea_level
    }

    /// Normalized elevation in [0, 1].
    pub fn elevation_at(&self, p: &Position) -> f64 {
        normalize(self.elevation.get([p.x, p.y, p.z]))
    }

    /// Normalized moisture in [0, 1], from a spatially offset second field.
    pub fn moisture_at(&self, p: &Position) -> f64 {
        let [ox, oy, oz] = MOISTURE_OFFSET;
        normalize(self.moisture.get([p.x + ox, p.y + oy, p.z + oz]))
    }

    /// Deterministic terrain category for a position.
    pub fn classify(&self, p: &Position) -> Terrain {
        let elevation = self.elevation_at(p);
        if elevation < self.sea_level {
            return Terrain::Water;
        }

        let land_span = (1.0 - self.sea_level).max(f64::EPSILON);
        let land_height = ((elevation - self.sea_level) / land_span).clamp(0.0, 1.0);
        if land_height > self.mountain_threshold {
            return Terrain::Mountain;
        }

        let threshold = self.desert_threshold + latitude_bias(p.lat);
        if self.moisture_at(p) < threshold {
            Terrain::Desert
        } else {
            Terrain::Grass
        }
    }
}

/// Shift of the desert threshold by latitude: the subtropical belts dry out,
/// the poles never do, and the northern hemisphere runs slightly drier.
fn latitude_bias(lat: f64) -> f64 {
    let abs_lat = lat.abs();
    let band = if abs_lat < 12.0 {
        0.02
    } else if abs_lat < 35.0 {
        0.15
    } else if abs_lat < 55.0 {
        0.0
    } else if abs_lat < 68.0 {
        -0.15
    } else {
        -1.0
    };
    let hemisphere = if lat > 0.0 { 0.03 } else { 0.0 };
    band + hemisphere
}

fn normalize(v: f64) -> f64 {
    ((v * NOISE_CONTRAST + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::topology::{build_dual_tiles, subdivide_icosahedron};
    use glam::DVec3;

    fn params() -> WorldParams {
        WorldParams::default()
    }

    fn sample_positions(frequency: u32) -> Vec<Position> {
        build_dual_tiles(&subdivide_icosahedron(frequency))
            .into_iter()
            .map(|t| t.position)
            .collect()
    }

    #[test]
    fn classification_is_deterministic() {
        let positions = sample_positions(6);
        let a = TerrainClassifier::calibrated(7, &params(), &positions);
        let b = TerrainClassifier::calibrated(7, &params(), &positions);
        for p in &positions {
            assert_eq!(a.classify(p), b.classify(p));
            assert_eq!(a.classify(p), a.classify(p));
        }
    }

    #[test]
    fn calibrated_water_fraction_matches_ratio() {
        let positions = sample_positions(16);
        let classifier = TerrainClassifier::calibrated(42, &params(), &positions);
        let water = positions
            .iter()
            .filter(|p| classifier.classify(p) == Terrain::Water)
            .count();
        let fraction = water as f64 / positions.len() as f64;
        assert!(
            (0.64..=0.70).contains(&fraction),
            "Expected ~67% water, got {:.1}%",
            fraction * 100.0
        );
    }

    #[test]
    fn land_has_variety() {
        let positions = sample_positions(16);
        let mut p = params();
        p.ocean_ratio = 0.3;
        let classifier = TerrainClassifier::calibrated(42, &p, &positions);
        let grass = positions
            .iter()
            .filter(|pos| classifier.classify(pos) == Terrain::Grass)
            .count();
        assert!(grass > 0, "Expected some grass tiles");
    }

    #[test]
    fn zero_ocean_ratio_means_no_water() {
        let positions = sample_positions(8);
        let mut p = params();
        p.ocean_ratio = 0.0;
        let classifier = TerrainClassifier::calibrated(3, &p, &positions);
        assert!(positions.iter().all(|pos| classifier.classify(pos) != Terrain::Water));
    }

    #[test]
    fn full_ocean_ratio_means_all_water() {
        let positions = sample_positions(8);
        let mut p = params();
        p.ocean_ratio = 1.0;
        let classifier = TerrainClassifier::calibrated(3, &p, &positions);
        assert!(positions.iter().all(|pos| classifier.classify(pos) == Terrain::Water));
    }

    #[test]
    fn polar_land_is_never_desert() {
        let mut p = params();
        p.ocean_ratio = 0.0;
        p.mountain_threshold = 1.0;
        let classifier = TerrainClassifier::new(11, &p, 0.0);
        for lon in 0..36 {
            let lon = (lon as f64 * 10.0).to_radians();
            let lat = 80.0_f64.to_radians();
            let v = DVec3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
            let pos = Position::from_vec(v);
            assert_eq!(classifier.classify(&pos), Terrain::Grass);
        }
    }

    #[test]
    fn latitude_bias_favors_tropics() {
        assert!(latitude_bias(25.0) > latitude_bias(45.0));
        assert!(latitude_bias(-25.0) > latitude_bias(-60.0));
        assert!(latitude_bias(30.0) > latitude_bias(-30.0));
    }

    #[test]
    fn noise_fields_stay_normalized() {
        let classifier = TerrainClassifier::new(5, &params(), 0.5);
        for p in sample_positions(5) {
            let e = classifier.elevation_at(&p);
            let m = classifier.moisture_at(&p);
            assert!((0.0..=1.0).contains(&e));
            assert!((0.0..=1.0).contains(&m));
        }
    }
}
