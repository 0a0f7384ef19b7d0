use glam::DVec3;
use serde::{Deserialize, Serialize};

pub type TileId = u32;
pub type PlayerId = u32;

// === Enums ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Water,
    Grass,
    Desert,
    Mountain,
}

impl Terrain {
    pub fn is_water(self) -> bool {
        self == Terrain::Water
    }

    /// Multiplier applied to the gold cost of claiming a tile of this terrain.
    pub fn claim_cost_factor(self) -> f64 {
        match self {
            Terrain::Water => 0.0,
            Terrain::Grass => 1.0,
            Terrain::Desert => 1.25,
            Terrain::Mountain => 1.5,
        }
    }
}

/// Polygon type of a tile. Triangles and quads only appear at subdivision
/// seams and are kept so the partition stays gap-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileShape {
    Triangle,
    Quad,
    Pentagon,
    Hexagon,
}

impl TileShape {
    pub fn from_vertex_count(count: usize) -> TileShape {
        match count {
            0..=3 => TileShape::Triangle,
            4 => TileShape::Quad,
            5 => TileShape::Pentagon,
            _ => TileShape::Hexagon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    City,
    Port,
    MissileSilo,
    BaseHq,
}

impl StructureType {
    /// Structures a player may order through `build_structure`.
    pub fn buildable() -> &'static [StructureType] {
        &[
            StructureType::City,
            StructureType::Port,
            StructureType::MissileSilo,
        ]
    }
}

// === Position ===

/// A point on the unit sphere with its derived latitude/longitude in degrees.
///
/// Convention: x=cos(lat)*cos(lon), y=cos(lat)*sin(lon), z=sin(lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    /// Build a position from any non-zero vector, projecting it onto the unit sphere.
    pub fn from_vec(v: DVec3) -> Self {
        let n = v.normalize();
        Position {
            x: n.x,
            y: n.y,
            z: n.z,
            lat: n.z.clamp(-1.0, 1.0).asin().to_degrees(),
            lon: n.y.atan2(n.x).to_degrees(),
        }
    }

    pub fn vec(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// Great-circle angle to another position, in radians.
    pub fn angle_to(&self, other: &Position) -> f64 {
        self.vec().dot(other.vec()).clamp(-1.0, 1.0).acos()
    }
}

// === Tile ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub shape: TileShape,
    /// Boundary vertices on the unit sphere, wound counter-clockwise around the centroid.
    pub boundary: Vec<[f64; 3]>,
    pub position: Position,
    pub terrain: Terrain,
    pub owner: Option<PlayerId>,
    pub structure: Option<StructureType>,
    pub population: f64,
    pub irradiated: bool,
}

impl Tile {
    /// Create an unowned grass tile. Terrain is assigned afterwards by the classifier.
    pub fn new(id: TileId, boundary: Vec<[f64; 3]>, position: Position) -> Self {
        Self {
            id,
            shape: TileShape::from_vertex_count(boundary.len()),
            boundary,
            position,
            terrain: Terrain::Grass,
            owner: None,
            structure: None,
            population: 0.0,
            irradiated: false,
        }
    }

    pub fn is_claimable(&self) -> bool {
        self.owner.is_none() && !self.terrain.is_water()
    }

    /// Reset ownership, structure and population. Terrain and irradiation persist.
    pub fn clear(&mut self) {
        self.owner = None;
        self.structure = None;
        self.population = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_from_vertex_count() {
        assert_eq!(TileShape::from_vertex_count(3), TileShape::Triangle);
        assert_eq!(TileShape::from_vertex_count(4), TileShape::Quad);
        assert_eq!(TileShape::from_vertex_count(5), TileShape::Pentagon);
        assert_eq!(TileShape::from_vertex_count(6), TileShape::Hexagon);
    }

    #[test]
    fn position_from_vec_is_normalized() {
        let p = Position::from_vec(DVec3::new(0.0, 0.0, 3.0));
        assert!((p.z - 1.0).abs() < 1e-12);
        assert!((p.lat - 90.0).abs() < 1e-9);

        let p = Position::from_vec(DVec3::new(0.0, 2.0, 0.0));
        assert!(p.lat.abs() < 1e-9);
        assert!((p.lon - 90.0).abs() < 1e-9);
    }

    #[test]
    fn angle_between_orthogonal_points() {
        let a = Position::from_vec(DVec3::X);
        let b = Position::from_vec(DVec3::Y);
        assert!((a.angle_to(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn clear_keeps_terrain_and_irradiation() {
        let mut tile = Tile::new(7, vec![[1.0, 0.0, 0.0]; 6], Position::from_vec(DVec3::X));
        tile.terrain = Terrain::Desert;
        tile.owner = Some(3);
        tile.structure = Some(StructureType::City);
        tile.population = 42.0;
        tile.irradiated = true;

        tile.clear();

        assert_eq!(tile.owner, None);
        assert_eq!(tile.structure, None);
        assert_eq!(tile.population, 0.0);
        assert_eq!(tile.terrain, Terrain::Desert);
        assert!(tile.irradiated);
    }

    #[test]
    fn water_is_never_claimable() {
        let mut tile = Tile::new(0, vec![], Position::from_vec(DVec3::Z));
        assert!(tile.is_claimable());
        tile.terrain = Terrain::Water;
        assert!(!tile.is_claimable());
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&StructureType::MissileSilo).unwrap(),
            "\"missile_silo\""
        );
        assert_eq!(serde_json::to_string(&Terrain::Water).unwrap(), "\"water\"");
        let s: StructureType = serde_json::from_str("\"base_hq\"").unwrap();
        assert_eq!(s, StructureType::BaseHq);
    }
}
