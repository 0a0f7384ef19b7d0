use std::collections::{BTreeSet, HashMap, VecDeque};
use std::f64::consts::TAU;

use glam::DVec3;
use hexasphere::shapes::IcoSphereBase;
use hexasphere::Subdivided;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::world::tile::{Position, Tile, TileId};

/// Angle subtended by one edge of a regular icosahedron inscribed in the unit sphere (atan 2).
pub const ICOSAHEDRON_EDGE_ANGLE: f64 = 1.107_148_717_794_090_4;

/// Average neighbor count must fall in this range for a well-formed graph.
pub const DEGREE_SANITY_RANGE: (f64, f64) = (5.0, 7.0);

/// Scale used to round coordinates when merging vertices shared between faces.
const VERTEX_KEY_SCALE: f64 = 1e7;

/// Multiple of the nominal edge angle used by the distance-threshold adjacency.
const DISTANCE_THRESHOLD_FACTOR: f64 = 1.4;

const ICOSAHEDRON_FACES: [[u32; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

/// Where the triangle mesh underlying the dual tiling comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshSource {
    /// Built-in barycentric subdivision of the icosahedron.
    Icosphere,
    /// The `hexasphere` crate's subdivided icosahedron.
    Hexasphere,
}

/// How tile adjacency is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjacencyStrategy {
    /// Tiles are adjacent when their generating vertices share a mesh edge.
    Dual,
    /// Tiles are adjacent when their centroids are closer than a frequency-tuned angle.
    Distance,
}

/// Exact tile count for a geodesic grid at subdivision frequency `f`: `10f² + 2`.
pub fn geodesic_tile_count(frequency: u32) -> u32 {
    10 * frequency * frequency + 2
}

/// A manifold triangle mesh on the unit sphere.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Produce the mesh for `frequency` from the chosen source.
    pub fn build(frequency: u32, source: MeshSource) -> Self {
        match source {
            MeshSource::Icosphere => subdivide_icosahedron(frequency),
            MeshSource::Hexasphere => hexasphere_mesh(frequency),
        }
    }
}

/// The 12 unit vertices and 20 faces of the base icosahedron.
pub fn icosahedron() -> TriangleMesh {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let raw = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ];
    TriangleMesh {
        vertices: raw
            .iter()
            .map(|&(x, y, z)| DVec3::new(x, y, z).normalize())
            .collect(),
        triangles: ICOSAHEDRON_FACES.to_vec(),
    }
}

/// Subdivide every icosahedron face into `frequency²` triangles.
///
/// New points are placed by barycentric interpolation and pushed onto the unit
/// sphere. Points on shared edges are merged through a rounded-coordinate key
/// so the result stays manifold: `10f² + 2` vertices, `20f²` triangles.
///
/// # Panics
/// Panics if `frequency` is 0.
pub fn subdivide_icosahedron(frequency: u32) -> TriangleMesh {
    assert!(frequency >= 1, "Subdivision frequency must be at least 1");

    let base = icosahedron();
    let f = frequency as usize;
    let mut vertices: Vec<DVec3> = Vec::with_capacity(geodesic_tile_count(frequency) as usize);
    let mut index_of: HashMap<(i64, i64, i64), u32> = HashMap::new();
    let mut triangles = Vec::with_capacity(20 * f * f);

    for face in &base.triangles {
        let a = base.vertices[face[0] as usize];
        let b = base.vertices[face[1] as usize];
        let c = base.vertices[face[2] as usize];

        // local[i][j] is the point with weights (f-i-j, i, j) on (a, b, c)
        let mut local: Vec<Vec<u32>> = Vec::with_capacity(f + 1);
        for i in 0..=f {
            let mut row = Vec::with_capacity(f + 1 - i);
            for j in 0..=(f - i) {
                let k = f - i - j;
                let p = (a * k as f64 + b * i as f64 + c * j as f64) / f as f64;
                let p = p.normalize();
                let key = vertex_key(p);
                let id = *index_of.entry(key).or_insert_with(|| {
                    vertices.push(p);
                    (vertices.len() - 1) as u32
                });
                row.push(id);
            }
            local.push(row);
        }

        for i in 0..f {
            for j in 0..(f - i) {
                triangles.push([local[i][j], local[i + 1][j], local[i][j + 1]]);
                if i + j + 1 < f {
                    triangles.push([local[i + 1][j], local[i + 1][j + 1], local[i][j + 1]]);
                }
            }
        }
    }

    TriangleMesh {
        vertices,
        triangles,
    }
}

fn vertex_key(p: DVec3) -> (i64, i64, i64) {
    (
        (p.x * VERTEX_KEY_SCALE).round() as i64,
        (p.y * VERTEX_KEY_SCALE).round() as i64,
        (p.z * VERTEX_KEY_SCALE).round() as i64,
    )
}

/// Icosphere mesh from the `hexasphere` crate.
///
/// hexasphere uses linear edge subdivision: n subdivisions → frequency n+1.
///
/// # Panics
/// Panics if `frequency` is 0.
pub fn hexasphere_mesh(frequency: u32) -> TriangleMesh {
    assert!(frequency >= 1, "Subdivision frequency must be at least 1");

    let sphere = Subdivided::<(), IcoSphereBase>::new(frequency as usize - 1, |_| ());
    let vertices = sphere
        .raw_points()
        .iter()
        .map(|p| DVec3::new(p.x as f64, p.y as f64, p.z as f64).normalize())
        .collect();
    let triangles = sphere
        .get_all_indices()
        .chunks(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();

    TriangleMesh {
        vertices,
        triangles,
    }
}

/// Build the dual tiling of a triangle mesh: one tile per mesh vertex.
///
/// Each tile's boundary is the set of normalized centroids of the triangles
/// around its vertex, sorted by angle in the vertex's tangent plane.
pub fn build_dual_tiles(mesh: &TriangleMesh) -> Vec<Tile> {
    let mut incident: Vec<Vec<usize>> = vec![Vec::with_capacity(6); mesh.vertices.len()];
    for (t, tri) in mesh.triangles.iter().enumerate() {
        for &v in tri {
            incident[v as usize].push(t);
        }
    }

    let face_centers: Vec<DVec3> = mesh
        .triangles
        .iter()
        .map(|tri| {
            (mesh.vertices[tri[0] as usize]
                + mesh.vertices[tri[1] as usize]
                + mesh.vertices[tri[2] as usize])
                .normalize()
        })
        .collect();

    mesh.vertices
        .iter()
        .enumerate()
        .map(|(i, &normal)| {
            let (u, v) = tangent_basis(normal);
            let mut corners: Vec<(f64, DVec3)> = incident[i]
                .iter()
                .map(|&t| {
                    let d = face_centers[t] - normal;
                    let mut angle = d.dot(v).atan2(d.dot(u));
                    if angle < 0.0 {
                        angle += TAU;
                    }
                    (angle, face_centers[t])
                })
                .collect();
            corners.sort_by(|a, b| a.0.total_cmp(&b.0));

            let centroid = corners
                .iter()
                .fold(DVec3::ZERO, |acc, (_, p)| acc + *p);
            let position = if centroid.length_squared() > 1e-12 {
                Position::from_vec(centroid)
            } else {
                Position::from_vec(normal)
            };
            let boundary = corners.iter().map(|(_, p)| p.to_array()).collect();
            Tile::new(i as TileId, boundary, position)
        })
        .collect()
}

/// Two unit vectors spanning the plane tangent to the sphere at `normal`.
fn tangent_basis(normal: DVec3) -> (DVec3, DVec3) {
    let helper = if normal.z.abs() < 0.9 { DVec3::Z } else { DVec3::X };
    let u = helper.cross(normal).normalize();
    let v = normal.cross(u);
    (u, v)
}

/// Symmetric, read-only neighbor relation between tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyGraph {
    neighbors: Vec<Vec<TileId>>,
}

impl AdjacencyGraph {
    /// Build adjacency from a list of neighbor lists. Lists are sorted and deduplicated.
    pub fn from_lists(lists: Vec<Vec<TileId>>) -> Self {
        let neighbors = lists
            .into_iter()
            .map(|l| {
                let set: BTreeSet<TileId> = l.into_iter().collect();
                set.into_iter().collect()
            })
            .collect();
        AdjacencyGraph { neighbors }
    }

    /// Adjacency from shared mesh edges, which is exactly dual face-sharing.
    pub fn from_mesh(mesh: &TriangleMesh) -> Self {
        let mut sets: Vec<BTreeSet<TileId>> = vec![BTreeSet::new(); mesh.vertices.len()];
        for tri in &mesh.triangles {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                sets[a as usize].insert(b);
                sets[b as usize].insert(a);
            }
        }
        AdjacencyGraph {
            neighbors: sets.into_iter().map(|s| s.into_iter().collect()).collect(),
        }
    }

    /// Adjacency by centroid angle below `threshold` radians.
    pub fn from_centroid_distance(tiles: &[Tile], threshold: f64) -> Self {
        let points: Vec<DVec3> = tiles.iter().map(|t| t.position.vec()).collect();
        let min_dot = threshold.cos();
        let neighbors = (0..points.len())
            .into_par_iter()
            .map(|i| {
                (0..points.len())
                    .filter(|&j| j != i && points[i].dot(points[j]) > min_dot)
                    .map(|j| j as TileId)
                    .collect()
            })
            .collect();
        AdjacencyGraph { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, id: TileId) -> &[TileId] {
        self.neighbors
            .get(id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn are_adjacent(&self, a: TileId, b: TileId) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    pub fn average_degree(&self) -> f64 {
        if self.neighbors.is_empty() {
            return 0.0;
        }
        let total: usize = self.neighbors.iter().map(Vec::len).sum();
        total as f64 / self.neighbors.len() as f64
    }

    pub fn is_symmetric(&self) -> bool {
        self.neighbors.iter().enumerate().all(|(i, list)| {
            list.iter()
                .all(|&n| self.are_adjacent(n, i as TileId))
        })
    }

    /// Verify the average neighbor count is plausible for a sphere tiling.
    ///
    /// Returns the average degree, or an error describing the anomaly.
    pub fn check_sanity(&self) -> Result<f64, String> {
        let avg = self.average_degree();
        let (lo, hi) = DEGREE_SANITY_RANGE;
        if !(lo..=hi).contains(&avg) {
            return Err(format!(
                "average neighbor count {:.3} outside [{}, {}]; adjacency construction is broken",
                avg, lo, hi
            ));
        }
        if !self.is_symmetric() {
            return Err("adjacency graph is not symmetric".to_string());
        }
        Ok(avg)
    }

    /// Verify every tile has exactly one neighbor per boundary vertex, as the
    /// dual of a triangle mesh must. Catches misassigned edges that leave the
    /// average degree intact.
    pub fn check_degrees(&self, tiles: &[Tile]) -> Result<(), String> {
        if tiles.len() != self.neighbors.len() {
            return Err(format!(
                "adjacency covers {} tiles but the grid has {}",
                self.neighbors.len(),
                tiles.len()
            ));
        }
        let bad: Vec<TileId> = tiles
            .iter()
            .filter(|t| self.neighbors(t.id).len() != t.boundary.len())
            .map(|t| t.id)
            .collect();
        if let Some(first) = bad.first() {
            return Err(format!(
                "{} tiles have a neighbor count different from their vertex count (first: tile {})",
                bad.len(),
                first
            ));
        }
        Ok(())
    }

    /// All tiles within `radius` graph steps of `start`, with their distance.
    /// `start` itself is included at distance 0.
    pub fn within_radius(&self, start: TileId, radius: u32) -> Vec<(TileId, u32)> {
        if start as usize >= self.neighbors.len() {
            return Vec::new();
        }
        let mut seen = vec![false; self.neighbors.len()];
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        seen[start as usize] = true;
        queue.push_back((start, 0u32));

        while let Some((id, dist)) = queue.pop_front() {
            out.push((id, dist));
            if dist == radius {
                continue;
            }
            for &n in self.neighbors(id) {
                if !seen[n as usize] {
                    seen[n as usize] = true;
                    queue.push_back((n, dist + 1));
                }
            }
        }
        out
    }
}

/// Centroid angle below which two tiles count as neighbors at frequency `f`.
///
/// First-ring neighbors sit at roughly 0.95-1.2 edge angles, the second ring at 1.6 or more.
pub fn distance_threshold(frequency: u32) -> f64 {
    DISTANCE_THRESHOLD_FACTOR * ICOSAHEDRON_EDGE_ANGLE / frequency.max(1) as f64
}

/// Build the full geodesic tiling and its adjacency graph.
///
/// Fails if the adjacency sanity or per-tile degree check does not pass.
pub fn generate_geodesic_grid(
    frequency: u32,
    source: MeshSource,
    strategy: AdjacencyStrategy,
) -> Result<(Vec<Tile>, AdjacencyGraph), String> {
    if frequency == 0 {
        return Err("frequency must be at least 1".to_string());
    }
    let mesh = TriangleMesh::build(frequency, source);
    let tiles = build_dual_tiles(&mesh);
    let graph = match strategy {
        AdjacencyStrategy::Dual => AdjacencyGraph::from_mesh(&mesh),
        AdjacencyStrategy::Distance => {
            AdjacencyGraph::from_centroid_distance(&tiles, distance_threshold(frequency))
        }
    };
    graph.check_sanity()?;
    graph.check_degrees(&tiles)?;
    Ok((tiles, graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tile::TileShape;

    fn grid(frequency: u32) -> (Vec<Tile>, AdjacencyGraph) {
        generate_geodesic_grid(frequency, MeshSource::Icosphere, AdjacencyStrategy::Dual)
            .expect("valid grid")
    }

    #[test]
    fn tile_count_formula() {
        assert_eq!(geodesic_tile_count(1), 12);
        assert_eq!(geodesic_tile_count(2), 42);
        assert_eq!(geodesic_tile_count(4), 162);
        assert_eq!(geodesic_tile_count(20), 4002);
    }

    #[test]
    fn icosahedron_vertices_on_unit_sphere() {
        let ico = icosahedron();
        assert_eq!(ico.vertices.len(), 12);
        assert_eq!(ico.triangles.len(), 20);
        for v in &ico.vertices {
            assert!((v.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn subdivision_counts() {
        for f in 1..=8 {
            let mesh = subdivide_icosahedron(f);
            assert_eq!(
                mesh.vertices.len(),
                geodesic_tile_count(f) as usize,
                "frequency {} vertex count",
                f
            );
            assert_eq!(mesh.triangles.len(), (20 * f * f) as usize);
        }
    }

    #[test]
    fn correct_tile_counts_and_degrees() {
        for f in 1..=7 {
            let (tiles, graph) = grid(f);
            assert_eq!(tiles.len(), geodesic_tile_count(f) as usize);
            let pentagons = (0..graph.len())
                .filter(|&i| graph.neighbors(i as TileId).len() == 5)
                .count();
            let hexagons = (0..graph.len())
                .filter(|&i| graph.neighbors(i as TileId).len() == 6)
                .count();
            assert_eq!(pentagons, 12, "frequency {} pentagons", f);
            assert_eq!(hexagons, tiles.len() - 12, "frequency {} hexagons", f);
        }
    }

    #[test]
    fn boundary_matches_degree() {
        let (tiles, graph) = grid(5);
        for tile in &tiles {
            assert_eq!(
                tile.boundary.len(),
                graph.neighbors(tile.id).len(),
                "Tile {} boundary/degree mismatch",
                tile.id
            );
            let expected = if tile.boundary.len() == 5 {
                TileShape::Pentagon
            } else {
                TileShape::Hexagon
            };
            assert_eq!(tile.shape, expected);
        }
    }

    #[test]
    fn boundaries_are_consistently_wound() {
        let (tiles, _) = grid(4);
        for tile in &tiles {
            let c = tile.position.vec();
            let pts: Vec<DVec3> = tile.boundary.iter().map(|p| DVec3::from_array(*p)).collect();
            for k in 0..pts.len() {
                let a = pts[k] - c;
                let b = pts[(k + 1) % pts.len()] - c;
                assert!(
                    a.cross(b).dot(c) > 0.0,
                    "Tile {} boundary not wound counter-clockwise at corner {}",
                    tile.id,
                    k
                );
            }
        }
    }

    #[test]
    fn adjacency_is_symmetric_without_self_loops() {
        let (_, graph) = grid(6);
        assert!(graph.is_symmetric());
        for i in 0..graph.len() {
            let id = i as TileId;
            assert!(!graph.neighbors(id).contains(&id), "Tile {} is its own neighbor", id);
        }
    }

    #[test]
    fn adjacent_tiles_share_two_boundary_points() {
        let (tiles, graph) = grid(3);
        for tile in &tiles {
            for &n in graph.neighbors(tile.id) {
                let other = &tiles[n as usize];
                let shared = tile
                    .boundary
                    .iter()
                    .filter(|p| {
                        other.boundary.iter().any(|q| {
                            DVec3::from_array(**p).distance(DVec3::from_array(*q)) < 1e-9
                        })
                    })
                    .count();
                assert_eq!(shared, 2, "Tiles {} and {} share {} corners", tile.id, n, shared);
            }
        }
    }

    #[test]
    fn all_tiles_reachable() {
        let (tiles, graph) = grid(5);
        let reached = graph.within_radius(0, u32::MAX);
        assert_eq!(reached.len(), tiles.len());
    }

    #[test]
    fn positions_on_unit_sphere_with_valid_lat_lon() {
        let (tiles, _) = grid(4);
        for tile in &tiles {
            let p = &tile.position;
            assert!((p.vec().length() - 1.0).abs() < 1e-9);
            assert!((-90.0..=90.0).contains(&p.lat));
            assert!((-180.0..=180.0).contains(&p.lon));
            for corner in &tile.boundary {
                assert!((DVec3::from_array(*corner).length() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn within_radius_counts_rings() {
        let (_, graph) = grid(6);
        // Pick a hexagon far from pentagons
        let hex = (0..graph.len() as TileId)
            .find(|&id| {
                graph
                    .within_radius(id, 2)
                    .iter()
                    .all(|&(n, _)| graph.neighbors(n).len() == 6)
            })
            .expect("an all-hexagon patch exists at frequency 6");
        let ring = graph.within_radius(hex, 2);
        assert_eq!(ring.len(), 1 + 6 + 12);
        assert_eq!(ring.iter().filter(|&&(_, d)| d == 0).count(), 1);
        assert_eq!(ring.iter().filter(|&&(_, d)| d == 1).count(), 6);
        assert_eq!(ring.iter().filter(|&&(_, d)| d == 2).count(), 12);
    }

    #[test]
    fn within_radius_unknown_tile_is_empty() {
        let (_, graph) = grid(2);
        assert!(graph.within_radius(10_000, 2).is_empty());
    }

    #[test]
    fn hexasphere_source_matches_counts() {
        for f in 2..=5 {
            let (tiles, graph) =
                generate_geodesic_grid(f, MeshSource::Hexasphere, AdjacencyStrategy::Dual)
                    .expect("valid hexasphere grid");
            assert_eq!(tiles.len(), geodesic_tile_count(f) as usize);
            let pentagons = (0..graph.len())
                .filter(|&i| graph.neighbors(i as TileId).len() == 5)
                .count();
            assert_eq!(pentagons, 12);
        }
    }

    #[test]
    fn distance_adjacency_matches_dual_adjacency() {
        let cases = [
            (MeshSource::Icosphere, 2),
            (MeshSource::Icosphere, 4),
            (MeshSource::Hexasphere, 4),
            (MeshSource::Hexasphere, 20),
        ];
        for (source, f) in cases {
            let mesh = TriangleMesh::build(f, source);
            let tiles = build_dual_tiles(&mesh);
            let dual = AdjacencyGraph::from_mesh(&mesh);
            let by_distance = AdjacencyGraph::from_centroid_distance(&tiles, distance_threshold(f));
            assert_eq!(dual, by_distance, "{:?} frequency {} adjacency differs", source, f);
            assert!(by_distance.check_degrees(&tiles).is_ok());
        }
    }

    #[test]
    fn degree_check_catches_moved_edge() {
        let mesh = subdivide_icosahedron(4);
        let tiles = build_dual_tiles(&mesh);
        let dual = AdjacencyGraph::from_mesh(&mesh);
        assert!(dual.check_degrees(&tiles).is_ok());

        // Move one edge of tile 0 to a tile two rings away. The graph stays
        // symmetric with the same average degree.
        let a: TileId = 0;
        let b = dual.neighbors(a)[0];
        let c = dual
            .within_radius(a, 2)
            .into_iter()
            .find(|&(_, d)| d == 2)
            .map(|(t, _)| t)
            .expect("second ring");
        let mut lists: Vec<Vec<TileId>> =
            (0..dual.len() as TileId).map(|t| dual.neighbors(t).to_vec()).collect();
        lists[a as usize].retain(|&n| n != b);
        lists[b as usize].retain(|&n| n != a);
        lists[a as usize].push(c);
        lists[c as usize].push(a);
        let moved = AdjacencyGraph::from_lists(lists);

        assert!(moved.check_sanity().is_ok());
        let err = moved.check_degrees(&tiles).unwrap_err();
        assert!(err.contains("2 tiles"), "{}", err);
    }

    #[test]
    fn sanity_check_rejects_bad_threshold() {
        let mesh = subdivide_icosahedron(4);
        let tiles = build_dual_tiles(&mesh);
        let too_wide = AdjacencyGraph::from_centroid_distance(&tiles, distance_threshold(4) * 3.0);
        assert!(too_wide.check_sanity().is_err());
        let too_narrow =
            AdjacencyGraph::from_centroid_distance(&tiles, distance_threshold(4) * 0.2);
        let err = too_narrow.check_sanity().unwrap_err();
        assert!(err.contains("average neighbor count"));
    }

    #[test]
    fn grid_is_deterministic() {
        let (t1, g1) = grid(4);
        let (t2, g2) = grid(4);
        assert_eq!(t1, t2);
        assert_eq!(g1, g2);
    }

    #[test]
    fn zero_frequency_rejected() {
        assert!(generate_geodesic_grid(0, MeshSource::Icosphere, AdjacencyStrategy::Dual).is_err());
    }
}
