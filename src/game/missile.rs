use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::f64::consts::PI;

use glam::DVec3;

use crate::world::{PlayerId, TileId};

pub type MissileId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct Missile {
    pub id: MissileId,
    pub owner_id: PlayerId,
    pub origin_tile_id: TileId,
    pub target_tile_id: TileId,
    pub launched_at_ms: u64,
    pub travel_ms: u64,
    pub trajectory: Vec<[f64; 3]>,
    pub impacted_at_ms: Option<u64>,
}

impl Missile {
    pub fn impact_at_ms(&self) -> u64 {
        self.launched_at_ms + self.travel_ms
    }
}

/// Ballistic arc from `from` to `to`: spherical interpolation along the great
/// circle, lifted by `arc_height × sin(πt)`. Returns `steps + 1` points.
pub fn ballistic_trajectory(from: DVec3, to: DVec3, steps: usize, arc_height: f64) -> Vec<[f64; 3]> {
    let a = from.normalize();
    let b = to.normalize();
    let steps = steps.max(1);

    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let radius = 1.0 + arc_height * (PI * t).sin();
            let p = slerp(a, b, t) * radius;
            [p.x, p.y, p.z]
        })
        .collect()
}

fn slerp(a: DVec3, b: DVec3, t: f64) -> DVec3 {
    let dot = a.dot(b).clamp(-1.0, 1.0);
    if dot > 1.0 - 1e-12 {
        return a;
    }
    if dot < -1.0 + 1e-12 {
        // Antipodal: any great circle works, pick one through a perpendicular axis.
        let axis = a.any_orthonormal_vector();
        return (a * (PI * t).cos() + axis * (PI * t).sin()).normalize();
    }
    let omega = dot.acos();
    let sin_omega = omega.sin();
    (a * ((1.0 - t) * omega).sin() / sin_omega + b * (t * omega).sin() / sin_omega).normalize()
}

/// Pending impacts ordered by fire time, polled by the tick.
#[derive(Debug, Default, Clone)]
pub struct ImpactQueue {
    heap: BinaryHeap<Reverse<(u64, MissileId)>>,
}

impl ImpactQueue {
    pub fn schedule(&mut self, fire_at_ms: u64, missile_id: MissileId) {
        self.heap.push(Reverse((fire_at_ms, missile_id)));
    }

    /// Missiles due at or before `now_ms`, earliest first.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<MissileId> {
        let mut due = Vec::new();
        while let Some(&Reverse((fire_at, id))) = self.heap.peek() {
            if fire_at > now_ms {
                break;
            }
            self.heap.pop();
            due.push(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
