use strata_geom::{Aabb, SlabEntry, Vec3};

use crate::packed::PackedOctree;
use crate::ray::{MaterialResolver, ProbeRay, TraceRay};
use crate::AIR;

/// Step past a boundary before sampling the voxel behind it.
pub const OFFSET: f32 = 1e-4;
/// Minimum advance when choosing the next exit plane.
pub const EPSILON: f32 = 1e-5;

type Point = [f64; 3];

#[inline]
fn widen(v: Vec3) -> Point {
    [v.x as f64, v.y as f64, v.z as f64]
}

/// Exact distance to the entry face found by the f32 slab test. Only the
/// axis of the entry normal is recomputed, in f64.
fn entry_distance(o: &Point, d: &Point, extent: f64, entry: SlabEntry) -> f64 {
    for axis in 0..3 {
        if entry.normal.axis(axis) != 0.0 {
            let plane = if d[axis] > 0.0 { 0.0 } else { extent };
            return ((plane - o[axis]) / d[axis]).max(0.0);
        }
    }
    entry.distance as f64
}

impl PackedOctree {
    /// March `ray` through the tree, skipping whole empty leaves.
    ///
    /// Only a hit closer than `ray.distance` is recorded; it overwrites the
    /// ray's distance, normal, color and emittance. Misses leave the ray
    /// untouched. The bounds test works on absolute coordinates, so the tree
    /// is treated as sitting at the world origin.
    ///
    /// Distances are reported in f32 but the march runs in f64: far from the
    /// origin an f32 step is coarser than `OFFSET`, and the sample would land
    /// back on the face just crossed.
    pub fn intersect<R>(&self, ray: &mut TraceRay, resolver: &R) -> bool
    where
        R: MaterialResolver + ?Sized,
    {
        let cube = Aabb::cube(self.extent() as f32);
        let extent = self.extent() as f64;
        let o = widen(ray.origin);
        let d = widen(ray.direction);

        let (mut distance, mut normal) = if cube.contains(ray.origin) {
            (0.0f64, ray.normal)
        } else {
            match cube.ray_entry(ray.origin, ray.direction) {
                Some(entry) => (entry_distance(&o, &d, extent, entry), entry.normal),
                None => return false,
            }
        };

        let best = ray.distance as f64;
        let inv = [1.0 / d[0], 1.0 / d[1], 1.0 / d[2]];
        loop {
            if distance >= best {
                return false;
            }

            let t = distance + OFFSET as f64;
            let p = [o[0] + d[0] * t, o[1] + d[1] * t, o[2] + d[2] * t];
            if p.iter().any(|&c| c < 0.0 || c >= extent) {
                return false;
            }
            let (x, y, z) = (p[0] as i32, p[1] as i32, p[2] as i32);

            let (voxel, level) = self.get_with_level(x, y, z);
            if voxel != AIR {
                let probe = ProbeRay {
                    origin: Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32),
                    direction: ray.direction,
                    normal,
                };
                if let Some(hit) = resolver.intersect(voxel, &probe) {
                    let total = distance + hit.distance as f64;
                    if total >= best {
                        return false;
                    }
                    ray.distance = total as f32;
                    ray.normal = normal;
                    ray.color = hit.color;
                    ray.emittance = hit.emittance;
                    return true;
                }
            }

            // Leave the leaf through the nearest plane ahead of us.
            let cell = [
                (x as u32 >> level) as u64,
                (y as u32 >> level) as u64,
                (z as u32 >> level) as u64,
            ];
            let mut t_near = f64::INFINITY;
            let mut exit_normal = normal;
            for axis in 0..3 {
                if d[axis] == 0.0 {
                    continue;
                }
                let plane = if d[axis] > 0.0 {
                    (cell[axis] + 1) << level
                } else {
                    cell[axis] << level
                };
                let t = (plane as f64 - o[axis]) * inv[axis];
                if t > distance + EPSILON as f64 && t < t_near {
                    t_near = t;
                    exit_normal = Vec3::on_axis(axis, -(d[axis].signum() as f32));
                }
            }
            if !t_near.is_finite() {
                return false;
            }
            distance = t_near;
            normal = exit_normal;
        }
    }
}
