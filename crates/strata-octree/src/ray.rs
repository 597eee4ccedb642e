use strata_geom::Vec3;

use crate::VoxelType;

/// A ray in flight between the host and the tracer.
///
/// `distance` is the nearest hit found so far; a fresh ray starts at
/// `f32::INFINITY`, the miss ceiling. Bounce chains link back to the ray they
/// were spawned from through `prev`.
#[derive(Clone, Debug)]
pub struct TraceRay {
    pub depth: u32,
    pub x: u32,
    pub y: u32,
    pub distance: f32,
    pub origin: Vec3,
    pub direction: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub emittance: Vec3,
    pub prev: Option<Box<TraceRay>>,
}

impl TraceRay {
    pub fn new(depth: u32, x: u32, y: u32, origin: Vec3, direction: Vec3) -> Self {
        Self {
            depth,
            x,
            y,
            distance: f32::INFINITY,
            origin,
            direction,
            normal: Vec3::ZERO,
            color: Vec3::ZERO,
            emittance: Vec3::ZERO,
            prev: None,
        }
    }

    /// Start the next bounce generation; the child takes ownership of this ray.
    pub fn spawn_child(self) -> TraceRay {
        TraceRay {
            depth: self.depth + 1,
            x: self.x,
            y: self.y,
            distance: f32::INFINITY,
            origin: self.origin,
            direction: self.direction,
            normal: Vec3::ZERO,
            color: Vec3::ZERO,
            emittance: Vec3::ZERO,
            prev: Some(Box::new(self)),
        }
    }

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.distance.is_finite()
    }

    pub fn hit_point(&self) -> Option<Vec3> {
        self.is_hit()
            .then(|| self.origin + self.direction * self.distance)
    }

    /// This ray followed by every ray it was spawned from, newest first.
    pub fn lineage(&self) -> impl Iterator<Item = &TraceRay> {
        std::iter::successors(Some(self), |r| r.prev.as_deref())
    }
}

/// Ray handed to a [`MaterialResolver`], positioned just inside the voxel.
#[derive(Clone, Copy, Debug)]
pub struct ProbeRay {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Normal of the face the ray crossed to reach this voxel.
    pub normal: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    /// Distance from the probe origin to the surface.
    pub distance: f32,
    pub color: Vec3,
    pub emittance: Vec3,
}

/// Surface intersection for a voxel type, supplied by the host.
///
/// Called for non-empty voxels only. Opaque types report a hit, transparent
/// ones return `None` and the march continues.
pub trait MaterialResolver: Send + Sync {
    fn intersect(&self, voxel: VoxelType, probe: &ProbeRay) -> Option<SurfaceHit>;
}

impl<F> MaterialResolver for F
where
    F: Fn(VoxelType, &ProbeRay) -> Option<SurfaceHit> + Send + Sync,
{
    fn intersect(&self, voxel: VoxelType, probe: &ProbeRay) -> Option<SurfaceHit> {
        self(voxel, probe)
    }
}
