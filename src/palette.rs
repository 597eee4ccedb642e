use hashbrown::HashMap;
use strata_geom::Vec3;
use strata_octree::{MaterialResolver, ProbeRay, SurfaceHit, VoxelType};

use crate::config::MaterialEntry;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Surface {
    pub color: Vec3,
    pub emittance: Vec3,
    pub opaque: bool,
}

/// Flat-colored voxel surfaces keyed by type. Types without an entry render
/// as opaque `fallback`.
#[derive(Clone, Debug)]
pub struct PaletteResolver {
    surfaces: HashMap<VoxelType, Surface>,
    fallback: Surface,
}

impl PaletteResolver {
    pub fn new(fallback: Vec3) -> Self {
        Self {
            surfaces: HashMap::new(),
            fallback: Surface {
                color: fallback,
                emittance: Vec3::ZERO,
                opaque: true,
            },
        }
    }

    pub fn from_entries(entries: &[MaterialEntry]) -> Self {
        let mut palette = Self::new(Vec3::splat(0.5));
        for e in entries {
            let [r, g, b] = e.color;
            let [er, eg, eb] = e.emittance;
            palette.insert(
                e.voxel,
                Surface {
                    color: Vec3::new(r, g, b),
                    emittance: Vec3::new(er, eg, eb),
                    opaque: e.opaque,
                },
            );
        }
        palette
    }

    pub fn insert(&mut self, voxel: VoxelType, surface: Surface) {
        self.surfaces.insert(voxel, surface);
    }

    pub fn surface(&self, voxel: VoxelType) -> &Surface {
        self.surfaces.get(&voxel).unwrap_or(&self.fallback)
    }
}

impl MaterialResolver for PaletteResolver {
    fn intersect(&self, voxel: VoxelType, _probe: &ProbeRay) -> Option<SurfaceHit> {
        let s = self.surface(voxel);
        s.opaque.then_some(SurfaceHit {
            distance: 0.0,
            color: s.color,
            emittance: s.emittance,
        })
    }
}
