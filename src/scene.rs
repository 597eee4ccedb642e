use fastnoise_lite::{FastNoiseLite, NoiseType};
use strata_geom::Vec3;
use strata_octree::{TraceRay, VoxelStore};
use strata_shard::{IndexError, ShardedVoxelIndex};

use crate::config::{SceneSection, ViewSection};

/// Column heights of the noise terrain, row-major over x then z.
pub struct HeightField {
    pub size_x: u32,
    pub size_z: u32,
    heights: Vec<i32>,
}

impl HeightField {
    pub fn generate(scene: &SceneSection) -> Self {
        let mut noise = FastNoiseLite::with_seed(scene.seed);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_frequency(Some(scene.frequency));
        let [size_x, size_z] = scene.footprint;
        let mut heights = Vec::with_capacity((size_x * size_z) as usize);
        for x in 0..size_x {
            for z in 0..size_z {
                let n = ((noise.get_noise_2d(x as f32, z as f32) + 1.0) * 0.5).clamp(0.0, 1.0);
                heights.push(scene.base_height + (n * scene.amplitude) as i32);
            }
        }
        Self {
            size_x,
            size_z,
            heights,
        }
    }

    #[inline]
    pub fn height(&self, x: u32, z: u32) -> i32 {
        self.heights[(x * self.size_z + z) as usize]
    }

    pub fn max_height(&self) -> i32 {
        self.heights.iter().copied().max().unwrap_or(0)
    }
}

/// Write the terrain and boxes; returns the number of voxels written.
///
/// Terrain is written one shard cube at a time so the single resident shard
/// is flushed once per cube rather than once per column.
pub fn populate(index: &mut ShardedVoxelIndex, scene: &SceneSection) -> Result<u64, IndexError> {
    let field = HeightField::generate(scene);
    let step = 1u32 << index.shard_depth();
    let top = field.max_height().max(0) as u32;
    let mut written = 0u64;

    for band in (0..=top).step_by(step as usize) {
        for tx in (0..field.size_x).step_by(step as usize) {
            for tz in (0..field.size_z).step_by(step as usize) {
                for x in tx..(tx + step).min(field.size_x) {
                    for z in tz..(tz + step).min(field.size_z) {
                        let h = field.height(x, z);
                        let y_end = (h + 1).min((band + step) as i32);
                        for y in band as i32..y_end {
                            let voxel = if y == h { scene.top } else { scene.ground };
                            index.write(voxel, x as i32, y, z as i32)?;
                            written += 1;
                        }
                    }
                }
            }
        }
    }

    for b in &scene.boxes {
        for x in b.min[0]..b.max[0] {
            for y in b.min[1]..b.max[1] {
                for z in b.min[2]..b.max[2] {
                    index.write(b.voxel, x, y, z)?;
                    written += 1;
                }
            }
        }
    }

    log::info!(
        target: "scene",
        "populated {} voxels over {} shards",
        written,
        index.shard_count()
    );
    Ok(written)
}

/// One primary ray per pixel of an orthographic view, row by row.
pub fn view_rays(view: &ViewSection) -> Vec<TraceRay> {
    let eye = Vec3::new(view.eye[0], view.eye[1], view.eye[2]);
    let target = Vec3::new(view.target[0], view.target[1], view.target[2]);
    let forward = (target - eye).normalized();
    let mut right = forward.cross(Vec3::UP).normalized();
    if right.length() == 0.0 {
        right = Vec3::new(1.0, 0.0, 0.0);
    }
    let up = right.cross(forward);

    let half_w = view.width as f32 / 2.0;
    let half_h = view.height as f32 / 2.0;
    let mut rays = Vec::with_capacity((view.width * view.height) as usize);
    for py in 0..view.height {
        for px in 0..view.width {
            let u = (px as f32 + 0.5 - half_w) * view.spacing;
            let v = (half_h - py as f32 - 0.5) * view.spacing;
            let origin = eye + right * u + up * v;
            rays.push(TraceRay::new(0, px, py, origin, forward));
        }
    }
    rays
}
