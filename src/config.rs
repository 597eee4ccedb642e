use std::error::Error;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_shard::IndexConfig;
use strata_trace::{DEFAULT_MAX_PENDING, ShardFrame, TraceConfig};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)] pub index: IndexSection,
    #[serde(default)] pub trace: TraceSection,
    #[serde(default)] pub scene: SceneSection,
    #[serde(default)] pub materials: Vec<MaterialEntry>,
    #[serde(default)] pub view: ViewSection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IndexSection {
    #[serde(default = "default_total_depth")] pub total_depth: u32,
    #[serde(default = "default_shard_depth")] pub shard_depth: u32,
    #[serde(default)] pub scratch_dir: Option<PathBuf>,
}
fn default_total_depth() -> u32 { 8 }
fn default_shard_depth() -> u32 { 6 }
impl Default for IndexSection { fn default() -> Self { Self { total_depth: default_total_depth(), shard_depth: default_shard_depth(), scratch_dir: None } } }

#[derive(Clone, Debug, Deserialize)]
pub struct TraceSection {
    #[serde(default)] pub threads: usize,
    #[serde(default = "default_max_pending")] pub max_pending_rays: usize,
    #[serde(default = "default_max_batch")] pub max_batch_rays: usize,
    /// Trace each shard where it was written rather than at the origin.
    #[serde(default = "default_local_frames")] pub local_frames: bool,
}
fn default_max_pending() -> usize { DEFAULT_MAX_PENDING }
fn default_max_batch() -> usize { 1 << 16 }
fn default_local_frames() -> bool { true }
impl Default for TraceSection { fn default() -> Self { Self { threads: 0, max_pending_rays: default_max_pending(), max_batch_rays: default_max_batch(), local_frames: default_local_frames() } } }

#[derive(Clone, Debug, Deserialize)]
pub struct SceneSection {
    #[serde(default = "default_seed")] pub seed: i32,
    /// Terrain footprint along x and z, in voxels.
    #[serde(default = "default_footprint")] pub footprint: [u32; 2],
    #[serde(default = "default_frequency")] pub frequency: f32,
    #[serde(default = "default_base_height")] pub base_height: i32,
    #[serde(default = "default_amplitude")] pub amplitude: f32,
    #[serde(default = "default_ground")] pub ground: u32,
    #[serde(default = "default_top")] pub top: u32,
    #[serde(default)] pub boxes: Vec<BoxEntry>,
}
fn default_seed() -> i32 { 1337 }
fn default_footprint() -> [u32; 2] { [128, 128] }
fn default_frequency() -> f32 { 0.02 }
fn default_base_height() -> i32 { 8 }
fn default_amplitude() -> f32 { 24.0 }
fn default_ground() -> u32 { 1 }
fn default_top() -> u32 { 2 }
impl Default for SceneSection {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            footprint: default_footprint(),
            frequency: default_frequency(),
            base_height: default_base_height(),
            amplitude: default_amplitude(),
            ground: default_ground(),
            top: default_top(),
            boxes: Vec::new(),
        }
    }
}

/// Solid box, `min` inclusive and `max` exclusive.
#[derive(Clone, Debug, Deserialize)]
pub struct BoxEntry {
    pub min: [i32; 3],
    pub max: [i32; 3],
    pub voxel: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MaterialEntry {
    pub voxel: u32,
    #[serde(default = "default_color")] pub color: [f32; 3],
    #[serde(default)] pub emittance: [f32; 3],
    #[serde(default = "default_opaque")] pub opaque: bool,
}
fn default_color() -> [f32; 3] { [0.7, 0.7, 0.7] }
fn default_opaque() -> bool { true }

/// Orthographic ray grid.
#[derive(Clone, Debug, Deserialize)]
pub struct ViewSection {
    #[serde(default = "default_width")] pub width: u32,
    #[serde(default = "default_height")] pub height: u32,
    #[serde(default = "default_eye")] pub eye: [f32; 3],
    #[serde(default = "default_target")] pub target: [f32; 3],
    /// World units between neighbouring rays.
    #[serde(default = "default_spacing")] pub spacing: f32,
}
fn default_width() -> u32 { 96 }
fn default_height() -> u32 { 48 }
fn default_eye() -> [f32; 3] { [-40.0, 90.0, -40.0] }
fn default_target() -> [f32; 3] { [64.0, 16.0, 64.0] }
fn default_spacing() -> f32 { 1.5 }
impl Default for ViewSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            eye: default_eye(),
            target: default_target(),
            spacing: default_spacing(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Box<dyn Error>> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            shard_depth: self.index.shard_depth,
            scratch_dir: self.index.scratch_dir.clone(),
        }
    }

    pub fn trace_config(&self) -> TraceConfig {
        TraceConfig {
            threads: self.trace.threads,
            max_pending_rays: self.trace.max_pending_rays,
            max_batch_rays: self.trace.max_batch_rays,
            frame: if self.trace.local_frames { ShardFrame::Local } else { ShardFrame::Absolute },
        }
    }
}
