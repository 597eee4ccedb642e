//! Float3 and box geometry shared by the octree and tracer crates.
#![forbid(unsafe_code)]

use core::ops::{Add, Div, Mul, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Component by axis index (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Unit vector along `axis` scaled by `v`.
    #[inline]
    pub fn on_axis(axis: usize, v: f32) -> Vec3 {
        match axis {
            0 => Vec3::new(v, 0.0, 0.0),
            1 => Vec3::new(0.0, v, 0.0),
            _ => Vec3::new(0.0, 0.0, v),
        }
    }

    #[inline]
    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline]
    pub fn cross(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > 0.0 { self / len } else { self }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn div(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Where a ray first crosses into a box, and the face it crossed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlabEntry {
    pub distance: f32,
    pub normal: Vec3,
}

impl Aabb {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Axis-aligned cube `[0, extent)` on every axis.
    #[inline]
    pub const fn cube(extent: f32) -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::splat(extent),
        }
    }

    /// Half-open containment test; the max faces are outside.
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        (0..3).all(|a| p.axis(a) >= self.min.axis(a) && p.axis(a) < self.max.axis(a))
    }

    /// Slab test for a ray starting outside the box.
    ///
    /// Returns the distance along `dir` to the entry face and that face's
    /// outward normal. Rays that miss the box, or whose entry lies behind the
    /// origin, return `None`.
    pub fn ray_entry(&self, origin: Vec3, dir: Vec3) -> Option<SlabEntry> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        let mut normal = Vec3::ZERO;
        for axis in 0..3 {
            let o = origin.axis(axis);
            let d = dir.axis(axis);
            let lo = self.min.axis(axis);
            let hi = self.max.axis(axis);
            if d == 0.0 {
                if o < lo || o >= hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (near, far) = if inv >= 0.0 {
                ((lo - o) * inv, (hi - o) * inv)
            } else {
                ((hi - o) * inv, (lo - o) * inv)
            };
            if t_min > far || near > t_max {
                return None;
            }
            if near > t_min {
                t_min = near;
                normal = Vec3::on_axis(axis, -d.signum());
            }
            if far < t_max {
                t_max = far;
            }
        }
        if !t_min.is_finite() || t_min < 0.0 {
            return None;
        }
        Some(SlabEntry {
            distance: t_min,
            normal,
        })
    }
}
