// SPDX-License-Identifier: AGPL-3.0-only

//! Particle data model shared by the serial reference and the GPU kernel.
//!
//! [`Particle`] is `#[repr(C)]` + `Pod` so a population uploads to the
//! storage buffer without repacking; its 20-byte stride matches the WGSL
//! `Particle` struct in `shaders/self_shadow.wgsl`.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::{Result, ShadowError};
use crate::rng::lcg_range_f32;

/// A spherical particle: centre, radius, and opacity.
///
/// `radius` must be non-zero for any particle used as a receiver and
/// `opacity` is meaningful in [0, 1]. Neither is checked at evaluation time.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: Vec3,
    pub radius: f32,
    pub opacity: f32,
}

impl Particle {
    #[must_use]
    pub const fn new(position: Vec3, radius: f32, opacity: f32) -> Self {
        Self {
            position,
            radius,
            opacity,
        }
    }
}

/// Unit light direction, shared read-only by every overlap evaluation in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDirection(Vec3);

impl LightDirection {
    /// Normalize `v` into a light direction.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] for a zero-length or non-finite vector.
    pub fn new(v: Vec3) -> Result<Self> {
        v.try_normalize().map(Self).ok_or_else(|| {
            ShadowError::InvalidConfig(format!("light direction {v} cannot be normalized"))
        })
    }

    /// Wrap a vector the caller guarantees is already unit length.
    #[must_use]
    pub const fn from_unit(v: Vec3) -> Self {
        Self(v)
    }

    #[must_use]
    pub const fn vector(self) -> Vec3 {
        self.0
    }

    /// Uniform-block layout: xyz plus a zero pad lane.
    #[must_use]
    pub fn to_uniform(self) -> [f32; 4] {
        self.0.extend(0.0).to_array()
    }
}

/// Lane grid: one lane per particle, `x_tiles * y_tiles` lanes in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneGrid {
    pub x_tiles: u32,
    pub y_tiles: u32,
}

impl LaneGrid {
    #[must_use]
    pub const fn new(x_tiles: u32, y_tiles: u32) -> Self {
        Self { x_tiles, y_tiles }
    }

    /// Number of lanes (and particles).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.x_tiles as usize * self.y_tiles as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major particle index of lane `(x, y)`.
    #[must_use]
    pub const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.x_tiles as usize + x as usize
    }
}

impl Default for LaneGrid {
    fn default() -> Self {
        Self::new(32, 32)
    }
}

impl std::fmt::Display for LaneGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.x_tiles, self.y_tiles)
    }
}

impl std::str::FromStr for LaneGrid {
    type Err = ShadowError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || ShadowError::InvalidConfig(format!("grid '{s}' is not of the form <x>x<y>"));
        let (x, y) = s.trim().split_once(['x', 'X']).ok_or_else(bad)?;
        let x_tiles = x.trim().parse().map_err(|_| bad())?;
        let y_tiles = y.trim().parse().map_err(|_| bad())?;
        Ok(Self::new(x_tiles, y_tiles))
    }
}

/// Ordered particle population. Index `i` identifies the same particle on
/// every execution path.
#[derive(Debug, Clone)]
pub struct Population {
    grid: LaneGrid,
    particles: Vec<Particle>,
}

impl Population {
    /// Draw a population from the configured scene using the seeded LCG.
    ///
    /// Per particle the draws are x, y, z, radius, opacity, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] if `config` fails validation.
    pub fn generate(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let scene = &config.scene;
        let half = Vec3::from_array(scene.extent) * 0.5;
        let mut seed = config.seed;
        let particles = (0..config.grid.len())
            .map(|_| {
                let x = lcg_range_f32(&mut seed, -half.x, half.x);
                let y = lcg_range_f32(&mut seed, -half.y, half.y);
                let z = lcg_range_f32(&mut seed, -half.z, half.z);
                let radius = lcg_range_f32(&mut seed, scene.radius_min, scene.radius_max);
                let opacity = lcg_range_f32(&mut seed, scene.opacity_min, scene.opacity_max);
                Particle::new(Vec3::new(x, y, z), radius, opacity)
            })
            .collect();
        tracing::debug!(grid = %config.grid, seed = config.seed, "generated population");
        Ok(Self {
            grid: config.grid,
            particles,
        })
    }

    /// Wrap caller-supplied particles laid out on `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] if the count does not fill the grid.
    pub fn from_particles(grid: LaneGrid, particles: Vec<Particle>) -> Result<Self> {
        if grid.is_empty() {
            return Err(ShadowError::InvalidConfig("lane grid is empty".into()));
        }
        if particles.len() != grid.len() {
            return Err(ShadowError::InvalidConfig(format!(
                "{} particles do not fill a {grid} lane grid",
                particles.len()
            )));
        }
        Ok(Self { grid, particles })
    }

    /// A single row of lanes, one per particle.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] for an empty slice.
    pub fn row(particles: Vec<Particle>) -> Result<Self> {
        let width = u32::try_from(particles.len())
            .map_err(|_| ShadowError::InvalidConfig("too many particles for one row".into()))?;
        Self::from_particles(LaneGrid::new(width, 1), particles)
    }

    #[must_use]
    pub const fn grid(&self) -> LaneGrid {
        self.grid
    }

    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// One shadow factor per particle, written once by an execution path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowResult(Vec<f32>);

impl ShadowResult {
    #[must_use]
    pub const fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Mean light fraction over all particles (diagnostic).
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.0.is_empty() {
            return 1.0;
        }
        self.0.iter().sum::<f32>() / self.0.len() as f32
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn particle_layout_is_twenty_bytes() {
        assert_eq!(std::mem::size_of::<Particle>(), 20);
        assert_eq!(std::mem::align_of::<Particle>(), 4);
        let p = Particle::new(Vec3::new(1.0, 2.0, 3.0), 0.5, 0.25);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&p));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.5, 0.25]);
    }

    #[test]
    fn light_direction_normalizes() {
        let d = LightDirection::new(Vec3::new(0.5, 0.2, 0.3)).unwrap();
        assert!((d.vector().length() - 1.0).abs() < 1e-6);
        assert_eq!(d.to_uniform()[3], 0.0);
    }

    #[test]
    fn zero_light_direction_rejected() {
        let err = LightDirection::new(Vec3::ZERO).unwrap_err();
        assert!(matches!(err, ShadowError::InvalidConfig(_)));
    }

    #[test]
    fn lane_grid_index_is_row_major() {
        let g = LaneGrid::new(32, 32);
        assert_eq!(g.len(), 1024);
        assert_eq!(g.index(0, 0), 0);
        assert_eq!(g.index(31, 0), 31);
        assert_eq!(g.index(0, 1), 32);
        assert_eq!(g.index(31, 31), 1023);
    }

    #[test]
    fn lane_grid_parses() {
        assert_eq!("16x8".parse::<LaneGrid>().unwrap(), LaneGrid::new(16, 8));
        assert_eq!(" 4X4 ".parse::<LaneGrid>().unwrap(), LaneGrid::new(4, 4));
        assert!("16".parse::<LaneGrid>().is_err());
        assert!("ax2".parse::<LaneGrid>().is_err());
        assert_eq!(LaneGrid::new(3, 5).to_string(), "3x5");
    }

    #[test]
    fn generated_population_fills_grid_and_respects_scene() {
        let config = RunConfig::default();
        let pop = Population::generate(&config).unwrap();
        assert_eq!(pop.len(), 1024);
        for p in pop.particles() {
            assert!(p.position.abs().max_element() <= 5.0);
            assert!(p.radius >= config.scene.radius_min && p.radius < 1.0);
            assert!((0.0..1.0).contains(&p.opacity));
        }
    }

    #[test]
    fn generation_is_seed_deterministic() {
        let config = RunConfig::default();
        let a = Population::generate(&config).unwrap();
        let b = Population::generate(&config).unwrap();
        assert_eq!(a.particles(), b.particles());

        let other = RunConfig {
            seed: config.seed + 1,
            ..RunConfig::default()
        };
        let c = Population::generate(&other).unwrap();
        assert_ne!(a.particles(), c.particles());
    }

    #[test]
    fn from_particles_checks_count() {
        let p = Particle::new(Vec3::ZERO, 1.0, 1.0);
        assert!(Population::from_particles(LaneGrid::new(2, 2), vec![p; 3]).is_err());
        assert!(Population::from_particles(LaneGrid::new(0, 2), vec![]).is_err());
        assert_eq!(
            Population::from_particles(LaneGrid::new(2, 2), vec![p; 4])
                .unwrap()
                .len(),
            4
        );
        assert!(Population::row(vec![]).is_err());
    }

    #[test]
    fn shadow_result_accessors() {
        let r = ShadowResult::new(vec![1.0, 0.5]);
        assert_eq!(r.len(), 2);
        assert_eq!(r.get(1), Some(0.5));
        assert_eq!(r.get(2), None);
        assert!((r.mean() - 0.75).abs() < 1e-7);
        assert_eq!(ShadowResult::new(vec![]).mean(), 1.0);
    }
}
