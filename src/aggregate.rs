// SPDX-License-Identifier: AGPL-3.0-only

//! Multiplicative aggregation of pairwise overlaps into one shadow factor
//! per receiver.
//!
//! `factor_i = Π_{j ≠ i} (1 - overlap(dir, p_j, p_i))`, casters visited in
//! index order. The WGSL kernel walks the same order so rounding matches as
//! closely as the hardware allows.

use rayon::prelude::*;

use crate::overlap::overlap;
use crate::particle::{LightDirection, Particle, Population, ShadowResult};

/// Light fraction reaching `particles[receiver_index]` after every other
/// particle has had a chance to occlude it.
///
/// Panics if `receiver_index` is out of bounds.
#[must_use]
pub fn shadow_factor(direction: LightDirection, particles: &[Particle], receiver_index: usize) -> f32 {
    let dir = direction.vector();
    let receiver = &particles[receiver_index];
    particles
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != receiver_index)
        .fold(1.0, |factor, (_, caster)| {
            factor * (1.0 - overlap(dir, caster, receiver))
        })
}

/// Serial reference: every receiver in index order on the calling thread.
#[must_use]
pub fn serial_shadow_factors(population: &Population, direction: LightDirection) -> ShadowResult {
    let particles = population.particles();
    ShadowResult::new(
        (0..particles.len())
            .map(|i| shadow_factor(direction, particles, i))
            .collect(),
    )
}

/// Host lanes: one rayon task per receiver, same per-lane arithmetic as the
/// serial path.
#[must_use]
pub fn host_parallel_shadow_factors(
    population: &Population,
    direction: LightDirection,
) -> ShadowResult {
    let particles = population.particles();
    ShadowResult::new(
        (0..particles.len())
            .into_par_iter()
            .map(|i| shadow_factor(direction, particles, i))
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::particle::LaneGrid;
    use glam::Vec3;

    fn x_light() -> LightDirection {
        LightDirection::from_unit(Vec3::X)
    }

    #[test]
    fn single_particle_is_fully_lit() {
        let pop = Population::row(vec![Particle::new(Vec3::ZERO, 1.0, 1.0)]).unwrap();
        assert_eq!(serial_shadow_factors(&pop, x_light()).as_slice(), &[1.0]);
    }

    #[test]
    fn self_is_excluded() {
        // An opaque particle would fully occlude itself (equal projections,
        // zero lateral offset) if the j == i term were included.
        let pop = Population::row(vec![
            Particle::new(Vec3::ZERO, 1.0, 1.0),
            Particle::new(Vec3::new(0.0, 100.0, 0.0), 1.0, 1.0),
        ])
        .unwrap();
        let r = serial_shadow_factors(&pop, x_light());
        assert_eq!(r.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn two_casters_multiply() {
        let receiver = Particle::new(Vec3::ZERO, 1.0, 1.0);
        let a = Particle::new(Vec3::new(2.0, 0.0, 0.0), 1.0, 0.5);
        let b = Particle::new(Vec3::new(4.0, 0.0, 0.0), 1.0, 0.5);
        let particles = [receiver, a, b];
        let f = shadow_factor(x_light(), &particles, 0);
        assert!((f - 0.25).abs() < 1e-6);
        // The front-most caster sees nothing in front of it.
        assert_eq!(shadow_factor(x_light(), &particles, 2), 1.0);
    }

    #[test]
    fn factors_stay_in_unit_interval() {
        let config = RunConfig {
            grid: LaneGrid::new(16, 16),
            ..RunConfig::default()
        };
        let pop = Population::generate(&config).unwrap();
        let dir = config.light_direction().unwrap();
        let r = serial_shadow_factors(&pop, dir);
        assert_eq!(r.len(), 256);
        assert!(r.as_slice().iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn host_lanes_match_serial_bitwise() {
        let config = RunConfig {
            grid: LaneGrid::new(16, 8),
            seed: 3,
            ..RunConfig::default()
        };
        let pop = Population::generate(&config).unwrap();
        let dir = config.light_direction().unwrap();
        assert_eq!(
            serial_shadow_factors(&pop, dir),
            host_parallel_shadow_factors(&pop, dir)
        );
    }
}
