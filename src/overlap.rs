// SPDX-License-Identifier: AGPL-3.0-only

//! Pairwise occlusion: how much of a receiver's silhouette one caster covers
//! along the light direction.
//!
//! The arithmetic here is mirrored operation-for-operation by `overlap()` in
//! `shaders/self_shadow.wgsl`. Change both or neither.
//!
//! ```text
//!   light ──►   receiver ○        ● caster
//!               d_receiver        d_caster     (projections on the light axis)
//!
//!   occlusion only if d_caster >= d_receiver, then falloff over the lateral
//!   offset of the two silhouettes:
//!     lateral <= |r_r - r_c|  → full      (1)
//!     lateral >=  r_r + r_c   → none      (0)
//! ```

use glam::Vec3;

use crate::particle::Particle;

/// Cubic Hermite ease on the clamped parameter, `3t² - 2t³`.
///
/// `edge0 > edge1` is allowed and reverses the ramp. Equal edges collapse the
/// ramp to a step that is 0 at the edge itself and 1 above it, so a
/// zero-radius caster never turns the parameter into `0 / 0`.
#[inline]
#[must_use]
pub fn smoothstep(edge0: f32, edge1: f32, value: f32) -> f32 {
    if edge0 == edge1 {
        return if value > edge0 { 1.0 } else { 0.0 };
    }
    let t = ((value - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Silhouette falloff over the lateral offset: 1 at `|r_receiver - r_caster|`,
/// 0 at `r_receiver + r_caster`, smooth in between.
#[inline]
#[must_use]
pub fn silhouette_falloff(lateral: f32, caster_radius: f32, receiver_radius: f32) -> f32 {
    smoothstep(
        receiver_radius + caster_radius,
        (receiver_radius - caster_radius).abs(),
        lateral,
    )
}

/// Fraction of `receiver`'s light blocked by `caster`, in [0, 1].
///
/// Preconditions: `direction` is unit length, `receiver.radius > 0`,
/// `caster.radius >= 0`, and opacities lie in [0, 1]. None of these are checked.
#[inline]
#[must_use]
pub fn overlap(direction: Vec3, caster: &Particle, receiver: &Particle) -> f32 {
    let d_receiver = direction.dot(receiver.position);
    let d_caster = direction.dot(caster.position);
    if d_caster < d_receiver {
        return 0.0;
    }

    let perp_receiver = receiver.position - direction * d_receiver;
    let perp_caster = caster.position - direction * d_caster;
    let lateral = perp_receiver.distance(perp_caster);

    let coverage =
        (caster.radius * caster.radius / (receiver.radius * receiver.radius)).min(1.0);
    caster.opacity * coverage * silhouette_falloff(lateral, caster.radius, receiver.radius)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::tolerances::OVERLAP_UNIT_ABS;

    fn p(x: f32, y: f32, z: f32, radius: f32, opacity: f32) -> Particle {
        Particle::new(Vec3::new(x, y, z), radius, opacity)
    }

    #[test]
    fn smoothstep_endpoints_and_midpoint() {
        assert_eq!(smoothstep(0.0, 1.0, 0.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 1.0), 1.0);
        assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
        assert_eq!(smoothstep(0.0, 1.0, -3.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 7.0), 1.0);
    }

    #[test]
    fn smoothstep_reversed_edges() {
        assert_eq!(smoothstep(2.0, 0.0, 2.0), 0.0);
        assert_eq!(smoothstep(2.0, 0.0, 0.0), 1.0);
        assert_eq!(smoothstep(2.0, 0.0, 1.0), 0.5);
    }

    #[test]
    fn smoothstep_equal_edges_is_a_step() {
        assert_eq!(smoothstep(1.0, 1.0, 1.0), 0.0);
        assert_eq!(smoothstep(1.0, 1.0, 0.5), 0.0);
        assert_eq!(smoothstep(1.0, 1.0, 1.5), 1.0);
    }

    #[test]
    fn zero_radius_caster_at_receiver_rim() {
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        let caster = p(2.0, 1.0, 0.0, 0.0, 0.5);
        let o = overlap(Vec3::X, &caster, &receiver);
        assert!(!o.is_nan());
        assert_eq!(o, 0.0);
    }

    #[test]
    fn falloff_is_monotone_between_edges() {
        let mut prev = 1.0;
        for i in 0..=100 {
            let lateral = 0.5 + 2.0 * i as f32 / 100.0;
            let f = silhouette_falloff(lateral, 1.5, 1.0);
            assert!(f <= prev + f32::EPSILON, "not monotone at {lateral}");
            prev = f;
        }
        assert_eq!(prev, 0.0);
    }

    #[test]
    fn small_caster_full_intersection() {
        let x = Vec3::X;
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        let caster = p(2.0, 0.0, 0.0, 0.5, 0.5);
        let expected = 0.5 * (0.5 * 0.5 / 1.0);
        assert!((overlap(x, &caster, &receiver) - expected).abs() < OVERLAP_UNIT_ABS);
    }

    #[test]
    fn large_caster_is_capped() {
        let receiver = p(0.0, 0.0, 0.0, 0.9, 1.0);
        let caster = p(2.0, 0.0, 0.0, 1.0, 0.5);
        assert!((overlap(Vec3::X, &caster, &receiver) - 0.5).abs() < OVERLAP_UNIT_ABS);
    }

    #[test]
    fn perpendicular_light_no_intersection() {
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        let caster = p(2.0, 0.0, 0.0, 0.5, 0.5);
        assert!(overlap(Vec3::Y, &caster, &receiver).abs() < OVERLAP_UNIT_ABS);
    }

    #[test]
    fn partial_lateral_offset() {
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        let caster = p(2.0, 1.0, 0.0, 1.0, 0.5);
        assert!((overlap(Vec3::X, &caster, &receiver) - 0.25).abs() < OVERLAP_UNIT_ABS);
    }

    #[test]
    fn caster_behind_receiver_short_circuits() {
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        let caster = p(-2.0, 0.0, 0.0, 5.0, 1.0);
        assert_eq!(overlap(Vec3::X, &caster, &receiver), 0.0);
    }

    #[test]
    fn boundaries_are_exact() {
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        // |1 - 1.5| = 0.5 lateral: full coverage.
        let inner = p(2.0, 0.5, 0.0, 1.5, 1.0);
        assert_eq!(overlap(Vec3::X, &inner, &receiver), 1.0);
        // 1 + 1.5 = 2.5 lateral: silhouettes just touch.
        let outer = p(2.0, 2.5, 0.0, 1.5, 1.0);
        assert_eq!(overlap(Vec3::X, &outer, &receiver), 0.0);
    }

    #[test]
    fn coplanar_caster_still_occludes() {
        // Equal projections are not "behind": the short-circuit is strict.
        let receiver = p(0.0, 0.0, 0.0, 1.0, 1.0);
        let caster = p(0.0, 0.0, 0.0, 1.0, 0.75);
        assert_eq!(overlap(Vec3::X, &caster, &receiver), 0.75);
    }
}
