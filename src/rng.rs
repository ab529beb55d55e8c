// SPDX-License-Identifier: AGPL-3.0-only

//! Deterministic LCG used for reproducible particle populations.
//!
//! Same population for the same seed on every platform, so a parity failure
//! can be replayed exactly.

/// Knuth MMIX multiplier.
pub const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// Knuth MMIX increment.
pub const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// 2^24: an f32 holds 24 significant bits exactly.
const F32_MANTISSA_DIVISOR: f32 = (1u32 << 24) as f32;

/// `seed = seed * a + c` with wrapping arithmetic.
#[inline]
pub fn lcg_step(seed: &mut u64) {
    *seed = seed
        .wrapping_mul(LCG_MULTIPLIER)
        .wrapping_add(LCG_INCREMENT);
}

/// Step once and map the top 24 state bits onto [0, 1).
#[inline]
pub fn lcg_uniform_f32(seed: &mut u64) -> f32 {
    lcg_step(seed);
    (*seed >> 40) as f32 / F32_MANTISSA_DIVISOR
}

/// Uniform f32 in `[lo, hi)`.
#[inline]
pub fn lcg_range_f32(seed: &mut u64, lo: f32, hi: f32) -> f32 {
    (hi - lo).mul_add(lcg_uniform_f32(seed), lo)
}
