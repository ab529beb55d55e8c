// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized validation tolerances.
//!
//! Every threshold used by the overlap self-test and the parity verifier is
//! defined here with its origin. No ad-hoc magic numbers in the checks.
//!
//! | Category | Basis | Value |
//! |----------|-------|-------|
//! | Single overlap | one f32 evaluation, ~6 ops after the dot products | 1e-6 |
//! | Shadow parity | product of N-1 factors, GPU vs CPU instruction order | 1e-5 |

// ═══════════════════════════════════════════════════════════════════
// Unit-level tolerances (f32)
// ═══════════════════════════════════════════════════════════════════

/// Absolute tolerance for a single `overlap` evaluation against a
/// hand-computed expectation.
///
/// The scenarios use exactly representable inputs, so the only rounding
/// comes from the Hermite polynomial and the coverage ratio.
pub const OVERLAP_UNIT_ABS: f32 = 1e-6;

// ═══════════════════════════════════════════════════════════════════
// Cross-path tolerances (f32)
// ═══════════════════════════════════════════════════════════════════

/// Absolute tolerance when comparing GPU shadow factors against the serial
/// CPU reference.
///
/// Each factor is a product of N-1 terms. The GPU may contract
/// `t * t * (3 - 2t)` into FMAs and reorders the dot products, so per-term
/// drift of a few ULP accumulates over the product. Looser than
/// [`OVERLAP_UNIT_ABS`] for that reason.
pub const SHADOW_PARITY_ABS: f32 = 1e-5;

/// Tolerance for host-parallel (rayon) lanes against the serial reference.
///
/// Both run the same Rust function per receiver, so results are bit-identical.
pub const HOST_LANES_ABS: f32 = f32::EPSILON;
