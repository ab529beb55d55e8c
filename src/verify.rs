// SPDX-License-Identifier: AGPL-3.0-only

//! Parity verifier: recompute the serial reference and compare element-wise.
//!
//! Pure comparison. Neither result is mutated, and a mismatch is an outcome
//! to report, not an error.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::aggregate::serial_shadow_factors;
use crate::error::{Result, ShadowError};
use crate::particle::{LightDirection, Population, ShadowResult};

/// One element outside tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Mismatch {
    pub index: usize,
    /// Value from the parallel path.
    pub actual: f32,
    /// Value from the serial reference.
    pub expected: f32,
    pub delta: f32,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "index {}: parallel={:.7}, reference={:.7}, delta={:.3e}",
            self.index, self.actual, self.expected, self.delta
        )
    }
}

/// Result of comparing a parallel [`ShadowResult`] against the serial reference.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub tolerance: f32,
    pub compared: usize,
    /// Every index whose `|actual - expected|` is not below `tolerance`, in index order.
    pub mismatches: Vec<Mismatch>,
    /// Largest finite delta seen (0 for empty inputs).
    pub max_delta: f32,
    /// First NaN lane if there is one, otherwise the lane of `max_delta`.
    pub worst_index: Option<usize>,
    /// Time spent recomputing the reference (zero for [`compare`]).
    #[serde(serialize_with = "serialize_micros")]
    pub reference_elapsed: Duration,
}

fn serialize_micros<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_micros() as u64)
}

impl VerificationOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    #[must_use]
    pub fn first_mismatch(&self) -> Option<&Mismatch> {
        self.mismatches.first()
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed() {
            write!(
                f,
                "{} values within {:.1e} (max delta {:.3e})",
                self.compared, self.tolerance, self.max_delta
            )
        } else {
            write!(
                f,
                "{}/{} values exceed {:.1e}; first: {}",
                self.mismatches.len(),
                self.compared,
                self.tolerance,
                self.mismatches[0]
            )
        }
    }
}

/// Compare `actual` against `expected` element-wise with an absolute tolerance.
///
/// An element passes when `|actual - expected| < tolerance`; NaN on either side fails.
///
/// # Errors
///
/// Returns [`ShadowError::LengthMismatch`] if the results differ in length.
pub fn compare(
    actual: &ShadowResult,
    expected: &ShadowResult,
    tolerance: f32,
) -> Result<VerificationOutcome> {
    if actual.len() != expected.len() {
        return Err(ShadowError::LengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    let mut mismatches = Vec::new();
    let mut max_delta = 0.0f32;
    let mut worst_index = None;
    let mut worst_is_nan = false;
    for (index, (&a, &e)) in actual.as_slice().iter().zip(expected.as_slice()).enumerate() {
        let delta = (a - e).abs();
        if delta.is_nan() {
            if !worst_is_nan {
                worst_index = Some(index);
                worst_is_nan = true;
            }
        } else if delta > max_delta {
            max_delta = delta;
            if !worst_is_nan {
                worst_index = Some(index);
            }
        }
        if !(delta < tolerance) {
            mismatches.push(Mismatch {
                index,
                actual: a,
                expected: e,
                delta,
            });
        }
    }

    Ok(VerificationOutcome {
        tolerance,
        compared: actual.len(),
        mismatches,
        max_delta,
        worst_index,
        reference_elapsed: Duration::ZERO,
    })
}

/// Recompute the serial reference over the same inputs and compare.
///
/// # Errors
///
/// Returns [`ShadowError::LengthMismatch`] if `parallel` does not have one value
/// per particle.
pub fn verify(
    parallel: &ShadowResult,
    population: &Population,
    direction: LightDirection,
    tolerance: f32,
) -> Result<VerificationOutcome> {
    let started = Instant::now();
    let reference = serial_shadow_factors(population, direction);
    let reference_elapsed = started.elapsed();
    tracing::info!(
        particles = population.len(),
        cpu_ms = reference_elapsed.as_millis() as u64,
        "serial reference computed"
    );

    let mut outcome = compare(parallel, &reference, tolerance)?;
    outcome.reference_elapsed = reference_elapsed;
    if outcome.passed() {
        tracing::info!(max_delta = outcome.max_delta, "parity verified");
    } else {
        tracing::warn!(
            mismatches = outcome.mismatches.len(),
            first = %outcome.mismatches[0],
            "parity mismatch"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::aggregate::host_parallel_shadow_factors;
    use crate::config::RunConfig;
    use crate::particle::LaneGrid;

    fn r(values: &[f32]) -> ShadowResult {
        ShadowResult::new(values.to_vec())
    }

    #[test]
    fn identical_results_pass() {
        let o = compare(&r(&[1.0, 0.5, 0.25]), &r(&[1.0, 0.5, 0.25]), 1e-5).unwrap();
        assert!(o.passed());
        assert_eq!(o.compared, 3);
        assert_eq!(o.max_delta, 0.0);
    }

    #[test]
    fn reports_every_failing_index() {
        let o = compare(&r(&[1.0, 0.4, 0.25, 0.0]), &r(&[1.0, 0.5, 0.25, 0.1]), 1e-5).unwrap();
        assert!(!o.passed());
        let indices: Vec<usize> = o.mismatches.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![1, 3]);
        let first = o.first_mismatch().unwrap();
        assert_eq!(first.actual, 0.4);
        assert_eq!(first.expected, 0.5);
        assert!((first.delta - 0.1).abs() < 1e-6);
        assert_eq!(o.worst_index, Some(1));
    }

    #[test]
    fn delta_at_tolerance_fails() {
        let o = compare(&r(&[0.5]), &r(&[0.75]), 0.25).unwrap();
        assert!(!o.passed());
    }

    #[test]
    fn nan_is_a_mismatch() {
        let o = compare(&r(&[f32::NAN, 1.0]), &r(&[1.0, 1.0]), 1e-5).unwrap();
        assert_eq!(o.mismatches.len(), 1);
        assert_eq!(o.mismatches[0].index, 0);
        assert_eq!(o.worst_index, Some(0));
    }

    #[test]
    fn nan_lane_stays_worst_after_larger_finite_deltas() {
        let o = compare(&r(&[1.0, f32::NAN, 0.5, 0.0]), &r(&[1.0, 1.0, 1.0, 1.0]), 1e-5).unwrap();
        assert_eq!(o.worst_index, Some(1));
        assert_eq!(o.max_delta, 1.0);
        assert_eq!(o.mismatches.len(), 3);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = compare(&r(&[1.0]), &r(&[1.0, 1.0]), 1e-5).unwrap_err();
        assert!(matches!(
            err,
            ShadowError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn compare_leaves_inputs_untouched() {
        let a = r(&[0.1, 0.2]);
        let e = r(&[0.3, 0.2]);
        let _ = compare(&a, &e, 1e-5).unwrap();
        assert_eq!(a.as_slice(), &[0.1, 0.2]);
        assert_eq!(e.as_slice(), &[0.3, 0.2]);
    }

    #[test]
    fn display_names_first_mismatch() {
        let o = compare(&r(&[0.0]), &r(&[1.0]), 1e-5).unwrap();
        let s = o.to_string();
        assert!(s.contains("1/1"));
        assert!(s.contains("index 0"));
    }

    #[test]
    fn verify_accepts_host_lanes() {
        let config = RunConfig {
            grid: LaneGrid::new(8, 8),
            ..RunConfig::default()
        };
        let pop = Population::generate(&config).unwrap();
        let dir = config.light_direction().unwrap();
        let parallel = host_parallel_shadow_factors(&pop, dir);
        let o = verify(&parallel, &pop, dir, config.parity_tolerance).unwrap();
        assert!(o.passed(), "{o}");
        assert_eq!(o.compared, 64);
    }

    #[test]
    fn verify_catches_a_perturbed_lane() {
        let config = RunConfig {
            grid: LaneGrid::new(8, 8),
            ..RunConfig::default()
        };
        let pop = Population::generate(&config).unwrap();
        let dir = config.light_direction().unwrap();
        let mut values = host_parallel_shadow_factors(&pop, dir).into_inner();
        values[13] += 1e-3;
        let o = verify(&ShadowResult::new(values), &pop, dir, config.parity_tolerance).unwrap();
        assert_eq!(o.mismatches.len(), 1);
        assert_eq!(o.mismatches[0].index, 13);
    }
}
