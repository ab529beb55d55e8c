// SPDX-License-Identifier: AGPL-3.0-only

//! Pass/fail bookkeeping for `validate_self_shadow`.
//!
//! Overlap scenarios with known answers run first, then the parity outcome
//! of the parallel run is recorded. The run exits 0 only if every check
//! passed, 1 otherwise.

use std::process;

use glam::Vec3;

use crate::particle::Particle;
use crate::tolerances::OVERLAP_UNIT_ABS;
use crate::verify::VerificationOutcome;

/// Mismatches listed individually per parity check; the rest are counted.
pub const MAX_LISTED_MISMATCHES: usize = 8;

/// One pass/fail line of the run summary.
#[derive(Debug, Clone)]
pub struct Check {
    pub label: String,
    pub passed: bool,
    pub observed: f64,
    /// Expected value, or the threshold for [`ToleranceMode::UpperBound`].
    pub expected: f64,
    pub tolerance: f64,
    pub mode: ToleranceMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    /// Pass when `|observed - expected| < tolerance`.
    Absolute,
    /// Pass when `observed < expected`.
    UpperBound,
    /// Pass when the recorded condition held.
    Condition,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Absolute => "abs",
            Self::UpperBound => "<",
            Self::Condition => "bool",
        })
    }
}

/// One hand-checked overlap evaluation.
#[derive(Debug, Clone, Copy)]
pub struct OverlapScenario {
    pub label: &'static str,
    pub direction: Vec3,
    pub caster: Particle,
    pub receiver: Particle,
    pub expected: f32,
}

/// The four reference scenarios, checked on the host before any device work.
#[must_use]
pub fn overlap_scenarios() -> [OverlapScenario; 4] {
    let origin_unit = Particle::new(Vec3::ZERO, 1.0, 1.0);
    let small_caster = Particle::new(Vec3::new(2.0, 0.0, 0.0), 0.5, 0.5);
    [
        OverlapScenario {
            label: "small caster, full intersection",
            direction: Vec3::X,
            caster: small_caster,
            receiver: origin_unit,
            expected: 0.125,
        },
        OverlapScenario {
            label: "large caster, coverage capped",
            direction: Vec3::X,
            caster: Particle::new(Vec3::new(2.0, 0.0, 0.0), 1.0, 0.5),
            receiver: Particle::new(Vec3::ZERO, 0.9, 1.0),
            expected: 0.5,
        },
        OverlapScenario {
            label: "light along y, no intersection",
            direction: Vec3::Y,
            caster: small_caster,
            receiver: origin_unit,
            expected: 0.0,
        },
        OverlapScenario {
            label: "lateral offset, partial falloff",
            direction: Vec3::X,
            caster: Particle::new(Vec3::new(2.0, 1.0, 0.0), 1.0, 0.5),
            receiver: origin_unit,
            expected: 0.25,
        },
    ]
}

/// Collects checks for one run and maps them to the process exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    pub name: String,
    pub checks: Vec<Check>,
}

impl ValidationHarness {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checks: Vec::new(),
        }
    }

    fn record(&mut self, label: &str, passed: bool, values: (f64, f64, f64), mode: ToleranceMode) {
        let (observed, expected, tolerance) = values;
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode,
        });
    }

    /// `|observed - expected| < tolerance`; NaN fails.
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = (observed - expected).abs() < tolerance;
        self.record(label, passed, (observed, expected, tolerance), ToleranceMode::Absolute);
    }

    /// `observed < threshold`; equality fails.
    pub fn check_upper(&mut self, label: &str, observed: f64, threshold: f64) {
        let passed = observed < threshold;
        self.record(label, passed, (observed, threshold, threshold), ToleranceMode::UpperBound);
    }

    pub fn check_bool(&mut self, label: &str, passed: bool) {
        let observed = f64::from(u8::from(passed));
        self.record(label, passed, (observed, 1.0, 0.0), ToleranceMode::Condition);
    }

    /// Evaluate every [`overlap_scenarios`] entry against [`OVERLAP_UNIT_ABS`].
    pub fn check_overlap_scenarios(&mut self) {
        for scenario in overlap_scenarios() {
            let observed = crate::overlap::overlap(
                scenario.direction,
                &scenario.caster,
                &scenario.receiver,
            );
            self.check_abs(
                &format!("overlap: {}", scenario.label),
                f64::from(observed),
                f64::from(scenario.expected),
                f64::from(OVERLAP_UNIT_ABS),
            );
        }
    }

    /// Record a parity run: one upper-bound check on the worst delta, then
    /// one failing check per mismatch, up to [`MAX_LISTED_MISMATCHES`].
    ///
    /// Returns how many mismatching lanes were left unlisted.
    pub fn record_parity(&mut self, label: &str, outcome: &VerificationOutcome) -> usize {
        // max_delta skips NaN lanes; report those as unbounded.
        let worst = if outcome.mismatches.iter().any(|m| m.delta.is_nan()) {
            f64::INFINITY
        } else {
            f64::from(outcome.max_delta)
        };
        self.check_upper(
            &format!("{label}: max |parallel - serial| over {} lanes", outcome.compared),
            worst,
            f64::from(outcome.tolerance),
        );
        for mismatch in outcome.mismatches.iter().take(MAX_LISTED_MISMATCHES) {
            self.record(
                &format!("{label}: lane {}", mismatch.index),
                false,
                (
                    f64::from(mismatch.actual),
                    f64::from(mismatch.expected),
                    f64::from(outcome.tolerance),
                ),
                ToleranceMode::Absolute,
            );
        }
        outcome.mismatches.len().saturating_sub(MAX_LISTED_MISMATCHES)
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Vacuously true with no checks.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed_labels().is_empty()
    }

    #[must_use]
    pub fn failed_labels(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.label.as_str())
            .collect()
    }

    /// 0 when every check passed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_passed())
    }

    /// Print the summary and terminate the process with [`Self::exit_code`].
    pub fn finish(&self) -> ! {
        println!();
        print!("{}", self.format_summary());
        let failed = self.failed_labels();
        if failed.is_empty() {
            println!("self-shadow validation passed");
        } else {
            println!("{} check(s) failed: {}", failed.len(), failed.join("; "));
        }
        process::exit(self.exit_code());
    }

    /// Header plus one line per check, as printed by [`Self::finish`].
    #[must_use]
    pub fn format_summary(&self) -> String {
        use std::fmt::Write;
        let mut s = String::new();
        let _ = writeln!(
            s,
            "═══ {} validation: {}/{} checks passed ═══",
            self.name,
            self.passed_count(),
            self.total_count()
        );
        for check in &self.checks {
            let mark = if check.passed { '✓' } else { '✗' };
            let _ = match check.mode {
                ToleranceMode::Condition => writeln!(s, "  {mark} {}", check.label),
                ToleranceMode::UpperBound => writeln!(
                    s,
                    "  {mark} {}: {:.6e} < {:.2e}",
                    check.label, check.observed, check.expected
                ),
                ToleranceMode::Absolute => writeln!(
                    s,
                    "  {mark} {}: observed={:.7}, expected={:.7}, tol={:.1e}",
                    check.label, check.observed, check.expected, check.tolerance
                ),
            };
        }
        s
    }
}
