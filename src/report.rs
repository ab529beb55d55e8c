// SPDX-License-Identifier: AGPL-3.0-only

//! Machine-readable run summary.
//!
//! One [`RunReport`] per run: the configuration that produced it, where the
//! parallel result came from, how long each path took, and how the parity
//! check went. Written as pretty JSON by `--json=<path>`.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::config::{Backend, RunConfig};
use crate::error::Result;
use crate::gpu::DispatchPlan;
use crate::harness::DispatchRun;
use crate::particle::ShadowResult;
use crate::validation::MAX_LISTED_MISMATCHES;
use crate::verify::{Mismatch, VerificationOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config: RunConfig,
    pub backend: Backend,
    /// `None` for host runs.
    pub adapter: Option<String>,
    pub plan: Option<DispatchPlan>,
    pub particles: usize,
    pub shadow_mean: f32,
    pub cpu_reference_ms: f64,
    /// GPU pass time from timestamp queries, when available.
    pub gpu_us: Option<f64>,
    /// Host wall time of the parallel path (submit to completion on GPU).
    pub host_dispatch_us: f64,
    pub passed: bool,
    pub mismatches: usize,
    pub max_delta: f32,
    pub first_mismatches: Vec<Mismatch>,
}

impl RunReport {
    #[must_use]
    pub fn new(config: &RunConfig, result: &ShadowResult, outcome: &VerificationOutcome) -> Self {
        Self {
            config: config.clone(),
            backend: config.backend,
            adapter: None,
            plan: None,
            particles: result.len(),
            shadow_mean: result.mean(),
            cpu_reference_ms: outcome.reference_elapsed.as_secs_f64() * 1e3,
            gpu_us: None,
            host_dispatch_us: 0.0,
            passed: outcome.passed(),
            mismatches: outcome.mismatches.len(),
            max_delta: outcome.max_delta,
            first_mismatches: outcome
                .mismatches
                .iter()
                .take(MAX_LISTED_MISMATCHES)
                .copied()
                .collect(),
        }
    }

    /// Attach the timings and plan of a GPU dispatch.
    #[must_use]
    pub fn with_dispatch(mut self, adapter: &str, run: &DispatchRun) -> Self {
        self.adapter = Some(adapter.to_string());
        self.plan = Some(run.plan);
        self.gpu_us = run.gpu_elapsed.map(|d| d.as_secs_f64() * 1e6);
        self.host_dispatch_us = run.host_elapsed.as_secs_f64() * 1e6;
        self
    }

    /// Attach the wall time of a host-lane run.
    #[must_use]
    pub fn with_host_elapsed(mut self, elapsed: Duration) -> Self {
        self.host_dispatch_us = elapsed.as_secs_f64() * 1e6;
        self
    }

    /// Save as pretty JSON, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// [`crate::error::ShadowError::Io`] or [`crate::error::ShadowError::Json`].
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "run report written");
        Ok(())
    }

    pub fn print_summary(&self) {
        println!();
        println!("  Backend:          {}", self.backend);
        if let Some(adapter) = &self.adapter {
            println!("  Adapter:          {adapter}");
        }
        if let Some(plan) = &self.plan {
            println!(
                "  Dispatch:         {:?} groups of {:?} for grid {}",
                plan.workgroups, plan.workgroup_size, plan.grid
            );
        }
        println!("  Particles:        {}", self.particles);
        println!("  Mean shadow:      {:.6}", self.shadow_mean);
        println!("  Serial reference: {}", format_us(self.cpu_reference_ms * 1e3));
        println!("  Parallel (host):  {}", format_us(self.host_dispatch_us));
        match self.gpu_us {
            Some(us) => println!("  Parallel (GPU):   {}", format_us(us)),
            None if self.backend == Backend::Gpu => {
                println!("  Parallel (GPU):   n/a (no timestamp queries)");
            }
            None => {}
        }
        println!("  Max |Δ|:          {:.3e}", self.max_delta);
    }
}

fn format_us(us: f64) -> String {
    if us < 1000.0 {
        format!("{us:.1} us")
    } else if us < 1_000_000.0 {
        format!("{:.2} ms", us / 1000.0)
    } else {
        format!("{:.2} s", us / 1_000_000.0)
    }
}
