// SPDX-License-Identifier: AGPL-3.0-only

//! Self-Shadow Parity Validation
//!
//! Computes a shadow factor for every particle of a seeded population on a
//! parallel backend (wgpu compute by default, rayon host lanes with
//! `--backend=host`), then recomputes the same factors serially on the CPU
//! and compares them element-wise.
//!
//! Before any device work the four hand-checked overlap scenarios are
//! evaluated on the host.
//!
//! Usage:
//!   validate_self_shadow [--seed=N] [--grid=XxY] [--backend=gpu|host]
//!                        [--json=PATH] [--list-adapters]
//!
//! Exit code 0 = parity confirmed, 1 = a check failed, 2 = the GPU run
//! could not be completed, 3 = bad configuration or report IO.

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use particle_shadow::aggregate::host_parallel_shadow_factors;
use particle_shadow::config::{Backend, RunConfig};
use particle_shadow::error::{Result, ShadowError};
use particle_shadow::gpu::GpuContext;
use particle_shadow::harness::{run_gpu, DispatchRun};
use particle_shadow::kernel::KernelSource;
use particle_shadow::particle::{LaneGrid, LightDirection, Population, ShadowResult};
use particle_shadow::report::RunReport;
use particle_shadow::validation::ValidationHarness;
use particle_shadow::verify::verify;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "validate_self_shadow [--seed=N] [--grid=XxY] [--backend=gpu|host] \
                     [--json=PATH] [--list-adapters]";

#[derive(Debug, Default)]
struct CliArgs {
    seed: Option<u64>,
    grid: Option<LaneGrid>,
    backend: Option<Backend>,
    json: Option<PathBuf>,
    list_adapters: bool,
    help: bool,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut cli = Self::default();
        for arg in args {
            if let Some(v) = arg.strip_prefix("--seed=") {
                cli.seed = Some(v.parse().map_err(|_| {
                    ShadowError::InvalidConfig(format!("--seed '{v}' is not a u64"))
                })?);
            } else if let Some(v) = arg.strip_prefix("--grid=") {
                cli.grid = Some(v.parse()?);
            } else if let Some(v) = arg.strip_prefix("--backend=") {
                cli.backend = Some(v.parse()?);
            } else if let Some(v) = arg.strip_prefix("--json=") {
                cli.json = Some(PathBuf::from(v));
            } else if arg == "--list-adapters" {
                cli.list_adapters = true;
            } else if arg == "--help" || arg == "-h" {
                cli.help = true;
            } else {
                return Err(ShadowError::InvalidConfig(format!(
                    "unrecognized argument '{arg}'"
                )));
            }
        }
        Ok(cli)
    }

    fn apply(&self, config: &mut RunConfig) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(grid) = self.grid {
            config.grid = grid;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
    }
}

/// Log, print, and exit with the error's code. No recovery is attempted.
fn abort(err: &ShadowError) -> ! {
    tracing::error!(error = %err, "run aborted");
    eprintln!("  ERROR: {err}");
    process::exit(err.exit_code());
}

fn run_on_gpu(population: &Population, direction: LightDirection) -> Result<(String, DispatchRun)> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| ShadowError::DeviceCreation(format!("tokio runtime: {e}")))?;
    rt.block_on(async {
        let gpu = GpuContext::acquire().await?;
        gpu.print_info();
        let kernel = gpu.load_kernel(KernelSource::self_shadow()).await?;
        let run = run_gpu(&gpu, &kernel, population, direction).await?;
        Ok::<_, ShadowError>((gpu.adapter_name.clone(), run))
    })
}

fn run_on_host(population: &Population, direction: LightDirection) -> (ShadowResult, Duration) {
    let started = Instant::now();
    let result = host_parallel_shadow_factors(population, direction);
    let elapsed = started.elapsed();
    tracing::info!(
        particles = population.len(),
        threads = rayon::current_num_threads(),
        host_us = elapsed.as_micros() as u64,
        "host lanes finished"
    );
    (result, elapsed)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Particle Self-Shadow Parity Validation                     ║");
    println!("║  Parallel lanes vs serial CPU reference                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let cli = CliArgs::parse(std::env::args().skip(1)).unwrap_or_else(|e| abort(&e));
    if cli.help {
        println!("  {USAGE}");
        return;
    }
    if cli.list_adapters {
        GpuContext::print_available_adapters();
        return;
    }

    let mut config = RunConfig::from_env().unwrap_or_else(|e| abort(&e));
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        abort(&e);
    }
    let direction = config.light_direction().unwrap_or_else(|e| abort(&e));
    let v = direction.vector();

    println!("  Grid: {} ({} particles), seed {}", config.grid, config.grid.len(), config.seed);
    println!("  Light: ({:.4}, {:.4}, {:.4})", v.x, v.y, v.z);
    println!("  Backend: {}", config.backend);
    println!("  Parity tolerance: {:.1e}", config.parity_tolerance);
    println!();

    let mut harness = ValidationHarness::new("self_shadow");

    // ══════════════════════════════════════════════════════════════
    //  Phase 1: overlap scenarios (host only)
    // ══════════════════════════════════════════════════════════════
    println!("═══ Phase 1: Overlap scenarios ═══════════════════════════════");
    harness.check_overlap_scenarios();
    println!("  {}/{} scenarios passed", harness.passed_count(), harness.total_count());
    println!();

    let population = Population::generate(&config).unwrap_or_else(|e| abort(&e));

    // ══════════════════════════════════════════════════════════════
    //  Phase 2: parallel run
    // ══════════════════════════════════════════════════════════════
    println!("═══ Phase 2: Parallel run ({}) ══════════════════════════════", config.backend);
    let (result, dispatch, host_elapsed) = match config.backend {
        Backend::Gpu => {
            let (adapter, run) = run_on_gpu(&population, direction).unwrap_or_else(|e| abort(&e));
            let result = run.result.clone();
            let host_elapsed = run.host_elapsed;
            (result, Some((adapter, run)), host_elapsed)
        }
        Backend::Host => {
            let (result, elapsed) = run_on_host(&population, direction);
            (result, None, elapsed)
        }
    };
    println!();

    // ══════════════════════════════════════════════════════════════
    //  Phase 3: parity against the serial reference
    // ══════════════════════════════════════════════════════════════
    println!("═══ Phase 3: Serial reference + parity ═══════════════════════");
    let outcome = verify(&result, &population, direction, config.parity_tolerance)
        .unwrap_or_else(|e| abort(&e));
    println!("  {outcome}");
    let unlisted = harness.record_parity(&config.backend.to_string(), &outcome);
    if unlisted > 0 {
        println!("  ... {unlisted} further mismatching lanes not listed");
    }
    harness.check_bool(
        "shadow factors within [0, 1]",
        result.as_slice().iter().all(|s| (0.0..=1.0).contains(s)),
    );

    let report = RunReport::new(&config, &result, &outcome);
    let report = match &dispatch {
        Some((adapter, run)) => report.with_dispatch(adapter, run),
        None => report.with_host_elapsed(host_elapsed),
    };
    report.print_summary();
    if let Some(path) = &cli.json {
        if let Err(e) = report.write_json(path) {
            abort(&e);
        }
        println!("  Report: {}", path.display());
    }

    harness.finish();
}
