// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: parallel realizations against the serial reference.
//!
//! Host lanes run everywhere. GPU tests need an adapter and are ignored by
//! default; run them with `cargo test -- --ignored`.

use glam::Vec3;
use particle_shadow::aggregate::{host_parallel_shadow_factors, serial_shadow_factors};
use particle_shadow::config::RunConfig;
use particle_shadow::error::ShadowError;
use particle_shadow::particle::{LaneGrid, LightDirection, Particle, Population, ShadowResult};
use particle_shadow::tolerances::{HOST_LANES_ABS, SHADOW_PARITY_ABS};
use particle_shadow::verify::{compare, verify};

fn config(grid: LaneGrid, seed: u64) -> RunConfig {
    RunConfig {
        grid,
        seed,
        ..RunConfig::default()
    }
}

#[test]
fn host_lanes_match_serial_across_seeds() {
    for seed in [1, 42, 2024, u64::MAX] {
        let c = config(LaneGrid::new(16, 16), seed);
        let pop = Population::generate(&c).unwrap();
        let dir = c.light_direction().unwrap();
        let serial = serial_shadow_factors(&pop, dir);
        let host = host_parallel_shadow_factors(&pop, dir);
        // Same per-lane arithmetic, so identical bits.
        assert_eq!(serial, host, "seed {seed}");
        assert!(compare(&host, &serial, HOST_LANES_ABS).unwrap().passed());
    }
}

#[test]
fn reference_run_verifies_on_host() {
    let c = RunConfig::default();
    let pop = Population::generate(&c).unwrap();
    let dir = c.light_direction().unwrap();
    let host = host_parallel_shadow_factors(&pop, dir);
    let outcome = verify(&host, &pop, dir, c.parity_tolerance).unwrap();
    assert!(outcome.passed(), "{outcome}");
    assert_eq!(outcome.compared, 1024);
    assert!(host.as_slice().iter().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn generation_is_deterministic() {
    let c = config(LaneGrid::new(8, 4), 5);
    let a = Population::generate(&c).unwrap();
    let b = Population::generate(&c).unwrap();
    assert_eq!(a.particles(), b.particles());
    let other = Population::generate(&config(LaneGrid::new(8, 4), 6)).unwrap();
    assert_ne!(a.particles(), other.particles());
}

#[test]
fn dense_scene_casts_real_shadows() {
    let c = RunConfig::default();
    let pop = Population::generate(&c).unwrap();
    let result = serial_shadow_factors(&pop, c.light_direction().unwrap());
    // 1024 particles of radius up to 1 in a 10^3 box: plenty of occlusion.
    assert!(result.mean() < 1.0);
    assert!(result.as_slice().iter().any(|&s| s < 0.5));
}

#[test]
fn verifier_reports_index_and_values() {
    let c = config(LaneGrid::new(4, 4), 42);
    let pop = Population::generate(&c).unwrap();
    let dir = c.light_direction().unwrap();
    let mut values = serial_shadow_factors(&pop, dir).into_inner();
    let original = values[5];
    values[5] = if original > 0.5 { 0.0 } else { 1.0 };
    let outcome = verify(&ShadowResult::new(values), &pop, dir, SHADOW_PARITY_ABS).unwrap();

    assert!(!outcome.passed());
    let m = outcome.first_mismatch().unwrap();
    assert_eq!(m.index, 5);
    assert_eq!(m.expected, original);
    assert!(m.delta >= 0.5 - f32::EPSILON);
}

#[test]
fn verifier_rejects_short_results() {
    let c = config(LaneGrid::new(4, 4), 42);
    let pop = Population::generate(&c).unwrap();
    let dir = c.light_direction().unwrap();
    let short = ShadowResult::new(vec![1.0; 15]);
    assert!(matches!(
        verify(&short, &pop, dir, SHADOW_PARITY_ABS),
        Err(ShadowError::LengthMismatch {
            expected: 16,
            actual: 15
        })
    ));
}

#[test]
fn tolerance_is_strict_upper_bound() {
    let a = ShadowResult::new(vec![0.5]);
    let e = ShadowResult::new(vec![0.5]);
    assert!(compare(&a, &e, SHADOW_PARITY_ABS).unwrap().passed());
    let a = ShadowResult::new(vec![0.25]);
    let e = ShadowResult::new(vec![0.5]);
    assert!(!compare(&a, &e, 0.25).unwrap().passed());
}

#[test]
fn single_particle_population_is_lit() {
    let pop = Population::row(vec![Particle::new(Vec3::ONE, 0.3, 1.0)]).unwrap();
    let dir = LightDirection::new(Vec3::new(0.5, 0.2, 0.3)).unwrap();
    assert_eq!(serial_shadow_factors(&pop, dir).as_slice(), &[1.0]);
    assert_eq!(host_parallel_shadow_factors(&pop, dir).as_slice(), &[1.0]);
}

mod gpu {
    use super::*;
    use particle_shadow::gpu::GpuContext;
    use particle_shadow::harness::{run_gpu, ShadowDispatch};
    use particle_shadow::kernel::KernelSource;

    fn context() -> (tokio::runtime::Runtime, GpuContext) {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        let gpu = rt.block_on(GpuContext::acquire()).expect("GPU device");
        (rt, gpu)
    }

    #[test]
    #[ignore = "requires GPU"]
    fn reference_run_matches_serial() {
        let (rt, gpu) = context();
        let kernel = rt.block_on(gpu.load_kernel(KernelSource::self_shadow())).unwrap();
        let c = RunConfig::default();
        let pop = Population::generate(&c).unwrap();
        let dir = c.light_direction().unwrap();
        let run = rt.block_on(run_gpu(&gpu, &kernel, &pop, dir)).unwrap();
        let outcome = verify(&run.result, &pop, dir, c.parity_tolerance).unwrap();
        assert!(outcome.passed(), "{outcome}");
        assert_eq!(run.plan.workgroups, (2, 2, 1));
    }

    #[test]
    #[ignore = "requires GPU"]
    fn prepared_dispatch_exposes_plan() {
        let (rt, gpu) = context();
        let kernel = rt.block_on(gpu.load_kernel(KernelSource::self_shadow())).unwrap();
        let c = config(LaneGrid::new(33, 2), 8);
        let pop = Population::generate(&c).unwrap();
        let dir = c.light_direction().unwrap();
        let dispatch = rt
            .block_on(ShadowDispatch::prepare(&gpu, &kernel, &pop, dir))
            .unwrap();
        assert_eq!(dispatch.plan().workgroups, (3, 1, 1));
        let run = rt.block_on(dispatch.run()).unwrap();
        assert_eq!(run.result.len(), 66);
        assert!(verify(&run.result, &pop, dir, SHADOW_PARITY_ABS).unwrap().passed());
    }
}
