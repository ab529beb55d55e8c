// SPDX-License-Identifier: AGPL-3.0-only

//! Parallel dispatch harness: one GPU run of the self-shadowing kernel.
//!
//! [`ShadowDispatch`] is the run context. It owns every device-side resource
//! for exactly one dispatch (particle read view, shadow write view, uniform
//! block, bind group, timestamp queries) and is consumed by [`ShadowDispatch::run`].
//! Host-side data is never aliased: particles are copied into the device
//! buffer at creation, and the result comes back as a fresh [`ShadowResult`].
//!
//! Creation is strictly ordered and fails fast; a failed step leaves nothing
//! to dispatch or read back.

use std::time::Duration;

use crate::error::{Result, ShadowError};
use crate::gpu::{ComputeKernel, DispatchPlan, GpuContext, GpuTimer};
use crate::kernel::{ShadowParams, WORKGROUP_SIZE};
use crate::particle::{LightDirection, Population, ShadowResult};

/// Outcome of one GPU dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRun {
    pub result: ShadowResult,
    /// Pass duration from timestamp queries, when the device supports them.
    pub gpu_elapsed: Option<Duration>,
    /// Host wall time from submit to observed completion.
    pub host_elapsed: Duration,
    pub plan: DispatchPlan,
}

/// Device resources for one dispatch over one population.
pub struct ShadowDispatch<'a> {
    gpu: &'a GpuContext,
    kernel: &'a ComputeKernel,
    plan: DispatchPlan,
    particle_count: usize,
    _particles: wgpu::Buffer,
    shadow: wgpu::Buffer,
    _params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    timer: Option<GpuTimer>,
}

impl<'a> ShadowDispatch<'a> {
    /// Upload the population and light direction and bind them to `kernel`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error: [`ShadowError::BufferCreation`]
    /// for any buffer or query set, [`ShadowError::ViewCreation`] for the bind group.
    pub async fn prepare(
        gpu: &'a GpuContext,
        kernel: &'a ComputeKernel,
        population: &Population,
        direction: LightDirection,
    ) -> Result<Self> {
        if population.is_empty() {
            return Err(ShadowError::InvalidConfig("cannot dispatch an empty population".into()));
        }
        let grid = population.grid();
        let plan = DispatchPlan::covering(grid, WORKGROUP_SIZE);
        let particle_count = population.len();
        tracing::debug!(
            particles = particle_count,
            bytes = std::mem::size_of_val(population.particles()),
            workgroups = ?plan.workgroups,
            "preparing dispatch"
        );

        let particles = gpu
            .create_storage_buffer(population.particles(), "particles")
            .await?;
        let shadow = gpu.create_f32_output_buffer(particle_count, "shadow").await?;
        let params = gpu
            .create_uniform_buffer(&ShadowParams::new(direction, grid), "shadow params")
            .await?;
        let bind_group = gpu.bind_views(kernel, &[&particles, &shadow, &params]).await?;
        let timer = GpuTimer::new(gpu).await?;

        Ok(Self {
            gpu,
            kernel,
            plan,
            particle_count,
            _particles: particles,
            shadow,
            _params: params,
            bind_group,
            timer,
        })
    }

    #[must_use]
    pub const fn plan(&self) -> &DispatchPlan {
        &self.plan
    }

    /// Dispatch, wait for completion, then read the shadow buffer back once.
    ///
    /// # Errors
    ///
    /// [`ShadowError::DispatchSubmission`] or [`ShadowError::DeviceLost`] from the
    /// dispatch; readback is not attempted after either. [`ShadowError::Readback`]
    /// if mapping the result fails.
    pub async fn run(self) -> Result<DispatchRun> {
        let host_elapsed = self
            .gpu
            .submit_and_wait(self.kernel, &self.bind_group, &self.plan, self.timer.as_ref())
            .await?;

        let values = self
            .gpu
            .read_back_f32(&self.shadow, self.particle_count)
            .await?;

        let gpu_elapsed = match &self.timer {
            Some(timer) => match timer.read_elapsed(self.gpu).await {
                Ok(elapsed) => Some(elapsed),
                Err(err) => {
                    tracing::warn!(error = %err, "timestamp readback failed");
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            particles = self.particle_count,
            gpu_us = gpu_elapsed.map(|d| d.as_micros() as u64),
            host_us = host_elapsed.as_micros() as u64,
            "GPU dispatch finished"
        );

        Ok(DispatchRun {
            result: ShadowResult::new(values),
            gpu_elapsed,
            host_elapsed,
            plan: self.plan,
        })
    }
}

/// Prepare and run in one call with an already-loaded kernel.
///
/// # Errors
///
/// See [`ShadowDispatch::prepare`] and [`ShadowDispatch::run`].
pub async fn run_gpu(
    gpu: &GpuContext,
    kernel: &ComputeKernel,
    population: &Population,
    direction: LightDirection,
) -> Result<DispatchRun> {
    ShadowDispatch::prepare(gpu, kernel, population, direction)
        .await?
        .run()
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aggregate::serial_shadow_factors;
    use crate::config::RunConfig;
    use crate::kernel::KernelSource;
    use crate::particle::{LaneGrid, Particle};
    use crate::tolerances::SHADOW_PARITY_ABS;
    use glam::Vec3;

    #[test]
    #[ignore = "requires GPU"]
    fn ragged_grid_matches_serial() {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        let gpu = rt.block_on(GpuContext::acquire()).expect("GPU device");
        let kernel = rt
            .block_on(gpu.load_kernel(KernelSource::self_shadow()))
            .expect("kernel");
        let config = RunConfig {
            grid: LaneGrid::new(17, 3),
            ..RunConfig::default()
        };
        let pop = Population::generate(&config).unwrap();
        let dir = config.light_direction().unwrap();
        let run = rt.block_on(run_gpu(&gpu, &kernel, &pop, dir)).unwrap();
        let reference = serial_shadow_factors(&pop, dir);
        assert_eq!(run.result.len(), 51);
        for (i, (g, c)) in run.result.as_slice().iter().zip(reference.as_slice()).enumerate() {
            assert!((g - c).abs() < SHADOW_PARITY_ABS, "lane {i}: gpu={g} cpu={c}");
        }
    }

    #[test]
    #[ignore = "requires GPU"]
    fn single_particle_is_lit_on_gpu() {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        let gpu = rt.block_on(GpuContext::acquire()).expect("GPU device");
        let kernel = rt
            .block_on(gpu.load_kernel(KernelSource::self_shadow()))
            .expect("kernel");
        let pop = Population::row(vec![Particle::new(Vec3::ZERO, 1.0, 1.0)]).unwrap();
        let dir = LightDirection::from_unit(Vec3::X);
        let run = rt.block_on(run_gpu(&gpu, &kernel, &pop, dir)).unwrap();
        assert_eq!(run.result.as_slice(), &[1.0]);
        assert_eq!(run.plan.workgroups, (1, 1, 1));
    }
}
