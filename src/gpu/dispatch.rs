// SPDX-License-Identifier: AGPL-3.0-only

//! Dispatch planning, bind groups, and the blocking compute submission.
//!
//! ```text
//! DispatchPlan::covering(grid, WORKGROUP_SIZE)
//! bind_views()        → BindGroup (read view, write view, uniform)
//! submit_and_wait()   → ONE submission, blocks until completion is signalled
//! read_back_f32()     → host copy of the write view
//! ```

use std::time::{Duration, Instant};

use serde::Serialize;

use super::{ComputeKernel, GpuContext, GpuTimer};
use crate::error::{Result, ShadowError};
use crate::particle::LaneGrid;

/// Workgroup counts that launch at least one invocation per lane.
///
/// Invocations past the grid edge are masked inside the kernel, so every
/// lane is computed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchPlan {
    pub grid: LaneGrid,
    pub workgroup_size: (u32, u32, u32),
    pub workgroups: (u32, u32, u32),
}

impl DispatchPlan {
    #[must_use]
    pub const fn covering(grid: LaneGrid, workgroup_size: (u32, u32, u32)) -> Self {
        let workgroups = (
            grid.x_tiles.div_ceil(workgroup_size.0),
            grid.y_tiles.div_ceil(workgroup_size.1),
            1,
        );
        Self {
            grid,
            workgroup_size,
            workgroups,
        }
    }

    /// Total invocations launched, including masked ones.
    #[must_use]
    pub const fn invocations(&self) -> u64 {
        let (gx, gy, gz) = self.workgroups;
        let (wx, wy, wz) = self.workgroup_size;
        (gx as u64 * wx as u64) * (gy as u64 * wy as u64) * (gz as u64 * wz as u64)
    }

    /// Lane index computed by invocation `(x, y)`, or `None` if the kernel masks it.
    ///
    /// Same rule as the kernel: `x < grid_width`, then `y * grid_width + x < count`.
    #[must_use]
    pub const fn lane_for(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.grid.x_tiles {
            return None;
        }
        let index = self.grid.index(x, y);
        if index < self.grid.len() {
            Some(index)
        } else {
            None
        }
    }

    /// Check the plan against the device's workgroup limits.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::DispatchSubmission`] if any dimension exceeds the limits.
    pub fn check_limits(&self, limits: &wgpu::Limits) -> Result<()> {
        let (gx, gy, gz) = self.workgroups;
        let max_groups = limits.max_compute_workgroups_per_dimension;
        if gx > max_groups || gy > max_groups || gz > max_groups {
            return Err(ShadowError::DispatchSubmission(format!(
                "workgroups {:?} exceed device limit {max_groups} per dimension",
                self.workgroups
            )));
        }
        let (wx, wy, wz) = self.workgroup_size;
        if wx * wy * wz > limits.max_compute_invocations_per_workgroup
            || wx > limits.max_compute_workgroup_size_x
            || wy > limits.max_compute_workgroup_size_y
            || wz > limits.max_compute_workgroup_size_z
        {
            return Err(ShadowError::DispatchSubmission(format!(
                "workgroup size {:?} exceeds device limits",
                self.workgroup_size
            )));
        }
        Ok(())
    }
}

impl GpuContext {
    /// Create a bind group from a kernel and ordered buffer slice.
    ///
    /// Each buffer is bound at binding index 0, 1, 2, ... in order.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::ViewCreation`] if the buffers don't match the
    /// kernel's binding layout.
    pub async fn bind_views(
        &self,
        kernel: &ComputeKernel,
        buffers: &[&wgpu::Buffer],
    ) -> Result<wgpu::BindGroup> {
        self.capture(ShadowError::ViewCreation, |device| {
            let layout = kernel.pipeline().get_bind_group_layout(0);
            let entries: Vec<wgpu::BindGroupEntry> = buffers
                .iter()
                .enumerate()
                .map(|(i, buf)| wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: buf.as_entire_binding(),
                })
                .collect();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.label),
                layout: &layout,
                entries: &entries,
            })
        })
        .await
    }

    /// Encode one compute pass, submit it, and block until the queue signals
    /// that the submission has finished.
    ///
    /// Returns host wall time from submit to observed completion.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::DispatchSubmission`] if encoding or submission is
    /// rejected, or [`ShadowError::DeviceLost`] if the completion signal never
    /// arrives or the device is lost.
    pub async fn submit_and_wait(
        &self,
        kernel: &ComputeKernel,
        bind_group: &wgpu::BindGroup,
        plan: &DispatchPlan,
        timer: Option<&GpuTimer>,
    ) -> Result<Duration> {
        plan.check_limits(&self.device().limits())?;
        let started = Instant::now();
        let submission = self
            .capture(ShadowError::DispatchSubmission, |device| {
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("dispatch"),
                });
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(kernel.label),
                        timestamp_writes: timer.map(GpuTimer::pass_writes),
                    });
                    pass.set_pipeline(kernel.pipeline());
                    pass.set_bind_group(0, bind_group, &[]);
                    let (wx, wy, wz) = plan.workgroups;
                    pass.dispatch_workgroups(wx, wy, wz);
                }
                if let Some(timer) = timer {
                    timer.resolve(&mut encoder);
                }
                self.queue().submit(std::iter::once(encoder.finish()))
            })
            .await?;

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        self.queue().on_submitted_work_done(move || {
            let _ = done_tx.send(());
        });
        self.device().poll(wgpu::Maintain::wait_for(submission));
        self.device().poll(wgpu::Maintain::Wait);
        self.ensure_alive()?;
        done_rx.try_recv().map_err(|_| {
            ShadowError::DeviceLost("dispatch completion was never signalled".into())
        })?;

        let elapsed = started.elapsed();
        tracing::debug!(
            workgroups = ?plan.workgroups,
            elapsed_us = elapsed.as_micros() as u64,
            "dispatch complete"
        );
        Ok(elapsed)
    }
}
