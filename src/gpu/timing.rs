// SPDX-License-Identifier: AGPL-3.0-only

//! GPU timestamp queries around the compute pass.
//!
//! Diagnostic only: a missing `TIMESTAMP_QUERY` feature just means no GPU
//! time is reported.

use std::time::Duration;

use super::GpuContext;
use crate::error::{Result, ShadowError};

/// Two timestamp slots: pass begin (0) and pass end (1).
const TIMESTAMP_COUNT: u32 = 2;

/// Resolved size of [`TIMESTAMP_COUNT`] queries.
const RESOLVE_SIZE: u64 = TIMESTAMP_COUNT as u64 * wgpu::QUERY_SIZE as u64;

/// Timestamp query set plus the buffer it resolves into.
#[derive(Debug)]
pub struct GpuTimer {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    period_ns: f32,
}

impl GpuTimer {
    /// Create a timer if the device supports timestamp queries.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::BufferCreation`] if the query set or resolve
    /// buffer cannot be created.
    pub async fn new(gpu: &GpuContext) -> Result<Option<Self>> {
        if !gpu.has_timestamps {
            return Ok(None);
        }
        let on_error = |message: String| ShadowError::BufferCreation {
            label: "timestamp queries".into(),
            message,
        };
        let (query_set, resolve) = gpu
            .capture(on_error, |device| {
                let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
                    label: Some("dispatch timestamps"),
                    ty: wgpu::QueryType::Timestamp,
                    count: TIMESTAMP_COUNT,
                });
                let resolve = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("timestamp resolve"),
                    size: RESOLVE_SIZE,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                });
                (query_set, resolve)
            })
            .await?;
        Ok(Some(Self {
            query_set,
            resolve,
            period_ns: gpu.queue().get_timestamp_period(),
        }))
    }

    /// Timestamp writes for the compute pass descriptor.
    #[must_use]
    pub fn pass_writes(&self) -> wgpu::ComputePassTimestampWrites<'_> {
        wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    /// Resolve both timestamps into the resolve buffer (same encoder as the pass).
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..TIMESTAMP_COUNT, &self.resolve, 0);
    }

    /// Read the resolved timestamps back and convert to elapsed time.
    ///
    /// Only meaningful after the dispatch that wrote them has completed.
    ///
    /// # Errors
    ///
    /// Propagates readback failures.
    pub async fn read_elapsed(&self, gpu: &GpuContext) -> Result<Duration> {
        let ticks: Vec<u64> = gpu.read_back(&self.resolve, TIMESTAMP_COUNT as usize).await?;
        match ticks.as_slice() {
            [begin, end] => Ok(elapsed_from_ticks(*begin, *end, self.period_ns)),
            _ => Err(ShadowError::Readback(format!(
                "expected {TIMESTAMP_COUNT} timestamps, got {}",
                ticks.len()
            ))),
        }
    }
}

/// Convert a tick interval to wall time using the queue's timestamp period
/// (nanoseconds per tick). A reversed interval reads as zero.
#[must_use]
pub fn elapsed_from_ticks(begin: u64, end: u64, period_ns: f32) -> Duration {
    let ticks = end.saturating_sub(begin);
    let nanos = ticks as f64 * f64::from(period_ns);
    Duration::from_nanos(nanos.round() as u64)
}
