// SPDX-License-Identifier: AGPL-3.0-only

//! Buffer creation (read view, write view, uniform) and host readback.

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use super::GpuContext;
use crate::error::{Result, ShadowError};

fn buffer_error(label: &str) -> impl FnOnce(String) -> ShadowError + '_ {
    move |message| ShadowError::BufferCreation {
        label: label.to_string(),
        message,
    }
}

impl GpuContext {
    /// Create a read-only storage buffer from `Pod` elements (the kernel's read view).
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::BufferCreation`] if allocation or validation fails.
    pub async fn create_storage_buffer<T: Pod>(&self, data: &[T], label: &str) -> Result<wgpu::Buffer> {
        self.capture(buffer_error(label), |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
        })
        .await
    }

    /// Create a writable storage buffer of `count` f32 slots (the kernel's write view).
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::BufferCreation`] if allocation or validation fails.
    pub async fn create_f32_output_buffer(&self, count: usize, label: &str) -> Result<wgpu::Buffer> {
        let size = (count * std::mem::size_of::<f32>()) as u64;
        self.capture(buffer_error(label), |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })
        .await
    }

    /// Uniform block initialised from `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::BufferCreation`] if allocation or validation fails.
    pub async fn create_uniform_buffer<T: Pod>(&self, value: &T, label: &str) -> Result<wgpu::Buffer> {
        self.capture(buffer_error(label), |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        })
        .await
    }

    /// Copy `count` elements of `buffer` into a host-visible staging buffer and
    /// return them.
    ///
    /// Blocks until the copy has completed and the staging buffer is mapped.
    /// Only valid once the work that wrote `buffer` has been submitted.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::BufferCreation`] for the staging buffer,
    /// [`ShadowError::Readback`] if mapping fails, or
    /// [`ShadowError::DeviceLost`].
    pub async fn read_back<T: Pod>(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<T>> {
        let size = (count * std::mem::size_of::<T>()) as u64;
        let staging = self
            .capture(buffer_error("readback staging"), |device| {
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("readback staging"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("readback"),
                });
                encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
                self.queue().submit(std::iter::once(encoder.finish()));
                staging
            })
            .await?;
        self.read_staging(&staging)
    }

    /// [`Self::read_back`] specialised to the shadow-factor output.
    ///
    /// # Errors
    ///
    /// See [`Self::read_back`].
    pub async fn read_back_f32(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<f32>> {
        self.read_back(buffer, count).await
    }

    fn read_staging<T: Pod>(&self, staging: &wgpu::Buffer) -> Result<Vec<T>> {
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device().poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| ShadowError::Readback("GPU map callback: channel recv failed".into()))?
            .map_err(|e| ShadowError::Readback(format!("GPU buffer mapping: {e}")))?;
        self.ensure_alive()?;

        let data = slice.get_mapped_range();
        let result = mapped_bytes_to_vec(&data);
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

/// Decode mapped staging bytes into `Pod` values.
///
/// Mapped ranges are normally aligned for `T` and cast in place; otherwise
/// each element is read unaligned.
pub fn mapped_bytes_to_vec<T: Pod>(data: &[u8]) -> Vec<T> {
    bytemuck::try_cast_slice::<u8, T>(data).map_or_else(
        |_| {
            data.chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect()
        },
        <[T]>::to_vec,
    )
}
