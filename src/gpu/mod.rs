// SPDX-License-Identifier: AGPL-3.0-only

//! GPU compute context for the self-shadowing kernel.
//!
//! Acquires a wgpu device with compute support, and provides the pieces the
//! dispatch harness is built from: kernel loading, typed buffers (read view,
//! write view, uniform), bind groups, a blocking submit, and readback.
//!
//! ## Adapter selection
//!
//! Set `SHADOW_GPU_ADAPTER` to select a specific GPU:
//!
//! | Value | Behavior |
//! |-------|----------|
//! | `auto` / *(unset)* | discrete GPU first, then other hardware, then a software adapter |
//! | `0`, `1`, … | Select adapter by enumeration index |
//! | substring | Case-insensitive name match (e.g. `"radeon"`, `"4070"`) |
//!
//! `SHADOW_WGPU_BACKEND` restricts the wgpu backend (`vulkan`, `metal`, `dx12`, `gl`).
//!
//! ## Error capture
//!
//! wgpu reports creation failures asynchronously. Every creation step runs
//! inside [`GpuContext::capture`], which pushes validation and out-of-memory
//! error scopes and maps whatever they caught onto the step's
//! [`ShadowError`] variant, so the first failing stage is what the caller sees.
//!
//! Submodules: `adapter` picks the device, `buffers` creates and reads back
//! buffers, `dispatch` plans lane coverage and submits, and `timing` wraps the
//! compute pass in timestamp queries.

mod adapter;
mod buffers;
mod dispatch;
mod timing;

pub use adapter::{AdapterInfo, AdapterSelector};
pub use buffers::mapped_bytes_to_vec;
pub use dispatch::DispatchPlan;
pub use timing::{elapsed_from_ticks, GpuTimer};

use std::sync::{Arc, Mutex};

use crate::error::{Result, ShadowError};
use crate::kernel::KernelSource;

/// A compiled compute pipeline and the entry point it was built from.
#[derive(Debug)]
pub struct ComputeKernel {
    pub label: &'static str,
    pub entry_point: &'static str,
    pipeline: wgpu::ComputePipeline,
}

impl ComputeKernel {
    #[must_use]
    pub const fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }
}

/// Device, queue, and capability flags for one run.
#[must_use]
pub struct GpuContext {
    pub adapter_name: String,
    pub backend: wgpu::Backend,
    pub has_timestamps: bool,
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Fail with [`ShadowError::DeviceLost`] once the device-lost callback has fired.
    ///
    /// # Errors
    ///
    /// Returns the loss reason recorded by the callback.
    pub fn ensure_alive(&self) -> Result<()> {
        let lost = self
            .lost
            .lock()
            .map_err(|_| ShadowError::DeviceLost("device-lost flag poisoned".into()))?;
        match lost.as_ref() {
            Some(reason) => Err(ShadowError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }
}

// ── Device acquisition ───────────────────────────────────────────────

impl GpuContext {
    /// Select an adapter and create a device capable of compute dispatch.
    ///
    /// Requests `TIMESTAMP_QUERY` when the adapter offers it.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::NoAdapter`] if no compute-capable adapter exists,
    /// or [`ShadowError::DeviceCreation`] if device creation fails.
    pub async fn acquire() -> Result<Self> {
        let selected = adapter::select_adapter()?;
        let info = selected.get_info();

        let mut required_features = wgpu::Features::empty();
        if selected.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            required_features |= wgpu::Features::TIMESTAMP_QUERY;
        }

        let (device, queue) = selected
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("particle-shadow device"),
                    required_features,
                    required_limits: selected.limits(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| ShadowError::DeviceCreation(e.to_string()))?;

        let lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!(?reason, %message, "GPU device lost");
            if let Ok(mut slot) = lost_flag.lock() {
                slot.get_or_insert_with(|| format!("{reason:?}: {message}"));
            }
        });
        device.on_uncaptured_error(Box::new(|err| {
            tracing::warn!(error = %err, "uncaptured wgpu error");
        }));

        let has_timestamps = required_features.contains(wgpu::Features::TIMESTAMP_QUERY);
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            timestamps = has_timestamps,
            "GPU device ready"
        );

        Ok(Self {
            adapter_name: info.name,
            backend: info.backend,
            has_timestamps,
            device,
            queue,
            lost,
        })
    }

    /// Every adapter the configured backends expose, compute-capable or not.
    #[must_use]
    pub fn enumerate_adapters() -> Vec<AdapterInfo> {
        adapter::enumerate_adapters()
    }

    pub fn print_info(&self) {
        let timing = if self.has_timestamps { "timestamp queries" } else { "host timing only" };
        println!("  device:  {} [{:?}, {timing}]", self.adapter_name, self.backend);
    }

    /// `--list-adapters` output; `✗` marks adapters without compute shaders.
    pub fn print_available_adapters() {
        let adapters = Self::enumerate_adapters();
        if adapters.is_empty() {
            println!("  no adapters exposed by the configured wgpu backends");
            return;
        }
        println!("  {} adapter(s):", adapters.len());
        for info in &adapters {
            let mark = if info.has_compute { '✓' } else { '✗' };
            println!("    {mark} {info}");
        }
    }
}

// ── Error capture ────────────────────────────────────────────────────

impl GpuContext {
    /// Run `op` inside validation + out-of-memory error scopes.
    ///
    /// # Errors
    ///
    /// Maps the first captured wgpu error through `on_error`, or returns
    /// [`ShadowError::DeviceLost`] if the device is already gone.
    pub async fn capture<T>(
        &self,
        on_error: impl FnOnce(String) -> ShadowError,
        op: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T> {
        self.ensure_alive()?;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = op(&self.device);
        let validation = self.device.pop_error_scope().await;
        let out_of_memory = self.device.pop_error_scope().await;
        match validation.or(out_of_memory) {
            Some(err) => Err(on_error(err.to_string())),
            None => Ok(value),
        }
    }
}

// ── Kernel loading ───────────────────────────────────────────────────

impl GpuContext {
    /// Compile a WGSL program and build a compute pipeline for its entry point.
    ///
    /// The pipeline layout is derived from the shader's bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::KernelLoad`] if the module fails to parse or
    /// validate, or the entry point does not exist.
    pub async fn load_kernel(&self, source: KernelSource) -> Result<ComputeKernel> {
        let pipeline = self
            .capture(ShadowError::KernelLoad, |device| {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(source.label),
                    source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(source.label),
                    layout: None,
                    module: &module,
                    entry_point: source.entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .await?;
        tracing::debug!(kernel = source.label, entry = source.entry_point, "kernel loaded");
        Ok(ComputeKernel {
            label: source.label,
            entry_point: source.entry_point,
            pipeline,
        })
    }
}
