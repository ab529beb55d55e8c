// SPDX-License-Identifier: AGPL-3.0-only

//! GPU adapter discovery and selection.
//!
//! Only adapters whose downlevel flags include compute shaders are eligible.
//! `SHADOW_GPU_ADAPTER` picks among them; without it, hardware outranks
//! software rasterizers.

use crate::error::{Result, ShadowError};

/// What `--list-adapters` shows for one adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Position in enumeration order; usable as `SHADOW_GPU_ADAPTER=<index>`.
    pub index: usize,
    pub name: String,
    pub driver: String,
    pub backend: wgpu::Backend,
    pub has_compute: bool,
    pub has_timestamps: bool,
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timing = if self.has_timestamps { "timestamps" } else { "no timestamps" };
        write!(
            f,
            "[{}] {} ({}, {:?}, {}, {})",
            self.index,
            self.name,
            self.driver,
            self.backend,
            device_kind(self.device_type),
            timing
        )
    }
}

const fn device_kind(device_type: wgpu::DeviceType) -> &'static str {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => "discrete",
        wgpu::DeviceType::IntegratedGpu => "integrated",
        wgpu::DeviceType::VirtualGpu => "virtual",
        wgpu::DeviceType::Cpu => "cpu",
        wgpu::DeviceType::Other => "other",
    }
}

/// Auto-selection preference; lower is better. Software adapters stand in
/// when no hardware device can run compute.
const fn preference_rank(device_type: wgpu::DeviceType) -> u8 {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 2,
        wgpu::DeviceType::Cpu => 3,
    }
}

/// Parsed value of `SHADOW_GPU_ADAPTER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterSelector {
    Auto,
    Index(usize),
    Name(String),
}

impl AdapterSelector {
    /// Interpret a raw selector: empty/`auto`, a decimal index, or a name substring.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let selector = raw.trim().to_lowercase();
        if selector.is_empty() || selector == "auto" {
            Self::Auto
        } else if let Ok(idx) = selector.parse::<usize>() {
            Self::Index(idx)
        } else {
            Self::Name(selector)
        }
    }

    fn from_env() -> Self {
        Self::parse(&std::env::var("SHADOW_GPU_ADAPTER").unwrap_or_default())
    }
}

/// Parse `SHADOW_WGPU_BACKEND`; anything unrecognized means all backends.
#[must_use]
pub fn backends_from(raw: Option<&str>) -> wgpu::Backends {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("vulkan") => wgpu::Backends::VULKAN,
        Some("metal") => wgpu::Backends::METAL,
        Some("dx12") => wgpu::Backends::DX12,
        Some("gl") => wgpu::Backends::GL,
        _ => wgpu::Backends::all(),
    }
}

/// Instance restricted to the backends named by `SHADOW_WGPU_BACKEND`.
pub fn create_instance() -> wgpu::Instance {
    let backends = backends_from(std::env::var("SHADOW_WGPU_BACKEND").ok().as_deref());
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    })
}

fn supports_compute(adapter: &wgpu::Adapter) -> bool {
    adapter
        .get_downlevel_capabilities()
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
}

fn describe(index: usize, adapter: &wgpu::Adapter) -> AdapterInfo {
    let wgpu::AdapterInfo {
        name,
        driver,
        backend,
        device_type,
        ..
    } = adapter.get_info();
    AdapterInfo {
        index,
        name,
        driver,
        backend,
        has_compute: supports_compute(adapter),
        has_timestamps: adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY),
        device_type,
    }
}

#[must_use]
pub fn enumerate_adapters() -> Vec<AdapterInfo> {
    create_instance()
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .enumerate()
        .map(|(i, adapter)| describe(i, adapter))
        .collect()
}

/// Pick the compute-capable adapter named by `SHADOW_GPU_ADAPTER`, or the
/// best-ranked one when it is unset or `auto`.
///
/// # Errors
///
/// See [`choose_adapter`].
pub fn select_adapter() -> Result<wgpu::Adapter> {
    let adapters = create_instance().enumerate_adapters(wgpu::Backends::all());
    let listed: Vec<AdapterInfo> = adapters
        .iter()
        .enumerate()
        .map(|(i, adapter)| describe(i, adapter))
        .collect();
    let index = choose_adapter(&listed, &AdapterSelector::from_env())?;
    let selected = adapters.into_iter().nth(index).ok_or(ShadowError::NoAdapter)?;
    tracing::info!(adapter = %selected.get_info().name, index, "selected GPU adapter");
    Ok(selected)
}

/// Resolve `selector` against an enumeration listing, returning the chosen
/// [`AdapterInfo::index`]. Indices are the ones `--list-adapters` prints, so
/// adapters without compute support keep their slot but are never chosen.
///
/// # Errors
///
/// Returns [`ShadowError::NoAdapter`] if nothing listed can run compute, or
/// [`ShadowError::DeviceCreation`] if an explicit selector matches nothing usable.
pub fn choose_adapter(listed: &[AdapterInfo], selector: &AdapterSelector) -> Result<usize> {
    let mut usable = listed.iter().filter(|info| info.has_compute).peekable();
    if usable.peek().is_none() {
        return Err(ShadowError::NoAdapter);
    }
    match selector {
        AdapterSelector::Auto => usable
            .min_by_key(|info| preference_rank(info.device_type))
            .map(|info| info.index)
            .ok_or(ShadowError::NoAdapter),
        AdapterSelector::Index(idx) => {
            let info = listed.iter().find(|info| info.index == *idx).ok_or_else(|| {
                ShadowError::DeviceCreation(format!(
                    "adapter index {idx} not listed ({} adapters)",
                    listed.len()
                ))
            })?;
            if info.has_compute {
                Ok(info.index)
            } else {
                Err(ShadowError::DeviceCreation(format!(
                    "adapter {idx} ({}) cannot run compute shaders",
                    info.name
                )))
            }
        }
        AdapterSelector::Name(name) => usable
            .find(|info| info.name.to_ascii_lowercase().contains(name.as_str()))
            .map(|info| info.index)
            .ok_or_else(|| {
                ShadowError::DeviceCreation(format!(
                    "no compute-capable adapter name contains '{name}'"
                ))
            }),
    }
}
