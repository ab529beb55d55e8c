// SPDX-License-Identifier: AGPL-3.0-only

//! WGSL kernel source and the host-side mirror of its uniform block.

use bytemuck::{Pod, Zeroable};

use crate::particle::{LaneGrid, LightDirection};

// ═══════════════════════════════════════════════════════════════════
// Self-Shadowing Kernel (f32)
// ═══════════════════════════════════════════════════════════════════
//
// One invocation per receiver, each loops over all N casters.
// O(N²) total, O(N) per lane, no cross-lane communication.

pub const SELF_SHADOW_WGSL: &str = include_str!("shaders/self_shadow.wgsl");

/// Entry point name inside [`SELF_SHADOW_WGSL`].
pub const SELF_SHADOW_ENTRY: &str = "cs_self_shadow";

/// `@workgroup_size` declared by the kernel. 16×16 = 256 invocations, the
/// wgpu default `max_compute_invocations_per_workgroup`.
pub const WORKGROUP_SIZE: (u32, u32, u32) = (16, 16, 1);

/// A WGSL program plus the entry point to build a pipeline from.
#[derive(Debug, Clone, Copy)]
pub struct KernelSource {
    pub label: &'static str,
    pub wgsl: &'static str,
    pub entry_point: &'static str,
}

impl KernelSource {
    #[must_use]
    pub const fn self_shadow() -> Self {
        Self {
            label: "self_shadow",
            wgsl: SELF_SHADOW_WGSL,
            entry_point: SELF_SHADOW_ENTRY,
        }
    }
}

/// Uniform block at binding 2. Layout must match `ShadowParams` in the WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowParams {
    pub direction: [f32; 4],
    pub particle_count: u32,
    pub grid_width: u32,
    pub _pad: [u32; 2],
}

impl ShadowParams {
    #[must_use]
    pub fn new(direction: LightDirection, grid: LaneGrid) -> Self {
        Self {
            direction: direction.to_uniform(),
            particle_count: grid.x_tiles * grid.y_tiles,
            grid_width: grid.x_tiles,
            _pad: [0; 2],
        }
    }
}
