// SPDX-License-Identifier: AGPL-3.0-only

//! Particle self-shadowing on wgpu compute, checked against a serial CPU oracle.
//!
//! Every particle in a population receives a shadow factor in [0, 1]: the
//! product, over all other particles, of the light each one lets through
//! toward it along a single directional light. The same formula runs three
//! ways (serial host loop, rayon host lanes, WGSL kernel) and the serial loop
//! is the reference the others are verified against.
//!
//! ## Modules
//!   - `particle`: particles, light direction, lane grid, populations, results
//!   - `overlap`: pairwise occlusion of one receiver by one caster
//!   - `aggregate`: per-receiver product, serial and host-parallel
//!   - `kernel`: the WGSL kernel source and its uniform block
//!   - `gpu`: device acquisition, buffers, dispatch, timestamps
//!   - `harness`: one GPU dispatch over one population
//!   - `verify`: element-wise parity against the serial reference
//!   - `validation`: pass/fail checks and exit-code mapping
//!   - `report`: JSON run summary
//!   - `config`, `tolerances`, `rng`, `error`: shared plumbing
//!
//! ## Validation binary
//!   - `validate_self_shadow`: overlap scenarios, then one parallel run
//!     verified against the serial reference

pub mod aggregate;
pub mod config;
pub mod error;
pub mod gpu;
pub mod harness;
pub mod kernel;
pub mod overlap;
pub mod particle;
pub mod report;
pub mod rng;
pub mod tolerances;
pub mod validation;
pub mod verify;
