// SPDX-License-Identifier: AGPL-3.0-only

//! Run configuration.
//!
//! Layered: compiled defaults, then an optional JSON file named by
//! `SHADOW_CONFIG`, then the individual environment overrides:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `SHADOW_CONFIG` | path to a JSON `RunConfig` (missing fields keep defaults) |
//! | `SHADOW_SEED` | population seed (`u64`) |
//! | `SHADOW_GRID` | lane grid, e.g. `32x32` |
//! | `SHADOW_BACKEND` | `gpu` or `host` |
//!
//! Adapter and wgpu backend selection live in [`crate::gpu`]
//! (`SHADOW_GPU_ADAPTER`, `SHADOW_WGPU_BACKEND`).

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShadowError};
use crate::particle::{LaneGrid, LightDirection};
use crate::tolerances::SHADOW_PARITY_ABS;

/// Which parallel realization produces the result checked against the serial reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// wgpu compute kernel, one invocation per receiver.
    #[default]
    Gpu,
    /// rayon lanes on the host, one task per receiver.
    Host,
}

impl std::str::FromStr for Backend {
    type Err = ShadowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "host" | "cpu" => Ok(Self::Host),
            other => Err(ShadowError::InvalidConfig(format!(
                "unknown backend '{other}' (expected gpu or host)"
            ))),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Distribution the population is drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Box edge lengths; positions are uniform in `[-extent/2, extent/2)`.
    pub extent: [f32; 3],
    /// Radius floor. Positive so every generated receiver has a silhouette.
    pub radius_min: f32,
    pub radius_max: f32,
    pub opacity_min: f32,
    pub opacity_max: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            extent: [10.0, 10.0, 10.0],
            radius_min: 1e-3,
            radius_max: 1.0,
            opacity_min: 0.0,
            opacity_max: 1.0,
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub grid: LaneGrid,
    pub scene: SceneConfig,
    /// Light direction before normalization.
    pub light: [f32; 3],
    pub seed: u64,
    pub parity_tolerance: f32,
    pub backend: Backend,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grid: LaneGrid::default(),
            scene: SceneConfig::default(),
            light: [0.5, 0.2, 0.3],
            seed: 42,
            parity_tolerance: SHADOW_PARITY_ABS,
            backend: Backend::Gpu,
        }
    }
}

impl RunConfig {
    /// Defaults, then `SHADOW_CONFIG` file, then per-field environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::Io`]/[`ShadowError::Json`] if the config file cannot
    /// be read or parsed, and [`ShadowError::InvalidConfig`] for malformed
    /// environment values or a configuration that fails [`Self::validate`].
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("SHADOW_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::Io`] or [`ShadowError::Json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded run config");
        Ok(config)
    }

    /// Apply `SHADOW_SEED` / `SHADOW_GRID` / `SHADOW_BACKEND` from `lookup`.
    ///
    /// Takes a lookup function so tests don't touch the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] for unparsable values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(seed) = lookup("SHADOW_SEED") {
            self.seed = seed.trim().parse().map_err(|_| {
                ShadowError::InvalidConfig(format!("SHADOW_SEED '{seed}' is not a u64"))
            })?;
        }
        if let Some(grid) = lookup("SHADOW_GRID") {
            self.grid = grid.parse()?;
        }
        if let Some(backend) = lookup("SHADOW_BACKEND") {
            self.backend = backend.parse()?;
        }
        Ok(())
    }

    /// Normalized light direction.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] for a zero-length light vector.
    pub fn light_direction(&self) -> Result<LightDirection> {
        LightDirection::new(Vec3::from_array(self.light))
    }

    /// Reject configurations that would generate out-of-contract particles.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ShadowError::InvalidConfig(msg));
        let scene = &self.scene;
        if self.grid.is_empty() {
            return invalid(format!("lane grid {} has no lanes", self.grid));
        }
        if u32::try_from(self.grid.len()).is_err() {
            return invalid(format!("lane grid {} exceeds u32 lanes", self.grid));
        }
        if scene.extent.iter().any(|e| !e.is_finite() || *e < 0.0) {
            return invalid(format!("scene extent {:?} must be finite and >= 0", scene.extent));
        }
        if !(scene.radius_min > 0.0 && scene.radius_min <= scene.radius_max) {
            return invalid(format!(
                "radius range [{}, {}) must satisfy 0 < min <= max",
                scene.radius_min, scene.radius_max
            ));
        }
        if !(0.0 <= scene.opacity_min
            && scene.opacity_min <= scene.opacity_max
            && scene.opacity_max <= 1.0)
        {
            return invalid(format!(
                "opacity range [{}, {}) must lie within [0, 1]",
                scene.opacity_min, scene.opacity_max
            ));
        }
        if !(self.parity_tolerance > 0.0 && self.parity_tolerance.is_finite()) {
            return invalid(format!(
                "parity tolerance {} must be positive",
                self.parity_tolerance
            ));
        }
        self.light_direction().map(|_| ())
    }
}
