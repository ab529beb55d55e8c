// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for device acquisition, kernel loading, dispatch, and verification.
//!
//! Every GPU creation step maps to its own variant so the run driver can
//! report the first failing stage instead of parsing opaque strings.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ShadowError>;

/// Errors arising from configuration, GPU setup, dispatch, or readback.
#[derive(Debug, Error)]
pub enum ShadowError {
    /// No compatible GPU adapter was found by wgpu.
    #[error("No GPU adapter found")]
    NoAdapter,

    /// GPU device creation failed (wraps the underlying wgpu error message).
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// WGSL module or compute pipeline creation failed.
    #[error("Failed to load compute kernel: {0}")]
    KernelLoad(String),

    /// Storage, uniform, staging, or query buffer creation failed.
    #[error("Failed to create buffer '{label}': {message}")]
    BufferCreation { label: String, message: String },

    /// Bind group (read view, write view, uniform block) creation failed.
    #[error("Failed to create buffer views: {0}")]
    ViewCreation(String),

    /// Encoding or submitting the compute pass failed.
    #[error("Dispatch submission failed: {0}")]
    DispatchSubmission(String),

    /// The device was lost or never signalled completion.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Mapping a staging buffer back to host memory failed.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Rejected run configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two shadow results of different length were handed to the verifier.
    #[error("Result length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShadowError {
    /// Process exit code for the run driver. Device failures abort with 2 and
    /// configuration or file errors with 3, leaving 1 for a completed run that
    /// failed verification.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::Io(_) | Self::Json(_) => 3,
            _ => 2,
        }
    }
}
