// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Device locations and default-device selection.
//!
//! A [`DeviceLocation`] is the `(kind, index)` pair attached to every native
//! tensor. `Cpu:0` is the only host-resident location: it is the only place a
//! host can read tensor memory without a transfer.
//!
//! ## Environment Variables
//!
//! - `TENSOR_BRIDGE_DEVICE` - Default device: `cpu`, `cuda:N` or `metal:N`
//! - `TENSOR_BRIDGE_FORCE_CPU` - Set to `1` or `true` to force CPU execution
//!
//! ## Example
//!
//! ```rust
//! use tensor_bridge::{resolve_device, DeviceConfig, DeviceLocation};
//!
//! // Default: host-resident CPU device
//! let device = resolve_device(&DeviceConfig::default())?;
//! assert!(device.is_cpu());
//!
//! // Ask for a GPU; falls back to CPU with a warning when unavailable
//! let config = DeviceConfig::new().with_location(DeviceLocation::cuda(0));
//! let device = resolve_device(&config)?;
//! # Ok::<(), tensor_bridge::BridgeError>(())
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Once;

use candle_core::Device;

use crate::error::{BridgeError, Result};
use crate::traits::ValidatableConfig;

/// Kind of device a tensor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Host memory.
    Cpu,
    /// NVIDIA GPU.
    Cuda,
    /// Apple GPU.
    Metal,
}

/// `(kind, index)` pair identifying a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLocation {
    /// Device kind.
    pub kind: DeviceKind,
    /// Device ordinal within its kind.
    pub index: usize,
}

impl DeviceLocation {
    /// The host-resident device, `Cpu:0`.
    pub const HOST: DeviceLocation = DeviceLocation {
        kind: DeviceKind::Cpu,
        index: 0,
    };

    /// CUDA device `index`.
    #[must_use]
    pub const fn cuda(index: usize) -> Self {
        Self {
            kind: DeviceKind::Cuda,
            index,
        }
    }

    /// Metal device `index`.
    #[must_use]
    pub const fn metal(index: usize) -> Self {
        Self {
            kind: DeviceKind::Metal,
            index,
        }
    }

    /// `true` only for `Cpu:0`.
    #[must_use]
    pub fn is_host_resident(&self) -> bool {
        *self == Self::HOST
    }

    /// Location of an engine device.
    #[must_use]
    pub fn of(device: &Device) -> Self {
        match device.location() {
            candle_core::DeviceLocation::Cpu => Self::HOST,
            candle_core::DeviceLocation::Cuda { gpu_id } => Self::cuda(gpu_id),
            candle_core::DeviceLocation::Metal { gpu_id } => Self::metal(gpu_id),
        }
    }

    /// Open the engine device at this location.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DeviceNotAvailable`] if the engine cannot open it
    /// (missing feature, missing hardware, bad ordinal).
    pub fn open(&self) -> Result<Device> {
        let opened = match self.kind {
            DeviceKind::Cpu if self.index == 0 => return Ok(Device::Cpu),
            DeviceKind::Cpu => {
                return Err(BridgeError::device_not_available(self.to_string()));
            }
            DeviceKind::Cuda => Device::new_cuda(self.index),
            DeviceKind::Metal => Device::new_metal(self.index),
        };
        opened.map_err(|e| BridgeError::device_not_available(format!("{self}: {e}")))
    }
}

impl Default for DeviceLocation {
    fn default() -> Self {
        Self::HOST
    }
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Metal => "metal",
        };
        write!(f, "{kind}:{}", self.index)
    }
}

impl FromStr for DeviceLocation {
    type Err = BridgeError;

    /// Parses `cpu`, `cuda`, `cuda:1`, `metal:0`, ...
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, index) = match lower.split_once(':') {
            Some((kind, index)) => {
                let index = index.parse::<usize>().map_err(|_| {
                    BridgeError::invalid_config(format!("invalid device ordinal in `{s}`"))
                })?;
                (kind.to_string(), index)
            }
            None => (lower, 0),
        };
        let kind = match kind.as_str() {
            "cpu" => DeviceKind::Cpu,
            "cuda" | "gpu" => DeviceKind::Cuda,
            "metal" | "mps" => DeviceKind::Metal,
            _ => {
                return Err(BridgeError::invalid_config(format!(
                    "unknown device `{s}`. Use: cpu, cuda:N, metal:N"
                )))
            }
        };
        Ok(Self { kind, index })
    }
}

/// Configuration for default-device selection.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Preferred device for newly constructed tensors.
    pub location: DeviceLocation,
    /// Force CPU execution regardless of `location`.
    pub force_cpu: bool,
}

impl DeviceConfig {
    /// Create a new device configuration with defaults (`Cpu:0`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred device.
    #[must_use]
    pub fn with_location(mut self, location: DeviceLocation) -> Self {
        self.location = location;
        self
    }

    /// Force CPU execution.
    #[must_use]
    pub fn with_force_cpu(mut self, force: bool) -> Self {
        self.force_cpu = force;
        self
    }

    /// Build configuration from environment variables.
    ///
    /// Unparseable values are ignored with a warning and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TENSOR_BRIDGE_FORCE_CPU") {
            config.force_cpu = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Ok(val) = std::env::var("TENSOR_BRIDGE_DEVICE") {
            match val.parse::<DeviceLocation>() {
                Ok(location) => config.location = location,
                Err(e) => tracing::warn!("ignoring TENSOR_BRIDGE_DEVICE: {e}"),
            }
        }

        config
    }
}

impl ValidatableConfig for DeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.location.kind == DeviceKind::Cpu && self.location.index != 0 {
            return Err(BridgeError::invalid_config(format!(
                "only cpu:0 exists, got {}",
                self.location
            )));
        }
        Ok(())
    }
}

/// Resolve the configured default device.
///
/// 1. If `force_cpu` is set, returns the CPU device
/// 2. Otherwise opens the configured location
/// 3. Falls back to CPU with a one-time warning if that location cannot be opened
///
/// # Errors
///
/// Returns [`BridgeError::InvalidConfig`] if the configuration is invalid.
pub fn resolve_device(config: &DeviceConfig) -> Result<Device> {
    config.validate()?;

    if config.force_cpu {
        tracing::debug!("CPU device forced via configuration");
        return Ok(Device::Cpu);
    }

    match config.location.open() {
        Ok(device) => {
            tracing::info!(device = %config.location, "using device for new tensors");
            Ok(device)
        }
        Err(e) => {
            warn_fallback_once(&config.location, &e);
            Ok(Device::Cpu)
        }
    }
}

/// Emit the CPU-fallback warning at most once per process.
fn warn_fallback_once(requested: &DeviceLocation, reason: &BridgeError) {
    static WARN_ONCE: Once = Once::new();

    WARN_ONCE.call_once(|| {
        tracing::warn!(
            "{requested} requested but unavailable ({reason}); \
             falling back to the host CPU device"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_default() {
        let config = DeviceConfig::default();
        assert_eq!(config.location, DeviceLocation::HOST);
        assert!(!config.force_cpu);
    }

    #[test]
    fn test_device_config_builder() {
        let config = DeviceConfig::new()
            .with_location(DeviceLocation::cuda(1))
            .with_force_cpu(true);

        assert_eq!(config.location, DeviceLocation::cuda(1));
        assert!(config.force_cpu);
    }

    #[test]
    fn test_force_cpu_returns_cpu() {
        let config = DeviceConfig::new()
            .with_location(DeviceLocation::cuda(0))
            .with_force_cpu(true);
        let device = resolve_device(&config).unwrap();
        assert!(device.is_cpu());
    }

    #[test]
    fn test_parse_locations() {
        assert_eq!("cpu".parse::<DeviceLocation>().unwrap(), DeviceLocation::HOST);
        assert_eq!(
            "CUDA:2".parse::<DeviceLocation>().unwrap(),
            DeviceLocation::cuda(2)
        );
        assert_eq!(
            "metal".parse::<DeviceLocation>().unwrap(),
            DeviceLocation::metal(0)
        );
        assert!("tpu:0".parse::<DeviceLocation>().is_err());
        assert!("cuda:x".parse::<DeviceLocation>().is_err());
    }

    #[test]
    fn test_host_residency() {
        assert!(DeviceLocation::HOST.is_host_resident());
        assert!(!DeviceLocation::cuda(0).is_host_resident());
        assert_eq!(DeviceLocation::of(&Device::Cpu), DeviceLocation::HOST);
        assert_eq!(DeviceLocation::cuda(3).to_string(), "cuda:3");
    }

    #[test]
    fn test_invalid_cpu_ordinal() {
        let config = DeviceConfig::new().with_location(DeviceLocation {
            kind: DeviceKind::Cpu,
            index: 1,
        });
        assert!(config.validate().is_err());
        assert!(resolve_device(&config).is_err());
    }
}
