// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! The binding registry.
//!
//! [`Bridge::init`] is the explicit initialization routine: it validates the
//! configuration, resolves the default device and builds the dispatch table
//! and handle tracker. Every [`HostTensor`] keeps a reference to the bridge
//! that created it, so there is no global registry.
//!
//! ## Example
//!
//! ```rust
//! use tensor_bridge::{Bridge, BridgeConfig, ShapeDescriptor, TypeDescriptor};
//!
//! let bridge = Bridge::init(BridgeConfig::new().with_cpu())?;
//!
//! let t = bridge.from_slice(&[1f32, 2., 3., 4., 5., 6.], &ShapeDescriptor::from([2, 3]))?;
//! let z = bridge.zeros(&ShapeDescriptor::from([2, 3]), TypeDescriptor::Float32)?;
//! let sum = t.add(&z)?;
//! assert_eq!(sum.to_vec::<f32>()?, vec![1., 2., 3., 4., 5., 6.]);
//! assert_eq!(bridge.stats().live_handles, 3);
//! # Ok::<(), tensor_bridge::BridgeError>(())
//! ```

use std::sync::Arc;

use candle_core::{Device, Tensor};
use half::{bf16, f16};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::buffer;
use crate::device::{resolve_device, DeviceConfig, DeviceLocation};
use crate::dispatch::DispatchTable;
use crate::dtype::{host_tag_to_native, HostElement, TypeDescriptor};
use crate::error::{BridgeError, Result};
use crate::memory::{HandleStats, HandleTracker};
use crate::shape::ShapeDescriptor;
use crate::tensor::HostTensor;
use crate::traits::ValidatableConfig;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for [`Bridge::init`].
///
/// ## Environment Variables
///
/// Read by [`BridgeConfig::from_env`]:
///
/// - `TENSOR_BRIDGE_DEVICE`, `TENSOR_BRIDGE_FORCE_CPU` - see [`DeviceConfig`]
/// - `TENSOR_BRIDGE_MEMORY_LIMIT` - live-byte limit for native handles
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Default device for new tensors.
    pub device: DeviceConfig,
    /// Live-byte limit across all handles (0 = no limit).
    pub memory_limit: usize,
    /// Element type used by hosts that omit one.
    pub default_dtype: TypeDescriptor,
    /// Make floating-point tensors built by this bridge record gradients.
    pub track_gradients: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            memory_limit: 0,
            default_dtype: TypeDescriptor::Float32,
            track_gradients: false,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            device: DeviceConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("TENSOR_BRIDGE_MEMORY_LIMIT") {
            match val.trim().parse::<usize>() {
                Ok(limit) => config.memory_limit = limit,
                Err(e) => tracing::warn!("ignoring TENSOR_BRIDGE_MEMORY_LIMIT={val}: {e}"),
            }
        }

        config
    }

    /// Set the device configuration.
    #[must_use]
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Force CPU execution.
    #[must_use]
    pub fn with_cpu(mut self) -> Self {
        self.device = self.device.with_force_cpu(true);
        self
    }

    /// Set the live-byte limit (0 = no limit).
    #[must_use]
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the default element type.
    #[must_use]
    pub fn with_default_dtype(mut self, dtype: TypeDescriptor) -> Self {
        self.default_dtype = dtype;
        self
    }

    /// Record gradients for floating-point tensors built by the bridge.
    #[must_use]
    pub fn with_track_gradients(mut self, track: bool) -> Self {
        self.track_gradients = track;
        self
    }
}

impl ValidatableConfig for BridgeConfig {
    fn validate(&self) -> Result<()> {
        self.device.validate()?;
        if !self.default_dtype.is_engine_supported() {
            return Err(BridgeError::invalid_config(format!(
                "default dtype {} has no engine storage",
                self.default_dtype
            )));
        }
        Ok(())
    }
}

// =============================================================================
// BRIDGE
// =============================================================================

/// State shared by a bridge and every tensor it created.
pub(crate) struct BridgeContext {
    pub(crate) config: BridgeConfig,
    pub(crate) device: Device,
    pub(crate) tracker: HandleTracker,
    pub(crate) table: DispatchTable,
}

/// Ready-to-use binding registry.
///
/// Cheap to clone; clones share the tracker, device and dispatch table.
#[derive(Clone)]
pub struct Bridge {
    ctx: Arc<BridgeContext>,
}

impl Bridge {
    /// Validate `config`, resolve the default device and build the registry.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] for an invalid configuration.
    /// An unavailable device is not an error: the CPU is used instead.
    pub fn init(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let device = resolve_device(&config.device)?;
        let tracker = HandleTracker::with_limit(config.memory_limit);
        let table = DispatchTable::standard();

        tracing::info!(
            device = %DeviceLocation::of(&device),
            memory_limit = config.memory_limit,
            operations = table.len(),
            "tensor bridge initialized"
        );

        Ok(Self {
            ctx: Arc::new(BridgeContext {
                config,
                device,
                tracker,
                table,
            }),
        })
    }

    /// Default device for new tensors.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.ctx.device
    }

    /// Location of the default device.
    #[must_use]
    pub fn location(&self) -> DeviceLocation {
        DeviceLocation::of(&self.ctx.device)
    }

    /// The configuration this bridge was built from.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.ctx.config
    }

    /// `dtype`, or the configured default when the host omitted one.
    #[must_use]
    pub fn dtype_or_default(&self, dtype: Option<TypeDescriptor>) -> TypeDescriptor {
        dtype.unwrap_or(self.ctx.config.default_dtype)
    }

    /// Name to operation registry.
    #[must_use]
    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.ctx.table
    }

    /// Snapshot of handle accounting.
    #[must_use]
    pub fn stats(&self) -> HandleStats {
        self.ctx.tracker.stats()
    }

    /// Copy a host byte buffer into a tensor on the default device.
    ///
    /// # Errors
    ///
    /// See [`buffer::ingest`]; also [`BridgeError::Allocation`] past the memory limit.
    pub fn tensor(
        &self,
        bytes: &[u8],
        shape: &ShapeDescriptor,
        dtype: TypeDescriptor,
    ) -> Result<HostTensor> {
        self.tensor_on(bytes, shape, dtype, &self.ctx.device)
    }

    /// Copy a host byte buffer into a tensor on `device`.
    ///
    /// # Errors
    ///
    /// See [`Bridge::tensor`].
    pub fn tensor_on(
        &self,
        bytes: &[u8],
        shape: &ShapeDescriptor,
        dtype: TypeDescriptor,
        device: &Device,
    ) -> Result<HostTensor> {
        self.check_budget(shape, dtype)?;
        let tensor = buffer::ingest(bytes, shape, dtype, device)?;
        self.adopt(tensor)
    }

    /// Copy `shape.byte_size(dtype)` bytes at `ptr` into a tensor on the default device.
    ///
    /// # Errors
    ///
    /// See [`buffer::ingest_raw`].
    ///
    /// # Safety
    ///
    /// Same contract as [`buffer::ingest_raw`].
    pub unsafe fn tensor_from_raw(
        &self,
        ptr: *const u8,
        shape: &ShapeDescriptor,
        dtype: TypeDescriptor,
    ) -> Result<HostTensor> {
        self.check_budget(shape, dtype)?;
        // SAFETY: forwarded caller contract.
        let tensor = unsafe { buffer::ingest_raw(ptr, shape, dtype, &self.ctx.device) }?;
        self.adopt(tensor)
    }

    /// Copy a typed slice into a tensor on the default device.
    ///
    /// # Errors
    ///
    /// See [`Bridge::tensor`].
    pub fn from_slice<T: HostElement>(
        &self,
        data: &[T],
        shape: &ShapeDescriptor,
    ) -> Result<HostTensor> {
        self.tensor(bytemuck::cast_slice(data), shape, T::TYPE)
    }

    /// Rank-0 tensor holding `value`.
    ///
    /// # Errors
    ///
    /// See [`Bridge::tensor`].
    pub fn scalar<T: HostElement>(&self, value: T) -> Result<HostTensor> {
        self.from_slice(&[value], &ShapeDescriptor::scalar())
    }

    /// Zero-filled tensor on the default device.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnsupportedType`] if the engine cannot store `dtype`
    /// - [`BridgeError::ShapeOverflow`] for an unaddressable shape
    /// - [`BridgeError::Allocation`] if the engine or the memory limit refuses
    pub fn zeros(&self, shape: &ShapeDescriptor, dtype: TypeDescriptor) -> Result<HostTensor> {
        let native = host_tag_to_native(dtype)?;
        self.check_budget(shape, dtype)?;
        let tensor = Tensor::zeros(shape.dims(), native, &self.ctx.device).map_err(|e| {
            BridgeError::allocation(format!("zeros {shape} {dtype}: {e}"))
        })?;
        self.adopt(tensor)
    }

    /// Random tensor on the default device.
    ///
    /// Floating-point types are uniform in `[0, 1)`; integer types are uniform over
    /// their whole range. The same `seed` always produces the same values; `None`
    /// draws a fresh seed.
    ///
    /// # Errors
    ///
    /// Same as [`Bridge::zeros`].
    pub fn rand(
        &self,
        shape: &ShapeDescriptor,
        dtype: TypeDescriptor,
        seed: Option<u64>,
    ) -> Result<HostTensor> {
        host_tag_to_native(dtype)?;
        self.check_budget(shape, dtype)?;

        let seed = seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let n = shape.numel()?;
        tracing::debug!(%shape, %dtype, seed, "generating random tensor");

        let device = &self.ctx.device;
        let tensor = match dtype {
            TypeDescriptor::Float32 => {
                buffer::ingest_slice(&fill(n, || rng.random::<f32>()), shape, device)
            }
            TypeDescriptor::Float64 => {
                buffer::ingest_slice(&fill(n, || rng.random::<f64>()), shape, device)
            }
            // Multiples of 2^-10 and 2^-7 are exact in f16 and bf16, so rounding
            // never produces 1.0.
            TypeDescriptor::Float16 => buffer::ingest_slice(
                &fill(n, || f16::from_f32(f32::from(rng.random_range(0u16..1024)) / 1024.0)),
                shape,
                device,
            ),
            TypeDescriptor::BFloat16 => buffer::ingest_slice(
                &fill(n, || bf16::from_f32(f32::from(rng.random_range(0u8..128)) / 128.0)),
                shape,
                device,
            ),
            TypeDescriptor::UInt8 => {
                buffer::ingest_slice(&fill(n, || rng.random::<u8>()), shape, device)
            }
            TypeDescriptor::UInt32 => {
                buffer::ingest_slice(&fill(n, || rng.random::<u32>()), shape, device)
            }
            TypeDescriptor::Int16 => {
                buffer::ingest_slice(&fill(n, || rng.random::<i16>()), shape, device)
            }
            TypeDescriptor::Int32 => {
                buffer::ingest_slice(&fill(n, || rng.random::<i32>()), shape, device)
            }
            TypeDescriptor::Int64 => {
                buffer::ingest_slice(&fill(n, || rng.random::<i64>()), shape, device)
            }
            other => Err(BridgeError::unsupported_type(other.name())),
        }?;
        self.adopt(tensor)
    }

    /// Take ownership of an engine tensor.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Allocation`] past the memory limit.
    pub fn adopt(&self, tensor: Tensor) -> Result<HostTensor> {
        let tensor = if self.ctx.config.track_gradients && tensor.dtype().is_float() {
            crate::grad::track(&tensor)?
        } else {
            tensor
        };
        HostTensor::wrap(&self.ctx, tensor)
    }

    /// Refuse early when a new handle could never fit under the limit.
    fn check_budget(&self, shape: &ShapeDescriptor, dtype: TypeDescriptor) -> Result<()> {
        let bytes = shape.byte_size(dtype)?;
        if self.ctx.tracker.would_fit(bytes) {
            Ok(())
        } else {
            Err(BridgeError::allocation(format!(
                "{bytes} bytes for {shape} {dtype} exceed the memory limit of {} bytes",
                self.ctx.config.memory_limit
            )))
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("device", &self.location())
            .field("config", &self.ctx.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn fill<T>(n: usize, f: impl FnMut() -> T) -> Vec<T> {
    std::iter::repeat_with(f).take(n).collect()
}

// =============================================================================
// TESTS
// =============================================================================
