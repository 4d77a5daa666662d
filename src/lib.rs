// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! # tensor-bridge
//!
//! Binding layer that exposes candle tensors to host environments: a Rust API
//! for embedding applications and, behind the `python` feature, a Python
//! extension module.
//!
//! ## Design Philosophy
//!
//! **Marshalling, not computing**: kernels, broadcasting, device execution and
//! autodiff belong to candle. This crate owns what sits between the host and the
//! engine: type mapping, buffer ownership, slice translation and dispatch by name.
//!
//! ## Modules
//!
//! - [`dtype`] - Host type tags and their mapping to engine dtypes
//! - [`buffer`] - Copy-in ingest and view-or-copy export of host buffers
//! - [`shape`], [`slice`] - Shapes and host index/slice translation
//! - [`tensor`], [`memory`] - Handle ownership and accounting
//! - [`dispatch`], [`ops`] - Name-based dispatch onto engine operations
//! - [`bridge`] - Explicit initialization and tensor factories
//! - [`device`] - Device locations with environment variable overrides
//! - [`error`] - Error kinds raised across the boundary
//!
//! ## Quick Start
//!
//! ```rust
//! use tensor_bridge::{AxisSelector, Bridge, BridgeConfig, ShapeDescriptor, TypeDescriptor};
//!
//! fn main() -> tensor_bridge::Result<()> {
//!     let bridge = Bridge::init(BridgeConfig::from_env())?;
//!
//!     let t = bridge.from_slice(&[1f32, 2., 3., 4., 5., 6.], &ShapeDescriptor::from([2, 3]))?;
//!     let row = t.index(&[AxisSelector::index(-1)])?;
//!     assert_eq!(row.to_vec::<f32>()?, vec![4., 5., 6.]);
//!
//!     let ints = t.cast(TypeDescriptor::Int32)?;
//!     println!("{ints}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `cuda` - CUDA-resident tensors through candle
//! - `metal` - Metal-resident tensors through candle
//! - `python` - `PyO3` extension module with `NumPy` interop

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod buffer;
pub mod device;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod format;
pub mod grad;
pub mod logging;
pub mod memory;
pub mod ops;
pub mod shape;
pub mod slice;
pub mod tensor;
pub mod traits;

#[cfg(feature = "python")]
pub mod python;

// Re-exports for convenience
pub use bridge::{Bridge, BridgeConfig};
pub use buffer::{
    export, export_owned, ingest, ingest_raw, ingest_slice, Exported, HostView, OwnedBuffer,
};
pub use device::{resolve_device, DeviceConfig, DeviceKind, DeviceLocation};
pub use dispatch::{CallArgs, CallResult, DispatchTable, Operation};
pub use dtype::{
    host_tag_to_native, native_token_to_host_tag, supported_types, HostElement, TypeDescriptor,
};
pub use error::{BridgeError, ErrorKind, Result};
pub use format::format_buffer;
pub use grad::Gradients;
pub use logging::{init_logging, log_handle_stats, LogConfig, LogLevel};
pub use memory::{HandleStats, HandleTracker};
pub use ops::{BinaryOp, CompareOp, UnaryOp};
pub use shape::ShapeDescriptor;
pub use slice::{
    normalize_index, translate_compound, translate_slice, AxisSelector, AxisSlice, SliceArg,
    SliceRange, SliceSpec,
};
pub use tensor::{condition, HandleState, HostTensor};
pub use traits::ValidatableConfig;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
