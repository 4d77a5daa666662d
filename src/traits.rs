// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Common traits shared across the binding layer.
//!
//! - [`ValidatableConfig`] - Configuration validation interface, called by
//!   [`Bridge::init`](crate::Bridge::init) before any device is opened.

use crate::error::Result;

/// Configuration validation trait.
///
/// All configuration structs implement this trait so invalid settings fail
/// at initialization instead of at the first tensor construction.
///
/// # Example
///
/// ```rust
/// use tensor_bridge::{BridgeError, Result, ValidatableConfig};
///
/// #[derive(Clone)]
/// struct PoolConfig {
///     max_handles: usize,
/// }
///
/// impl ValidatableConfig for PoolConfig {
///     fn validate(&self) -> Result<()> {
///         if self.max_handles == 0 {
///             return Err(BridgeError::invalid_config("max_handles must be > 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ValidatableConfig: Clone + Send + Sync {
    /// Validate the configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidConfig` if validation fails.
    fn validate(&self) -> Result<()>;
}
