// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for the tensor binding layer.
//!
//! Every operation exposed to a host returns [`Result`], and every failure carries a
//! distinct [`ErrorKind`] so callers can branch on it programmatically rather than
//! parsing messages.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BridgeError
//! ├── UnsupportedType     - Type tag with no counterpart on the other side
//! ├── ShapeOverflow       - Shape exceeds the addressable size
//! ├── ShapeMismatch       - Buffer length disagrees with shape * element size
//! ├── InvalidSlice        - Zero slice step
//! ├── IndexOutOfRange     - Bare index (or axis) outside its extent
//! ├── Allocation          - Native construction failed
//! ├── UseAfterRelease     - Operation on a released wrapper
//! ├── EngineOperation     - The tensor engine rejected an operation
//! ├── DeviceNotAvailable  - Requested device cannot be opened
//! ├── InvalidConfig       - Configuration validation failures
//! ├── UnknownOperation    - Name missing from the dispatch table
//! └── InvalidArgument     - Dispatch call with the wrong argument form
//! ```

use thiserror::Error;

/// Result type alias for tensor-bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Discriminant of a [`BridgeError`], cheap to copy and compare.
///
/// Hosts use this to pick the exception class they raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`BridgeError::UnsupportedType`].
    UnsupportedType,
    /// See [`BridgeError::ShapeOverflow`].
    ShapeOverflow,
    /// See [`BridgeError::ShapeMismatch`].
    ShapeMismatch,
    /// See [`BridgeError::InvalidSlice`].
    InvalidSlice,
    /// See [`BridgeError::IndexOutOfRange`].
    IndexOutOfRange,
    /// See [`BridgeError::Allocation`].
    Allocation,
    /// See [`BridgeError::UseAfterRelease`].
    UseAfterRelease,
    /// See [`BridgeError::EngineOperation`].
    EngineOperation,
    /// See [`BridgeError::DeviceNotAvailable`].
    DeviceNotAvailable,
    /// See [`BridgeError::InvalidConfig`].
    InvalidConfig,
    /// See [`BridgeError::UnknownOperation`].
    UnknownOperation,
    /// See [`BridgeError::InvalidArgument`].
    InvalidArgument,
}

/// Errors raised at the host/engine boundary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    /// A type has no mapping on the other side of the boundary.
    ///
    /// Raised both for engine dtypes the host cannot represent and for host tags
    /// the engine cannot store.
    #[error("unsupported type: {name}")]
    UnsupportedType {
        /// Name of the offending type.
        name: String,
    },

    /// The element count or byte size of a shape does not fit in `isize`.
    #[error("shape {shape:?} overflows the addressable range")]
    ShapeOverflow {
        /// The requested shape.
        shape: Vec<usize>,
    },

    /// A host buffer does not hold exactly `numel * element_size` bytes.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    ShapeMismatch {
        /// Byte length implied by the shape and element type.
        expected: usize,
        /// Byte length actually supplied.
        actual: usize,
    },

    /// A slice was requested with step zero.
    #[error("invalid slice on axis {axis}: step cannot be zero")]
    InvalidSlice {
        /// Axis carrying the zero step.
        axis: usize,
    },

    /// A bare index lies outside `[-extent, extent)`, or too many axes were indexed.
    #[error("index {index} is out of range for axis {axis} with extent {extent}")]
    IndexOutOfRange {
        /// Raw index as supplied by the host.
        index: isize,
        /// Axis being indexed.
        axis: usize,
        /// Extent of that axis (0 when the axis does not exist).
        extent: usize,
    },

    /// The engine (or the handle tracker) refused to construct a tensor.
    #[error("allocation failed: {message}")]
    Allocation {
        /// Descriptive error message.
        message: String,
    },

    /// An operation was invoked on a wrapper whose handle was already released.
    #[error("`{operation}` called on a released tensor")]
    UseAfterRelease {
        /// Name of the rejected operation.
        operation: String,
    },

    /// The engine failed an operation for an engine-internal reason.
    #[error("engine operation `{operation}` failed: {source}")]
    EngineOperation {
        /// Name of the failed operation.
        operation: String,
        /// The engine's own diagnostic.
        #[source]
        source: candle_core::Error,
    },

    /// A device location could not be opened by the engine.
    #[error("device not available: {device}")]
    DeviceNotAvailable {
        /// Description of the unavailable device.
        device: String,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dispatch table has no entry under this name.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// Name looked up by the host.
        name: String,
    },

    /// A dispatch entry was called with arguments of the wrong form.
    #[error("invalid argument for `{operation}`: expected {expected}")]
    InvalidArgument {
        /// Name of the operation.
        operation: String,
        /// Description of the expected argument form.
        expected: String,
    },
}

impl BridgeError {
    /// Create an unsupported type error.
    pub fn unsupported_type(name: impl Into<String>) -> Self {
        Self::UnsupportedType { name: name.into() }
    }

    /// Create a shape overflow error.
    pub fn shape_overflow(shape: impl Into<Vec<usize>>) -> Self {
        Self::ShapeOverflow {
            shape: shape.into(),
        }
    }

    /// Create an allocation error.
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation {
            message: msg.into(),
        }
    }

    /// Create a use-after-release error.
    pub fn use_after_release(operation: impl Into<String>) -> Self {
        Self::UseAfterRelease {
            operation: operation.into(),
        }
    }

    /// Wrap an engine error raised while running `operation`.
    pub fn engine(operation: impl Into<String>, source: candle_core::Error) -> Self {
        Self::EngineOperation {
            operation: operation.into(),
            source,
        }
    }

    /// Create a device not available error.
    pub fn device_not_available(device: impl Into<String>) -> Self {
        Self::DeviceNotAvailable {
            device: device.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(operation: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            expected: expected.into(),
        }
    }

    /// The kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Self::ShapeOverflow { .. } => ErrorKind::ShapeOverflow,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::InvalidSlice { .. } => ErrorKind::InvalidSlice,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::UseAfterRelease { .. } => ErrorKind::UseAfterRelease,
            Self::EngineOperation { .. } => ErrorKind::EngineOperation,
            Self::DeviceNotAvailable { .. } => ErrorKind::DeviceNotAvailable,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }
}

/// Extension for attaching an operation name to engine results.
pub(crate) trait EngineResultExt<T> {
    /// Map an engine error into [`BridgeError::EngineOperation`].
    fn engine_op(self, operation: &str) -> Result<T>;
}

impl<T> EngineResultExt<T> for candle_core::Result<T> {
    fn engine_op(self, operation: &str) -> Result<T> {
        self.map_err(|e| BridgeError::engine(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::unsupported_type("F8E4M3");
        assert_eq!(err.to_string(), "unsupported type: F8E4M3");

        let err = BridgeError::IndexOutOfRange {
            index: 5,
            axis: 0,
            extent: 5,
        };
        assert!(err.to_string().contains("index 5"));

        let err = BridgeError::use_after_release("sin");
        assert!(err.to_string().contains("`sin`"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            BridgeError::InvalidSlice { axis: 0 }.kind(),
            ErrorKind::InvalidSlice
        );
        assert_eq!(
            BridgeError::shape_overflow(vec![usize::MAX, 2]).kind(),
            ErrorKind::ShapeOverflow
        );
        assert_eq!(
            BridgeError::allocation("limit").kind(),
            ErrorKind::Allocation
        );
    }

    #[test]
    fn test_engine_error_keeps_diagnostic() {
        let source = candle_core::Error::Msg("kernel exploded".to_string());
        let err = BridgeError::engine("matmul", source);
        assert_eq!(err.kind(), ErrorKind::EngineOperation);
        assert!(err.to_string().contains("matmul"));
        assert!(err.to_string().contains("kernel exploded"));
    }
}
