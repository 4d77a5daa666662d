// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Host type tags and their mapping to engine dtypes.
//!
//! ## Why This Module Exists
//!
//! Hosts describe element types with their own tag enumeration; the engine uses
//! `candle_core::DType`. This module owns the closed host enumeration
//! ([`TypeDescriptor`]) and the two mapping functions between it and the engine:
//!
//! 1. [`host_tag_to_native`]: host tag -> engine dtype
//! 2. [`native_token_to_host_tag`]: engine dtype -> host tag
//!
//! ## Design Decisions
//!
//! - **Closed enum, exhaustive matches**: adding a tag forces every mapping to be
//!   revisited at compile time.
//! - **Unsupported is an error, never a coercion**: candle has no storage for
//!   `BOOL`, `INT8`, `UINT16` or `UINT64`, and several candle dtypes (the F8/F6/F4
//!   formats) have no host tag. Both directions fail with
//!   [`BridgeError::UnsupportedType`].

use std::fmt;
use std::str::FromStr;

use candle_core::DType;
use half::{bf16, f16};

use crate::error::{BridgeError, Result};

/// Element type tag as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Boolean.
    Bool,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE half precision.
    Float16,
    /// Brain floating point.
    BFloat16,
    /// IEEE single precision.
    Float32,
    /// IEEE double precision.
    Float64,
}

impl TypeDescriptor {
    /// Every host tag, in declaration order.
    pub const ALL: [TypeDescriptor; 13] = [
        Self::Bool,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float16,
        Self::BFloat16,
        Self::Float32,
        Self::Float64,
    ];

    /// Canonical upper-case name, as exposed to hosts.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::UInt8 => "UINT8",
            Self::UInt16 => "UINT16",
            Self::UInt32 => "UINT32",
            Self::UInt64 => "UINT64",
            Self::Float16 => "FLOAT16",
            Self::BFloat16 => "BFLOAT16",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
        }
    }

    /// Size in bytes of one element.
    #[must_use]
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// `true` for FLOAT16, BFLOAT16, FLOAT32 and FLOAT64.
    #[must_use]
    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64
        )
    }

    /// `true` for the signed and unsigned integer tags.
    #[must_use]
    pub fn is_integer(self) -> bool {
        !self.is_floating_point() && self != Self::Bool
    }

    /// `true` when the engine has storage for this tag.
    #[must_use]
    pub fn is_engine_supported(self) -> bool {
        host_tag_to_native(self).is_ok()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TypeDescriptor {
    type Err = BridgeError;

    /// Accepts canonical names, the legacy binding's names (`S_INT_32`, `FLOAT`,
    /// `DOUBLE`, `HALF`, ...), NumPy names (`float32`) and short names (`f32`).
    fn from_str(s: &str) -> Result<Self> {
        let tag = match s.to_ascii_lowercase().as_str() {
            "bool" => Self::Bool,
            "int8" | "s_int_8" | "i8" => Self::Int8,
            "int16" | "s_int_16" | "i16" => Self::Int16,
            "int32" | "s_int_32" | "i32" | "int" => Self::Int32,
            "int64" | "s_int_64" | "i64" | "long" => Self::Int64,
            "uint8" | "u_int_8" | "u8" => Self::UInt8,
            "uint16" | "u_int_16" | "u16" => Self::UInt16,
            "uint32" | "u_int_32" | "u32" => Self::UInt32,
            "uint64" | "u_int_64" | "u64" => Self::UInt64,
            "float16" | "half" | "f16" => Self::Float16,
            "bfloat16" | "bf16" => Self::BFloat16,
            "float32" | "float" | "f32" => Self::Float32,
            "float64" | "double" | "f64" => Self::Float64,
            _ => return Err(BridgeError::unsupported_type(s)),
        };
        Ok(tag)
    }
}

/// Map a host tag to the engine dtype that stores it.
///
/// # Errors
///
/// Returns [`BridgeError::UnsupportedType`] for tags the engine cannot store
/// (`BOOL`, `INT8`, `UINT16`, `UINT64`).
pub fn host_tag_to_native(tag: TypeDescriptor) -> Result<DType> {
    match tag {
        TypeDescriptor::Int16 => Ok(DType::I16),
        TypeDescriptor::Int32 => Ok(DType::I32),
        TypeDescriptor::Int64 => Ok(DType::I64),
        TypeDescriptor::UInt8 => Ok(DType::U8),
        TypeDescriptor::UInt32 => Ok(DType::U32),
        TypeDescriptor::Float16 => Ok(DType::F16),
        TypeDescriptor::BFloat16 => Ok(DType::BF16),
        TypeDescriptor::Float32 => Ok(DType::F32),
        TypeDescriptor::Float64 => Ok(DType::F64),
        TypeDescriptor::Bool
        | TypeDescriptor::Int8
        | TypeDescriptor::UInt16
        | TypeDescriptor::UInt64 => Err(BridgeError::unsupported_type(format!(
            "{tag} has no engine storage"
        ))),
    }
}

/// Map an engine dtype back to its host tag.
///
/// # Errors
///
/// Returns [`BridgeError::UnsupportedType`] for engine dtypes with no host tag
/// (the F8/F6/F4 micro-float formats).
pub fn native_token_to_host_tag(dtype: DType) -> Result<TypeDescriptor> {
    match dtype {
        DType::I16 => Ok(TypeDescriptor::Int16),
        DType::I32 => Ok(TypeDescriptor::Int32),
        DType::I64 => Ok(TypeDescriptor::Int64),
        DType::U8 => Ok(TypeDescriptor::UInt8),
        DType::U32 => Ok(TypeDescriptor::UInt32),
        DType::F16 => Ok(TypeDescriptor::Float16),
        DType::BF16 => Ok(TypeDescriptor::BFloat16),
        DType::F32 => Ok(TypeDescriptor::Float32),
        DType::F64 => Ok(TypeDescriptor::Float64),
        other => Err(BridgeError::unsupported_type(format!(
            "engine dtype {other:?} has no host tag"
        ))),
    }
}

/// Tags the engine can store, in declaration order.
#[must_use]
pub fn supported_types() -> Vec<TypeDescriptor> {
    TypeDescriptor::ALL
        .into_iter()
        .filter(|t| t.is_engine_supported())
        .collect()
}

mod sealed {
    pub trait Sealed {}
}

/// Rust element types that can cross the boundary as raw bytes.
///
/// Implemented for every plain-old-data numeric type with a host tag. `bool` is
/// excluded because not every byte is a valid `bool`.
pub trait HostElement: bytemuck::Pod + sealed::Sealed {
    /// Host tag describing this element type.
    const TYPE: TypeDescriptor;
}

macro_rules! host_element {
    ($($ty:ty => $tag:ident),+ $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl HostElement for $ty {
                const TYPE: TypeDescriptor = TypeDescriptor::$tag;
            }
        )+
    };
}

host_element! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f16 => Float16,
    bf16 => BFloat16,
    f32 => Float32,
    f64 => Float64,
}
