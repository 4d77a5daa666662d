// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Shape descriptors with overflow-checked size arithmetic.

use std::fmt;

use crate::dtype::TypeDescriptor;
use crate::error::{BridgeError, Result};

/// Ordered sequence of dimension extents.
///
/// The rank is fixed for the lifetime of a tensor; reshaping produces a new
/// tensor rather than mutating this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShapeDescriptor {
    dims: Vec<usize>,
}

impl ShapeDescriptor {
    /// Create a shape from its extents.
    #[must_use]
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    /// The rank-0 shape of a scalar.
    #[must_use]
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Extents, outermost first.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Extent of `axis`, if it exists.
    #[must_use]
    pub fn extent(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Host `len()` semantics: the outermost extent, or 1 for a scalar.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }

    /// `true` when the shape holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dims.contains(&0)
    }

    /// Total element count.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ShapeOverflow`] if the product exceeds `isize::MAX`.
    pub fn numel(&self) -> Result<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .filter(|&n| isize::try_from(n).is_ok())
            .ok_or_else(|| BridgeError::shape_overflow(self.dims.clone()))
    }

    /// Bytes needed to store this shape densely with element type `dtype`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ShapeOverflow`] if the byte count exceeds `isize::MAX`.
    pub fn byte_size(&self, dtype: TypeDescriptor) -> Result<usize> {
        self.numel()?
            .checked_mul(dtype.size_in_bytes())
            .filter(|&n| isize::try_from(n).is_ok())
            .ok_or_else(|| BridgeError::shape_overflow(self.dims.clone()))
    }
}

impl From<Vec<usize>> for ShapeDescriptor {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for ShapeDescriptor {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for ShapeDescriptor {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims)
    }
}

impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel_and_bytes() {
        let shape = ShapeDescriptor::from([2, 3]);
        assert_eq!(shape.rank(), 2);
        assert_eq!(shape.numel().unwrap(), 6);
        assert_eq!(shape.byte_size(TypeDescriptor::Float32).unwrap(), 24);
        assert_eq!(shape.byte_size(TypeDescriptor::Float64).unwrap(), 48);
    }

    #[test]
    fn test_scalar_and_empty() {
        let scalar = ShapeDescriptor::scalar();
        assert_eq!(scalar.numel().unwrap(), 1);
        assert_eq!(scalar.len(), 1);
        assert!(!scalar.is_empty());

        let empty = ShapeDescriptor::from([4, 0, 3]);
        assert_eq!(empty.numel().unwrap(), 0);
        assert_eq!(empty.len(), 4);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_overflow_is_reported() {
        let shape = ShapeDescriptor::from([usize::MAX, 2]);
        assert!(matches!(
            shape.numel(),
            Err(BridgeError::ShapeOverflow { .. })
        ));

        // Fits as an element count but not as bytes
        let shape = ShapeDescriptor::from([usize::MAX / 8]);
        assert!(shape.numel().is_ok());
        assert!(matches!(
            shape.byte_size(TypeDescriptor::Float64),
            Err(BridgeError::ShapeOverflow { .. })
        ));
    }
}
