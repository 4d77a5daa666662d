// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Translation of host indexing syntax into per-axis slice triples.
//!
//! Hosts index with a bare integer (`t[2]`), a range slice (`t[1:3]`, `t[::-1]`) or a
//! tuple mixing both (`t[0, 1:]`). This module turns those into a [`SliceSpec`] the
//! engine adapter can execute.
//!
//! Two sets of rules apply, deliberately different:
//!
//! - **Bare indices are strict**: negative values count from the end and anything
//!   outside `[-extent, extent)` fails with [`BridgeError::IndexOutOfRange`].
//! - **Slice bounds are forgiving**: out-of-range bounds clamp to the axis, only a
//!   zero step fails ([`BridgeError::InvalidSlice`]).
//!
//! For negative steps the normalized `start`/`stop` may be `-1`, meaning "before the
//! first element", exactly as Python's `slice.indices` reports it.

use crate::error::{BridgeError, Result};
use crate::shape::ShapeDescriptor;

/// A slice as written by the host: every bound optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceArg {
    /// First position, `None` for the default.
    pub start: Option<isize>,
    /// One-past-last position, `None` for the default.
    pub stop: Option<isize>,
    /// Stride, `None` for 1.
    pub step: Option<isize>,
}

impl SliceArg {
    /// Create a slice with explicit optional bounds.
    #[must_use]
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        Self { start, stop, step }
    }

    /// The full-axis slice `[:]`.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }
}

/// One entry of a host indexing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelector {
    /// Bare integer index; removes the axis from the result.
    Index(isize),
    /// Range slice; keeps the axis.
    Slice(SliceArg),
}

impl AxisSelector {
    /// Bare index selector.
    #[must_use]
    pub fn index(i: isize) -> Self {
        Self::Index(i)
    }

    /// `[start:stop]` selector.
    #[must_use]
    pub fn range(start: isize, stop: isize) -> Self {
        Self::Slice(SliceArg::new(Some(start), Some(stop), None))
    }

    /// `[:]` selector.
    #[must_use]
    pub fn full() -> Self {
        Self::Slice(SliceArg::full())
    }
}

impl From<isize> for AxisSelector {
    fn from(i: isize) -> Self {
        Self::Index(i)
    }
}

impl From<SliceArg> for AxisSelector {
    fn from(s: SliceArg) -> Self {
        Self::Slice(s)
    }
}

/// Normalized `(start, stop, step)` triple for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    /// First selected position (`-1` only for empty negative-step slices).
    pub start: isize,
    /// Exclusive end (`-1` means "past the front" for negative steps).
    pub stop: isize,
    /// Non-zero stride.
    pub step: isize,
}

impl SliceRange {
    /// The triple as a tuple.
    #[must_use]
    pub fn as_tuple(&self) -> (isize, isize, isize) {
        (self.start, self.stop, self.step)
    }

    /// Number of selected positions.
    #[must_use]
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            self.stop - self.start
        } else {
            self.start - self.stop
        };
        if span <= 0 {
            0
        } else {
            (span.unsigned_abs() - 1) / self.step.unsigned_abs() + 1
        }
    }

    /// `true` when no position is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected positions, in selection order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).map(move |k| {
            #[allow(clippy::cast_possible_wrap)]
            let pos = self.start + (k as isize) * self.step;
            pos.unsigned_abs()
        })
    }

    /// `true` when the range is a unit-stride run the engine can narrow.
    #[must_use]
    pub fn is_unit_stride(&self) -> bool {
        self.step == 1
    }
}

/// Per-axis selection after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSlice {
    /// Single position; the axis is dropped from the result.
    Index(usize),
    /// Range; the axis is kept with `len()` positions.
    Range(SliceRange),
}

/// Normalized selection covering every axis of a tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSpec {
    axes: Vec<AxisSlice>,
}

impl SliceSpec {
    /// Per-axis selections, outermost first.
    #[must_use]
    pub fn axes(&self) -> &[AxisSlice] {
        &self.axes
    }

    /// Shape of the selection result (indexed axes removed).
    #[must_use]
    pub fn output_shape(&self) -> ShapeDescriptor {
        self.axes
            .iter()
            .filter_map(|a| match a {
                AxisSlice::Index(_) => None,
                AxisSlice::Range(r) => Some(r.len()),
            })
            .collect::<Vec<_>>()
            .into()
    }

    /// `true` if the selection keeps every axis in full.
    #[must_use]
    pub fn is_identity(&self, shape: &ShapeDescriptor) -> bool {
        self.axes.iter().zip(shape.dims()).all(|(a, &extent)| {
            matches!(a, AxisSlice::Range(r) if r.step == 1 && r.start == 0 && r.len() == extent)
        })
    }
}

fn signed_extent(extent: usize) -> isize {
    isize::try_from(extent).unwrap_or(isize::MAX)
}

fn normalize_index_on(axis: usize, raw: isize, extent: usize) -> Result<usize> {
    let signed = signed_extent(extent);
    let pos = if raw < 0 { raw + signed } else { raw };
    if (0..signed).contains(&pos) {
        Ok(pos.unsigned_abs())
    } else {
        Err(BridgeError::IndexOutOfRange {
            index: raw,
            axis,
            extent,
        })
    }
}

fn translate_slice_on(axis: usize, arg: SliceArg, extent: usize) -> Result<SliceRange> {
    let step = arg.step.unwrap_or(1);
    if step == 0 {
        return Err(BridgeError::InvalidSlice { axis });
    }

    let len = signed_extent(extent);
    let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
    let clamp = |bound: isize| {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };

    let start = arg.start.map_or(if step < 0 { upper } else { lower }, clamp);
    let stop = arg.stop.map_or(if step < 0 { lower } else { upper }, clamp);

    Ok(SliceRange { start, stop, step })
}

/// Normalize a bare index against an axis extent.
///
/// Negative indices count from the end (`-1` is the last position).
///
/// # Errors
///
/// Returns [`BridgeError::IndexOutOfRange`] if the normalized index lies outside
/// `[0, extent)`.
pub fn normalize_index(raw: isize, extent: usize) -> Result<usize> {
    normalize_index_on(0, raw, extent)
}

/// Normalize host slice bounds against an axis extent.
///
/// Defaults: `step = 1`; `start = 0` (or `extent - 1` when `step < 0`);
/// `stop = extent` (or `-1` when `step < 0`). Bounds outside the axis clamp.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidSlice`] if `step == 0`.
pub fn translate_slice(
    start: Option<isize>,
    stop: Option<isize>,
    step: Option<isize>,
    extent: usize,
) -> Result<SliceRange> {
    translate_slice_on(0, SliceArg::new(start, stop, step), extent)
}

/// Translate a host indexing expression into a [`SliceSpec`] covering every axis.
///
/// Selectors apply to axes in order. Axes past the last selector are selected in
/// full.
///
/// # Errors
///
/// - [`BridgeError::IndexOutOfRange`] for a bad bare index, or when there are more
///   selectors than axes
/// - [`BridgeError::InvalidSlice`] for a zero step
pub fn translate_compound(
    selectors: &[AxisSelector],
    shape: &ShapeDescriptor,
) -> Result<SliceSpec> {
    if selectors.len() > shape.rank() {
        return Err(BridgeError::IndexOutOfRange {
            index: isize::try_from(selectors.len() - 1).unwrap_or(isize::MAX),
            axis: shape.rank(),
            extent: 0,
        });
    }

    let mut axes = Vec::with_capacity(shape.rank());
    for (axis, &extent) in shape.dims().iter().enumerate() {
        let selection = match selectors.get(axis) {
            Some(AxisSelector::Index(raw)) => {
                AxisSlice::Index(normalize_index_on(axis, *raw, extent)?)
            }
            Some(AxisSelector::Slice(arg)) => {
                AxisSlice::Range(translate_slice_on(axis, *arg, extent)?)
            }
            None => AxisSlice::Range(translate_slice_on(axis, SliceArg::full(), extent)?),
        };
        axes.push(selection);
    }

    Ok(SliceSpec { axes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slice_is_full_range() {
        for extent in [0, 1, 5, 17] {
            let r = translate_slice(None, None, None, extent).unwrap();
            assert_eq!(r.as_tuple(), (0, signed_extent(extent), 1));
            assert_eq!(r.len(), extent);
        }
    }

    #[test]
    fn test_basic_slices() {
        assert_eq!(
            translate_slice(Some(1), Some(3), None, 5).unwrap().as_tuple(),
            (1, 3, 1)
        );
        assert_eq!(
            translate_slice(Some(-2), None, None, 5).unwrap().as_tuple(),
            (3, 5, 1)
        );
    }

    #[test]
    fn test_slice_bounds_clamp() {
        assert_eq!(
            translate_slice(Some(-10), Some(100), None, 5).unwrap().as_tuple(),
            (0, 5, 1)
        );
        let empty = translate_slice(Some(4), Some(2), None, 5).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_negative_step() {
        let r = translate_slice(None, None, Some(-1), 5).unwrap();
        assert_eq!(r.as_tuple(), (4, -1, -1));
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![4, 3, 2, 1, 0]);

        let r = translate_slice(Some(10), Some(-10), Some(-2), 5).unwrap();
        assert_eq!(r.as_tuple(), (4, -1, -2));
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![4, 2, 0]);
    }

    #[test]
    fn test_strided_positions() {
        let r = translate_slice(Some(1), None, Some(3), 8).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![1, 4, 7]);
    }

    #[test]
    fn test_extreme_steps() {
        let r = translate_slice(None, None, Some(isize::MIN), 5).unwrap();
        assert_eq!(r.as_tuple(), (4, -1, isize::MIN));
        assert_eq!(r.len(), 1);
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![4]);

        let r = translate_slice(None, None, Some(isize::MAX), 5).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![0]);

        let r = translate_slice(Some(0), None, Some(isize::MIN), 5).unwrap();
        assert_eq!(r.positions().collect::<Vec<_>>(), vec![0]);
        assert!(translate_slice(None, None, Some(isize::MIN), 0).unwrap().is_empty());
    }

    #[test]
    fn test_zero_step_fails() {
        assert!(matches!(
            translate_slice(None, None, Some(0), 5),
            Err(BridgeError::InvalidSlice { axis: 0 })
        ));
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 5).unwrap(), 4);
        assert_eq!(normalize_index(0, 5).unwrap(), 0);
        for raw in -5..0 {
            assert_eq!(normalize_index(raw, 5).unwrap(), (5 + raw).unsigned_abs());
        }
        assert!(matches!(
            normalize_index(5, 5),
            Err(BridgeError::IndexOutOfRange { index: 5, .. })
        ));
        assert!(normalize_index(-6, 5).is_err());
        assert!(normalize_index(0, 0).is_err());
    }

    #[test]
    fn test_compound_fills_trailing_axes() {
        let shape = ShapeDescriptor::from([4, 5, 6]);
        let spec = translate_compound(&[AxisSelector::index(-1)], &shape).unwrap();
        assert_eq!(spec.axes()[0], AxisSlice::Index(3));
        assert_eq!(spec.output_shape().dims(), &[5, 6]);
        assert!(matches!(spec.axes()[2], AxisSlice::Range(r) if r.as_tuple() == (0, 6, 1)));
    }

    #[test]
    fn test_compound_reports_axis() {
        let shape = ShapeDescriptor::from([4, 5]);
        let err = translate_compound(
            &[AxisSelector::full(), AxisSelector::index(7)],
            &shape,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::IndexOutOfRange { index: 7, axis: 1, extent: 5 }
        ));

        let err = translate_compound(
            &[AxisSelector::full(), AxisSelector::Slice(SliceArg::new(None, None, Some(0)))],
            &shape,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidSlice { axis: 1 }));
    }

    #[test]
    fn test_too_many_selectors() {
        let shape = ShapeDescriptor::from([3]);
        let err = translate_compound(&[AxisSelector::index(0), AxisSelector::index(0)], &shape)
            .unwrap_err();
        assert!(matches!(err, BridgeError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_identity_detection() {
        let shape = ShapeDescriptor::from([2, 3]);
        assert!(translate_compound(&[], &shape).unwrap().is_identity(&shape));
        assert!(!translate_compound(&[AxisSelector::range(0, 1)], &shape)
            .unwrap()
            .is_identity(&shape));
    }
}
