// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Engine entry points used by the dispatch table.
//!
//! Each function takes borrowed engine tensors, calls candle and returns a new
//! tensor. Broadcasting, kernels and dtype promotion rules are candle's; engine
//! failures surface as [`BridgeError::EngineOperation`] tagged with the operation
//! name.

use candle_core::{Device, Tensor};

use crate::dtype::{host_tag_to_native, TypeDescriptor};
use crate::error::{BridgeError, EngineResultExt, Result};
use crate::slice::{AxisSlice, SliceRange, SliceSpec};

/// Elementwise binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `**` (floating point only)
    Pow,
}

impl BinaryOp {
    /// Operation name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Pow => "pow",
        }
    }
}

/// Elementwise comparison producing a UINT8 mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `<`
    Lt,
}

impl CompareOp {
    /// Operation name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Ge => "ge",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Lt => "lt",
        }
    }
}

/// Elementwise unary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Unary `+`: a copy of the operand.
    Pos,
    /// Unary `-`.
    Neg,
    /// Absolute value.
    Abs,
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Tangent.
    Tan,
    /// Hyperbolic sine.
    Sinh,
    /// Hyperbolic cosine.
    Cosh,
    /// Hyperbolic tangent.
    Tanh,
    /// Natural logarithm.
    Log,
}

impl UnaryOp {
    /// Operation name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pos => "pos",
            Self::Neg => "neg",
            Self::Abs => "abs",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Log => "log",
        }
    }
}

/// Apply a broadcasting binary operation.
///
/// # Errors
///
/// Returns `EngineOperation` for incompatible shapes or dtypes.
pub fn binary(op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    match op {
        BinaryOp::Add => lhs.broadcast_add(rhs),
        BinaryOp::Sub => lhs.broadcast_sub(rhs),
        BinaryOp::Mul => lhs.broadcast_mul(rhs),
        BinaryOp::Div => lhs.broadcast_div(rhs),
        BinaryOp::Pow => lhs.broadcast_pow(rhs),
    }
    .engine_op(op.name())
}

/// Apply a broadcasting comparison.
///
/// # Errors
///
/// Returns `EngineOperation` for incompatible shapes or dtypes.
pub fn compare(op: CompareOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    match op {
        CompareOp::Eq => lhs.broadcast_eq(rhs),
        CompareOp::Ne => lhs.broadcast_ne(rhs),
        CompareOp::Ge => lhs.broadcast_ge(rhs),
        CompareOp::Le => lhs.broadcast_le(rhs),
        CompareOp::Gt => lhs.broadcast_gt(rhs),
        CompareOp::Lt => lhs.broadcast_lt(rhs),
    }
    .engine_op(op.name())
}

/// Apply an elementwise unary operation.
///
/// `tan`, `sinh` and `cosh` are composed from engine primitives.
///
/// # Errors
///
/// Returns `EngineOperation` if the engine has no kernel for the dtype
/// (transcendentals on integer tensors, for instance).
pub fn unary(op: UnaryOp, t: &Tensor) -> Result<Tensor> {
    match op {
        UnaryOp::Pos => t.copy(),
        UnaryOp::Neg => t.neg(),
        UnaryOp::Abs => t.abs(),
        UnaryOp::Sin => t.sin(),
        UnaryOp::Cos => t.cos(),
        UnaryOp::Tan => t.sin().and_then(|s| s.div(&t.cos()?)),
        UnaryOp::Sinh => half_exp_combination(t, false),
        UnaryOp::Cosh => half_exp_combination(t, true),
        UnaryOp::Tanh => t.tanh(),
        UnaryOp::Log => t.log(),
    }
    .engine_op(op.name())
}

/// `(e^x + e^-x) / 2` when `plus`, `(e^x - e^-x) / 2` otherwise.
fn half_exp_combination(t: &Tensor, plus: bool) -> candle_core::Result<Tensor> {
    let pos = t.exp()?;
    let neg = t.neg()?.exp()?;
    let combined = if plus { pos.add(&neg)? } else { pos.sub(&neg)? };
    combined.affine(0.5, 0.0)
}

/// Matrix product with batch broadcasting.
///
/// # Errors
///
/// Returns `EngineOperation` for incompatible inner dimensions.
pub fn matmul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    lhs.broadcast_matmul(rhs).engine_op("matmul")
}

/// Swap two axes.
///
/// # Errors
///
/// Returns `EngineOperation` if either axis is out of range.
pub fn transpose(t: &Tensor, dim0: usize, dim1: usize) -> Result<Tensor> {
    t.transpose(dim0, dim1).engine_op("transpose")
}

/// Deep copy into a new engine allocation.
///
/// # Errors
///
/// Returns `EngineOperation` if the engine cannot allocate the copy.
pub fn deep_copy(t: &Tensor) -> Result<Tensor> {
    t.copy().engine_op("clone")
}

/// Convert to another element type.
///
/// # Errors
///
/// Returns `UnsupportedType` if the engine cannot store `dtype`, or
/// `EngineOperation` if the conversion fails.
pub fn cast(t: &Tensor, dtype: TypeDescriptor) -> Result<Tensor> {
    let native = host_tag_to_native(dtype)?;
    t.to_dtype(native).engine_op("cast")
}

/// Move to another device. A no-op copy when already there.
///
/// # Errors
///
/// Returns `EngineOperation` if the transfer fails.
pub fn to_device(t: &Tensor, device: &Device) -> Result<Tensor> {
    t.to_device(device).engine_op("to_device")
}

/// Elementwise select: `on_true` where `mask` is non-zero, `on_false` elsewhere.
///
/// # Errors
///
/// Returns `EngineOperation` if the mask is not an integer tensor or the shapes
/// disagree.
pub fn condition(mask: &Tensor, on_true: &Tensor, on_false: &Tensor) -> Result<Tensor> {
    mask.where_cond(on_true, on_false).engine_op("condition")
}

/// Execute a normalized selection.
///
/// Unit-stride ranges and bare indices narrow the tensor; other strides gather
/// the selected positions. Indexed axes are squeezed out last, innermost first,
/// so earlier axis numbers stay valid.
///
/// # Errors
///
/// Returns `EngineOperation` if the engine rejects a narrow or gather, and
/// `IndexOutOfRange` if a gather position has no `I64` id.
pub fn apply_slice(t: &Tensor, spec: &SliceSpec) -> Result<Tensor> {
    let mut out = t.clone();
    let mut squeezed = Vec::new();

    for (axis, selection) in spec.axes().iter().enumerate() {
        out = match selection {
            AxisSlice::Index(pos) => {
                squeezed.push(axis);
                out.narrow(axis, *pos, 1).engine_op("index")?
            }
            AxisSlice::Range(range) if range.is_empty() => {
                out.narrow(axis, 0, 0).engine_op("slice")?
            }
            AxisSlice::Range(range) if range.is_unit_stride() => out
                .narrow(axis, range.start.unsigned_abs(), range.len())
                .engine_op("slice")?,
            AxisSlice::Range(range) => {
                let positions = gather_ids(range, axis, out.dim(axis).engine_op("slice")?)?;
                let ids = Tensor::from_vec(positions, range.len(), out.device())
                    .engine_op("slice")?;
                out.index_select(&ids, axis).engine_op("slice")?
            }
        };
    }

    for axis in squeezed.into_iter().rev() {
        out = out.squeeze(axis).engine_op("index")?;
    }
    Ok(out)
}

/// Gather ids for a strided range, as `I64` so large axes are not truncated.
fn gather_ids(range: &SliceRange, axis: usize, extent: usize) -> Result<Vec<i64>> {
    range
        .positions()
        .map(|p| {
            i64::try_from(p).map_err(|_| BridgeError::IndexOutOfRange {
                index: isize::try_from(p).unwrap_or(isize::MAX),
                axis,
                extent,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeDescriptor;
    use crate::slice::{translate_compound, AxisSelector, SliceArg};

    fn grid() -> Tensor {
        Tensor::arange(0f32, 12., &Device::Cpu)
            .unwrap()
            .reshape((3, 4))
            .unwrap()
    }

    fn select(t: &Tensor, selectors: &[AxisSelector]) -> Tensor {
        let spec = translate_compound(selectors, &ShapeDescriptor::from(t.dims())).unwrap();
        apply_slice(t, &spec).unwrap()
    }

    #[test]
    fn test_binary_broadcasts() {
        let a = grid();
        let b = Tensor::new(&[1f32, 1., 1., 1.], &Device::Cpu).unwrap();
        let sum = binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(sum.dims(), &[3, 4]);
        assert_eq!(sum.to_vec2::<f32>().unwrap()[2][3], 12.0);
    }

    #[test]
    fn test_binary_dtype_mismatch_is_engine_error() {
        let a = grid();
        let b = a.to_dtype(candle_core::DType::F64).unwrap();
        let err = binary(BinaryOp::Mul, &a, &b).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::EngineOperation);
    }

    #[test]
    fn test_compare_returns_mask() {
        let a = Tensor::new(&[1f32, 2., 3.], &Device::Cpu).unwrap();
        let b = Tensor::new(&[2f32, 2., 2.], &Device::Cpu).unwrap();
        let mask = compare(CompareOp::Ge, &a, &b).unwrap();
        assert_eq!(mask.dtype(), candle_core::DType::U8);
        assert_eq!(mask.to_vec1::<u8>().unwrap(), vec![0, 1, 1]);
    }

    #[test]
    fn test_composed_unaries() {
        let x = Tensor::new(&[0f32, 0.5], &Device::Cpu).unwrap();
        let tan = unary(UnaryOp::Tan, &x).unwrap().to_vec1::<f32>().unwrap();
        let sinh = unary(UnaryOp::Sinh, &x).unwrap().to_vec1::<f32>().unwrap();
        let cosh = unary(UnaryOp::Cosh, &x).unwrap().to_vec1::<f32>().unwrap();
        assert!((tan[1] - 0.5f32.tan()).abs() < 1e-5);
        assert!((sinh[1] - 0.5f32.sinh()).abs() < 1e-5);
        assert!((cosh[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pos_is_a_copy() {
        let x = grid();
        let y = unary(UnaryOp::Pos, &x).unwrap();
        assert_ne!(x.id(), y.id());
        assert_eq!(x.to_vec2::<f32>().unwrap(), y.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_cast_leaves_source() {
        let x = Tensor::new(&[1.7f32, -2.2], &Device::Cpu).unwrap();
        let y = cast(&x, TypeDescriptor::Int64).unwrap();
        assert_eq!(y.dtype(), candle_core::DType::I64);
        assert_eq!(x.dtype(), candle_core::DType::F32);
        assert!(cast(&x, TypeDescriptor::Bool).is_err());
    }

    #[test]
    fn test_slice_index_and_range() {
        let t = grid();
        let row = select(&t, &[AxisSelector::index(-1)]);
        assert_eq!(row.to_vec1::<f32>().unwrap(), vec![8., 9., 10., 11.]);

        let block = select(&t, &[AxisSelector::range(1, 3), AxisSelector::index(0)]);
        assert_eq!(block.to_vec1::<f32>().unwrap(), vec![4., 8.]);

        let scalar = select(&t, &[AxisSelector::index(1), AxisSelector::index(2)]);
        assert_eq!(scalar.rank(), 0);
        assert_eq!(scalar.to_scalar::<f32>().unwrap(), 6.0);
    }

    #[test]
    fn test_slice_strided_and_reversed() {
        let t = grid();
        let rev = select(
            &t,
            &[AxisSelector::index(0), SliceArg::new(None, None, Some(-1)).into()],
        );
        assert_eq!(rev.to_vec1::<f32>().unwrap(), vec![3., 2., 1., 0.]);

        let every_other = select(
            &t,
            &[AxisSelector::full(), SliceArg::new(Some(1), None, Some(2)).into()],
        );
        assert_eq!(
            every_other.to_vec2::<f32>().unwrap(),
            vec![vec![1., 3.], vec![5., 7.], vec![9., 11.]]
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_gather_ids_keep_wide_positions() {
        let range = SliceRange {
            start: 5_000_000_000,
            stop: 4_999_999_990,
            step: -4,
        };
        let ids = gather_ids(&range, 1, 5_000_000_001).unwrap();
        assert_eq!(ids, vec![5_000_000_000, 4_999_999_996, 4_999_999_992]);
    }

    #[test]
    fn test_slice_extreme_step_selects_one() {
        let t = grid();
        let last = select(
            &t,
            &[AxisSelector::index(0), SliceArg::new(None, None, Some(isize::MIN)).into()],
        );
        assert_eq!(last.to_vec1::<f32>().unwrap(), vec![3.]);
    }

    #[test]
    fn test_empty_slice() {
        let t = grid();
        let empty = select(&t, &[AxisSelector::range(3, 1)]);
        assert_eq!(empty.dims(), &[0, 4]);
    }

    #[test]
    fn test_condition() {
        let mask = Tensor::new(&[1u8, 0, 1], &Device::Cpu).unwrap();
        let a = Tensor::new(&[1f32, 2., 3.], &Device::Cpu).unwrap();
        let b = Tensor::new(&[-1f32, -2., -3.], &Device::Cpu).unwrap();
        let out = condition(&mask, &a, &b).unwrap();
        assert_eq!(out.to_vec1::<f32>().unwrap(), vec![1., -2., 3.]);
    }

    #[test]
    fn test_matmul_and_transpose() {
        let a = grid();
        let at = transpose(&a, 0, 1).unwrap();
        assert_eq!(at.dims(), &[4, 3]);
        let prod = matmul(&a, &at).unwrap();
        assert_eq!(prod.dims(), &[3, 3]);
        // row0 . row0 = 0 + 1 + 4 + 9
        assert_eq!(prod.to_vec2::<f32>().unwrap()[0][0], 14.0);
        assert!(matmul(&a, &a).is_err());
    }
}
