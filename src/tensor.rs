// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Host-visible tensor wrapper and its handle lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --construct--> Allocated --release / drop--> Released
//!       |                                                        ^
//!       +----------------- construction failure -----------------+
//! ```
//!
//! - A wrapper reachable after successful construction is always `Allocated`.
//! - `release()` frees the handle exactly once; calling it again, or calling any
//!   operation afterwards, fails with [`BridgeError::UseAfterRelease`].
//! - Dropping an `Allocated` wrapper releases its handle.
//! - Operations never mutate their operands; each returns a new wrapper.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use candle_core::Tensor;

use crate::bridge::BridgeContext;
use crate::buffer::{self, Exported, OwnedBuffer};
use crate::device::DeviceLocation;
use crate::dispatch::{CallArgs, CallResult};
use crate::dtype::{native_token_to_host_tag, HostElement, TypeDescriptor};
use crate::error::{BridgeError, Result};
use crate::format;
use crate::grad::{self, Gradients};
use crate::ops::{self, BinaryOp, CompareOp, UnaryOp};
use crate::shape::ShapeDescriptor;
use crate::slice::{translate_compound, AxisSelector};

/// Observable lifecycle state of a [`HostTensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// No handle yet.
    Uninitialized,
    /// Owns a live handle.
    Allocated,
    /// Handle freed; terminal.
    Released,
}

enum Handle {
    Uninitialized,
    Allocated { tensor: Tensor, bytes: usize },
    Released,
}

/// Host-visible tensor owning one native handle.
pub struct HostTensor {
    handle: Handle,
    ctx: Arc<BridgeContext>,
}

impl HostTensor {
    /// Take ownership of `tensor`, recording the allocation.
    pub(crate) fn wrap(ctx: &Arc<BridgeContext>, tensor: Tensor) -> Result<Self> {
        let mut wrapper = Self {
            handle: Handle::Uninitialized,
            ctx: Arc::clone(ctx),
        };
        let bytes = tensor.elem_count() * tensor.dtype().size_in_bytes();
        ctx.tracker.allocate(bytes)?;
        tracing::trace!(shape = ?tensor.dims(), bytes, "handle allocated");
        wrapper.handle = Handle::Allocated { tensor, bytes };
        Ok(wrapper)
    }

    /// Wrap an operation result in a new wrapper from the same bridge.
    fn derive(&self, tensor: Tensor) -> Result<Self> {
        Self::wrap(&self.ctx, tensor)
    }

    /// The live handle, or `UseAfterRelease` naming `operation`.
    pub(crate) fn handle(&self, operation: &str) -> Result<&Tensor> {
        match &self.handle {
            Handle::Allocated { tensor, .. } => Ok(tensor),
            Handle::Uninitialized | Handle::Released => {
                Err(BridgeError::use_after_release(operation))
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        match self.handle {
            Handle::Uninitialized => HandleState::Uninitialized,
            Handle::Allocated { .. } => HandleState::Allocated,
            Handle::Released => HandleState::Released,
        }
    }

    /// `true` while the wrapper owns a live handle.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.state() == HandleState::Allocated
    }

    /// Free the native handle now.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] if the handle was already released.
    pub fn release(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.handle, Handle::Released) {
            Handle::Allocated { tensor, bytes } => {
                drop(tensor);
                self.ctx.tracker.release(bytes);
                tracing::trace!(bytes, "handle released");
                Ok(())
            }
            Handle::Released => Err(BridgeError::use_after_release("release")),
            Handle::Uninitialized => Ok(()),
        }
    }

    /// Deep copy into a new handle.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease` on a released wrapper; `EngineOperation` or `Allocation`
    /// if the copy cannot be made.
    pub fn try_clone(&self) -> Result<Self> {
        self.derive(ops::deep_copy(self.handle("clone")?)?)
    }

    /// Borrow the underlying engine tensor.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn as_tensor(&self) -> Result<&Tensor> {
        self.handle("as_tensor")
    }

    /// Dispatch a host-visible operation by name.
    ///
    /// # Errors
    ///
    /// `UnknownOperation`, `InvalidArgument`, or whatever the operation raises.
    pub fn call(&self, name: &str, args: CallArgs<'_>) -> Result<CallResult> {
        self.ctx.table.call(name, self, args)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Shape of the tensor.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn shape(&self) -> Result<ShapeDescriptor> {
        Ok(ShapeDescriptor::from(self.handle("shape")?.dims()))
    }

    /// Element type.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, or `UnsupportedType` for engine dtypes with no host tag.
    pub fn dtype(&self) -> Result<TypeDescriptor> {
        native_token_to_host_tag(self.handle("dtype")?.dtype())
    }

    /// Device the handle lives on.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn device(&self) -> Result<DeviceLocation> {
        Ok(DeviceLocation::of(self.handle("device")?.device()))
    }

    /// Host `len()`: the outermost extent, 1 for a scalar.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn len(&self) -> Result<usize> {
        Ok(self.shape()?.len())
    }

    /// `true` when the tensor holds no elements.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.handle("is_empty")?.elem_count() == 0)
    }

    /// Total element count.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn numel(&self) -> Result<usize> {
        Ok(self.handle("numel")?.elem_count())
    }

    /// Hash of the handle's identity. Copies hash differently from their source.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] on a released wrapper.
    pub fn hash_value(&self) -> Result<u64> {
        let mut hasher = DefaultHasher::new();
        self.handle("__hash__")?.id().hash(&mut hasher);
        Ok(hasher.finish())
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Expose the elements to the host; see [`buffer::export`].
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, `UnsupportedType` or `EngineOperation`.
    pub fn export(&self) -> Result<Exported<'_>> {
        buffer::export(self.handle("export")?)
    }

    /// Copy the elements into a host-owned buffer.
    ///
    /// # Errors
    ///
    /// Same as [`HostTensor::export`].
    pub fn export_owned(&self) -> Result<OwnedBuffer> {
        buffer::export_owned(self.handle("export")?)
    }

    /// Elements as a flat typed vector, outermost axis first.
    ///
    /// # Errors
    ///
    /// Same as [`HostTensor::export`], plus `UnsupportedType` if `T` does not match.
    pub fn to_vec<T: HostElement>(&self) -> Result<Vec<T>> {
        self.export()?.to_vec()
    }

    /// Host-readable rendering of every element.
    ///
    /// Expensive: makes a full host copy of the tensor, including a device
    /// transfer for device-resident handles.
    ///
    /// # Errors
    ///
    /// Same as [`HostTensor::export_owned`].
    pub fn repr(&self) -> Result<String> {
        let owned = buffer::export_owned(self.handle("__repr__")?)?;
        format::format_buffer(&owned)
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Broadcasting binary arithmetic.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease` if either operand is released, `EngineOperation` if the
    /// engine rejects the operands.
    pub fn binary(&self, op: BinaryOp, rhs: &HostTensor) -> Result<Self> {
        let out = ops::binary(op, self.handle(op.name())?, rhs.handle(op.name())?)?;
        self.derive(out)
    }

    /// `self + rhs`.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn add(&self, rhs: &HostTensor) -> Result<Self> {
        self.binary(BinaryOp::Add, rhs)
    }

    /// `self - rhs`.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn sub(&self, rhs: &HostTensor) -> Result<Self> {
        self.binary(BinaryOp::Sub, rhs)
    }

    /// `self * rhs`.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn mul(&self, rhs: &HostTensor) -> Result<Self> {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// `self / rhs`.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn div(&self, rhs: &HostTensor) -> Result<Self> {
        self.binary(BinaryOp::Div, rhs)
    }

    /// `self ** rhs`.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn pow(&self, rhs: &HostTensor) -> Result<Self> {
        self.binary(BinaryOp::Pow, rhs)
    }

    /// Broadcasting comparison; the result is a UINT8 mask.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn compare(&self, op: CompareOp, rhs: &HostTensor) -> Result<Self> {
        let out = ops::compare(op, self.handle(op.name())?, rhs.handle(op.name())?)?;
        self.derive(out)
    }

    /// Elementwise unary operation.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, or `EngineOperation` when the dtype has no kernel.
    pub fn unary(&self, op: UnaryOp) -> Result<Self> {
        self.derive(ops::unary(op, self.handle(op.name())?)?)
    }

    /// Matrix product.
    ///
    /// # Errors
    ///
    /// See [`HostTensor::binary`].
    pub fn matmul(&self, rhs: &HostTensor) -> Result<Self> {
        self.derive(ops::matmul(self.handle("matmul")?, rhs.handle("matmul")?)?)
    }

    /// Swap two axes.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, or `EngineOperation` for an axis out of range.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        self.derive(ops::transpose(self.handle("transpose")?, dim0, dim1)?)
    }

    /// Convert to another element type. The source is unchanged.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, `UnsupportedType` or `EngineOperation`.
    pub fn cast(&self, dtype: TypeDescriptor) -> Result<Self> {
        self.derive(ops::cast(self.handle("cast")?, dtype)?)
    }

    /// Copy to another device.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, `DeviceNotAvailable` or `EngineOperation`.
    pub fn to_device(&self, location: DeviceLocation) -> Result<Self> {
        let tensor = self.handle("to_device")?;
        let device = location.open()?;
        self.derive(ops::to_device(tensor, &device)?)
    }

    /// Select with host indexing syntax.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, `IndexOutOfRange`, `InvalidSlice` or `EngineOperation`.
    pub fn index(&self, selectors: &[AxisSelector]) -> Result<Self> {
        let tensor = self.handle("__getitem__")?;
        let spec = translate_compound(selectors, &ShapeDescriptor::from(tensor.dims()))?;
        self.derive(ops::apply_slice(tensor, &spec)?)
    }

    /// Copy of this tensor whose operations the engine records for backward.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease` or `EngineOperation`.
    pub fn requires_grad(&self) -> Result<Self> {
        self.derive(grad::track(self.handle("requires_grad")?)?)
    }

    /// Run the backward pass rooted at this tensor.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease` or `EngineOperation`.
    pub fn calc_grad(&self) -> Result<Gradients> {
        Gradients::compute(self.handle("calc_grad")?)
    }

    /// Gradient of this tensor in `grads`, `None` if it took no part in the pass.
    ///
    /// # Errors
    ///
    /// `UseAfterRelease`, or `Allocation` past the memory limit.
    pub fn get_grad(&self, grads: &Gradients) -> Result<Option<Self>> {
        grads
            .lookup(self.handle("get_grad")?)
            .map(|g| self.derive(g.clone()))
            .transpose()
    }
}

macro_rules! unary_methods {
    ($($(#[$doc:meta])* $name:ident => $op:ident),+ $(,)?) => {
        impl HostTensor {
            $(
                $(#[$doc])*
                ///
                /// # Errors
                ///
                /// See [`HostTensor::unary`].
                pub fn $name(&self) -> Result<Self> {
                    self.unary(UnaryOp::$op)
                }
            )+
        }
    };
}

unary_methods! {
    /// Elementwise negation.
    neg => Neg,
    /// Elementwise absolute value.
    abs => Abs,
    /// Elementwise sine.
    sin => Sin,
    /// Elementwise cosine.
    cos => Cos,
    /// Elementwise tangent.
    tan => Tan,
    /// Elementwise hyperbolic sine.
    sinh => Sinh,
    /// Elementwise hyperbolic cosine.
    cosh => Cosh,
    /// Elementwise hyperbolic tangent.
    tanh => Tanh,
    /// Elementwise natural logarithm.
    log => Log,
}

/// Elementwise select: `on_true` where `mask` is non-zero, `on_false` elsewhere.
///
/// # Errors
///
/// `UseAfterRelease` if any operand is released, `EngineOperation` if the engine
/// rejects the operands.
pub fn condition(
    mask: &HostTensor,
    on_true: &HostTensor,
    on_false: &HostTensor,
) -> Result<HostTensor> {
    let out = ops::condition(
        mask.handle("condition")?,
        on_true.handle("condition")?,
        on_false.handle("condition")?,
    )?;
    on_true.derive(out)
}

impl Drop for HostTensor {
    fn drop(&mut self) {
        if self.is_allocated() {
            let _ = self.release();
        }
    }
}

impl fmt::Debug for HostTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("HostTensor");
        s.field("state", &self.state());
        if let Handle::Allocated { tensor, .. } = &self.handle {
            s.field("shape", &tensor.dims()).field("dtype", &tensor.dtype());
        }
        s.finish()
    }
}

impl fmt::Display for HostTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "tensor(<{e}>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Bridge, BridgeConfig};
    use crate::slice::SliceArg;

    fn bridge() -> Bridge {
        Bridge::init(BridgeConfig::new().with_cpu()).unwrap()
    }

    fn sample(bridge: &Bridge) -> HostTensor {
        bridge
            .from_slice(&[1f32, 2., 3., 4., 5., 6.], &ShapeDescriptor::from([2, 3]))
            .unwrap()
    }

    #[test]
    fn test_release_exactly_once() {
        let bridge = bridge();
        let mut t = sample(&bridge);
        assert_eq!(t.state(), HandleState::Allocated);
        assert_eq!(bridge.stats().live_handles, 1);

        t.release().unwrap();
        assert_eq!(t.state(), HandleState::Released);
        assert_eq!(bridge.stats().live_handles, 0);

        assert!(matches!(
            t.release(),
            Err(BridgeError::UseAfterRelease { .. })
        ));
        assert_eq!(bridge.stats().releases, 1);
    }

    #[test]
    fn test_use_after_release() {
        let bridge = bridge();
        let mut t = sample(&bridge);
        t.release().unwrap();

        let err = t.sin().unwrap_err();
        assert!(matches!(&err, BridgeError::UseAfterRelease { operation } if operation == "sin"));
        assert!(t.shape().is_err());
        assert!(t.try_clone().is_err());

        let other = sample(&bridge);
        assert!(other.add(&t).is_err());
    }

    #[test]
    fn test_drop_releases() {
        let bridge = bridge();
        {
            let _a = sample(&bridge);
            let _b = sample(&bridge);
            assert_eq!(bridge.stats().live_handles, 2);
        }
        let stats = bridge.stats();
        assert_eq!(stats.live_handles, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.allocations, stats.releases);
    }

    #[test]
    fn test_clone_is_independent() {
        let bridge = bridge();
        let mut original = sample(&bridge);
        let copy = original.try_clone().unwrap();
        assert_ne!(original.hash_value().unwrap(), copy.hash_value().unwrap());

        original.release().unwrap();
        assert_eq!(copy.to_vec::<f32>().unwrap(), vec![1., 2., 3., 4., 5., 6.]);
    }

    #[test]
    fn test_accessors() {
        let bridge = bridge();
        let t = sample(&bridge);
        assert_eq!(t.shape().unwrap().dims(), &[2, 3]);
        assert_eq!(t.dtype().unwrap(), TypeDescriptor::Float32);
        assert_eq!(t.device().unwrap(), DeviceLocation::HOST);
        assert_eq!(t.len().unwrap(), 2);
        assert_eq!(t.numel().unwrap(), 6);
        assert!(!t.is_empty().unwrap());

        let s = bridge.scalar(3i32).unwrap();
        assert_eq!(s.len().unwrap(), 1);
        assert_eq!(s.shape().unwrap().rank(), 0);
    }

    #[test]
    fn test_operations_leave_operands_unchanged() {
        let bridge = bridge();
        let t = sample(&bridge);
        let doubled = t.add(&t).unwrap();
        assert_eq!(doubled.to_vec::<f32>().unwrap(), vec![2., 4., 6., 8., 10., 12.]);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1., 2., 3., 4., 5., 6.]);

        let cast = t.cast(TypeDescriptor::Int32).unwrap();
        assert_eq!(cast.dtype().unwrap(), TypeDescriptor::Int32);
        assert_eq!(t.dtype().unwrap(), TypeDescriptor::Float32);
    }

    #[test]
    fn test_index() {
        let bridge = bridge();
        let t = sample(&bridge);
        let row = t.index(&[AxisSelector::index(-1)]).unwrap();
        assert_eq!(row.to_vec::<f32>().unwrap(), vec![4., 5., 6.]);

        let col = t
            .index(&[AxisSelector::full(), SliceArg::new(Some(1), None, Some(2)).into()])
            .unwrap();
        assert_eq!(col.shape().unwrap().dims(), &[2, 1]);

        assert!(matches!(
            t.index(&[AxisSelector::index(2)]),
            Err(BridgeError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_condition() {
        let bridge = bridge();
        let a = bridge.from_slice(&[1f32, 2., 3.], &ShapeDescriptor::from([3])).unwrap();
        let b = bridge.from_slice(&[3f32, 2., 1.], &ShapeDescriptor::from([3])).unwrap();
        let mask = a.compare(CompareOp::Gt, &b).unwrap();
        assert_eq!(mask.dtype().unwrap(), TypeDescriptor::UInt8);
        let max = condition(&mask, &a, &b).unwrap();
        assert_eq!(max.to_vec::<f32>().unwrap(), vec![3., 2., 3.]);
    }

    #[test]
    fn test_gradients_round_trip() {
        let bridge = bridge();
        let x = sample(&bridge).requires_grad().unwrap();
        let y = x.mul(&x).unwrap();
        let grads = y.calc_grad().unwrap();

        let dx = x.get_grad(&grads).unwrap().unwrap();
        assert_eq!(dx.to_vec::<f32>().unwrap(), vec![2., 4., 6., 8., 10., 12.]);

        let untracked = sample(&bridge);
        assert!(untracked.get_grad(&grads).unwrap().is_none());
    }

    #[test]
    fn test_display() {
        let bridge = bridge();
        let mut t = sample(&bridge);
        assert_eq!(
            t.to_string(),
            "tensor([[1.0, 2.0, 3.0],\n        [4.0, 5.0, 6.0]], dtype=FLOAT32)"
        );
        t.release().unwrap();
        assert!(t.to_string().starts_with("tensor(<"));
    }
}
