// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Name-based operator and method dispatch.
//!
//! Hosts with a dynamic call convention (Python dunder methods, string-keyed
//! FFI calls) look operations up by name. The [`DispatchTable`] maps every
//! host-visible name to an [`Operation`], and [`DispatchTable::call`] validates
//! the argument form before forwarding to the typed [`HostTensor`] API.
//!
//! In-place names (`__iadd__`, ...) map to the same operations as their
//! out-of-place forms: operands are never mutated, the host rebinds the name to
//! the returned wrapper.

use std::collections::HashMap;

use crate::device::DeviceLocation;
use crate::dtype::TypeDescriptor;
use crate::error::{BridgeError, Result};
use crate::grad::Gradients;
use crate::ops::{BinaryOp, CompareOp, UnaryOp};
use crate::shape::ShapeDescriptor;
use crate::slice::AxisSelector;
use crate::tensor::HostTensor;

/// An entry point reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Broadcasting arithmetic; takes a tensor.
    Binary(BinaryOp),
    /// Broadcasting comparison; takes a tensor.
    Compare(CompareOp),
    /// Elementwise unary; no arguments.
    Unary(UnaryOp),
    /// Matrix product; takes a tensor.
    MatMul,
    /// Axis swap; takes two axes.
    Transpose,
    /// Deep copy; no arguments.
    Clone,
    /// Element type conversion; takes a dtype.
    Cast,
    /// Device transfer; takes a device.
    ToDevice,
    /// Backward pass; no arguments.
    CalcGrad,
    /// Gradient lookup; takes gradients.
    GetGrad,
    /// Index, slice or compound selection; takes selectors.
    Index,
    /// Handle identity hash; no arguments.
    Hash,
    /// Full-copy stringification; no arguments.
    Repr,
    /// Shape accessor.
    Shape,
    /// Element type accessor.
    DType,
    /// Outermost extent.
    Len,
    /// Element count.
    Numel,
    /// Device accessor.
    Device,
}

/// Arguments accompanying a dispatched call.
#[derive(Debug, Clone, Copy)]
pub enum CallArgs<'a> {
    /// No argument.
    None,
    /// A second operand.
    Tensor(&'a HostTensor),
    /// Two axis numbers.
    Axes(usize, usize),
    /// A target element type.
    DType(TypeDescriptor),
    /// A target device.
    Device(DeviceLocation),
    /// Host indexing selectors.
    Index(&'a [AxisSelector]),
    /// Gradients from a backward pass.
    Gradients(&'a Gradients),
}

/// Value returned by a dispatched call.
#[derive(Debug)]
pub enum CallResult {
    /// A new wrapper.
    Tensor(HostTensor),
    /// No value (gradient lookup that found nothing).
    None,
    /// Rendered text.
    Text(String),
    /// Identity hash.
    Hash(u64),
    /// A shape.
    Shape(ShapeDescriptor),
    /// An element type.
    DType(TypeDescriptor),
    /// A count.
    Len(usize),
    /// A device location.
    Device(DeviceLocation),
    /// Gradients from a backward pass.
    Gradients(Gradients),
}

impl CallResult {
    /// The wrapper, if this result is one.
    #[must_use]
    pub fn into_tensor(self) -> Option<HostTensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

const ENTRIES: &[(&str, Operation)] = &[
    // arithmetic
    ("__add__", Operation::Binary(BinaryOp::Add)),
    ("__iadd__", Operation::Binary(BinaryOp::Add)),
    ("add", Operation::Binary(BinaryOp::Add)),
    ("__sub__", Operation::Binary(BinaryOp::Sub)),
    ("__isub__", Operation::Binary(BinaryOp::Sub)),
    ("sub", Operation::Binary(BinaryOp::Sub)),
    ("__mul__", Operation::Binary(BinaryOp::Mul)),
    ("__imul__", Operation::Binary(BinaryOp::Mul)),
    ("mul", Operation::Binary(BinaryOp::Mul)),
    ("multiply", Operation::Binary(BinaryOp::Mul)),
    ("__truediv__", Operation::Binary(BinaryOp::Div)),
    ("__itruediv__", Operation::Binary(BinaryOp::Div)),
    ("div", Operation::Binary(BinaryOp::Div)),
    ("divide", Operation::Binary(BinaryOp::Div)),
    ("__pow__", Operation::Binary(BinaryOp::Pow)),
    ("__ipow__", Operation::Binary(BinaryOp::Pow)),
    ("pow", Operation::Binary(BinaryOp::Pow)),
    ("power", Operation::Binary(BinaryOp::Pow)),
    // comparison
    ("__eq__", Operation::Compare(CompareOp::Eq)),
    ("eq", Operation::Compare(CompareOp::Eq)),
    ("__ne__", Operation::Compare(CompareOp::Ne)),
    ("ne", Operation::Compare(CompareOp::Ne)),
    ("__ge__", Operation::Compare(CompareOp::Ge)),
    ("ge", Operation::Compare(CompareOp::Ge)),
    ("__le__", Operation::Compare(CompareOp::Le)),
    ("le", Operation::Compare(CompareOp::Le)),
    ("__gt__", Operation::Compare(CompareOp::Gt)),
    ("gt", Operation::Compare(CompareOp::Gt)),
    ("__lt__", Operation::Compare(CompareOp::Lt)),
    ("lt", Operation::Compare(CompareOp::Lt)),
    // unary
    ("__pos__", Operation::Unary(UnaryOp::Pos)),
    ("__neg__", Operation::Unary(UnaryOp::Neg)),
    ("neg", Operation::Unary(UnaryOp::Neg)),
    ("__abs__", Operation::Unary(UnaryOp::Abs)),
    ("abs", Operation::Unary(UnaryOp::Abs)),
    ("sin", Operation::Unary(UnaryOp::Sin)),
    ("cos", Operation::Unary(UnaryOp::Cos)),
    ("tan", Operation::Unary(UnaryOp::Tan)),
    ("sinh", Operation::Unary(UnaryOp::Sinh)),
    ("cosh", Operation::Unary(UnaryOp::Cosh)),
    ("tanh", Operation::Unary(UnaryOp::Tanh)),
    ("log", Operation::Unary(UnaryOp::Log)),
    // structural
    ("__matmul__", Operation::MatMul),
    ("__imatmul__", Operation::MatMul),
    ("matmul", Operation::MatMul),
    ("transpose", Operation::Transpose),
    ("clone", Operation::Clone),
    ("__copy__", Operation::Clone),
    ("cast", Operation::Cast),
    ("to_device", Operation::ToDevice),
    ("calc_grad", Operation::CalcGrad),
    ("get_grad", Operation::GetGrad),
    ("__getitem__", Operation::Index),
    ("__hash__", Operation::Hash),
    ("__repr__", Operation::Repr),
    ("__str__", Operation::Repr),
    // accessors
    ("shape", Operation::Shape),
    ("dtype", Operation::DType),
    ("__len__", Operation::Len),
    ("numel", Operation::Numel),
    ("device", Operation::Device),
];

/// Fixed mapping from host-visible names to operations.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: HashMap<&'static str, Operation>,
}

impl DispatchTable {
    /// The full table of operator and method names.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            entries: ENTRIES.iter().copied().collect(),
        }
    }

    /// Look up `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownOperation`] if the name is not registered.
    pub fn lookup(&self, name: &str) -> Result<Operation> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::UnknownOperation {
                name: name.to_string(),
            })
    }

    /// `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no names are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Invoke `name` on `receiver`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownOperation`] for an unregistered name
    /// - [`BridgeError::InvalidArgument`] if `args` has the wrong form
    /// - [`BridgeError::UseAfterRelease`] if `receiver` or an operand is released
    /// - whatever the operation itself raises
    pub fn call(
        &self,
        name: &str,
        receiver: &HostTensor,
        args: CallArgs<'_>,
    ) -> Result<CallResult> {
        let op = self.lookup(name)?;
        tracing::trace!(name, ?op, "dispatch");
        execute(name, op, receiver, args)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn execute(
    name: &str,
    op: Operation,
    receiver: &HostTensor,
    args: CallArgs<'_>,
) -> Result<CallResult> {
    let invalid = |expected: &str| BridgeError::invalid_argument(name, expected);
    let no_args = || match args {
        CallArgs::None => Ok(()),
        _ => Err(invalid("no arguments")),
    };

    match op {
        Operation::Binary(op) => match args {
            CallArgs::Tensor(rhs) => receiver.binary(op, rhs).map(CallResult::Tensor),
            _ => Err(invalid("a tensor operand")),
        },
        Operation::Compare(op) => match args {
            CallArgs::Tensor(rhs) => receiver.compare(op, rhs).map(CallResult::Tensor),
            _ => Err(invalid("a tensor operand")),
        },
        Operation::MatMul => match args {
            CallArgs::Tensor(rhs) => receiver.matmul(rhs).map(CallResult::Tensor),
            _ => Err(invalid("a tensor operand")),
        },
        Operation::Transpose => match args {
            CallArgs::Axes(d0, d1) => receiver.transpose(d0, d1).map(CallResult::Tensor),
            _ => Err(invalid("two axes")),
        },
        Operation::Cast => match args {
            CallArgs::DType(dtype) => receiver.cast(dtype).map(CallResult::Tensor),
            _ => Err(invalid("a dtype")),
        },
        Operation::ToDevice => match args {
            CallArgs::Device(location) => receiver.to_device(location).map(CallResult::Tensor),
            _ => Err(invalid("a device")),
        },
        Operation::Index => match args {
            CallArgs::Index(selectors) => receiver.index(selectors).map(CallResult::Tensor),
            _ => Err(invalid("index selectors")),
        },
        Operation::GetGrad => match args {
            CallArgs::Gradients(grads) => Ok(receiver
                .get_grad(grads)?
                .map_or(CallResult::None, CallResult::Tensor)),
            _ => Err(invalid("gradients")),
        },
        Operation::Unary(op) => {
            no_args()?;
            receiver.unary(op).map(CallResult::Tensor)
        }
        Operation::Clone => {
            no_args()?;
            receiver.try_clone().map(CallResult::Tensor)
        }
        Operation::CalcGrad => {
            no_args()?;
            receiver.calc_grad().map(CallResult::Gradients)
        }
        Operation::Hash => {
            no_args()?;
            receiver.hash_value().map(CallResult::Hash)
        }
        Operation::Repr => {
            no_args()?;
            receiver.repr().map(CallResult::Text)
        }
        Operation::Shape => {
            no_args()?;
            receiver.shape().map(CallResult::Shape)
        }
        Operation::DType => {
            no_args()?;
            receiver.dtype().map(CallResult::DType)
        }
        Operation::Len => {
            no_args()?;
            receiver.len().map(CallResult::Len)
        }
        Operation::Numel => {
            no_args()?;
            receiver.numel().map(CallResult::Len)
        }
        Operation::Device => {
            no_args()?;
            receiver.device().map(CallResult::Device)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Bridge, BridgeConfig};

    fn setup() -> (Bridge, HostTensor) {
        let bridge = Bridge::init(BridgeConfig::new().with_cpu()).unwrap();
        let t = bridge
            .from_slice(&[1f32, 2., 3., 4., 5., 6.], &ShapeDescriptor::from([2, 3]))
            .unwrap();
        (bridge, t)
    }

    #[test]
    fn test_every_entry_is_resolvable() {
        let table = DispatchTable::standard();
        assert_eq!(table.len(), ENTRIES.len());
        for (name, op) in ENTRIES {
            assert_eq!(table.lookup(name).unwrap(), *op);
        }
    }

    #[test]
    fn test_unknown_name() {
        let (_bridge, t) = setup();
        assert!(matches!(
            t.call("__frobnicate__", CallArgs::None),
            Err(BridgeError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn test_inplace_returns_new_wrapper() {
        let (bridge, t) = setup();
        let out = t
            .call("__iadd__", CallArgs::Tensor(&t))
            .unwrap()
            .into_tensor()
            .unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![2., 4., 6., 8., 10., 12.]);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1., 2., 3., 4., 5., 6.]);
        assert_eq!(bridge.stats().live_handles, 2);
    }

    #[test]
    fn test_wrong_argument_form() {
        let (_bridge, t) = setup();
        assert!(matches!(
            t.call("__add__", CallArgs::None),
            Err(BridgeError::InvalidArgument { .. })
        ));
        assert!(matches!(
            t.call("sin", CallArgs::Axes(0, 1)),
            Err(BridgeError::InvalidArgument { .. })
        ));
        assert!(matches!(
            t.call("cast", CallArgs::Tensor(&t)),
            Err(BridgeError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_accessors_through_table() {
        let (_bridge, t) = setup();
        assert!(matches!(t.call("__len__", CallArgs::None).unwrap(), CallResult::Len(2)));
        assert!(matches!(
            t.call("dtype", CallArgs::None).unwrap(),
            CallResult::DType(TypeDescriptor::Float32)
        ));
        match t.call("shape", CallArgs::None).unwrap() {
            CallResult::Shape(shape) => assert_eq!(shape.dims(), &[2, 3]),
            other => panic!("unexpected {other:?}"),
        }
        match t.call("__repr__", CallArgs::None).unwrap() {
            CallResult::Text(text) => assert!(text.contains("dtype=FLOAT32")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_structural_through_table() {
        let (_bridge, t) = setup();
        let tt = t
            .call("transpose", CallArgs::Axes(0, 1))
            .unwrap()
            .into_tensor()
            .unwrap();
        assert_eq!(tt.shape().unwrap().dims(), &[3, 2]);

        let cast = t
            .call("cast", CallArgs::DType(TypeDescriptor::Int32))
            .unwrap()
            .into_tensor()
            .unwrap();
        assert_eq!(cast.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);

        let selectors = [AxisSelector::index(1), AxisSelector::range(1, 3)];
        let picked = t
            .call("__getitem__", CallArgs::Index(&selectors))
            .unwrap()
            .into_tensor()
            .unwrap();
        assert_eq!(picked.to_vec::<f32>().unwrap(), vec![5., 6.]);
    }

    #[test]
    fn test_gradients_through_table() {
        let (_bridge, t) = setup();
        let x = t.requires_grad().unwrap();
        let y = x.call("sin", CallArgs::None).unwrap().into_tensor().unwrap();
        let CallResult::Gradients(grads) = y.call("calc_grad", CallArgs::None).unwrap() else {
            panic!("expected gradients");
        };
        assert!(matches!(
            x.call("get_grad", CallArgs::Gradients(&grads)).unwrap(),
            CallResult::Tensor(_)
        ));
        assert!(matches!(
            t.call("get_grad", CallArgs::Gradients(&grads)).unwrap(),
            CallResult::None
        ));
    }

    #[test]
    fn test_hash_is_stable_per_handle() {
        let (_bridge, t) = setup();
        let CallResult::Hash(h1) = t.call("__hash__", CallArgs::None).unwrap() else {
            panic!("expected hash");
        };
        assert_eq!(h1, t.hash_value().unwrap());
    }
}
