// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Python bindings for tensor-bridge.
//!
//! Exposes [`Bridge`] and [`HostTensor`] as the `tensor_bridge` extension module.
//! Every Python operator on `Tensor` resolves through the bridge's
//! [`DispatchTable`](crate::DispatchTable), so the Rust and Python surfaces share one
//! list of operation names.
//!
//! # Python Usage
//!
//! ```python
//! import numpy as np
//! import tensor_bridge as tb
//!
//! bridge = tb.init(device="cpu")
//! t = bridge.tensor(np.arange(6, dtype=np.float32).reshape(2, 3))
//!
//! print(t[-1])              # tensor([3.0, 4.0, 5.0], dtype=FLOAT32)
//! print((t * 2.0).numpy())  # NumPy copy
//! ints = t.cast(tb.DataType.INT32)
//!
//! try:
//!     t[5]
//! except tb.IndexOutOfRangeError as e:
//!     print(e)
//! ```
//!
//! NumPy input is always copied into engine storage and `Tensor.numpy()` always
//! returns a fresh array.

#![allow(clippy::useless_conversion)] // PyO3 macro generates these
#![allow(clippy::missing_errors_doc)] // Python bindings - errors are documented in docstrings
#![allow(clippy::needless_pass_by_value)] // PyO3 requires owned types for Python arguments
#![allow(clippy::trivially_copy_pass_by_ref)] // #[pymethods] receivers

use std::collections::HashMap;
use std::str::FromStr;

use half::f16;
use numpy::{Element, PyArray, PyArrayMethods, PyReadonlyArrayDyn, PyUntypedArrayMethods};
use pyo3::basic::CompareOp as PyCompareOp;
use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyIndexError, PyValueError};
use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;
use pyo3::types::{PyDict, PyFloat, PyInt, PySlice, PyTuple, PyType};

use crate::bridge::{Bridge, BridgeConfig};
use crate::device::{DeviceConfig, DeviceLocation};
use crate::dispatch::{CallArgs, CallResult};
use crate::dtype::{HostElement, TypeDescriptor};
use crate::error::{BridgeError, ErrorKind};
use crate::grad::Gradients;
use crate::logging::{init_logging as rust_init_logging, LogConfig, LogLevel};
use crate::shape::ShapeDescriptor;
use crate::slice::{AxisSelector, SliceArg};
use crate::tensor::{condition as rust_condition, HostTensor};

// =============================================================================
// EXCEPTIONS
// =============================================================================

create_exception!(
    tensor_bridge,
    TensorBridgeError,
    PyException,
    "Base class of every error raised by tensor_bridge."
);
create_exception!(tensor_bridge, UnsupportedTypeError, TensorBridgeError);
create_exception!(tensor_bridge, ShapeOverflowError, TensorBridgeError);
create_exception!(tensor_bridge, ShapeMismatchError, TensorBridgeError);
create_exception!(tensor_bridge, InvalidSliceError, TensorBridgeError);
create_exception!(tensor_bridge, AllocationError, TensorBridgeError);
create_exception!(tensor_bridge, UseAfterReleaseError, TensorBridgeError);
create_exception!(tensor_bridge, EngineOperationError, TensorBridgeError);
create_exception!(tensor_bridge, DeviceNotAvailableError, TensorBridgeError);
create_exception!(tensor_bridge, InvalidConfigError, TensorBridgeError);
create_exception!(tensor_bridge, UnknownOperationError, TensorBridgeError);
create_exception!(tensor_bridge, InvalidArgumentError, TensorBridgeError);

/// `IndexOutOfRangeError(TensorBridgeError, IndexError)`.
///
/// `create_exception!` takes a single base, so the class is built with `type()`
/// on first use.
static INDEX_OUT_OF_RANGE_ERROR: GILOnceCell<Py<PyType>> = GILOnceCell::new();

fn index_out_of_range_error(py: Python<'_>) -> PyResult<&Bound<'_, PyType>> {
    INDEX_OUT_OF_RANGE_ERROR
        .get_or_try_init(py, || {
            let bases = PyTuple::new_bound(
                py,
                [
                    py.get_type_bound::<TensorBridgeError>(),
                    py.get_type_bound::<PyIndexError>(),
                ],
            );
            let namespace = PyDict::new_bound(py);
            namespace.set_item("__module__", "tensor_bridge")?;
            let class = py.get_type_bound::<PyType>().call1((
                "IndexOutOfRangeError",
                bases,
                namespace,
            ))?;
            Ok::<_, PyErr>(class.downcast_into::<PyType>()?.unbind())
        })
        .map(|class| class.bind(py))
}

/// Convert a bridge error into the matching Python exception.
pub fn to_py_err(err: BridgeError) -> PyErr {
    let msg = err.to_string();
    match err.kind() {
        ErrorKind::UnsupportedType => UnsupportedTypeError::new_err(msg),
        ErrorKind::ShapeOverflow => ShapeOverflowError::new_err(msg),
        ErrorKind::ShapeMismatch => ShapeMismatchError::new_err(msg),
        ErrorKind::InvalidSlice => InvalidSliceError::new_err(msg),
        ErrorKind::IndexOutOfRange => Python::with_gil(|py| match index_out_of_range_error(py) {
            Ok(class) => PyErr::from_type_bound(class.clone(), msg),
            Err(e) => e,
        }),
        ErrorKind::Allocation => AllocationError::new_err(msg),
        ErrorKind::UseAfterRelease => UseAfterReleaseError::new_err(msg),
        ErrorKind::EngineOperation => EngineOperationError::new_err(msg),
        ErrorKind::DeviceNotAvailable => DeviceNotAvailableError::new_err(msg),
        ErrorKind::InvalidConfig => InvalidConfigError::new_err(msg),
        ErrorKind::UnknownOperation => UnknownOperationError::new_err(msg),
        ErrorKind::InvalidArgument => InvalidArgumentError::new_err(msg),
    }
}

// =============================================================================
// DATA TYPES
// =============================================================================

/// Element type tag.
///
/// # Example
/// ```python
/// t.cast(DataType.INT32)
/// assert t.dtype == DataType.FLOAT32
/// ```
#[pyclass(name = "DataType", module = "tensor_bridge", eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms, missing_docs)]
pub enum PyDataType {
    BOOL,
    INT8,
    INT16,
    INT32,
    INT64,
    UINT8,
    UINT16,
    UINT32,
    UINT64,
    FLOAT16,
    BFLOAT16,
    FLOAT32,
    FLOAT64,
}

#[pymethods]
impl PyDataType {
    /// Size of one element in bytes.
    #[getter]
    fn itemsize(&self) -> usize {
        TypeDescriptor::from(*self).size_in_bytes()
    }

    /// `True` if tensors of this type can be constructed.
    #[getter]
    fn supported(&self) -> bool {
        TypeDescriptor::from(*self).is_engine_supported()
    }

    fn __str__(&self) -> &'static str {
        TypeDescriptor::from(*self).name()
    }
}

impl From<PyDataType> for TypeDescriptor {
    fn from(value: PyDataType) -> Self {
        match value {
            PyDataType::BOOL => Self::Bool,
            PyDataType::INT8 => Self::Int8,
            PyDataType::INT16 => Self::Int16,
            PyDataType::INT32 => Self::Int32,
            PyDataType::INT64 => Self::Int64,
            PyDataType::UINT8 => Self::UInt8,
            PyDataType::UINT16 => Self::UInt16,
            PyDataType::UINT32 => Self::UInt32,
            PyDataType::UINT64 => Self::UInt64,
            PyDataType::FLOAT16 => Self::Float16,
            PyDataType::BFLOAT16 => Self::BFloat16,
            PyDataType::FLOAT32 => Self::Float32,
            PyDataType::FLOAT64 => Self::Float64,
        }
    }
}

impl From<TypeDescriptor> for PyDataType {
    fn from(value: TypeDescriptor) -> Self {
        match value {
            TypeDescriptor::Bool => Self::BOOL,
            TypeDescriptor::Int8 => Self::INT8,
            TypeDescriptor::Int16 => Self::INT16,
            TypeDescriptor::Int32 => Self::INT32,
            TypeDescriptor::Int64 => Self::INT64,
            TypeDescriptor::UInt8 => Self::UINT8,
            TypeDescriptor::UInt16 => Self::UINT16,
            TypeDescriptor::UInt32 => Self::UINT32,
            TypeDescriptor::UInt64 => Self::UINT64,
            TypeDescriptor::Float16 => Self::FLOAT16,
            TypeDescriptor::BFloat16 => Self::BFLOAT16,
            TypeDescriptor::Float32 => Self::FLOAT32,
            TypeDescriptor::Float64 => Self::FLOAT64,
        }
    }
}

// =============================================================================
// BRIDGE
// =============================================================================

/// Initialized bridge: default device, handle accounting and tensor factories.
///
/// Create one with `tensor_bridge.init()`.
#[pyclass(name = "Bridge", module = "tensor_bridge")]
#[derive(Clone)]
pub struct PyBridge {
    inner: Bridge,
}

#[pymethods]
impl PyBridge {
    /// Copy a NumPy array (or anything `numpy.asarray` accepts) into a tensor.
    fn tensor(&self, py: Python<'_>, array: &Bound<'_, PyAny>) -> PyResult<PyTensor> {
        let inner = ingest_array(py, &self.inner, array)?;
        Ok(PyTensor::new_from(&self.inner, inner))
    }

    /// Zero-filled tensor.
    ///
    /// # Arguments
    /// * `shape` - Dimensions
    /// * `dtype` - Element type (default: the bridge's configured default)
    #[pyo3(signature = (shape, dtype=None))]
    fn zeros(&self, shape: Vec<usize>, dtype: Option<PyDataType>) -> PyResult<PyTensor> {
        let dtype = self.inner.dtype_or_default(dtype.map(Into::into));
        let inner = self
            .inner
            .zeros(&ShapeDescriptor::new(shape), dtype)
            .map_err(to_py_err)?;
        Ok(PyTensor::new_from(&self.inner, inner))
    }

    /// Random tensor: floats uniform in `[0, 1)`, integers over their full range.
    ///
    /// # Arguments
    /// * `shape` - Dimensions
    /// * `dtype` - Element type (default: the bridge's configured default)
    /// * `seed` - Fixed seed for reproducible output (default: random)
    #[pyo3(signature = (shape, dtype=None, seed=None))]
    fn rand(
        &self,
        shape: Vec<usize>,
        dtype: Option<PyDataType>,
        seed: Option<u64>,
    ) -> PyResult<PyTensor> {
        let dtype = self.inner.dtype_or_default(dtype.map(Into::into));
        let inner = self
            .inner
            .rand(&ShapeDescriptor::new(shape), dtype, seed)
            .map_err(to_py_err)?;
        Ok(PyTensor::new_from(&self.inner, inner))
    }

    /// Default device, e.g. `"cpu"` or `"cuda:0"`.
    #[getter]
    fn device(&self) -> String {
        self.inner.location().to_string()
    }

    /// Handle accounting snapshot.
    ///
    /// # Returns
    /// Dictionary with `live_handles`, `live_bytes`, `peak_bytes`, `allocations`,
    /// `releases` and `limit_bytes`.
    fn stats(&self) -> HashMap<&'static str, usize> {
        let stats = self.inner.stats();
        HashMap::from([
            ("live_handles", stats.live_handles),
            ("live_bytes", stats.live_bytes),
            ("peak_bytes", stats.peak_bytes),
            ("allocations", stats.allocations),
            ("releases", stats.releases),
            ("limit_bytes", stats.limit_bytes),
        ])
    }

    /// Every operation name `Tensor` dispatches on.
    fn operations(&self) -> Vec<&'static str> {
        self.inner.dispatch_table().names()
    }

    fn __repr__(&self) -> String {
        let stats = self.inner.stats();
        format!(
            "Bridge(device={}, live_handles={})",
            self.inner.location(),
            stats.live_handles
        )
    }
}

// =============================================================================
// TENSOR
// =============================================================================

/// Gradients produced by `Tensor.calc_grad()`.
#[pyclass(name = "Gradients", module = "tensor_bridge")]
pub struct PyGradients {
    inner: Gradients,
}

/// Host wrapper around one engine tensor.
///
/// # Example
/// ```python
/// t = tensor_bridge.Tensor(bridge, np.ones((2, 3), dtype=np.float32))
/// u = t + t
/// t.release()
/// ```
#[pyclass(name = "Tensor", module = "tensor_bridge")]
pub struct PyTensor {
    inner: HostTensor,
    bridge: Bridge,
}

impl PyTensor {
    fn new_from(bridge: &Bridge, inner: HostTensor) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    fn wrap(&self, inner: HostTensor) -> Self {
        Self::new_from(&self.bridge, inner)
    }

    fn call(&self, name: &str, args: CallArgs<'_>) -> PyResult<CallResult> {
        self.inner.call(name, args).map_err(to_py_err)
    }

    fn call_tensor(&self, name: &str, args: CallArgs<'_>) -> PyResult<Self> {
        match self.call(name, args)? {
            CallResult::Tensor(t) => Ok(self.wrap(t)),
            _ => Err(to_py_err(BridgeError::invalid_argument(
                name,
                "an operation returning a tensor",
            ))),
        }
    }

    /// Run a binary operation against another tensor or a Python number.
    fn call_binary(&self, name: &str, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        if let Ok(rhs) = other.downcast::<PyTensor>() {
            let rhs = rhs.borrow();
            return self.call_tensor(name, CallArgs::Tensor(&rhs.inner));
        }
        let rhs = self.scalar_like(other)?;
        self.call_tensor(name, CallArgs::Tensor(&rhs))
    }

    /// Rank-0 tensor holding `value`, cast to this tensor's type.
    ///
    /// Python ints start as `INT32` and floats as `FLOAT32`.
    fn scalar_like(&self, value: &Bound<'_, PyAny>) -> PyResult<HostTensor> {
        let scalar = if value.is_instance_of::<PyInt>() {
            self.bridge.scalar(value.extract::<i32>()?)
        } else if value.is_instance_of::<PyFloat>() {
            self.bridge.scalar(value.extract::<f32>()?)
        } else {
            return Err(to_py_err(BridgeError::invalid_argument(
                "operand",
                format!("a Tensor, int or float, got {}", value.get_type().name()?),
            )));
        }
        .map_err(to_py_err)?;

        let dtype = self.inner.dtype().map_err(to_py_err)?;
        if scalar.dtype().map_err(to_py_err)? == dtype {
            Ok(scalar)
        } else {
            scalar.cast(dtype).map_err(to_py_err)
        }
    }

    /// `scalar <op> self` for the reflected operators.
    fn call_reflected(&self, name: &str, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        let lhs = self.scalar_like(other)?;
        let out = lhs
            .call(name, CallArgs::Tensor(&self.inner))
            .map_err(to_py_err)?;
        match out {
            CallResult::Tensor(t) => Ok(self.wrap(t)),
            _ => Err(to_py_err(BridgeError::invalid_argument(
                name,
                "an operation returning a tensor",
            ))),
        }
    }

    /// In-place operators rebind the wrapper to the new handle; the old one is released.
    fn call_inplace(&mut self, name: &str, other: &Bound<'_, PyAny>) -> PyResult<()> {
        let out = self.call_binary(name, other)?;
        self.inner = out.inner;
        Ok(())
    }
}

#[pymethods]
impl PyTensor {
    /// Copy `array` into a new tensor on the bridge's default device.
    #[new]
    fn py_new(py: Python<'_>, bridge: &PyBridge, array: &Bound<'_, PyAny>) -> PyResult<Self> {
        let inner = ingest_array(py, &bridge.inner, array)?;
        Ok(Self::new_from(&bridge.inner, inner))
    }

    // ----- arithmetic -----

    fn __add__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_binary("__add__", other)
    }

    fn __sub__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_binary("__sub__", other)
    }

    fn __mul__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_binary("__mul__", other)
    }

    fn __truediv__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_binary("__truediv__", other)
    }

    fn __pow__(
        &self,
        other: &Bound<'_, PyAny>,
        _modulo: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Self> {
        self.call_binary("__pow__", other)
    }

    fn __matmul__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_binary("__matmul__", other)
    }

    fn __radd__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_reflected("__add__", other)
    }

    fn __rsub__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_reflected("__sub__", other)
    }

    fn __rmul__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_reflected("__mul__", other)
    }

    fn __rtruediv__(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_reflected("__truediv__", other)
    }

    fn __rpow__(
        &self,
        other: &Bound<'_, PyAny>,
        _modulo: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Self> {
        self.call_reflected("__pow__", other)
    }

    fn __iadd__(&mut self, other: &Bound<'_, PyAny>) -> PyResult<()> {
        self.call_inplace("__iadd__", other)
    }

    fn __isub__(&mut self, other: &Bound<'_, PyAny>) -> PyResult<()> {
        self.call_inplace("__isub__", other)
    }

    fn __imul__(&mut self, other: &Bound<'_, PyAny>) -> PyResult<()> {
        self.call_inplace("__imul__", other)
    }

    fn __itruediv__(&mut self, other: &Bound<'_, PyAny>) -> PyResult<()> {
        self.call_inplace("__itruediv__", other)
    }

    fn __ipow__(
        &mut self,
        other: &Bound<'_, PyAny>,
        _modulo: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<()> {
        self.call_inplace("__ipow__", other)
    }

    fn __imatmul__(&mut self, other: &Bound<'_, PyAny>) -> PyResult<()> {
        self.call_inplace("__imatmul__", other)
    }

    /// Elementwise comparison; returns a `UINT8` mask.
    fn __richcmp__(&self, other: &Bound<'_, PyAny>, op: PyCompareOp) -> PyResult<Self> {
        let name = match op {
            PyCompareOp::Eq => "__eq__",
            PyCompareOp::Ne => "__ne__",
            PyCompareOp::Ge => "__ge__",
            PyCompareOp::Le => "__le__",
            PyCompareOp::Gt => "__gt__",
            PyCompareOp::Lt => "__lt__",
        };
        self.call_binary(name, other)
    }

    // ----- unary -----

    fn __pos__(&self) -> PyResult<Self> {
        self.call_tensor("__pos__", CallArgs::None)
    }

    fn __neg__(&self) -> PyResult<Self> {
        self.call_tensor("__neg__", CallArgs::None)
    }

    fn __abs__(&self) -> PyResult<Self> {
        self.call_tensor("__abs__", CallArgs::None)
    }

    fn abs(&self) -> PyResult<Self> {
        self.call_tensor("abs", CallArgs::None)
    }

    fn sin(&self) -> PyResult<Self> {
        self.call_tensor("sin", CallArgs::None)
    }

    fn cos(&self) -> PyResult<Self> {
        self.call_tensor("cos", CallArgs::None)
    }

    fn tan(&self) -> PyResult<Self> {
        self.call_tensor("tan", CallArgs::None)
    }

    fn sinh(&self) -> PyResult<Self> {
        self.call_tensor("sinh", CallArgs::None)
    }

    fn cosh(&self) -> PyResult<Self> {
        self.call_tensor("cosh", CallArgs::None)
    }

    fn tanh(&self) -> PyResult<Self> {
        self.call_tensor("tanh", CallArgs::None)
    }

    fn log(&self) -> PyResult<Self> {
        self.call_tensor("log", CallArgs::None)
    }

    // ----- structural -----

    fn matmul(&self, other: &Bound<'_, PyAny>) -> PyResult<Self> {
        self.call_binary("matmul", other)
    }

    /// Swap two axes.
    #[pyo3(signature = (dim0=0, dim1=1))]
    fn transpose(&self, dim0: usize, dim1: usize) -> PyResult<Self> {
        self.call_tensor("transpose", CallArgs::Axes(dim0, dim1))
    }

    /// Deep copy into a new handle.
    #[pyo3(name = "clone")]
    fn clone_tensor(&self) -> PyResult<Self> {
        self.call_tensor("clone", CallArgs::None)
    }

    fn __copy__(&self) -> PyResult<Self> {
        self.call_tensor("__copy__", CallArgs::None)
    }

    /// Convert to another element type. The receiver is unchanged.
    fn cast(&self, dtype: PyDataType) -> PyResult<Self> {
        self.call_tensor("cast", CallArgs::DType(dtype.into()))
    }

    /// Copy to another device, e.g. `"cpu"`, `"cuda:0"`.
    fn to(&self, device: &str) -> PyResult<Self> {
        let location = DeviceLocation::from_str(device).map_err(to_py_err)?;
        self.call_tensor("to_device", CallArgs::Device(location))
    }

    /// Backward pass from this tensor.
    fn calc_grad(&self) -> PyResult<PyGradients> {
        match self.call("calc_grad", CallArgs::None)? {
            CallResult::Gradients(inner) => Ok(PyGradients { inner }),
            _ => Err(to_py_err(BridgeError::invalid_argument(
                "calc_grad",
                "an operation returning gradients",
            ))),
        }
    }

    /// Gradient of this tensor in `grads`, or `None`.
    fn get_grad(&self, grads: &PyGradients) -> PyResult<Option<Self>> {
        match self.call("get_grad", CallArgs::Gradients(&grads.inner))? {
            CallResult::Tensor(t) => Ok(Some(self.wrap(t))),
            _ => Ok(None),
        }
    }

    /// Index with an int, a slice or a tuple of those.
    fn __getitem__(&self, key: &Bound<'_, PyAny>) -> PyResult<Self> {
        let selectors = if let Ok(tuple) = key.downcast::<PyTuple>() {
            tuple
                .iter()
                .map(|item| parse_selector(&item))
                .collect::<PyResult<Vec<_>>>()?
        } else {
            vec![parse_selector(key)?]
        };
        self.call_tensor("__getitem__", CallArgs::Index(&selectors))
    }

    /// Identity of the underlying handle.
    fn __hash__(&self) -> PyResult<u64> {
        match self.call("__hash__", CallArgs::None)? {
            CallResult::Hash(h) => Ok(h),
            _ => Err(to_py_err(BridgeError::invalid_argument(
                "__hash__",
                "an operation returning a hash",
            ))),
        }
    }

    fn __repr__(&self) -> PyResult<String> {
        self.text("__repr__")
    }

    fn __str__(&self) -> PyResult<String> {
        self.text("__str__")
    }

    fn __len__(&self) -> PyResult<usize> {
        match self.call("__len__", CallArgs::None)? {
            CallResult::Len(n) => Ok(n),
            _ => Err(PyValueError::new_err("__len__ returned no length")),
        }
    }

    // ----- accessors -----

    #[getter]
    fn shape(&self) -> PyResult<Vec<usize>> {
        self.inner
            .shape()
            .map(|s| s.dims().to_vec())
            .map_err(to_py_err)
    }

    #[getter]
    fn dtype(&self) -> PyResult<PyDataType> {
        self.inner.dtype().map(PyDataType::from).map_err(to_py_err)
    }

    #[getter]
    fn device(&self) -> PyResult<String> {
        self.inner
            .device()
            .map(|d| d.to_string())
            .map_err(to_py_err)
    }

    fn numel(&self) -> PyResult<usize> {
        self.inner.numel().map_err(to_py_err)
    }

    /// `False` once `release()` has been called.
    #[getter]
    fn is_allocated(&self) -> bool {
        self.inner.is_allocated()
    }

    /// Release the engine handle now. A second call raises `UseAfterReleaseError`.
    fn release(&mut self) -> PyResult<()> {
        self.inner.release().map_err(to_py_err)
    }

    /// Copy into a new NumPy array.
    fn numpy<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        match self.inner.dtype().map_err(to_py_err)? {
            TypeDescriptor::Float16 => export_array::<f16>(py, &self.inner),
            TypeDescriptor::Float32 => export_array::<f32>(py, &self.inner),
            TypeDescriptor::Float64 => export_array::<f64>(py, &self.inner),
            TypeDescriptor::Int16 => export_array::<i16>(py, &self.inner),
            TypeDescriptor::Int32 => export_array::<i32>(py, &self.inner),
            TypeDescriptor::Int64 => export_array::<i64>(py, &self.inner),
            TypeDescriptor::UInt8 => export_array::<u8>(py, &self.inner),
            TypeDescriptor::UInt32 => export_array::<u32>(py, &self.inner),
            other => Err(to_py_err(BridgeError::unsupported_type(format!(
                "{other} has no NumPy counterpart"
            )))),
        }
    }
}

impl PyTensor {
    fn text(&self, name: &str) -> PyResult<String> {
        match self.call(name, CallArgs::None)? {
            CallResult::Text(s) => Ok(s),
            _ => Err(to_py_err(BridgeError::invalid_argument(
                name,
                "an operation returning text",
            ))),
        }
    }
}

// =============================================================================
// MARSHALLING HELPERS
// =============================================================================

fn parse_selector(item: &Bound<'_, PyAny>) -> PyResult<AxisSelector> {
    if let Ok(slice) = item.downcast::<PySlice>() {
        let bound = |attr: &str| -> PyResult<Option<isize>> { slice.getattr(attr)?.extract() };
        return Ok(AxisSelector::Slice(SliceArg::new(
            bound("start")?,
            bound("stop")?,
            bound("step")?,
        )));
    }
    item.extract::<isize>().map(AxisSelector::Index).map_err(|_| {
        to_py_err(BridgeError::invalid_argument(
            "__getitem__",
            "int, slice or a tuple of those",
        ))
    })
}

fn ingest_typed<T: HostElement + Element>(
    bridge: &Bridge,
    array: &PyReadonlyArrayDyn<'_, T>,
) -> PyResult<HostTensor> {
    let shape = ShapeDescriptor::from(array.shape());
    let result = match array.as_slice() {
        Ok(data) => bridge.from_slice(data, &shape),
        // Non-contiguous input is gathered in logical order first.
        Err(_) => {
            let data: Vec<T> = array.as_array().iter().copied().collect();
            bridge.from_slice(&data, &shape)
        }
    };
    result.map_err(to_py_err)
}

fn ingest_array(py: Python<'_>, bridge: &Bridge, obj: &Bound<'_, PyAny>) -> PyResult<HostTensor> {
    let array = py.import_bound("numpy")?.call_method1("asarray", (obj,))?;

    macro_rules! try_ingest {
        ($($ty:ty),+ $(,)?) => {
            $(
                if let Ok(typed) = array.extract::<PyReadonlyArrayDyn<'_, $ty>>() {
                    return ingest_typed(bridge, &typed);
                }
            )+
        };
    }
    try_ingest!(f32, f64, f16, i16, i32, i64, u8, u32);

    let name: String = array.getattr("dtype")?.str()?.extract()?;
    let err = match TypeDescriptor::from_str(&name) {
        Ok(tag) => BridgeError::unsupported_type(format!("{tag} has no engine storage")),
        Err(e) => e,
    };
    Err(to_py_err(err))
}

fn export_array<'py, T: HostElement + Element>(
    py: Python<'py>,
    tensor: &HostTensor,
) -> PyResult<Bound<'py, PyAny>> {
    let dims = tensor.shape().map_err(to_py_err)?.dims().to_vec();
    let data = tensor.to_vec::<T>().map_err(to_py_err)?;
    let array = PyArray::from_vec_bound(py, data).reshape(dims)?;
    Ok(array.into_any())
}

fn unwrap_tensor(owner: &PyTensor, name: &str, result: CallResult) -> PyResult<PyTensor> {
    match result {
        CallResult::Tensor(t) => Ok(owner.wrap(t)),
        _ => Err(to_py_err(BridgeError::invalid_argument(
            name,
            "an operation returning a tensor",
        ))),
    }
}

// =============================================================================
// MODULE FUNCTIONS
// =============================================================================

/// Initialize the bridge.
///
/// Starts from the `TENSOR_BRIDGE_*` environment variables; explicit
/// arguments override them.
///
/// # Arguments
/// * `device` - `"cpu"`, `"cuda:N"` or `"metal:N"` (default: environment, else cpu)
/// * `memory_limit` - Byte limit over live handles, 0 for none (default: environment)
/// * `track_gradients` - Make new float tensors gradient-tracked (default: `False`)
///
/// # Example
/// ```python
/// bridge = init(device="cuda:0")   # falls back to cpu with a warning
/// ```
#[pyfunction]
#[pyo3(signature = (device=None, memory_limit=None, track_gradients=false))]
fn init(
    device: Option<&str>,
    memory_limit: Option<usize>,
    track_gradients: bool,
) -> PyResult<PyBridge> {
    let mut config = BridgeConfig::from_env().with_track_gradients(track_gradients);
    if let Some(device) = device {
        let location = DeviceLocation::from_str(device).map_err(to_py_err)?;
        config = config.with_device(DeviceConfig::new().with_location(location));
    }
    if let Some(limit) = memory_limit {
        config = config.with_memory_limit(limit);
    }
    let inner = Bridge::init(config).map_err(to_py_err)?;
    Ok(PyBridge { inner })
}

/// `a + b`.
#[pyfunction]
fn add(a: &PyTensor, b: &Bound<'_, PyAny>) -> PyResult<PyTensor> {
    a.call_binary("add", b)
}

/// `a * b`.
#[pyfunction]
fn multiply(a: &PyTensor, b: &Bound<'_, PyAny>) -> PyResult<PyTensor> {
    a.call_binary("multiply", b)
}

/// `a / b`.
#[pyfunction]
fn divide(a: &PyTensor, b: &Bound<'_, PyAny>) -> PyResult<PyTensor> {
    a.call_binary("divide", b)
}

/// `a ** b`.
#[pyfunction]
fn power(a: &PyTensor, b: &Bound<'_, PyAny>) -> PyResult<PyTensor> {
    a.call_binary("power", b)
}

/// Matrix product with broadcasting over leading axes.
#[pyfunction]
fn matmul(a: &PyTensor, b: &PyTensor) -> PyResult<PyTensor> {
    let out = a
        .inner
        .call("matmul", CallArgs::Tensor(&b.inner))
        .map_err(to_py_err)?;
    unwrap_tensor(a, "matmul", out)
}

/// `on_true` where `mask` is non-zero, `on_false` elsewhere.
#[pyfunction]
fn condition(mask: &PyTensor, on_true: &PyTensor, on_false: &PyTensor) -> PyResult<PyTensor> {
    let out = rust_condition(&mask.inner, &on_true.inner, &on_false.inner).map_err(to_py_err)?;
    Ok(on_true.wrap(out))
}

/// Initialize logging.
///
/// # Arguments
/// * `level` - Log level: "trace", "debug", "info", "warn", "error" (default: "info")
/// * `timestamps` - Include timestamps (default: `True`)
/// * `ansi` - Use ANSI colors (default: `True`)
#[pyfunction]
#[pyo3(signature = (level="info", timestamps=true, ansi=true))]
fn init_logging(level: &str, timestamps: bool, ansi: bool) -> PyResult<()> {
    let level = LogLevel::from_str(level).map_err(to_py_err)?;
    let config = LogConfig::new()
        .with_level(level)
        .with_timestamps(timestamps)
        .with_ansi(ansi);
    rust_init_logging(&config);
    Ok(())
}

/// Get tensor-bridge version.
#[pyfunction]
fn version() -> &'static str {
    crate::VERSION
}

/// Element types tensors can be constructed with.
#[pyfunction]
fn supported_dtypes() -> Vec<PyDataType> {
    crate::dtype::supported_types()
        .into_iter()
        .map(PyDataType::from)
        .collect()
}

// =============================================================================
// PYTHON MODULE DEFINITION
// =============================================================================

/// Python module for tensor-bridge.
#[pymodule]
#[pyo3(name = "tensor_bridge")]
pub fn tensor_bridge_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();

    // Classes
    m.add_class::<PyDataType>()?;
    m.add_class::<PyBridge>()?;
    m.add_class::<PyTensor>()?;
    m.add_class::<PyGradients>()?;

    // Exceptions
    m.add("TensorBridgeError", py.get_type_bound::<TensorBridgeError>())?;
    m.add("UnsupportedTypeError", py.get_type_bound::<UnsupportedTypeError>())?;
    m.add("ShapeOverflowError", py.get_type_bound::<ShapeOverflowError>())?;
    m.add("ShapeMismatchError", py.get_type_bound::<ShapeMismatchError>())?;
    m.add("InvalidSliceError", py.get_type_bound::<InvalidSliceError>())?;
    m.add("IndexOutOfRangeError", index_out_of_range_error(py)?.clone())?;
    m.add("AllocationError", py.get_type_bound::<AllocationError>())?;
    m.add("UseAfterReleaseError", py.get_type_bound::<UseAfterReleaseError>())?;
    m.add("EngineOperationError", py.get_type_bound::<EngineOperationError>())?;
    m.add(
        "DeviceNotAvailableError",
        py.get_type_bound::<DeviceNotAvailableError>(),
    )?;
    m.add("InvalidConfigError", py.get_type_bound::<InvalidConfigError>())?;
    m.add("UnknownOperationError", py.get_type_bound::<UnknownOperationError>())?;
    m.add("InvalidArgumentError", py.get_type_bound::<InvalidArgumentError>())?;

    // Functions
    m.add_function(wrap_pyfunction!(init, m)?)?;
    m.add_function(wrap_pyfunction!(add, m)?)?;
    m.add_function(wrap_pyfunction!(multiply, m)?)?;
    m.add_function(wrap_pyfunction!(divide, m)?)?;
    m.add_function(wrap_pyfunction!(power, m)?)?;
    m.add_function(wrap_pyfunction!(matmul, m)?)?;
    m.add_function(wrap_pyfunction!(condition, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(supported_dtypes, m)?)?;

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
