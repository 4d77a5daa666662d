// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Host buffer ingest and export.
//!
//! Ingest always copies: the engine tensor never aliases host memory, so the host
//! may free or reuse its buffer as soon as the call returns.
//!
//! Export avoids copies when it can:
//!
//! | Handle                        | Result              | Copies |
//! |-------------------------------|---------------------|--------|
//! | `Cpu:0`, contiguous           | [`Exported::View`]  | 0      |
//! | `Cpu:0`, strided              | [`Exported::Owned`] | 1      |
//! | device-resident               | [`Exported::Owned`] | 1 transfer |
//!
//! A view holds the engine's storage read lock and borrows the tensor, so it
//! cannot outlive the handle it was taken from.

use std::sync::RwLockReadGuard;

use candle_core::{CpuStorage, Device, Storage, Tensor};

use crate::dtype::{host_tag_to_native, native_token_to_host_tag, HostElement, TypeDescriptor};
use crate::error::{BridgeError, EngineResultExt, Result};
use crate::shape::ShapeDescriptor;

/// Host-owned copy of a tensor's elements.
///
/// Bytes are in native endianness, densely packed, outermost axis first.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedBuffer {
    bytes: Vec<u8>,
    shape: ShapeDescriptor,
    dtype: TypeDescriptor,
}

impl OwnedBuffer {
    /// Wrap bytes already laid out for `shape` and `dtype`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ShapeMismatch`] if `bytes` is not exactly
    /// `numel * element_size` long.
    pub fn new(bytes: Vec<u8>, shape: ShapeDescriptor, dtype: TypeDescriptor) -> Result<Self> {
        check_len(bytes.len(), &shape, dtype)?;
        Ok(Self {
            bytes,
            shape,
            dtype,
        })
    }

    /// Raw element bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable element bytes. Writes do not reach the source tensor.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Consume the buffer, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Shape of the exported tensor.
    #[must_use]
    pub fn shape(&self) -> &ShapeDescriptor {
        &self.shape
    }

    /// Element type of the exported tensor.
    #[must_use]
    pub fn dtype(&self) -> TypeDescriptor {
        self.dtype
    }

    /// Elements as a typed vector.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedType`] if `T` does not match the buffer's
    /// element type.
    pub fn to_vec<T: HostElement>(&self) -> Result<Vec<T>> {
        typed_copy(&self.bytes, self.dtype)
    }
}

/// Zero-copy, read-only window onto a host-resident tensor.
pub struct HostView<'a> {
    guard: RwLockReadGuard<'a, Storage>,
    /// Element offsets into the storage.
    start: usize,
    end: usize,
    shape: ShapeDescriptor,
    dtype: TypeDescriptor,
}

impl HostView<'_> {
    /// Raw element bytes, borrowed from the engine's storage.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &*self.guard {
            Storage::Cpu(cpu) => cpu_bytes(cpu, self.start, self.end).unwrap_or_default(),
            _ => &[],
        }
    }

    /// Shape of the viewed tensor.
    #[must_use]
    pub fn shape(&self) -> &ShapeDescriptor {
        &self.shape
    }

    /// Element type of the viewed tensor.
    #[must_use]
    pub fn dtype(&self) -> TypeDescriptor {
        self.dtype
    }

    /// Elements as a typed vector (copies).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedType`] if `T` does not match the view's
    /// element type.
    pub fn to_vec<T: HostElement>(&self) -> Result<Vec<T>> {
        typed_copy(self.as_bytes(), self.dtype)
    }
}

impl std::fmt::Debug for HostView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostView")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("len_bytes", &self.as_bytes().len())
            .finish()
    }
}

/// Result of [`export`]: either a view of the handle or an independent copy.
#[derive(Debug)]
pub enum Exported<'a> {
    /// Borrowed from a host-resident contiguous handle.
    View(HostView<'a>),
    /// Copied out of the handle.
    Owned(OwnedBuffer),
}

impl Exported<'_> {
    /// `true` if no copy was made.
    #[must_use]
    pub fn is_view(&self) -> bool {
        matches!(self, Self::View(_))
    }

    /// Raw element bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::View(view) => view.as_bytes(),
            Self::Owned(owned) => owned.as_bytes(),
        }
    }

    /// Mutable bytes; `None` for a view, which is read-only.
    pub fn as_mut_bytes(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::View(_) => None,
            Self::Owned(owned) => Some(owned.as_mut_bytes()),
        }
    }

    /// Shape of the exported tensor.
    #[must_use]
    pub fn shape(&self) -> &ShapeDescriptor {
        match self {
            Self::View(view) => view.shape(),
            Self::Owned(owned) => owned.shape(),
        }
    }

    /// Element type of the exported tensor.
    #[must_use]
    pub fn dtype(&self) -> TypeDescriptor {
        match self {
            Self::View(view) => view.dtype(),
            Self::Owned(owned) => owned.dtype(),
        }
    }

    /// Elements as a typed vector.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedType`] on an element type mismatch.
    pub fn to_vec<T: HostElement>(&self) -> Result<Vec<T>> {
        typed_copy(self.as_bytes(), self.dtype())
    }

    /// Detach from the handle, copying if this is a view.
    #[must_use]
    pub fn into_owned(self) -> OwnedBuffer {
        match self {
            Self::View(view) => OwnedBuffer {
                bytes: view.as_bytes().to_vec(),
                shape: view.shape.clone(),
                dtype: view.dtype,
            },
            Self::Owned(owned) => owned,
        }
    }
}

fn check_len(actual: usize, shape: &ShapeDescriptor, dtype: TypeDescriptor) -> Result<()> {
    let expected = shape.byte_size(dtype)?;
    if actual != expected {
        return Err(BridgeError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

fn typed_copy<T: HostElement>(bytes: &[u8], dtype: TypeDescriptor) -> Result<Vec<T>> {
    if T::TYPE != dtype {
        return Err(BridgeError::unsupported_type(format!(
            "cannot read {dtype} elements as {}",
            T::TYPE
        )));
    }
    Ok(bytemuck::allocation::pod_collect_to_vec(bytes))
}

/// Bytes of `storage[start..end]` (element offsets).
fn cpu_bytes(storage: &CpuStorage, start: usize, end: usize) -> Option<&[u8]> {
    let bytes: &[u8] = match storage {
        CpuStorage::U8(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::U32(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::I16(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::I32(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::I64(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::BF16(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::F16(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::F32(v) => bytemuck::cast_slice(v.get(start..end)?),
        CpuStorage::F64(v) => bytemuck::cast_slice(v.get(start..end)?),
        _ => return None,
    };
    Some(bytes)
}

/// Copy a host byte buffer into a new engine tensor on `device`.
///
/// # Errors
///
/// - [`BridgeError::UnsupportedType`] if the engine cannot store `dtype`
/// - [`BridgeError::ShapeOverflow`] if the shape's byte size is not addressable
/// - [`BridgeError::ShapeMismatch`] if `bytes` has the wrong length
/// - [`BridgeError::Allocation`] if the engine refuses to construct the tensor
pub fn ingest(
    bytes: &[u8],
    shape: &ShapeDescriptor,
    dtype: TypeDescriptor,
    device: &Device,
) -> Result<Tensor> {
    let native = host_tag_to_native(dtype)?;
    check_len(bytes.len(), shape, dtype)?;

    let tensor = Tensor::from_raw_buffer(bytes, native, shape.dims(), device).map_err(|e| {
        BridgeError::allocation(format!("cannot construct {dtype} tensor of shape {shape}: {e}"))
    })?;

    tracing::debug!(%shape, %dtype, bytes = bytes.len(), "ingested host buffer");
    Ok(tensor)
}

/// Copy `numel(shape) * size(dtype)` bytes starting at `ptr` into a new tensor.
///
/// # Errors
///
/// Same as [`ingest`], plus [`BridgeError::Allocation`] for a null `ptr`.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `shape.byte_size(dtype)` bytes for the
/// duration of the call. Alignment is not required.
pub unsafe fn ingest_raw(
    ptr: *const u8,
    shape: &ShapeDescriptor,
    dtype: TypeDescriptor,
    device: &Device,
) -> Result<Tensor> {
    if ptr.is_null() {
        return Err(BridgeError::allocation("null host buffer pointer"));
    }
    let len = shape.byte_size(dtype)?;
    // SAFETY: non-null and valid for `len` bytes per the caller contract; u8 has
    // alignment 1.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    ingest(bytes, shape, dtype, device)
}

/// Copy a typed host slice into a new tensor.
///
/// # Errors
///
/// Same as [`ingest`]; the element type comes from `T`.
pub fn ingest_slice<T: HostElement>(
    data: &[T],
    shape: &ShapeDescriptor,
    device: &Device,
) -> Result<Tensor> {
    ingest(bytemuck::cast_slice(data), shape, T::TYPE, device)
}

/// Expose a tensor's elements to the host.
///
/// Returns a zero-copy [`Exported::View`] when the tensor is on `Cpu:0` and its
/// elements are contiguous. Otherwise makes the tensor contiguous and performs a
/// single device-to-host transfer into an [`Exported::Owned`] buffer.
///
/// # Errors
///
/// - [`BridgeError::UnsupportedType`] if the tensor's dtype has no host tag
/// - [`BridgeError::EngineOperation`] if the engine copy or transfer fails
pub fn export(tensor: &Tensor) -> Result<Exported<'_>> {
    let dtype = native_token_to_host_tag(tensor.dtype())?;
    let shape = ShapeDescriptor::from(tensor.dims());

    if tensor.device().is_cpu() {
        let (guard, layout) = tensor.storage_and_layout();
        if let Some((start, end)) = layout.contiguous_offsets() {
            let readable = match &*guard {
                Storage::Cpu(cpu) => cpu_bytes(cpu, start, end).is_some(),
                _ => false,
            };
            if readable {
                tracing::debug!(%shape, %dtype, "exported zero-copy view");
                return Ok(Exported::View(HostView {
                    guard,
                    start,
                    end,
                    shape,
                    dtype,
                }));
            }
        }
    }

    export_owned(tensor).map(Exported::Owned)
}

/// Copy a tensor's elements into a host-owned buffer, regardless of residency.
///
/// # Errors
///
/// Same as [`export`].
pub fn export_owned(tensor: &Tensor) -> Result<OwnedBuffer> {
    let dtype = native_token_to_host_tag(tensor.dtype())?;
    let shape = ShapeDescriptor::from(tensor.dims());

    let host = tensor
        .contiguous()
        .and_then(|t| t.to_device(&Device::Cpu))
        .engine_op("export")?;

    let (guard, layout) = host.storage_and_layout();
    let bytes = match (&*guard, layout.contiguous_offsets()) {
        (Storage::Cpu(cpu), Some((start, end))) => cpu_bytes(cpu, start, end).map(<[u8]>::to_vec),
        _ => None,
    }
    .ok_or_else(|| BridgeError::unsupported_type(format!("{:?} storage", tensor.dtype())))?;
    drop(guard);

    tracing::debug!(%shape, %dtype, bytes = bytes.len(), "exported owned copy");
    OwnedBuffer::new(bytes, shape, dtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tensor {
        let data: Vec<f32> = (0u8..6).map(f32::from).collect();
        ingest_slice(&data, &ShapeDescriptor::from([2, 3]), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_ingest_export_round_trip() {
        let bytes: Vec<u8> = bytemuck::cast_slice(&[1i32, -2, 3, -4]).to_vec();
        let shape = ShapeDescriptor::from([2, 2]);
        let tensor = ingest(&bytes, &shape, TypeDescriptor::Int32, &Device::Cpu).unwrap();

        let exported = export(&tensor).unwrap();
        assert!(exported.is_view());
        assert_eq!(exported.as_bytes(), bytes.as_slice());
        assert_eq!(exported.shape(), &shape);
        assert_eq!(exported.dtype(), TypeDescriptor::Int32);
    }

    #[test]
    fn test_ingest_copies() {
        let mut data = vec![1.0f32, 2.0, 3.0];
        let tensor = ingest_slice(&data, &ShapeDescriptor::from([3]), &Device::Cpu).unwrap();
        data[0] = 100.0;
        assert_eq!(export(&tensor).unwrap().to_vec::<f32>().unwrap()[0], 1.0);
    }

    #[test]
    fn test_ingest_length_mismatch() {
        let err = ingest(&[0u8; 7], &ShapeDescriptor::from([2]), TypeDescriptor::Float32, &Device::Cpu)
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ShapeMismatch {
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_ingest_overflow_and_unsupported() {
        let err = ingest(
            &[],
            &ShapeDescriptor::from([usize::MAX, 4]),
            TypeDescriptor::Float32,
            &Device::Cpu,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::ShapeOverflow { .. }));

        let err = ingest(&[1], &ShapeDescriptor::from([1]), TypeDescriptor::Bool, &Device::Cpu)
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedType { .. }));
    }

    #[test]
    fn test_ingest_raw_rejects_null() {
        // SAFETY: null is explicitly permitted and rejected.
        let err = unsafe {
            ingest_raw(
                std::ptr::null(),
                &ShapeDescriptor::from([1]),
                TypeDescriptor::UInt8,
                &Device::Cpu,
            )
        }
        .unwrap_err();
        assert!(matches!(err, BridgeError::Allocation { .. }));
    }

    #[test]
    fn test_ingest_raw_copies() {
        let data = [7u8, 8, 9];
        // SAFETY: `data` is valid for 3 bytes.
        let tensor = unsafe {
            ingest_raw(
                data.as_ptr(),
                &ShapeDescriptor::from([3]),
                TypeDescriptor::UInt8,
                &Device::Cpu,
            )
        }
        .unwrap();
        assert_eq!(export(&tensor).unwrap().as_bytes(), &data);
    }

    #[test]
    fn test_strided_export_is_owned() {
        let transposed = sample().t().unwrap();
        let mut exported = export(&transposed).unwrap();
        assert!(!exported.is_view());
        assert_eq!(exported.shape().dims(), &[3, 2]);
        assert_eq!(
            exported.to_vec::<f32>().unwrap(),
            vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]
        );
        assert!(exported.as_mut_bytes().is_some());
    }

    #[test]
    fn test_narrowed_view_uses_offsets() {
        let row = sample().narrow(0, 1, 1).unwrap();
        let exported = export(&row).unwrap();
        assert!(exported.is_view());
        assert_eq!(exported.to_vec::<f32>().unwrap(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_view_is_read_only() {
        let tensor = sample();
        let mut exported = export(&tensor).unwrap();
        assert!(exported.as_mut_bytes().is_none());
    }

    #[test]
    fn test_typed_read_checks_dtype() {
        let tensor = sample();
        let exported = export(&tensor).unwrap();
        assert!(matches!(
            exported.to_vec::<f64>(),
            Err(BridgeError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_export_owned_is_independent() {
        let tensor = sample();
        let mut owned = export_owned(&tensor).unwrap();
        owned.as_mut_bytes().fill(0);
        assert_eq!(export(&tensor).unwrap().to_vec::<f32>().unwrap()[5], 5.0);
    }

    #[test]
    fn test_empty_tensor_round_trip() {
        let tensor =
            ingest(&[], &ShapeDescriptor::from([0, 3]), TypeDescriptor::Float64, &Device::Cpu)
                .unwrap();
        let exported = export(&tensor).unwrap();
        assert!(exported.as_bytes().is_empty());
        assert_eq!(exported.shape().dims(), &[0, 3]);
    }
}
