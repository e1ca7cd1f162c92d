//! Strided n-dimensional arrays consumed and produced by ufuncs

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{UfuncError, UfuncResult};
use crate::memory::MemoryGuard;
use super::devices::Device;
use super::dtype::DType;
use super::iter::{column_major_strides, row_major_strides, walk_strided};
use super::scalar::{Element, Scalar};
use super::storage::TensorStorage;

/// Physical element order of a freshly allocated array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryLayout {
    /// C order, last axis fastest
    RowMajor,
    /// Fortran order, first axis fastest
    ColumnMajor,
}

/// Dynamically shaped, strided array over shared storage.
///
/// Cloning is cheap: clones and views share the same storage. Strides are
/// counted in elements and may be zero (broadcast axes).
#[derive(Clone)]
pub struct NdArray {
    storage: Arc<TensorStorage>,
    shape: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
    dtype: DType,
}

impl NdArray {
    /// Zero-filled row-major array
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let len: usize = shape.iter().product();
        Self {
            storage: Arc::new(TensorStorage::new(len * dtype.size(), Device::Cpu)),
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
            offset: 0,
            dtype,
        }
    }

    /// Row-major array from typed data
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> UfuncResult<Self> {
        let values: Vec<Scalar> = data.into_iter().map(Element::into_scalar).collect();
        Self::from_scalars(&values, shape, T::DTYPE)
    }

    /// Row-major array from scalars, each cast to `dtype`
    pub fn from_scalars(values: &[Scalar], shape: &[usize], dtype: DType) -> UfuncResult<Self> {
        let len: usize = shape.iter().product();
        if values.len() != len {
            return Err(UfuncError::InvalidInput(format!(
                "{} values do not fill shape {:?} ({} elements)",
                values.len(),
                shape,
                len
            )));
        }
        let size = dtype.size();
        let mut bytes = vec![0u8; len * size];
        for (value, slot) in values.iter().zip(bytes.chunks_exact_mut(size)) {
            value.cast(dtype).write_le(slot);
        }
        Ok(Self {
            storage: Arc::new(TensorStorage::from_vec(bytes, Device::Cpu)),
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
            offset: 0,
            dtype,
        })
    }

    /// `0, 1, .., n-1` as a 1-D array
    pub fn arange(n: usize, dtype: DType) -> Self {
        let values: Vec<Scalar> = (0..n as u64).map(|i| Scalar::U64(i).cast(dtype)).collect();
        let size = dtype.size();
        let mut bytes = vec![0u8; n * size];
        for (value, slot) in values.iter().zip(bytes.chunks_exact_mut(size)) {
            value.write_le(slot);
        }
        Self {
            storage: Arc::new(TensorStorage::from_vec(bytes, Device::Cpu)),
            shape: vec![n],
            strides: vec![1],
            offset: 0,
            dtype,
        }
    }

    /// 0-dimensional array holding one value
    pub fn scalar(value: Scalar) -> Self {
        let mut bytes = vec![0u8; value.dtype().size()];
        value.write_le(&mut bytes);
        Self {
            storage: Arc::new(TensorStorage::from_vec(bytes, Device::Cpu)),
            shape: Vec::new(),
            strides: Vec::new(),
            offset: 0,
            dtype: value.dtype(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Element offset of the first logical element within the storage
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of logical elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    pub fn storage(&self) -> &TensorStorage {
        &self.storage
    }

    /// True when elements are laid out contiguously in row-major order
    pub fn is_standard_layout(&self) -> bool {
        let expected = row_major_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&dim, (&actual, &wanted))| dim <= 1 || actual == wanted)
    }

    fn element_offset(&self, index: &[usize]) -> UfuncResult<usize> {
        if index.len() != self.ndim() {
            return Err(UfuncError::InvalidInput(format!(
                "index {:?} has {} coordinates, array has {} dimensions",
                index,
                index.len(),
                self.ndim()
            )));
        }
        let mut offset = self.offset as isize;
        for (axis, (&i, &dim)) in index.iter().zip(self.shape.iter()).enumerate() {
            if i >= dim {
                return Err(UfuncError::InvalidInput(format!(
                    "index {} is out of bounds for axis {} with size {}",
                    i, axis, dim
                )));
            }
            offset += i as isize * self.strides[axis];
        }
        Ok(offset as usize)
    }

    pub fn get(&self, index: &[usize]) -> UfuncResult<Scalar> {
        let offset = self.element_offset(index)?;
        let size = self.dtype.size();
        let bytes = self.storage.read();
        Ok(Scalar::read_le(self.dtype, &bytes[offset * size..]))
    }

    /// Store `value` cast to the array's dtype. Visible through every view
    /// sharing this storage.
    pub fn set(&self, index: &[usize], value: Scalar) -> UfuncResult<()> {
        let offset = self.element_offset(index)?;
        let size = self.dtype.size();
        let mut bytes = self.storage.write();
        value.cast(self.dtype).write_le(&mut bytes[offset * size..]);
        Ok(())
    }

    /// The single element of a size-1 array
    pub fn item(&self) -> UfuncResult<Scalar> {
        if self.len() != 1 {
            return Err(UfuncError::InvalidInput(format!(
                "item() needs exactly one element, array has shape {:?}",
                self.shape
            )));
        }
        let size = self.dtype.size();
        let bytes = self.storage.read();
        Ok(Scalar::read_le(self.dtype, &bytes[self.offset * size..]))
    }

    /// Logical elements in row-major order
    pub fn to_scalars(&self) -> Vec<Scalar> {
        let size = self.dtype.size();
        let bytes = self.storage.read();
        let mut values = Vec::with_capacity(self.len());
        // the visitor never fails
        let _ = walk_strided(
            &self.shape,
            &[self.strides.as_slice()],
            &[self.offset],
            0..self.len(),
            |offsets| {
                values.push(Scalar::read_le(self.dtype, &bytes[offsets[0] * size..]));
                Ok(())
            },
        );
        values
    }

    /// Logical elements in row-major order, converted to `T`
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.to_scalars().into_iter().map(T::from_scalar).collect()
    }

    /// View with a new size-1 axis at `axis` (NumPy's `newaxis`)
    pub fn insert_axis(&self, axis: usize) -> UfuncResult<Self> {
        if axis > self.ndim() {
            return Err(UfuncError::AxisOutOfBounds {
                axis,
                ndim: self.ndim() + 1,
            });
        }
        let mut view = self.clone();
        view.shape.insert(axis, 1);
        view.strides.insert(axis, 0);
        Ok(view)
    }

    /// View of `start..stop` with `step` along `axis`; `stop` is clamped
    pub fn slice_axis(&self, axis: usize, start: usize, stop: usize, step: usize) -> UfuncResult<Self> {
        self.check_axis(axis)?;
        if step == 0 {
            return Err(UfuncError::InvalidInput("slice step must be positive".to_string()));
        }
        let stop = stop.min(self.shape[axis]);
        let start = start.min(stop);
        let len = (stop - start + step - 1) / step;

        let mut view = self.clone();
        view.offset = (self.offset as isize + start as isize * self.strides[axis]) as usize;
        view.shape[axis] = len;
        view.strides[axis] = self.strides[axis] * step as isize;
        Ok(view)
    }

    /// View of position `index` along `axis`, with that axis removed
    pub fn index_axis(&self, axis: usize, index: usize) -> UfuncResult<Self> {
        self.check_axis(axis)?;
        if index >= self.shape[axis] {
            return Err(UfuncError::InvalidInput(format!(
                "index {} is out of bounds for axis {} with size {}",
                index, axis, self.shape[axis]
            )));
        }
        let mut view = self.clone();
        view.offset = (self.offset as isize + index as isize * self.strides[axis]) as usize;
        view.shape.remove(axis);
        view.strides.remove(axis);
        Ok(view)
    }

    /// Same elements under a new shape. A view when the array is in standard
    /// layout, a row-major copy otherwise.
    pub fn reshape(&self, shape: &[usize]) -> UfuncResult<Self> {
        let len: usize = shape.iter().product();
        if len != self.len() {
            return Err(UfuncError::InvalidInput(format!(
                "cannot reshape array of shape {:?} into {:?}",
                self.shape, shape
            )));
        }
        let base = if self.is_standard_layout() {
            self.clone()
        } else {
            self.to_layout(MemoryLayout::RowMajor)
        };
        Ok(Self {
            storage: base.storage,
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
            offset: base.offset,
            dtype: base.dtype,
        })
    }

    /// Read-only view repeating this array up to `shape`
    pub fn broadcast_to(&self, shape: &[usize]) -> UfuncResult<Self> {
        if shape.len() < self.ndim() {
            return Err(UfuncError::shape_broadcast(0, &[&self.shape, shape]));
        }
        let lead = shape.len() - self.ndim();
        let mut strides = vec![0isize; shape.len()];
        for axis in 0..self.ndim() {
            let dim = self.shape[axis];
            let target = shape[lead + axis];
            if dim == target {
                strides[lead + axis] = self.strides[axis];
            } else if dim != 1 {
                return Err(UfuncError::shape_broadcast(lead + axis, &[&self.shape, shape]));
            }
        }
        Ok(Self {
            storage: self.storage.clone(),
            shape: shape.to_vec(),
            strides,
            offset: self.offset,
            dtype: self.dtype,
        })
    }

    /// View over the same storage with explicit geometry. Callers guarantee
    /// every reachable offset lies inside the storage.
    pub(crate) fn strided_view(&self, offset: usize, shape: &[usize], strides: &[isize]) -> Self {
        Self {
            storage: self.storage.clone(),
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            offset,
            dtype: self.dtype,
        }
    }

    /// Compact copy in the requested physical order
    pub fn to_layout(&self, layout: MemoryLayout) -> Self {
        self.copy_into(layout, self.dtype, self.device())
    }

    /// Compact row-major copy with every element cast to `dtype`
    pub fn cast(&self, dtype: DType) -> Self {
        self.copy_into(MemoryLayout::RowMajor, dtype, self.device())
    }

    /// Compact copy whose storage is resident on `device`
    pub fn to_device(&self, device: Device) -> Self {
        if self.is_standard_layout() && self.offset == 0 && self.storage.size() == self.len() * self.dtype.size() {
            return Self {
                storage: Arc::new(self.storage.transfer_to(device)),
                shape: self.shape.clone(),
                strides: self.strides.clone(),
                offset: 0,
                dtype: self.dtype,
            };
        }
        self.copy_into(MemoryLayout::RowMajor, self.dtype, device)
    }

    /// Device copy whose storage keeps `memory` reserved until the last
    /// view of it drops
    pub(crate) fn to_device_holding(&self, device: Device, memory: MemoryGuard) -> Self {
        let NdArray {
            storage,
            shape,
            strides,
            offset,
            dtype,
        } = self.to_device(device);
        let storage = match Arc::try_unwrap(storage) {
            Ok(owned) => owned,
            Err(shared) => shared.transfer_to(device),
        };
        Self {
            storage: Arc::new(storage.holding(memory)),
            shape,
            strides,
            offset,
            dtype,
        }
    }

    fn copy_into(&self, layout: MemoryLayout, dtype: DType, device: Device) -> Self {
        let strides = match layout {
            MemoryLayout::RowMajor => row_major_strides(&self.shape),
            MemoryLayout::ColumnMajor => column_major_strides(&self.shape),
        };
        let size = dtype.size();
        let values = self.to_scalars();
        let mut bytes = vec![0u8; values.len() * size];
        let mut position = 0usize;
        // scatter the row-major values to their physical slots
        let _ = walk_strided(&self.shape, &[strides.as_slice()], &[0], 0..values.len(), |offsets| {
            values[position].cast(dtype).write_le(&mut bytes[offsets[0] * size..]);
            position += 1;
            Ok(())
        });
        Self {
            storage: Arc::new(TensorStorage::from_vec(bytes, device)),
            shape: self.shape.clone(),
            strides,
            offset: 0,
            dtype,
        }
    }

    fn check_axis(&self, axis: usize) -> UfuncResult<()> {
        if axis >= self.ndim() {
            return Err(UfuncError::AxisOutOfBounds {
                axis,
                ndim: self.ndim(),
            });
        }
        Ok(())
    }
}

impl Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("dtype", &self.dtype)
            .field("device", &self.device())
            .finish()
    }
}
