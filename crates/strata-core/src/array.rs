use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::broadcast::element_wise;
use crate::config;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::loops::{Generic, LoopKind, Step, StrideLoop, StridedRead, Unit};
use crate::ops::lane::lanes;
use crate::ops::{ensure_kind, BinaryOp, CmpOp, LaneOp, ReduceOp, UnaryOp};
use crate::shape::Shape;
use crate::storage::{Buffer, MappedBuffer, Storage};
use crate::with_buffer;

// Array — A strided view over shared storage
//
// An Array is the engine's value type: a Layout (shape + strides + offset)
// plus a shared reference to a kind-tagged Storage.
//
// MEMORY MODEL:
//
//   Storage lives behind Arc<RwLock<Storage>>. Cloning an Array clones the
//   Arc, so every view built from it (t, narrow, stretch, expand, reshape,
//   broadcast_to) aliases the same elements:
//
//     let a = Array::zeros((2, 3), DType::F32);
//     let col = a.narrow(1, 0, 1)?;    // view, no copy
//     col.fill_(1.0)?;                 // visible through `a`
//
//   Nothing ever copies implicitly. `copy()` is the explicit way to get an
//   independent, contiguous, dense array.
//
// ALLOCATING vs IN-PLACE:
//
//   Every operator comes in two forms. `exp()` returns a fresh array;
//   `exp_()` rewrites the elements addressed by this view. In-place forms
//   take `&self`: mutation goes through the storage lock, and writes through
//   one alias are visible through all others.
//
// Concurrent writers to the same storage must be serialized by the caller;
// the lock only keeps individual calls from tearing.

/// A strided n-dimensional view over shared numeric storage.
#[derive(Clone)]
pub struct Array {
    storage: Arc<RwLock<Storage>>,
    layout: Layout,
    dtype: DType,
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array(shape={}, dtype={})", self.layout.shape(), self.dtype)
    }
}

fn push<T>(mut acc: Vec<T>, x: T) -> Vec<T> {
    acc.push(x);
    acc
}

/// Read the positions of `plan` into a new vector, in plan order.
fn collect_buffer<T: WithDType>(buf: &Buffer<T>, plan: &StrideLoop) -> Vec<T> {
    let out = Vec::with_capacity(plan.len());
    match (LoopKind::select(buf.supports_vectorization(), plan.step), buf) {
        (LoopKind::Unit, Buffer::Dense(data)) => Unit(data.as_slice()).fold(plan, out, push),
        (LoopKind::Step, Buffer::Dense(data)) => Step(data.as_slice()).fold(plan, out, push),
        (_, buf) => Generic(buf).fold(plan, out, push),
    }
}

impl Array {
    // Internal constructors

    /// Wrap fresh storage in a contiguous view of `shape`.
    pub(crate) fn from_storage(storage: Storage, shape: Shape) -> Array {
        let dtype = storage.dtype();
        Array {
            storage: Arc::new(RwLock::new(storage)),
            layout: Layout::contiguous(shape),
            dtype,
        }
    }

    /// A view sharing this array's storage with a different layout.
    fn with_layout(&self, layout: Layout) -> Array {
        Array {
            storage: Arc::clone(&self.storage),
            layout,
            dtype: self.dtype,
        }
    }

    /// Read lock on the underlying storage.
    pub fn storage(&self) -> Result<RwLockReadGuard<'_, Storage>> {
        self.storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    /// Write lock on the underlying storage.
    pub fn storage_mut(&self) -> Result<RwLockWriteGuard<'_, Storage>> {
        self.storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    // In-place writes through a stride-0 axis would update one position
    // once per repeated element.
    fn ensure_writable(&self, op: &str) -> Result<()> {
        if self.layout.has_repeated_positions() {
            return Err(Error::InvalidParameter(format!(
                "{}: cannot write through a broadcast view of shape {}, copy() it first",
                op,
                self.shape()
            )));
        }
        Ok(())
    }

    // Construction

    /// Build a contiguous array from row-major data.
    pub fn from_vec<T: WithDType>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Array> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(Array::from_storage(T::into_storage(Buffer::Dense(data)), shape))
    }

    /// Build a contiguous array from row-major f64 data, converted to `dtype`.
    pub fn from_f64_slice(data: &[f64], shape: impl Into<Shape>, dtype: DType) -> Result<Array> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(Array::from_storage(Storage::from_f64_slice(dtype, data), shape))
    }

    /// Build an array over virtual storage: element `i` (row-major) is
    /// `source[index[i]]`. Operators on it always take the generic loop.
    pub fn from_mapped<T: WithDType>(
        source: Vec<T>,
        index: Vec<usize>,
        shape: impl Into<Shape>,
    ) -> Result<Array> {
        let shape = shape.into();
        if index.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: index.len(),
                shape,
            });
        }
        let buffer = Buffer::Mapped(MappedBuffer::new(source, index)?);
        Ok(Array::from_storage(T::into_storage(buffer), shape))
    }

    /// Array filled with `value`.
    pub fn full(shape: impl Into<Shape>, value: f64, dtype: DType) -> Array {
        let shape = shape.into();
        Array::from_storage(Storage::filled(dtype, shape.elem_count(), value), shape)
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Array {
        Array::full(shape, 0.0, dtype)
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType) -> Array {
        Array::full(shape, 1.0, dtype)
    }

    /// Rank-0 array holding `value`.
    pub fn scalar(value: f64, dtype: DType) -> Array {
        Array::full(Shape::scalar(), value, dtype)
    }

    pub fn zeros_like(&self) -> Array {
        Array::zeros(self.shape().clone(), self.dtype)
    }

    pub fn ones_like(&self) -> Array {
        Array::ones(self.shape().clone(), self.dtype)
    }

    pub fn full_like(&self, value: f64) -> Array {
        Array::full(self.shape().clone(), value, self.dtype)
    }

    /// `[0, 1, ..., n-1]`.
    pub fn arange(n: usize, dtype: DType) -> Array {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Array::from_storage(Storage::from_f64_slice(dtype, &data), Shape::from(n))
    }

    /// Uniform samples in `[0, 1)`.
    pub fn rand<R: Rng + ?Sized>(shape: impl Into<Shape>, dtype: DType, rng: &mut R) -> Array {
        let shape = shape.into();
        let data: Vec<f64> = (0..shape.elem_count()).map(|_| rng.gen::<f64>()).collect();
        Array::from_storage(Storage::from_f64_slice(dtype, &data), shape)
    }

    /// Standard normal samples.
    pub fn randn<R: Rng + ?Sized>(shape: impl Into<Shape>, dtype: DType, rng: &mut R) -> Array {
        let shape = shape.into();
        let data: Vec<f64> = (0..shape.elem_count())
            .map(|_| StandardNormal.sample(rng))
            .collect();
        Array::from_storage(Storage::from_f64_slice(dtype, &data), shape)
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Size of one axis.
    pub fn dim(&self, axis: usize) -> Result<usize> {
        self.shape().dim(axis)
    }

    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    /// Whether operators on this array may take the slice loops.
    pub fn supports_vectorization(&self) -> Result<bool> {
        Ok(self.storage()?.supports_vectorization())
    }

    /// True if both views read and write the same storage.
    pub fn shares_storage(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    // Views (no data is copied)

    /// Reverse all axes.
    pub fn t(&self) -> Array {
        self.with_layout(self.layout.transpose())
    }

    pub fn swap_axes(&self, a: usize, b: usize) -> Result<Array> {
        Ok(self.with_layout(self.layout.swap_axes(a, b)?))
    }

    pub fn permute(&self, perm: &[usize]) -> Result<Array> {
        Ok(self.with_layout(self.layout.permute(perm)?))
    }

    /// `len` consecutive entries of `axis` starting at `start`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Array> {
        Ok(self.with_layout(self.layout.narrow(axis, start, len)?))
    }

    /// Insert a size-1 axis at `axis`.
    pub fn stretch(&self, axis: usize) -> Result<Array> {
        Ok(self.with_layout(self.layout.stretch(axis)?))
    }

    /// Repeat a size-1 axis `size` times (stride 0).
    pub fn expand(&self, axis: usize, size: usize) -> Result<Array> {
        Ok(self.with_layout(self.layout.expand(axis, size)?))
    }

    /// `stretch(axis)` followed by `expand(axis, size)`.
    pub fn strexp(&self, axis: usize, size: usize) -> Result<Array> {
        self.stretch(axis)?.expand(axis, size)
    }

    /// Remove a size-1 axis.
    pub fn squeeze(&self, axis: usize) -> Result<Array> {
        Ok(self.with_layout(self.layout.squeeze(axis)?))
    }

    /// Reshape to `shape`. A view when the layout allows it, a copy otherwise.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Array> {
        let shape = shape.into();
        if shape.elem_count() != self.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: self.elem_count(),
                got: shape.elem_count(),
                shape,
            });
        }
        match self.layout.reshape_view(&shape) {
            Some(layout) => Ok(self.with_layout(layout)),
            None => Ok(self.copy()?.with_layout(Layout::contiguous(shape))),
        }
    }

    /// View with the broadcast target `shape`.
    pub fn broadcast_to(&self, shape: impl Into<Shape>) -> Result<Array> {
        let shape = shape.into();
        let ew = element_wise(&[&shape, self.shape()]).checked()?;
        if ew.shape() != &shape {
            return Err(Error::broadcast(self.shape(), &shape));
        }
        ew.transform(self)
    }

    // Copies

    /// Dense contiguous copy with the same kind.
    pub fn copy(&self) -> Result<Array> {
        let plan = StrideLoop::new(&self.layout);
        let guard = self.storage()?;
        let storage = with_buffer!(&*guard, b => WithDType::into_storage(Buffer::Dense(collect_buffer(b, &plan))));
        Ok(Array::from_storage(storage, self.shape().clone()))
    }

    /// This array if it is already contiguous, a copy otherwise.
    pub fn contiguous(&self) -> Result<Array> {
        if self.is_contiguous() {
            Ok(self.clone())
        } else {
            self.copy()
        }
    }

    /// Copy converted to another element kind.
    pub fn cast(&self, dtype: DType) -> Result<Array> {
        if dtype == self.dtype {
            return self.copy();
        }
        let data = self.to_f64_vec()?;
        Ok(Array::from_storage(
            Storage::from_f64_slice(dtype, &data),
            self.shape().clone(),
        ))
    }

    /// Copy of the entries `indices` along `axis`, in the given order.
    /// Selecting along axis 0 of a matrix maps rows, along axis 1 columns.
    pub fn select(&self, axis: usize, indices: &[usize]) -> Result<Array> {
        self.shape().check_axis(axis)?;
        let size = self.dims()[axis];
        if let Some(&bad) = indices.iter().find(|&&i| i >= size) {
            let mut index = vec![0; self.rank()];
            index[axis] = bad;
            return Err(Error::IndexOutOfBounds {
                index,
                shape: self.shape().clone(),
            });
        }
        let mut dims = self.dims().to_vec();
        dims[axis] = indices.len();
        let mut strides = self.layout.strides().to_vec();
        let stride = std::mem::replace(&mut strides[axis], 0);
        let inner: usize = dims[axis + 1..].iter().product();
        let n = indices.len();
        let shape = Shape::new(dims);
        let base = Layout::new(shape.clone(), strides, self.layout.offset());
        let positions: Vec<usize> = base
            .strided_indices()
            .enumerate()
            .map(|(e, p)| p + indices[(e / inner) % n] * stride)
            .collect();
        let guard = self.storage()?;
        let storage = with_buffer!(&*guard, b => WithDType::into_storage(Buffer::Dense(
            positions.iter().map(|&p| b.get(p)).collect::<Vec<_>>()
        )));
        Ok(Array::from_storage(storage, shape))
    }

    // Storage positions addressed by `index` along `axis`: element `i` of
    // the index names position `index[i]` on `axis` and `i` elsewhere.
    fn index_positions(&self, op: &str, axis: usize, index: &Array) -> Result<Vec<usize>> {
        self.shape().check_axis(axis)?;
        if index.rank() != self.rank() {
            return Err(Error::InvalidParameter(format!(
                "{}: index of rank {} against array of rank {}",
                op,
                index.rank(),
                self.rank()
            )));
        }
        let fits = index
            .dims()
            .iter()
            .zip(self.dims())
            .enumerate()
            .all(|(d, (&i, &s))| d == axis || i <= s);
        if !fits {
            return Err(Error::broadcast(index.shape(), self.shape()));
        }
        let size = self.dims()[axis];
        let mut strides = self.layout.strides().to_vec();
        let stride = std::mem::replace(&mut strides[axis], 0);
        let base = Layout::new(index.shape().clone(), strides, self.layout.offset());
        base.strided_indices()
            .zip(index.to_f64_vec()?)
            .map(|(p, i)| {
                if i < 0.0 || i.fract() != 0.0 {
                    return Err(Error::InvalidParameter(format!("{}: index {} is not a position", op, i)));
                }
                let i = i as usize;
                if i >= size {
                    let mut bad = vec![0; self.rank()];
                    bad[axis] = i;
                    return Err(Error::IndexOutOfBounds {
                        index: bad,
                        shape: self.shape().clone(),
                    });
                }
                Ok(p + i * stride)
            })
            .collect()
    }

    /// Pick entries along `axis` by an index array of the same rank:
    /// `out[.., j, ..] = self[.., index[.., j, ..], ..]`. The result has the
    /// index's shape; on the other axes the index may be shorter than this
    /// array. Index values are read as non-negative integers.
    pub fn gather(&self, axis: usize, index: &Array) -> Result<Array> {
        let positions = self.index_positions("gather", axis, index)?;
        let guard = self.storage()?;
        let storage = with_buffer!(&*guard, b => WithDType::into_storage(Buffer::Dense(
            positions.iter().map(|&p| b.get(p)).collect::<Vec<_>>()
        )));
        Ok(Array::from_storage(storage, index.shape().clone()))
    }

    /// Add `src` into the entries `index` names along `axis`, the reverse
    /// of [`Array::gather`]. Repeated indices accumulate.
    pub fn scatter_add_(&self, axis: usize, index: &Array, src: &Array) -> Result<()> {
        self.ensure_writable("scatter_add")?;
        if src.shape() != index.shape() {
            return Err(Error::ShapeMismatch {
                expected: index.shape().clone(),
                got: src.shape().clone(),
            });
        }
        let positions = self.index_positions("scatter_add", axis, index)?;
        let values = src.to_f64_vec()?;
        let mut guard = self.storage_mut()?;
        for (&p, v) in positions.iter().zip(values) {
            let acc = guard.get_f64(p) + v;
            guard.set_f64(p, acc);
        }
        Ok(())
    }

    // Element access

    pub fn get_f64(&self, index: &[usize]) -> Result<f64> {
        let pos = self.layout.checked_flat_index(index)?;
        Ok(self.storage()?.get_f64(pos))
    }

    pub fn set_f64(&self, index: &[usize], value: f64) -> Result<()> {
        let pos = self.layout.checked_flat_index(index)?;
        self.storage_mut()?.set_f64(pos, value);
        Ok(())
    }

    /// Elements in row-major order as `T`, which must match the kind.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        let guard = self.storage()?;
        let buf = guard.typed::<T>()?;
        Ok(collect_buffer(buf, &StrideLoop::new(&self.layout)))
    }

    /// Elements in row-major order converted to f64.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let guard = self.storage()?;
        Ok(self
            .layout
            .strided_indices()
            .map(|p| guard.get_f64(p))
            .collect())
    }

    /// The value of a single-element array.
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        let pos = self.layout.flat_index(&vec![0; self.rank()]);
        Ok(self.storage()?.get_f64(pos))
    }

    /// Debug rendering including the data.
    pub fn to_string_with_data(&self) -> Result<String> {
        Ok(format!(
            "Array(shape={}, dtype={}, data={:?})",
            self.shape(),
            self.dtype,
            self.to_f64_vec()?
        ))
    }

    // Unary operations

    /// Apply `op` in place.
    pub fn unary_(&self, op: UnaryOp) -> Result<()> {
        self.ensure_writable(op.name())?;
        let mut guard = self.storage_mut()?;
        op.apply_storage(&mut *guard, &self.layout)?;
        Ok(())
    }

    /// Apply `op` to a copy.
    pub fn unary(&self, op: UnaryOp) -> Result<Array> {
        ensure_kind(op.name(), op.is_float_only(), self.dtype)?;
        let out = self.copy()?;
        out.unary_(op)?;
        Ok(out)
    }

    pub fn neg(&self) -> Result<Array> {
        self.unary(UnaryOp::Neg)
    }

    pub fn abs(&self) -> Result<Array> {
        self.unary(UnaryOp::Abs)
    }

    /// Element-wise square.
    pub fn sqr(&self) -> Result<Array> {
        self.unary(UnaryOp::Sqr)
    }

    pub fn sqrt(&self) -> Result<Array> {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn exp(&self) -> Result<Array> {
        self.unary(UnaryOp::Exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> Result<Array> {
        self.unary(UnaryOp::Log)
    }

    pub fn log1p(&self) -> Result<Array> {
        self.unary(UnaryOp::Log1p)
    }

    pub fn tanh(&self) -> Result<Array> {
        self.unary(UnaryOp::Tanh)
    }

    pub fn sigmoid(&self) -> Result<Array> {
        self.unary(UnaryOp::Sigmoid)
    }

    pub fn sin(&self) -> Result<Array> {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(&self) -> Result<Array> {
        self.unary(UnaryOp::Cos)
    }

    pub fn floor(&self) -> Result<Array> {
        self.unary(UnaryOp::Floor)
    }

    pub fn ceil(&self) -> Result<Array> {
        self.unary(UnaryOp::Ceil)
    }

    /// Round half to even.
    pub fn rint(&self) -> Result<Array> {
        self.unary(UnaryOp::Rint)
    }

    pub fn powf(&self, exponent: f64) -> Result<Array> {
        self.unary(UnaryOp::Pow(exponent))
    }

    pub fn clamp(&self, min: f64, max: f64) -> Result<Array> {
        if min > max {
            return Err(Error::InvalidParameter(format!(
                "clamp bounds reversed: min {} > max {}",
                min, max
            )));
        }
        self.unary(UnaryOp::Clamp { min, max })
    }

    /// `max(x, threshold)` element-wise.
    pub fn max_scalar(&self, threshold: f64) -> Result<Array> {
        self.unary(UnaryOp::MaxScalar(threshold))
    }

    /// 1 where `x <cmp> threshold`, 0 elsewhere, in this array's kind.
    pub fn compare_mask(&self, cmp: CmpOp, threshold: f64) -> Result<Array> {
        self.unary(UnaryOp::CompareMask(cmp, threshold))
    }

    pub fn nan_to_num(&self, replacement: f64) -> Result<Array> {
        self.unary(UnaryOp::NanToNum(replacement))
    }

    pub fn fill_(&self, value: f64) -> Result<()> {
        self.unary_(UnaryOp::Fill(value))
    }

    pub fn neg_(&self) -> Result<()> {
        self.unary_(UnaryOp::Neg)
    }

    pub fn sqr_(&self) -> Result<()> {
        self.unary_(UnaryOp::Sqr)
    }

    pub fn sqrt_(&self) -> Result<()> {
        self.unary_(UnaryOp::Sqrt)
    }

    pub fn exp_(&self) -> Result<()> {
        self.unary_(UnaryOp::Exp)
    }

    pub fn log_(&self) -> Result<()> {
        self.unary_(UnaryOp::Log)
    }

    pub fn tanh_(&self) -> Result<()> {
        self.unary_(UnaryOp::Tanh)
    }

    pub fn sigmoid_(&self) -> Result<()> {
        self.unary_(UnaryOp::Sigmoid)
    }

    pub fn clamp_(&self, min: f64, max: f64) -> Result<()> {
        self.unary_(UnaryOp::Clamp { min, max })
    }

    // Binary operations

    /// Combine in place with `rhs` broadcast to this array's shape.
    ///
    /// `rhs` is converted to this array's kind first, and copied first when
    /// it aliases this array's storage.
    pub fn binary_(&self, op: BinaryOp, rhs: &Array) -> Result<()> {
        self.ensure_writable(op.name())?;
        let ew = element_wise(&[self.shape(), rhs.shape()]).checked()?;
        if ew.shape() != self.shape() {
            return Err(Error::broadcast(self.shape(), rhs.shape()));
        }
        let rhs = if rhs.dtype != self.dtype {
            rhs.cast(self.dtype)?
        } else if self.shares_storage(rhs) {
            rhs.copy()?
        } else {
            rhs.clone()
        };
        let rhs = ew.transform(&rhs)?;
        let src = rhs.storage()?;
        let mut dst = self.storage_mut()?;
        op.apply_storage(&mut *dst, &self.layout, &*src, &rhs.layout)?;
        Ok(())
    }

    /// Combine with `rhs` into a new array of the broadcast shape.
    /// Both operands must have the same kind.
    pub fn binary(&self, op: BinaryOp, rhs: &Array) -> Result<Array> {
        if self.dtype != rhs.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: rhs.dtype,
            });
        }
        let ew = element_wise(&[self.shape(), rhs.shape()]).checked()?;
        let out = ew.transform(self)?.copy()?;
        out.binary_(op, rhs)?;
        Ok(out)
    }

    /// Element-wise addition: self + rhs.
    pub fn add(&self, rhs: &Array) -> Result<Array> {
        self.binary(BinaryOp::Add, rhs)
    }

    /// Element-wise subtraction: self - rhs.
    pub fn sub(&self, rhs: &Array) -> Result<Array> {
        self.binary(BinaryOp::Sub, rhs)
    }

    /// Element-wise multiplication: self * rhs.
    pub fn mul(&self, rhs: &Array) -> Result<Array> {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// Element-wise division: self / rhs.
    pub fn div(&self, rhs: &Array) -> Result<Array> {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn minimum(&self, rhs: &Array) -> Result<Array> {
        self.binary(BinaryOp::Min, rhs)
    }

    pub fn maximum(&self, rhs: &Array) -> Result<Array> {
        self.binary(BinaryOp::Max, rhs)
    }

    pub fn add_(&self, rhs: &Array) -> Result<()> {
        self.binary_(BinaryOp::Add, rhs)
    }

    pub fn sub_(&self, rhs: &Array) -> Result<()> {
        self.binary_(BinaryOp::Sub, rhs)
    }

    pub fn mul_(&self, rhs: &Array) -> Result<()> {
        self.binary_(BinaryOp::Mul, rhs)
    }

    pub fn div_(&self, rhs: &Array) -> Result<()> {
        self.binary_(BinaryOp::Div, rhs)
    }

    // Scalar right-hand side, broadcast as a rank-0 array of this kind

    pub fn add_scalar(&self, value: f64) -> Result<Array> {
        self.binary(BinaryOp::Add, &Array::scalar(value, self.dtype))
    }

    pub fn sub_scalar(&self, value: f64) -> Result<Array> {
        self.binary(BinaryOp::Sub, &Array::scalar(value, self.dtype))
    }

    pub fn mul_scalar(&self, value: f64) -> Result<Array> {
        self.binary(BinaryOp::Mul, &Array::scalar(value, self.dtype))
    }

    pub fn div_scalar(&self, value: f64) -> Result<Array> {
        self.binary(BinaryOp::Div, &Array::scalar(value, self.dtype))
    }

    pub fn add_scalar_(&self, value: f64) -> Result<()> {
        self.binary_(BinaryOp::Add, &Array::scalar(value, self.dtype))
    }

    pub fn mul_scalar_(&self, value: f64) -> Result<()> {
        self.binary_(BinaryOp::Mul, &Array::scalar(value, self.dtype))
    }

    pub fn div_scalar_(&self, value: f64) -> Result<()> {
        self.binary_(BinaryOp::Div, &Array::scalar(value, self.dtype))
    }

    // Reductions

    /// Reduce every element to a rank-0 array of the same kind.
    pub fn reduce_all(&self, op: ReduceOp) -> Result<Array> {
        let storage = op.reduce_storage(&*self.storage()?, &self.layout)?;
        Ok(Array::from_storage(storage, Shape::scalar()))
    }

    /// Reduce along `axis`. With `keep_dim` the axis stays with size 1.
    ///
    /// Lanes are reduced in parallel once their number reaches the
    /// configured `parallel_threshold`.
    pub fn reduce(&self, op: ReduceOp, axis: usize, keep_dim: bool) -> Result<Array> {
        ensure_kind(op.name(), op.is_float_only(), self.dtype)?;
        let (bases, step, bound) = lanes(&self.layout, axis)?;
        let shape = if keep_dim {
            let mut dims = self.dims().to_vec();
            dims[axis] = 1;
            Shape::new(dims)
        } else {
            self.shape().remove_axis(axis)?
        };
        let parallel = bases.len() >= config::current().parallel_threshold;
        if parallel {
            tracing::debug!(op = op.name(), lanes = bases.len(), "parallel axis reduction");
        }
        let guard = self.storage()?;
        let storage = with_buffer!(&*guard, b => WithDType::into_storage(Buffer::Dense(
            op.reduce_lanes(b, &bases, step, bound, parallel)
        )));
        Ok(Array::from_storage(storage, shape))
    }

    /// Sum all elements, returning a rank-0 array.
    pub fn sum_all(&self) -> Result<Array> {
        self.reduce_all(ReduceOp::Sum)
    }

    /// Sum along `axis`.
    pub fn sum(&self, axis: usize, keep_dim: bool) -> Result<Array> {
        self.reduce(ReduceOp::Sum, axis, keep_dim)
    }

    pub fn prod_all(&self) -> Result<Array> {
        self.reduce_all(ReduceOp::Prod)
    }

    pub fn mean_all(&self) -> Result<Array> {
        self.reduce_all(ReduceOp::Mean)
    }

    pub fn mean(&self, axis: usize, keep_dim: bool) -> Result<Array> {
        self.reduce(ReduceOp::Mean, axis, keep_dim)
    }

    pub fn max_all(&self) -> Result<Array> {
        self.reduce_all(ReduceOp::Max)
    }

    pub fn max(&self, axis: usize, keep_dim: bool) -> Result<Array> {
        self.reduce(ReduceOp::Max, axis, keep_dim)
    }

    pub fn min_all(&self) -> Result<Array> {
        self.reduce_all(ReduceOp::Min)
    }

    pub fn min(&self, axis: usize, keep_dim: bool) -> Result<Array> {
        self.reduce(ReduceOp::Min, axis, keep_dim)
    }

    /// Variance of all elements with `ddof` degrees of freedom removed.
    pub fn var_all(&self, ddof: usize) -> Result<Array> {
        self.reduce_all(ReduceOp::Var { ddof, mean: None })
    }

    /// Variance along `axis` with `ddof` degrees of freedom removed.
    pub fn var(&self, axis: usize, ddof: usize, keep_dim: bool) -> Result<Array> {
        self.reduce(ReduceOp::Var { ddof, mean: None }, axis, keep_dim)
    }

    /// Sum out every axis along which this array was broadcast from
    /// `shape`. The result has exactly `shape`.
    pub fn reduce_to_shape(&self, shape: &Shape) -> Result<Array> {
        if self.shape() == shape {
            return Ok(self.clone());
        }
        let ew = element_wise(&[shape, self.shape()]);
        if !ew.valid() || ew.shape() != self.shape() {
            return Err(Error::broadcast(self.shape(), shape));
        }
        let mut out = self.clone();
        for _ in shape.rank()..self.rank() {
            out = out.sum(0, false)?;
        }
        for (axis, &d) in shape.dims().iter().enumerate() {
            if d == 1 && out.dims()[axis] != 1 {
                out = out.sum(axis, true)?;
            }
        }
        Ok(out)
    }

    // Lane operations

    pub fn softmax_(&self, axis: usize) -> Result<()> {
        self.lane_(LaneOp::Softmax, axis)
    }

    pub fn log_softmax_(&self, axis: usize) -> Result<()> {
        self.lane_(LaneOp::LogSoftmax, axis)
    }

    fn lane_(&self, op: LaneOp, axis: usize) -> Result<()> {
        self.ensure_writable(op.name())?;
        let mut guard = self.storage_mut()?;
        op.apply_storage(&mut *guard, &self.layout, axis)?;
        Ok(())
    }

    /// Softmax along `axis`.
    pub fn softmax(&self, axis: usize) -> Result<Array> {
        ensure_kind("softmax", true, self.dtype)?;
        let out = self.copy()?;
        out.softmax_(axis)?;
        Ok(out)
    }

    /// `x - logsumexp(x)` along `axis`.
    pub fn log_softmax(&self, axis: usize) -> Result<Array> {
        ensure_kind("log_softmax", true, self.dtype)?;
        let out = self.copy()?;
        out.log_softmax_(axis)?;
        Ok(out)
    }

    // Products

    /// Matrix product of two rank-2 arrays of the same kind.
    pub fn matmul(&self, rhs: &Array) -> Result<Array> {
        if self.rank() != 2 || rhs.rank() != 2 {
            return Err(Error::RankTooLow {
                op: "matmul",
                min: 2,
                got: self.rank().min(rhs.rank()),
            });
        }
        if self.dtype != rhs.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: rhs.dtype,
            });
        }
        let (m, k) = (self.dims()[0], self.dims()[1]);
        let (k2, n) = (rhs.dims()[0], rhs.dims()[1]);
        if k != k2 {
            return Err(Error::ShapeMismatch {
                expected: Shape::from((k, n)),
                got: rhs.shape().clone(),
            });
        }
        let a = self.to_f64_vec()?;
        let b = rhs.to_f64_vec()?;
        let mut out = vec![0.0f64; m * n];
        if n > 0 {
            out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                for p in 0..k {
                    let av = a[i * k + p];
                    for (j, o) in row.iter_mut().enumerate() {
                        *o += av * b[p * n + j];
                    }
                }
            });
        }
        Array::from_f64_slice(&out, (m, n), self.dtype)
    }

    /// Outer product of two vectors: `[n] x [m] -> [n, m]`.
    pub fn outer(&self, rhs: &Array) -> Result<Array> {
        if self.rank() != 1 || rhs.rank() != 1 {
            return Err(Error::msg(format!(
                "outer: expected two vectors, got shapes {} and {}",
                self.shape(),
                rhs.shape()
            )));
        }
        self.stretch(1)?.mul(&rhs.stretch(0)?)
    }
}
