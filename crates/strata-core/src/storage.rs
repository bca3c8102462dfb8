use std::fmt;

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};

// Storage — Flat, kind-tagged element buffers
//
// Storage is the only place element values live. It is never handed to
// callers directly: every read and write goes through a view (Array) whose
// Layout maps logical indices to linear storage positions.
//
// Two buffer flavours exist for each element kind:
//
//   Dense   — a plain Vec<T>. Operators may borrow it as a slice and run
//             their specialized unit-stride or strided loops on it.
//   Mapped  — a virtual buffer that resolves each logical position through
//             an index table into a source vector (row selections over a
//             column store, gathered samples, ...). It only honours the
//             get/set contract, so operators fall back to their generic loop.
//
// The `supports_vectorization` flag is what the dispatcher asks; it never
// inspects the flavour itself.

/// Virtual buffer: logical position `i` lives at `source[index[i]]`.
#[derive(Clone)]
pub struct MappedBuffer<T> {
    source: Vec<T>,
    index: Vec<usize>,
}

impl<T: WithDType> MappedBuffer<T> {
    /// Build a mapped buffer; every index entry must address `source`.
    pub fn new(source: Vec<T>, index: Vec<usize>) -> Result<Self> {
        if let Some(&bad) = index.iter().find(|&&i| i >= source.len()) {
            return Err(Error::msg(format!(
                "mapped buffer index {} out of range for source of length {}",
                bad,
                source.len()
            )));
        }
        Ok(MappedBuffer { source, index })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Typed flat buffer with get/set by linear position.
#[derive(Clone)]
pub enum Buffer<T> {
    Dense(Vec<T>),
    Mapped(MappedBuffer<T>),
}

impl<T: WithDType> Buffer<T> {
    /// Number of addressable positions.
    pub fn len(&self) -> usize {
        match self {
            Buffer::Dense(v) => v.len(),
            Buffer::Mapped(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, pos: usize) -> T {
        match self {
            Buffer::Dense(v) => v[pos],
            Buffer::Mapped(m) => m.source[m.index[pos]],
        }
    }

    #[inline]
    pub fn set(&mut self, pos: usize, value: T) {
        match self {
            Buffer::Dense(v) => v[pos] = value,
            Buffer::Mapped(m) => {
                let p = m.index[pos];
                m.source[p] = value;
            }
        }
    }

    /// Whether operators may run their specialized slice loops on this buffer.
    pub fn supports_vectorization(&self) -> bool {
        matches!(self, Buffer::Dense(_))
    }

    /// Borrow the backing slice (dense buffers only).
    pub fn as_slice(&self) -> Option<&[T]> {
        match self {
            Buffer::Dense(v) => Some(v),
            Buffer::Mapped(_) => None,
        }
    }

    /// Mutably borrow the backing slice (dense buffers only).
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match self {
            Buffer::Dense(v) => Some(v),
            Buffer::Mapped(_) => None,
        }
    }
}

/// Kind-tagged storage: one typed buffer per supported element kind.
#[derive(Clone)]
pub enum Storage {
    U8(Buffer<u8>),
    I32(Buffer<i32>),
    F32(Buffer<f32>),
    F64(Buffer<f64>),
}

impl Storage {
    /// Dense storage of `len` copies of `value` converted to `dtype`.
    pub fn filled(dtype: DType, len: usize, value: f64) -> Storage {
        match dtype {
            DType::U8 => Storage::U8(Buffer::Dense(vec![u8::from_f64(value); len])),
            DType::I32 => Storage::I32(Buffer::Dense(vec![i32::from_f64(value); len])),
            DType::F32 => Storage::F32(Buffer::Dense(vec![f32::from_f64(value); len])),
            DType::F64 => Storage::F64(Buffer::Dense(vec![value; len])),
        }
    }

    /// Dense storage converting each f64 to `dtype`.
    pub fn from_f64_slice(dtype: DType, data: &[f64]) -> Storage {
        fn conv<T: WithDType>(data: &[f64]) -> Storage {
            T::into_storage(Buffer::Dense(data.iter().map(|&v| T::from_f64(v)).collect()))
        }
        match dtype {
            DType::U8 => conv::<u8>(data),
            DType::I32 => conv::<i32>(data),
            DType::F32 => conv::<f32>(data),
            DType::F64 => conv::<f64>(data),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Storage::U8(_) => DType::U8,
            Storage::I32(_) => DType::I32,
            Storage::F32(_) => DType::F32,
            Storage::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::U8(b) => b.len(),
            Storage::I32(b) => b.len(),
            Storage::F32(b) => b.len(),
            Storage::F64(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn supports_vectorization(&self) -> bool {
        match self {
            Storage::U8(b) => b.supports_vectorization(),
            Storage::I32(b) => b.supports_vectorization(),
            Storage::F32(b) => b.supports_vectorization(),
            Storage::F64(b) => b.supports_vectorization(),
        }
    }

    /// Read one position as f64, whatever the kind.
    pub fn get_f64(&self, pos: usize) -> f64 {
        match self {
            Storage::U8(b) => b.get(pos).to_f64(),
            Storage::I32(b) => b.get(pos).to_f64(),
            Storage::F32(b) => b.get(pos).to_f64(),
            Storage::F64(b) => b.get(pos),
        }
    }

    /// Write one position from f64, converting to the storage kind.
    pub fn set_f64(&mut self, pos: usize, value: f64) {
        match self {
            Storage::U8(b) => b.set(pos, u8::from_f64(value)),
            Storage::I32(b) => b.set(pos, i32::from_f64(value)),
            Storage::F32(b) => b.set(pos, f32::from_f64(value)),
            Storage::F64(b) => b.set(pos, value),
        }
    }

    /// Typed view of the buffer, failing if the kinds disagree.
    pub fn typed<T: WithDType>(&self) -> Result<&Buffer<T>> {
        T::buffer(self).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            got: self.dtype(),
        })
    }

    /// Mutable typed view of the buffer, failing if the kinds disagree.
    pub fn typed_mut<T: WithDType>(&mut self) -> Result<&mut Buffer<T>> {
        let got = self.dtype();
        T::buffer_mut(self).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }
}

/// Run `$body` with `$b` bound to the typed buffer inside a [`Storage`].
/// The body is monomorphized once per element kind.
#[macro_export]
macro_rules! with_buffer {
    ($storage:expr, $b:ident => $body:expr) => {
        match $storage {
            $crate::storage::Storage::U8($b) => $body,
            $crate::storage::Storage::I32($b) => $body,
            $crate::storage::Storage::F32($b) => $body,
            $crate::storage::Storage::F64($b) => $body,
        }
    };
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flavour = if self.supports_vectorization() {
            "dense"
        } else {
            "mapped"
        };
        write!(
            f,
            "Storage::{}({} {} elements)",
            self.dtype(),
            flavour,
            self.len()
        )
    }
}
