use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use smallvec::{smallvec, SmallVec};

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Element count, rejecting shapes whose product overflows `usize`.
    pub fn numel(&self) -> Result<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| Error::ShapeOverflow {
                dims: self.to_string(),
                target: "usize",
            })
    }

    /// Dims in the engine-facing index width.
    ///
    /// Both every axis and the element count must be representable as `i64`.
    pub fn to_engine_dims(&self) -> Result<Vec<i64>> {
        let overflow = || Error::ShapeOverflow {
            dims: self.to_string(),
            target: "i64",
        };
        let dims = self
            .0
            .iter()
            .map(|d| i64::try_from(*d).map_err(|_| overflow()))
            .collect::<Result<Vec<_>>>()?;
        dims.iter()
            .try_fold(1i64, |acc, d| acc.checked_mul(*d))
            .ok_or_else(overflow)?;
        Ok(dims)
    }

    pub fn from_engine_dims(dims: &[i64]) -> Result<Self> {
        let mut out = SmallVec::with_capacity(dims.len());
        for (axis, d) in dims.iter().enumerate() {
            let d = usize::try_from(*d).map_err(|_| Error::NegativeDimension {
                axis,
                dims: dims.to_vec(),
            })?;
            out.push(d);
        }
        let shape = Self(out);
        shape.numel()?;
        Ok(shape)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::from_slice(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(SmallVec::from_vec(dims))
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::from_slice(&dims)
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

/// Which axis varies fastest in flat storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Last axis fastest (C order).
    RowMajor,
    /// First axis fastest (Fortran order).
    ColumnMajor,
}

impl Layout {
    pub fn opposite(self) -> Self {
        match self {
            Layout::RowMajor => Layout::ColumnMajor,
            Layout::ColumnMajor => Layout::RowMajor,
        }
    }

    /// Element strides for `dims` under this layout.
    pub fn strides(self, dims: &[usize]) -> SmallVec<[usize; 6]> {
        let mut strides: SmallVec<[usize; 6]> = smallvec![0; dims.len()];
        let mut acc = 1usize;
        match self {
            Layout::RowMajor => {
                for axis in (0..dims.len()).rev() {
                    strides[axis] = acc;
                    acc = acc.saturating_mul(dims[axis]);
                }
            }
            Layout::ColumnMajor => {
                for axis in 0..dims.len() {
                    strides[axis] = acc;
                    acc = acc.saturating_mul(dims[axis]);
                }
            }
        }
        strides
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::RowMajor => f.write_str("row-major"),
            Layout::ColumnMajor => f.write_str("column-major"),
        }
    }
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row-major" | "row_major" | "c" => Ok(Layout::RowMajor),
            "column-major" | "column_major" | "col-major" | "f" | "fortran" => {
                Ok(Layout::ColumnMajor)
            }
            other => Err(Error::config(format!("unknown tensor layout `{other}`"))),
        }
    }
}

/// Copies `src` (laid out as `from`) into `dst` laid out the opposite way.
///
/// Walks the source in storage order while tracking the destination offset
/// incrementally, so no per-element index arithmetic is repeated.
pub fn convert_layout_into(src: &[f32], dims: &[usize], from: Layout, dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    if dims.len() < 2 {
        dst.copy_from_slice(src);
        return;
    }

    let rank = dims.len();
    let dst_strides = from.opposite().strides(dims);
    let fastest_first: SmallVec<[usize; 6]> = match from {
        Layout::RowMajor => (0..rank).rev().collect(),
        Layout::ColumnMajor => (0..rank).collect(),
    };

    let mut index: SmallVec<[usize; 6]> = smallvec![0; rank];
    let mut offset = 0usize;
    for &value in src {
        dst[offset] = value;
        for &axis in &fastest_first {
            index[axis] += 1;
            offset += dst_strides[axis];
            if index[axis] < dims[axis] {
                break;
            }
            offset -= dst_strides[axis] * dims[axis];
            index[axis] = 0;
        }
    }
}

#[derive(Debug)]
enum Storage<'a> {
    Owned(Vec<f32>),
    Borrowed(&'a [f32]),
    BorrowedMut(&'a mut [f32]),
}

/// A shaped `f32` buffer with an explicit layout and ownership mode.
///
/// Owned tensors free their storage on drop; wrapped tensors borrow the
/// caller's slice and leave it untouched when dropped.
#[derive(Debug)]
pub struct Tensor<'a> {
    shape: Shape,
    layout: Layout,
    storage: Storage<'a>,
}

fn checked_len(shape: &Shape, len: usize) -> Result<()> {
    let expected = shape.numel()?;
    if expected != len {
        return Err(Error::DataLength {
            shape: shape.clone(),
            len,
            expected,
        });
    }
    Ok(())
}

impl Tensor<'static> {
    pub fn from_vec(shape: impl Into<Shape>, layout: Layout, data: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        checked_len(&shape, data.len())?;
        Ok(Self {
            shape,
            layout,
            storage: Storage::Owned(data),
        })
    }

    /// Copies an external buffer into owned storage.
    pub fn copy_from_slice(shape: impl Into<Shape>, layout: Layout, data: &[f32]) -> Result<Self> {
        Self::from_vec(shape, layout, data.to_vec())
    }

    /// Allocates zeroed, owned storage, typically to capture outputs.
    pub fn zeros(shape: impl Into<Shape>, layout: Layout) -> Result<Self> {
        let shape = shape.into();
        let len = shape.numel()?;
        Ok(Self {
            shape,
            layout,
            storage: Storage::Owned(vec![0.0; len]),
        })
    }
}

impl<'a> Tensor<'a> {
    /// Wraps caller storage read-only, without taking ownership.
    pub fn wrap(shape: impl Into<Shape>, layout: Layout, data: &'a [f32]) -> Result<Self> {
        let shape = shape.into();
        checked_len(&shape, data.len())?;
        Ok(Self {
            shape,
            layout,
            storage: Storage::Borrowed(data),
        })
    }

    /// Wraps caller storage writably, e.g. as an inference destination.
    pub fn wrap_mut(shape: impl Into<Shape>, layout: Layout, data: &'a mut [f32]) -> Result<Self> {
        let shape = shape.into();
        checked_len(&shape, data.len())?;
        Ok(Self {
            shape,
            layout,
            storage: Storage::BorrowedMut(data),
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn size(&self) -> usize {
        self.data().len()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_row_major(&self) -> bool {
        self.layout == Layout::RowMajor
    }

    pub fn is_column_major(&self) -> bool {
        self.layout == Layout::ColumnMajor
    }

    pub fn owns_storage(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self.storage, Storage::Borrowed(_))
    }

    pub fn data(&self) -> &[f32] {
        match &self.storage {
            Storage::Owned(v) => v.as_slice(),
            Storage::Borrowed(s) => *s,
            Storage::BorrowedMut(s) => &**s,
        }
    }

    pub fn data_mut(&mut self) -> Result<&mut [f32]> {
        match &mut self.storage {
            Storage::Owned(v) => Ok(v.as_mut_slice()),
            Storage::BorrowedMut(s) => Ok(&mut **s),
            Storage::Borrowed(_) => Err(Error::ReadOnlyTensor(self.shape.to_string())),
        }
    }

    /// Logical element at `index` (outer-to-inner), independent of layout.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.rank() || index.iter().zip(self.dims()).any(|(i, d)| i >= d) {
            return None;
        }
        let strides = self.layout.strides(self.dims());
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        self.data().get(offset).copied()
    }

    /// Values in row-major order, borrowing when no reordering is needed.
    pub fn row_major_values(&self) -> Cow<'_, [f32]> {
        if self.is_row_major() || self.rank() < 2 {
            Cow::Borrowed(self.data())
        } else {
            Cow::Owned(self.to_opposite_layout().into_vec())
        }
    }

    /// Same shape and logical values, opposite layout tag, owned storage.
    pub fn to_opposite_layout(&self) -> Tensor<'static> {
        let mut out = vec![0.0; self.size()];
        convert_layout_into(self.data(), self.dims(), self.layout, &mut out);
        Tensor {
            shape: self.shape.clone(),
            layout: self.layout.opposite(),
            storage: Storage::Owned(out),
        }
    }

    /// Owned copy in `layout`, converting only when it differs.
    pub fn to_layout(&self, layout: Layout) -> Tensor<'static> {
        if layout == self.layout {
            self.to_owned_copy()
        } else {
            self.to_opposite_layout()
        }
    }

    /// Rewrites this tensor into `layout`.
    ///
    /// Writable wrapped storage is transposed in place in the caller's
    /// buffer; read-only wrapped storage is replaced by an owned copy.
    pub fn convert_layout(&mut self, layout: Layout) {
        if layout == self.layout {
            return;
        }
        let converted = self.to_opposite_layout().into_vec();
        match &mut self.storage {
            Storage::BorrowedMut(s) => s.copy_from_slice(&converted),
            storage => *storage = Storage::Owned(converted),
        }
        self.layout = layout;
    }

    /// Independent, fully owned copy with the same layout.
    pub fn to_owned_copy(&self) -> Tensor<'static> {
        Tensor {
            shape: self.shape.clone(),
            layout: self.layout,
            storage: Storage::Owned(self.data().to_vec()),
        }
    }

    pub fn into_vec(self) -> Vec<f32> {
        match self.storage {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s.to_vec(),
            Storage::BorrowedMut(s) => s.to_vec(),
        }
    }
}
