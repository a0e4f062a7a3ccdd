//! Dynamically typed matrix views.

use std::any::Any;
use std::rc::Rc;

use ndarray::{Array2, Ix2, RawArrayView};

use matbind_abi::MatrixOpaque;

use crate::error::{BindError, BindResult};
use crate::native::{NativeMatrix, NativeObject};
use crate::types::{ElementType, NativeElement};
use crate::view::{MatrixView, ViewId, ViewLineage};

/// A matrix view whose element type is only known at runtime.
#[derive(Debug)]
pub enum HostMatrix {
    F64(MatrixView<f64>),
    F32(MatrixView<f32>),
}

macro_rules! with_view {
    ($host:expr, $v:ident => $body:expr) => {
        match $host {
            HostMatrix::F64($v) => $body,
            HostMatrix::F32($v) => $body,
        }
    };
}

impl HostMatrix {
    pub fn element_type(&self) -> ElementType {
        match self {
            HostMatrix::F64(_) => ElementType::F64,
            HostMatrix::F32(_) => ElementType::F32,
        }
    }

    pub fn id(&self) -> ViewId {
        with_view!(self, v => v.id())
    }

    pub fn shape(&self) -> (usize, usize) {
        with_view!(self, v => v.shape())
    }

    /// Strides in bytes.
    pub fn strides(&self) -> (isize, isize) {
        with_view!(self, v => v.strides())
    }

    pub fn len(&self) -> usize {
        with_view!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owns_data(&self) -> bool {
        with_view!(self, v => v.owns_data())
    }

    pub fn is_derived(&self) -> bool {
        with_view!(self, v => v.is_derived())
    }

    pub fn is_finalized(&self) -> bool {
        with_view!(self, v => v.is_finalized())
    }

    /// Element at `(row, col)`, widened to `f64`.
    pub fn get(&self, row: isize, col: isize) -> BindResult<f64> {
        with_view!(self, v => v.get(row, col).map(NativeElement::to_f64))
    }

    /// Store `value`, narrowed to the element type.
    pub fn set(&mut self, row: isize, col: isize, value: f64) -> BindResult<()> {
        match self {
            HostMatrix::F64(v) => v.set(row, col, value),
            HostMatrix::F32(v) => v.set(row, col, f32::from_f64(value)),
        }
    }

    pub fn at_base_index(&self, row: isize, col: isize) -> BindResult<f64> {
        with_view!(self, v => v.at_base_index(row, col).map(NativeElement::to_f64))
    }

    /// Typed view, if the element type is `T`.
    pub fn as_view<T: NativeElement>(&self) -> Option<&MatrixView<T>> {
        with_view!(self, v => (v as &dyn Any).downcast_ref::<MatrixView<T>>())
    }

    pub fn as_view_mut<T: NativeElement>(&mut self) -> Option<&mut MatrixView<T>> {
        with_view!(self, v => (v as &mut dyn Any).downcast_mut::<MatrixView<T>>())
    }

    /// Unwrap into a typed view, handing `self` back on a type mismatch.
    pub fn into_view<T: NativeElement>(self) -> Result<MatrixView<T>, HostMatrix> {
        if self.element_type() != T::ELEMENT_TYPE {
            return Err(self);
        }
        let boxed = with_view!(self, v => Box::new(v) as Box<dyn Any>);
        match boxed.downcast::<MatrixView<T>>() {
            Ok(view) => Ok(*view),
            Err(_) => unreachable!("element type checked above"),
        }
    }

    /// Derive a typed view; the source must already hold `T` elements.
    pub fn derive_view<T, F>(&self, f: F) -> BindResult<MatrixView<T>>
    where
        T: NativeElement,
        F: FnOnce(RawArrayView<T, Ix2>) -> RawArrayView<T, Ix2>,
    {
        let source = self
            .as_view::<T>()
            .ok_or_else(|| BindError::IncompatibleSource {
                expected: T::ELEMENT_TYPE.name().to_string(),
                found: format!("a {} matrix", self.element_type()),
            })?;
        source.derive(f)
    }

    /// Derive through a transformation that keeps the element type.
    pub fn derive(&self, f: impl DynamicDerivation) -> BindResult<HostMatrix> {
        match self {
            HostMatrix::F64(v) => v.derive(|a| f.apply(a)).map(HostMatrix::F64),
            HostMatrix::F32(v) => v.derive(|a| f.apply(a)).map(HostMatrix::F32),
        }
    }

    pub fn t(&self) -> BindResult<HostMatrix> {
        match self {
            HostMatrix::F64(v) => v.t().map(HostMatrix::F64),
            HostMatrix::F32(v) => v.t().map(HostMatrix::F32),
        }
    }

    pub fn slice(
        &self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> BindResult<HostMatrix> {
        match self {
            HostMatrix::F64(v) => v.slice(rows, cols).map(HostMatrix::F64),
            HostMatrix::F32(v) => v.slice(rows, cols).map(HostMatrix::F32),
        }
    }

    /// Copy of the visible elements as `f64`.
    pub fn to_f64_array(&self) -> Array2<f64> {
        with_view!(self, v => v.to_owned_array().mapv(NativeElement::to_f64))
    }

    pub fn finalize(&mut self) -> BindResult<()> {
        with_view!(self, v => v.finalize())
    }
}

/// A shape transformation applicable to any element type.
pub trait DynamicDerivation {
    fn apply<T: NativeElement>(&self, view: RawArrayView<T, Ix2>) -> RawArrayView<T, Ix2>;
}

impl From<MatrixView<f64>> for HostMatrix {
    fn from(view: MatrixView<f64>) -> Self {
        HostMatrix::F64(view)
    }
}

impl From<MatrixView<f32>> for HostMatrix {
    fn from(view: MatrixView<f32>) -> Self {
        HostMatrix::F32(view)
    }
}

impl ViewLineage for HostMatrix {
    fn view_id(&self) -> ViewId {
        with_view!(self, v => v.view_id())
    }

    fn root_id(&self) -> Option<ViewId> {
        with_view!(self, v => v.root_id())
    }

    fn native_handle(&self) -> Option<Rc<NativeMatrix>> {
        with_view!(self, v => v.native_handle())
    }
}

impl NativeObject for HostMatrix {
    fn c_pointer(&self) -> *mut MatrixOpaque {
        with_view!(self, v => v.c_pointer())
    }

    fn destroy(&mut self) -> BindResult<()> {
        self.finalize()
    }
}
