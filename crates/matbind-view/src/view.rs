//! Zero-copy matrix views over native storage.
//!
//! A [`MatrixView`] aliases the buffer of a native matrix; it never copies.
//! The view that created or adopted a native object with ownership is the
//! root of its chain. Every view derived from it (slices, transposes, …)
//! shares the native handle through an `Rc`, never owns it and points its
//! root back-reference at the ultimate owning ancestor.

use std::fmt;
use std::ops::Range;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ndarray::{
    s, Array2, ArrayBase, ArrayView2, ArrayViewMut2, Axis as ArrayAxis, Ix2, RawArrayView,
    RawArrayViewMut, RawData, ShapeBuilder,
};

use matbind_abi::MatrixOpaque;

use crate::error::{Axis, BindError, BindResult};
use crate::library::SymbolSource;
use crate::native::{NativeLayout, NativeMatrix, NativeObject, RawMatrixHandle};
use crate::shape::{EntryPointMap, ShapeSpec};
use crate::types::{ElementType, NativeElement};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    fn next() -> Self {
        ViewId(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Identity and keep-alive information every view exposes to its children.
pub trait ViewLineage {
    fn view_id(&self) -> ViewId;

    /// Back-reference to the root view, `None` for a root.
    fn root_id(&self) -> Option<ViewId>;

    /// Root of the chain this view belongs to.
    fn ultimate_root(&self) -> ViewId {
        self.root_id().unwrap_or_else(|| self.view_id())
    }

    /// Native matrix children must keep alive: the one this view's own
    /// ancestors are holding, else its own.
    fn native_handle(&self) -> Option<Rc<NativeMatrix>>;
}

/// Construction options for a view.
#[derive(Default)]
pub(crate) struct ViewOptions<'a> {
    /// Adopt this native matrix instead of constructing a new one.
    pub(crate) existing: Option<RawMatrixHandle>,
    /// Ownership of an adopted handle; ignored (forced `true`) on construction.
    pub(crate) owns_data: Option<bool>,
    /// View this one is a shallow copy of.
    pub(crate) parent: Option<&'a dyn ViewLineage>,
}

/// Strided window into native memory.
#[derive(Debug, Clone, Copy)]
struct Buffer<T> {
    ptr: NonNull<T>,
    rows: usize,
    cols: usize,
    /// Element strides.
    row_stride: isize,
    col_stride: isize,
}

impl<T> Buffer<T> {
    fn empty(rows: usize, cols: usize) -> Self {
        debug_assert_eq!(rows * cols, 0);
        Self {
            ptr: NonNull::dangling(),
            rows,
            cols,
            row_stride: 1,
            col_stride: rows.max(1) as isize,
        }
    }

    fn from_native(layout: &NativeLayout<T>) -> Self {
        match NonNull::new(layout.data) {
            Some(ptr) => Self {
                ptr,
                rows: layout.rows,
                cols: layout.cols,
                row_stride: layout.row_stride,
                col_stride: layout.col_stride,
            },
            None if layout.rows * layout.cols == 0 => Self::empty(layout.rows, layout.cols),
            None => {
                log::warn!(
                    "native matrix reported {}x{} elements but a null data pointer; exposing an empty buffer",
                    layout.rows,
                    layout.cols
                );
                Self::empty(0, 0)
            }
        }
    }

    fn from_array<S: RawData<Elem = T>>(view: &ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = view.dim();
        let strides = view.strides();
        match NonNull::new(view.as_ptr() as *mut T) {
            Some(ptr) if rows * cols > 0 => Self {
                ptr,
                rows,
                cols,
                row_stride: strides[0],
                col_stride: strides[1],
            },
            _ => Self::empty(rows, cols),
        }
    }

    fn len(&self) -> usize {
        self.rows * self.cols
    }

    fn offset(&self, row: usize, col: usize) -> isize {
        row as isize * self.row_stride + col as isize * self.col_stride
    }

    /// Smallest and largest element offset touched, relative to `ptr`.
    fn span(&self) -> Option<(isize, isize)> {
        if self.len() == 0 {
            return None;
        }
        let last_row = self.rows - 1;
        let last_col = self.cols - 1;
        let corners = [
            0,
            self.offset(last_row, 0),
            self.offset(0, last_col),
            self.offset(last_row, last_col),
        ];
        let lo = corners.iter().copied().min().unwrap_or(0);
        let hi = corners.iter().copied().max().unwrap_or(0);
        Some((lo, hi))
    }

    /// Whether every element of `inner` lies inside this buffer's span.
    fn covers(&self, inner: &Buffer<T>) -> bool {
        let (Some((lo, hi)), Some((ilo, ihi))) = (self.span(), inner.span()) else {
            return inner.len() == 0;
        };
        let elem = std::mem::size_of::<T>().max(1) as isize;
        let delta = (inner.ptr.as_ptr() as isize).wrapping_sub(self.ptr.as_ptr() as isize);
        if delta % elem != 0 {
            return false;
        }
        let base = delta / elem;
        base + ilo >= lo && base + ihi <= hi
    }

    /// Lowest-addressed element plus absolute strides; the flags mark axes
    /// that must be inverted afterwards to restore logical order.
    fn low_address_layout(&self) -> (*mut T, (usize, usize), [bool; 2]) {
        let mut ptr = self.ptr.as_ptr();
        let mut inverted = [false; 2];
        for (axis, (len, stride)) in [(self.rows, self.row_stride), (self.cols, self.col_stride)]
            .into_iter()
            .enumerate()
        {
            if stride < 0 && len > 0 {
                ptr = ptr.wrapping_offset(stride * (len as isize - 1));
                inverted[axis] = true;
            }
        }
        let strides = (
            self.row_stride.unsigned_abs(),
            self.col_stride.unsigned_abs(),
        );
        (ptr, strides, inverted)
    }

    fn raw_view(&self) -> RawArrayView<T, Ix2> {
        let (ptr, strides, inverted) = self.low_address_layout();
        // SAFETY: a raw view is never dereferenced by ndarray itself
        let mut view =
            unsafe { RawArrayView::from_shape_ptr((self.rows, self.cols).strides(strides), ptr) };
        for (axis, flip) in inverted.into_iter().enumerate() {
            if flip {
                view.invert_axis(ArrayAxis(axis));
            }
        }
        view
    }

    /// # Safety
    ///
    /// The native storage behind `ptr` must be alive for `'a` and not
    /// written through any other path while the view lives.
    unsafe fn view<'a>(&self) -> ArrayView2<'a, T> {
        unsafe { self.raw_view().deref_into_view() }
    }

    /// # Safety
    ///
    /// As [`Buffer::view`], plus no other live view may access the elements.
    unsafe fn view_mut<'a>(&self) -> ArrayViewMut2<'a, T> {
        let (ptr, strides, inverted) = self.low_address_layout();
        let mut view = unsafe {
            RawArrayViewMut::from_shape_ptr((self.rows, self.cols).strides(strides), ptr)
        };
        for (axis, flip) in inverted.into_iter().enumerate() {
            if flip {
                view.invert_axis(ArrayAxis(axis));
            }
        }
        unsafe { view.deref_into_view_mut() }
    }
}

/// Typed, zero-copy view of a native matrix.
pub struct MatrixView<T: NativeElement> {
    id: ViewId,
    spec: ShapeSpec,
    entry_points: Arc<EntryPointMap>,
    /// `None` is the null sentinel left by finalization.
    handle: Option<Rc<NativeMatrix>>,
    /// Parent's native object when this view is a shallow copy of another.
    keep_alive: Option<Rc<NativeMatrix>>,
    owns_data: bool,
    root: Option<ViewId>,
    derived: bool,
    /// Extent of the native object itself, which `at_base_index` addresses.
    base_shape: (usize, usize),
    buffer: Buffer<T>,
}

impl<T: NativeElement> MatrixView<T> {
    /// Acquire (construct or adopt) a native matrix and wrap its storage.
    pub(crate) fn acquire(
        symbols: Arc<dyn SymbolSource>,
        spec: ShapeSpec,
        options: ViewOptions<'_>,
    ) -> BindResult<Self> {
        if spec.element_type != T::ELEMENT_TYPE {
            return Err(BindError::InvalidType {
                given: spec.element_type.name().to_string(),
                supported: format!("({})", T::ELEMENT_TYPE.name()),
            });
        }

        let entry_points = Arc::new(spec.resolve().entry_points);

        let (native, owns_data) = match options.existing {
            None => {
                if options.owns_data == Some(false) {
                    log::debug!(
                        "ignoring owns_data=false for a newly constructed {} matrix",
                        entry_points.suffix()
                    );
                }
                let native =
                    NativeMatrix::construct(symbols, entry_points.clone(), spec.rows, spec.cols)?;
                (native, true)
            }
            Some(raw) => {
                let owns = options.owns_data.unwrap_or(false);
                (
                    NativeMatrix::wrap(symbols, entry_points.clone(), raw, owns),
                    owns,
                )
            }
        };

        // On query failure `native` drops here, destroying it when owned.
        let layout = native.query_layout::<T>()?;
        let buffer = Buffer::from_native(&layout);

        let (root, keep_alive) = match options.parent {
            Some(parent) => (Some(parent.ultimate_root()), parent.native_handle()),
            None => (None, None),
        };

        let view = Self {
            id: ViewId::next(),
            spec,
            entry_points,
            handle: Some(Rc::new(native)),
            keep_alive,
            owns_data,
            root,
            derived: false,
            base_shape: (layout.rows, layout.cols),
            buffer,
        };
        log::debug!(
            "created {} over {}x{} {} matrix (owns: {}, root: {:?})",
            view.id,
            buffer.rows,
            buffer.cols,
            T::ELEMENT_TYPE,
            owns_data,
            root
        );
        Ok(view)
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn spec(&self) -> &ShapeSpec {
        &self.spec
    }

    pub fn element_type(&self) -> ElementType {
        T::ELEMENT_TYPE
    }

    pub fn entry_points(&self) -> &EntryPointMap {
        &self.entry_points
    }

    /// Current (possibly sliced) shape.
    pub fn shape(&self) -> (usize, usize) {
        (self.buffer.rows, self.buffer.cols)
    }

    /// Strides in bytes.
    pub fn strides(&self) -> (isize, isize) {
        let size = std::mem::size_of::<T>() as isize;
        (self.buffer.row_stride * size, self.buffer.col_stride * size)
    }

    /// Strides in elements.
    pub fn element_strides(&self) -> (isize, isize) {
        (self.buffer.row_stride, self.buffer.col_stride)
    }

    /// Number of elements visible through this view.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owns_data(&self) -> bool {
        self.owns_data
    }

    pub fn is_derived(&self) -> bool {
        self.derived
    }

    pub fn is_finalized(&self) -> bool {
        self.handle.is_none()
    }

    pub fn raw_handle(&self) -> Option<RawMatrixHandle> {
        self.handle.as_ref().map(|h| h.raw())
    }

    /// Raw ndarray view of the aliased native storage.
    pub fn raw_array(&self) -> RawArrayView<T, Ix2> {
        self.buffer.raw_view()
    }

    /// Borrow the aliased native storage as an ndarray view.
    ///
    /// # Safety
    ///
    /// Other views of the same native matrix alias this memory; the caller
    /// must ensure none of them is written while the result lives.
    pub unsafe fn as_array(&self) -> ArrayView2<'_, T> {
        unsafe { self.buffer.view() }
    }

    /// Mutable ndarray view of the native storage.
    ///
    /// # Safety
    ///
    /// Other views of the same native matrix alias this memory; the caller
    /// must ensure none of them is read or written while the result lives.
    pub unsafe fn as_array_mut(&mut self) -> ArrayViewMut2<'_, T> {
        unsafe { self.buffer.view_mut() }
    }

    /// Copy the visible elements into an owned array.
    pub fn to_owned_array(&self) -> Array2<T> {
        // SAFETY: the borrow ends inside this call and views are !Send
        unsafe { self.as_array() }.to_owned()
    }

    fn live_handle(&self, operation: &str) -> BindResult<&Rc<NativeMatrix>> {
        self.handle
            .as_ref()
            .ok_or_else(|| BindError::null_handle(operation))
    }

    fn check_bounds(&self, row: isize, col: isize) -> BindResult<(usize, usize)> {
        let r = checked_index(Axis::Row, row, self.buffer.rows)?;
        let c = checked_index(Axis::Col, col, self.buffer.cols)?;
        Ok((r, c))
    }

    /// Element at `(row, col)` of this view.
    ///
    /// Root-addressed views read through the native `get` entry point;
    /// derived views read through their own strided window, since their
    /// indices do not match the native object's addressing.
    pub fn get(&self, row: isize, col: isize) -> BindResult<T> {
        let handle = self.live_handle("get")?;
        let (r, c) = self.check_bounds(row, col)?;
        if self.derived {
            // SAFETY: bounds checked; storage kept alive by `handle`
            Ok(unsafe { *self.buffer.ptr.as_ptr().offset(self.buffer.offset(r, c)) })
        } else {
            handle.get(row, col)
        }
    }

    /// Store `value` at `(row, col)` of this view; addressing as [`Self::get`].
    pub fn set(&mut self, row: isize, col: isize, value: T) -> BindResult<()> {
        let handle = self.live_handle("set")?;
        let (r, c) = self.check_bounds(row, col)?;
        if self.derived {
            // SAFETY: bounds checked; storage kept alive by `handle`
            unsafe { *self.buffer.ptr.as_ptr().offset(self.buffer.offset(r, c)) = value };
            Ok(())
        } else {
            handle.set(row, col, value)
        }
    }

    /// Native `get` with untranslated indices into the base matrix.
    ///
    /// Bounds are checked against this view's shape, which for a sliced view
    /// can differ from the base matrix shape.
    pub fn at_base_index(&self, row: isize, col: isize) -> BindResult<T> {
        let handle = self.live_handle("at_base_index")?;
        self.check_bounds(row, col)?;
        // the native accessor does not bounds-check
        checked_index(Axis::Row, row, self.base_shape.0)?;
        checked_index(Axis::Col, col, self.base_shape.1)?;
        handle.get(row, col)
    }

    /// Derive a non-owning view through an ndarray transformation.
    ///
    /// The closure must return a view into the memory it was given.
    pub fn derive<F>(&self, f: F) -> BindResult<MatrixView<T>>
    where
        F: FnOnce(RawArrayView<T, Ix2>) -> RawArrayView<T, Ix2>,
    {
        let handle = self.live_handle("derive")?.clone();
        let derived = f(self.raw_array());
        let buffer = Buffer::from_array(&derived);
        if !self.buffer.covers(&buffer) {
            return Err(BindError::IncompatibleSource {
                expected: format!("view aliasing {}", self.id),
                found: "an array outside the source buffer".to_string(),
            });
        }

        let view = MatrixView {
            id: ViewId::next(),
            spec: self.spec,
            entry_points: self.entry_points.clone(),
            handle: Some(handle),
            keep_alive: self.keep_alive.clone(),
            owns_data: false,
            root: Some(self.ultimate_root()),
            derived: true,
            base_shape: self.base_shape,
            buffer,
        };
        log::trace!(
            "derived {} from {} (root {})",
            view.id,
            self.id,
            view.ultimate_root()
        );
        Ok(view)
    }

    /// Rectangular sub-view.
    pub fn slice(&self, rows: Range<usize>, cols: Range<usize>) -> BindResult<MatrixView<T>> {
        check_range(Axis::Row, &rows, self.buffer.rows)?;
        check_range(Axis::Col, &cols, self.buffer.cols)?;
        self.derive(move |a| a.slice_move(s![rows, cols]))
    }

    pub fn row(&self, row: usize) -> BindResult<MatrixView<T>> {
        let r = checked_position(Axis::Row, row, self.buffer.rows)?;
        self.slice(r..r + 1, 0..self.buffer.cols)
    }

    pub fn column(&self, col: usize) -> BindResult<MatrixView<T>> {
        let c = checked_position(Axis::Col, col, self.buffer.cols)?;
        self.slice(0..self.buffer.rows, c..c + 1)
    }

    /// Transposed view.
    pub fn t(&self) -> BindResult<MatrixView<T>> {
        self.derive(|a| a.reversed_axes())
    }

    /// Release the native matrix if this view owns it.
    ///
    /// No-op for non-owning views and for views already finalized. When
    /// derived views still share the native object, destruction happens when
    /// the last of them drops.
    pub fn finalize(&mut self) -> BindResult<()> {
        if !self.owns_data {
            return Ok(());
        }
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.keep_alive = None;
        self.buffer = Buffer::empty(0, 0);

        match Rc::try_unwrap(handle) {
            Ok(native) => native.release(),
            Err(shared) => {
                log::debug!(
                    "{} finalized; {} derived view(s) still share native matrix {:p}",
                    self.id,
                    Rc::strong_count(&shared) - 1,
                    shared.raw().as_ptr()
                );
                Ok(())
            }
        }
    }
}

fn checked_index(axis: Axis, index: isize, bound: usize) -> BindResult<usize> {
    match usize::try_from(index) {
        Ok(i) if i < bound => Ok(i),
        _ => Err(BindError::Range { axis, index, bound }),
    }
}

fn checked_position(axis: Axis, index: usize, bound: usize) -> BindResult<usize> {
    if index < bound {
        Ok(index)
    } else {
        Err(BindError::Range {
            axis,
            index: isize::try_from(index).unwrap_or(isize::MAX),
            bound,
        })
    }
}

fn check_range(axis: Axis, range: &Range<usize>, bound: usize) -> BindResult<()> {
    if range.start > range.end {
        return Err(BindError::Range {
            axis,
            index: isize::try_from(range.start).unwrap_or(isize::MAX),
            bound,
        });
    }
    if range.end > bound {
        return Err(BindError::Range {
            axis,
            index: isize::try_from(range.end).unwrap_or(isize::MAX),
            bound,
        });
    }
    Ok(())
}

impl<T: NativeElement> ViewLineage for MatrixView<T> {
    fn view_id(&self) -> ViewId {
        self.id
    }

    fn root_id(&self) -> Option<ViewId> {
        self.root
    }

    fn native_handle(&self) -> Option<Rc<NativeMatrix>> {
        self.keep_alive.clone().or_else(|| self.handle.clone())
    }
}

impl<T: NativeElement> NativeObject for MatrixView<T> {
    fn c_pointer(&self) -> *mut MatrixOpaque {
        self.raw_handle()
            .map(RawMatrixHandle::as_ptr)
            .unwrap_or(std::ptr::null_mut())
    }

    fn destroy(&mut self) -> BindResult<()> {
        self.finalize()
    }
}

impl<T: NativeElement> Drop for MatrixView<T> {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::warn!("finalizing {} failed: {e}", self.id);
        }
    }
}

impl<T: NativeElement> fmt::Debug for MatrixView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixView")
            .field("id", &self.id)
            .field("suffix", &self.entry_points.suffix())
            .field("shape", &self.shape())
            .field("strides", &self.strides())
            .field("owns_data", &self.owns_data)
            .field("root", &self.root)
            .field("derived", &self.derived)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}
