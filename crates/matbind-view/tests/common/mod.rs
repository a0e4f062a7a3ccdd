//! In-process stand-in for the native matrix library.
//!
//! Every entry point is an `extern "C"` function registered in a
//! [`SymbolTable`] under the real symbol names, so the binder exercises the
//! same resolution and calling path it uses against a shared library.
//! Counters and failure switches are per thread; each test runs on its own.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::{c_void, CString};
use std::sync::Arc;

use matbind_abi::{ErrorHandleRaw, MatrixOpaque};
use matbind_view::{MatrixBinder, NativeElement, SymbolTable};

/// Shapes the stand-in library exports.
pub const SUFFIXES_F64: [&str; 4] = ["2x1d", "2x2d", "XxXd", "3xXd"];
pub const SUFFIXES_F32: [&str; 2] = ["3x3f", "XxXf"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub new: usize,
    pub new_sized: usize,
    pub destroy: usize,
    pub get: usize,
    pub set: usize,
    pub queries: usize,
    pub data: usize,
    pub eh_new: usize,
    pub eh_destroy: usize,
    /// Destroy calls on pointers that were not live.
    pub invalid_destroy: usize,
}

impl CallCounts {
    /// Every native call, error handles included.
    pub fn total(&self) -> usize {
        self.new
            + self.new_sized
            + self.destroy
            + self.get
            + self.set
            + self.queries
            + self.data
            + self.eh_new
            + self.eh_destroy
    }
}

thread_local! {
    static COUNTS: RefCell<CallCounts> = RefCell::new(CallCounts::default());
    static LIVE: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
    static FAIL_ON: RefCell<Option<&'static str>> = const { RefCell::new(None) };
    static NULL_DATA: Cell<bool> = const { Cell::new(false) };
    static ROW_MAJOR: Cell<bool> = const { Cell::new(false) };
}

fn bump(f: impl FnOnce(&mut CallCounts)) {
    COUNTS.with(|c| f(&mut c.borrow_mut()));
}

pub fn counts() -> CallCounts {
    COUNTS.with(|c| c.borrow().clone())
}

pub fn reset_counts() {
    COUNTS.with(|c| *c.borrow_mut() = CallCounts::default());
}

/// Number of native matrices allocated and not yet destroyed.
pub fn live_matrices() -> usize {
    LIVE.with(|l| l.borrow().len())
}

/// Make the named entry point (`new_sized`, `rows`, `data`, …) fail.
pub fn fail_on(entry: Option<&'static str>) {
    FAIL_ON.with(|f| *f.borrow_mut() = entry);
}

pub fn null_data(enabled: bool) {
    NULL_DATA.with(|n| n.set(enabled));
}

/// Lay out newly created matrices row-major instead of column-major.
pub fn row_major(enabled: bool) {
    ROW_MAJOR.with(|r| r.set(enabled));
}

fn should_fail(entry: &str) -> bool {
    FAIL_ON.with(|f| *f.borrow() == Some(entry))
}

struct FakeMatrix<T> {
    rows: usize,
    cols: usize,
    row_major: bool,
    data: Vec<T>,
}

impl<T> FakeMatrix<T> {
    fn strides(&self) -> (isize, isize) {
        if self.row_major {
            (self.cols as isize, 1)
        } else {
            (1, self.rows as isize)
        }
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        let (rs, cs) = self.strides();
        (row as isize * rs + col as isize * cs) as usize
    }
}

unsafe fn matrix<'a, T>(m: *mut MatrixOpaque) -> &'a mut FakeMatrix<T> {
    &mut *(m as *mut FakeMatrix<T>)
}

unsafe fn report(eh: *mut ErrorHandleRaw, entry: &str, message: String) {
    if let Some(eh) = eh.as_mut() {
        eh.error_code = 1;
        eh.message = CString::new(format!("{entry}: {message}"))
            .unwrap()
            .into_raw();
    }
}

unsafe fn fail_if_injected(eh: *mut ErrorHandleRaw, entry: &str) -> bool {
    if should_fail(entry) {
        report(eh, entry, "injected failure".to_string());
        true
    } else {
        false
    }
}

fn allocate<T: NativeElement + Default>(rows: usize, cols: usize) -> *mut MatrixOpaque {
    let m = Box::new(FakeMatrix {
        rows,
        cols,
        row_major: ROW_MAJOR.with(Cell::get),
        data: vec![T::default(); rows * cols],
    });
    let ptr = Box::into_raw(m) as *mut MatrixOpaque;
    LIVE.with(|l| l.borrow_mut().insert(ptr as usize));
    ptr
}

extern "C" fn eh_new() -> *mut ErrorHandleRaw {
    bump(|c| c.eh_new += 1);
    Box::into_raw(Box::new(ErrorHandleRaw::default()))
}

extern "C" fn eh_destroy(eh: *mut ErrorHandleRaw) {
    bump(|c| c.eh_destroy += 1);
    if eh.is_null() {
        return;
    }
    let eh = unsafe { Box::from_raw(eh) };
    if !eh.message.is_null() {
        drop(unsafe { CString::from_raw(eh.message) });
    }
}

extern "C" fn new<T: NativeElement + Default>() -> *mut MatrixOpaque {
    bump(|c| c.new += 1);
    allocate::<T>(0, 0)
}

extern "C" fn new_sized<T: NativeElement + Default>(rows: isize, cols: isize) -> *mut MatrixOpaque {
    bump(|c| c.new_sized += 1);
    if should_fail("new_sized") || rows < 0 || cols < 0 {
        return std::ptr::null_mut();
    }
    allocate::<T>(rows as usize, cols as usize)
}

extern "C" fn destroy<T>(m: *mut MatrixOpaque, eh: *mut ErrorHandleRaw) {
    bump(|c| c.destroy += 1);
    if unsafe { fail_if_injected(eh, "destroy") } {
        return;
    }
    let was_live = LIVE.with(|l| l.borrow_mut().remove(&(m as usize)));
    if was_live {
        drop(unsafe { Box::from_raw(m as *mut FakeMatrix<T>) });
    } else {
        bump(|c| c.invalid_destroy += 1);
    }
}

extern "C" fn get<T: Copy>(m: *mut MatrixOpaque, row: isize, col: isize, eh: *mut ErrorHandleRaw) -> T
where
    T: Default,
{
    bump(|c| c.get += 1);
    unsafe {
        if fail_if_injected(eh, "get") {
            return T::default();
        }
        let m = matrix::<T>(m);
        if row < 0 || col < 0 || row as usize >= m.rows || col as usize >= m.cols {
            report(eh, "get", format!("index ({row}, {col}) out of range"));
            return T::default();
        }
        m.data[m.offset(row as usize, col as usize)]
    }
}

extern "C" fn set<T: Copy>(m: *mut MatrixOpaque, row: isize, col: isize, value: T, eh: *mut ErrorHandleRaw) {
    bump(|c| c.set += 1);
    unsafe {
        if fail_if_injected(eh, "set") {
            return;
        }
        let m = matrix::<T>(m);
        if row < 0 || col < 0 || row as usize >= m.rows || col as usize >= m.cols {
            report(eh, "set", format!("index ({row}, {col}) out of range"));
            return;
        }
        let offset = m.offset(row as usize, col as usize);
        m.data[offset] = value;
    }
}

macro_rules! extent_fn {
    ($name:ident, $entry:literal, |$m:ident| $value:expr) => {
        extern "C" fn $name<T>(m: *mut MatrixOpaque, eh: *mut ErrorHandleRaw) -> isize {
            bump(|c| c.queries += 1);
            unsafe {
                if fail_if_injected(eh, $entry) {
                    return 0;
                }
                let $m = matrix::<T>(m);
                $value
            }
        }
    };
}

extent_fn!(rows, "rows", |m| m.rows as isize);
extent_fn!(cols, "cols", |m| m.cols as isize);
extent_fn!(row_stride, "row_stride", |m| m.strides().0);
extent_fn!(col_stride, "col_stride", |m| m.strides().1);

extern "C" fn data<T>(m: *mut MatrixOpaque, eh: *mut ErrorHandleRaw) -> *mut T {
    bump(|c| c.data += 1);
    unsafe {
        if fail_if_injected(eh, "data") || NULL_DATA.with(Cell::get) {
            return std::ptr::null_mut();
        }
        matrix::<T>(m).data.as_mut_ptr()
    }
}

fn register<T: NativeElement + Default>(table: &mut SymbolTable, suffix: &str) {
    let name = |word: &str| format!("vital_eigen_matrix{suffix}_{word}");
    table.insert(name("new"), new::<T> as *const c_void);
    table.insert(name("new_sized"), new_sized::<T> as *const c_void);
    table.insert(name("destroy"), destroy::<T> as *const c_void);
    table.insert(name("get"), get::<T> as *const c_void);
    table.insert(name("set"), set::<T> as *const c_void);
    table.insert(name("rows"), rows::<T> as *const c_void);
    table.insert(name("cols"), cols::<T> as *const c_void);
    table.insert(name("row_stride"), row_stride::<T> as *const c_void);
    table.insert(name("col_stride"), col_stride::<T> as *const c_void);
    table.insert(name("data"), data::<T> as *const c_void);
}

pub fn symbol_table() -> SymbolTable {
    let mut table = SymbolTable::new("stand-in vital_c")
        .with("vital_eh_new", eh_new as *const c_void)
        .with("vital_eh_destroy", eh_destroy as *const c_void);
    for suffix in SUFFIXES_F64 {
        register::<f64>(&mut table, suffix);
    }
    for suffix in SUFFIXES_F32 {
        register::<f32>(&mut table, suffix);
    }
    table
}

/// Binder over the stand-in library with all switches and counters reset.
pub fn binder() -> MatrixBinder {
    fail_on(None);
    null_data(false);
    row_major(false);
    reset_counts();
    MatrixBinder::new(Arc::new(symbol_table()))
}

/// Allocate a native matrix outside the binder, as foreign code would.
pub fn external_matrix<T: NativeElement + Default>(rows: usize, cols: usize, values: &[T]) -> *mut MatrixOpaque {
    let ptr = allocate::<T>(rows, cols);
    let m = unsafe { matrix::<T>(ptr) };
    for (i, v) in values.iter().enumerate() {
        let offset = m.offset(i / cols, i % cols);
        m.data[offset] = *v;
    }
    ptr
}

/// Free a matrix from [`external_matrix`] that no view owns.
pub fn release_external<T>(ptr: *mut MatrixOpaque) {
    if LIVE.with(|l| l.borrow_mut().remove(&(ptr as usize))) {
        drop(unsafe { Box::from_raw(ptr as *mut FakeMatrix<T>) });
    }
}
