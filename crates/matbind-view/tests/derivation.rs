mod common;

use common::{binder, counts, live_matrices};
use matbind_view::{
    Axis, BindError, DynamicDerivation, HostMatrix, NativeElement, ShapeSpec, ViewLineage,
    ViewRequest,
};
use ndarray::{s, ArrayView2, Ix2, RawArrayView};

fn filled(binder: &matbind_view::MatrixBinder, rows: usize, cols: usize) -> matbind_view::MatrixView<f64> {
    let mut m = binder
        .create::<f64>(ShapeSpec::of::<f64>(rows, cols).with_dynamic(true, true))
        .unwrap();
    for r in 0..rows {
        for c in 0..cols {
            m.set(r as isize, c as isize, (10 * r + c) as f64).unwrap();
        }
    }
    m
}

#[test]
fn derived_views_never_own_and_point_at_the_root() {
    let binder = binder();
    let m = filled(&binder, 2, 2);

    let col = m.slice(0..2, 1..2).unwrap();
    assert!(!col.owns_data());
    assert!(col.is_derived());
    assert_eq!(col.root_id(), Some(m.id()));
    assert_eq!(col.spec(), m.spec());

    let transposed = col.t().unwrap();
    assert!(!transposed.owns_data());
    assert_eq!(transposed.root_id(), Some(m.id()));
    assert_eq!(transposed.shape(), (1, 2));
}

#[test]
fn derived_views_alias_the_same_buffer() {
    let binder = binder();
    let mut m = filled(&binder, 2, 2);
    let mut col = m.column(1).unwrap();
    let gets_before = counts().get;

    assert_eq!(col.get(1, 0).unwrap(), 11.0);
    col.set(0, 0, -1.0).unwrap();
    assert_eq!(counts().get, gets_before);
    assert_eq!(m.get(0, 1).unwrap(), -1.0);

    m.set(1, 1, 42.0).unwrap();
    assert_eq!(col.to_owned_array()[[1, 0]], 42.0);
}

#[test]
fn transpose_swaps_shape_and_strides() {
    let binder = binder();
    let m = filled(&binder, 2, 3);
    assert_eq!(m.strides(), (8, 16));

    let t = m.t().unwrap();
    assert_eq!(t.shape(), (3, 2));
    assert_eq!(t.strides(), (16, 8));
    assert_eq!(t.get(2, 1).unwrap(), 12.0);
    assert_eq!(t.to_owned_array(), m.to_owned_array().t());
}

#[test]
fn reversed_slices_keep_negative_strides() {
    let binder = binder();
    let m = filled(&binder, 3, 2);

    let flipped = m.derive(|a| a.slice_move(s![..;-1, ..])).unwrap();
    assert_eq!(flipped.shape(), (3, 2));
    assert_eq!(flipped.element_strides(), (-1, 3));
    assert_eq!(flipped.get(0, 1).unwrap(), 21.0);
    assert_eq!(flipped.get(2, 0).unwrap(), 0.0);
}

#[test]
fn destruction_waits_for_the_last_derived_view() {
    let binder = binder();
    let mut m = filled(&binder, 2, 2);
    let row = m.row(1).unwrap();

    m.finalize().unwrap();
    assert!(m.is_finalized());
    assert_eq!(counts().destroy, 0);
    assert_eq!(row.get(0, 1).unwrap(), 11.0);

    drop(m);
    assert_eq!(counts().destroy, 0);
    drop(row);
    assert_eq!(counts().destroy, 1);
    assert_eq!(live_matrices(), 0);
}

#[test]
fn finalizing_a_derived_view_is_a_no_op() {
    let binder = binder();
    let m = filled(&binder, 2, 2);
    let mut col = m.column(0).unwrap();

    col.finalize().unwrap();
    assert!(!col.is_finalized());
    assert_eq!(col.get(1, 0).unwrap(), 10.0);
    assert_eq!(counts().destroy, 0);
}

#[test]
fn slices_outside_the_view_are_rejected() {
    let binder = binder();
    let m = filled(&binder, 2, 2);

    assert!(matches!(
        m.slice(0..3, 0..1),
        Err(BindError::Range { bound: 2, .. })
    ));
    assert!(matches!(m.column(2), Err(BindError::Range { .. })));
}

#[test]
fn row_and_column_reject_huge_indices() {
    let binder = binder();
    let m = filled(&binder, 2, 2);

    assert!(matches!(
        m.row(usize::MAX),
        Err(BindError::Range { axis: Axis::Row, bound: 2, .. })
    ));
    assert!(matches!(
        m.column(usize::MAX),
        Err(BindError::Range { axis: Axis::Col, bound: 2, .. })
    ));
    assert_eq!(m.row(1).unwrap().shape(), (1, 2));
}

#[test]
fn inverted_slice_ranges_report_the_view_extent() {
    let binder = binder();
    let m = filled(&binder, 2, 2);
    let (start, end) = (2, 1);

    match m.slice(start..end, 0..2).unwrap_err() {
        BindError::Range { axis, index, bound } => {
            assert_eq!(axis, Axis::Row);
            assert_eq!(index, 2);
            assert_eq!(bound, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn sibling_writes_show_up_in_later_borrows() {
    let binder = binder();
    let mut m = filled(&binder, 2, 2);
    let col = m.column(1).unwrap();

    let raw = col.raw_array();
    assert_eq!(raw.dim(), (2, 1));
    m.set(0, 1, 5.0).unwrap();

    assert_eq!(col.to_owned_array()[[0, 0]], 5.0);
    // SAFETY: no view of `m` is written while `seen` lives
    let seen = unsafe { col.as_array() };
    assert_eq!(seen[[1, 0]], 11.0);
}

static FOREIGN: [f64; 1] = [0.0];

#[test]
fn derivation_must_stay_inside_the_source_buffer() {
    let binder = binder();
    let m = filled(&binder, 2, 2);

    let err = m
        .derive(|_| ArrayView2::from_shape((1, 1), &FOREIGN[..]).unwrap().raw_view())
        .unwrap_err();
    assert!(matches!(err, BindError::IncompatibleSource { .. }));
}

#[test]
fn typed_derivation_rejects_other_element_types_first() {
    let binder = binder();
    let host = binder
        .bind(ViewRequest::new(3, 3).dtype("float32"))
        .unwrap();
    let before = counts();

    let err = host.derive_view::<f64, _>(|a| a).unwrap_err();
    match err {
        BindError::IncompatibleSource { expected, found } => {
            assert_eq!(expected, "float64");
            assert!(found.contains("float32"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(counts(), before);

    let every_other_row = host
        .derive_view::<f32, _>(|a| a.slice_move(s![..;2, ..]))
        .unwrap();
    assert_eq!(every_other_row.shape(), (2, 3));
    assert_eq!(every_other_row.root_id(), Some(host.id()));
}

struct FirstRow;

impl DynamicDerivation for FirstRow {
    fn apply<T: NativeElement>(&self, view: RawArrayView<T, Ix2>) -> RawArrayView<T, Ix2> {
        view.slice_move(s![0..1, ..])
    }
}

#[test]
fn dynamic_derivation_keeps_the_element_type() {
    let binder = binder();
    let mut host = binder
        .bind(ViewRequest::new(3, 3).dtype("single"))
        .unwrap();
    host.set(0, 2, 2.5).unwrap();

    let first = host.derive(FirstRow).unwrap();
    assert!(matches!(first, HostMatrix::F32(_)));
    assert_eq!(first.shape(), (1, 3));
    assert_eq!(first.get(0, 2).unwrap(), 2.5);
    assert_eq!(first.to_f64_array()[[0, 2]], 2.5);
    assert!(first.is_derived());
}
