//! Broadcasting semantics of chunk-wise materialization, checked against
//! directly computed references.

use lazarr::prelude::*;

fn mem(shape: &[usize], chunks: &[usize], cells: Buffer) -> Expression {
    let arr = MemArray::from_cells(shape.to_vec(), chunks.to_vec(), cells).unwrap();
    Expression::from_store(arr).unwrap()
}

#[test]
fn matrix_plus_row_broadcasts_over_rows() {
    // (500, 1000) + (1000,) with deliberately mismatched chunk layouts
    let n_rows = 500;
    let n_cols = 1000;
    let a_cells: Vec<f64> = (0..n_rows * n_cols).map(|i| i as f64).collect();
    let b_cells: Vec<f64> = (0..n_cols).map(|i| (i * 3) as f64).collect();

    let a = mem(&[n_rows, n_cols], &[100, 250], Buffer::F64(a_cells.clone()));
    let b = mem(&[n_cols], &[333], Buffer::F64(b_cells.clone()));

    let expr = a.add(&b).unwrap();
    assert_eq!(expr.shape(), &[n_rows, n_cols]);

    let out = Engine::default().compute(&expr).unwrap();
    let got = out.to_f64_vec().unwrap();
    for (i, &v) in got.iter().enumerate() {
        assert_eq!(v, a_cells[i] + b_cells[i % n_cols]);
    }
}

#[test]
fn column_against_row_outer_broadcast() {
    let col = mem(&[3, 1], &[2, 1], Buffer::F64(vec![1.0, 2.0, 3.0]));
    let row = mem(&[1, 4], &[1, 4], Buffer::F64(vec![10.0, 20.0, 30.0, 40.0]));
    let out = Engine::default().compute(&col.mul(&row).unwrap()).unwrap();
    assert_eq!(out.shape, vec![3, 4]);
    assert_eq!(
        out.to_f64_vec().unwrap(),
        vec![
            10.0, 20.0, 30.0, 40.0, //
            20.0, 40.0, 60.0, 80.0, //
            30.0, 60.0, 90.0, 120.0,
        ]
    );
}

#[test]
fn scalar_constants_broadcast_everywhere() {
    let a = mem(&[2, 3], &[2, 2], Buffer::I64(vec![1, 2, 3, 4, 5, 6]));
    let out = Engine::default()
        .compute(&a.mul(10i64).unwrap().sub(5i64).unwrap())
        .unwrap();
    assert_eq!(
        out.to_f64_vec().unwrap(),
        vec![5.0, 15.0, 25.0, 35.0, 45.0, 55.0]
    );
}

#[test]
fn incompatible_shapes_fail_at_build_time() {
    let a = mem(&[3, 4], &[3, 4], Buffer::F64(vec![0.0; 12]));
    let b = mem(&[5], &[5], Buffer::F64(vec![0.0; 5]));
    assert!(matches!(a.add(&b), Err(Error::Broadcast(_, _))));
}

#[test]
fn rank_zero_operand_acts_as_scalar() {
    let s = mem(&[], &[], Buffer::F64(vec![2.0]));
    let a = mem(&[4], &[3], Buffer::F64(vec![1.0, 2.0, 3.0, 4.0]));
    let out = Engine::default().compute(&a.pow(&s).unwrap()).unwrap();
    assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, 4.0, 9.0, 16.0]);
}
