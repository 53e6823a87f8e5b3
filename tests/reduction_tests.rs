//! Eager reductions: full and axis-wise folds, dtype rules, and
//! composition with the surrounding lazy graph.

use lazarr::prelude::*;
use lazarr::where_;

fn ramp(shape: &[usize], chunks: &[usize]) -> Expression {
    let n: usize = shape.iter().product();
    let arr = MemArray::from_cells(
        shape.to_vec(),
        chunks.to_vec(),
        Buffer::F64((0..n).map(|i| i as f64).collect()),
    )
    .unwrap();
    Expression::from_store(arr).unwrap()
}

fn ints(shape: &[usize], chunks: &[usize], v: Vec<i32>) -> Expression {
    let arr = MemArray::from_cells(shape.to_vec(), chunks.to_vec(), Buffer::I32(v)).unwrap();
    Expression::from_store(arr).unwrap()
}

#[test]
fn full_sum_collapses_to_rank_zero() {
    let a = ramp(&[50, 40], &[16, 16]);
    let out = Engine::default().compute(&a.sum(Axes::All).unwrap()).unwrap();
    assert_eq!(out.shape, Vec::<usize>::new());
    let n = 50 * 40;
    assert_eq!(out.scalar_f64().unwrap(), (n * (n - 1) / 2) as f64);
}

#[test]
fn axis_sum_removes_only_that_axis() {
    let a = ramp(&[2, 3], &[2, 2]);
    // rows: [0 1 2; 3 4 5]
    let rows = Engine::default()
        .compute(&a.sum(Axes::Axes(vec![1])).unwrap())
        .unwrap();
    assert_eq!(rows.shape, vec![2]);
    assert_eq!(rows.to_f64_vec().unwrap(), vec![3.0, 12.0]);

    let cols = Engine::default()
        .compute(&a.sum(Axes::Axes(vec![0])).unwrap())
        .unwrap();
    assert_eq!(cols.shape, vec![3]);
    assert_eq!(cols.to_f64_vec().unwrap(), vec![3.0, 5.0, 7.0]);
}

#[test]
fn integer_sums_fold_in_int64() {
    let a = ints(&[4], &[2], vec![1, 2, 3, 4]);
    let e = a.sum(Axes::All).unwrap();
    assert_eq!(e.dtype(), &DType::Int64);
    let out = Engine::default().compute(&e).unwrap();
    assert_eq!(out.scalar_i64().unwrap(), 10);
}

#[test]
fn mean_is_always_float64() {
    let a = ints(&[4], &[3], vec![1, 2, 3, 4]);
    let e = a.mean(Axes::All).unwrap();
    assert_eq!(e.dtype(), &DType::Float64);
    let out = Engine::default().compute(&e).unwrap();
    assert_eq!(out.scalar_f64().unwrap(), 2.5);
}

#[test]
fn min_max_preserve_dtype() {
    let a = ints(&[5], &[2], vec![7, -3, 9, 0, 4]);
    let min = Engine::default().compute(&a.min(Axes::All).unwrap()).unwrap();
    let max = Engine::default().compute(&a.max(Axes::All).unwrap()).unwrap();
    assert_eq!(min.dtype, DType::Int32);
    assert_eq!(min.scalar_i64().unwrap(), -3);
    assert_eq!(max.scalar_i64().unwrap(), 9);
}

#[test]
fn any_and_all_over_masks() {
    let a = ramp(&[6], &[2]);
    let engine = Engine::default();
    let any = engine
        .compute(&a.gt(4.0).unwrap().any(Axes::All).unwrap())
        .unwrap();
    assert!(any.scalar_bool().unwrap());
    let all = engine
        .compute(&a.ge(0.0).unwrap().all(Axes::All).unwrap())
        .unwrap();
    assert!(all.scalar_bool().unwrap());
    let none = engine
        .compute(&a.gt(100.0).unwrap().any(Axes::All).unwrap())
        .unwrap();
    assert!(!none.scalar_bool().unwrap());
}

#[test]
fn where_sum_partition_identity() {
    // sum(where(c, x, 0)) + sum(where(c, 0, x)) == sum(x)
    let x = ramp(&[7, 5], &[3, 2]);
    let c = x.gt(17.0).unwrap();
    let engine = Engine::default();

    let kept = engine
        .compute(&where_(&c, &x, 0.0).unwrap().sum(Axes::All).unwrap())
        .unwrap()
        .scalar_f64()
        .unwrap();
    let dropped = engine
        .compute(&where_(&c, 0.0, &x).unwrap().sum(Axes::All).unwrap())
        .unwrap()
        .scalar_f64()
        .unwrap();
    let total = engine
        .compute(&x.sum(Axes::All).unwrap())
        .unwrap()
        .scalar_f64()
        .unwrap();
    assert_eq!(kept + dropped, total);
}

#[test]
fn reduction_result_composes_lazily() {
    let a = ramp(&[4, 6], &[2, 3]);
    // normalize rows by the grand mean
    let e = a.div(a.mean(Axes::All).unwrap()).unwrap();
    let out = Engine::default().compute(&e).unwrap();
    let grand = (0..24).sum::<i64>() as f64 / 24.0;
    assert_eq!(out.to_f64_vec().unwrap()[7], 7.0 / grand);
}
