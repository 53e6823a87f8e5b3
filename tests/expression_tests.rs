//! Expression construction: immediate validation, dtype promotion,
//! operand identity, and deterministic evaluation.

use lazarr::prelude::*;

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

#[test]
fn building_never_reads_but_validates_everything() {
    let a = ramp(&[10, 10], &[4, 4]);

    // shape/dtype known immediately
    let e = a.sin().unwrap().mul(2.0).unwrap();
    assert_eq!(e.shape(), &[10, 10]);
    assert_eq!(e.dtype(), &DType::Float64);

    // bad axis rejected immediately
    assert!(matches!(
        a.sum(Axes::Axes(vec![5])),
        Err(Error::Axis { axis: 5, rank: 2 })
    ));

    // boolean ops demand bool inputs
    assert!(matches!(a.and(&a), Err(Error::DType(_))));
    assert!(a.gt(&a).unwrap().and(a.lt(1.0).unwrap()).is_ok());
}

#[test]
fn promotion_follows_the_fixed_table() {
    let i32s = Expression::from_store(
        MemArray::from_cells(vec![3], vec![3], Buffer::I32(vec![1, 2, 3])).unwrap(),
    )
    .unwrap();
    let f32s = Expression::from_store(
        MemArray::from_cells(vec![3], vec![3], Buffer::F32(vec![1.0, 2.0, 3.0])).unwrap(),
    )
    .unwrap();

    // i32 x f32 -> f64 (f32 cannot represent all i32)
    assert_eq!(i32s.add(&f32s).unwrap().dtype(), &DType::Float64);
    // float constant against f32 array stays f32
    assert_eq!(f32s.mul(2.0).unwrap().dtype(), &DType::Float32);
    // integer division widens
    assert_eq!(i32s.div(&i32s).unwrap().dtype(), &DType::Float64);
    // comparisons are always bool
    assert_eq!(i32s.ge(&f32s).unwrap().dtype(), &DType::Bool);
}

#[test]
fn same_store_merges_to_one_operand() {
    let a = ramp(&[6], &[2]);
    let e = a.mul(&a).unwrap().add(&a).unwrap();
    assert_eq!(e.operands().len(), 1);
    let out = Engine::default().compute(&e).unwrap();
    let expect: Vec<f64> = (0..6).map(|i| (i * i + i) as f64).collect();
    assert_eq!(out.to_f64_vec().unwrap(), expect);
}

#[test]
fn compute_is_deterministic_across_runs_and_workers() {
    let a = ramp(&[20, 30], &[7, 11]);
    let b = ramp(&[30], &[13]);
    let e = a.add(&b).unwrap().sqrt().unwrap().mul(3.0).unwrap();

    let engine = Engine::default();
    let first = engine.compute(&e).unwrap();
    let second = engine.compute(&e).unwrap();
    assert_eq!(first, second);

    let parallel = Engine::new(EngineConfig {
        workers: 4,
        ..EngineConfig::default()
    })
    .compute(&e)
    .unwrap();
    assert_eq!(first, parallel);
}

#[test]
fn composition_leaves_sources_untouched() {
    let a = ramp(&[4], &[2]);
    let b = a.add(100.0).unwrap();
    let _ = Engine::default().compute(&b).unwrap();
    // the base still evaluates to its own values
    let base = Engine::default().compute(&a).unwrap();
    assert_eq!(base.to_f64_vec().unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn display_shows_the_graph_structure() {
    let a = ramp(&[4], &[2]);
    let e = a.mul(2.0).unwrap().sin().unwrap().gt(0.5).unwrap();
    assert_eq!(format!("{e}"), "(sin((o0 * 2)) > 0.5)");
}
