//! Text queries over structured arrays: parsing, validation, filtering.

use std::sync::Arc;

use lazarr::prelude::*;
use lazarr::ChunkStore;

fn observations() -> Arc<dyn ChunkStore> {
    let n = 100usize;
    let a: Vec<f64> = (0..n).map(|i| (i as f64) * 0.5).collect();
    let b: Vec<f64> = (0..n).map(|i| ((n - i) as f64) * 0.5).collect();
    let c: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
    MemArray::from_record(
        vec![n],
        vec![7],
        vec![
            ("a".into(), Buffer::F64(a)),
            ("b".into(), Buffer::F64(b)),
            ("c".into(), Buffer::F64(c)),
        ],
    )
    .unwrap() as Arc<dyn ChunkStore>
}

#[test]
fn simple_field_comparison_filters_rows() {
    let store = observations();
    let engine = Engine::default();
    let out = filter_text(&engine, &store, "a > b").unwrap();
    // a > b from row 51 onward
    assert_eq!(out.shape, vec![49]);
    let first_a = out.field("a").unwrap().get_f64(0);
    assert_eq!(first_a, 51.0 * 0.5);
}

#[test]
fn compound_query_with_math_functions() {
    let store = observations();
    let engine = Engine::default();
    let out = filter_text(&engine, &store, "(a > b) & (sin(c) > .5)").unwrap();

    // reference: recompute the mask directly
    let expect = (0..100u32)
        .filter(|&i| {
            let a = i as f64 * 0.5;
            let b = (100 - i) as f64 * 0.5;
            let c = i as f64 * 0.1;
            a > b && c.sin() > 0.5
        })
        .count();
    assert_eq!(out.shape, vec![expect]);
}

#[test]
fn query_compiles_to_an_ordinary_expression() {
    let store = observations();
    let base = Expression::from_store(Arc::clone(&store)).unwrap();
    let e = parse_query("a * 2 + b", &base).unwrap();
    assert_eq!(e.shape(), &[100]);
    assert_eq!(e.dtype(), &DType::Float64);
    // it can be materialized like any other expression
    let out = Engine::default().compute(&e).unwrap();
    assert_eq!(out.to_f64_vec().unwrap()[0], 50.0);
}

#[test]
fn unknown_field_is_a_name_error() {
    let store = observations();
    let engine = Engine::default();
    assert!(matches!(
        filter_text(&engine, &store, "pressure > 1"),
        Err(Error::Name(name)) if name == "pressure"
    ));
}

#[test]
fn malformed_query_is_a_syntax_error() {
    let store = observations();
    let engine = Engine::default();
    for bad in ["a >", "(a > 1", "a >> 1", "contains(a, 1)", "a == 'x'"] {
        assert!(
            matches!(filter_text(&engine, &store, bad), Err(Error::Syntax(_))),
            "query {bad:?} should be a syntax error"
        );
    }
}

#[test]
fn filter_field_keeps_one_column() {
    let store = observations();
    let engine = Engine::default();
    let base = Expression::from_store(Arc::clone(&store)).unwrap();
    let cond = parse_query("a >= 49", &base).unwrap();
    let out = filter_field(&engine, &store, &cond, "c").unwrap();
    assert_eq!(out.shape, vec![2]); // rows 98 and 99
    assert_eq!(out.cells().unwrap().get_f64(0), 98.0 * 0.1);
}
