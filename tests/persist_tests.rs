//! Graph persistence: save, rebind, stale detection.

use std::fs;
use std::path::PathBuf;

use lazarr::prelude::*;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lazarr-persist-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

/// Write a ramp array into an on-disk container and wrap it.
fn durable_ramp(dir: &PathBuf, name: &str, shape: &[usize], chunks: &[usize]) -> Expression {
    let n: usize = shape.iter().product();
    let arr = MemArray::from_cells(
        shape.to_vec(),
        chunks.to_vec(),
        Buffer::F64((0..n).map(|i| i as f64).collect()),
    )
    .unwrap();
    let src = Expression::from_store(arr).unwrap();
    let store = Engine::default()
        .compute_to(&src, &Destination::path(dir.join(name)))
        .unwrap();
    Expression::from_store(store).unwrap()
}

#[test]
fn save_and_open_round_trip_evaluates_identically() {
    let dir = temp_dir("roundtrip");
    let a = durable_ramp(&dir, "a", &[6, 4], &[2, 3]);
    let b = durable_ramp(&dir, "b", &[4], &[4]);
    let expr = a.add(&b).unwrap().sin().unwrap().mul(2.0).unwrap();

    let doc = dir.join("expr.json");
    expr.save(&doc).unwrap();

    let reopened = open_expression(&doc).unwrap();
    assert_eq!(reopened.shape(), expr.shape());
    assert_eq!(reopened.dtype(), expr.dtype());

    let engine = Engine::default();
    let before = engine.compute(&expr).unwrap();
    let after = engine.compute(&reopened).unwrap();
    assert_eq!(before, after);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn saving_in_memory_operands_fails() {
    let arr = MemArray::from_cells(vec![3], vec![3], Buffer::F64(vec![1.0, 2.0, 3.0])).unwrap();
    let expr = Expression::from_store(arr).unwrap().mul(2.0).unwrap();
    let doc = std::env::temp_dir().join(format!("lazarr-mem-save-{}.json", std::process::id()));
    assert!(matches!(expr.save(&doc), Err(Error::Persist(_))));
}

#[test]
fn changed_operand_is_a_stale_reference() {
    let dir = temp_dir("stale");
    let a = durable_ramp(&dir, "a", &[6], &[2]);
    let expr = a.mul(3.0).unwrap();
    let doc = dir.join("expr.json");
    expr.save(&doc).unwrap();

    // replace the container with one of a different shape
    let replacement = MemArray::from_cells(
        vec![4],
        vec![2],
        Buffer::F64(vec![9.0, 9.0, 9.0, 9.0]),
    )
    .unwrap();
    let src = Expression::from_store(replacement).unwrap();
    Engine::default()
        .compute_to(&src, &Destination::path(dir.join("a")))
        .unwrap();

    assert!(matches!(
        open_expression(&doc),
        Err(Error::StaleReference(_))
    ));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_container_fails_to_rebind() {
    let dir = temp_dir("missing");
    let a = durable_ramp(&dir, "a", &[4], &[2]);
    let expr = a.add(1.0).unwrap();
    let doc = dir.join("expr.json");
    expr.save(&doc).unwrap();

    fs::remove_dir_all(dir.join("a")).unwrap();
    assert!(open_expression(&doc).is_err());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn loading_never_computes() {
    let dir = temp_dir("lazy-load");
    let a = durable_ramp(&dir, "a", &[4], &[2]);
    let expr = a.exp().unwrap();
    let doc = dir.join("expr.json");
    expr.save(&doc).unwrap();

    // the saved document records structure and bindings, no cell data
    let text = fs::read_to_string(&doc).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["format_version"], 1);
    assert_eq!(json["operands"].as_array().unwrap().len(), 1);
    assert!(!text.contains("Cells"));

    let reopened = open_expression(&doc).unwrap();
    assert_eq!(reopened.shape(), &[4]);

    let _ = fs::remove_dir_all(&dir);
}
