//! t-digest quantile extremes at the scalar-function layer: pushing a known
//! sequence and reading it back through the `quantile`/`quantile_error`
//! built-ins a compiled pipeline would actually call.

use streamql::agg::tdigest::TDigest;
use streamql::fnc::FunctionRegistry;
use streamql::value::Value;

#[test]
fn quantile_extremes_and_median_error_bound() {
    let mut digest = TDigest::new(100.0);
    for i in 1..=100 {
        digest.push(i as f64);
    }
    let exported = digest.export();
    let funcs = FunctionRegistry::with_builtins();

    let q0 = funcs.call("quantile", &[exported.clone(), Value::Number(0.0)]).unwrap();
    assert_eq!(q0, Value::Number(1.0));

    let q1 = funcs.call("quantile", &[exported.clone(), Value::Number(1.0)]).unwrap();
    assert_eq!(q1, Value::Number(100.0));

    let median = funcs.call("quantile", &[exported.clone(), Value::Number(0.5)]).unwrap().as_f64().unwrap();
    let error = funcs.call("quantile_error", &[exported, Value::Number(0.5)]).unwrap().as_f64().unwrap();
    assert!((median - 50.5).abs() <= 50.0 * error, "median={median} error={error}");
}
