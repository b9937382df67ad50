//! `emit_every`'s record-count boundary: across any run of `n` pushed
//! records with interval `i`, the first record always emits and the total
//! emission count is `ceil(n / i)`.

use streamql::dsl::parser::parse_expr;
use streamql::emit::build;
use streamql::fnc::FunctionRegistry;
use streamql::value::Value;

fn run(n: u64, interval: u64) -> Vec<bool> {
    let funcs = FunctionRegistry::with_builtins();
    let expr = parse_expr(&format!("emit_every({interval})")).unwrap();
    let mut policy = build(&expr, &funcs).unwrap();
    (0..n).map(|_| policy.should_emit(&Value::Null, None, false, &funcs).unwrap()).collect()
}

#[test]
fn first_record_always_emits() {
    for interval in [1, 2, 5, 100] {
        let results = run(1, interval);
        assert_eq!(results, vec![true], "interval={interval}");
    }
}

#[test]
fn emission_count_matches_ceil_of_count_over_interval() {
    for (n, interval) in [(10, 3), (9, 3), (1, 3), (20, 7), (7, 7), (50, 1)] {
        let results = run(n, interval);
        let emitted = results.iter().filter(|b| **b).count() as u64;
        let expected = (n + interval - 1) / interval;
        assert_eq!(emitted, expected, "n={n} interval={interval} results={results:?}");
        assert!(results[0], "n={n} interval={interval}: first record must emit");
    }
}

#[test]
fn emissions_land_exactly_on_interval_boundaries() {
    let results = run(10, 3);
    let fired_at: Vec<usize> = results.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i).collect();
    assert_eq!(fired_at, vec![0, 3, 6, 9]);
}
