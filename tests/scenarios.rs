//! End-to-end scenarios driven entirely through [`streamql::Engine`] and
//! the pipeline DSL text it parses, exercising a flow from `create stream`
//! through emission on a downstream sink.

use streamql::{Engine, Value};

fn subscription_id(result: &Value) -> u64 {
    result.as_f64().expect("subscribe returns a numeric id") as u64
}

#[tokio::test]
async fn summarize_without_window_emits_one_record_per_group_on_flush() {
    let mut engine = Engine::new();
    engine.execute("create stream sales; create stream out;").await;

    let sub = engine.execute("subscribe out;").await;
    assert!(sub[0].success, "{:?}", sub[0]);
    let id = subscription_id(sub[0].result.as_ref().unwrap());

    let create = engine
        .execute(
            "create flow f as sales | summarize { product, total_amount: sum(amount), count: count() } by product | insert_into(out);",
        )
        .await;
    assert!(create[0].success, "{:?}", create[0]);

    for (product, amount) in [("laptop", 1200.0), ("laptop", 1100.0), ("mouse", 25.0), ("mouse", 30.0)] {
        let r = engine.execute(&format!("insert into sales {{product: \"{product}\", amount: {amount}}};")).await;
        assert!(r[0].success, "{:?}", r[0]);
    }
    let flushed = engine.execute("flush sales;").await;
    assert!(flushed[0].success);

    let mut emitted = engine.drain_subscription(id).unwrap();
    emitted.sort();

    let mut expected = vec![
        serde_json::json!({"product": "mouse", "total_amount": 55.0, "count": 2.0}).into(),
        serde_json::json!({"product": "laptop", "total_amount": 2300.0, "count": 2.0}).into(),
    ];
    expected.sort();

    assert_eq!(emitted, expected);
}

#[tokio::test]
async fn select_spreads_the_input_record_and_adds_a_field() {
    let mut engine = Engine::new();
    engine.execute("create stream input; create stream out;").await;
    let sub = engine.execute("subscribe out;").await;
    let id = subscription_id(sub[0].result.as_ref().unwrap());

    let create = engine.execute(r#"input | select { ...*, extra: "added" } | insert_into(out);"#).await;
    assert!(create[0].success, "{:?}", create[0]);

    let r = engine.execute(r#"insert into input {x: 1, name: "test"};"#).await;
    assert!(r[0].success, "{:?}", r[0]);

    let emitted = engine.drain_subscription(id).unwrap();
    assert_eq!(emitted, vec![serde_json::json!({"x": 1.0, "name": "test", "extra": "added"}).into()]);
}

#[tokio::test]
async fn scan_step_state_accumulates_across_records() {
    let mut engine = Engine::new();
    engine.execute("create stream input; create stream out;").await;
    let sub = engine.execute("subscribe out;").await;
    let id = subscription_id(sub[0].result.as_ref().unwrap());

    let create = engine
        .execute("input | scan(step s1: true => s1.count = (s1.count || 0) + 1, emit({ ...s1, input: x });) | insert_into(out);")
        .await;
    assert!(create[0].success, "{:?}", create[0]);

    let r = engine.execute("insert into input {x: 5};").await;
    assert!(r[0].success, "{:?}", r[0]);

    let emitted = engine.drain_subscription(id).unwrap();
    assert_eq!(emitted, vec![serde_json::json!({"count": 1.0, "input": 5.0}).into()]);
}

#[tokio::test]
async fn select_exclusion_removes_a_field_after_spread() {
    let mut engine = Engine::new();
    engine.execute("create stream input; create stream out;").await;
    let sub = engine.execute("subscribe out;").await;
    let id = subscription_id(sub[0].result.as_ref().unwrap());

    let create = engine.execute("input | select { ...*, -name } | insert_into(out);").await;
    assert!(create[0].success, "{:?}", create[0]);

    let r = engine.execute(r#"insert into input {x: 1, name: "test", value: 42};"#).await;
    assert!(r[0].success, "{:?}", r[0]);

    let emitted = engine.drain_subscription(id).unwrap();
    assert_eq!(emitted, vec![serde_json::json!({"x": 1.0, "value": 42.0}).into()]);
}
