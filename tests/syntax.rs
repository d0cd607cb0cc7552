//! Integration tests for the JSON interchange form of compiled handlers.

mod support;

use hibiki_eval::{Environment, EvalMode, Value, eval_expr, resolve_str};
use hibiki_syntax::{Action, Expr, HandlerBlock, SetOp};
use pretty_assertions::assert_eq;
use serde_json::json;

use support::{RecordingHost, interpreter, json};

#[test]
fn test_expression_from_json() {
    let expr: Expr = serde_json::from_value(json!({
        "etype": "op",
        "op": "+",
        "exprs": [
            {"etype": "path", "path": [
                {"pathtype": "root", "root": "global"},
                {"pathtype": "map", "key": "a"},
                {"pathtype": "array", "index": 1}
            ]},
            {"etype": "literal", "value": 10}
        ]
    }))
    .unwrap();
    let env = Environment::new(Value::from_json(&json!({"a": [1, 2, 3]})));
    assert_eq!(eval_expr(&expr, &env, EvalMode::Resolve).unwrap().to_number(), 12.0);
}

#[test]
fn test_dynamic_path_part_from_json() {
    let expr: Expr = serde_json::from_value(json!({
        "etype": "path",
        "path": [
            {"pathtype": "root", "root": "global"},
            {"pathtype": "map", "key": "items"},
            {"pathtype": "dynamic", "expr": {"etype": "path", "path": [
                {"pathtype": "root", "root": "global"},
                {"pathtype": "map", "key": "pick"}
            ]}}
        ]
    }))
    .unwrap();
    let env = Environment::new(Value::from_json(&json!({"items": ["x", "y"], "pick": 1})));
    assert_eq!(
        eval_expr(&expr, &env, EvalMode::Resolve).unwrap().to_display_string(),
        "y"
    );
}

#[test]
fn test_action_defaults_from_json() {
    let block: HandlerBlock = serde_json::from_value(json!([
        {"actiontype": "set-data", "target": [{"pathtype": "root", "root": "global"}, {"pathtype": "map", "key": "x"}],
         "data": {"etype": "literal", "value": 1}},
        {"actiontype": "fire-event", "event": "done"},
        {"actiontype": "nop"}
    ]))
    .unwrap();
    assert_eq!(block.len(), 3);
    match &block.actions[0] {
        Action::SetData { setop, .. } => assert_eq!(*setop, SetOp::Set),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(&block.actions[1], Action::FireEvent { bubble: false, data: None, .. }));
}

#[tokio::test]
async fn test_handler_block_from_json_runs() {
    let block: HandlerBlock = serde_json::from_value(json!([
        {"actiontype": "if-block",
         "cond": {"etype": "op", "op": ">", "exprs": [
             {"etype": "path", "path": [{"pathtype": "root", "root": "global"}, {"pathtype": "map", "key": "n"}]},
             {"etype": "literal", "value": 1}
         ]},
         "then": [
             {"actiontype": "set-data", "setop": "append",
              "target": [{"pathtype": "root", "root": "global"}, {"pathtype": "map", "key": "log"}],
              "data": {"etype": "literal", "value": "big"}}
         ],
         "else": [
             {"actiontype": "set-data", "setop": "append",
              "target": [{"pathtype": "root", "root": "global"}, {"pathtype": "map", "key": "log"}],
              "data": {"etype": "literal", "value": "small"}}
         ]},
        {"actiontype": "set-return", "data": {"etype": "path", "path": [
            {"pathtype": "root", "root": "global"}, {"pathtype": "map", "key": "log"}
        ]}}
    ]))
    .unwrap();
    let env = Environment::new(Value::from_json(&json!({"n": 5})));
    let (interp, _) = interpreter(RecordingHost::new());
    let ret = interp.run_handler(&block, &env).await.unwrap().unwrap();
    assert_eq!(json(&ret), json!(["big"]));
    assert_eq!(json(&resolve_str("$.log", &env)), json!(["big"]));
}
