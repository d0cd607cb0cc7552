//! Integration tests for event dispatch and error recovery.

mod support;

use hibiki_eval::{ChildEnvOptions, EvalError, EventInfo, Value, resolve_str};
use hibiki_syntax::{Action, Expr, HandlerBlock};
use pretty_assertions::assert_eq;
use serde_json::json;

use support::{RecordingHost, env_with, interpreter, p, path};

fn block(actions: Vec<Action>) -> HandlerBlock {
    HandlerBlock::new(actions)
}

// ============================================================================
// Lookup
// ============================================================================

#[tokio::test]
async fn test_handler_receives_event_data() {
    let env = env_with(json!({}));
    env.define_handler(
        "click",
        block(vec![
            Action::set(path("$.clicked"), p("@x")),
            Action::set(path("$.local"), p(".x")),
        ]),
    );
    let (interp, host) = interpreter(RecordingHost::new());
    let event = EventInfo::new("click").with_data("x", Value::from(7i64));
    interp.dispatch_event(&event, &env).await.unwrap();
    assert_eq!(resolve_str("$.clicked", &env).to_number(), 7.0);
    assert_eq!(resolve_str("$.local", &env).to_number(), 7.0);
    assert!(host.unhandled.borrow().is_empty());
}

#[tokio::test]
async fn test_handler_found_in_ancestor() {
    let root = env_with(json!({}));
    root.define_handler("save", block(vec![Action::set(path("$.saved"), Expr::lit(true))]));
    let child = root.make_child(ChildEnvOptions::new("row"));
    let (interp, _) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("save"), &child).await.unwrap();
    assert!(resolve_str("$.saved", &root).is_truthy());
}

#[tokio::test]
async fn test_handler_boundary_stops_lookup() {
    let root = env_with(json!({}));
    root.define_handler("save", block(vec![Action::set(path("$.saved"), Expr::lit(true))]));
    let mut opts = ChildEnvOptions::new("component");
    opts.handler_boundary = true;
    let child = root.make_child(opts);
    let (interp, host) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("save").bubbling(), &child).await.unwrap();
    assert!(matches!(resolve_str("$.saved", &root), Value::Null));
    assert_eq!(host.unhandled.borrow().as_slice(), ["save".to_string()]);
}

#[tokio::test]
async fn test_unhandled_events() {
    let env = env_with(json!({}));
    let (interp, host) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("quiet"), &env).await.unwrap();
    assert!(host.unhandled.borrow().is_empty());
    interp.dispatch_event(&EventInfo::new("loud").bubbling(), &env).await.unwrap();
    assert_eq!(host.unhandled.borrow().as_slice(), ["loud".to_string()]);
}

#[tokio::test]
async fn test_targeted_event_uses_node_environment() {
    let page = env_with(json!({}));
    let node = page.make_child(ChildEnvOptions::new("node n1"));
    node.define_handler("ping", block(vec![Action::set(path("$.pinged"), p("@from"))]));
    let (interp, _) = interpreter(RecordingHost::new().node("n1", node));

    let fire = Action::fire(
        "ping",
        false,
        Some(Expr::map(vec![
            (Expr::lit("from"), Expr::lit("page")),
            (Expr::lit("@nodeid"), Expr::lit("n1")),
        ])),
    );
    interp.run_handler(&block(vec![fire]), &page).await.unwrap();
    assert_eq!(resolve_str("$.pinged", &page).to_display_string(), "page");
}

#[tokio::test]
async fn test_fire_event_from_handler() {
    let env = env_with(json!({}));
    env.define_handler("inner", block(vec![Action::set(path("$.v"), p("@v"))]));
    let (interp, _) = interpreter(RecordingHost::new());
    let fire = Action::fire(
        "inner",
        false,
        Some(Expr::map(vec![(Expr::lit("v"), Expr::lit(2)), (Expr::lit("@meta"), Expr::lit(1))])),
    );
    interp.run_handler(&block(vec![fire]), &env).await.unwrap();
    assert_eq!(resolve_str("$.v", &env).to_number(), 2.0);
}

// ============================================================================
// Error recovery
// ============================================================================

#[tokio::test]
async fn test_error_handler_receives_failure() {
    let env = env_with(json!({}));
    env.define_handler("click", block(vec![Action::throw(Expr::lit("boom"))]));
    env.define_handler(
        "error",
        block(vec![
            Action::set(path("$.message"), p("@error.message")),
            Action::set(path("$.from"), p("@eventname")),
        ]),
    );
    let (interp, host) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("click"), &env).await.unwrap();
    assert_eq!(resolve_str("$.message", &env).to_display_string(), "boom");
    assert_eq!(resolve_str("$.from", &env).to_display_string(), "click");
    assert!(host.errors.borrow().is_empty());
}

#[tokio::test]
async fn test_no_error_handler_reports_to_host() {
    let env = env_with(json!({}));
    env.define_handler("click", block(vec![Action::Nop, Action::throw(Expr::lit("boom"))]));
    let (interp, host) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("click"), &env).await.unwrap();
    let errors = host.errors.borrow();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "boom");
    assert!(errors[0].context.iter().any(|frame| frame.contains("[click]")));
}

#[tokio::test]
async fn test_failing_error_handler_escalates() {
    let env = env_with(json!({}));
    env.define_handler("click", block(vec![Action::throw(Expr::lit("first"))]));
    env.define_handler("error", block(vec![Action::throw(Expr::lit("second"))]));
    let (interp, host) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("click"), &env).await.unwrap();
    let errors = host.errors.borrow();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "second");
}

#[tokio::test]
async fn test_non_thrown_failure_is_wrapped() {
    let env = env_with(json!({}));
    env.define_handler("click", block(vec![Action::set(path(".x"), Expr::lit(1))]));
    let (interp, host) = interpreter(RecordingHost::new());
    interp.dispatch_event(&EventInfo::new("click"), &env).await.unwrap();
    let errors = host.errors.borrow();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("cannot assign"));
    assert!(errors[0].context[0].starts_with("set-data"));
}

#[tokio::test]
async fn test_runtime_limit_is_not_recovered() {
    let env = env_with(json!({}));
    env.define_handler("click", block(vec![Action::Nop; 1001]));
    env.define_handler("error", block(vec![Action::set(path("$.recovered"), Expr::lit(true))]));
    let (interp, host) = interpreter(RecordingHost::new());
    let result = interp.dispatch_event(&EventInfo::new("click"), &env).await;
    assert!(matches!(result, Err(EvalError::RuntimeLimit(_))));
    assert!(matches!(resolve_str("$.recovered", &env), Value::Null));
    assert!(host.errors.borrow().is_empty());
}

#[tokio::test]
async fn test_nested_event_failure_does_not_abort_caller() {
    let env = env_with(json!({}));
    env.define_handler("inner", block(vec![Action::throw(Expr::lit("inner failed"))]));
    let (interp, host) = interpreter(RecordingHost::new());
    let outer = block(vec![
        Action::fire("inner", false, None),
        Action::set(path("$.after"), Expr::lit(true)),
    ]);
    interp.run_handler(&outer, &env).await.unwrap();
    assert!(resolve_str("$.after", &env).is_truthy());
    assert_eq!(host.errors.borrow()[0].message, "inner failed");
}
