//! Integration tests for the action interpreter.

mod support;

use hibiki_eval::{Environment, EvalError, Value, resolve_str};
use hibiki_syntax::{Action, Expr, HandlerBlock, Op, Path, SetOp};
use pretty_assertions::assert_eq;
use serde_json::json;

use support::{RecordingHost, env_with, interpreter, json, p, path};

fn block(actions: Vec<Action>) -> HandlerBlock {
    HandlerBlock::new(actions)
}

// ============================================================================
// Sequencing and returns
// ============================================================================

#[tokio::test]
async fn test_last_set_return_wins() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());
    let handler = block(vec![
        Action::ret(Expr::lit(1)),
        Action::set(path("$.x"), Expr::lit("after")),
        Action::ret(Expr::lit(2)),
    ]);
    let ret = interp.run_handler(&handler, &env).await.unwrap();
    assert_eq!(ret.map(|v| v.to_number()), Some(2.0));
    assert_eq!(resolve_str("$.x", &env).to_display_string(), "after");
}

#[tokio::test]
async fn test_no_return_is_none() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());
    assert!(interp.run_handler(&block(vec![Action::Nop]), &env).await.unwrap().is_none());
}

#[tokio::test]
async fn test_if_block_return_goes_to_rtn() {
    let env = env_with(json!({"flag": false}));
    let (interp, _) = interpreter(RecordingHost::new());
    let branch = Action::if_else(
        p("$.flag"),
        block(vec![Action::ret(Expr::lit("then"))]),
        Some(block(vec![Action::ret(Expr::lit("else"))])),
    );

    let ret = interp.run_handler(&block(vec![branch.clone()]), &env).await.unwrap();
    assert!(ret.is_none());
    assert_eq!(resolve_str("@rtn", &env).to_display_string(), "else");

    let handler = block(vec![branch, Action::ret(p("@rtn"))]);
    let ret = interp.run_handler(&handler, &env).await.unwrap();
    assert_eq!(ret.map(|v| v.to_display_string()), Some("else".to_string()));
}

#[tokio::test]
async fn test_set_data_ops() {
    let env = env_with(json!({"list": [1]}));
    let (interp, _) = interpreter(RecordingHost::new());
    let handler = block(vec![
        Action::set_op(SetOp::Append, path("$.list"), Expr::lit(2)),
        Action::set_op(SetOp::SetUnless, path("$.list"), Expr::lit("ignored")),
        Action::set(path("@tmp"), Expr::lit(5)),
        Action::set(path("$.copy"), p("@tmp")),
    ]);
    interp.run_handler(&handler, &env).await.unwrap();
    assert_eq!(json(&resolve_str("$", &env)), json!({"list": [1, 2], "copy": 5}));
}

// ============================================================================
// Limits
// ============================================================================

#[tokio::test]
async fn test_action_limit() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());

    let ok = block(vec![Action::Nop; 1000]);
    assert!(interp.run_handler(&ok, &env).await.is_ok());

    let too_many = block(vec![Action::Nop; 1001]);
    let err = interp.run_handler(&too_many, &env).await.unwrap_err();
    assert!(matches!(err, EvalError::RuntimeLimit(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_action_limit_counts_nested_blocks() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());
    let inner = block(vec![Action::Nop; 600]);
    let handler = block(vec![
        Action::if_else(Expr::lit(true), inner.clone(), None),
        Action::if_else(Expr::lit(true), inner, None),
    ]);
    assert!(matches!(
        interp.run_handler(&handler, &env).await,
        Err(EvalError::RuntimeLimit(_))
    ));
}

#[tokio::test]
async fn test_recursive_call_hits_stack_limit() {
    let env = env_with(json!({}));
    let recurse = block(vec![Action::call("/recurse", None, None)]);
    let (interp, host) = interpreter(RecordingHost::new().handler("/recurse", recurse.clone()));
    let err = interp.run_handler(&recurse, &env).await.unwrap_err();
    assert!(matches!(err, EvalError::RuntimeLimit(_)));
    assert_eq!(host.requests.borrow().len(), 30);
    // The next invocation starts with a fresh counter and stack.
    assert!(interp.run_handler(&block(vec![Action::Nop]), &env).await.is_ok());
}

#[tokio::test]
async fn test_interleaved_chains_count_actions_separately() {
    let env = env_with(json!({}));
    let (interp, host) = interpreter(RecordingHost::new());
    let mut actions = vec![Action::call("/tick", None, None)];
    actions.extend(vec![Action::Nop; 600]);
    let handler = block(actions);

    let (a, b) = tokio::join!(interp.run_handler(&handler, &env), interp.run_handler(&handler, &env));
    assert!(a.is_ok(), "first chain failed: {a:?}");
    assert!(b.is_ok(), "second chain failed: {b:?}");
    assert_eq!(host.requests.borrow().len(), 2);
}

#[tokio::test]
async fn test_interleaved_chains_keep_their_own_frames() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());
    let handler = block(vec![Action::call("/tick", None, None), Action::throw(Expr::lit("boom"))]);

    let (a, b) = tokio::join!(
        interp.run_handler_with(&handler, &env, "a", false),
        interp.run_handler_with(&handler, &env, "b", false)
    );
    for (name, result) in [("[a]", a), ("[b]", b)] {
        match result {
            Err(EvalError::Thrown(error)) => {
                assert_eq!(error.context.len(), 2);
                assert!(error.context[1].ends_with(name));
            }
            other => panic!("expected thrown error, got {other:?}"),
        }
    }
}

// ============================================================================
// call-handler
// ============================================================================

#[tokio::test]
async fn test_call_handler_runs_returned_block() {
    let env = Environment::builder()
        .global(Value::from_json(&json!({"count": 1, "amount": 3})))
        .lib_context("main")
        .build();
    let remote = block(vec![
        Action::set(path("$.count"), Expr::binary(Op::Add, p("$.count"), Expr::lit(1))),
        Action::ret(Expr::binary(Op::Mul, p("@amount"), p("$args.amount"))),
    ]);
    let (interp, host) = interpreter(RecordingHost::new().handler("/double", remote));
    let call = Action::call(
        "/double",
        Some(Expr::map(vec![(Expr::lit("amount"), p("$.amount"))])),
        Some(path("$.result")),
    );
    interp.run_handler(&block(vec![call]), &env).await.unwrap();

    assert_eq!(json(&resolve_str("$", &env)), json!({"count": 2, "amount": 3, "result": 9}));
    let requests = host.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].callpath.as_deref(), Some("/double"));
    assert_eq!(requests[0].lib_context, "main");
    assert_eq!(json(&requests[0].data), json!({"amount": 3}));
}

#[tokio::test]
async fn test_call_handler_data_is_a_resolved_copy() {
    let env = env_with(json!({"obj": {"x": 1}}));
    let (interp, host) = interpreter(RecordingHost::new());
    let data = Expr::map(vec![
        (Expr::lit("obj"), p("$.obj")),
        (Expr::lit("r"), Expr::Ref { path: path("$.obj.x") }),
    ]);
    interp
        .run_handler(&block(vec![Action::call("/any", Some(data), None)]), &env)
        .await
        .unwrap();
    let requests = host.requests.borrow();
    let sent = &requests[0].data;
    assert_eq!(json(sent), json!({"obj": {"x": 1}, "r": 1}));
    let sent_obj = sent.as_object().unwrap().borrow().get("obj").cloned().unwrap();
    assert!(!sent_obj.same_value(&resolve_str("$.obj", &env)));
    assert!(matches!(
        sent.as_object().unwrap().borrow().get("r"),
        Some(Value::Number(_))
    ));
}

#[tokio::test]
async fn test_call_handler_without_block_assigns_null() {
    let env = env_with(json!({"result": "old"}));
    let (interp, _) = interpreter(RecordingHost::new());
    let call = Action::call("/missing", None, Some(path("$.result")));
    interp.run_handler(&block(vec![call]), &env).await.unwrap();
    assert!(matches!(resolve_str("$.result", &env), Value::Null));
}

#[tokio::test]
async fn test_call_handler_by_url() {
    let env = env_with(json!({}));
    let (interp, host) = interpreter(RecordingHost::new());
    let call = Action::CallHandler {
        target: None,
        callpath: None,
        url: Some(Expr::lit("/api/items")),
        method: Some(Expr::lit("POST")),
        module: Some(Expr::lit("http")),
        data: None,
        pure: true,
    };
    interp.run_handler(&block(vec![call]), &env).await.unwrap();
    let requests = host.requests.borrow();
    assert_eq!(requests[0].target(), "http:POST /api/items");
    assert!(requests[0].pure);
}

// ============================================================================
// Side-effect actions
// ============================================================================

#[tokio::test]
async fn test_log_joins_values() {
    let env = env_with(json!({"n": 2}));
    let (interp, host) = interpreter(RecordingHost::new());
    let log = Action::log(vec![Expr::lit("count"), p("$.n"), p("$.missing")]);
    interp.run_handler(&block(vec![log]), &env).await.unwrap();
    assert_eq!(host.logs.borrow().as_slice(), ["count 2 null".to_string()]);
}

#[tokio::test]
async fn test_debug_log_dumps_context() {
    let env = env_with(json!({}));
    let (interp, host) = interpreter(RecordingHost::new());
    let log = Action::Log {
        exprs: vec![Expr::lit("here")],
        debug: true,
    };
    interp.run_handler(&block(vec![log]), &env).await.unwrap();
    let logs = host.logs.borrow();
    assert_eq!(logs.len(), 3);
    assert!(logs[1].contains("log"));
    assert_eq!(logs[2], "root");
}

#[tokio::test]
async fn test_invalidate_and_markup() {
    let env = env_with(json!({}));
    let (interp, host) = interpreter(RecordingHost::new());
    let handler = block(vec![
        Action::Invalidate { pattern: None },
        Action::Invalidate {
            pattern: Some(Expr::lit("^/items")),
        },
        Action::InstallMarkup {
            html: "<div></div>".into(),
        },
    ]);
    interp.run_handler(&handler, &env).await.unwrap();
    assert_eq!(
        host.invalidated.borrow().as_slice(),
        [None, Some("^/items".to_string())]
    );
    assert_eq!(host.markup.borrow().len(), 1);
}

#[tokio::test]
async fn test_pure_mode_skips_side_effects() {
    let env = env_with(json!({}));
    let (interp, host) = interpreter(RecordingHost::new());
    let handler = block(vec![
        Action::Invalidate { pattern: None },
        Action::fire("changed", true, None),
        Action::InstallMarkup { html: "<p/>".into() },
        Action::set(path("@ok"), Expr::lit(true)),
    ]);
    interp.run_handler_with(&handler, &env, "pure", true).await.unwrap();
    assert!(host.invalidated.borrow().is_empty());
    assert!(host.unhandled.borrow().is_empty());
    assert!(host.markup.borrow().is_empty());
    assert!(resolve_str("@ok", &env).is_truthy());
}

#[tokio::test]
async fn test_pure_mode_rejects_store_writes() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());
    let handler = block(vec![Action::set(Path::global().key("x"), Expr::lit(1))]);
    assert!(matches!(
        interp.run_handler_with(&handler, &env, "pure", true).await,
        Err(EvalError::NotWritable(_))
    ));
}

// ============================================================================
// throw
// ============================================================================

#[tokio::test]
async fn test_throw_wraps_value() {
    let env = env_with(json!({}));
    let (interp, _) = interpreter(RecordingHost::new());
    let err = interp
        .run_handler(&block(vec![Action::throw(Expr::lit("boom"))]), &env)
        .await
        .unwrap_err();
    match err {
        EvalError::Thrown(error) => {
            assert_eq!(error.message, "boom");
            assert_eq!(error.context.len(), 2);
            assert_eq!(error.context[0], "throw");
        }
        other => panic!("expected thrown error, got {other:?}"),
    }
}
