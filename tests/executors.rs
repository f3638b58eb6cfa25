use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use joindag::errors::TaskError;
use joindag::exec::command::stdout_to_result;
use joindag::exec::{CommandExecutor, Executor, FnExecutor, WorkRequest};
use joindag::merge::MergedResult;
use joindag::types::ResultMap;
use joindag_test_utils::{init_tracing, object, with_timeout};
use serde_json::{json, Value};

fn request(name: &str, cmd: &str) -> WorkRequest {
    WorkRequest::new(name, json!({ "cmd": cmd }))
}

#[test]
fn stdout_json_object_becomes_result() {
    let result = stdout_to_result("  {\"pages\": [1, 2]}\n", 0);
    assert_eq!(Value::Object(result), json!({"pages": [1, 2]}));
}

#[test]
fn plain_stdout_is_wrapped() {
    let result = stdout_to_result("hello\n", 0);
    assert_eq!(Value::Object(result), json!({"stdout": "hello", "exit_code": 0}));

    // A JSON value that is not an object is plain text too.
    let result = stdout_to_result("[1, 2]", 0);
    assert_eq!(result.get("stdout"), Some(&json!("[1, 2]")));
}

#[cfg(unix)]
#[tokio::test]
async fn command_json_stdout_is_the_result() {
    init_tracing();
    let outcome = with_timeout(
        CommandExecutor::new().execute(request("a", r#"echo '{"x": 1, "tags": ["a"]}'"#)),
    )
    .await;

    let result = outcome.expect("command succeeds");
    assert_eq!(Value::Object(result), json!({"x": 1, "tags": ["a"]}));
}

#[cfg(unix)]
#[tokio::test]
async fn command_plain_stdout_and_task_env() {
    init_tracing();
    let outcome =
        with_timeout(CommandExecutor::new().execute(request("fetch", "echo \"$JOINDAG_TASK\""))).await;

    let result = outcome.expect("command succeeds");
    assert_eq!(Value::Object(result), json!({"stdout": "fetch", "exit_code": 0}));
}

#[cfg(unix)]
#[tokio::test]
async fn command_non_zero_exit_fails() {
    init_tracing();
    let outcome = with_timeout(CommandExecutor::new().execute(request("a", "exit 3"))).await;

    match outcome {
        Err(TaskError::ExecutionFailed(msg)) => {
            assert!(msg.contains("exited with code 3"), "{msg}")
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn command_non_utf8_stdout_is_kept_lossily() {
    init_tracing();
    let outcome = with_timeout(CommandExecutor::new().execute(request("bin", r"printf '\377\376ok'"))).await;

    let result = outcome.expect("command succeeds");
    let stdout = result["stdout"].as_str().expect("stdout text");
    assert!(stdout.ends_with("ok"), "{stdout:?}");
    assert!(stdout.contains('\u{FFFD}'), "{stdout:?}");
    assert_eq!(result["exit_code"], json!(0));
}

#[tokio::test]
async fn payload_without_cmd_fails() {
    let outcome = with_timeout(
        CommandExecutor::new().execute(WorkRequest::new("a", json!({"script": "true"}))),
    )
    .await;

    match outcome {
        Err(TaskError::ExecutionFailed(msg)) => assert!(msg.contains("no `cmd`"), "{msg}"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn command_receives_merged_results_on_stdin() {
    init_tracing();
    let merged = MergedResult {
        cohort_id: "pages".to_string(),
        merged_at: Utc::now(),
        participants: vec!["a".to_string(), "b".to_string()],
        failed: vec![],
        abandoned: vec![],
        data: object(json!({"pages": [1, 2]})),
        conflicts: vec![],
    };
    let mut req = request("report", "cat");
    req.merged = Arc::new(BTreeMap::from([("pages".to_string(), merged)]));

    let outcome = with_timeout(CommandExecutor::new().execute(req)).await;

    let result = outcome.expect("command succeeds");
    assert_eq!(result["pages"]["data"], json!({"pages": [1, 2]}));
    assert_eq!(result["pages"]["participants"], json!(["a", "b"]));
}

#[tokio::test]
async fn fn_executor_runs_closure() {
    let exec = FnExecutor::new(|req: WorkRequest| {
        if req.name == "bad" {
            return Err(TaskError::failed("bad input"));
        }
        Ok(object(json!({ "echo": req.payload })))
    });

    let good = with_timeout(exec.execute(WorkRequest::new("good", json!(7)))).await;
    assert_eq!(good.map(Value::Object), Ok(json!({"echo": 7})));

    let bad = with_timeout(exec.execute(WorkRequest::new("bad", json!(null)))).await;
    assert_eq!(bad, Err(TaskError::failed("bad input")));
}

#[tokio::test]
async fn fn_executor_panic_is_a_failure() {
    let exec = FnExecutor::new(|_req: WorkRequest| -> Result<ResultMap, TaskError> {
        panic!("closure exploded")
    });

    let outcome = with_timeout(exec.execute(WorkRequest::new("p", json!({})))).await;

    match outcome {
        Err(TaskError::ExecutionFailed(msg)) => assert!(msg.contains("closure exploded"), "{msg}"),
        other => panic!("expected failure, got {other:?}"),
    }
}
