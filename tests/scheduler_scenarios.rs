use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use joindag::dag::{BlockedTask, Plan, Scheduler, TaskDescriptor};
use joindag::errors::{JoindagError, TaskError};
use joindag::exec::{Executor, WorkFuture, WorkRequest};
use joindag::lifecycle::{ManagerConfig, NullSampler, TaskManager};
use joindag::store::MemoryStore;
use joindag::types::{ResultMap, TaskStatus};
use joindag_test_utils::builders::{plan_of, task_with_timeout};
use joindag_test_utils::fake_executor::ScriptedExecutor;
use joindag_test_utils::{init_tracing, object, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

fn manager(ceiling: usize) -> TaskManager {
    TaskManager::builder(ManagerConfig {
        ceiling,
        worker_pool_size: ceiling.max(4),
        ..ManagerConfig::default()
    })
    .sampler(Arc::new(NullSampler))
    .build()
}

fn scheduler(ceiling: usize, exec: &ScriptedExecutor) -> Scheduler {
    Scheduler::new(manager(ceiling), Arc::new(exec.clone()))
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Panics while building the unit for `bad`; every other task succeeds.
struct PanicOnBuild;

impl Executor for PanicOnBuild {
    fn execute(&self, request: WorkRequest) -> WorkFuture {
        if request.name == "bad" {
            panic!("cannot build unit for {}", request.name);
        }
        Box::pin(async { Ok(ResultMap::new()) })
    }
}

/// Blocks the calling thread before handing back the unit.
struct BlockOnBuild(Duration);

impl Executor for BlockOnBuild {
    fn execute(&self, _request: WorkRequest) -> WorkFuture {
        std::thread::sleep(self.0);
        Box::pin(async { Ok(ResultMap::new()) })
    }
}

#[tokio::test]
async fn join_task_runs_after_both_parents() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new();
        let plan = plan_of(&[("A", &[]), ("B", &[]), ("C", &["A", "B"])]);

        let result = scheduler(2, &exec).run(&plan, 2).await;

        assert_eq!(result.rounds, vec![ids(&["A", "B"]), ids(&["C"])]);
        assert_eq!(result.context.completed_ids(), vec!["A", "B", "C"]);
        assert!(result.is_success());
        assert!(result.error().is_none());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn failed_dependency_blocks_dependents() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new().fail("A", "upstream broke");
        let plan = plan_of(&[("A", &[]), ("B", &["A"]), ("C", &["A"])]);

        let result = scheduler(4, &exec).run(&plan, 4).await;

        assert_eq!(result.context.failed_ids(), vec!["A"]);
        assert!(result.context.completed.is_empty());
        assert_eq!(
            result.blocked,
            vec![
                BlockedTask {
                    id: "B".into(),
                    failed_ancestor: "A".into()
                },
                BlockedTask {
                    id: "C".into(),
                    failed_ancestor: "A".into()
                },
            ]
        );
        // B and C were never dispatched.
        assert_eq!(exec.started(), ids(&["A"]));
        assert!(result.unsatisfiable.is_empty());
        assert!(result.error().is_none());
        assert!(!result.is_success());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn block_propagates_transitively() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new().fail("B", "nope");
        let plan = plan_of(&[("A", &[]), ("B", &["A"]), ("C", &["B"]), ("D", &["C"])]);

        let result = scheduler(2, &exec).run(&plan, 2).await;

        assert_eq!(result.context.completed_ids(), vec!["A"]);
        assert_eq!(result.context.failed_ids(), vec!["B"]);
        assert_eq!(result.blocked_ids(), vec!["C", "D"]);
        assert!(result.blocked.iter().all(|b| b.failed_ancestor == "B"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cycle_is_reported_and_rest_completes() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new();
        let plan = plan_of(&[("A", &[]), ("X", &["Y"]), ("Y", &["X"]), ("Z", &["X"])]);

        let result = scheduler(4, &exec).run(&plan, 4).await;

        assert_eq!(result.context.completed_ids(), vec!["A"]);
        assert_eq!(result.unsatisfiable, ids(&["X", "Y", "Z"]));
        assert_eq!(result.cycles, vec![ids(&["X", "Y"])]);
        assert!(result.blocked.is_empty());

        match result.error() {
            Some(JoindagError::DependencyUnsatisfiable { pending, cycles }) => {
                assert_eq!(pending, ids(&["X", "Y", "Z"]));
                assert_eq!(cycles.len(), 1);
            }
            other => panic!("expected DependencyUnsatisfiable, got {other:?}"),
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn unknown_dependency_is_unsatisfiable() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new();
        let plan = plan_of(&[("A", &["ghost"]), ("B", &[]), ("C", &["A"])]);

        let result = scheduler(4, &exec).run(&plan, 4).await;

        assert_eq!(result.context.completed_ids(), vec!["B"]);
        assert_eq!(result.unsatisfiable, ids(&["A", "C"]));
        assert!(result.cycles.is_empty());
        assert!(result.error().is_some());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn ready_tasks_dispatch_by_priority_then_input_order() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new();
        let plan = Plan::new()
            .task(TaskDescriptor::new("unranked", json!({})))
            .task(TaskDescriptor::new("second", json!({})).with_priority(2))
            .task(TaskDescriptor::new("first", json!({})).with_priority(1))
            .task(TaskDescriptor::new("first_tie", json!({})).with_priority(1));

        let result = scheduler(1, &exec).run(&plan, 1).await;

        let expected = ids(&["first", "first_tie", "second", "unranked"]);
        assert_eq!(exec.started(), expected);
        assert_eq!(
            result.rounds,
            expected.iter().map(|t| vec![t.clone()]).collect::<Vec<_>>()
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn sibling_failure_does_not_abort_batch() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new()
            .fail("fast_fail", "bad input")
            .sleep("slow", Duration::from_millis(50));
        let plan = plan_of(&[("fast_fail", &[]), ("slow", &[]), ("after_slow", &["slow"])]);

        let result = scheduler(2, &exec).run(&plan, 2).await;

        assert_eq!(result.context.failed_ids(), vec!["fast_fail"]);
        assert_eq!(result.context.completed_ids(), vec!["slow", "after_slow"]);
        assert!(result.blocked.is_empty());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn timed_out_task_blocks_dependents() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new().sleep("slow", Duration::from_millis(500));
        let plan = Plan::new()
            .task(task_with_timeout("slow", &[], Duration::from_millis(100)))
            .task(TaskDescriptor::new("next", json!({})).after("slow"));

        let result = scheduler(2, &exec).run(&plan, 2).await;

        let outcome = result.context.outcome_of("slow").expect("slow has an outcome");
        assert_eq!(outcome.status, TaskStatus::TimedOut);
        assert_eq!(outcome.error, Some(TaskError::Timeout(Duration::from_millis(100))));
        assert!(outcome.result.is_none());
        assert_eq!(result.blocked_ids(), vec!["next"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn panicking_task_becomes_failed() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new().panic("boom", "kaboom");
        let plan = plan_of(&[("boom", &[]), ("fine", &[])]);

        let result = scheduler(2, &exec).run(&plan, 2).await;

        let outcome = result.context.outcome_of("boom").expect("boom has an outcome");
        assert_eq!(outcome.status, TaskStatus::Failed);
        match &outcome.error {
            Some(TaskError::ExecutionFailed(msg)) => assert!(msg.contains("kaboom"), "{msg}"),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
        assert_eq!(result.context.completed_ids(), vec!["fine"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn merged_result_is_visible_to_downstream_tasks() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new()
            .succeed("A", object(json!({"x": 1, "items": ["a"]})))
            .succeed("B", object(json!({"y": 2, "items": ["b"]})));
        let plan = plan_of(&[("A", &[]), ("B", &[]), ("C", &["A", "B"])])
            .merge_point("ab", ["A", "B"]);

        let result = scheduler(2, &exec).run(&plan, 2).await;

        assert_eq!(exec.merges_seen_by("A"), Some(vec![]));
        assert_eq!(exec.merges_seen_by("C"), Some(ids(&["ab"])));

        let merged = &result.context.merged_results["ab"];
        assert_eq!(merged.participants, ids(&["A", "B"]));
        assert_eq!(merged.get("x"), Some(&json!(1)));
        assert_eq!(merged.get("y"), Some(&json!(2)));
        assert_eq!(merged.get("items"), Some(&json!(["a", "b"])));
        assert!(merged.conflicts.is_empty());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn merge_counts_blocked_and_unsatisfiable_members_as_resolved() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new()
            .fail("A", "broken")
            .succeed("P", object(json!({"p": true})));
        let plan = plan_of(&[("A", &[]), ("B", &["A"]), ("P", &[]), ("L", &["L"])])
            .merge_point("failed_branch", ["A", "B"])
            .merge_point("loop_branch", ["P", "L"]);

        let result = scheduler(4, &exec).run(&plan, 4).await;

        let failed_branch = &result.context.merged_results["failed_branch"];
        assert_eq!(failed_branch.failed, ids(&["A"]));
        assert_eq!(failed_branch.abandoned, ids(&["B"]));
        assert!(failed_branch.data.is_empty());

        let loop_branch = &result.context.merged_results["loop_branch"];
        assert_eq!(loop_branch.participants, ids(&["P"]));
        assert_eq!(loop_branch.abandoned, ids(&["L"]));
        assert_eq!(result.cycles, vec![ids(&["L"])]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn outcomes_and_merges_are_emitted_to_store() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new();
        let store = Arc::new(MemoryStore::new());
        let plan = plan_of(&[("A", &[]), ("B", &[]), ("C", &["A"])]).merge_point("m", ["A", "B"]);

        let result = scheduler(2, &exec)
            .with_session("session-1")
            .with_store(store.clone())
            .run(&plan, 2)
            .await;

        assert_eq!(result.session_id, "session-1");
        let outcomes = store.outcomes();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(session, _)| session == "session-1"));
        let merges = store.merges();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].1.cohort_id, "m");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn batch_size_is_capped_by_manager_ceiling() -> TestResult {
    init_tracing();
    with_timeout(async {
        let exec = ScriptedExecutor::new()
            .sleep("t1", Duration::from_millis(20))
            .sleep("t2", Duration::from_millis(20))
            .sleep("t3", Duration::from_millis(20))
            .sleep("t4", Duration::from_millis(20))
            .sleep("t5", Duration::from_millis(20));
        let plan = plan_of(&[("t1", &[]), ("t2", &[]), ("t3", &[]), ("t4", &[]), ("t5", &[])]);
        let scheduler = scheduler(2, &exec);

        let result = scheduler.run(&plan, 10).await;

        assert!(result.is_success());
        assert!(result.rounds.iter().all(|round| round.len() <= 2));
        assert_eq!(result.rounds.len(), 3);
        assert!(exec.peak_concurrency() <= 2);
        assert!(scheduler.manager().peak_running() <= 2);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn empty_plan_is_trivially_successful() -> TestResult {
    init_tracing();
    let exec = ScriptedExecutor::new();

    let result = scheduler(2, &exec).run(&Plan::new(), 2).await;

    assert!(result.is_success());
    assert!(result.rounds.is_empty());
    Ok(())
}

#[tokio::test]
async fn executor_panic_while_building_fails_only_that_task() -> TestResult {
    init_tracing();
    with_timeout(async {
        let plan = plan_of(&[("bad", &[]), ("good", &[]), ("after_bad", &["bad"])]);
        let scheduler = Scheduler::new(manager(2), Arc::new(PanicOnBuild));

        let result = scheduler.run(&plan, 2).await;

        let outcome = result.context.outcome_of("bad").expect("bad has an outcome");
        assert_eq!(outcome.status, TaskStatus::Failed);
        match &outcome.error {
            Some(TaskError::ExecutionFailed(msg)) => {
                assert!(msg.contains("cannot build unit for bad"), "{msg}")
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
        assert_eq!(result.context.completed_ids(), vec!["good"]);
        assert_eq!(result.blocked_ids(), vec!["after_bad"]);
        Ok(())
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_executor_does_not_serialize_a_batch() -> TestResult {
    init_tracing();
    with_timeout(async {
        let plan = plan_of(&[("a", &[]), ("b", &[]), ("c", &[])]);
        let scheduler = Scheduler::new(
            manager(3),
            Arc::new(BlockOnBuild(Duration::from_millis(300))),
        );

        let started = Instant::now();
        let result = scheduler.run(&plan, 3).await;
        let elapsed = started.elapsed();

        assert!(result.is_success());
        assert_eq!(result.rounds, vec![ids(&["a", "b", "c"])]);
        assert!(elapsed < Duration::from_millis(750), "took {elapsed:?}");
        Ok(())
    })
    .await
}
