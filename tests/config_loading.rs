use std::fs;
use std::time::Duration;

use joindag::config::{graph_warnings, load_and_validate, load_from_str, parse_duration, GraphFile};
use joindag::errors::JoindagError;
use joindag_test_utils::builders::{GraphFileBuilder, TaskSpecBuilder};
use serde_json::json;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn validate_str(contents: &str) -> Result<GraphFile, JoindagError> {
    GraphFile::try_from(load_from_str(contents)?)
}

fn config_error(contents: &str) -> String {
    match validate_str(contents) {
        Err(JoindagError::ConfigError(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn loads_graph_file_from_disk() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("Joindag.toml");
    fs::write(
        &path,
        r#"
[config]
ceiling = 2
default_timeout = "30s"
retention = "10m"

[task.fetch_a]
cmd = "echo a"

[task.fetch_b]
cmd = "echo b"
priority = 1
timeout = "500ms"

[task.report]
cmd = "echo done"
after = ["fetch_a", "fetch_b"]

[merge.pages]
cohort = ["fetch_a", "fetch_b"]
"#,
    )?;

    let file = load_and_validate(&path)?;
    let plan = file.plan();

    let ids: Vec<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["fetch_a", "fetch_b", "report"]);

    let fetch_b = &plan.tasks[1];
    assert_eq!(fetch_b.payload, json!({"cmd": "echo b"}));
    assert_eq!(fetch_b.priority, Some(1));
    assert_eq!(fetch_b.timeout, Some(Duration::from_millis(500)));

    let report = &plan.tasks[2];
    assert!(report.dependencies.contains("fetch_a"));
    assert!(report.dependencies.contains("fetch_b"));

    assert_eq!(plan.merge_points.len(), 1);
    assert_eq!(plan.merge_points[0].id, "pages");
    assert_eq!(plan.merge_points[0].cohort, vec!["fetch_a", "fetch_b"]);

    let manager = file.manager_config();
    assert_eq!(manager.ceiling, 2);
    assert_eq!(manager.default_timeout, Some(Duration::from_secs(30)));
    assert_eq!(manager.retention, Duration::from_secs(600));
    assert_eq!(manager.monitor_interval, Duration::from_secs(5));
    assert_eq!(manager.worker_pool_size, 4);

    Ok(())
}

#[test]
fn config_section_defaults_apply() -> TestResult {
    let file = validate_str(
        r#"
[task.only]
cmd = "true"
"#,
    )?;

    assert_eq!(file.config.ceiling, 4);
    assert_eq!(file.config.default_timeout, None);
    let manager = file.manager_config();
    assert_eq!(manager.retention, Duration::from_secs(3600));
    assert_eq!(manager.worker_pool_size, 4);
    Ok(())
}

#[test]
fn worker_pool_follows_large_ceiling() {
    let file = GraphFileBuilder::new()
        .with_task("a", TaskSpecBuilder::new("true").build())
        .with_ceiling(12)
        .build();

    assert_eq!(file.manager_config().worker_pool_size, 12);
}

#[test]
fn rejects_zero_ceiling() {
    let msg = config_error(
        r#"
[config]
ceiling = 0

[task.a]
cmd = "true"
"#,
    );
    assert!(msg.contains("ceiling"), "{msg}");
}

#[test]
fn rejects_bad_durations() {
    let msg = config_error(
        r#"
[task.a]
cmd = "true"
timeout = "5 fortnights"
"#,
    );
    assert!(msg.contains("[task.a].timeout"), "{msg}");

    let msg = config_error(
        r#"
[config]
monitor_interval = "0s"

[task.a]
cmd = "true"
"#,
    );
    assert!(msg.contains("monitor_interval"), "{msg}");
}

#[test]
fn rejects_bad_merge_points() {
    let msg = config_error(
        r#"
[task.a]
cmd = "true"

[merge.m]
cohort = ["a", "ghost"]
"#,
    );
    assert!(msg.contains("ghost"), "{msg}");

    let msg = config_error(
        r#"
[task.a]
cmd = "true"

[merge.m]
cohort = []
"#,
    );
    assert!(msg.contains("empty cohort"), "{msg}");
}

#[test]
fn rejects_graph_without_tasks() {
    let msg = config_error("[config]\nceiling = 2\n");
    assert!(msg.contains("at least one"), "{msg}");
}

#[test]
fn surfaces_toml_and_io_errors() {
    assert!(matches!(
        validate_str("[task.a\ncmd = 1"),
        Err(JoindagError::TomlError(_))
    ));

    let dir = TempDir::new().expect("tempdir");
    assert!(matches!(
        load_and_validate(dir.path().join("missing.toml")),
        Err(JoindagError::IoError(_))
    ));
}

#[test]
fn cycles_and_unknown_dependencies_are_warnings() -> TestResult {
    let file = validate_str(
        r#"
[task.a]
cmd = "true"
after = ["b"]

[task.b]
cmd = "true"
after = ["a"]

[task.c]
cmd = "true"
after = ["nowhere"]
"#,
    )?;

    let warnings = graph_warnings(&file);
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert!(warnings.iter().any(|w| w.contains("unknown task 'nowhere'")));
    assert!(warnings.iter().any(|w| w.contains("cycle")));
    Ok(())
}

#[test]
fn clean_graph_has_no_warnings() {
    let file = GraphFileBuilder::new()
        .with_task("a", TaskSpecBuilder::new("true").build())
        .with_task("b", TaskSpecBuilder::new("true").after("a").build())
        .with_merge("m", &["a", "b"])
        .with_default_timeout("2s")
        .build();

    assert!(graph_warnings(&file).is_empty());
    assert_eq!(
        file.manager_config().default_timeout,
        Some(Duration::from_secs(2))
    );
}

#[test]
fn parses_duration_strings() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert_eq!(parse_duration(" 7 "), Ok(Duration::from_secs(7)));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("ms").is_err());
    assert!(parse_duration("5d").is_err());
}

#[test]
fn oversized_durations_are_rejected() {
    let err = parse_duration("999999999999999999h").expect_err("overflows");
    assert!(err.contains("too large"), "{err}");
    assert!(parse_duration("18446744073709551615m").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s"),
        Ok(Duration::from_secs(u64::MAX))
    );

    let msg = config_error(
        r#"
[config]
default_timeout = "999999999999999999h"

[task.a]
cmd = "true"
"#,
    );
    assert!(msg.contains("[config].default_timeout"), "{msg}");
}
