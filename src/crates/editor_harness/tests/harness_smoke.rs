#![cfg(feature = "test-support")]

#[path = "harness_support.rs"]
mod support;

use std::time::{Duration, Instant};

use editor_harness::{
    launch_and_validate_results, run_case, HarnessError, HostConfig, HostProcess, LogStream,
    TestCase,
};
use serde_json::json;
use support::{descriptor_list_lines, descriptor_list_plan, fake_editor_path, step, write_plan};
use tempfile::tempdir;

fn descriptor_case(script: std::path::PathBuf) -> TestCase {
    let mut case = TestCase::new("ComponentAssetList", script).with_level("tmp_level");
    for line in descriptor_list_lines() {
        case = case.expect_line(line);
    }
    case
}

#[test]
fn drives_fake_editor_end_to_end() {
    let dir = tempdir().expect("temp dir");
    let script = write_plan(dir.path(), "list.json", &descriptor_list_plan(None));
    let host = HostConfig::new(fake_editor_path()).with_arg("--autotest_mode");

    let report = launch_and_validate_results(&host, &descriptor_case(script))
        .expect("all expected lines should be logged");

    assert_eq!(report.found.len(), 5);
    assert_eq!(report.exit_code, Some(0));
}

#[test]
fn missing_line_is_a_validation_failure() {
    let dir = tempdir().expect("temp dir");
    let script = write_plan(dir.path(), "list.json", &descriptor_list_plan(Some(2)));
    let host = HostConfig::new(fake_editor_path());

    let err = launch_and_validate_results(&host, &descriptor_case(script))
        .expect_err("index 2 failed inside the script");

    match err {
        HarnessError::Validation(report) => {
            assert_eq!(report.missing.len(), 1);
            assert!(report.missing[0].contains("Embedded Assets 2"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn host_captures_script_args_and_summary() {
    let dir = tempdir().expect("temp dir");
    let script = write_plan(dir.path(), "list.json", &descriptor_list_plan(None));
    let host = HostConfig::new(fake_editor_path());

    let mut process = HostProcess::launch(&host, &script, &["tmp_level".to_string()])
        .expect("host should launch");
    assert!(process.id() > 0);
    let status = process
        .wait_for_exit(Duration::from_secs(10))
        .expect("host should exit");
    assert!(status.success());
    assert!(!process.is_running().expect("status"));

    let logs = process.logs();
    assert!(logs.iter().all(|line| line.stream == LogStream::Stdout));
    let lines = process.lines();
    assert!(lines.iter().any(|line| line == "Level tmp_level opened"));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Test ComponentUpdateListProperty finished. Result: SUCCESS")
    );
}

#[test]
fn polled_step_passes_when_condition_arrives_in_time() {
    let dir = tempdir().expect("temp dir");
    let plan = json!({
        "name": "DistanceBetweenFilter",
        "steps": [
            { "success": "Instance count matched at point A", "failure": "Instance count mismatch at point A",
              "ready_after_ms": 50, "timeout_ms": 2000 },
            { "success": "Instance count matched in shape", "failure": "Instance count mismatch in shape",
              "ready_after_ms": 5000, "timeout_ms": 100 }
        ]
    });
    let script = write_plan(dir.path(), "veg.json", &plan);
    let case = TestCase::new("DistanceBetweenFilter", script)
        .expect_line("Instance count matched at point A")
        .expect_line("Instance count mismatch in shape")
        .reject_line("Instance count matched in shape");

    launch_and_validate_results(&HostConfig::new(fake_editor_path()), &case)
        .expect("first poll succeeds, second times out");
}

#[test]
fn crashing_host_fails_even_with_all_lines() {
    let dir = tempdir().expect("temp dir");
    let mut plan = descriptor_list_plan(None);
    plan["crash"] = json!(true);
    let script = write_plan(dir.path(), "list.json", &plan);

    let run = run_case(&HostConfig::new(fake_editor_path()), &descriptor_case(script))
        .expect("crash after output is still validated");

    assert!(run.report.missing.is_empty());
    assert_ne!(run.report.exit_code, Some(0));
    assert!(!run.report.passed());
}

fn hanging_plan(dir: &std::path::Path) -> std::path::PathBuf {
    let mut entered = step("Entered game mode", "Failed to enter game mode", true);
    entered["delay_ms"] = json!(20);
    let plan = json!({
        "name": "Hang",
        "steps": [entered],
        "linger_ms": 30_000
    });
    write_plan(dir, "hang.json", &plan)
}

#[test]
fn hung_host_is_killed_and_its_log_still_validated() {
    let dir = tempdir().expect("temp dir");
    let case = TestCase::new("Hang", hanging_plan(dir.path())).expect_line("Entered game mode");
    let host = HostConfig::new(fake_editor_path()).with_run_timeout(Duration::from_millis(700));

    let start = Instant::now();
    let report = launch_and_validate_results(&host, &case)
        .expect("the expected line was logged before the host hung");

    assert!(start.elapsed() < Duration::from_secs(10), "host should be killed");
    assert!(report.timed_out);
    assert_eq!(report.exit_code, None);
    assert_eq!(report.found, vec!["Entered game mode".to_string()]);
}

#[test]
fn hung_host_reports_lines_it_never_logged() {
    let dir = tempdir().expect("temp dir");
    let case = TestCase::new("Hang", hanging_plan(dir.path()))
        .expect_line("Entered game mode")
        .expect_line("Exited game mode");
    let host = HostConfig::new(fake_editor_path()).with_run_timeout(Duration::from_millis(700));

    let err = launch_and_validate_results(&host, &case).expect_err("exit step never ran");
    match err {
        HarnessError::Validation(report) => {
            assert!(report.timed_out);
            assert_eq!(report.missing, vec!["Exited game mode".to_string()]);
            assert!(report.to_string().contains("killed at run timeout"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn wait_for_exit_still_errors_on_a_hung_host() {
    let dir = tempdir().expect("temp dir");
    let host = HostConfig::new(fake_editor_path());

    let mut process =
        HostProcess::launch(&host, &hanging_plan(dir.path()), &[]).expect("host should launch");
    let err = process
        .wait_for_exit(Duration::from_millis(300))
        .expect_err("host lingers");

    assert!(matches!(err, HarnessError::HostTimeout(_)));
    assert!(!process.is_running().expect("status"));
    assert!(process.lines().iter().any(|line| line == "Success: Entered game mode"));
}

#[test]
fn results_can_come_from_a_log_file() {
    let dir = tempdir().expect("temp dir");
    let log_path = dir.path().join("Editor.log");
    std::fs::write(&log_path, "Success: stale line from an older run\n").expect("stale log");

    let mut plan = descriptor_list_plan(None);
    plan["log_file"] = json!(log_path);
    let script = write_plan(dir.path(), "list.json", &plan);
    let host = HostConfig::new(fake_editor_path()).with_log_file(&log_path);

    let case = descriptor_case(script).reject_line("stale line from an older run");
    let report = launch_and_validate_results(&host, &case).expect("lines are in the log file");
    assert_eq!(report.found.len(), 5);
}

#[test]
fn missing_binary_is_an_infrastructure_error() {
    let dir = tempdir().expect("temp dir");
    let host = HostConfig::new(dir.path().join("no-such-editor"));
    let case = TestCase::new("x", dir.path().join("x.json")).expect_line("anything");

    let err = launch_and_validate_results(&host, &case).expect_err("binary does not exist");
    assert!(matches!(err, HarnessError::HostStart(_)));
}

#[test]
fn unreadable_script_fails_the_host_at_startup() {
    let dir = tempdir().expect("temp dir");
    let host = HostConfig::new(fake_editor_path());
    let case = TestCase::new("x", dir.path().join("missing.json")).expect_line("anything");

    let result = launch_and_validate_results(&host, &case);
    match result {
        Err(HarnessError::HostExited(status)) => assert!(!status.success()),
        Err(HarnessError::Validation(report)) => assert_ne!(report.exit_code, Some(0)),
        other => panic!("unexpected result {other:?}"),
    }
}
