//! End-to-end smoke controller tests against a scripted runner.
//!
//! Readiness is exercised for real: a local `TcpListener` stands in for
//! the server's published port, so the active poll connects immediately.

use slipway_core::fakes::ScriptedRunner;
use slipway_core::{RunStatus, StageError};
use slipway_smoke::{SmokeConfig, SmokeController, SmokePhase};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// A config whose published port answers (listener must stay alive for
/// the duration of the test).
async fn answering_config() -> (SmokeConfig, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = SmokeConfig::new("/work/quaydb", "quaydb/server:ci");
    config.container_name = "quaydb-smoke".to_string();
    config.host_port = port;
    config.ready_timeout_secs = 5;
    config.deadline_secs = 60;
    (config, listener)
}

/// A port nothing listens on.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_green_run_builds_once_and_drives_both_lanes() {
    let runner = Arc::new(ScriptedRunner::new());
    let controller = SmokeController::new(runner.clone());
    let (mut config, _listener) = answering_config().await;
    config.config_file = PathBuf::from("/srv/quaydb.toml");

    let outcome = controller.run(&config).await;

    assert!(outcome.success());
    assert_eq!(outcome.run.status, RunStatus::Succeeded);
    assert_eq!(
        runner.issued_steps(),
        vec![
            "image_build",
            "container_rm",
            "container_run",
            "probe",
            "container_rm",
            "container_rm",
            "container_run",
            "probe",
            "container_rm",
        ]
    );

    let names: Vec<&str> = outcome.run.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "image_build",
            "container_start:default",
            "readiness:default",
            "probe:default",
            "teardown:default",
            "container_start:mounted",
            "readiness:mounted",
            "probe:mounted",
            "teardown:mounted",
        ]
    );

    assert_eq!(outcome.lanes.len(), 2);
    assert_eq!(outcome.lanes[0].label, "default");
    assert_eq!(outcome.lanes[1].label, "mounted");
    for lane in &outcome.lanes {
        assert!(lane.probe_passed, "lane {} probe should pass", lane.label);
        assert_eq!(lane.phase, SmokePhase::TornDown);
    }
}

#[tokio::test]
async fn test_config_mounted_only_on_second_lane() {
    let runner = Arc::new(ScriptedRunner::new());
    let controller = SmokeController::new(runner.clone());
    let (mut config, _listener) = answering_config().await;
    config.config_file = PathBuf::from("/srv/quaydb.toml");

    controller.run(&config).await;

    // First lane runs with baked-in defaults.
    assert!(!runner.argv_line(2).contains("-v "));
    // Second lane bind-mounts the runtime config read-only.
    assert!(runner
        .argv_line(6)
        .contains("-v /srv/quaydb.toml:/etc/quaydb/quaydb.toml:ro"));
}

#[tokio::test]
async fn test_probe_receives_lane_environment() {
    let runner = Arc::new(ScriptedRunner::new());
    let controller = SmokeController::new(runner.clone());
    let (config, _listener) = answering_config().await;

    controller.run(&config).await;

    let issued = runner.issued();
    let probe = issued
        .iter()
        .find(|spec| spec.name == "probe")
        .expect("probe was issued");

    assert_eq!(probe.cwd, Some(PathBuf::from("/work/quaydb")));
    let env: std::collections::HashMap<_, _> = probe
        .env
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(env["QUAYDB_ADDR"], "127.0.0.1");
    assert_eq!(env["QUAYDB_PORT"], config.host_port.to_string());
    assert_eq!(env["QUAYDB_IMAGE"], "quaydb/server:ci");
    assert_eq!(env["QUAYDB_CONTAINER"], "quaydb-smoke");
}

#[tokio::test]
async fn test_failed_probe_still_tears_down() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("probe", 3, "connection reset during handshake");
    let controller = SmokeController::new(runner.clone());
    let (config, _listener) = answering_config().await;

    let outcome = controller.run(&config).await;

    assert!(!outcome.success());
    match outcome.failure.as_ref().unwrap() {
        StageError::Probe { exit_code, .. } => assert_eq!(*exit_code, 3),
        other => panic!("expected Probe, got {other:?}"),
    }

    // Teardown ran after the failed probe, and the second lane never
    // started.
    let steps = runner.issued_steps();
    assert_eq!(steps.last().map(String::as_str), Some("container_rm"));
    assert_eq!(steps.iter().filter(|s| *s == "container_run").count(), 1);

    assert_eq!(outcome.lanes.len(), 1);
    assert!(!outcome.lanes[0].probe_passed);
    assert_eq!(outcome.lanes[0].phase, SmokePhase::TornDown);
}

#[tokio::test]
async fn test_build_failure_skips_lanes() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("image_build", 1, "missing base layer");
    let controller = SmokeController::new(runner.clone());
    let (config, _listener) = answering_config().await;

    let outcome = controller.run(&config).await;

    assert!(matches!(
        outcome.failure,
        Some(StageError::ImageBuild { exit_code: 1, .. })
    ));
    assert_eq!(runner.issued_steps(), vec!["image_build"]);
    assert!(outcome.lanes.is_empty());
}

#[tokio::test]
async fn test_default_config_mounts_checkout_file() {
    let runner = Arc::new(ScriptedRunner::new());
    let controller = SmokeController::new(runner.clone());
    let (config, _listener) = answering_config().await;

    let outcome = controller.run(&config).await;

    // Without an explicit override, the checkout's own runtime config is
    // mounted; the mounted lane always runs.
    assert!(outcome.success());
    assert_eq!(outcome.lanes.len(), 2);
    assert!(runner
        .argv_line(6)
        .contains("-v /work/quaydb/quaydb.toml:/etc/quaydb/quaydb.toml:ro"));
}

#[tokio::test]
async fn test_readiness_failure_skips_probe_and_tears_down() {
    let runner = Arc::new(ScriptedRunner::new());
    let controller = SmokeController::new(runner.clone());
    let (mut config, _listener) = answering_config().await;
    config.host_port = closed_port().await;
    config.ready_timeout_secs = 1;

    let outcome = controller.run(&config).await;

    match outcome.failure.as_ref().unwrap() {
        StageError::Readiness { timeout_secs, .. } => assert_eq!(*timeout_secs, 1),
        other => panic!("expected Readiness, got {other:?}"),
    }

    let steps = runner.issued_steps();
    assert!(!steps.iter().any(|s| s == "probe"));
    assert_eq!(steps.last().map(String::as_str), Some("container_rm"));
    assert_eq!(outcome.lanes[0].phase, SmokePhase::TornDown);
}

#[tokio::test]
async fn test_start_failure_aborts_lane_before_teardown() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("container_run", 125, "port is already allocated");
    let controller = SmokeController::new(runner.clone());
    let (config, _listener) = answering_config().await;

    let outcome = controller.run(&config).await;

    assert!(matches!(
        outcome.failure,
        Some(StageError::ContainerStart { .. })
    ));
    // Nothing started, so nothing to tear down beyond the initial rm.
    assert_eq!(
        runner.issued_steps(),
        vec!["image_build", "container_rm", "container_run"]
    );
    assert_eq!(outcome.lanes[0].phase, SmokePhase::Built);
}

#[tokio::test]
async fn test_deadline_times_out_and_cleans_up() {
    let runner = Arc::new(ScriptedRunner::new());
    let controller = SmokeController::new(runner.clone());
    let (mut config, _listener) = answering_config().await;
    // A long fixed settle delay makes the lane hang past the deadline.
    config.settle_secs = 60;
    config.deadline_secs = 1;

    let outcome = controller.run(&config).await;

    assert_eq!(outcome.run.status, RunStatus::TimedOut);
    assert!(matches!(
        outcome.failure,
        Some(StageError::TimedOut { deadline_secs: 1 })
    ));
    // Post-timeout cleanup frees the container name.
    assert_eq!(
        runner.issued_steps().last().map(String::as_str),
        Some("container_rm")
    );
}
