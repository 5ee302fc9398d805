//! Smoke-test controller.
//!
//! Builds the image once, then drives the boot-probe-teardown lifecycle
//! twice: lane "default" with the image's baked-in configuration and lane
//! "mounted" with the external runtime config bind-mounted. Teardown is
//! unconditional so every lane ends with the container name free.

use crate::container::{ContainerCli, ContainerConfig};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use slipway_core::{
    CapturedOutput, CommandRunner, CommandSpec, PipelineRun, Result, RunStatus, StageError,
    StageRecord, TriggerReason,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// State machine of one smoke lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokePhase {
    Idle,
    Built,
    Started,
    AwaitingReady,
    Probed,
    TornDown,
}

/// Configuration for a smoke run.
#[derive(Debug, Clone)]
pub struct SmokeConfig {
    /// Source checkout root; the image build context and probe cwd.
    pub workspace: PathBuf,

    /// Build descriptor consumed by the image build.
    pub dockerfile: PathBuf,

    /// Image tag to build and run.
    pub image: String,

    /// Fixed container instance name for this lane.
    pub container_name: String,

    /// Host address the published port answers on.
    pub host: String,

    /// Host side of the published port mapping.
    pub host_port: u16,

    /// Container side of the published port mapping.
    pub container_port: u16,

    /// External runtime config mounted on the second lane. Both lanes are
    /// part of the contract; there is no single-lane mode.
    pub config_file: PathBuf,

    /// Probe argv; env-driven, no required arguments.
    pub probe: Vec<String>,

    /// Probe timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Fixed settle delay in seconds; 0 selects the active readiness poll.
    pub settle_secs: u64,

    /// Budget for the active readiness poll.
    pub ready_timeout_secs: u64,

    /// Hard wall-clock deadline for the whole smoke run (0 = unbounded).
    pub deadline_secs: u64,

    /// Why this run was triggered.
    pub trigger: TriggerReason,
}

impl SmokeConfig {
    /// Defaults rooted at a checkout directory.
    pub fn new(workspace: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        let workspace = workspace.into();
        Self {
            dockerfile: workspace.join("Dockerfile"),
            image: image.into(),
            container_name: "quaydb-server".to_string(),
            host: "127.0.0.1".to_string(),
            host_port: 5440,
            container_port: 5440,
            config_file: workspace.join("quaydb.toml"),
            probe: vec!["./integration_tests/basic.sh".to_string()],
            probe_timeout_secs: 300,
            settle_secs: 0,
            ready_timeout_secs: 60,
            deadline_secs: 3600,
            trigger: TriggerReason::Manual,
            workspace,
        }
    }
}

/// Final state of one lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeLane {
    /// "default" or "mounted".
    pub label: String,

    /// Where the lane's state machine ended.
    pub phase: SmokePhase,

    /// Whether the probe exited 0.
    pub probe_passed: bool,
}

/// Terminal result of a smoke run.
#[derive(Debug)]
pub struct SmokeOutcome {
    pub run: PipelineRun,
    pub lanes: Vec<SmokeLane>,
    pub failure: Option<StageError>,
}

impl SmokeOutcome {
    /// Did the build and both lanes pass?
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// The smoke-test controller.
pub struct SmokeController {
    runner: Arc<dyn CommandRunner>,
    cli: ContainerCli,
}

impl SmokeController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let cli = ContainerCli::new(runner.clone());
        Self { runner, cli }
    }

    /// Use a preconfigured container CLI (alternate runtime program).
    pub fn with_cli(runner: Arc<dyn CommandRunner>, cli: ContainerCli) -> Self {
        Self { runner, cli }
    }

    /// Execute the smoke run, bounded by the run deadline. On deadline
    /// expiry any started instance is removed best-effort before the run
    /// is reported as timed out.
    pub async fn run(&self, config: &SmokeConfig) -> SmokeOutcome {
        let mut run = PipelineRun::start(config.trigger);
        let mut lanes = Vec::new();
        info!(run_id = %run.id, image = %config.image, "starting smoke run");

        let result = if config.deadline_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(config.deadline_secs),
                self.execute(&mut run, &mut lanes, config),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => {
                    // The lane future was dropped mid-flight; free the name.
                    if let Err(err) = self.cli.force_remove(&config.container_name).await {
                        warn!(error = %err, "post-timeout cleanup failed");
                    }
                    Err(StageError::TimedOut {
                        deadline_secs: config.deadline_secs,
                    })
                }
            }
        } else {
            self.execute(&mut run, &mut lanes, config).await
        };

        match result {
            Ok(()) => {
                run.finish(RunStatus::Succeeded);
                info!(run_id = %run.id, "smoke run succeeded");
                SmokeOutcome {
                    run,
                    lanes,
                    failure: None,
                }
            }
            Err(failure) => {
                let status = if matches!(failure, StageError::TimedOut { .. }) {
                    RunStatus::TimedOut
                } else {
                    RunStatus::Failed
                };
                run.finish(status);
                info!(run_id = %run.id, stage = %failure.stage(), "smoke run failed");
                SmokeOutcome {
                    run,
                    lanes,
                    failure: Some(failure),
                }
            }
        }
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        lanes: &mut Vec<SmokeLane>,
        config: &SmokeConfig,
    ) -> Result<()> {
        // Build once; both lanes run the same image.
        let started = Utc::now();
        match self
            .cli
            .build(&config.image, &config.dockerfile, &config.workspace)
            .await
        {
            Ok(()) => run.record(StageRecord::internal("image_build", started, true)),
            Err(err) => {
                run.record(StageRecord::internal("image_build", started, false));
                return Err(err);
            }
        }

        self.lifecycle(run, lanes, config, "default", None).await?;
        self.lifecycle(
            run,
            lanes,
            config,
            "mounted",
            Some(config.config_file.clone()),
        )
        .await?;

        Ok(())
    }

    /// One lane: start → await ready → probe → teardown (always).
    async fn lifecycle(
        &self,
        run: &mut PipelineRun,
        lanes: &mut Vec<SmokeLane>,
        config: &SmokeConfig,
        label: &str,
        config_mount: Option<PathBuf>,
    ) -> Result<()> {
        let mut lane = SmokeLane {
            label: label.to_string(),
            phase: SmokePhase::Built,
            probe_passed: false,
        };

        let container = ContainerConfig {
            name: config.container_name.clone(),
            image: config.image.clone(),
            host: config.host.clone(),
            host_port: config.host_port,
            container_port: config.container_port,
            config_mount,
        };

        let started = Utc::now();
        let mut instance = match self.cli.start(&container).await {
            Ok(instance) => {
                run.record(StageRecord::internal(
                    format!("container_start:{label}"),
                    started,
                    true,
                ));
                instance
            }
            Err(err) => {
                run.record(StageRecord::internal(
                    format!("container_start:{label}"),
                    started,
                    false,
                ));
                lanes.push(lane);
                return Err(err);
            }
        };
        lane.phase = SmokePhase::Started;

        lane.phase = SmokePhase::AwaitingReady;
        let ready_started = Utc::now();
        let ready = self.await_ready(config).await;
        run.record(StageRecord::internal(
            format!("readiness:{label}"),
            ready_started,
            ready.is_ok(),
        ));

        let probed = match ready {
            Ok(()) => {
                let probe_started = Utc::now();
                match self.probe(config).await {
                    Ok(output) => {
                        run.record(StageRecord::from_output(
                            format!("probe:{label}"),
                            probe_started,
                            &output,
                        ));
                        if output.success() {
                            instance.mark_probed();
                            lane.phase = SmokePhase::Probed;
                            lane.probe_passed = true;
                            Ok(())
                        } else {
                            Err(StageError::Probe {
                                addr: config.host.clone(),
                                port: config.host_port,
                                exit_code: output.exit_code,
                            })
                        }
                    }
                    Err(err) => {
                        run.record(StageRecord::internal(
                            format!("probe:{label}"),
                            probe_started,
                            false,
                        ));
                        Err(err)
                    }
                }
            }
            Err(err) => Err(err),
        };

        // Teardown runs whatever happened above, so the next lane (or the
        // next pipeline run) starts with the name free.
        let teardown_started = Utc::now();
        self.cli.teardown(&mut instance).await;
        run.record(StageRecord::internal(
            format!("teardown:{label}"),
            teardown_started,
            true,
        ));
        lane.phase = SmokePhase::TornDown;
        lanes.push(lane);

        probed
    }

    /// Wait for the server to answer on the published port.
    ///
    /// Default is an active bounded poll with backoff. The fixed settle
    /// delay (`settle_secs > 0`) mirrors the original CI behaviour and is
    /// deliberately coarse; prefer the poll.
    async fn await_ready(&self, config: &SmokeConfig) -> Result<()> {
        if config.settle_secs > 0 {
            tokio::time::sleep(Duration::from_secs(config.settle_secs)).await;
            return Ok(());
        }

        let addr = format!("{}:{}", config.host, config.host_port);
        let deadline = Instant::now() + Duration::from_secs(config.ready_timeout_secs);
        let mut backoff = Duration::from_millis(100);

        loop {
            match tokio::net::TcpStream::connect(&addr).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if Instant::now() + backoff >= deadline {
                        warn!(addr = %addr, error = %err, "readiness poll exhausted");
                        return Err(StageError::Readiness {
                            addr,
                            timeout_secs: config.ready_timeout_secs,
                        });
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
            }
        }
    }

    /// Invoke the external probe with the lane environment exported.
    async fn probe(&self, config: &SmokeConfig) -> Result<CapturedOutput> {
        let argv: Vec<&str> = config.probe.iter().map(|s| s.as_str()).collect();
        let spec = CommandSpec::new("probe", &argv)
            .in_dir(&config.workspace)
            .with_env("QUAYDB_ADDR", &config.host)
            .with_env("QUAYDB_PORT", config.host_port.to_string())
            .with_env("QUAYDB_IMAGE", &config.image)
            .with_env("QUAYDB_CONTAINER", &config.container_name)
            .with_timeout(config.probe_timeout_secs);
        self.runner.run(&spec).await
    }
}
