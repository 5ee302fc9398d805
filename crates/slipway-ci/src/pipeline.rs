//! Verification pipeline orchestration.
//!
//! Stage order is invariant: provision → cache restore → quota →
//! quality gates (license → lint → format) → tests (unit → integration) →
//! lock-drift check → cache save. The first failure aborts the rest of the
//! sequence and surfaces as a typed `StageError` naming the stage.

use crate::drift::LockSnapshot;
use crate::stage::{StageConfig, VerifyStage};
use chrono::Utc;
use slipway_core::{
    CapturedOutput, CommandRunner, PipelineRun, Result, RunStatus, StageError, StageRecord,
    TestPhase, TriggerReason,
};
use slipway_env::{ensure_toolchain, CacheKey, FsDependencyCache, ToolchainSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for one verification run.
///
/// Shared resources (lock file path, cache location) are carried here as
/// explicit handles scoped to the run; nothing is ambient.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Source checkout root.
    pub workspace: PathBuf,

    /// Why this run was triggered.
    pub trigger: TriggerReason,

    /// Pinned toolchain to provision.
    pub toolchain: ToolchainSpec,

    /// Toolchain pin file, fingerprinted into the cache key.
    pub toolchain_file: PathBuf,

    /// Dependency lock file, fingerprinted into the cache key and
    /// watched for drift.
    pub lock_file: PathBuf,

    /// Dependency cache root; `None` disables caching entirely.
    pub cache_dir: Option<PathBuf>,

    /// Paths persisted/restored by the cache.
    pub cache_paths: Vec<PathBuf>,

    /// Whether the disk-quota precondition stages run.
    pub quota_enabled: bool,

    /// Per-stage timeout in seconds (0 = unbounded).
    pub stage_timeout_secs: u64,

    /// Hard wall-clock deadline for the whole run (0 = unbounded).
    pub deadline_secs: u64,
}

impl VerifyConfig {
    /// Defaults rooted at a checkout directory.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            toolchain: ToolchainSpec::pinned("stable"),
            toolchain_file: workspace.join("rust-toolchain.toml"),
            lock_file: workspace.join("Cargo.lock"),
            cache_dir: None,
            cache_paths: vec![workspace.join("target")],
            quota_enabled: true,
            stage_timeout_secs: 3600,
            deadline_secs: 7200,
            trigger: TriggerReason::Manual,
            workspace,
        }
    }
}

/// Terminal result of a verification run: the full run record plus the
/// failure that aborted it, if any.
#[derive(Debug)]
pub struct VerifyOutcome {
    pub run: PipelineRun,
    pub failure: Option<StageError>,
}

impl VerifyOutcome {
    /// Did every stage pass?
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// The verification pipeline orchestrator.
pub struct VerifyPipeline {
    runner: Arc<dyn CommandRunner>,
}

impl VerifyPipeline {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Execute the full gated sequence, bounded by the run deadline.
    pub async fn run(&self, config: &VerifyConfig) -> VerifyOutcome {
        let mut run = PipelineRun::start(config.trigger);
        info!(run_id = %run.id, workspace = %config.workspace.display(), "starting verification run");

        let result = if config.deadline_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(config.deadline_secs),
                self.execute(&mut run, config),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err(StageError::TimedOut {
                    deadline_secs: config.deadline_secs,
                }),
            }
        } else {
            self.execute(&mut run, config).await
        };

        match result {
            Ok(()) => {
                run.finish(RunStatus::Succeeded);
                info!(run_id = %run.id, "verification run succeeded");
                VerifyOutcome { run, failure: None }
            }
            Err(failure) => {
                let status = if matches!(failure, StageError::TimedOut { .. }) {
                    RunStatus::TimedOut
                } else {
                    RunStatus::Failed
                };
                run.finish(status);
                info!(run_id = %run.id, stage = %failure.stage(), "verification run failed");
                VerifyOutcome {
                    run,
                    failure: Some(failure),
                }
            }
        }
    }

    async fn execute(&self, run: &mut PipelineRun, config: &VerifyConfig) -> Result<()> {
        // Toolchain provisioning. Fatal on failure: a broken toolchain is
        // an environment problem, not something a retry fixes.
        let started = Utc::now();
        match ensure_toolchain(self.runner.as_ref(), &config.toolchain).await {
            Ok(()) => run.record(StageRecord::internal("provision", started, true)),
            Err(err) => {
                run.record(StageRecord::internal("provision", started, false));
                return Err(err);
            }
        }

        // Cache restore. A miss or an unreadable cache is a cold start.
        let cache = self.open_cache(config);
        if let Some((cache, key)) = &cache {
            let started = Utc::now();
            match cache.restore(key, &config.cache_paths) {
                Ok(Some(matched)) => info!(key = %matched, "cache hit"),
                Ok(None) => info!(key = %key.primary, "cache miss"),
                Err(err) => warn!(error = %err, "cache restore failed; starting cold"),
            }
            run.record(StageRecord::internal("cache_restore", started, true));
        }

        // Disk quota precondition. The release step is best-effort; the
        // assertion aborts before any build work can run out of disk.
        if config.quota_enabled {
            let release = self
                .run_stage(run, &self.builtin(VerifyStage::QuotaRelease, config), &config.workspace)
                .await?;
            if !release.success() {
                warn!(exit_code = release.exit_code, "quota release failed; continuing");
            }

            let assertion = self
                .run_stage(run, &self.builtin(VerifyStage::QuotaAssert, config), &config.workspace)
                .await?;
            if !assertion.success() {
                return Err(StageError::Quota(stderr_tail(&assertion)));
            }
        }

        // Quality gates, fixed order, first failure wins.
        for gate in [
            VerifyStage::LicenseHeader,
            VerifyStage::Lint,
            VerifyStage::Format,
        ] {
            let output = self
                .run_stage(run, &self.builtin(gate, config), &config.workspace)
                .await?;
            if !output.success() {
                return Err(StageError::QualityGate {
                    check: gate.name().to_string(),
                    exit_code: output.exit_code,
                });
            }
        }

        // Snapshot the lock file before anything can mutate it.
        let started = Utc::now();
        let snapshot = match LockSnapshot::capture(&config.lock_file) {
            Ok(snapshot) => {
                run.record(StageRecord::internal("lock_snapshot", started, true));
                snapshot
            }
            Err(err) => {
                run.record(StageRecord::internal("lock_snapshot", started, false));
                return Err(err);
            }
        };

        // Tests: unit first, then the integration harness in its own
        // working directory. Both must pass; neither is retried.
        let unit = self
            .run_stage(run, &self.builtin(VerifyStage::UnitTest, config), &config.workspace)
            .await?;
        if !unit.success() {
            return Err(StageError::Test {
                phase: TestPhase::Unit,
                exit_code: unit.exit_code,
            });
        }

        let integration = self
            .run_stage(
                run,
                &self.builtin(VerifyStage::IntegrationHarness, config),
                &config.workspace,
            )
            .await?;
        if !integration.success() {
            return Err(StageError::Test {
                phase: TestPhase::Integration,
                exit_code: integration.exit_code,
            });
        }

        // Drift check: byte-exact comparison against the snapshot.
        let started = Utc::now();
        match snapshot.verify() {
            Ok(()) => run.record(StageRecord::internal("lock_drift", started, true)),
            Err(err) => {
                run.record(StageRecord::internal("lock_drift", started, false));
                return Err(err);
            }
        }

        // Cache save, only after a fully green run. A failed save is a
        // lost optimization, not a failed pipeline.
        if let Some((cache, key)) = &cache {
            let started = Utc::now();
            if let Err(err) = cache.save(&key.primary, &config.cache_paths) {
                warn!(error = %err, "cache save failed; run result unaffected");
            }
            run.record(StageRecord::internal("cache_save", started, true));
        }

        Ok(())
    }

    fn builtin(&self, stage: VerifyStage, config: &VerifyConfig) -> StageConfig {
        StageConfig::from_builtin(stage, config.stage_timeout_secs)
    }

    /// Execute one stage command and record its outcome on the run.
    async fn run_stage(
        &self,
        run: &mut PipelineRun,
        stage: &StageConfig,
        workspace: &std::path::Path,
    ) -> Result<CapturedOutput> {
        if !stage.enabled {
            info!(stage = %stage.name, "skipping disabled stage");
            return Ok(CapturedOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
            });
        }

        info!(stage = %stage.name, "executing stage");
        let started = Utc::now();
        let spec = stage.to_spec(workspace);
        match self.runner.run(&spec).await {
            Ok(output) => {
                run.record(StageRecord::from_output(&stage.name, started, &output));
                Ok(output)
            }
            Err(err) => {
                run.record(StageRecord::internal(&stage.name, started, false));
                Err(err)
            }
        }
    }

    fn open_cache(&self, config: &VerifyConfig) -> Option<(FsDependencyCache, CacheKey)> {
        let dir = config.cache_dir.as_ref()?;
        let key = match CacheKey::compose(
            std::env::consts::OS,
            &config.toolchain_file,
            &config.lock_file,
        ) {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "cache key composition failed; caching disabled for this run");
                return None;
            }
        };
        match FsDependencyCache::new(dir) {
            Ok(cache) => Some((cache, key)),
            Err(err) => {
                warn!(error = %err, "cache unavailable; caching disabled for this run");
                None
            }
        }
    }
}

fn stderr_tail(output: &CapturedOutput) -> String {
    let text = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    text.to_string()
}
