//! Slipway - build verification and release smoke testing for quaydb.
//!
//! The `slipway` command drives two pipelines against a source checkout:
//!
//! - `verify`: toolchain provisioning, dependency cache, quality gates,
//!   unit and integration tests, and the lock-drift check
//! - `smoke`: container image build plus two boot-probe-teardown lanes,
//!   the second with an external runtime config bind-mounted

use anyhow::Result;
use clap::{Parser, Subcommand};
use slipway_ci::{VerifyConfig, VerifyOutcome, VerifyPipeline};
use slipway_core::{PipelineRun, ProcessRunner, TriggerReason};
use slipway_env::ToolchainSpec;
use slipway_smoke::{SmokeConfig, SmokeController};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(author = "Quaydb Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build verification and release smoke testing for quaydb", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the build-verification pipeline against a checkout
    Verify {
        /// Source checkout root
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Toolchain channel or version pin
        #[arg(short, long, default_value = "stable")]
        toolchain: String,

        /// Dependency cache root (caching disabled when omitted)
        #[arg(long, env = "SLIPWAY_CACHE_DIR")]
        cache_dir: Option<PathBuf>,

        /// Skip the disk-quota precondition stages
        #[arg(long)]
        no_quota: bool,

        /// Per-stage timeout in seconds (0 = unbounded)
        #[arg(long, default_value = "3600")]
        stage_timeout: u64,

        /// Wall-clock deadline for the whole run in seconds (0 = unbounded)
        #[arg(long, default_value = "7200")]
        deadline: u64,

        /// Trigger reason (push, pull-request, manual)
        #[arg(long, default_value = "manual")]
        trigger: String,

        /// Print the full run record as JSON instead of the text summary
        #[arg(long)]
        report_json: bool,
    },

    /// Build the server image and run the smoke-test lanes
    Smoke {
        /// Source checkout root (image build context and probe cwd)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Image tag to build and run
        #[arg(short, long, env = "QUAYDB_IMAGE", default_value = "quaydb/server:ci")]
        image: String,

        /// Container instance name
        #[arg(long, env = "QUAYDB_CONTAINER", default_value = "quaydb-server")]
        container: String,

        /// Host address the published port answers on
        #[arg(long, env = "QUAYDB_ADDR", default_value = "127.0.0.1")]
        addr: String,

        /// Published host port
        #[arg(short, long, env = "QUAYDB_PORT", default_value = "5440")]
        port: u16,

        /// Runtime config bind-mounted on the second lane
        /// (default: <workspace>/quaydb.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Probe command (argv)
        #[arg(long, num_args = 1.., default_value = "./integration_tests/basic.sh")]
        probe: Vec<String>,

        /// Container runtime program (docker, podman)
        #[arg(long, default_value = "docker")]
        runtime: String,

        /// Fixed settle delay in seconds; 0 uses the active readiness poll
        #[arg(long, default_value = "0")]
        settle: u64,

        /// Readiness poll budget in seconds
        #[arg(long, default_value = "60")]
        ready_timeout: u64,

        /// Wall-clock deadline for the whole run in seconds (0 = unbounded)
        #[arg(long, default_value = "3600")]
        deadline: u64,

        /// Trigger reason (push, pull-request, manual)
        #[arg(long, default_value = "manual")]
        trigger: String,

        /// Print the full run record as JSON instead of the text summary
        #[arg(long)]
        report_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    slipway_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Verify {
            workspace,
            toolchain,
            cache_dir,
            no_quota,
            stage_timeout,
            deadline,
            trigger,
            report_json,
        } => {
            let mut config = VerifyConfig::new(&workspace);
            config.toolchain = ToolchainSpec::pinned(&toolchain);
            config.cache_dir = cache_dir;
            config.quota_enabled = !no_quota;
            config.stage_timeout_secs = stage_timeout;
            config.deadline_secs = deadline;
            config.trigger = parse_trigger(&trigger)?;
            cmd_verify(&config, report_json).await
        }
        Commands::Smoke {
            workspace,
            image,
            container,
            addr,
            port,
            config,
            probe,
            runtime,
            settle,
            ready_timeout,
            deadline,
            trigger,
            report_json,
        } => {
            let mut smoke = SmokeConfig::new(&workspace, image);
            smoke.container_name = container;
            smoke.host = addr;
            smoke.host_port = port;
            smoke.container_port = port;
            if let Some(path) = config {
                smoke.config_file = path;
            }
            smoke.probe = probe;
            smoke.settle_secs = settle;
            smoke.ready_timeout_secs = ready_timeout;
            smoke.deadline_secs = deadline;
            smoke.trigger = parse_trigger(&trigger)?;
            cmd_smoke(&smoke, &runtime, report_json).await
        }
    }
}

fn parse_trigger(value: &str) -> Result<TriggerReason> {
    match value {
        "push" => Ok(TriggerReason::Push),
        "pull-request" => Ok(TriggerReason::PullRequest),
        "manual" => Ok(TriggerReason::Manual),
        other => anyhow::bail!("unknown trigger: {other} (expected push, pull-request or manual)"),
    }
}

/// Run the verification pipeline and report the outcome.
async fn cmd_verify(config: &VerifyConfig, report_json: bool) -> Result<()> {
    let pipeline = VerifyPipeline::new(Arc::new(ProcessRunner));
    let outcome: VerifyOutcome = pipeline.run(config).await;

    if report_json {
        println!("{}", serde_json::to_string_pretty(&outcome.run)?);
    } else {
        print_run_summary(&outcome.run);
    }

    match outcome.failure {
        None => {
            println!("\n✓ Verification passed");
            Ok(())
        }
        Some(failure) => {
            anyhow::bail!("verification failed at stage '{}': {failure}", failure.stage())
        }
    }
}

/// Run the smoke pipeline and report the outcome.
async fn cmd_smoke(config: &SmokeConfig, runtime: &str, report_json: bool) -> Result<()> {
    let runner = Arc::new(ProcessRunner);
    let cli = slipway_smoke::ContainerCli::new(runner.clone()).with_program(runtime);
    let controller = SmokeController::with_cli(runner, cli);
    let outcome = controller.run(config).await;

    if report_json {
        println!("{}", serde_json::to_string_pretty(&outcome.run)?);
    } else {
        print_run_summary(&outcome.run);
        println!();
        for lane in &outcome.lanes {
            let status = if lane.probe_passed { "✓" } else { "✗" };
            println!("  lane {:<8} {} probe", lane.label, status);
        }
    }

    match outcome.failure {
        None => {
            println!("\n✓ Smoke test passed");
            Ok(())
        }
        Some(failure) => {
            anyhow::bail!("smoke test failed at stage '{}': {failure}", failure.stage())
        }
    }
}

fn print_run_summary(run: &PipelineRun) {
    println!("Run ID: {}", run.id);
    println!();

    for stage in &run.stages {
        let status = if stage.passed() { "✓" } else { "✗" };
        let duration_ms = (stage.finished_at - stage.started_at).num_milliseconds();
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage.name, duration_ms, stage.exit_code
        );
    }

    println!();
    println!(
        "Summary: {}/{} stages passed",
        run.passed_count(),
        run.stages.len()
    );
}
