//! Container runtime CLI wrapper.
//!
//! Thin argv builder over the `CommandRunner` seam; defaults to `docker`
//! but any CLI-compatible runtime (podman) can be substituted. The only
//! behaviour owned here is the idempotent-start contract: starting a name
//! that is already in use force-removes the prior instance first, so a
//! name collision alone can never fail a run.

use serde::{Deserialize, Serialize};
use slipway_core::{CommandRunner, CommandSpec, Result, StageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed in-container path the external runtime config is mounted at.
pub const CONFIG_MOUNT_PATH: &str = "/etc/quaydb/quaydb.toml";

/// One named container instance and how to publish it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Fixed instance name, reused across runs.
    pub name: String,

    /// Image reference to run.
    pub image: String,

    /// Host address the published port answers on.
    pub host: String,

    /// Host side of the published port mapping.
    pub host_port: u16,

    /// Container side of the published port mapping.
    pub container_port: u16,

    /// Host path of the runtime config to bind-mount read-only at
    /// [`CONFIG_MOUNT_PATH`]; `None` runs with baked-in defaults.
    pub config_mount: Option<PathBuf>,
}

/// Container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Running,
    Probed,
    Removed,
}

/// A started container and its lifecycle state.
#[derive(Debug, Clone)]
pub struct ContainerInstance {
    pub config: ContainerConfig,
    pub state: ContainerState,
}

impl ContainerInstance {
    /// Mark the instance as successfully probed.
    pub fn mark_probed(&mut self) {
        self.state = ContainerState::Probed;
    }
}

/// CLI wrapper over the container runtime.
pub struct ContainerCli {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout_secs: u64,
}

impl ContainerCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: "docker".to_string(),
            timeout_secs: 1800,
        }
    }

    /// Substitute another CLI-compatible runtime.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Build the image from a build descriptor. Build failures are
    /// deterministic given the same source, so there is no retry.
    pub async fn build(&self, image: &str, dockerfile: &Path, context: &Path) -> Result<()> {
        info!(image = %image, dockerfile = %dockerfile.display(), "building image");
        let output = self
            .runner
            .run(
                &CommandSpec::new(
                    "image_build",
                    &[
                        self.program.as_str(),
                        "build",
                        "-t",
                        image,
                        "-f",
                        &dockerfile.to_string_lossy(),
                        &context.to_string_lossy(),
                    ],
                )
                .with_timeout(self.timeout_secs),
            )
            .await?;

        if !output.success() {
            return Err(StageError::ImageBuild {
                image: image.to_string(),
                exit_code: output.exit_code,
            });
        }
        Ok(())
    }

    /// Force-remove an instance by name. A non-zero exit (no such
    /// container, already gone) is logged and swallowed so teardown can
    /// never mask an earlier failure.
    pub async fn force_remove(&self, name: &str) -> Result<()> {
        let output = self
            .runner
            .run(
                &CommandSpec::new(
                    "container_rm",
                    &[self.program.as_str(), "rm", "-f", name],
                )
                .with_timeout(120),
            )
            .await?;

        if output.success() {
            debug!(name = %name, "removed container");
        } else {
            debug!(name = %name, exit_code = output.exit_code, "nothing to remove");
        }
        Ok(())
    }

    /// Start a detached instance. Any prior holder of the name is
    /// force-removed first, making restart idempotent.
    pub async fn start(&self, config: &ContainerConfig) -> Result<ContainerInstance> {
        self.force_remove(&config.name).await?;

        let publish = format!(
            "{}:{}:{}",
            config.host, config.host_port, config.container_port
        );
        let mut argv: Vec<String> = vec![
            self.program.clone(),
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            config.name.clone(),
            "-p".to_string(),
            publish,
        ];
        if let Some(mount) = &config.config_mount {
            argv.push("-v".to_string());
            argv.push(format!("{}:{}:ro", mount.display(), CONFIG_MOUNT_PATH));
        }
        argv.push(config.image.clone());

        let argv_refs: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
        let output = self
            .runner
            .run(&CommandSpec::new("container_run", &argv_refs).with_timeout(300))
            .await?;

        if !output.success() {
            return Err(StageError::ContainerStart {
                name: config.name.clone(),
                reason: if output.stderr.trim().is_empty() {
                    format!("exit code {}", output.exit_code)
                } else {
                    output.stderr.trim().to_string()
                },
            });
        }

        info!(name = %config.name, image = %config.image, "container started");
        Ok(ContainerInstance {
            config: config.clone(),
            state: ContainerState::Running,
        })
    }

    /// Tear an instance down unconditionally. Failures are logged, never
    /// propagated — teardown must not mask the probe outcome.
    pub async fn teardown(&self, instance: &mut ContainerInstance) {
        if let Err(err) = self.force_remove(&instance.config.name).await {
            warn!(name = %instance.config.name, error = %err, "teardown failed");
        }
        instance.state = ContainerState::Removed;
    }
}
