//! Pinned toolchain provisioning via rustup.
//!
//! Idempotent: an already-installed toolchain is not reinstalled, and the
//! component add is itself a no-op when the components are present. Any
//! failure is fatal — a broken toolchain install means the environment is
//! unusable and nothing downstream can be trusted.

use slipway_core::{CommandRunner, CommandSpec, Result, StageError};
use tracing::{debug, info};

/// Pinned toolchain identity plus the components the gates need.
#[derive(Debug, Clone)]
pub struct ToolchainSpec {
    /// Toolchain channel or version pin (e.g. "1.75.0").
    pub channel: String,

    /// Components added on top of the minimal profile.
    pub components: Vec<String>,
}

impl ToolchainSpec {
    /// Pin a channel with the lint and formatter components the quality
    /// gates invoke.
    pub fn pinned(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            components: vec!["clippy".to_string(), "rustfmt".to_string()],
        }
    }
}

/// Ensure the pinned toolchain is installed with its components.
pub async fn ensure_toolchain(runner: &dyn CommandRunner, spec: &ToolchainSpec) -> Result<()> {
    let listed = runner
        .run(&CommandSpec::new(
            "toolchain_list",
            &["rustup", "toolchain", "list"],
        ))
        .await?;

    if listed.success() && listed.stdout.contains(&spec.channel) {
        debug!(channel = %spec.channel, "toolchain already installed");
    } else {
        info!(channel = %spec.channel, "installing toolchain");
        let install = runner
            .run(&CommandSpec::new(
                "toolchain_install",
                &[
                    "rustup",
                    "toolchain",
                    "install",
                    &spec.channel,
                    "--profile",
                    "minimal",
                ],
            ))
            .await?;
        if !install.success() {
            return Err(StageError::Provisioning(format!(
                "rustup toolchain install {} exited {}: {}",
                spec.channel,
                install.exit_code,
                install.stderr.trim()
            )));
        }
    }

    if spec.components.is_empty() {
        return Ok(());
    }

    let mut argv: Vec<&str> = vec!["rustup", "component", "add", "--toolchain", &spec.channel];
    argv.extend(spec.components.iter().map(|c| c.as_str()));
    let added = runner.run(&CommandSpec::new("component_add", &argv)).await?;
    if !added.success() {
        return Err(StageError::Provisioning(format!(
            "rustup component add exited {}: {}",
            added.exit_code,
            added.stderr.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::fakes::ScriptedRunner;

    #[tokio::test]
    async fn test_install_runs_when_not_listed() {
        let runner = ScriptedRunner::new();
        let spec = ToolchainSpec::pinned("1.75.0");
        ensure_toolchain(&runner, &spec).await.unwrap();

        assert_eq!(
            runner.issued_steps(),
            vec!["toolchain_list", "toolchain_install", "component_add"]
        );
        assert!(runner
            .argv_line(1)
            .contains("toolchain install 1.75.0 --profile minimal"));
        assert!(runner
            .argv_line(2)
            .contains("component add --toolchain 1.75.0 clippy rustfmt"));
    }

    #[tokio::test]
    async fn test_install_skipped_when_already_present() {
        let runner = ScriptedRunner::new();
        runner.respond_stdout("toolchain_list", "1.75.0-x86_64-unknown-linux-gnu\n");

        let spec = ToolchainSpec::pinned("1.75.0");
        ensure_toolchain(&runner, &spec).await.unwrap();

        assert_eq!(
            runner.issued_steps(),
            vec!["toolchain_list", "component_add"]
        );
    }

    #[tokio::test]
    async fn test_install_failure_is_provisioning_error() {
        let runner = ScriptedRunner::new();
        runner.respond("toolchain_install", 1, "no network");

        let spec = ToolchainSpec::pinned("1.75.0");
        let err = ensure_toolchain(&runner, &spec).await.unwrap_err();
        match err {
            StageError::Provisioning(msg) => assert!(msg.contains("no network")),
            other => panic!("expected Provisioning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_component_add_failure_is_provisioning_error() {
        let runner = ScriptedRunner::new();
        runner.respond_stdout("toolchain_list", "1.75.0\n");
        runner.respond("component_add", 1, "unknown component");

        let spec = ToolchainSpec::pinned("1.75.0");
        let err = ensure_toolchain(&runner, &spec).await.unwrap_err();
        assert!(matches!(err, StageError::Provisioning(_)));
    }
}
