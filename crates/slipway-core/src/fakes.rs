//! Test fakes for the command execution seam.
//!
//! `ScriptedRunner` replays canned outputs keyed by step name and records
//! every issued command, so pipeline ordering and argv construction can be
//! asserted without spawning processes.

use crate::error::Result;
use crate::exec::{CapturedOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory `CommandRunner` for tests.
///
/// Unscripted steps succeed with empty output. Scripted steps return the
/// configured exit code and stderr.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, CapturedOutput>>,
    issued: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a step (by `CommandSpec::name`) to exit with the given code.
    pub fn respond(&self, step: &str, exit_code: i32, stderr: &str) {
        self.responses.lock().unwrap().insert(
            step.to_string(),
            CapturedOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
                duration_ms: 1,
            },
        );
    }

    /// Script a step to fail with exit code 1.
    pub fn fail(&self, step: &str) {
        self.respond(step, 1, "scripted failure");
    }

    /// Script a step to succeed with the given stdout.
    pub fn respond_stdout(&self, step: &str, stdout: &str) {
        self.responses.lock().unwrap().insert(
            step.to_string(),
            CapturedOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
                duration_ms: 1,
            },
        );
    }

    /// Every command issued so far, in order.
    pub fn issued(&self) -> Vec<CommandSpec> {
        self.issued.lock().unwrap().clone()
    }

    /// Step names issued so far, in order.
    pub fn issued_steps(&self) -> Vec<String> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Argv of the nth issued command, joined with spaces.
    pub fn argv_line(&self, index: usize) -> String {
        self.issued.lock().unwrap()[index].argv.join(" ")
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CapturedOutput> {
        self.issued.lock().unwrap().push(spec.clone());
        let scripted = self.responses.lock().unwrap().get(&spec.name).cloned();
        Ok(scripted.unwrap_or(CapturedOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        }))
    }
}
