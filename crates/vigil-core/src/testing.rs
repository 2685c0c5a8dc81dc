//! Test doubles.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates that need to run git/docker logic without the binaries.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};

type Handler = dyn Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync;

/// A [`CommandRunner`] that answers from a closure and records every call.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    calls: Mutex<Vec<CommandSpec>>,
    missing: HashSet<String>,
}

impl ScriptedRunner {
    /// Creates a runner answering with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            missing: HashSet::new(),
        }
    }

    /// A runner where every command exits 0 with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(CommandOutput::ok("")))
    }

    /// Makes [`CommandRunner::locate`] report `program` as not installed.
    pub fn without_program(mut self, program: impl Into<String>) -> Self {
        self.missing.insert(program.into());
        self
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Recorded invocations rendered as `program arg1 arg2 ...`.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::display).collect()
    }

    /// Number of recorded invocations matching `predicate`.
    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CommandSpec) -> bool,
    {
        self.calls.lock().iter().filter(|spec| predicate(spec)).count()
    }

    /// Forgets recorded invocations.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.calls.lock().len())
            .field("missing", &self.missing)
            .finish()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().push(spec.clone());
        if self.missing.contains(&spec.program) {
            return Err(CommandError::NotFound {
                program: spec.program.clone(),
            });
        }
        (self.handler)(spec)
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        (!self.missing.contains(program)).then(|| PathBuf::from("/usr/bin").join(program))
    }
}
