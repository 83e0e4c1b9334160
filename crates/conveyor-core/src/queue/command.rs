//! Command-builder seam between the queue and the allowlisted commands.
//!
//! The engine treats the command behind a definition as opaque: an external,
//! pre-validated builder maps `(definition_key, payload)` to an argv. This
//! module defines that seam plus a static table-driven builder used by the
//! server binary and tests.

use conveyor_types::error::QueueError;
use std::collections::HashMap;

/// A resolved subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the child, on top of the worker's own.
    pub env: Vec<(String, String)>,
}

/// Maps an allowlisted definition key and validated payload to an argv.
///
/// Implementations never see unvalidated payloads: the store has already
/// checked the definition's `ArgSchema` at enqueue time.
pub trait CommandBuilder: Send + Sync {
    fn build(
        &self,
        definition_key: &str,
        payload: &serde_json::Value,
    ) -> Result<CommandSpec, QueueError>;
}

/// Table-driven builder: each definition key maps to a fixed program and
/// base args; payload fields are appended as `--key value` flags in sorted
/// key order (booleans become bare `--key` when true, omitted when false).
#[derive(Debug, Default)]
pub struct StaticCommandBuilder {
    commands: HashMap<String, (String, Vec<String>)>,
}

impl StaticCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition key with its program and base arguments.
    pub fn register(
        mut self,
        definition_key: impl Into<String>,
        program: impl Into<String>,
        base_args: Vec<String>,
    ) -> Self {
        self.commands
            .insert(definition_key.into(), (program.into(), base_args));
        self
    }
}

impl CommandBuilder for StaticCommandBuilder {
    fn build(
        &self,
        definition_key: &str,
        payload: &serde_json::Value,
    ) -> Result<CommandSpec, QueueError> {
        let (program, base_args) = self.commands.get(definition_key).ok_or_else(|| {
            QueueError::Validation(format!("no command registered for '{definition_key}'"))
        })?;

        let mut args = base_args.clone();
        if let Some(map) = payload.as_object() {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                match &map[key] {
                    serde_json::Value::Bool(true) => args.push(format!("--{key}")),
                    serde_json::Value::Bool(false) | serde_json::Value::Null => {}
                    serde_json::Value::String(s) => {
                        args.push(format!("--{key}"));
                        args.push(s.clone());
                    }
                    other => {
                        args.push(format!("--{key}"));
                        args.push(other.to_string());
                    }
                }
            }
        }

        Ok(CommandSpec {
            program: program.clone(),
            args,
            env: Vec::new(),
        })
    }
}
