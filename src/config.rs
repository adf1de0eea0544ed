//! Configuration for one CLI invocation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Permission behaviour requested from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

/// How the child's environment is seeded before caller overrides apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvMode {
    /// Start from the full parent environment.
    #[default]
    Inherit,
    /// Start from an empty environment.
    Isolate,
}

/// Callback invoked with each line the CLI writes to stderr.
pub type StderrCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Options controlling a single CLI invocation.
#[derive(Clone, Default)]
pub struct ClaudeCliOptions {
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
    pub model: Option<String>,
    pub permission_mode: Option<PermissionMode>,
    pub continue_conversation: bool,
    pub resume: Option<String>,
    pub settings: Option<String>,
    pub add_dirs: Vec<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub cli_path: Option<PathBuf>,
    /// Variables applied on top of the seed environment; they always win
    /// over an inherited value of the same name.
    pub env: HashMap<String, String>,
    pub env_mode: EnvMode,
    pub extra_args: HashMap<String, Option<String>>,
    /// Whole-invocation deadline. The child is killed when it expires.
    pub timeout: Option<Duration>,
    pub max_buffer_size: Option<usize>,
    pub stderr: Option<StderrCallback>,
    /// Unix account to run the CLI as.
    pub user: Option<String>,
}

// Env values must never reach logs or error text, so Debug prints keys only.
impl std::fmt::Debug for ClaudeCliOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut env_keys: Vec<&String> = self.env.keys().collect();
        env_keys.sort();
        f.debug_struct("ClaudeCliOptions")
            .field("system_prompt", &self.system_prompt)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("max_turns", &self.max_turns)
            .field("model", &self.model)
            .field("permission_mode", &self.permission_mode)
            .field("continue_conversation", &self.continue_conversation)
            .field("resume", &self.resume)
            .field("settings", &self.settings)
            .field("add_dirs", &self.add_dirs)
            .field("cwd", &self.cwd)
            .field("cli_path", &self.cli_path)
            .field("env_keys", &env_keys)
            .field("env_mode", &self.env_mode)
            .field("extra_args", &self.extra_args)
            .field("timeout", &self.timeout)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("has_stderr", &self.stderr.is_some())
            .field("user", &self.user)
            .finish()
    }
}
