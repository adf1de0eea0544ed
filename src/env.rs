//! Environment configuration helpers for loading API credentials from .env files.

use std::collections::HashMap;
use std::path::Path;

/// Loads environment variables from a .env file in the specified directory,
/// falling back to the current directory if no path is provided.
///
/// Returns a map suitable for `ClaudeCliOptions.env`.
///
/// # Example
/// ```no_run
/// use claude_exec::env::load_env;
///
/// // Load from current directory
/// let env_vars = load_env(None).unwrap();
///
/// // Load from specific path
/// let env_vars = load_env(Some("/path/to/project".as_ref())).unwrap();
/// ```
pub fn load_env(dir: Option<&Path>) -> Result<HashMap<String, String>, EnvError> {
    let env_path = match dir {
        Some(d) => d.join(".env"),
        None => std::env::current_dir()
            .map_err(|e| EnvError::Io(e.to_string()))?
            .join(".env"),
    };

    if env_path.exists() {
        dotenvy::from_path(&env_path).map_err(|e| EnvError::Parse(e.to_string()))?;
    }

    Ok(anthropic_env())
}

/// Returns a map with the `ANTHROPIC_*` variables currently set, for
/// passing credentials to `ClaudeCliOptions.env`.
pub fn anthropic_env() -> HashMap<String, String> {
    let mut env = HashMap::new();

    for key in ["ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL", "ANTHROPIC_MODEL"] {
        if let Ok(value) = std::env::var(key) {
            env.insert(key.to_string(), value);
        }
    }

    env
}

/// Creates options with credentials loaded from .env, setting the model
/// when `ANTHROPIC_MODEL` is present.
pub fn options_from_env(dir: Option<&Path>) -> Result<crate::config::ClaudeCliOptions, EnvError> {
    let env_vars = load_env(dir)?;

    let mut options = crate::config::ClaudeCliOptions::default();
    options.env = env_vars;

    if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
        options.model = Some(model);
    }

    Ok(options)
}

/// Errors that can occur when loading environment configuration.
#[derive(Debug, Clone)]
pub enum EnvError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for EnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvError::Io(msg) => write!(f, "IO error: {}", msg),
            EnvError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for EnvError {}
