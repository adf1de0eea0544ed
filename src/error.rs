//! Error types exposed by the crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all operations.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),

    /// Raised when unable to start or talk to the CLI process.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Raised when the CLI binary cannot be located.
    #[error(transparent)]
    CliNotFound(#[from] CliNotFoundError),

    /// Raised when the CLI process exits with a failure code.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Raised when the CLI process outlives the configured timeout.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Raised when caller-supplied configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Raised when a stdout line cannot be decoded at all.
    #[error(transparent)]
    LineParse(#[from] LineParseError),

    /// IO error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error wrapper.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Raised when unable to start or talk to the CLI process.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct ConnectionError {
    message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Raised when the CLI binary is not found or not installed.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct CliNotFoundError {
    message: String,
    cli_path: Option<PathBuf>,
}

impl CliNotFoundError {
    pub fn new(message: impl Into<String>, cli_path: Option<PathBuf>) -> Self {
        let message = match cli_path.as_ref() {
            Some(path) => format!("{}: {}", message.into(), path.display()),
            None => message.into(),
        };
        Self { message, cli_path }
    }

    pub fn cli_path(&self) -> Option<&PathBuf> {
        self.cli_path.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Raised when the CLI process exits with a non-benign failure code.
/// Carries the exit code, the accumulated stderr text, and the full
/// command vector so the failure can be acted on without re-running.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
    exit_code: Option<i32>,
    stderr: String,
    command: Vec<String>,
}

impl ProcessError {
    pub fn new(exit_code: Option<i32>, stderr: impl Into<String>, command: Vec<String>) -> Self {
        let stderr = stderr.into();
        let mut message = match exit_code {
            Some(code) => format!("CLI process failed with exit code {code}"),
            None => "CLI process terminated by signal".to_string(),
        };
        message.push_str(&format!(" (command: {})", command.join(" ")));
        if !stderr.is_empty() {
            message = format!("{message}\nError output: {stderr}");
        }

        Self {
            message,
            exit_code,
            stderr,
            command,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Raised when the CLI process outlives the configured timeout and had to
/// be killed.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct TimeoutError {
    message: String,
    duration: Duration,
    command: Vec<String>,
}

impl TimeoutError {
    pub fn new(duration: Duration, command: Vec<String>) -> Self {
        let message = format!(
            "CLI process timed out after {:.3}s (command: {})",
            duration.as_secs_f64(),
            command.join(" ")
        );
        Self {
            message,
            duration,
            command,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Raised when a caller-supplied option is invalid, before the process is
/// started.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
    parameter: String,
    value: String,
    reason: String,
}

impl ConfigError {
    pub fn new(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let parameter = parameter.into();
        let value = value.into();
        let reason = reason.into();
        let message = format!("Invalid option '{parameter}' (value: {value}): {reason}");
        Self {
            message,
            parameter,
            value,
            reason,
        }
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Raised when a stdout line cannot be decoded as JSON at all. Recoverable:
/// the stream layer logs it and continues with the next line.
#[derive(Debug, Error)]
#[error("Failed to decode line {line_number}: {snippet}")]
pub struct LineParseError {
    line: String,
    line_number: u64,
    #[source]
    source: serde_json::Error,
    snippet: String,
}

impl LineParseError {
    pub fn new(line: impl Into<String>, line_number: u64, source: serde_json::Error) -> Self {
        let line = line.into();
        let snippet = line.chars().take(100).collect::<String>();
        Self {
            line,
            line_number,
            source,
            snippet,
        }
    }

    /// The offending line, verbatim.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// 1-based position of the line in the stdout stream.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_preserves_message() {
        let err = ConnectionError::new("Failed to start CLI process");
        assert_eq!(err.message(), "Failed to start CLI process");
        assert_eq!(err.to_string(), "Failed to start CLI process");
    }

    #[test]
    fn cli_not_found_error_formats_path_when_available() {
        let err = CliNotFoundError::new("Claude CLI not found", Some(PathBuf::from("/tmp/claude")));
        assert!(err.message().contains("Claude CLI not found"));
        assert!(err.message().contains("/tmp/claude"));
    }

    #[test]
    fn process_error_includes_exit_code_stderr_and_command() {
        let err = ProcessError::new(
            Some(2),
            "command not found",
            vec!["claude".into(), "--print".into()],
        );
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.stderr(), "command not found");
        assert_eq!(err.command(), ["claude", "--print"]);
        let message = err.message();
        assert!(message.contains("exit code 2"));
        assert!(message.contains("claude --print"));
        assert!(message.contains("command not found"));
    }

    #[test]
    fn timeout_error_includes_duration_and_command() {
        let err = TimeoutError::new(Duration::from_millis(1500), vec!["claude".into()]);
        assert_eq!(err.duration(), Duration::from_millis(1500));
        assert!(err.to_string().contains("1.500s"));
        assert!(err.to_string().contains("claude"));
    }

    #[test]
    fn config_error_names_parameter_and_reason() {
        let err = ConfigError::new("cwd", "/no/such/dir", "working directory does not exist");
        assert_eq!(err.parameter(), "cwd");
        assert_eq!(err.value(), "/no/such/dir");
        assert!(err.to_string().contains("working directory does not exist"));
    }

    #[test]
    fn line_parse_error_exposes_line_and_number() {
        let source = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let err = LineParseError::new("{invalid json}", 7, source);
        assert_eq!(err.line(), "{invalid json}");
        assert_eq!(err.line_number(), 7);
        assert!(err.to_string().contains("line 7"));
    }
}
