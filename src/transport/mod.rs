//! Transport abstraction over the CLI's line-oriented output.

/// One-shot channel of raw stdout lines from the CLI.
///
/// The prompt travels as a command-line argument, so the trait has no write
/// side; implementations close the child's stdin at spawn time.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start the underlying process or source.
    async fn connect(&self) -> Result<(), crate::error::SdkError>;

    /// Next raw stdout line, or `None` once the source is exhausted and the
    /// invocation completed cleanly. A terminal failure (process, timeout)
    /// is returned exactly once in place of end-of-stream.
    async fn next_line(&self) -> Result<Option<String>, crate::error::SdkError>;

    /// Stop the invocation and release its resources. Idempotent.
    async fn close(&self) -> Result<(), crate::error::SdkError>;

    /// Whether the transport is ready to produce lines.
    fn is_ready(&self) -> bool;
}

pub mod subprocess;
