//! Streaming subprocess executor for the Claude Code CLI.
//!
//! Runs the CLI as a one-shot child process, parses its `stream-json`
//! stdout line by line into typed [`message::Message`] values, and yields
//! them as an async stream while stderr is captured concurrently. Optional
//! timeouts kill the child and surface a single terminal failure; dropping
//! the stream early cancels the invocation and reaps the process.
//!
//! ```no_run
//! use futures::StreamExt;
//!
//! # async fn run() -> Result<(), claude_exec::SdkError> {
//! let stream = claude_exec::query("What is 2+2?", None, None).await?;
//! futures::pin_mut!(stream);
//! while let Some(message) = stream.next().await {
//!     println!("{:?}", message?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod internal;
pub mod message;
pub mod query;
pub mod transport;

pub use config::{ClaudeCliOptions, EnvMode, PermissionMode};
pub use error::SdkError;
pub use message::{ContentBlock, Message};
pub use query::{collect_all, first_text, query, query_text, DynTransport};
