//! One-shot query entry points and aggregation helpers.

use std::sync::Arc;

use futures::{pin_mut, Stream, StreamExt};

use crate::config::ClaudeCliOptions;
use crate::error::{ConfigError, SdkError};
use crate::internal::stream::message_stream;
use crate::message::{ContentBlock, Message};
use crate::transport::subprocess::{build_cli_args, find_cli, ProcessSpec, SubprocessTransport};
use crate::transport::Transport;

/// Convenience alias for trait-object transports.
pub type DynTransport = Arc<dyn Transport>;

/// Run one prompt through the CLI, yielding typed messages as the process
/// emits them. Messages arrive in stdout line order; the stream ends at
/// process exit or yields the invocation's single terminal failure.
///
/// `transport` overrides the subprocess transport, mainly for tests.
pub async fn query(
    prompt: impl Into<String>,
    options: Option<ClaudeCliOptions>,
    transport: Option<DynTransport>,
) -> Result<impl Stream<Item = Result<Message, SdkError>>, SdkError> {
    let prompt = prompt.into();
    let options = options.unwrap_or_default();
    validate_options(&options)?;

    let transport = match transport {
        Some(custom) => custom,
        None => {
            let cli_path = match &options.cli_path {
                Some(path) => path.clone(),
                None => find_cli()?,
            };
            let args = build_cli_args(&options);
            let spec = ProcessSpec::configure(&cli_path, args, &options, &prompt);
            Arc::new(SubprocessTransport::new(spec, &options)) as DynTransport
        }
    };

    transport.connect().await?;
    Ok(message_stream(transport))
}

/// Drain a message stream into an ordered list, propagating the terminal
/// failure if the invocation raised one.
pub async fn collect_all<S>(stream: S) -> Result<Vec<Message>, SdkError>
where
    S: Stream<Item = Result<Message, SdkError>>,
{
    pin_mut!(stream);
    let mut messages = Vec::new();
    while let Some(next) = stream.next().await {
        messages.push(next?);
    }
    Ok(messages)
}

/// First text block of the first assistant message, or `""` if none.
pub fn first_text(messages: &[Message]) -> String {
    for message in messages {
        if let Message::Assistant(assistant) = message {
            for block in &assistant.content {
                if let ContentBlock::Text(text) = block {
                    return text.text.clone();
                }
            }
        }
    }
    String::new()
}

/// Ask one question and return the first text answer.
pub async fn query_text(
    prompt: impl Into<String>,
    options: Option<ClaudeCliOptions>,
    transport: Option<DynTransport>,
) -> Result<String, SdkError> {
    let stream = query(prompt, options, transport).await?;
    let messages = collect_all(stream).await?;
    Ok(first_text(&messages))
}

// Preconditions checked before any process is started; the executor itself
// never raises configuration failures.
fn validate_options(options: &ClaudeCliOptions) -> Result<(), SdkError> {
    if let Some(cwd) = &options.cwd {
        if !cwd.is_dir() {
            return Err(ConfigError::new(
                "cwd",
                cwd.display().to_string(),
                "working directory does not exist",
            )
            .into());
        }
    }

    if let Some(timeout) = options.timeout {
        if timeout.is_zero() {
            return Err(ConfigError::new(
                "timeout",
                format!("{timeout:?}"),
                "timeout must be greater than zero",
            )
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AssistantMessage, TextBlock, ToolUseBlock, UserMessage};

    fn assistant(blocks: Vec<ContentBlock>) -> Message {
        Message::Assistant(AssistantMessage { content: blocks })
    }

    #[test]
    fn first_text_returns_empty_string_when_no_assistant_text() {
        assert_eq!(first_text(&[]), "");
        assert_eq!(
            first_text(&[Message::User(UserMessage {
                content: "hi".into()
            })]),
            ""
        );
        assert_eq!(
            first_text(&[assistant(vec![ContentBlock::ToolUse(ToolUseBlock {
                id: "t1".into(),
                name: "Bash".into(),
                input: serde_json::Map::new(),
            })])]),
            ""
        );
    }

    #[test]
    fn first_text_skips_to_the_first_text_block() {
        let messages = [
            Message::User(UserMessage {
                content: "question".into(),
            }),
            assistant(vec![
                ContentBlock::ToolUse(ToolUseBlock {
                    id: "t1".into(),
                    name: "Read".into(),
                    input: serde_json::Map::new(),
                }),
                ContentBlock::Text(TextBlock {
                    text: "answer".into(),
                }),
            ]),
            assistant(vec![ContentBlock::Text(TextBlock {
                text: "later".into(),
            })]),
        ];
        assert_eq!(first_text(&messages), "answer");
    }

    #[tokio::test]
    async fn missing_cwd_is_rejected_before_spawn() {
        let options = ClaudeCliOptions {
            cwd: Some("/definitely/not/a/real/dir".into()),
            ..Default::default()
        };

        let err = query("hi", Some(options), None)
            .await
            .err()
            .expect("expected configuration failure");
        match err {
            SdkError::Config(config) => {
                assert_eq!(config.parameter(), "cwd");
                assert!(config.reason().contains("does not exist"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected_before_spawn() {
        let options = ClaudeCliOptions {
            timeout: Some(std::time::Duration::ZERO),
            ..Default::default()
        };

        let err = query("hi", Some(options), None)
            .await
            .err()
            .expect("expected configuration failure");
        match err {
            SdkError::Config(config) => assert_eq!(config.parameter(), "timeout"),
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
