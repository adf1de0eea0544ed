//! Turn a transport's raw lines into a stream of typed messages.

use std::sync::Arc;

use futures::{stream, Stream};

use crate::error::SdkError;
use crate::internal::line_parser::parse_line;
use crate::message::Message;
use crate::transport::Transport;

struct StreamState {
    transport: Arc<dyn Transport>,
    line_number: u64,
    finished: bool,
}

/// Yield typed messages in stdout line order until the transport ends.
///
/// A line that fails to decode is logged and skipped; lines the message
/// model does not cover are dropped without a trace. A terminal transport
/// failure is surfaced exactly once, after which the stream is exhausted.
pub fn message_stream(
    transport: Arc<dyn Transport>,
) -> impl Stream<Item = Result<Message, SdkError>> {
    let state = StreamState {
        transport,
        line_number: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            match state.transport.next_line().await {
                Ok(Some(line)) => {
                    state.line_number += 1;
                    match parse_line(&line, state.line_number) {
                        Ok(Some(message)) => return Some((Ok(message), state)),
                        Ok(None) => continue,
                        Err(err) => {
                            log::warn!("[stream] skipping undecodable line: {err}");
                            continue;
                        }
                    }
                }
                Ok(None) => {
                    let _ = state.transport.close().await;
                    return None;
                }
                Err(err) => {
                    let _ = state.transport.close().await;
                    state.finished = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
}
