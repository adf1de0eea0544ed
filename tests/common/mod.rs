use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use claude_exec::error::SdkError;
use claude_exec::transport::Transport;

#[derive(Default)]
struct MockTransportState {
    lines: VecDeque<Result<Option<String>, SdkError>>,
    connect_calls: usize,
    close_calls: usize,
}

/// Transport stub yielding a scripted sequence of stdout lines, so tests
/// can drive the parser/stream pipeline without a child process.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockTransportState>,
    ready: AtomicBool,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn with_lines<T>(lines: T) -> Arc<Self>
    where
        T: IntoIterator<Item = Result<Option<String>, SdkError>>,
    {
        let state = MockTransportState {
            lines: lines.into_iter().collect(),
            ..Default::default()
        };
        Arc::new(Self {
            state: Mutex::new(state),
            ready: AtomicBool::new(true),
        })
    }

    /// Convenience wrapper for plain text lines ending in a clean EOF.
    pub fn with_output(lines: &[&str]) -> Arc<Self> {
        Self::with_lines(
            lines
                .iter()
                .map(|line| Ok(Some(line.to_string())))
                .chain(std::iter::once(Ok(None)))
                .collect::<Vec<_>>(),
        )
    }

    pub async fn connect_calls(&self) -> usize {
        self.state.lock().await.connect_calls
    }

    pub async fn close_calls(&self) -> usize {
        self.state.lock().await.close_calls
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), SdkError> {
        let mut state = self.state.lock().await;
        state.connect_calls += 1;
        Ok(())
    }

    async fn next_line(&self) -> Result<Option<String>, SdkError> {
        let mut state = self.state.lock().await;
        if let Some(next) = state.lines.pop_front() {
            next
        } else {
            Ok(None)
        }
    }

    async fn close(&self) -> Result<(), SdkError> {
        let mut state = self.state.lock().await;
        state.close_calls += 1;
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
