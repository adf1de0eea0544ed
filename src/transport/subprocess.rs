//! Subprocess transport: runs the Claude CLI and streams its stdout lines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

#[cfg(unix)]
use users::get_user_by_name;

use crate::config::{ClaudeCliOptions, EnvMode, StderrCallback};
use crate::error::{CliNotFoundError, ConnectionError, ProcessError, SdkError, TimeoutError};
use crate::transport::Transport;

const DEFAULT_MAX_LINE_SIZE: usize = 1024 * 1024;
const LINE_CHANNEL_CAPACITY: usize = 64;
const REAP_GRACE: Duration = Duration::from_millis(500);
const CLOSE_GRACE: Duration = Duration::from_secs(2);
// Exit status a well-behaved CLI reports when its stdout pipe closes early.
const SIGPIPE_EXIT_CODE: i32 = 141;

/// Lifecycle of one invocation. Exactly one terminal state is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    Running,
    CompletedSuccess,
    CompletedFailure,
    TimedOut,
    Cancelled,
}

/// Fully resolved description of one CLI invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Ordered argument vector: `[cli_path] ++ flags ++ [prompt]`.
    pub command: Vec<String>,
    /// Working directory, set only when supplied by the caller.
    pub cwd: Option<PathBuf>,
    /// Resolved child environment: the seed per [`EnvMode`] with caller
    /// overrides applied last.
    pub env: HashMap<String, String>,
    /// Unix account to run the CLI as.
    pub user: Option<String>,
}

impl ProcessSpec {
    /// Build the invocation spec from a discovered CLI path, the flag
    /// vector, and caller options. The prompt becomes the final argument.
    pub fn configure(
        cli_path: &Path,
        args: Vec<String>,
        options: &ClaudeCliOptions,
        prompt: &str,
    ) -> Self {
        let mut command = Vec::with_capacity(args.len() + 2);
        command.push(cli_path.display().to_string());
        command.extend(args);
        command.push(prompt.to_string());

        let mut env: HashMap<String, String> = match options.env_mode {
            EnvMode::Inherit => std::env::vars().collect(),
            EnvMode::Isolate => HashMap::new(),
        };
        // Caller overrides are applied last and always win.
        env.extend(options.env.clone());

        Self {
            command,
            cwd: options.cwd.clone(),
            env,
            user: options.user.clone(),
        }
    }
}

/// Map caller options to the CLI flag vector requesting streaming JSON
/// output. The prompt itself is appended by [`ProcessSpec::configure`].
pub fn build_cli_args(options: &ClaudeCliOptions) -> Vec<String> {
    let mut args = vec![
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];

    if let Some(system_prompt) = &options.system_prompt {
        args.push("--system-prompt".to_string());
        args.push(system_prompt.clone());
    }

    if !options.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(options.allowed_tools.join(","));
    }

    if !options.disallowed_tools.is_empty() {
        args.push("--disallowedTools".to_string());
        args.push(options.disallowed_tools.join(","));
    }

    if let Some(max_turns) = options.max_turns {
        args.push("--max-turns".to_string());
        args.push(max_turns.to_string());
    }

    if let Some(model) = &options.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    if let Some(mode) = &options.permission_mode {
        args.push("--permission-mode".to_string());
        args.push(mode.as_str().to_string());
    }

    if options.continue_conversation {
        args.push("--continue".to_string());
    }

    if let Some(resume) = &options.resume {
        args.push("--resume".to_string());
        args.push(resume.clone());
    }

    if let Some(settings) = &options.settings {
        args.push("--settings".to_string());
        args.push(settings.clone());
    }

    for directory in &options.add_dirs {
        args.push("--add-dir".to_string());
        args.push(directory.display().to_string());
    }

    for (flag, value) in &options.extra_args {
        args.push(format!("--{flag}"));
        if let Some(value) = value {
            args.push(value.clone());
        }
    }

    args.push("--print".to_string());
    args.push("--".to_string());
    args
}

/// Locate the Claude CLI binary on the search path or in the usual install
/// locations.
pub fn find_cli() -> Result<PathBuf, SdkError> {
    if let Ok(path) = which::which("claude") {
        return Ok(path);
    }

    let mut locations: Vec<PathBuf> = Vec::new();
    if let Some(home_dir) = dirs::home_dir() {
        locations.push(home_dir.join(".npm-global/bin/claude"));
        locations.push(home_dir.join(".local/bin/claude"));
        locations.push(home_dir.join("node_modules/.bin/claude"));
        locations.push(home_dir.join(".yarn/bin/claude"));
        locations.push(home_dir.join(".claude/local/claude"));
    }
    locations.push(PathBuf::from("/usr/local/bin/claude"));

    for path in locations {
        if path.exists() && path.is_file() {
            return Ok(path);
        }
    }

    Err(SdkError::from(CliNotFoundError::new(
        "Claude Code not found. Install with:\n  npm install -g @anthropic-ai/claude-code\n\nOr provide the path via ClaudeCliOptions { cli_path, .. }",
        None,
    )))
}

/// Transport backed by one CLI child process.
///
/// Three tasks live for the invocation: a stdout reader feeding a bounded
/// channel (a slow consumer pauses reading instead of growing a buffer), a
/// stderr accumulator, and an exit watcher that owns the child and races
/// process exit against the optional timeout and consumer cancellation.
#[derive(Debug, Clone)]
pub struct SubprocessTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    spec: ProcessSpec,
    timeout: Option<Duration>,
    max_line_size: usize,
    stderr_callback: Option<DebugCallback>,
    ready: AtomicBool,
    cancel: Arc<Notify>,
    state_tx: Mutex<Option<watch::Sender<InvocationState>>>,
    state_rx: watch::Receiver<InvocationState>,
    exit_error: Arc<Mutex<Option<SdkError>>>,
    line_rx: Mutex<Option<mpsc::Receiver<String>>>,
    tasks: Mutex<Option<TaskHandles>>,
}

// StderrCallback is a bare Fn; wrap it so Inner can stay Debug.
#[derive(Clone)]
struct DebugCallback(StderrCallback);

impl std::fmt::Debug for DebugCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StderrCallback")
    }
}

#[derive(Debug)]
struct TaskHandles {
    stdout_task: JoinHandle<()>,
    watcher_task: JoinHandle<()>,
}

impl SubprocessTransport {
    /// Create a transport for the given spec. Nothing is spawned until
    /// [`Transport::connect`] is called.
    pub fn new(spec: ProcessSpec, options: &ClaudeCliOptions) -> Self {
        let (state_tx, state_rx) = watch::channel(InvocationState::NotStarted);
        Self {
            inner: Arc::new(Inner {
                spec,
                timeout: options.timeout,
                max_line_size: options.max_buffer_size.unwrap_or(DEFAULT_MAX_LINE_SIZE),
                stderr_callback: options.stderr.clone().map(DebugCallback),
                ready: AtomicBool::new(false),
                cancel: Arc::new(Notify::new()),
                state_tx: Mutex::new(Some(state_tx)),
                state_rx,
                exit_error: Arc::new(Mutex::new(None)),
                line_rx: Mutex::new(None),
                tasks: Mutex::new(None),
            }),
        }
    }

    /// Current lifecycle state of the invocation.
    pub fn state(&self) -> InvocationState {
        *self.inner.state_rx.borrow()
    }

    /// The resolved command vector, for diagnostics and tests.
    pub fn command(&self) -> &[String] {
        &self.inner.spec.command
    }
}

#[async_trait::async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&self) -> Result<(), SdkError> {
        {
            let tasks = self.inner.tasks.lock().await;
            if tasks.is_some() {
                return Ok(());
            }
        }

        let state_tx = {
            let mut guard = self.inner.state_tx.lock().await;
            guard
                .take()
                .ok_or_else(|| ConnectionError::new("Transport cannot be reconnected"))?
        };

        let (program, args) = self
            .inner
            .spec
            .command
            .split_first()
            .ok_or_else(|| ConnectionError::new("Empty command vector"))?;

        log::debug!("[transport::connect] spawning {program}");

        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = &self.inner.spec.cwd {
            command.current_dir(cwd);
        }
        command.env_clear();
        command.envs(&self.inner.spec.env);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(unix)]
        if let Some(user) = &self.inner.spec.user {
            if let Some(info) = get_user_by_name(user) {
                command.uid(info.uid());
                command.gid(info.primary_group_id());
            }
        }

        let mut child = command
            .spawn()
            .map_err(|err| ConnectionError::new(format!("Failed to start CLI process: {err}")))?;

        // The prompt travels as an argument; the CLI gets no stdin.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectionError::new("Missing stdout handle from CLI process"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConnectionError::new("Missing stderr handle from CLI process"))?;

        let stderr_buffer = Arc::new(Mutex::new(String::new()));
        let stderr_task = spawn_stderr_task(
            stderr,
            Arc::clone(&stderr_buffer),
            self.inner.stderr_callback.clone().map(|cb| cb.0),
        );

        let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let stdout_task = spawn_stdout_task(
            stdout,
            line_tx,
            self.inner.max_line_size,
            Arc::clone(&self.inner.cancel),
        );

        let _ = state_tx.send(InvocationState::Running);
        let watcher_task = spawn_exit_watcher(ExitWatch {
            child,
            stderr_task,
            stderr_buffer,
            command: self.inner.spec.command.clone(),
            timeout: self.inner.timeout,
            cancel: Arc::clone(&self.inner.cancel),
            state: state_tx,
            exit_error: Arc::clone(&self.inner.exit_error),
        });

        {
            let mut rx_guard = self.inner.line_rx.lock().await;
            *rx_guard = Some(line_rx);
        }
        {
            let mut tasks = self.inner.tasks.lock().await;
            *tasks = Some(TaskHandles {
                stdout_task,
                watcher_task,
            });
        }

        self.inner.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn next_line(&self) -> Result<Option<String>, SdkError> {
        {
            let mut rx_guard = self.inner.line_rx.lock().await;
            let rx = rx_guard
                .as_mut()
                .ok_or_else(|| ConnectionError::new("Not connected"))?;

            if let Some(line) = rx.recv().await {
                return Ok(Some(line));
            }
        }

        // Channel closed: stdout hit EOF. Wait for the watcher's terminal
        // classification before reporting end-of-stream.
        let mut state_rx = self.inner.state_rx.clone();
        loop {
            let current = *state_rx.borrow_and_update();
            if current != InvocationState::Running {
                break;
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }

        let mut exit_error = self.inner.exit_error.lock().await;
        match exit_error.take() {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), SdkError> {
        self.inner.ready.store(false, Ordering::SeqCst);

        let tasks = {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.take()
        };

        if let Some(TaskHandles {
            mut stdout_task,
            mut watcher_task,
        }) = tasks
        {
            self.inner.cancel.notify_one();
            if timeout(CLOSE_GRACE, &mut watcher_task).await.is_err() {
                // kill_on_drop reaps the child if the watcher is wedged.
                watcher_task.abort();
            }

            {
                let mut rx_guard = self.inner.line_rx.lock().await;
                *rx_guard = None;
            }

            if timeout(REAP_GRACE, &mut stdout_task).await.is_err() {
                stdout_task.abort();
            }
        }

        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // The watcher holds its own Notify handle; a dropped invocation is
        // killed and reaped even if close was never called.
        self.cancel.notify_one();
    }
}

fn spawn_stdout_task(
    stdout: ChildStdout,
    sender: mpsc::Sender<String>,
    max_line_size: usize,
    cancel: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if line.len() > max_line_size {
                        log::warn!(
                            "[transport::stdout] skipping {}-byte line over the {} byte limit",
                            line.len(),
                            max_line_size
                        );
                        continue;
                    }
                    let text = line.trim_end_matches(['\n', '\r']).to_string();
                    if sender.send(text).await.is_err() {
                        // Consumer stopped pulling; ask the watcher to kill
                        // the child so the blocked reads unblock.
                        log::debug!("[transport::stdout] consumer gone, requesting cancellation");
                        cancel.notify_one();
                        return;
                    }
                }
                Err(err) => {
                    log::warn!("[transport::stdout] read error: {err}");
                    break;
                }
            }
        }
        // Dropping the sender here closes the line channel at EOF.
    })
}

fn spawn_stderr_task(
    stderr: ChildStderr,
    buffer: Arc<Mutex<String>>,
    callback: Option<StderrCallback>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        while reader
            .read_line(&mut line)
            .await
            .ok()
            .filter(|len| *len > 0)
            .is_some()
        {
            let text = line.trim_end().to_string();
            line.clear();
            if text.is_empty() {
                continue;
            }
            if let Some(callback) = callback.as_ref() {
                callback(&text);
            }
            let mut buffer = buffer.lock().await;
            buffer.push_str(&text);
            buffer.push('\n');
        }
    })
}

struct ExitWatch {
    child: Child,
    stderr_task: JoinHandle<()>,
    stderr_buffer: Arc<Mutex<String>>,
    command: Vec<String>,
    timeout: Option<Duration>,
    cancel: Arc<Notify>,
    state: watch::Sender<InvocationState>,
    exit_error: Arc<Mutex<Option<SdkError>>>,
}

enum ExitCause {
    Natural(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

fn spawn_exit_watcher(watch: ExitWatch) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ExitWatch {
            mut child,
            stderr_task,
            stderr_buffer,
            command,
            timeout: deadline,
            cancel,
            state,
            exit_error,
        } = watch;

        let cause = tokio::select! {
            status = child.wait() => ExitCause::Natural(status),
            _ = expire(deadline) => ExitCause::TimedOut,
            _ = cancel.notified() => ExitCause::Cancelled,
        };

        let (terminal, failure) = match cause {
            ExitCause::Natural(Ok(status)) => match status.code() {
                Some(0) => {
                    log::debug!("[transport::watch] CLI exited cleanly");
                    (InvocationState::CompletedSuccess, None)
                }
                Some(SIGPIPE_EXIT_CODE) => {
                    // Downstream stopped reading; benign early termination.
                    log::debug!("[transport::watch] CLI exited with SIGPIPE status");
                    (InvocationState::CompletedSuccess, None)
                }
                code => {
                    let stderr = drain_stderr(stderr_task, &stderr_buffer).await;
                    (
                        InvocationState::CompletedFailure,
                        Some(SdkError::from(ProcessError::new(code, stderr, command))),
                    )
                }
            },
            ExitCause::Natural(Err(err)) => {
                let _ = drain_stderr(stderr_task, &stderr_buffer).await;
                (
                    InvocationState::CompletedFailure,
                    Some(SdkError::from(ConnectionError::new(format!(
                        "Failed to wait for CLI process: {err}"
                    )))),
                )
            }
            ExitCause::TimedOut => {
                log::debug!("[transport::watch] timeout expired, killing CLI process");
                reap(&mut child).await;
                let _ = drain_stderr(stderr_task, &stderr_buffer).await;
                (
                    InvocationState::TimedOut,
                    Some(SdkError::from(TimeoutError::new(
                        deadline.unwrap_or_default(),
                        command,
                    ))),
                )
            }
            ExitCause::Cancelled => {
                log::debug!("[transport::watch] cancelled, killing CLI process");
                reap(&mut child).await;
                let _ = drain_stderr(stderr_task, &stderr_buffer).await;
                (InvocationState::Cancelled, None)
            }
        };

        if let Some(err) = failure {
            *exit_error.lock().await = Some(err);
        }
        let _ = state.send(terminal);
    })
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn reap(child: &mut Child) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    let _ = child.start_kill();
    let _ = timeout(REAP_GRACE, child.wait()).await;
}

async fn drain_stderr(mut task: JoinHandle<()>, buffer: &Mutex<String>) -> String {
    if timeout(REAP_GRACE, &mut task).await.is_err() {
        task.abort();
    }
    buffer.lock().await.trim_end().to_string()
}
