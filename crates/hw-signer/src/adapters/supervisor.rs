//! # Helper Process Supervisor
//!
//! Owns one helper process, its stdin/stdout pipes and a buffer capturing
//! its stderr. Two background tasks run for the lifetime of the process:
//!
//! - **reader**: decodes response frames from stdout and merges them into
//!   the shared [`HelperState`]. Fires `ready` on the first frame, and on
//!   every exit path so nobody waits forever.
//! - **exit monitor**: drains stderr into the diagnostic buffer, waits for
//!   the process, records the exit status and fires `exited`.
//!
//! The foreground only learns about the background through the one-shot
//! events, the state channel and the first-recorded failure.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event::OneShotEvent;
use super::protocol;
use crate::domain::entities::HelperState;
use crate::domain::errors::SignerError;

/// Only the tail of a chatty helper's stderr is kept.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// State shared between the foreground and the two background tasks.
struct Shared {
    state: watch::Sender<HelperState>,
    ready: OneShotEvent,
    exited: OneShotEvent,
    closing: OneShotEvent,
    failure: OnceLock<SignerError>,
    exit_status: OnceLock<ExitStatus>,
    diagnostics: Mutex<Vec<u8>>,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(HelperState::default());
        Self {
            state,
            ready: OneShotEvent::new(),
            exited: OneShotEvent::new(),
            closing: OneShotEvent::new(),
            failure: OnceLock::new(),
            exit_status: OnceLock::new(),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Keep the first failure; later ones are consequences of it.
    fn record_failure(&self, failure: SignerError) {
        if self.failure.set(failure.clone()).is_err() {
            debug!(error = %failure, "Helper failure already recorded, ignoring");
        }
    }

    fn append_diagnostics(&self, chunk: &[u8]) {
        let mut buffer = self.diagnostics.lock();
        buffer.extend_from_slice(chunk);
        if buffer.len() > MAX_DIAGNOSTIC_BYTES {
            let excess = buffer.len() - MAX_DIAGNOSTIC_BYTES;
            buffer.drain(..excess);
        }
    }

    fn diagnostics(&self) -> String {
        String::from_utf8_lossy(&self.diagnostics.lock())
            .trim()
            .to_string()
    }
}

/// A running helper process.
pub struct HelperProcess {
    program: String,
    pid: Option<u32>,
    shared: Arc<Shared>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl HelperProcess {
    /// Spawn `program` with no arguments and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(program: &Path) -> Result<Self, SignerError> {
        let program_name = program.display().to_string();

        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SignerError::HelperSpawn {
                program: program_name.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(SignerError::HelperSpawn {
                    program: program_name,
                    reason: "helper pipes were not captured".to_string(),
                })
            }
        };
        let stderr = child.stderr.take();

        info!(program = %program_name, pid = ?pid, "Spawned signing helper");

        let shared = Arc::new(Shared::new());
        let reader = tokio::spawn(read_frames(stdout, Arc::clone(&shared)));
        let monitor = tokio::spawn(monitor_exit(child, stderr, Arc::clone(&shared)));

        Ok(Self {
            program: program_name,
            pid,
            shared,
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            reader: Mutex::new(Some(reader)),
            monitor: Mutex::new(Some(monitor)),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write one encoded frame to the helper's stdin.
    ///
    /// A helper that stops reading can leave the write blocked on a full
    /// pipe; `close` abandons it with [`SignerError::Closed`] and releases
    /// the stdin lock.
    pub async fn send(&self, frame: &[u8]) -> Result<(), SignerError> {
        let write = async {
            let mut stdin = self.stdin.lock().await;
            let pipe = stdin.as_mut().ok_or(SignerError::PipeClosed)?;

            let written = match pipe.write_all(frame).await {
                Ok(()) => pipe.flush().await,
                Err(err) => Err(err),
            };

            written.map_err(|err| {
                let failure = SignerError::helper_io(&err);
                warn!(pid = ?self.pid, error = %err, "Failed to write to signing helper");
                self.shared.record_failure(failure.clone());
                self.shared.failure.get().cloned().unwrap_or(failure)
            })
        };

        tokio::select! {
            biased;
            _ = self.shared.closing.wait() => {
                debug!(pid = ?self.pid, bytes = frame.len(), "Abandoned helper write on close");
                Err(SignerError::Closed)
            }
            written = write => written,
        }
    }

    /// Wait until the first frame arrives (or the reader gives up, or close).
    pub async fn wait_ready(&self) {
        self.shared.ready.wait().await;
    }

    /// Wait until a frame newer than `baseline` has been applied or the
    /// reader has stopped, and return the state at that point.
    pub async fn wait_for_frame_after(&self, baseline: u64) -> HelperState {
        let mut rx = self.shared.state.subscribe();
        let observed = rx
            .wait_for(|state| state.frames > baseline || state.reader_finished)
            .await
            .map(|state| state.clone());

        // The sender is owned by `shared`, so the channel never closes first.
        observed.unwrap_or_else(|_| self.snapshot())
    }

    /// Wait for the process to exit, or for close, whichever comes first.
    pub async fn wait_exit_or_close(&self) {
        tokio::select! {
            _ = self.shared.exited.wait() => {}
            _ = self.shared.closing.wait() => {}
        }
    }

    pub fn snapshot(&self) -> HelperState {
        self.shared.state.borrow().clone()
    }

    /// The first fatal error observed, if any.
    pub fn failure(&self) -> Option<SignerError> {
        self.shared.failure.get().cloned()
    }

    pub fn record_failure(&self, failure: SignerError) {
        self.shared.record_failure(failure);
    }

    pub fn is_closing(&self) -> bool {
        self.shared.closing.is_fired()
    }

    pub fn has_exited(&self) -> bool {
        self.shared.exited.is_fired()
    }

    /// Exit status, recorded once by the exit monitor.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.shared.exit_status.get().copied()
    }

    /// Everything the helper has written to stderr so far (tail only).
    pub fn diagnostics(&self) -> String {
        self.shared.diagnostics()
    }

    /// Close both pipes and stop the reader.
    ///
    /// Idempotent. Already-closed pipes are not an error. Fires `ready` so
    /// no caller can block past this point.
    pub async fn close(&self) {
        if self.shared.closing.fire() {
            debug!(pid = ?self.pid, "Closing signing helper pipes");
        }

        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Err(err) = stdin.shutdown().await {
                debug!(pid = ?self.pid, error = %err, "Helper stdin already closed");
            }
        }

        // The reader drops stdout when it sees `closing`.
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(err) = reader.await {
                warn!(pid = ?self.pid, error = %err, "Helper reader task did not finish cleanly");
            }
        }

        self.shared.ready.fire();
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        self.shared.closing.fire();
        self.shared.ready.fire();
        // Dropping the child inside the monitor kills the process.
        if let Some(monitor) = self.monitor.lock().take() {
            if !monitor.is_finished() {
                monitor.abort();
            }
        }
    }
}

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

async fn read_frames(stdout: ChildStdout, shared: Arc<Shared>) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let next = tokio::select! {
            biased;
            _ = shared.closing.wait() => {
                debug!("Helper reader stopping on close");
                break;
            }
            line = lines.next_line() => line,
        };

        match next {
            Ok(Some(line)) => match protocol::decode_response(&line) {
                Ok(frame) => {
                    debug!(
                        key_data = frame.key_data.is_some(),
                        public_key = frame.public_key.is_some(),
                        signature = frame.signature.is_some(),
                        "Received helper frame"
                    );
                    shared.state.send_modify(|state| state.apply(frame));
                    shared.ready.fire();
                }
                Err(err) => {
                    warn!(error = %err, bytes = line.len(), "Malformed helper frame");
                    shared.record_failure(SignerError::Protocol(err));
                    break;
                }
            },
            Ok(None) => {
                debug!("Helper output reached end of stream");
                break;
            }
            Err(err) => {
                warn!(error = %err, "Failed to read helper output");
                shared.record_failure(SignerError::helper_io(&err));
                break;
            }
        }
    }

    shared.state.send_modify(|state| state.reader_finished = true);
    shared.ready.fire();
}

async fn monitor_exit(mut child: Child, stderr: Option<ChildStderr>, shared: Arc<Shared>) {
    let capture = async {
        let Some(mut stderr) = stderr else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => shared.append_diagnostics(&chunk[..n]),
                Err(err) => {
                    debug!(error = %err, "Stopped capturing helper stderr");
                    break;
                }
            }
        }
    };

    let (status, ()) = tokio::join!(child.wait(), capture);

    match status {
        Ok(status) => {
            let _ = shared.exit_status.set(status);
            if status.success() {
                info!(%status, "Signing helper exited");
            } else {
                let diagnostics = shared.diagnostics();
                error!(%status, diagnostics = %diagnostics, "Signing helper exited unsuccessfully");
                shared.record_failure(SignerError::HelperExited {
                    status: status.to_string(),
                    diagnostics,
                });
            }
        }
        Err(err) => {
            error!(error = %err, "Failed to wait for signing helper");
            shared.record_failure(SignerError::helper_io(&err));
        }
    }

    shared.exited.fire();
    shared.ready.fire();
}
