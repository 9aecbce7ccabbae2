//! Event stream session against the niri IPC socket
//!
//! A session owns one socket connection:
//!
//! 1. Connect to `$NIRI_SOCKET`
//! 2. Send `Request::EventStream` as JSON + newline
//! 3. Read chunks, split them into lines with `LineBuffer`
//! 4. Feed each line to `SessionState`, notifying on layout switches
//!
//! Every line, including any notification it triggers, is fully handled
//! before the next read is issued. The session ends cleanly when niri
//! closes the stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::line_buffer::LineBuffer;
use super::state::{Outcome, Phase, SessionState};
use super::WatchError;
use crate::notify::Notifier;

/// Initial delay between retry attempts (100ms)
const INITIAL_RETRY_DELAY_MS: u64 = 100;

/// Maximum delay between retry attempts (1 second)
const MAX_RETRY_DELAY_MS: u64 = 1000;

/// Environment variable name for the niri socket path
const NIRI_SOCKET_ENV: &str = "NIRI_SOCKET";

/// Bytes requested from the socket per read
const READ_CHUNK_SIZE: usize = 4096;

/// Discover the niri IPC socket path from the environment
///
/// # Errors
///
/// Returns `WatchError::SocketNotSet` if `$NIRI_SOCKET` is not set.
/// Returns `WatchError::SocketNotFound` if the path doesn't exist.
pub fn get_socket_path() -> Result<PathBuf, WatchError> {
    let socket_path_str = std::env::var(NIRI_SOCKET_ENV).map_err(|_| WatchError::SocketNotSet)?;

    let socket_path = PathBuf::from(&socket_path_str);

    if !socket_path.exists() {
        return Err(WatchError::SocketNotFound { path: socket_path });
    }

    Ok(socket_path)
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Complete lines received
    pub lines: u64,
    /// Notifications delivered successfully
    pub notifications: u64,
    /// Notifications that could not be delivered
    pub failed_notifications: u64,
    /// `{"Err":...}` replies received from niri
    pub compositor_errors: u64,
    /// Phase the state machine had reached when the stream closed
    pub phase: Phase,
}

/// A subscribed niri event stream
#[derive(Debug)]
pub struct EventStream {
    socket: UnixStream,
    socket_path: PathBuf,
}

impl EventStream {
    /// Connect to `$NIRI_SOCKET` and subscribe to events
    ///
    /// # Errors
    ///
    /// Returns `WatchError::SocketNotSet` if `$NIRI_SOCKET` is not set.
    /// Returns `WatchError::SocketNotFound` if the socket path doesn't exist.
    /// Returns `WatchError::ConnectionFailed` if the connection fails.
    /// Returns `WatchError::SendFailed` if the subscription cannot be written.
    pub async fn connect() -> Result<Self, WatchError> {
        let socket_path = get_socket_path()?;
        Self::connect_to(&socket_path).await
    }

    /// Connect to the socket at `socket_path` and subscribe to events
    ///
    /// The acknowledgement is not awaited here; it is the first message the
    /// session state machine consumes.
    pub async fn connect_to(socket_path: &Path) -> Result<Self, WatchError> {
        let mut socket =
            UnixStream::connect(socket_path)
                .await
                .map_err(|e| WatchError::ConnectionFailed {
                    path: socket_path.to_path_buf(),
                    source: e,
                })?;

        let request_json = serde_json::to_string(&niri_ipc::Request::EventStream)
            .map_err(WatchError::SerializeFailed)?;

        socket
            .write_all(request_json.as_bytes())
            .await
            .map_err(WatchError::SendFailed)?;
        socket
            .write_all(b"\n")
            .await
            .map_err(WatchError::SendFailed)?;
        socket.flush().await.map_err(WatchError::SendFailed)?;

        debug!(path = %socket_path.display(), "Subscribed to niri event stream");

        Ok(Self {
            socket,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Connect with retry logic and exponential backoff
    ///
    /// `max_retries` is the number of extra attempts after the first one;
    /// `0` tries exactly once. A missing `$NIRI_SOCKET` is never retried.
    ///
    /// # Backoff Strategy
    ///
    /// - Initial delay: 100ms
    /// - Each retry: delay *= 2
    /// - Maximum delay: 1 second (capped)
    ///
    /// # Errors
    ///
    /// Returns the connection error itself when `max_retries` is `0`, and
    /// `WatchError::MaxRetriesExceeded` once all retries are used up.
    pub async fn connect_with_retry(max_retries: u32) -> Result<Self, WatchError> {
        let mut attempt = 0;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        loop {
            attempt += 1;

            let e = match Self::connect().await {
                Ok(stream) => {
                    if attempt > 1 {
                        info!("Connected to niri after {} attempt(s)", attempt);
                    }
                    return Ok(stream);
                }
                Err(e) => e,
            };

            if matches!(e, WatchError::SocketNotSet) || max_retries == 0 {
                return Err(e);
            }

            if attempt > max_retries {
                warn!(
                    attempts = attempt,
                    last_error = %e,
                    "Failed to connect to niri after all retry attempts"
                );
                return Err(WatchError::MaxRetriesExceeded { attempts: attempt });
            }

            warn!(
                attempt = attempt,
                max_retries = max_retries,
                delay_ms = delay_ms,
                error = %e,
                "Niri IPC connection failed, retrying..."
            );

            sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Process the event stream until niri closes it
    ///
    /// # Errors
    ///
    /// Returns `WatchError::ReceiveFailed` if a read fails and
    /// `WatchError::BufferAllocation` if a line cannot be buffered.
    /// Malformed lines and notification failures are logged and skipped.
    pub async fn run<N: Notifier>(mut self, notifier: &mut N) -> Result<SessionSummary, WatchError> {
        let mut state = SessionState::new();
        let mut buffer = LineBuffer::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut summary = SessionSummary::default();

        loop {
            let n = self
                .socket
                .read(&mut chunk)
                .await
                .map_err(WatchError::ReceiveFailed)?;

            if n == 0 {
                break;
            }

            for line in buffer.push(&chunk[..n])? {
                summary.lines += 1;

                let layout = match state.handle_line(&line) {
                    Outcome::Switched { layout } => layout,
                    Outcome::SnapshotApplied { layouts } => {
                        if state.layouts().is_empty() {
                            warn!("niri reported no keyboard layouts, switches will be ignored");
                        } else {
                            info!(
                                layouts,
                                current = ?state.layouts().current(),
                                "Keyboard layouts loaded"
                            );
                        }
                        continue;
                    }
                    Outcome::CompositorError(reason) => {
                        summary.compositor_errors += 1;
                        error!(phase = ?state.phase(), "niri returned error: {}", reason);
                        continue;
                    }
                    Outcome::Acknowledged | Outcome::Ignored | Outcome::Malformed => continue,
                };

                info!(layout = %layout, "Keyboard layout changed");
                match notifier.notify(&layout).await {
                    Ok(()) => summary.notifications += 1,
                    Err(e) => {
                        summary.failed_notifications += 1;
                        warn!(error = %e, layout = %layout, "Failed to deliver notification");
                    }
                }
            }
        }

        if !buffer.pending().is_empty() {
            debug!(
                bytes = buffer.pending().len(),
                "Discarding incomplete line at end of stream"
            );
        }
        debug!(capacity = buffer.capacity(), "Line buffer released");

        summary.phase = state.phase();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use std::env;
    use std::sync::Mutex;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixListener;

    // Environment variables are process-global, so tests touching NIRI_SOCKET
    // must not run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const SNAPSHOT: &str = r#"{"KeyboardLayoutsChanged":{"keyboard_layouts":{"current_idx":1,"names":["us","de","fr"]}}}"#;

    /// Records every layout it is asked to announce
    #[derive(Debug, Default)]
    struct RecordingNotifier {
        layouts: Vec<String>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&mut self, layout: &str) -> Result<(), NotifyError> {
            self.layouts.push(layout.to_string());
            if self.fail {
                return Err(NotifyError::CallFailed(zbus::Error::Failure(
                    "no notification daemon".to_string(),
                )));
            }
            Ok(())
        }
    }

    /// Serve `chunks` to the first client, then close the connection
    ///
    /// Returns the request line the client sent.
    fn spawn_fake_niri(
        listener: UnixListener,
        chunks: Vec<Vec<u8>>,
    ) -> tokio::task::JoinHandle<String> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept failed");
            let (read_half, mut write_half) = stream.into_split();

            let mut request = String::new();
            tokio::io::BufReader::new(read_half)
                .read_line(&mut request)
                .await
                .expect("read request failed");

            for chunk in chunks {
                write_half.write_all(&chunk).await.expect("write failed");
                write_half.flush().await.expect("flush failed");
                tokio::task::yield_now().await;
            }

            request
        })
    }

    async fn run_session(chunks: Vec<Vec<u8>>, notifier: &mut RecordingNotifier) -> (SessionSummary, String) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = dir.path().join("niri.sock");
        let listener = UnixListener::bind(&socket_path).expect("bind failed");
        let server = spawn_fake_niri(listener, chunks);

        let stream = EventStream::connect_to(&socket_path)
            .await
            .expect("connect failed");
        assert_eq!(stream.socket_path(), socket_path.as_path());

        let summary = stream.run(notifier).await.expect("session failed");
        let request = server.await.expect("server task panicked");
        (summary, request)
    }

    fn lines(lines: &[&str]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for line in lines {
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');
        }
        bytes
    }

    // -------------------------------------------------------------------------
    // Socket discovery
    // -------------------------------------------------------------------------

    #[test]
    fn test_socket_not_set_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(NIRI_SOCKET_ENV).ok();

        env::remove_var(NIRI_SOCKET_ENV);
        let result = get_socket_path();

        if let Some(val) = original {
            env::set_var(NIRI_SOCKET_ENV, val);
        }

        let err = result.unwrap_err();
        assert!(matches!(err, WatchError::SocketNotSet), "got: {:?}", err);
        assert!(err.to_string().contains("NIRI_SOCKET"));
    }

    #[test]
    fn test_socket_not_found_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(NIRI_SOCKET_ENV).ok();
        let fake_path = "/tmp/nonexistent-niri-layout-socket-12345";

        env::set_var(NIRI_SOCKET_ENV, fake_path);
        let result = get_socket_path();

        if let Some(val) = original {
            env::set_var(NIRI_SOCKET_ENV, val);
        } else {
            env::remove_var(NIRI_SOCKET_ENV);
        }

        match result.unwrap_err() {
            WatchError::SocketNotFound { path } => assert_eq!(path, PathBuf::from(fake_path)),
            other => panic!("Expected SocketNotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_fails_immediately_for_socket_not_set() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(NIRI_SOCKET_ENV).ok();

        env::remove_var(NIRI_SOCKET_ENV);
        let start = std::time::Instant::now();
        let result = EventStream::connect_with_retry(5).await;
        let elapsed = start.elapsed();

        if let Some(val) = original {
            env::set_var(NIRI_SOCKET_ENV, val);
        }

        assert!(matches!(result, Err(WatchError::SocketNotSet)));
        assert!(elapsed.as_millis() < 100, "retried: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_retry_exhausted_reports_attempts() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(NIRI_SOCKET_ENV).ok();

        // A regular file exists but refuses connections
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = dir.path().join("niri.sock");
        std::fs::write(&socket_path, "").expect("Failed to create dummy file");

        env::set_var(NIRI_SOCKET_ENV, &socket_path);
        let result = EventStream::connect_with_retry(1).await;

        if let Some(val) = original {
            env::set_var(NIRI_SOCKET_ENV, val);
        } else {
            env::remove_var(NIRI_SOCKET_ENV);
        }

        match result {
            Err(WatchError::MaxRetriesExceeded { attempts }) => assert_eq!(attempts, 2),
            other => panic!("Expected MaxRetriesExceeded, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_retries_returns_connection_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(NIRI_SOCKET_ENV).ok();

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = dir.path().join("niri.sock");
        std::fs::write(&socket_path, "").expect("Failed to create dummy file");

        env::set_var(NIRI_SOCKET_ENV, &socket_path);
        let start = std::time::Instant::now();
        let result = EventStream::connect_with_retry(0).await;
        let elapsed = start.elapsed();

        if let Some(val) = original {
            env::set_var(NIRI_SOCKET_ENV, val);
        } else {
            env::remove_var(NIRI_SOCKET_ENV);
        }

        // A single attempt, no backoff sleep and no MaxRetriesExceeded wrapper
        match result {
            Err(WatchError::ConnectionFailed { path, .. }) => assert_eq!(path, socket_path),
            other => panic!("Expected ConnectionFailed, got: {:?}", other),
        }
        assert!(
            elapsed.as_millis() < INITIAL_RETRY_DELAY_MS as u128,
            "retried: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_connect_to_regular_file_fails() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = dir.path().join("niri.sock");
        std::fs::write(&socket_path, "").expect("Failed to create dummy file");

        match EventStream::connect_to(&socket_path).await {
            Err(WatchError::ConnectionFailed { path, .. }) => assert_eq!(path, socket_path),
            other => panic!("Expected ConnectionFailed, got: {:?}", other),
        }
    }

    // -------------------------------------------------------------------------
    // Full sessions against a fake niri
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_sends_event_stream_request() {
        let mut notifier = RecordingNotifier::default();
        let (_, request) = run_session(Vec::new(), &mut notifier).await;

        assert_eq!(request, "\"EventStream\"\n");
    }

    #[tokio::test]
    async fn test_clean_close_before_ack() {
        let mut notifier = RecordingNotifier::default();
        let (summary, _) = run_session(Vec::new(), &mut notifier).await;

        assert_eq!(summary.lines, 0);
        assert_eq!(summary.phase, Phase::AwaitingAck);
        assert!(notifier.layouts.is_empty());
    }

    #[tokio::test]
    async fn test_full_session_notifies_on_changes() {
        let stream = lines(&[
            r#"{"Ok":"Handled"}"#,
            r#"{"WorkspacesChanged":{"workspaces":[]}}"#,
            SNAPSHOT,
            r#"{"KeyboardLayoutSwitched":{"idx":2}}"#,
            r#"{"KeyboardLayoutSwitched":{"idx":2}}"#,
            r#"{"KeyboardLayoutSwitched":{"idx":99}}"#,
            "this is not json",
            r#"{"KeyboardLayoutSwitched":{"idx":0}}"#,
        ]);

        let mut notifier = RecordingNotifier::default();
        let (summary, _) = run_session(vec![stream], &mut notifier).await;

        assert_eq!(notifier.layouts, vec!["fr", "us"]);
        assert_eq!(summary.lines, 8);
        assert_eq!(summary.notifications, 2);
        assert_eq!(summary.failed_notifications, 0);
        assert_eq!(summary.phase, Phase::Tracking);
    }

    #[tokio::test]
    async fn test_messages_split_across_reads() {
        let stream = lines(&[
            r#"{"Ok":null}"#,
            SNAPSHOT,
            r#"{"KeyboardLayoutSwitched":{"idx":0}}"#,
        ]);
        let chunks: Vec<Vec<u8>> = stream.chunks(7).map(<[u8]>::to_vec).collect();

        let mut notifier = RecordingNotifier::default();
        let (summary, _) = run_session(chunks, &mut notifier).await;

        assert_eq!(notifier.layouts, vec!["us"]);
        assert_eq!(summary.lines, 3);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_end_session() {
        let stream = lines(&[
            r#"{"Ok":null}"#,
            SNAPSHOT,
            r#"{"KeyboardLayoutSwitched":{"idx":0}}"#,
            r#"{"KeyboardLayoutSwitched":{"idx":2}}"#,
        ]);

        let mut notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let (summary, _) = run_session(vec![stream], &mut notifier).await;

        // Both switches were still applied and attempted
        assert_eq!(notifier.layouts, vec!["us", "fr"]);
        assert_eq!(summary.notifications, 0);
        assert_eq!(summary.failed_notifications, 2);
    }

    #[tokio::test]
    async fn test_incomplete_trailing_line_is_dropped() {
        let mut stream = lines(&[r#"{"Ok":null}"#, SNAPSHOT]);
        stream.extend_from_slice(br#"{"KeyboardLayoutSwitched":{"idx":0}}"#);

        let mut notifier = RecordingNotifier::default();
        let (summary, _) = run_session(vec![stream], &mut notifier).await;

        assert!(notifier.layouts.is_empty());
        assert_eq!(summary.lines, 2);
    }

    #[tokio::test]
    async fn test_compositor_error_keeps_session_alive() {
        let stream = lines(&[
            r#"{"Err":"event stream unavailable"}"#,
            r#"{"Ok":null}"#,
            SNAPSHOT,
            r#"{"KeyboardLayoutSwitched":{"idx":2}}"#,
        ]);

        let mut notifier = RecordingNotifier::default();
        let (summary, _) = run_session(vec![stream], &mut notifier).await;

        assert_eq!(notifier.layouts, vec!["fr"]);
        assert_eq!(summary.compositor_errors, 1);
        assert_eq!(summary.notifications, 1);
        assert_eq!(summary.phase, Phase::Tracking);
    }

    #[tokio::test]
    async fn test_empty_snapshot_tracks_without_notifying() {
        let stream = lines(&[
            r#"{"Ok":null}"#,
            r#"{"KeyboardLayoutsChanged":{"keyboard_layouts":{"current_idx":0,"names":[]}}}"#,
            r#"{"KeyboardLayoutSwitched":{"idx":0}}"#,
        ]);

        let mut notifier = RecordingNotifier::default();
        let (summary, _) = run_session(vec![stream], &mut notifier).await;

        assert!(notifier.layouts.is_empty());
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.compositor_errors, 0);
        assert_eq!(summary.phase, Phase::Tracking);
    }
}
