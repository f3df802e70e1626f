//! Sentinel framing for command output on an unframed stream
//!
//! A local interpreter emits one continuous stdout stream and one continuous
//! stderr stream. Every command is wrapped so that both streams carry a start
//! sentinel before its output and an end sentinel (`:SUCCESS` or `:ERROR`)
//! after it. The [`Framer`] is fed raw chunks as they arrive, reassembles them
//! per stream and reports one [`FramedOutput`] once both streams have passed
//! the end sentinel of the awaited command. The stdout end sentinel alone
//! decides completion: when stderr lags (or was redirected away by the
//! command), [`Framer::finish`] closes the capture with the stderr collected
//! so far.
//!
//! Matching is exact on the correlation id: sentinels of other commands (for
//! example a command that timed out earlier) are treated as ordinary bytes
//! and discarded with the rest of the stale output.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::identifiers::CorrelationId;

/// Maximum captured bytes kept per stream and command (10MB)
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;

const SUCCESS_SUFFIX: &str = ":SUCCESS";
const ERROR_SUFFIX: &str = ":ERROR";

// ============================================================================
// Markers
// ============================================================================

/// Sentinel pair for one command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    start: String,
    end_success: String,
    end_error: String,
}

impl Markers {
    /// Build the sentinels for `id` under a session nonce
    #[must_use]
    pub fn new(nonce: &str, id: CorrelationId) -> Self {
        let end = format!("__KG_{nonce}_END_{id}__");
        Self {
            start: format!("__KG_{nonce}_BEGIN_{id}__"),
            end_success: format!("{end}{SUCCESS_SUFFIX}"),
            end_error: format!("{end}{ERROR_SUFFIX}"),
        }
    }

    /// Start sentinel
    #[must_use]
    pub fn start(&self) -> &str {
        &self.start
    }

    /// End sentinel reporting success
    #[must_use]
    pub fn end_success(&self) -> &str {
        &self.end_success
    }

    /// End sentinel reporting failure
    #[must_use]
    pub fn end_error(&self) -> &str {
        &self.end_error
    }

    fn longest_end(&self) -> usize {
        self.end_success.len().max(self.end_error.len())
    }
}

/// Allocates correlation ids and sentinels for one session
#[derive(Debug)]
pub struct MarkerFactory {
    nonce: String,
    next_id: AtomicU64,
}

impl MarkerFactory {
    /// Factory with a random per-session nonce
    #[must_use]
    pub fn new() -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self::with_nonce(&nonce[..12])
    }

    /// Factory with a fixed nonce
    #[must_use]
    pub fn with_nonce(nonce: &str) -> Self {
        Self {
            nonce: nonce.to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Next correlation id and its sentinels
    pub fn next(&self) -> (CorrelationId, Markers) {
        let id = CorrelationId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        (id, Markers::new(&self.nonce, id))
    }
}

impl Default for MarkerFactory {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Framer
// ============================================================================

/// Output stream a chunk arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Observable phase of the framer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// No command awaited; all input is discarded
    Idle,
    /// Awaiting or accumulating output of this command
    Capturing(CorrelationId),
    /// One stream has reached the end sentinel, the other has not
    Finalizing(CorrelationId),
}

/// Completed capture of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedOutput {
    /// Command this output belongs to
    pub id: CorrelationId,
    /// Trimmed stdout between the sentinels
    pub stdout: String,
    /// Trimmed stderr between the sentinels
    pub stderr: String,
    /// Whether the command reported success
    pub success: bool,
    /// Whether either stream lost its head to the capture cap
    pub truncated: bool,
}

#[derive(Debug)]
enum StreamProgress {
    AwaitingStart,
    Capturing,
    Finished { text: String, success: bool },
}

#[derive(Debug)]
struct StreamCapture {
    buffer: Vec<u8>,
    scan_from: usize,
    progress: StreamProgress,
    truncated: bool,
}

impl StreamCapture {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            scan_from: 0,
            progress: StreamProgress::AwaitingStart,
            truncated: false,
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.progress, StreamProgress::Finished { .. })
    }

    /// Feed a chunk; returns true when this stream just finished
    fn feed(&mut self, chunk: &[u8], markers: &Markers, max_capture: usize) -> bool {
        if self.is_finished() {
            return false;
        }
        self.buffer.extend_from_slice(chunk);

        if matches!(self.progress, StreamProgress::AwaitingStart) {
            let start = markers.start().as_bytes();
            match find(&self.buffer, start, self.scan_from) {
                Some(pos) => {
                    // Everything before the start sentinel is stale
                    self.buffer.drain(..pos + start.len());
                    self.scan_from = 0;
                    self.progress = StreamProgress::Capturing;
                }
                None => {
                    let keep = start.len().saturating_sub(1);
                    if self.buffer.len() > keep {
                        self.buffer.drain(..self.buffer.len() - keep);
                    }
                    self.scan_from = 0;
                    return false;
                }
            }
        }

        let success_at = find(&self.buffer, markers.end_success().as_bytes(), self.scan_from);
        let error_at = find(&self.buffer, markers.end_error().as_bytes(), self.scan_from);
        let end = match (success_at, error_at) {
            (Some(s), Some(e)) => Some((s.min(e), s <= e)),
            (Some(s), None) => Some((s, true)),
            (None, Some(e)) => Some((e, false)),
            (None, None) => None,
        };

        if let Some((pos, success)) = end {
            let captured = String::from_utf8_lossy(&self.buffer[..pos]);
            let text = captured.replace(markers.start(), "").trim().to_string();
            self.buffer.clear();
            self.scan_from = 0;
            self.progress = StreamProgress::Finished { text, success };
            return true;
        }

        if self.buffer.len() > max_capture {
            let excess = self.buffer.len() - max_capture;
            self.buffer.drain(..excess);
            self.truncated = true;
        }
        self.scan_from = self
            .buffer
            .len()
            .saturating_sub(markers.longest_end().saturating_sub(1));
        false
    }

    fn take_result(&mut self, markers: &Markers) -> (String, bool) {
        match std::mem::replace(&mut self.progress, StreamProgress::AwaitingStart) {
            StreamProgress::Finished { text, success } => (text, success),
            StreamProgress::Capturing => {
                let captured = String::from_utf8_lossy(&self.buffer);
                let text = captured.replace(markers.start(), "").trim().to_string();
                self.buffer.clear();
                (text, false)
            }
            StreamProgress::AwaitingStart => (String::new(), false),
        }
    }
}

#[derive(Debug)]
struct ArmedCapture {
    id: CorrelationId,
    markers: Markers,
    stdout: StreamCapture,
    stderr: StreamCapture,
}

/// Reassembles sentinel-framed command output from two raw streams
///
/// Phases: `Idle → Capturing(id) → Finalizing(id) → Idle`. Exactly one
/// command is awaited at a time; arming a new command discards whatever was
/// buffered for the previous one.
#[derive(Debug)]
pub struct Framer {
    armed: Option<ArmedCapture>,
    max_capture: usize,
}

impl Framer {
    /// Create an idle framer with the default capture cap
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_capture(DEFAULT_MAX_CAPTURE_BYTES)
    }

    /// Create an idle framer keeping at most `max_capture` bytes per stream
    #[must_use]
    pub fn with_max_capture(max_capture: usize) -> Self {
        Self {
            armed: None,
            max_capture,
        }
    }

    /// Start awaiting the output of command `id`
    pub fn arm(&mut self, id: CorrelationId, markers: Markers) {
        if let Some(previous) = self.armed.as_ref() {
            log::debug!("Replacing capture of command {} with {}", previous.id, id);
        }
        self.armed = Some(ArmedCapture {
            id,
            markers,
            stdout: StreamCapture::new(),
            stderr: StreamCapture::new(),
        });
    }

    /// Stop awaiting command `id`; returns false if another command is armed
    pub fn disarm(&mut self, id: CorrelationId) -> bool {
        if self.armed.as_ref().is_some_and(|armed| armed.id == id) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> CapturePhase {
        match &self.armed {
            None => CapturePhase::Idle,
            Some(armed) if armed.stdout.is_finished() || armed.stderr.is_finished() => {
                CapturePhase::Finalizing(armed.id)
            }
            Some(armed) => CapturePhase::Capturing(armed.id),
        }
    }

    /// Command whose stdout has ended while stderr has not
    #[must_use]
    pub fn stderr_pending(&self) -> Option<CorrelationId> {
        self.armed
            .as_ref()
            .filter(|armed| armed.stdout.is_finished() && !armed.stderr.is_finished())
            .map(|armed| armed.id)
    }

    /// Feed a raw chunk from one stream
    ///
    /// Returns the completed output once both streams have passed the end
    /// sentinel of the armed command; the framer is idle again afterwards.
    pub fn feed(&mut self, stream: StreamKind, chunk: &[u8]) -> Option<FramedOutput> {
        let max_capture = self.max_capture;
        let armed = self.armed.as_mut()?;
        let ArmedCapture {
            markers,
            stdout,
            stderr,
            ..
        } = &mut *armed;

        match stream {
            StreamKind::Stdout => stdout.feed(chunk, markers, max_capture),
            StreamKind::Stderr => stderr.feed(chunk, markers, max_capture),
        };

        if !(armed.stdout.is_finished() && armed.stderr.is_finished()) {
            return None;
        }
        let id = armed.id;
        self.finish(id)
    }

    /// Complete command `id` without waiting for its stderr end sentinel
    ///
    /// Returns `None` unless `id` is armed and its stdout has ended. Stderr
    /// keeps whatever was captured after its start sentinel.
    pub fn finish(&mut self, id: CorrelationId) -> Option<FramedOutput> {
        if !self
            .armed
            .as_ref()
            .is_some_and(|armed| armed.id == id && armed.stdout.is_finished())
        {
            return None;
        }

        let mut armed = self.armed.take()?;
        let (stdout, success) = armed.stdout.take_result(&armed.markers);
        let (stderr, _) = armed.stderr.take_result(&armed.markers);
        Some(FramedOutput {
            id: armed.id,
            stdout,
            stderr,
            success,
            truncated: armed.stdout.truncated || armed.stderr.truncated,
        })
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of `needle` in `haystack`, searching from `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() || from > haystack.len() - needle.len()
    {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
