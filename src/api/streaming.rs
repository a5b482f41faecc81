//! SSE re-streaming.
//!
//! The upstream body arrives in arbitrary chunks. [`SseLineBuffer`] assembles
//! them into complete lines, filters them down to the SSE fields we forward,
//! and hands back one outbound write per upstream chunk. A line is only ever
//! written once it is complete, so no event is split across two writes.

use crate::api::disconnect::DisconnectStream;
use crate::core::cancel::StreamCancelHandle;
use crate::core::error::describe_error;
use crate::core::metrics::get_metrics;
use axum::body::Body;
use axum::http::{header, HeaderName};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;

/// Keep-alive comment the provider interleaves with real events.
pub const PROCESSING_MARKER: &str = ": OPENROUTER PROCESSING";

/// Line prefixes forwarded downstream. Everything else non-blank is dropped.
const FORWARDED_PREFIXES: &[&str] = &["data: ", "event: ", "id: "];

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// What the re-streamer does with one complete line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    /// Recognized field, written with its terminator
    Forward,
    /// Blank (or whitespace-only) line, written as an event terminator
    Boundary,
    /// Provider keep-alive, discarded
    Marker,
    /// Anything else, discarded
    Drop,
}

pub fn classify_line(line: &str) -> LineAction {
    if line.starts_with(PROCESSING_MARKER) {
        LineAction::Marker
    } else if FORWARDED_PREFIXES.iter().any(|p| line.starts_with(p)) {
        LineAction::Forward
    } else if line.trim().is_empty() {
        LineAction::Boundary
    } else {
        LineAction::Drop
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventState {
    /// Nothing written yet
    Start,
    /// At least one field written since the last terminator
    Open,
    /// Last thing written was a terminator
    Closed,
}

/// Per-line counters, reported once when a stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub forwarded: u64,
    pub boundaries: u64,
    pub markers: u64,
    pub dropped: u64,
}

/// Line assembly state for one streaming response.
///
/// LF, CRLF and a lone CR all terminate a line. A CR followed by LF counts
/// once even when the two land in different chunks.
#[derive(Debug)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
    skip_lf: bool,
    state: EventState,
    stats: LineStats,
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            skip_lf: false,
            state: EventState::Start,
            stats: LineStats::default(),
        }
    }

    pub fn stats(&self) -> LineStats {
        self.stats
    }

    /// Bytes of the incomplete trailing line currently held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one upstream chunk, returning what should be written downstream.
    ///
    /// The result is empty when the chunk completed no forwardable line.
    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.complete_line(&mut out),
                b'\r' => {
                    self.complete_line(&mut out);
                    self.skip_lf = true;
                }
                _ => self.pending.push(byte),
            }
        }
        out.freeze()
    }

    /// End of upstream: flush the unterminated remainder and close the last
    /// event.
    ///
    /// The closing terminator is omitted when the output already ends on an
    /// event boundary, so a well-formed stream is passed through unchanged.
    pub fn finish(&mut self) -> Bytes {
        let mut out = BytesMut::new();
        if !self.pending.is_empty() {
            self.complete_line(&mut out);
        }
        self.skip_lf = false;
        if self.state != EventState::Closed {
            self.write_boundary(&mut out);
        }
        out.freeze()
    }

    /// Upstream failed mid-stream: close any open event and append a
    /// synthesized error event. The incomplete remainder is discarded.
    pub fn error_event(&mut self, message: &str) -> Bytes {
        let mut out = BytesMut::new();
        self.pending.clear();
        self.skip_lf = false;
        if self.state == EventState::Open {
            self.write_boundary(&mut out);
        }
        let payload = json!({ "error": message }).to_string();
        out.extend_from_slice(b"data: ");
        out.extend_from_slice(payload.as_bytes());
        out.extend_from_slice(b"\n");
        self.write_boundary(&mut out);
        out.freeze()
    }

    fn complete_line(&mut self, out: &mut BytesMut) {
        let mut raw = std::mem::take(&mut self.pending);
        let action = {
            let line = String::from_utf8_lossy(&raw);
            let action = classify_line(&line);
            if action == LineAction::Forward {
                out.extend_from_slice(line.as_bytes());
                out.extend_from_slice(b"\n");
            }
            action
        };
        match action {
            LineAction::Forward => {
                self.state = EventState::Open;
                self.stats.forwarded += 1;
            }
            LineAction::Boundary => self.write_boundary(out),
            LineAction::Marker => self.stats.markers += 1,
            LineAction::Drop => self.stats.dropped += 1,
        }
        // Give the allocation back for the next line.
        raw.clear();
        self.pending = raw;
    }

    fn write_boundary(&mut self, out: &mut BytesMut) {
        out.extend_from_slice(b"\n");
        self.state = EventState::Closed;
        self.stats.boundaries += 1;
    }
}

struct RestreamState<S> {
    upstream: S,
    buffer: SseLineBuffer,
    cancel: StreamCancelHandle,
    request_id: String,
    finished: bool,
}

impl<S> RestreamState<S> {
    fn complete(&mut self) {
        self.finished = true;
        self.cancel.mark_completed();
        record_line_stats(self.buffer.stats());
    }
}

fn record_line_stats(stats: LineStats) {
    let lines = &get_metrics().sse_lines;
    lines
        .with_label_values(&["forwarded"])
        .inc_by(stats.forwarded + stats.boundaries);
    lines.with_label_values(&["marker"]).inc_by(stats.markers);
    lines.with_label_values(&["dropped"]).inc_by(stats.dropped);
}

/// Re-frame an upstream SSE byte stream.
///
/// Pull-based: the next upstream chunk is only requested when the downstream
/// body asks for more, so a slow client applies backpressure all the way to
/// the upstream socket. Stops early if `cancel` fires.
pub fn restream<S, E>(
    upstream: S,
    cancel: StreamCancelHandle,
    request_id: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + 'static,
{
    let state = RestreamState {
        upstream,
        buffer: SseLineBuffer::new(),
        cancel,
        request_id,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => None,
                item = state.upstream.next() => Some(item),
            };

            let Some(next) = next else {
                tracing::info!(
                    request_id = %state.request_id,
                    pending_bytes = state.buffer.pending_len(),
                    "Stream cancelled, releasing upstream"
                );
                state.finished = true;
                return None;
            };

            match next {
                Some(Ok(chunk)) => {
                    let out = state.buffer.push(&chunk);
                    if out.is_empty() {
                        continue;
                    }
                    return Some((Ok(out), state));
                }
                Some(Err(e)) => {
                    let message = describe_error(&e);
                    tracing::error!(
                        request_id = %state.request_id,
                        error = %message,
                        "Upstream stream failed mid-response"
                    );
                    get_metrics().stream_errors_total.inc();
                    let out = state.buffer.error_event(&message);
                    state.complete();
                    return Some((Ok(out), state));
                }
                None => {
                    let out = state.buffer.finish();
                    state.complete();
                    let stats = state.buffer.stats();
                    tracing::debug!(
                        request_id = %state.request_id,
                        forwarded = stats.forwarded,
                        markers = stats.markers,
                        dropped = stats.dropped,
                        "Upstream stream completed"
                    );
                    if out.is_empty() {
                        return None;
                    }
                    return Some((Ok(out), state));
                }
            }
        }
    })
}

/// Build the downstream SSE response around an open upstream response.
pub fn create_sse_response(upstream: reqwest::Response, request_id: String) -> Response {
    let cancel = StreamCancelHandle::new();
    let body = restream(
        Box::pin(upstream.bytes_stream()),
        cancel.clone(),
        request_id.clone(),
    );
    let stream = DisconnectStream::new(Box::pin(body), cancel, request_id);

    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
