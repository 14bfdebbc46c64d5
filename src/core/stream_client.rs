//! Streaming client for the `/api/generate` endpoint.
//!
//! [`StreamClient::start`] spawns one worker task per request. The worker
//! POSTs the prompt, decodes the response body one JSON object at a time and
//! forwards text fragments through a bounded channel to the returned
//! [`StreamSession`]. The worker never touches the conversation and never
//! reports anything except through that channel.

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything the client needs to talk to the inference server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub model: String,
    pub connect_timeout: Duration,
    /// Longest silence tolerated while waiting for the response headers or
    /// the next piece of the body.
    pub read_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
}

/// One inference step as emitted by the server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum StreamEvent {
    Fragment(String),
    Completed,
    Failed(StreamError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Transport failure: DNS, refused, reset, or a body that closed before
    /// producing anything.
    Connection(String),
    /// The server answered with a non-success status.
    Status { status: u16, message: String },
    /// The server reported an error inside the stream.
    Server(String),
    /// A chunk on the wire was not valid JSON.
    Decode(String),
    Timeout(Duration),
    /// The session was torn down on request. Not a failure.
    Cancelled,
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connection(reason) => write!(f, "connection failed: {reason}"),
            StreamError::Status { status, message } => {
                write!(f, "server returned {status}: {message}")
            }
            StreamError::Server(message) => write!(f, "server error: {message}"),
            StreamError::Decode(reason) => write!(f, "malformed response: {reason}"),
            StreamError::Timeout(after) => {
                write!(f, "no response from server within {}s", after.as_secs())
            }
            StreamError::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl StdError for StreamError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Moves to `next` if the transition is legal. Terminal states never move.
    pub fn transition(&mut self, next: SessionState) -> bool {
        use SessionState::*;
        let allowed = matches!(
            (*self, next),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Completed)
                | (Connecting, Failed)
                | (Streaming, Streaming)
                | (Streaming, Completed)
                | (Streaming, Failed)
        );
        if allowed {
            *self = next;
        }
        allowed
    }
}

/// Incremental decoder for a body made of concatenated JSON objects.
///
/// Objects may be separated by any JSON whitespace and may arrive split
/// across network reads, including in the middle of a multi-byte character.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
    decoded: usize,
    /// Bytes before this offset were already seen by a parse that ran out of
    /// input. No object can end there, so a retry waits for a new `}` or
    /// newline past it.
    scanned: usize,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of objects decoded so far.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Returns the next complete object, or `None` when more bytes are needed.
    pub fn next_chunk(&mut self) -> Result<Option<GenerateChunk>, StreamError> {
        let fresh = &self.buffer[self.scanned.min(self.buffer.len())..];
        if !fresh.iter().any(|b| matches!(b, b'}' | b'\n')) {
            self.scanned = self.buffer.len();
            return Ok(None);
        }

        let mut objects =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<GenerateChunk>();
        match objects.next() {
            Some(Ok(chunk)) => {
                let consumed = objects.byte_offset();
                self.buffer.drain(..consumed);
                self.decoded += 1;
                self.scanned = 0;
                Ok(Some(chunk))
            }
            Some(Err(err)) if err.is_eof() => {
                self.scanned = self.buffer.len();
                Ok(None)
            }
            Some(Err(err)) => Err(StreamError::Decode(err.to_string())),
            None => {
                self.buffer.clear();
                self.scanned = 0;
                Ok(None)
            }
        }
    }

    /// Checks that nothing but whitespace is left once the body has ended.
    pub fn finish(&self) -> Result<(), StreamError> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(StreamError::Decode(format!(
                "body ended inside a JSON object ({} trailing bytes)",
                self.buffer.len()
            )))
        }
    }
}

/// One in-flight request, owned by the consumer.
///
/// Dropping the session cancels the worker, which then closes its connection
/// and exits without sending anything else.
#[derive(Debug)]
pub struct StreamSession {
    id: u64,
    rx: mpsc::Receiver<StreamEvent>,
    cancel_token: CancellationToken,
    worker: JoinHandle<()>,
    state: SessionState,
}

impl StreamSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Waits for the next event. Returns `None` once a terminal event has been
    /// handed out.
    ///
    /// A channel that closes without a terminal event is reported as a
    /// connection failure, so every session ends with exactly one terminal
    /// event.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.state.is_terminal() {
            return None;
        }

        let event = self.rx.recv().await.unwrap_or_else(|| {
            StreamEvent::Failed(StreamError::Connection(
                "stream ended without a result".to_string(),
            ))
        });
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &StreamEvent) {
        let next = match event {
            StreamEvent::Fragment(_) => SessionState::Streaming,
            StreamEvent::Completed => SessionState::Completed,
            StreamEvent::Failed(_) => SessionState::Failed,
        };
        self.state.transition(next);
    }

    /// Tears the session down. Dropping the session has the same effect.
    pub fn cancel(self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

pub struct StreamClient {
    http: reqwest::Client,
    config: ClientConfig,
    next_stream_id: AtomicU64,
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| StreamError::Connection(error_chain(&err)))?;
        Ok(Self {
            http,
            config,
            next_stream_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Spawns the worker for `prompt`. Must be called from within a Tokio
    /// runtime.
    pub fn start(&self, prompt: &str) -> StreamSession {
        let (tx, rx) = mpsc::channel(1);
        let cancel_token = CancellationToken::new();
        let worker = StreamWorker {
            http: self.http.clone(),
            endpoint: self.config.endpoint.clone(),
            request: GenerateRequest {
                model: self.config.model.clone(),
                prompt: prompt.to_string(),
            },
            read_timeout: self.config.read_timeout,
            tx,
            cancel_token: cancel_token.clone(),
        };

        let mut state = SessionState::Idle;
        state.transition(SessionState::Connecting);

        StreamSession {
            id: self.next_stream_id.fetch_add(1, Ordering::Relaxed),
            rx,
            cancel_token,
            worker: tokio::spawn(worker.run()),
            state,
        }
    }
}

struct StreamWorker {
    http: reqwest::Client,
    endpoint: String,
    request: GenerateRequest,
    read_timeout: Duration,
    tx: mpsc::Sender<StreamEvent>,
    cancel_token: CancellationToken,
}

impl StreamWorker {
    async fn run(self) {
        let StreamWorker {
            http,
            endpoint,
            request,
            read_timeout,
            tx,
            cancel_token,
        } = self;

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {}
            _ = async {
                let terminal = match stream_body(&http, &endpoint, &request, read_timeout, &tx).await {
                    Ok(()) => StreamEvent::Completed,
                    Err(StreamError::Cancelled) => return,
                    Err(err) => StreamEvent::Failed(err),
                };
                let _ = tx.send(terminal).await;
            } => {}
        }
    }
}

async fn stream_body(
    http: &reqwest::Client,
    endpoint: &str,
    request: &GenerateRequest,
    read_timeout: Duration,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), StreamError> {
    let send = http
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json")
        .json(request)
        .send();
    let response = tokio::time::timeout(read_timeout, send)
        .await
        .map_err(|_| StreamError::Timeout(read_timeout))?
        .map_err(|err| StreamError::Connection(error_chain(&err)))?;

    let status = response.status();
    if !status.is_success() {
        let body = tokio::time::timeout(read_timeout, response.text())
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();
        return Err(StreamError::Status {
            status: status.as_u16(),
            message: extract_error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_owned))
                .unwrap_or_else(|| "<no body>".to_string()),
        });
    }

    let mut body = response.bytes_stream();
    let mut decoder = ChunkDecoder::new();

    loop {
        while let Some(chunk) = decoder.next_chunk()? {
            if let Some(message) = chunk.error {
                return Err(StreamError::Server(message));
            }
            if !chunk.response.is_empty() {
                tx.send(StreamEvent::Fragment(chunk.response))
                    .await
                    .map_err(|_| StreamError::Cancelled)?;
            }
            if chunk.done {
                return Ok(());
            }
        }

        match tokio::time::timeout(read_timeout, body.next()).await {
            Err(_) => return Err(StreamError::Timeout(read_timeout)),
            Ok(Some(Ok(bytes))) => decoder.push(&bytes),
            Ok(Some(Err(err))) => return Err(StreamError::Connection(error_chain(&err))),
            Ok(None) => {
                decoder.finish()?;
                if decoder.decoded() == 0 {
                    return Err(StreamError::Connection(
                        "connection closed before any response".to_string(),
                    ));
                }
                return Ok(());
            }
        }
    }
}

/// Pulls a human-readable message out of an error body such as
/// `{"error":"model 'x' not found"}`.
fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(collapse_whitespace(trimmed));
    };

    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| value.get("message").and_then(|v| v.as_str()))
        .map(collapse_whitespace);

    summary.or_else(|| Some(collapse_whitespace(trimmed)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut ChunkDecoder) -> Vec<GenerateChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = decoder.next_chunk().expect("valid stream") {
            out.push(chunk);
        }
        out
    }

    #[test]
    fn request_body_escapes_quotes_and_control_characters() {
        let request = GenerateRequest {
            model: "llama3:8b".into(),
            prompt: "say \"hi\"\\ then\nnewline\ttab".into(),
        };

        let body = serde_json::to_string(&request).expect("serialize");
        let parsed: serde_json::Value = serde_json::from_str(&body).expect("valid json");

        assert_eq!(parsed["model"], "llama3:8b");
        assert_eq!(parsed["prompt"], "say \"hi\"\\ then\nnewline\ttab");
        assert_eq!(parsed.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn decoder_reassembles_objects_split_across_reads() {
        let wire = concat!(
            r#"{"model":"m","response":"Hel","done":false}"#,
            "\n",
            r#"{"model":"m","response":"lo","done":true,"eval_count":3}"#,
            "\n"
        );
        let mut decoder = ChunkDecoder::new();
        let mut chunks = Vec::new();
        for piece in wire.as_bytes().chunks(7) {
            decoder.push(piece);
            chunks.extend(drain(&mut decoder));
        }

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].response, "Hel");
        assert!(!chunks[0].done);
        assert_eq!(chunks[1].response, "lo");
        assert!(chunks[1].done);
        assert_eq!(decoder.decoded(), 2);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn decoder_accepts_any_whitespace_between_objects() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(b"  {\"response\":\"a\"} \r\n\t{\"response\":\"b\"}{\"response\":\"c\",\"done\":true}  ");

        let text: String = drain(&mut decoder)
            .into_iter()
            .map(|chunk| chunk.response)
            .collect();
        assert_eq!(text, "abc");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn decoder_waits_for_the_rest_of_a_multibyte_character() {
        let wire = "{\"response\":\"caf\u{e9} \u{1f999}\",\"done\":true}".as_bytes();
        let split = wire
            .iter()
            .position(|b| *b == 0xC3)
            .expect("multibyte lead byte")
            + 1;

        let mut decoder = ChunkDecoder::new();
        decoder.push(&wire[..split]);
        assert_eq!(decoder.next_chunk().expect("incomplete is fine"), None);

        decoder.push(&wire[split..]);
        let chunk = decoder.next_chunk().expect("valid").expect("complete");
        assert_eq!(chunk.response, "caf\u{e9} \u{1f999}");
    }

    #[test]
    fn decoder_handles_large_object_trickling_in_byte_by_byte() {
        let text = "brace } inside ".repeat(500);
        let wire = format!("{}\n", serde_json::json!({"response": text, "done": true}));

        let mut decoder = ChunkDecoder::new();
        let mut chunks = Vec::new();
        for byte in wire.as_bytes() {
            decoder.push(std::slice::from_ref(byte));
            chunks.extend(drain(&mut decoder));
        }

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].response, text);
        assert!(chunks[0].done);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn decoder_waits_for_a_closing_brace_before_retrying() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(br#"{"response":"ab"#);
        assert_eq!(decoder.next_chunk().expect("needs more"), None);
        decoder.push(b"cd");
        assert_eq!(decoder.next_chunk().expect("needs more"), None);

        decoder.push(br#""}{"response":"next"}"#);
        assert_eq!(
            decoder.next_chunk().expect("valid").expect("complete").response,
            "abcd"
        );
        assert_eq!(
            decoder.next_chunk().expect("valid").expect("complete").response,
            "next"
        );
        assert_eq!(decoder.next_chunk().expect("drained"), None);
    }

    #[test]
    fn decoder_reports_malformed_json() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(b"{\"response\":\"ok\"}\n{\"response\": nope}\n");

        assert!(decoder.next_chunk().expect("first is valid").is_some());
        assert!(matches!(decoder.next_chunk(), Err(StreamError::Decode(_))));
    }

    #[test]
    fn decoder_finish_flags_truncated_object() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(b"{\"response\":\"cut");

        assert_eq!(decoder.next_chunk().expect("needs more"), None);
        assert!(matches!(decoder.finish(), Err(StreamError::Decode(_))));
    }

    #[test]
    fn chunk_with_error_field_is_decoded() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(br#"{"error":"model 'nope' not found"}"#);

        let chunk = decoder.next_chunk().expect("valid").expect("complete");
        assert_eq!(chunk.error.as_deref(), Some("model 'nope' not found"));
        assert_eq!(chunk.response, "");
        assert!(!chunk.done);
    }

    #[test]
    fn extract_error_message_handles_common_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":"model not found"}"#).as_deref(),
            Some("model not found")
        );
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"overloaded\n  try later"}}"#).as_deref(),
            Some("overloaded try later")
        );
        assert_eq!(
            extract_error_message("502 Bad Gateway").as_deref(),
            Some("502 Bad Gateway")
        );
        assert_eq!(extract_error_message("   "), None);
    }

    #[test]
    fn session_state_machine_has_no_exit_from_terminal_states() {
        let mut state = SessionState::Idle;
        assert!(!state.transition(SessionState::Streaming));
        assert!(state.transition(SessionState::Connecting));
        assert!(state.transition(SessionState::Streaming));
        assert!(state.transition(SessionState::Completed));
        assert!(state.is_terminal());

        assert!(!state.transition(SessionState::Streaming));
        assert!(!state.transition(SessionState::Failed));
        assert_eq!(state, SessionState::Completed);

        let mut failed = SessionState::Connecting;
        assert!(failed.transition(SessionState::Failed));
        assert!(!failed.transition(SessionState::Completed));
    }

    #[test]
    fn stream_error_display_is_readable() {
        assert_eq!(
            StreamError::Status {
                status: 404,
                message: "model not found".into()
            }
            .to_string(),
            "server returned 404: model not found"
        );
        assert_eq!(
            StreamError::Timeout(Duration::from_secs(30)).to_string(),
            "no response from server within 30s"
        );
        assert!(StreamError::Cancelled.is_cancelled());
    }
}
