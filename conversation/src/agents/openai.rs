//! OpenAI-compatible `/chat/completions` backend.
//!
//! Supports blocking replies and server-sent-event streaming. In streaming
//! mode each `data: {...}` frame yields a text fragment and `data: [DONE]`
//! yields [`Fragment::End`]. A stream that closes without `[DONE]` yields no
//! end marker, which the coordinator reports as a failed turn.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use super::generation::{
    Fragment, FragmentStream, GenerationError, GenerationRequest, Generator, Reply,
};

/// Endpoint settings for one backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL up to and including `/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub connect_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "default".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 4096,
            stream: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Chat-completions client. Cheap to clone and safe to share across sessions.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.config.model,
            "messages": build_messages(request),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": self.config.stream,
        })
    }
}

/// Persona as system message, history as alternating turns, directive last.
///
/// The speaking role's own turns become `assistant` messages; everyone
/// else's are `user` messages prefixed with the speaker.
pub fn build_messages(request: &GenerationRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(json!({"role": "system", "content": request.persona}));
    for entry in &request.history {
        if entry.speaker == request.role {
            messages.push(json!({"role": "assistant", "content": entry.content}));
        } else {
            messages.push(json!({
                "role": "user",
                "content": format!("[{}]: {}", entry.speaker, entry.content),
            }));
        }
    }
    messages.push(json!({"role": "user", "content": request.directive}));
    messages
}

/// One decoded SSE `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Decode a single SSE line. Comments, blank lines and non-data fields yield `None`.
pub fn parse_sse_line(line: &str) -> Option<Result<SseEvent, GenerationError>> {
    let line = line.trim_end_matches('\r');
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(GenerationError::Stream(format!("bad frame: {e}")))),
    };
    if let Some(err) = value.get("error") {
        return Some(Err(GenerationError::Stream(err.to_string())));
    }
    let delta = value["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or_default();
    Some(Ok(SseEvent::Delta(delta.to_string())))
}

/// Raw response body chunks.
type ByteStream = BoxStream<'static, Result<Vec<u8>, GenerationError>>;

struct SseState {
    bytes: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<Fragment, GenerationError>>,
    finished: bool,
}

impl SseState {
    /// Move every complete line out of the buffer into `pending`.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            match parse_sse_line(line.trim_end_matches('\n')) {
                Some(Ok(SseEvent::Delta(text))) if !text.is_empty() => {
                    self.pending.push_back(Ok(Fragment::Text(text)));
                }
                Some(Ok(SseEvent::Delta(_))) | None => {}
                Some(Ok(SseEvent::Done)) => {
                    self.pending.push_back(Ok(Fragment::End));
                    self.finished = true;
                    self.buffer.clear();
                    return;
                }
                Some(Err(e)) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                    self.buffer.clear();
                    return;
                }
            }
        }
    }
}

fn sse_fragments(bytes: ByteStream) -> FragmentStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                // Closed without [DONE]: no end marker.
                None => return None,
            }
        }
    }))
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Reply, GenerationError> {
        let url = self.endpoint();
        debug!(model = %self.config.model, role = %request.role, stream = self.config.stream, "chat completion");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.body(&request));
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        if self.config.stream {
            let bytes = response
                .bytes_stream()
                .map(|chunk| {
                    chunk
                        .map(|b| b.to_vec())
                        .map_err(|e| GenerationError::Stream(e.to_string()))
                })
                .boxed();
            return Ok(Reply::Stream(sse_fragments(bytes)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("invalid response body: {e}")))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GenerationError::Request("response has no message content".into()))?;
        Ok(Reply::Complete(content.to_string()))
    }
}
