use std::env;
use std::path::Path;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use eyre::{Result, eyre};
use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1/";

const TRANSCRIPTIONS_ENDPOINT: &str = "audio/transcriptions";
const CHAT_ENDPOINT: &str = "chat/completions";
const SPEECH_ENDPOINT: &str = "audio/speech";

/// Errors raised while talking to the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request to {endpoint} failed with status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Malformed response payload: {0}")]
    Payload(String),

    #[error("Request to {0} timed out")]
    Timeout(&'static str),

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

/// Incremental text fragments of a streamed completion. `None` marks a chunk
/// that carried no content (role headers, finish markers).
pub type FragmentStream = BoxStream<'static, Result<Option<String>, ProviderError>>;

/// A recorded clip as it is uploaded to the transcription endpoint.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// MIME type derived from the file extension.
    pub fn mime_type(&self) -> &'static str {
        let extension = Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("mp3") | Some("mpga") | Some("mpeg") => "audio/mpeg",
            Some("mp4") | Some("m4a") => "audio/mp4",
            Some("wav") => "audio/wav",
            Some("webm") => "audio/webm",
            Some("ogg") => "audio/ogg",
            Some("flac") => "audio/flac",
            _ => "application/octet-stream",
        }
    }
}

/// The three provider endpoints a roleplay turn depends on.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Transcribe a clip into text in the given language code.
    async fn transcribe(&self, clip: AudioClip, language: &str) -> Result<String, ProviderError>;

    /// Open a streaming completion over `(role, content)` messages.
    async fn stream_chat(&self, messages: &[(&str, &str)]) -> Result<FragmentStream, ProviderError>;

    /// Synthesize `text` with `voice`, returning encoded audio bytes.
    async fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Model identifiers, chosen once at startup.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub chat: String,
    pub transcription: String,
    pub speech: String,
}

pub struct OpenAiClient {
    api_key: String,
    api_base: Url,
    models: ModelConfig,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Read the provider credential from the environment.
    ///
    /// Called once at startup so a missing key stops the program before the
    /// first turn instead of failing every request.
    pub fn api_key_from_env() -> Result<String> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| eyre!("OPENAI_API_KEY environment variable not set"))?;

        if api_key.trim().is_empty() {
            return Err(eyre!("OPENAI_API_KEY environment variable is empty"));
        }

        Ok(api_key.trim().to_string())
    }

    pub fn new(
        api_key: String,
        api_base: &str,
        models: ModelConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_base = parse_api_base(api_base)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_key,
            api_base,
            models,
            timeout,
            client,
        })
    }

    pub fn models(&self) -> &ModelConfig {
        &self.models
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.api_base
            .join(path)
            .map_err(|e| ProviderError::Config(format!("cannot build URL for {}: {}", path, e)))
    }

    async fn check_status(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        error!("API request to {} failed with response: {}", endpoint, body);

        Err(ProviderError::Status {
            endpoint,
            status,
            body,
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiClient {
    async fn transcribe(&self, clip: AudioClip, language: &str) -> Result<String, ProviderError> {
        let url = self.endpoint(TRANSCRIPTIONS_ENDPOINT)?;
        let mime = clip.mime_type();

        debug!(
            "Sending transcription request to {} ({} bytes, {}, language {})",
            url,
            clip.bytes.len(),
            mime,
            language
        );

        let audio_part = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(mime)?;

        let form = Form::new()
            .part("file", audio_part)
            .text("model", self.models.transcription.clone())
            .text("language", language.to_string())
            .text("response_format", "text");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        let response = Self::check_status(TRANSCRIPTIONS_ENDPOINT, response).await?;
        let transcript = response.text().await?;

        debug!("Transcription completed ({} chars)", transcript.len());

        Ok(transcript.trim().to_string())
    }

    async fn stream_chat(&self, messages: &[(&str, &str)]) -> Result<FragmentStream, ProviderError> {
        let url = self.endpoint(CHAT_ENDPOINT)?;

        let request_body = ChatRequest {
            model: &self.models.chat,
            messages: messages
                .iter()
                .map(|(role, content)| ChatMessage { role, content })
                .collect(),
            stream: true,
        };

        if let Ok(pretty) = serde_json::to_string_pretty(&request_body) {
            debug!("Sending streaming request to {}: {}", url, pretty);
        }

        let request = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout(CHAT_ENDPOINT))??;
        let response = Self::check_status(CHAT_ENDPOINT, response).await?;

        Ok(fragment_stream(response.bytes_stream(), self.timeout).boxed())
    }

    async fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<u8>, ProviderError> {
        let url = self.endpoint(SPEECH_ENDPOINT)?;

        let request_body = json!({
            "model": self.models.speech,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        });

        debug!("Synthesizing {} chars with voice {}", text.len(), voice);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await?;

        let response = Self::check_status(SPEECH_ENDPOINT, response).await?;
        let audio = response.bytes().await?;

        Ok(audio.to_vec())
    }
}

fn parse_api_base(api_base: &str) -> Result<Url, ProviderError> {
    // Url::join drops the last path segment unless the base ends with '/'.
    let mut base = api_base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }

    let url = Url::parse(&base)
        .map_err(|e| ProviderError::Config(format!("invalid API base '{}': {}", api_base, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProviderError::Config(format!(
            "unsupported scheme '{}' in API base '{}'",
            other, api_base
        ))),
    }
}

/// Turn a raw completion body into content fragments, stopping at `[DONE]`
/// or end of body. Each body read is bounded by `timeout`.
fn fragment_stream<S, B, E>(
    body: S,
    timeout: Duration,
) -> impl Stream<Item = Result<Option<String>, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ProviderError> + Send,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();

        'read: loop {
            let next = tokio::time::timeout(timeout, body.next())
                .await
                .map_err(|_| ProviderError::Timeout(CHAT_ENDPOINT))?;

            let (events, at_end) = match next {
                Some(bytes) => {
                    let bytes = bytes.map_err(Into::<ProviderError>::into)?;
                    (decoder.feed(bytes.as_ref()), false)
                }
                None => (decoder.finish(), true),
            };

            for event in events {
                match event {
                    SseEvent::Done => break 'read,
                    SseEvent::Data(data) => yield parse_chunk(&data)?,
                }
            }

            if at_end {
                break 'read;
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

/// Extract the content fragment of one streamed completion chunk.
fn parse_chunk(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::Payload(format!("{}: {}", e, data)))?;

    if let Some(err) = chunk.error {
        return Err(ProviderError::Payload(format!("provider reported an error: {}", err)));
    }

    Ok(chunk.choices.into_iter().next().and_then(|choice| choice.delta.content))
}

#[derive(Debug, Clone, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Line decoder for a server-sent event body.
///
/// Network chunks may end mid-line or mid-character, so bytes are held until
/// a full line arrives.
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !data.is_empty() {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }

        events
    }

    /// Decode whatever is left once the body has ended. Servers may omit the
    /// newline after the last event.
    fn finish(&mut self) -> Vec<SseEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.pending.push(b'\n');
        self.feed(&[])
    }
}
