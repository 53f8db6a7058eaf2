use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use crate::openai_client::{AudioClip, FragmentStream, ProviderError, SpeechProvider};

#[derive(Default)]
struct Calls {
    languages: Vec<String>,
    chat_requests: Vec<Vec<(String, String)>>,
    synthesized: Vec<(String, String)>,
}

/// Scripted in-memory provider that records every call.
#[derive(Default)]
pub struct MockProvider {
    transcript: Option<String>,
    chunks: Vec<Option<String>>,
    fail_chat_at_end: bool,
    fail_synthesis: bool,
    calls: Mutex<Calls>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(mut self, text: &str) -> Self {
        self.transcript = Some(text.to_string());
        self
    }

    pub fn failing_transcription(mut self) -> Self {
        self.transcript = None;
        self
    }

    pub fn with_fragments(self, fragments: &[&str]) -> Self {
        self.with_chunks(fragments.iter().map(|f| Some(f.to_string())).collect())
    }

    pub fn with_chunks(mut self, chunks: Vec<Option<String>>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn failing_chat_at_end(mut self) -> Self {
        self.fail_chat_at_end = true;
        self
    }

    pub fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    pub fn transcribed_languages(&self) -> Vec<String> {
        self.calls.lock().unwrap().languages.clone()
    }

    pub fn chat_requests(&self) -> Vec<Vec<(String, String)>> {
        self.calls.lock().unwrap().chat_requests.clone()
    }

    pub fn synthesized(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().synthesized.clone()
    }
}

#[async_trait]
impl SpeechProvider for MockProvider {
    async fn transcribe(&self, _clip: AudioClip, language: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().languages.push(language.to_string());

        self.transcript
            .clone()
            .ok_or_else(|| ProviderError::Payload("transcription unavailable".to_string()))
    }

    async fn stream_chat(&self, messages: &[(&str, &str)]) -> Result<FragmentStream, ProviderError> {
        self.calls.lock().unwrap().chat_requests.push(
            messages
                .iter()
                .map(|(role, content)| (role.to_string(), content.to_string()))
                .collect(),
        );

        let mut items: Vec<Result<Option<String>, ProviderError>> =
            self.chunks.iter().cloned().map(Ok).collect();
        if self.fail_chat_at_end {
            items.push(Err(ProviderError::Payload("stream reset".to_string())));
        }

        Ok(futures::stream::iter(items).boxed())
    }

    async fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .synthesized
            .push((voice.to_string(), text.to_string()));

        if self.fail_synthesis {
            return Err(ProviderError::Payload("synthesis unavailable".to_string()));
        }

        Ok(format!("audio:{}", text).into_bytes())
    }
}
