use std::sync::Arc;

use tracing::{info, warn};

use super::scenario::Language;
use crate::openai_client::{AudioClip, SpeechProvider};

/// Text used in place of a transcript when transcription fails.
pub const TRANSCRIPTION_FALLBACK: &str = "Sorry, I did not get that.";

/// Speech-to-text step of a turn. Never fails: provider errors become
/// [`TRANSCRIPTION_FALLBACK`] so the turn can continue.
pub struct Transcriber {
    provider: Arc<dyn SpeechProvider>,
}

impl Transcriber {
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        Self { provider }
    }

    /// Single attempt, no retries.
    pub async fn transcribe(&self, clip: AudioClip, language: Language) -> String {
        let file_name = clip.file_name.clone();

        match self.provider.transcribe(clip, language.code()).await {
            Ok(text) => {
                info!("Transcribed {} ({})", file_name, language);
                text
            }
            Err(e) => {
                warn!("Transcription of {} failed: {}", file_name, e);
                TRANSCRIPTION_FALLBACK.to_string()
            }
        }
    }
}
