use std::future::Future;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::conversation_state::{DisplayHistory, Turn};
use super::scenario::Gender;
use super::sentence::SentenceBuffer;
use crate::openai_client::{ProviderError, SpeechProvider};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Response cancelled")]
    Cancelled,
}

/// One spoken sentence of a reply together with the display state at the
/// moment it was flushed. `audio` is empty for the closing element that
/// carries unspoken trailing text.
#[derive(Debug, Clone)]
pub struct StreamedReply {
    pub history: DisplayHistory,
    pub sentence: String,
    pub audio: Vec<u8>,
}

/// Synthesis voice for the buyer persona.
pub fn voice_for(gender: Gender) -> &'static str {
    match gender {
        Gender::Female => "nova",
        Gender::Male => "onyx",
    }
}

pub struct ResponseStreamer {
    provider: Arc<dyn SpeechProvider>,
}

impl ResponseStreamer {
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        Self { provider }
    }

    /// Stream the reply to `conversation`, speaking it sentence by sentence.
    ///
    /// Each element is produced only after the previous one was consumed, and
    /// the next completion chunk is read only then. The stream is single use
    /// and ends early with an error when the provider fails or `cancel` fires.
    pub fn stream(
        &self,
        mut history: DisplayHistory,
        conversation: &[Turn],
        gender: Gender,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<StreamedReply, StreamError>> + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let voice = voice_for(gender);
        let messages: Vec<(&'static str, String)> = conversation
            .iter()
            .map(|turn| (turn.role.as_str(), turn.content.clone()))
            .collect();

        try_stream! {
            let borrowed: Vec<(&str, &str)> = messages
                .iter()
                .map(|(role, content)| (*role, content.as_str()))
                .collect();

            debug!("Opening completion stream over {} turns", borrowed.len());
            let mut fragments = unless_cancelled(&cancel, provider.stream_chat(&borrowed)).await??;

            let mut sentences = SentenceBuffer::new();
            let mut spoken = 0usize;

            loop {
                let next = unless_cancelled(&cancel, fragments.next()).await?;
                let fragment = match next {
                    Some(fragment) => fragment?,
                    None => break,
                };
                let text = match fragment {
                    Some(text) => text,
                    None => continue,
                };

                history.append_assistant(&text);

                if let Some(sentence) = sentences.push(&text) {
                    let audio = unless_cancelled(&cancel, provider.synthesize(voice, &sentence)).await??;
                    debug!("Synthesized {:?} ({} bytes)", sentence, audio.len());
                    spoken += 1;

                    yield StreamedReply {
                        history: history.clone(),
                        sentence,
                        audio,
                    };
                }
            }

            if !sentences.is_empty() {
                debug!("Reply ended with unspoken text {:?}", sentences.pending());
                yield StreamedReply {
                    history: history.clone(),
                    sentence: String::new(),
                    audio: Vec::new(),
                };
            }

            info!("Reply complete, {} sentences spoken with voice {}", spoken, voice);
        }
    }
}

async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = T>,
) -> Result<T, StreamError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamError::Cancelled),
        value = work => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::roleplay::conversation_state::RoleplaySession;
    use crate::cli::roleplay::scenario::ScenarioConfig;
    use crate::cli::roleplay::test_support::MockProvider;

    fn session_with(text: &str) -> RoleplaySession {
        let mut session = RoleplaySession::new(ScenarioConfig::default());
        session.add_text(text);
        session
    }

    async fn run(
        provider: Arc<MockProvider>,
        session: &RoleplaySession,
        gender: Gender,
        cancel: CancellationToken,
    ) -> Vec<Result<StreamedReply, StreamError>> {
        let streamer = ResponseStreamer::new(provider);
        streamer
            .stream(session.history().clone(), session.conversation(), gender, cancel)
            .collect()
            .await
    }

    #[tokio::test]
    async fn flushes_once_per_sentence() {
        let provider = Arc::new(MockProvider::new().with_fragments(&["Hi", " there.", " How are you?"]));
        let session = session_with("Hello");

        let replies = run(provider.clone(), &session, Gender::Female, CancellationToken::new()).await;
        let replies: Vec<StreamedReply> = replies.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].sentence, "Hi there.");
        assert_eq!(replies[0].history.last_assistant(), Some("Hi there."));
        assert_eq!(replies[0].audio, b"audio:Hi there.".to_vec());
        assert_eq!(replies[1].sentence, "How are you?");
        assert_eq!(replies[1].history.last_assistant(), Some("Hi there. How are you?"));

        assert_eq!(
            provider.synthesized(),
            vec![
                ("nova".to_string(), "Hi there.".to_string()),
                ("nova".to_string(), "How are you?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn sends_full_conversation() {
        let provider = Arc::new(MockProvider::new().with_fragments(&["Fine."]));
        let session = session_with("Hello");

        run(provider.clone(), &session, Gender::Female, CancellationToken::new()).await;

        let sent = provider.chat_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 2);
        assert_eq!(sent[0][0].0, "system");
        assert_eq!(sent[0][1], ("user".to_string(), "Hello".to_string()));
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped_and_male_voice_used() {
        let provider = Arc::new(
            MockProvider::new().with_chunks(vec![None, Some("Sure!".to_string()), None]),
        );
        let session = session_with("Hello");

        let replies = run(provider.clone(), &session, Gender::Male, CancellationToken::new()).await;

        assert_eq!(replies.len(), 1);
        assert_eq!(provider.synthesized(), vec![("onyx".to_string(), "Sure!".to_string())]);
    }

    #[tokio::test]
    async fn trailing_text_is_shown_but_not_spoken() {
        let provider = Arc::new(MockProvider::new().with_fragments(&["Okay.", " Maybe later"]));
        let session = session_with("Hello");

        let replies = run(provider.clone(), &session, Gender::Female, CancellationToken::new()).await;
        let last = replies.last().unwrap().as_ref().unwrap();

        assert_eq!(replies.len(), 2);
        assert!(last.audio.is_empty());
        assert_eq!(last.history.last_assistant(), Some("Okay. Maybe later"));
        assert_eq!(provider.synthesized().len(), 1);
    }

    #[tokio::test]
    async fn chat_failure_ends_stream_after_emitted_sentences() {
        let provider = Arc::new(
            MockProvider::new()
                .with_fragments(&["First sentence.", " Second"])
                .failing_chat_at_end(),
        );
        let session = session_with("Hello");

        let replies = run(provider, &session, Gender::Female, CancellationToken::new()).await;

        assert_eq!(replies.len(), 2);
        assert!(replies[0].is_ok());
        assert!(matches!(replies[1], Err(StreamError::Provider(_))));
    }

    #[tokio::test]
    async fn synthesis_failure_aborts() {
        let provider = Arc::new(MockProvider::new().with_fragments(&["Hi."]).failing_synthesis());
        let session = session_with("Hello");

        let replies = run(provider, &session, Gender::Female, CancellationToken::new()).await;

        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0], Err(StreamError::Provider(_))));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_request() {
        let provider = Arc::new(MockProvider::new().with_fragments(&["Hi."]));
        let session = session_with("Hello");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let replies = run(provider.clone(), &session, Gender::Female, cancel).await;

        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0], Err(StreamError::Cancelled)));
        assert!(provider.synthesized().is_empty());
    }

    #[tokio::test]
    async fn cancelling_mid_reply_ends_stream_and_keeps_spoken_text() {
        let provider = Arc::new(MockProvider::new().with_fragments(&["One.", " Two.", " Three."]));
        let mut session = session_with("Hello");
        let cancel = CancellationToken::new();

        let streamer = ResponseStreamer::new(provider.clone());
        let mut stream = Box::pin(streamer.stream(
            session.history().clone(),
            session.conversation(),
            Gender::Female,
            cancel.clone(),
        ));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.sentence, "One.");
        session.commit_history(first.history);

        cancel.cancel();
        assert!(matches!(stream.next().await, Some(Err(StreamError::Cancelled))));
        assert!(stream.next().await.is_none());

        session.abort_turn();
        assert_eq!(session.conversation().last(), Some(&Turn::assistant("One.")));
        assert_eq!(provider.synthesized().len(), 1);
    }
}
