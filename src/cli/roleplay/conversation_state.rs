use tracing::debug;

use super::scenario::ScenarioConfig;

/// Assistant text recorded for a turn that was aborted before any reply text
/// arrived.
pub const INTERRUPTED_PLACEHOLDER: &str = "[response interrupted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// `(user, assistant)` text pairs as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayHistory {
    pairs: Vec<(String, String)>,
}

impl DisplayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: &str) {
        self.pairs.push((text.to_string(), String::new()));
    }

    /// Extend the assistant side of the latest pair.
    pub fn append_assistant(&mut self, fragment: &str) {
        if let Some((_, assistant)) = self.pairs.last_mut() {
            assistant.push_str(fragment);
        }
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.pairs.last().map(|(_, assistant)| assistant.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

/// Add a user turn to `conversation` and `history`, returning the cleared
/// input text.
///
/// A conversation with fewer than two turns is (re)started from `config`.
/// Otherwise the previous reply is recorded as an assistant turn before the
/// new user turn, unless an aborted turn already recorded one.
pub fn assemble_turn(
    history: &mut DisplayHistory,
    conversation: &mut Vec<Turn>,
    text: &str,
    config: &ScenarioConfig,
) -> String {
    if conversation.len() < 2 {
        if !history.is_empty() {
            debug!("Discarding {} stale display entries on conversation start", history.len());
            history.clear();
        }

        conversation.clear();
        conversation.push(Turn::system(config.render_system_prompt()));
        conversation.push(Turn::user(text));
        history.push_user(text);
    } else {
        let reply_recorded = conversation
            .last()
            .map(|turn| turn.role == Role::Assistant)
            .unwrap_or(false);

        if !reply_recorded {
            let reply = history.last_assistant().unwrap_or_default();
            conversation.push(Turn::assistant(reply));
        }

        conversation.push(Turn::user(text));
        history.push_user(text);
    }

    String::new()
}

/// All state of one roleplay: its configuration, the conversation sent to
/// the model, and the display projection.
pub struct RoleplaySession {
    config: ScenarioConfig,
    conversation: Vec<Turn>,
    history: DisplayHistory,
}

impl RoleplaySession {
    pub fn new(config: ScenarioConfig) -> Self {
        Self {
            config,
            conversation: Vec::new(),
            history: DisplayHistory::new(),
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Mutable access to the configuration, only while no conversation is in
    /// progress.
    pub fn config_mut(&mut self) -> Option<&mut ScenarioConfig> {
        if self.is_in_progress() {
            None
        } else {
            Some(&mut self.config)
        }
    }

    pub fn is_in_progress(&self) -> bool {
        !self.conversation.is_empty()
    }

    pub fn add_text(&mut self, text: &str) -> String {
        assemble_turn(&mut self.history, &mut self.conversation, text, &self.config)
    }

    pub fn conversation(&self) -> &[Turn] {
        &self.conversation
    }

    pub fn history(&self) -> &DisplayHistory {
        &self.history
    }

    /// Replace the display projection with one produced by the streamer.
    pub fn commit_history(&mut self, history: DisplayHistory) {
        self.history = history;
    }

    /// Record the assistant side of a turn whose reply stream failed or was
    /// cancelled, so the next turn continues from a well-formed conversation.
    pub fn abort_turn(&mut self) {
        let awaiting_reply = self
            .conversation
            .last()
            .map(|turn| turn.role == Role::User)
            .unwrap_or(false);

        if !awaiting_reply {
            return;
        }

        let partial = self.history.last_assistant().unwrap_or_default().trim().to_string();
        let reply = if partial.is_empty() {
            self.history.append_assistant(INTERRUPTED_PLACEHOLDER);
            INTERRUPTED_PLACEHOLDER.to_string()
        } else {
            partial
        };

        self.conversation.push(Turn::assistant(reply));
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::roleplay::scenario::DEFAULT_SCENARIO;

    fn user_turns(conversation: &[Turn]) -> usize {
        conversation.iter().filter(|turn| turn.role == Role::User).count()
    }

    #[test]
    fn first_turn_with_empty_config_uses_default_scenario() {
        let config = ScenarioConfig {
            scenario: String::new(),
            ..ScenarioConfig::default()
        };
        let mut history = DisplayHistory::new();
        let mut conversation = Vec::new();

        let cleared = assemble_turn(&mut history, &mut conversation, "Hello", &config);

        assert_eq!(cleared, "");
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].role, Role::System);
        assert!(conversation[0].content.contains(DEFAULT_SCENARIO));
        assert_eq!(conversation[1], Turn::user("Hello"));
        assert_eq!(history.pairs(), &[("Hello".to_string(), String::new())]);
    }

    #[test]
    fn short_conversation_restarts() {
        let config = ScenarioConfig::default();
        let mut history = DisplayHistory::new();
        let mut conversation = vec![Turn::system("stale")];

        assemble_turn(&mut history, &mut conversation, "Hi", &config);

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].role, Role::System);
        assert_ne!(conversation[0].content, "stale");
        assert_eq!(conversation[1].role, Role::User);
        assert_eq!(history.last_assistant(), Some(""));
    }

    #[test]
    fn continuing_appends_previous_reply_then_user() {
        let config = ScenarioConfig::default();
        let mut history = DisplayHistory::new();
        let mut conversation = Vec::new();

        assemble_turn(&mut history, &mut conversation, "Hello", &config);
        history.append_assistant("Hi, who are you?");

        assemble_turn(&mut history, &mut conversation, "I'm with MedScope.", &config);

        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation[2], Turn::assistant("Hi, who are you?"));
        assert_eq!(conversation[3], Turn::user("I'm with MedScope."));
        assert_eq!(history.len(), 2);
        assert_eq!(history.last_assistant(), Some(""));
        assert_eq!(history.len(), user_turns(&conversation));
    }

    #[test]
    fn session_config_is_frozen_while_in_progress() {
        let mut session = RoleplaySession::new(ScenarioConfig::default());
        assert!(session.config_mut().is_some());

        session.add_text("Hello");
        assert!(session.config_mut().is_none());

        session.clear();
        assert!(session.conversation().is_empty());
        assert!(session.history().is_empty());
        assert!(session.config_mut().is_some());
    }

    #[test]
    fn abort_without_reply_records_placeholder() {
        let mut session = RoleplaySession::new(ScenarioConfig::default());
        session.add_text("Hello");

        session.abort_turn();
        assert_eq!(session.conversation().last(), Some(&Turn::assistant(INTERRUPTED_PLACEHOLDER)));
        assert_eq!(session.history().last_assistant(), Some(INTERRUPTED_PLACEHOLDER));

        // a second abort is a no-op, and the next turn does not duplicate the reply
        session.abort_turn();
        session.add_text("Are you there?");

        let roles: Vec<Role> = session.conversation().iter().map(|turn| turn.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn abort_keeps_partial_reply() {
        let mut session = RoleplaySession::new(ScenarioConfig::default());
        session.add_text("Hello");

        let mut history = session.history().clone();
        history.append_assistant("Hi there. I only have ");
        session.commit_history(history);
        session.abort_turn();

        assert_eq!(
            session.conversation().last(),
            Some(&Turn::assistant("Hi there. I only have"))
        );
    }
}
