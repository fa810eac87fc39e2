//! Rolling conversation history and prompt flattening.

use serde::{Deserialize, Serialize};

/// Turns kept per session; older ones are dropped first.
pub const MAX_HISTORY: usize = 20;

/// Speaker of a turn. Unknown roles read back as `Assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(other)]
    Assistant,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Self::User => "Human: ",
            Self::Assistant => "Assistant: ",
        }
    }
}

/// One message in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded, chronologically ordered conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, deserialize_with = "deserialize_history")]
    history: Vec<ConversationTurn>,
}

/// Accepts `null` as an empty history and trims oversized files on load.
fn deserialize_history<'de, D>(deserializer: D) -> Result<Vec<ConversationTurn>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mut history = Option::<Vec<ConversationTurn>>::deserialize(deserializer)?.unwrap_or_default();
    truncate_front(&mut history);
    Ok(history)
}

fn truncate_front(history: &mut Vec<ConversationTurn>) {
    if history.len() > MAX_HISTORY {
        let excess = history.len() - MAX_HISTORY;
        history.drain(..excess);
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session from existing turns, keeping the newest ones.
    #[must_use]
    pub fn from_turns(turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        let mut history: Vec<_> = turns.into_iter().collect();
        truncate_front(&mut history);
        Self { history }
    }

    #[must_use]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Append a turn, evicting the oldest beyond [`MAX_HISTORY`].
    pub fn push(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
        truncate_front(&mut self.history);
    }

    /// Record a completed exchange: the raw prompt and the reply.
    pub fn record_exchange(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        self.push(ConversationTurn::user(prompt));
        self.push(ConversationTurn::assistant(response));
    }

    /// Flatten the history and `new_prompt` into the text sent upstream.
    ///
    /// An empty history returns `new_prompt` unchanged.
    #[must_use]
    pub fn build_prompt(&self, new_prompt: &str) -> String {
        if self.history.is_empty() {
            return new_prompt.to_string();
        }

        let mut prompt = String::new();
        for turn in &self.history {
            prompt.push_str(turn.role.prefix());
            prompt.push_str(&turn.content);
            prompt.push_str("\n\n");
        }
        prompt.push_str(Role::User.prefix());
        prompt.push_str(new_prompt);

        prompt
    }
}
