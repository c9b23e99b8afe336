//! Conversation turns exchanged with the chat front-end.
//!
//! The front-end owns history persistence; it sends prior turns with every
//! query and the core never stores them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One prior message. Serialized as `{"role": "user", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Turn {
    User(String),
    Assistant(String),
}

impl Turn {
    pub fn content(&self) -> &str {
        match self {
            Turn::User(c) | Turn::Assistant(c) => c,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Turn::User(_) => "user",
            Turn::Assistant(_) => "assistant",
        }
    }
}

/// A user question plus the ordered turns that preceded it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), history: Vec::new() }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidMessage("query text is empty".to_string()));
        }
        for (i, turn) in self.history.iter().enumerate() {
            if turn.content().trim().is_empty() {
                let role = turn.role();
                return Err(Error::InvalidMessage(format!(
                    "history turn {i} ({role}) has empty content"
                )));
            }
        }
        Ok(())
    }
}

/// Parse and validate a JSON array of turns as sent by the front-end.
pub fn parse_history(json: &str) -> Result<Vec<Turn>> {
    let turns: Vec<Turn> =
        serde_json::from_str(json).map_err(|e| Error::InvalidMessage(e.to_string()))?;
    if let Some(i) = turns.iter().position(|t| t.content().trim().is_empty()) {
        return Err(Error::InvalidMessage(format!("history turn {i} has empty content")));
    }
    Ok(turns)
}

/// Keep only the most recent `max` turns.
pub fn trim_history(history: &[Turn], max: usize) -> &[Turn] {
    &history[history.len().saturating_sub(max)..]
}
