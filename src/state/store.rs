use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }
}

/// One turn of a conversation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Source of prior turns. The orchestrator only reads; callers persist.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Last `limit` turns, oldest first.
    async fn recent_turns(&self, conversation_id: &str, limit: usize)
        -> Result<Vec<ConversationTurn>>;
    async fn append(&self, conversation_id: &str, turn: ConversationTurn) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryConversationStore {
    inner: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let guard = self.inner.read();
        let turns = match guard.get(conversation_id) {
            Some(turns) => turns,
            None => return Ok(Vec::new()),
        };
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn append(&self, conversation_id: &str, turn: ConversationTurn) -> Result<()> {
        self.inner
            .write()
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn);
        Ok(())
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;
    use crate::error::ToolFlowError;
    use redis::AsyncCommands;

    /// One Redis list per conversation, each element a JSON-encoded turn.
    pub struct RedisConversationStore {
        client: redis::Client,
        prefix: String,
    }

    impl RedisConversationStore {
        pub fn new(client: redis::Client) -> Self {
            Self {
                client,
                prefix: "toolflow:conversation:".to_string(),
            }
        }

        pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
            self.prefix = prefix.into();
            self
        }

        fn key(&self, conversation_id: &str) -> String {
            format!("{}{}", self.prefix, conversation_id)
        }

        async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| ToolFlowError::Context(e.to_string()))
        }
    }

    #[async_trait]
    impl ConversationStore for RedisConversationStore {
        async fn recent_turns(
            &self,
            conversation_id: &str,
            limit: usize,
        ) -> Result<Vec<ConversationTurn>> {
            if limit == 0 {
                return Ok(Vec::new());
            }
            let mut conn = self.connection().await?;
            let start = -(limit as isize);
            let raw: Vec<String> = conn
                .lrange(self.key(conversation_id), start, -1)
                .await
                .map_err(|e| ToolFlowError::Context(e.to_string()))?;
            raw.iter()
                .map(|item| serde_json::from_str(item).map_err(ToolFlowError::from))
                .collect()
        }

        async fn append(&self, conversation_id: &str, turn: ConversationTurn) -> Result<()> {
            let mut conn = self.connection().await?;
            let encoded = serde_json::to_string(&turn)?;
            let _: () = conn
                .rpush(self.key(conversation_id), encoded)
                .await
                .map_err(|e| ToolFlowError::Context(e.to_string()))?;
            Ok(())
        }
    }
}
