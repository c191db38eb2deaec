mod store;

pub use store::{ConversationStore, ConversationTurn, MemoryConversationStore, TurnRole};

#[cfg(feature = "redis-store")]
pub use store::redis::RedisConversationStore;
