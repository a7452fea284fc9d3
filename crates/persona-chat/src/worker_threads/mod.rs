pub mod conversation_worker;
pub mod llm_worker;
pub use conversation_worker::{
    ChatReply, ConversationCommand, ConversationHandle, ConversationWorker, GameUpdate, SessionStats,
};
pub use llm_worker::{HttpEmbedder, LLMWorker, LLMWorkerSettings};
