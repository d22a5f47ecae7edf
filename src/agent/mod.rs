//! Conversational agent: memory, backends, tools, and the dialogue engine

pub mod backend;
pub mod engine;
pub mod memory;
pub mod openai;
pub mod retrieval;
pub mod tools;

pub use backend::{ChatBackend, ChatEvent, ChatEventStream};
pub use engine::{DialogueEngine, ResponseToken, TokenStream, MAX_TOOL_ROUNDS};
pub use memory::{ConversationState, ConversationStore, InMemoryStore, Message, MessageRole, ToolCall};
pub use openai::OpenAiBackend;
pub use retrieval::{ContextRetriever, StaticContextRetriever};
pub use tools::{ToolDefinition, ToolRegistry};
