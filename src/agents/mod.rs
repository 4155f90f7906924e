//! 智能体层：流式原语、对话历史与 Agent 本体

pub mod agent;
pub mod history;
pub mod types;

pub use agent::{Agent, Turn, WorkerIdentity};
pub use history::{ChatMessage, ConversationHistory, Role, ToolCallRecord};
pub use types::{AccumulatedToolCall, StreamChunk, ToolCallAccumulator};
