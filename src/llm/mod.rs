//! LLM 层：Provider 抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_provider, DEEPSEEK_CHAT};
pub use mock::{MockProvider, ScriptedProvider, ScriptedTurn};
pub use openai::OpenAiProvider;
pub use traits::{error_stream, ChunkStream, Provider};
