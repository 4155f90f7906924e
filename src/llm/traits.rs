//! Provider 抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 Provider：给定历史与可选工具
//! schema，返回惰性 chunk 流。传输失败一律折叠为一条 Error chunk，流正常结束，
//! 调用方永远不需要处理传输异常。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};

use crate::agents::{ChatMessage, StreamChunk};
use crate::tools::ToolSpec;

/// 惰性 chunk 流：一次产出一个，流内严格保序
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// LLM Provider trait：流式补全
#[async_trait]
pub trait Provider: Send + Sync {
    /// 发起一次流式补全。工具调用分片按传输层原样透出，不做任何预归并——
    /// 归并是 ToolCallAccumulator 的职责。
    async fn stream(&self, history: &[ChatMessage], tools: Option<&[ToolSpec]>) -> ChunkStream;
}

/// 单条错误 chunk 构成的流（请求构造失败等场景）
pub fn error_stream(message: impl Into<String>) -> ChunkStream {
    Box::pin(stream::iter(vec![StreamChunk::error(message)]))
}
