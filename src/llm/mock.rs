//! Mock Provider（无需 API Key）
//!
//! MockProvider 在未配置任何 Key 时回显用户输入，便于本地跑通整个编排流程；
//! ScriptedProvider 供测试按「最后一条 user 消息」回放精确的 chunk 脚本，
//! 可模拟分片工具调用、传输错误与不同的完成时序。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::agents::{ChatMessage, Role, StreamChunk};
use crate::llm::{ChunkStream, Provider};
use crate::tools::ToolSpec;

/// 回显时每个文本 chunk 的字符数（模拟真实流式输出）
const MOCK_CHUNK_CHARS: usize = 6;

fn last_user_content(history: &[ChatMessage]) -> String {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

/// Mock Provider：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockProvider;

#[async_trait]
impl Provider for MockProvider {
    async fn stream(&self, history: &[ChatMessage], _tools: Option<&[ToolSpec]>) -> ChunkStream {
        let reply = format!(
            "(mock) You said: {}. Set OPENAI_API_KEY or DEEPSEEK_API_KEY to talk to a real model.",
            last_user_content(history)
        );
        let chars: Vec<char> = reply.chars().collect();
        let chunks: Vec<StreamChunk> = chars
            .chunks(MOCK_CHUNK_CHARS)
            .map(|c| StreamChunk::text(c.iter().collect::<String>()))
            .collect();
        Box::pin(stream::iter(chunks))
    }
}

/// 一段脚本：可选的起始延迟 + 依次产出的 chunk 列表
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub delay_ms: u64,
    pub chunks: Vec<StreamChunk>,
}

impl ScriptedTurn {
    pub fn new(chunks: Vec<StreamChunk>) -> Self {
        Self { delay_ms: 0, chunks }
    }

    pub fn with_delay(delay_ms: u64, chunks: Vec<StreamChunk>) -> Self {
        Self { delay_ms, chunks }
    }
}

/// 脚本化 Provider：按最后一条 user 消息内容选择脚本队列，每次调用弹出一段。
/// 同一 key 的多段脚本依调用次序回放（主智能体的 send 与 continue 共享 key）。
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedTurn>>>,
    /// 每次 stream 调用携带的工具数（None = 未带工具），供测试断言
    seen_tools: Mutex<Vec<Option<usize>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某条 user 消息内容注册一段脚本（可多次调用追加）
    pub fn script(self, key: &str, turn: ScriptedTurn) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(turn);
        self
    }

    pub fn seen_tools(&self) -> Vec<Option<usize>> {
        self.seen_tools.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream(&self, history: &[ChatMessage], tools: Option<&[ToolSpec]>) -> ChunkStream {
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.map(<[ToolSpec]>::len));

        let key = last_user_content(history);
        let turn = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        let Some(turn) = turn else {
            tracing::warn!(key = %key, "no scripted turn for prompt");
            return Box::pin(stream::iter(Vec::new()));
        };

        let ScriptedTurn { delay_ms, chunks } = turn;
        Box::pin(
            stream::once(async move {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                stream::iter(chunks)
            })
            .flatten(),
        )
    }
}
