//! Agent：对话历史所有权 + 单轮生成驱动
//!
//! 一个 Agent 独占一份 ConversationHistory，send / continue_after_tools 返回
//! 惰性的 Turn（一次拉取一个 chunk，随时可丢弃即取消）；流耗尽后由驱动方调用
//! finish_turn 把完整文本与归并后的工具调用写回历史。
//! 两个变体：main（默认带 delegate/write/read 工具表）与 worker（无工具、
//! 任务聚焦提示词、携带固定的 id / 名字 / 任务）。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;

use crate::agents::{
    AccumulatedToolCall, ChatMessage, ConversationHistory, StreamChunk, ToolCallAccumulator,
    ToolCallRecord,
};
use crate::llm::{ChunkStream, Provider};
use crate::tools::{builtin_tools, ToolSpec};

/// 主智能体系统提示词
const MAIN_SYSTEM_PROMPT: &str = "You are Hive, an AI development assistant running inside a \
terminal environment. Be concise, helpful, and precise. \
Format your responses for terminal readability.\n\n\
## Tools\n\n\
### delegate_task\n\
Delegate independent sub-tasks to worker agents (up to 3 parallel). \
Each worker executes in parallel and reports back. \
After all workers finish, summarize their combined results. \
Only delegate when the request genuinely benefits from parallel work.\n\n\
### write_file\n\
Write content to a file. Use this to create or overwrite files. \
You can combine with delegate_task: delegate sub-tasks first, \
then write the combined results to a file.\n\n\
### read_file\n\
Read the content of a file. Use this to inspect existing files.\n\n\
For simple questions, answer directly without using any tools.";

/// Worker 智能体系统提示词：单一任务，禁止反问
const WORKER_SYSTEM_PROMPT: &str = "You are a focused worker agent inside the Hive terminal \
environment. You have been assigned a specific task. Complete it thoroughly and concisely. \
Format your output for terminal readability. \
Do not ask follow-up questions - just execute the task.";

/// Worker 变体的固定身份信息，构造后不可变
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub id: String,
    pub display_name: String,
    pub task: String,
}

enum TurnState {
    /// 请求尚未发出；首个 next() 时 await Provider
    Pending(Pin<Box<dyn Future<Output = ChunkStream> + Send>>),
    Streaming(ChunkStream),
}

/// 一次进行中的生成轮：逐 chunk 拉取，内部同步累积文本与工具调用分片。
/// 不持有 Agent 的借用——丢弃 Turn 即取消本轮（历史不写入 assistant 消息）。
pub struct Turn {
    state: TurnState,
    text: String,
    accumulator: ToolCallAccumulator,
}

impl Turn {
    fn new(fut: Pin<Box<dyn Future<Output = ChunkStream> + Send>>) -> Self {
        Self {
            state: TurnState::Pending(fut),
            text: String::new(),
            accumulator: ToolCallAccumulator::new(),
        }
    }

    /// 拉取下一个 chunk；None 表示流耗尽。chunk 原样返回给调用方渲染。
    pub async fn next(&mut self) -> Option<StreamChunk> {
        loop {
            match &mut self.state {
                TurnState::Pending(fut) => {
                    let stream = fut.as_mut().await;
                    self.state = TurnState::Streaming(stream);
                }
                TurnState::Streaming(stream) => {
                    let chunk = stream.next().await?;
                    match &chunk {
                        StreamChunk::Text { content } => self.text.push_str(content),
                        StreamChunk::ToolCallFragment { .. } => self.accumulator.feed(&chunk),
                        StreamChunk::Error { .. } => {}
                    }
                    return Some(chunk);
                }
            }
        }
    }
}

/// 对话智能体：历史 + 本轮待处理工具调用
pub struct Agent {
    provider: Arc<dyn Provider>,
    history: ConversationHistory,
    pending_tool_calls: Vec<AccumulatedToolCall>,
    default_tools: Vec<ToolSpec>,
    identity: Option<WorkerIdentity>,
}

impl Agent {
    /// 主智能体：默认工具表 delegate_task / write_file / read_file
    pub fn main(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            history: ConversationHistory::new(MAIN_SYSTEM_PROMPT),
            pending_tool_calls: Vec::new(),
            default_tools: builtin_tools(),
            identity: None,
        }
    }

    /// Worker 智能体：无默认工具，任务聚焦提示词，身份固定
    pub fn worker(
        provider: Arc<dyn Provider>,
        id: impl Into<String>,
        display_name: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            history: ConversationHistory::new(WORKER_SYSTEM_PROMPT),
            pending_tool_calls: Vec::new(),
            default_tools: Vec::new(),
            identity: Some(WorkerIdentity {
                id: id.into(),
                display_name: display_name.into(),
                task: task.into(),
            }),
        }
    }

    pub fn identity(&self) -> Option<&WorkerIdentity> {
        self.identity.as_ref()
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.history.messages()
    }

    pub fn pending_tool_calls(&self) -> &[AccumulatedToolCall] {
        &self.pending_tool_calls
    }

    /// 追加 user 消息并发起新一轮生成；本轮暂存的工具调用随之清空
    pub fn send(&mut self, user_input: &str, tools: Option<&[ToolSpec]>) -> Turn {
        self.history.push(ChatMessage::user(user_input));
        self.start_turn(tools)
    }

    /// 工具结果注入完毕后恢复生成；与 send 相同但不追加 user 消息
    pub fn continue_after_tools(&mut self, tools: Option<&[ToolSpec]>) -> Turn {
        self.start_turn(tools)
    }

    /// 注入一条工具结果消息，通过 call id 关联
    pub fn add_tool_result(&mut self, tool_call_id: &str, result: &str) {
        self.history.push(ChatMessage::tool(tool_call_id, result));
    }

    /// 流耗尽后结算：有输出则追加 assistant 消息（纯工具调用时 content 为 None），
    /// 归并后的调用列表成为新的 pending_tool_calls。
    pub fn finish_turn(&mut self, mut turn: Turn) {
        let calls = turn.accumulator.finalize();
        if turn.text.is_empty() && calls.is_empty() {
            return;
        }
        let content = if turn.text.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut turn.text))
        };
        let records: Vec<ToolCallRecord> = calls.iter().map(ToolCallRecord::from).collect();
        self.history.push(ChatMessage::assistant(content, records));
        self.pending_tool_calls = calls;
    }

    fn start_turn(&mut self, tools: Option<&[ToolSpec]>) -> Turn {
        self.pending_tool_calls.clear();

        // 调用方未指定工具时使用本变体的默认工具表（worker 为空表 → 不带工具）
        let effective: Option<Vec<ToolSpec>> = match tools {
            Some(t) => Some(t.to_vec()),
            None if self.default_tools.is_empty() => None,
            None => Some(self.default_tools.clone()),
        };

        let provider = Arc::clone(&self.provider);
        let history = self.history.messages().to_vec();
        Turn::new(Box::pin(async move {
            provider.stream(&history, effective.as_deref()).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Role;
    use crate::llm::{ScriptedProvider, ScriptedTurn};

    fn tool_fragment(name: Option<&str>, args: Option<&str>, id: Option<&str>, index: u32) -> StreamChunk {
        StreamChunk::ToolCallFragment {
            name: name.map(String::from),
            args_fragment: args.map(String::from),
            call_id: id.map(String::from),
            index: Some(index),
        }
    }

    async fn drain(turn: &mut Turn) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = turn.next().await {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_send_accumulates_fragmented_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new().script(
            "split this",
            ScriptedTurn::new(vec![
                tool_fragment(Some("delegate_task"), Some("{\"task\":\"a\","), Some("call_1"), 0),
                tool_fragment(None, Some("\"worker_name\":\"W\"}"), None, 0),
            ]),
        ));
        let mut agent = Agent::main(provider);
        let mut turn = agent.send("split this", None);
        assert_eq!(drain(&mut turn).await.len(), 2);
        agent.finish_turn(turn);

        assert_eq!(agent.pending_tool_calls().len(), 1);
        let call = &agent.pending_tool_calls()[0];
        assert_eq!(call.name, "delegate_task");
        assert_eq!(call.arguments["task"], "a");

        // 历史：system, user, assistant(tool_calls, content=None)
        let history = agent.history();
        assert_eq!(history.len(), 3);
        let assistant = &history[2];
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.content.is_none());
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].id, "call_1");
    }

    #[tokio::test]
    async fn test_tool_results_then_continue() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .script(
                    "go",
                    ScriptedTurn::new(vec![
                        tool_fragment(Some("delegate_task"), Some("{}"), Some("c1"), 0),
                        tool_fragment(Some("delegate_task"), Some("{}"), Some("c2"), 1),
                    ]),
                )
                .script("go", ScriptedTurn::new(vec![StreamChunk::text("summary")])),
        );
        let mut agent = Agent::main(provider);
        let mut turn = agent.send("go", None);
        drain(&mut turn).await;
        agent.finish_turn(turn);
        assert_eq!(agent.pending_tool_calls().len(), 2);

        agent.add_tool_result("c1", "done-1");
        agent.add_tool_result("c2", "done-2");

        let mut cont = agent.continue_after_tools(None);
        // continue 开始时即清空暂存调用
        assert!(agent.pending_tool_calls().is_empty());
        drain(&mut cont).await;
        agent.finish_turn(cont);

        let roles: Vec<Role> = agent.history().iter().map(|m| m.role.clone()).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Tool,
                Role::Assistant
            ]
        );
        assert_eq!(agent.history()[5].content.as_deref(), Some("summary"));
        assert!(agent.pending_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_main_injects_default_tools_worker_does_not() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .script("hi", ScriptedTurn::new(vec![StreamChunk::text("ok")]))
                .script("task", ScriptedTurn::new(vec![StreamChunk::text("ok")])),
        );
        let mut main = Agent::main(Arc::clone(&provider) as Arc<dyn Provider>);
        let mut turn = main.send("hi", None);
        drain(&mut turn).await;

        let mut worker = Agent::worker(
            Arc::clone(&provider) as Arc<dyn Provider>,
            "w1",
            "Worker",
            "task",
        );
        let identity = worker.identity().unwrap().clone();
        assert_eq!(identity.id, "w1");
        assert_eq!(identity.display_name, "Worker");
        assert_eq!(identity.task, "task");
        assert!(main.identity().is_none());

        let mut turn = worker.send("task", None);
        drain(&mut turn).await;

        assert_eq!(provider.seen_tools(), vec![Some(3), None]);
    }

    #[tokio::test]
    async fn test_error_chunk_does_not_pollute_history() {
        let provider = Arc::new(ScriptedProvider::new().script(
            "boom",
            ScriptedTurn::new(vec![StreamChunk::error("connection reset")]),
        ));
        let mut agent = Agent::main(provider);
        let mut turn = agent.send("boom", None);
        let chunks = drain(&mut turn).await;
        assert!(matches!(chunks[0], StreamChunk::Error { .. }));
        agent.finish_turn(turn);

        // 无文本无工具调用 → 不追加 assistant 消息
        assert_eq!(agent.history().len(), 2);
        assert!(agent.pending_tool_calls().is_empty());
    }
}
