//! 编排事件
//!
//! UiEvent：Core -> UI 的流式内容与副作用信号（逐 token、错误、完成、工具通知、
//! 文件树刷新）。WorkerEvent：Worker 任务 -> 编排器循环的内部通道，编排器是
//! 唯一消费者，轮状态因此单写者无竞争。

use crate::core::SlotId;

/// Core -> UI 的展示事件
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// 主智能体聊天面板的一个文本增量
    ChatToken(String),
    /// 主智能体流中的错误（仅终止该条流）
    ChatError(String),
    /// 主智能体一轮流式输出结束（含继续轮）
    ChatFinished,
    /// 立即工具执行通知：[tool] name: summary
    ToolNotice { name: String, summary: String },
    /// Worker 占用槽位开始执行
    WorkerStarted { slot: SlotId, name: String },
    /// Worker 面板的一个文本增量
    WorkerToken { slot: SlotId, text: String },
    /// Worker 流中的错误
    WorkerError { slot: SlotId, message: String },
    /// Worker 完成（成功或带错误），面板转为 done/error
    WorkerFinished { slot: SlotId, name: String, errored: bool },
    /// write_file 成功后的文件树刷新信号
    FileTreeRefresh,
}

/// Worker 任务 -> 编排器的完成/流式事件。每个 Worker 无论成败都恰好发出
/// 一条 Completed，join 谓词因此必然满足。
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Token {
        slot: SlotId,
        text: String,
    },
    Error {
        slot: SlotId,
        message: String,
    },
    Completed {
        agent_id: String,
        slot: SlotId,
        name: String,
        tool_call_id: String,
        result: String,
        errored: bool,
    },
}
