//! 状态投影
//!
//! UI 只持有轻量的 UiState 快照（阶段、状态行文本、模型名、输入锁、token 估算）；
//! 完整的编排状态由 Orchestrator 维护，流式内容走事件通道。

use serde::Serialize;

/// 主智能体所处阶段（UI 投影用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Idle,
    /// 主智能体流式生成中
    Thinking,
    /// 等待已派发的 Worker 回报
    Delegating,
    /// 工具结果注入完毕，主智能体汇总中
    Synthesizing,
}

/// UI 看到的「投影」状态
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: AgentPhase,
    /// 状态行文本（"Thinking..." / "Delegating 2 task(s)..." / "Synthesizing..." / "Ready"）
    pub status: String,
    pub model: String,
    /// 委派轮进行中时锁定输入；主智能体流式期间不锁（新输入会取消并替换当前轮）
    pub input_locked: bool,
    /// 本轮输出的粗略 token 估算（字符数 / 4）
    pub tokens: u64,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: AgentPhase::Idle,
            status: "Ready".to_string(),
            model: String::new(),
            input_locked: false,
            tokens: 0,
        }
    }
}
