//! Hive - 终端多智能体工作台
//!
//! 一个主智能体 + 最多 3 个并发 Worker 智能体，共用流式 LLM 后端。
//! 模块划分：
//! - **agents**: 流式原语（chunk / 工具调用累加器）、对话历史与 Agent 本体
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器（join/continuation 状态机）、槽位池、状态与事件
//! - **llm**: Provider 抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **tools**: 工具 schema、封闭路由枚举与文件工具
//! - **ui**: Ratatui TUI 界面

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod tools;
pub mod ui;
