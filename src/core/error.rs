//! 核心错误分类
//!
//! 本层没有任何致命错误：传输失败变成 Error chunk 终止单条流；工具参数解析
//! 失败在累加器里以 {"_raw": ...} 兜底；文件 I/O 失败与未知工具名折叠为
//! 错误字符串结果。这里只保留真正需要跨模块传递的错误值。

use thiserror::Error;

/// 编排过程中出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 传输层失败（请求构造 / 网络 / 流中断），折叠为 Error chunk
    #[error("Transport error: {0}")]
    Transport(String),

    /// 委派超出 3 个并发 Worker 的容量；合成错误结果注入，整轮继续
    #[error("No free worker panel. Max 3 concurrent agents.")]
    CapacityExceeded,

    /// 模型调用了不存在的工具；返回描述性结果，整轮继续
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}
