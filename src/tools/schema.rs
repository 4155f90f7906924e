//! 工具 schema 与内置工具定义
//!
//! ToolSpec 是发给 LLM 的函数描述（JSON Schema 参数）；ToolKind 是编排器内部的
//! 封闭路由枚举——按名字解析，未知名字落入 Unknown，匹配处必须穷尽。

use serde::Serialize;
use serde_json::Value;

/// 发给 LLM 的工具定义：{name, description, parameters(JSON Schema)}
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// 已知工具的封闭枚举；delegate 走 Worker 派发，其余立即执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    DelegateTask,
    WriteFile,
    ReadFile,
    /// 模型幻觉出的名字：立即返回描述性错误结果，整轮继续
    Unknown,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "delegate_task" => Self::DelegateTask,
            "write_file" => Self::WriteFile,
            "read_file" => Self::ReadFile,
            _ => Self::Unknown,
        }
    }

    /// 是否立即执行（无需 Worker 派发）
    pub fn is_immediate(self) -> bool {
        !matches!(self, Self::DelegateTask)
    }
}

/// 主智能体的默认工具表：delegate_task / write_file / read_file
pub fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "delegate_task",
            "Delegate a self-contained sub-task to a worker agent. \
             Each worker runs independently and streams its output to a dedicated panel. \
             Use this when the user's request can be split into parallel sub-tasks. \
             Maximum 3 concurrent workers.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "description": "Clear, self-contained task description for the worker."
                    },
                    "worker_name": {
                        "type": "string",
                        "description": "Short label for the worker panel (e.g. 'Analyzer', 'Coder')."
                    }
                },
                "required": ["task", "worker_name"]
            }),
        ),
        ToolSpec::new(
            "write_file",
            "Write content to a file. Creates the file and parent directories if they don't exist. \
             Overwrites the file if it already exists.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path (relative to the workspace or absolute)."
                    },
                    "content": {
                        "type": "string",
                        "description": "Full content to write to the file."
                    }
                },
                "required": ["path", "content"]
            }),
        ),
        ToolSpec::new(
            "read_file",
            "Read the content of a file and return it.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path to read."
                    }
                },
                "required": ["path"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tools_names() {
        let names: Vec<String> = builtin_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["delegate_task", "write_file", "read_file"]);
    }

    #[test]
    fn test_tool_kind_routing() {
        assert_eq!(ToolKind::from_name("delegate_task"), ToolKind::DelegateTask);
        assert_eq!(ToolKind::from_name("write_file"), ToolKind::WriteFile);
        assert_eq!(ToolKind::from_name("read_file"), ToolKind::ReadFile);
        assert_eq!(ToolKind::from_name("rm_rf"), ToolKind::Unknown);
        assert!(ToolKind::from_name("write_file").is_immediate());
        assert!(!ToolKind::from_name("delegate_task").is_immediate());
    }
}
