//! 立即执行的文件工具
//!
//! write_file / read_file 在编排器所在任务内同步完成，结果一律是字符串
//! （成功消息或 "Error ...: " 前缀的错误消息），I/O 失败从不向上冒泡——
//! 整轮必须继续，join 协议依赖每个调用都有结果。

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::agents::AccumulatedToolCall;

/// read_file 结果的最大字符数，超出部分截断并附加说明
const READ_FILE_MAX_CHARS: usize = 10_000;

/// 文件工具：相对路径基于 workspace 解析，绝对路径原样使用
#[derive(Debug, Clone)]
pub struct FileTools {
    workspace: PathBuf,
}

impl FileTools {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace.join(p)
        }
    }

    /// 写文件：按需创建父目录，覆盖已有内容
    pub fn write_file(&self, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or("");
        if path.is_empty() {
            return "Error: path is required".to_string();
        }
        let content = args.get("content").and_then(Value::as_str).unwrap_or("");
        let resolved = self.resolve(path);
        tracing::info!(path = %resolved.display(), chars = content.chars().count(), "write_file");

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = resolved.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&resolved, content)
        })();

        match result {
            Ok(()) => format!(
                "Wrote {} chars to {}",
                content.chars().count(),
                resolved.display()
            ),
            Err(e) => format!("Error writing file: {e}"),
        }
    }

    /// 读文件：超过 10000 字符时截断并附加总长说明
    pub fn read_file(&self, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or("");
        if path.is_empty() {
            return "Error: path is required".to_string();
        }
        let resolved = self.resolve(path);
        tracing::info!(path = %resolved.display(), "read_file");

        match std::fs::read_to_string(&resolved) {
            Ok(text) => {
                let total = text.chars().count();
                if total > READ_FILE_MAX_CHARS {
                    let head: String = text.chars().take(READ_FILE_MAX_CHARS).collect();
                    format!("{head}\n... (truncated, {total} chars total)")
                } else {
                    text
                }
            }
            Err(e) => format!("Error reading file: {e}"),
        }
    }
}

/// 聊天面板里 [tool] 通知的一行摘要：文件工具显示路径，其余显示截断后的参数
pub fn tool_summary(call: &AccumulatedToolCall) -> String {
    match call.name.as_str() {
        "write_file" | "read_file" => call.str_arg("path", "?").to_string(),
        _ => {
            let args = call.arguments.to_string();
            args.chars().take(80).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_creates_parents_and_reports_chars() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FileTools::new(dir.path());
        let result = tools.write_file(&json!({"path": "sub/dir/notes.txt", "content": "hello"}));
        assert!(result.starts_with("Wrote 5 chars to "), "{result}");
        let written = std::fs::read_to_string(dir.path().join("sub/dir/notes.txt")).unwrap();
        assert_eq!(written, "hello");
    }

    #[test]
    fn test_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FileTools::new(dir.path());
        tools.write_file(&json!({"path": "a.txt", "content": "first"}));
        tools.write_file(&json!({"path": "a.txt", "content": "second"}));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_write_requires_path() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FileTools::new(dir.path());
        assert_eq!(
            tools.write_file(&json!({"content": "x"})),
            "Error: path is required"
        );
    }

    #[test]
    fn test_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FileTools::new(dir.path());
        std::fs::write(dir.path().join("r.txt"), "content here").unwrap();
        assert_eq!(tools.read_file(&json!({"path": "r.txt"})), "content here");
    }

    #[test]
    fn test_read_truncates_long_files() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FileTools::new(dir.path());
        let long = "x".repeat(12_000);
        std::fs::write(dir.path().join("big.txt"), &long).unwrap();
        let result = tools.read_file(&json!({"path": "big.txt"}));
        assert!(result.ends_with("... (truncated, 12000 chars total)"), "{result}");
        assert!(result.starts_with(&"x".repeat(100)));
    }

    #[test]
    fn test_read_missing_file_is_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FileTools::new(dir.path());
        let result = tools.read_file(&json!({"path": "absent.txt"}));
        assert!(result.starts_with("Error reading file: "), "{result}");
    }

    #[test]
    fn test_tool_summary_prefers_path() {
        let call = AccumulatedToolCall {
            id: "c1".into(),
            name: "write_file".into(),
            arguments: json!({"path": "a.txt", "content": "..."}),
        };
        assert_eq!(tool_summary(&call), "a.txt");
    }
}
