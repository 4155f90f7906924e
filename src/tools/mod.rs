//! 工具层：LLM 工具 schema、封闭路由枚举与立即执行的文件工具

pub mod filesystem;
pub mod schema;

pub use filesystem::{tool_summary, FileTools};
pub use schema::{builtin_tools, ToolKind, ToolSpec};
