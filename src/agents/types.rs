//! 流式输出原语：StreamChunk 与工具调用重组
//!
//! Provider 产出的每个增量都是一个 StreamChunk（文本 / 工具调用分片 / 错误）；
//! ToolCallAccumulator 按 index 归并分片，流结束后 finalize 得到完整的工具调用列表。

use std::collections::BTreeMap;

use serde_json::Value;

/// 一次流式响应中的单个增量
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// 文本增量
    Text { content: String },
    /// 工具调用分片：name / 参数片段 / call id 可能分散在多个分片中到达
    ToolCallFragment {
        name: Option<String>,
        args_fragment: Option<String>,
        call_id: Option<String>,
        index: Option<u32>,
    },
    /// 传输层错误，折叠为一条终止性 chunk（流随后正常结束）
    Error { message: String },
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// 归并完成的工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    /// JSON object；参数拼接解析失败时为 {"_raw": "<原始文本>"}
    pub arguments: Value,
}

impl AccumulatedToolCall {
    /// 读取字符串参数，缺失或类型不符时返回默认值
    pub fn str_arg<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    args_buffer: String,
}

/// 工具调用分片累加器：feed 按 index 归并，finalize 按 index 升序输出并清空。
/// 一次性使用——每个生成轮次配一个新的累加器。
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一个分片；非 ToolCallFragment 的 chunk 被忽略。
    /// id 与 name 一经设置不再清空；参数文本始终追加。
    pub fn feed(&mut self, chunk: &StreamChunk) {
        let StreamChunk::ToolCallFragment {
            name,
            args_fragment,
            call_id,
            index,
        } = chunk
        else {
            return;
        };
        let entry = self.calls.entry(index.unwrap_or(0)).or_default();
        if let Some(id) = call_id {
            if !id.is_empty() {
                entry.id = Some(id.clone());
            }
        }
        if let Some(name) = name {
            if !name.is_empty() {
                entry.name = name.clone();
            }
        }
        if let Some(fragment) = args_fragment {
            entry.args_buffer.push_str(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// 解析所有分片缓冲为完整调用，按 index 升序；内部状态随之清空。
    /// 参数缓冲不是合法 JSON 时保留 {"_raw": ...}，整轮不因此失败。
    pub fn finalize(&mut self) -> Vec<AccumulatedToolCall> {
        let calls = std::mem::take(&mut self.calls);
        calls
            .into_iter()
            .map(|(idx, entry)| {
                let arguments = if entry.args_buffer.is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&entry.args_buffer).unwrap_or_else(|_| {
                        serde_json::json!({ "_raw": entry.args_buffer })
                    })
                };
                AccumulatedToolCall {
                    id: entry.id.unwrap_or_else(|| format!("call_{idx}")),
                    name: entry.name,
                    arguments,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(
        name: Option<&str>,
        args: Option<&str>,
        id: Option<&str>,
        index: Option<u32>,
    ) -> StreamChunk {
        StreamChunk::ToolCallFragment {
            name: name.map(String::from),
            args_fragment: args.map(String::from),
            call_id: id.map(String::from),
            index,
        }
    }

    #[test]
    fn test_accumulate_interleaved_indices() {
        let mut acc = ToolCallAccumulator::new();
        // 两个 index 的分片交错到达，参数按到达顺序拼接
        acc.feed(&fragment(Some("delegate_task"), None, Some("call_b"), Some(1)));
        acc.feed(&fragment(Some("write_file"), Some("{\"pa"), Some("call_a"), Some(0)));
        acc.feed(&fragment(None, Some("{\"task\":"), None, Some(1)));
        acc.feed(&fragment(None, Some("th\":\"a.txt\"}"), None, Some(0)));
        acc.feed(&fragment(None, Some("\"t1\"}"), None, Some(1)));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "write_file");
        assert_eq!(calls[0].arguments["path"], "a.txt");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].arguments["task"], "t1");
    }

    #[test]
    fn test_missing_index_defaults_to_zero() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&fragment(Some("read_file"), Some("{}"), Some("c1"), None));
        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
    }

    #[test]
    fn test_invalid_json_kept_as_raw() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&fragment(Some("write_file"), Some("{invalid"), Some("c1"), Some(0)));
        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["_raw"], "{invalid");
    }

    #[test]
    fn test_missing_id_falls_back_to_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&fragment(Some("read_file"), None, None, Some(2)));
        let calls = acc.finalize();
        assert_eq!(calls[0].id, "call_2");
    }

    #[test]
    fn test_finalize_clears_state() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&fragment(Some("read_file"), Some("{}"), Some("c1"), Some(0)));
        assert_eq!(acc.finalize().len(), 1);
        assert!(acc.finalize().is_empty());
    }

    #[test]
    fn test_text_chunks_ignored() {
        let mut acc = ToolCallAccumulator::new();
        acc.feed(&StreamChunk::text("hello"));
        assert!(acc.is_empty());
    }
}
