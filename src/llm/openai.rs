//! OpenAI 兼容 API Provider
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），原生流式
//! 工具调用增量按分片透出。请求构造或传输失败折叠为一条 Error chunk。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::agents::{ChatMessage, Role, StreamChunk};
use crate::core::AgentError;
use crate::llm::{error_stream, ChunkStream, Provider};
use crate::tools::ToolSpec;

/// OpenAI 兼容 Provider：持有 Client 与 model 名
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_request_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let content = m.content.clone().unwrap_or_default();
            let converted = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(content)
                        .build()?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()?,
                ),
                Role::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    if let Some(text) = &m.content {
                        builder.content(text.clone());
                    }
                    if !m.tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCalls> = m
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                ChatCompletionMessageToolCalls::Function(
                                    ChatCompletionMessageToolCall {
                                        id: tc.id.clone(),
                                        function: FunctionCall {
                                            name: tc.name.clone(),
                                            arguments: tc.arguments.clone(),
                                        },
                                    },
                                )
                            })
                            .collect();
                        builder.tool_calls(calls);
                    }
                    ChatCompletionRequestMessage::Assistant(builder.build()?)
                }
                Role::Tool => ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                        .content(content)
                        .build()?,
                ),
            };
            out.push(converted);
        }
        Ok(out)
    }

    fn to_request_tools(tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTools>, OpenAIError> {
        tools
            .iter()
            .map(|t| {
                Ok(ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObjectArgs::default()
                        .name(&t.name)
                        .description(&t.description)
                        .parameters(t.parameters.clone())
                        .build()?,
                }))
            })
            .collect()
    }

    fn build_request(
        &self,
        history: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(self.to_request_messages(history)?);
        if let Some(tools) = tools {
            if !tools.is_empty() {
                builder.tools(Self::to_request_tools(tools)?);
            }
        }
        builder.build()
    }
}

/// 一条流式响应拆出的 chunk 列表（文本增量 + 若干工具调用分片）
fn convert_response(resp: CreateChatCompletionStreamResponse) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    let Some(choice) = resp.choices.into_iter().next() else {
        return out;
    };
    let delta = choice.delta;
    if let Some(content) = delta.content {
        if !content.is_empty() {
            out.push(StreamChunk::Text { content });
        }
    }
    if let Some(tool_calls) = delta.tool_calls {
        for tc in tool_calls {
            out.push(StreamChunk::ToolCallFragment {
                name: tc.function.as_ref().and_then(|f| f.name.clone()),
                args_fragment: tc.function.as_ref().and_then(|f| f.arguments.clone()),
                call_id: tc.id,
                index: Some(tc.index),
            });
        }
    }
    out
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(&self, history: &[ChatMessage], tools: Option<&[ToolSpec]>) -> ChunkStream {
        let request = match self.build_request(history, tools) {
            Ok(r) => r,
            Err(e) => {
                return error_stream(AgentError::Transport(e.to_string()).to_string());
            }
        };

        let response = match self.client.chat().create_stream(request).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "chat stream request failed");
                return error_stream(AgentError::Transport(e.to_string()).to_string());
            }
        };

        // 传输层错误折叠为一条终止性 Error chunk，之后不再拉取底层流
        let chunks = stream::unfold(
            (response, false),
            |(mut response, errored)| async move {
                if errored {
                    return None;
                }
                match response.next().await {
                    Some(Ok(resp)) => {
                        Some((stream::iter(convert_response(resp)), (response, false)))
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "chat stream aborted");
                        let err = AgentError::Transport(e.to_string()).to_string();
                        Some((stream::iter(vec![StreamChunk::error(err)]), (response, true)))
                    }
                    None => None,
                }
            },
        )
        .flatten();

        Box::pin(chunks)
    }
}
