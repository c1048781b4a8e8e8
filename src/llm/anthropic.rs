//! Anthropic Messages API 流式实现

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

use super::format::ApiFormat;
use super::transport::{send_checked, SseBuffer, SseFrame};
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError, TokenUsage};

/// Anthropic 请求载荷
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic SSE 事件
#[derive(Deserialize, Debug)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    message: Option<AnthropicMessageStart>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AnthropicMessageStart {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize, Debug, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicUsage {
    fn to_usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            requests: 0,
        }
    }
}

/// 解析一个 `data:` 负载
///
/// 输入 token 在 `message_start` 中给出，输出 token 和停止原因在 `message_delta` 中给出。
fn parse_event(data: &str) -> SseFrame {
    let event = match serde_json::from_str::<AnthropicEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            debug!("Failed to parse Anthropic response: {}, data: {}", e, data);
            return SseFrame::Skip;
        }
    };

    let chunk = match event.event_type.as_str() {
        "message_start" => ChatChunk {
            usage: event.message.and_then(|m| m.usage).map(|u| u.to_usage()),
            ..ChatChunk::default()
        },
        "content_block_delta" => ChatChunk {
            content: event
                .delta
                .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
                .and_then(|d| d.text),
            ..ChatChunk::default()
        },
        "message_delta" => ChatChunk {
            finish_reason: event.delta.and_then(|d| d.stop_reason),
            usage: event.usage.map(|u| u.to_usage()),
            ..ChatChunk::default()
        },
        "message_stop" => return SseFrame::Done,
        _ => return SseFrame::Skip,
    };

    if chunk.content.is_none() && chunk.finish_reason.is_none() && chunk.usage.is_none() {
        SseFrame::Skip
    } else {
        SseFrame::Chunk(chunk)
    }
}

/// 把系统消息拆到 `system` 字段
fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system = None;
    let mut rest = Vec::new();
    for msg in messages {
        if msg.role == "system" {
            system = Some(msg.content);
        } else {
            rest.push(AnthropicMessage {
                role: msg.role,
                content: msg.content,
            });
        }
    }
    (system, rest)
}

/// 流式调用 Anthropic API
pub fn stream_anthropic(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = ApiFormat::Anthropic.chat_endpoint(base_url);
    let (system, messages) = split_system(messages);
    let payload = AnthropicRequest {
        model: model.to_string(),
        messages,
        system,
        stream: true,
        max_tokens: options.max_tokens.unwrap_or(4096),
        temperature: options.temperature,
        stop_sequences: options.stop.clone(),
    };

    debug!("Anthropic API request: endpoint={}, model={}", endpoint, model);
    let request = client
        .post(&endpoint)
        .header("Content-Type", "application/json")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&payload);

    Box::pin(try_stream! {
        let response = send_checked(request, "Anthropic").await?;
        let mut sse = SseBuffer::default();
        let mut body = response.bytes_stream();

        while let Some(bytes) = body.next().await {
            for data in sse.push(&bytes?) {
                match parse_event(&data) {
                    SseFrame::Chunk(chunk) => {
                        yield chunk;
                    }
                    SseFrame::Done => return,
                    SseFrame::Skip => {}
                }
            }
        }
    })
}
