//! OpenAI Chat Completions API 流式实现
//!
//! 同时用于 OpenAI 兼容的本地推理服务（LM Studio、llama.cpp server 等）。

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

use super::format::ApiFormat;
use super::transport::{send_checked, SseBuffer, SseFrame};
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError, TokenUsage};

/// OpenAI 请求载荷
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// OpenAI SSE 响应块
#[derive(Deserialize, Debug)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// 解析一个 `data:` 负载
fn parse_data(data: &str) -> SseFrame {
    if data == "[DONE]" {
        return SseFrame::Done;
    }
    let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Failed to parse OpenAI response: {}, data: {}", e, data);
            return SseFrame::Skip;
        }
    };

    let usage = chunk.usage.map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        requests: 0,
    });
    let (content, finish_reason) = chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| (choice.delta.content, choice.finish_reason))
        .unwrap_or_default();

    if content.is_none() && finish_reason.is_none() && usage.is_none() {
        return SseFrame::Skip;
    }
    SseFrame::Chunk(ChatChunk {
        content,
        finish_reason,
        usage,
    })
}

/// 流式调用 OpenAI API
pub fn stream_openai(
    client: &Client,
    api_key: &str,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: &str,
    options: &ChatOptions,
) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
    let endpoint = ApiFormat::OpenAi.chat_endpoint(base_url);
    let payload = OpenAiRequest {
        model: model.to_string(),
        messages,
        stream: true,
        stream_options: StreamOptions { include_usage: true },
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stop: options.stop.clone(),
    };

    let mut request = client
        .post(&endpoint)
        .header("Content-Type", "application/json");
    // 本地服务不需要鉴权
    if !api_key.is_empty() {
        request = request.header("Authorization", format!("Bearer {}", api_key));
    }
    debug!("OpenAI API request: endpoint={}, model={}", endpoint, model);
    let request = request.json(&payload);

    Box::pin(try_stream! {
        let response = send_checked(request, "OpenAI").await?;
        let mut sse = SseBuffer::default();
        let mut body = response.bytes_stream();

        while let Some(bytes) = body.next().await {
            for data in sse.push(&bytes?) {
                match parse_data(&data) {
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
