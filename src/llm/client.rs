//! 统一 LLM 客户端

use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

use super::anthropic::stream_anthropic;
use super::format::{models_endpoint, ApiFormat};
use super::openai::stream_openai;
use super::transport::send_checked;
use super::types::{ChatChunk, ChatMessage, ChatOptions, LlmError, StreamCollectResult, TokenUsage};

/// 统一 LLM 客户端
///
/// 支持 OpenAI 和 Anthropic API 格式，根据模型名称自动选择。
/// `api_key` 为空时视为本地推理服务，请求不携带鉴权头。
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, LlmError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(LlmError::ConfigError("base_url is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(LlmError::HttpError)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 流式聊天（自动检测 API 格式）
    pub fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        options: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>> {
        let api_format = ApiFormat::from_model(model);
        debug!("LLM request: model={}, api_format={:?}", model, api_format);

        match api_format {
            ApiFormat::OpenAi => stream_openai(
                &self.client,
                &self.api_key,
                &self.base_url,
                messages,
                model,
                &options,
            ),
            ApiFormat::Anthropic => stream_anthropic(
                &self.client,
                &self.api_key,
                &self.base_url,
                messages,
                model,
                &options,
            ),
        }
    }

    /// 流式请求并收集完整响应
    ///
    /// 用量块可能出现多次（Anthropic 分别在开始和结束时给出），按字段取最大值。
    pub async fn stream_and_collect(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        options: ChatOptions,
    ) -> Result<StreamCollectResult, LlmError> {
        let mut stream = self.stream_chat(messages, model, options);
        let mut result = StreamCollectResult {
            usage: TokenUsage {
                requests: 1,
                ..TokenUsage::default()
            },
            ..StreamCollectResult::default()
        };

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            result.chunk_count += 1;

            if let Some(content) = chunk.content {
                result.content.push_str(&content);
            }
            if let Some(usage) = chunk.usage {
                merge_usage(&mut result.usage, usage);
            }
            if chunk.finish_reason.is_some() {
                result.finish_reason = chunk.finish_reason;
            }
        }

        Ok(result)
    }

    /// 查询服务端加载的模型列表
    ///
    /// 用于本地推理服务：配置中未指定模型时取第一个。
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let endpoint = models_endpoint(&self.base_url);
        let mut request = self.client.get(&endpoint);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = send_checked(request, "Models").await?;
        let body = response.text().await?;
        let models = parse_model_ids(&body)?;
        info!("Found {} model(s) at {}", models.len(), endpoint);
        Ok(models)
    }
}

fn merge_usage(total: &mut TokenUsage, chunk: TokenUsage) {
    total.prompt_tokens = total.prompt_tokens.max(chunk.prompt_tokens);
    total.completion_tokens = total.completion_tokens.max(chunk.completion_tokens);
}

fn parse_model_ids(body: &str) -> Result<Vec<String>, LlmError> {
    let list: ModelList = serde_json::from_str(body)?;
    if list.data.is_empty() {
        return Err(LlmError::InvalidResponse("model list is empty".to_string()));
    }
    Ok(list.data.into_iter().map(|m| m.id).collect())
}
