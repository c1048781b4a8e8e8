//! LLM 服务封装
//!
//! 把 LlmClient 适配为文档生成使用的 [`TextGenerator`]，与配置系统集成

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::debug;

use crate::config::AppConfig;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::services::doc_generator::{GenerationOutput, GenerationRequest, TextGenerator};

/// 基于 LLM 客户端的生成器
pub struct LlmGenerator {
    client: Arc<LlmClient>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    stop: Vec<String>,
}

impl LlmGenerator {
    pub fn new(client: Arc<LlmClient>, model: String, config: &AppConfig) -> Self {
        Self {
            client,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop: config.stop_markers.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(request.system_instruction.as_str()),
            ChatMessage::user(request.user_prompt.as_str()),
        ]
    }

    fn options(&self) -> ChatOptions {
        ChatOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            stop: self.stop.clone(),
        }
    }
}

impl TextGenerator for LlmGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationOutput, LlmError>> {
        async move {
            let result = self
                .client
                .stream_and_collect(Self::build_messages(request), &self.model, self.options())
                .await?;
            debug!(
                "LLM response: {} chunks, finish_reason={:?}, {} tokens",
                result.chunk_count,
                result.finish_reason,
                result.usage.total_tokens()
            );
            Ok(GenerationOutput {
                text: result.content,
                usage: result.usage,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_mapping() {
        let client = Arc::new(LlmClient::new("", "http://localhost:1234").unwrap());
        let config = AppConfig {
            temperature: 0.1,
            max_tokens: 512,
            ..AppConfig::default()
        };
        let generator = LlmGenerator::new(client, "local-model".to_string(), &config);
        assert_eq!(generator.model(), "local-model");

        let request = GenerationRequest {
            system_instruction: "sys".to_string(),
            user_prompt: "user".to_string(),
        };
        let messages = LlmGenerator::build_messages(&request);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "user");

        let options = generator.options();
        assert_eq!(options.max_tokens, Some(512));
        assert_eq!(options.stop, vec!["<STOP>", "<|EOT|>"]);
    }
}
