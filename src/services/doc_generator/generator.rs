//! 生成适配器接口
//!
//! 文档生成流程只通过 [`TextGenerator`] 与文本生成服务交互；
//! 传输层不做超时以外的重试或退避。

use futures::future::BoxFuture;

use crate::llm::{LlmError, TokenUsage};

/// 生成请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_prompt: String,
}

/// 生成结果
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    /// 原始响应文本
    pub text: String,
    /// 本次调用的用量
    pub usage: TokenUsage,
}

/// 文本生成服务
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationOutput, LlmError>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用生成器

    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn usage() -> TokenUsage {
        TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            requests: 1,
        }
    }

    /// 按顺序返回预设响应，用完后返回传输错误
    #[derive(Default)]
    pub struct ScriptedGenerator {
        responses: Mutex<VecDeque<String>>,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> BoxFuture<'a, Result<GenerationOutput, LlmError>> {
            self.requests.lock().push(request.clone());
            let next = self.responses.lock().pop_front();
            async move {
                match next {
                    Some(text) => Ok(GenerationOutput {
                        text,
                        usage: usage(),
                    }),
                    None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
                }
            }
            .boxed()
        }
    }

    /// 原样返回 Prompt 中的代码块
    #[derive(Default)]
    pub struct EchoGenerator;

    impl TextGenerator for EchoGenerator {
        fn generate<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> BoxFuture<'a, Result<GenerationOutput, LlmError>> {
            let code = request
                .user_prompt
                .split("### Original code block:\n```python\n")
                .nth(1)
                .and_then(|rest| rest.split("\n```").next())
                .unwrap_or_default()
                .to_string();
            async move {
                Ok(GenerationOutput {
                    text: format!("{code}\n```\n<STOP>"),
                    usage: usage(),
                })
            }
            .boxed()
        }
    }
}
