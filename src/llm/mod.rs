//! LLM 模块
//!
//! 提供统一的流式 LLM 客户端，支持 OpenAI（含本地兼容服务）和 Anthropic API 格式。

mod anthropic;
mod client;
mod format;
mod openai;
mod transport;
mod types;

pub use client::LlmClient;
pub use format::local_base_url;
pub use types::*;
