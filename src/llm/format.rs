//! API 格式检测和端点拼接

/// API 格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    /// OpenAI Chat Completions API（本地推理服务同样使用此格式）
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
}

impl ApiFormat {
    /// 模型名包含 "claude" 时使用 Anthropic 格式，否则使用 OpenAI 格式
    pub fn from_model(model: &str) -> Self {
        if model.to_lowercase().contains("claude") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAi
        }
    }

    /// 聊天端点
    pub fn chat_endpoint(self, base_url: &str) -> String {
        match self {
            ApiFormat::OpenAi => v1_endpoint(base_url, "chat/completions"),
            ApiFormat::Anthropic => v1_endpoint(base_url, "messages"),
        }
    }
}

/// 本地推理服务的 base_url
pub fn local_base_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// 模型列表端点
pub fn models_endpoint(base_url: &str) -> String {
    v1_endpoint(base_url, "models")
}

/// 在 base_url 后拼接 `/v1/{path}`
///
/// 去掉末尾斜杠和路径中的重复斜杠；已包含 `/v1` 或完整路径时不重复。
fn v1_endpoint(base_url: &str, path: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    let url = match trimmed.split_once("://") {
        Some((scheme, rest)) => format!("{}://{}", scheme, rest.replace("//", "/")),
        None => trimmed.to_string(),
    };

    if url.ends_with(&format!("/{}", path)) {
        url
    } else if url.ends_with("/v1") {
        format!("{}/{}", url, path)
    } else {
        format!("{}/v1/{}", url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_model() {
        assert_eq!(ApiFormat::from_model("gpt-4o"), ApiFormat::OpenAi);
        assert_eq!(ApiFormat::from_model("deepseek-coder"), ApiFormat::OpenAi);
        assert_eq!(ApiFormat::from_model("Claude-3-Sonnet"), ApiFormat::Anthropic);
    }

    #[test]
    fn test_chat_endpoints() {
        let openai = ApiFormat::OpenAi;
        assert_eq!(
            openai.chat_endpoint("https://api.openai.com/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            openai.chat_endpoint("https://api.openai.com//v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            openai.chat_endpoint("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            ApiFormat::Anthropic.chat_endpoint("https://api.anthropic.com"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn test_local_models_endpoint() {
        assert_eq!(
            models_endpoint(&local_base_url(1234)),
            "http://localhost:1234/v1/models"
        );
    }
}
