//! HTTP 与 SSE 公共处理

use reqwest::{RequestBuilder, Response};
use tracing::error;

use super::types::{ChatChunk, LlmError};

/// 单个 SSE `data:` 负载的解析结果
#[derive(Debug)]
pub(super) enum SseFrame {
    Chunk(ChatChunk),
    /// 流结束标记
    Done,
    /// 无内容或无法解析
    Skip,
}

/// SSE 行缓冲
///
/// 按字节缓存，只在拿到完整行后再解码，多字节字符跨块时不会被截坏。
#[derive(Debug, Default)]
pub(super) struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// 追加一块数据，返回其中完整的 `data:` 负载
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim().strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

/// 发送请求，非 2xx 状态转换为 [`LlmError::ApiError`]
pub(super) async fn send_checked(
    request: RequestBuilder,
    provider: &str,
) -> Result<Response, LlmError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    error!(
        "{} API error: status={}, body={}",
        provider,
        status.as_u16(),
        truncate_body(&message)
    );
    Err(LlmError::ApiError {
        status: status.as_u16(),
        message,
    })
}

/// 截断错误响应体用于日志（按字符边界）
fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_yields_complete_data_lines() {
        let mut buffer = SseBuffer::default();
        assert!(buffer.push(b"event: ping\ndata: {\"a\"").is_empty());
        assert_eq!(buffer.push(b":1}\n\ndata:[DONE]\n"), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_buffer_keeps_split_multibyte_chars() {
        let mut buffer = SseBuffer::default();
        let line = "data: 文档\n".as_bytes();
        // 在“文”的中间切开
        assert!(buffer.push(&line[..8]).is_empty());
        assert_eq!(buffer.push(&line[8..]), vec!["文档"]);
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        let body = "错".repeat(600);
        assert_eq!(truncate_body(&body).chars().count(), 500);
        assert_eq!(truncate_body("short"), "short");
    }
}
