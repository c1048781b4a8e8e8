//! 参考文档缩写
//!
//! 生成请求中引用的依赖文档使用缩写版本：截取第一段、交给 LLM 总结，或原样使用。

use tracing::{debug, warn};

use super::generator::TextGenerator;
use super::prompts;
use crate::config::RefDocStrategy;
use crate::llm::TokenUsage;

/// 取第一段；没有空行分段时取第一行
pub fn truncate(doc: &str) -> String {
    let shortened = match doc.split_once("\n\n") {
        Some((first, _)) => first,
        None => doc.lines().next().unwrap_or_default(),
    };
    shortened.trim().to_string()
}

/// 文档缩写器
pub struct DocShortener<'a> {
    strategy: RefDocStrategy,
    generator: &'a dyn TextGenerator,
    stop_markers: &'a [String],
}

impl<'a> DocShortener<'a> {
    pub fn new(
        strategy: RefDocStrategy,
        generator: &'a dyn TextGenerator,
        stop_markers: &'a [String],
    ) -> Self {
        Self {
            strategy,
            generator,
            stop_markers,
        }
    }

    /// 缩写文档，返回缩写结果与本次消耗的用量
    ///
    /// 总结失败（请求出错或返回为空）时退回截取。
    pub async fn shorten(&self, name: &str, doc: &str) -> (String, TokenUsage) {
        match self.strategy {
            RefDocStrategy::Full => (doc.to_string(), TokenUsage::default()),
            RefDocStrategy::Truncate => {
                let short = truncate(doc);
                debug!(
                    "Truncated doc for `{}` from {} to {} chars",
                    name,
                    doc.chars().count(),
                    short.chars().count()
                );
                (short, TokenUsage::default())
            }
            RefDocStrategy::Summarize => {
                let request = prompts::summarization_request(name, doc);
                match self.generator.generate(&request).await {
                    Ok(output) => {
                        let summary = self.cut_at_stop(&output.text);
                        if summary.is_empty() {
                            warn!("Empty summary for `{}`, falling back to truncation", name);
                            (truncate(doc), output.usage)
                        } else {
                            (summary, output.usage)
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Could not summarize docs for `{}`: {}, falling back to truncation",
                            name, e
                        );
                        (truncate(doc), TokenUsage::default())
                    }
                }
            }
        }
    }

    fn cut_at_stop(&self, text: &str) -> String {
        let cut = self
            .stop_markers
            .iter()
            .filter(|m| !m.is_empty())
            .filter_map(|m| text.find(m.as_str()))
            .min()
            .unwrap_or(text.len());
        text[..cut].trim().to_string()
    }
}
