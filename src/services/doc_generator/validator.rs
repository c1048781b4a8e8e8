//! 生成结果校验
//!
//! 从响应中取出候选定义，去掉文档节点后与原始定义做位置无关的结构比较。
//! 只有结构完全一致的候选才会被接受。

use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

use crate::services::code_analyzer::{
    dedent_keeping, docstring, strip_documentation, Mismatch, PythonParser, StructuralComparator,
    SyntaxError, SyntaxNode,
};

/// 候选定义可能的起始行
const CODE_STARTS: &[&str] = &["def ", "async def ", "class ", "@", "import ", "from "];

/// 定义之后仍属于代码的顶格行
const CODE_CONTINUATIONS: &[&str] = &[")", "]", "}", "#", "def ", "async def ", "class ", "@"];

/// 通过校验的生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// 候选定义的源码（已去掉多余的导入和说明文字）
    pub text: String,
    /// 候选定义的文档字符串
    pub documentation: Option<String>,
}

/// 校验失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("解析失败: {0}")]
    ParseError(String),

    #[error("未找到函数或类定义")]
    WrongNodeKind,

    #[error("结构不一致: {0}")]
    StructuralMismatch(Mismatch),
}

impl ValidationFailure {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationFailure::ParseError(_) => "parse error",
            ValidationFailure::WrongNodeKind => "wrong node kind",
            ValidationFailure::StructuralMismatch(_) => "structural mismatch",
        }
    }
}

/// 结构校验器
pub struct Validator {
    parser: PythonParser,
    comparator: StructuralComparator,
    stop_markers: Vec<String>,
}

impl Validator {
    pub fn new(stop_markers: Vec<String>) -> Result<Self, SyntaxError> {
        Ok(Self {
            parser: PythonParser::new()?,
            comparator: StructuralComparator::position_agnostic(),
            stop_markers,
        })
    }

    /// 校验一次生成结果
    ///
    /// `original` 为原始单元独立解析得到的定义节点。
    pub fn validate(
        &mut self,
        original: &SyntaxNode,
        response: &str,
    ) -> Result<Accepted, ValidationFailure> {
        let candidate = extract_candidate(response, &self.stop_markers).ok_or_else(|| {
            ValidationFailure::ParseError("response contains no code".to_string())
        })?;

        let module = self
            .parser
            .parse_module(&candidate)
            .map_err(|e| ValidationFailure::ParseError(e.to_string()))?;

        let imports = module
            .children
            .iter()
            .filter(|n| {
                matches!(
                    n.kind,
                    "import_statement" | "import_from_statement" | "future_import_statement"
                )
            })
            .count();
        if imports > 0 {
            debug!("Dropped {} import statement(s) from generated code", imports);
        }

        let definition = module
            .children
            .into_iter()
            .find(SyntaxNode::is_definition)
            .ok_or(ValidationFailure::WrongNodeKind)?;

        self.comparator
            .compare(
                &strip_documentation(original),
                &strip_documentation(&definition),
            )
            .map_err(ValidationFailure::StructuralMismatch)?;

        let text = candidate
            .get(definition.span.start_byte..definition.span.end_byte)
            .unwrap_or_default()
            .to_string();

        Ok(Accepted {
            text,
            documentation: docstring(&definition),
        })
    }
}

/// 从响应中提取候选代码
///
/// 在第一个停止标记处截断，优先取包含定义的代码块，再去掉定义前后的说明文字。
pub fn extract_candidate(response: &str, stop_markers: &[String]) -> Option<String> {
    let cut = stop_markers
        .iter()
        .filter(|m| !m.is_empty())
        .filter_map(|m| response.find(m.as_str()))
        .min()
        .unwrap_or(response.len());
    let response = response[..cut].replace("\r\n", "\n");

    // 以代码围栏分段，响应通常直接续写 Prompt 末尾未闭合的代码块
    let mut segments: Vec<Vec<&str>> = vec![Vec::new()];
    for line in response.lines() {
        if line.trim_start().starts_with("```") {
            segments.push(Vec::new());
        } else if let Some(current) = segments.last_mut() {
            current.push(line);
        }
    }

    let lines = segments
        .into_iter()
        .find(|seg| seg.iter().any(|l| is_code_start(l.trim_start())))?;

    let start = lines.iter().position(|l| is_code_start(l.trim_start()))?;
    let lines = &lines[start..];
    let prefix: String = lines[0]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();

    // 多行字符串内部的行不参与去缩进和结尾判断
    let mut in_literal = BTreeSet::new();
    let mut open: Option<&'static [u8]> = None;
    for (row, line) in lines.iter().enumerate() {
        if open.is_some() {
            in_literal.insert(row);
        }
        open = open_triple_quote(line, open);
    }
    let code = dedent_keeping(&lines.join("\n"), &prefix, &in_literal);

    let mut kept: Vec<&str> = Vec::new();
    for (row, line) in code.lines().enumerate() {
        let top_level = !line.is_empty() && !line.starts_with([' ', '\t']);
        if row > 0
            && top_level
            && !in_literal.contains(&row)
            && !CODE_CONTINUATIONS.iter().any(|p| line.starts_with(p))
        {
            break;
        }
        kept.push(line);
    }

    let text = kept.join("\n").trim_end().to_string();
    (!text.is_empty()).then_some(text)
}

/// 扫描一行后仍未闭合的三引号定界符
///
/// `open` 为行首时未闭合的定界符。注释和单行字符串中的引号不计。
fn open_triple_quote(line: &str, mut open: Option<&'static [u8]>) -> Option<&'static [u8]> {
    let bytes = line.as_bytes();
    let mut single: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(delim) = open {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if bytes[i..].starts_with(delim) {
                open = None;
                i += 3;
                continue;
            }
        } else if let Some(q) = single {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                single = None;
            }
        } else {
            match c {
                b'#' => break,
                b'"' | b'\'' => {
                    let delim: &'static [u8] = if c == b'"' { b"\"\"\"" } else { b"'''" };
                    if bytes[i..].starts_with(delim) {
                        open = Some(delim);
                        i += 3;
                        continue;
                    }
                    single = Some(c);
                }
                _ => {}
            }
        }
        i += 1;
    }
    open
}

fn is_code_start(line: &str) -> bool {
    CODE_STARTS.iter().any(|p| line.starts_with(p))
}
