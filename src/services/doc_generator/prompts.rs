//! LLM Prompt 模板
//!
//! 定义文档生成与文档总结的 Prompt 模板

use super::generator::GenerationRequest;
use super::store::ReferenceDoc;

/// 系统提示词
pub const SYSTEM_PROMPT: &str = "You are an intelligent AI programming assistant. You are fluent in Python and only answer questions related to Computer Science";

/// 文档生成要求
pub const INSTRUCTIONS: &str = r#"- Generate documentation for the python function/class given below.
- The documentation should contain:
- Docstring
    - Should be declared using """triple double quotes""" just below the original class, method, or function definition.
    - Should contain:
        - A single line summary
        - Input: Short descriptions of each input parameter
        - Returns: Short descriptions of each output parameter
        - Raises: Short description of failure cases and exceptions raised by the class, method, or function
- Inline comments
    - Short inline comments for blocks of code that are hard to understand
    - Only write such comments for each block of code, not for every line
- You also have access to reference documentation for sub-functions and sub-classes used in the original class, method, or function. These should be used for enhanced context for better documentation.
- Preserve all existing documentation given in the original class, method, or function.
- Do not change the code, name or existing comments of the original class, method, or function, only add comments wherever necessary.
- Do not add any import statements
- Only reply with the documented class, method, or function within ``` tags followed by the stop token: <STOP>"#;

/// 文档生成 Prompt（以未闭合的代码块结尾，引导模型直接输出代码）
pub const DOC_GENERATION_PROMPT: &str = r#"### Guidelines:
{instructions}

### Reference documentation:
{reference_docs}

### Original code block:
```python
{code}
```

### Original code block with documentation:
```python
"#;

/// 文档总结 Prompt
pub const DOC_SUMMARIZATION_PROMPT: &str = r#"### Guidelines
Summarize the given function documentation in a single line.
Make sure that the key nuances and overall meaning of the documentation are captured in the summary
Only reply with the summarized documentation followed by the stop token <STOP>

### Original documentation
Function: {name}
{documentation}

### Summarized documentation
"#;

/// 格式化参考文档列表
pub fn format_reference_docs(docs: &[ReferenceDoc]) -> String {
    docs.iter()
        .map(|d| format!("Function: {}\nDocumentation: {}", d.name, d.doc))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 替换模板占位符
///
/// 按模板中的出现顺序一次替换，插入的内容不会再被当作占位符。
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = values
            .iter()
            .filter_map(|&(key, value)| rest.find(key).map(|pos| (pos, key, value)))
            .min_by_key(|(pos, _, _)| *pos);
        let Some((pos, key, value)) = next else {
            break;
        };
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + key.len()..];
    }
    out.push_str(rest);
    out
}

/// 格式化文档生成 Prompt
pub fn format_generation_prompt(code: &str, docs: &[ReferenceDoc]) -> String {
    let reference_docs = format_reference_docs(docs);
    fill_template(
        DOC_GENERATION_PROMPT,
        &[
            ("{instructions}", INSTRUCTIONS),
            ("{reference_docs}", reference_docs.as_str()),
            ("{code}", code),
        ],
    )
}

/// 格式化文档总结 Prompt
pub fn format_summarization_prompt(name: &str, documentation: &str) -> String {
    fill_template(
        DOC_SUMMARIZATION_PROMPT,
        &[("{name}", name), ("{documentation}", documentation)],
    )
}

/// 文档生成请求
pub fn generation_request(code: &str, docs: &[ReferenceDoc]) -> GenerationRequest {
    GenerationRequest {
        system_instruction: SYSTEM_PROMPT.to_string(),
        user_prompt: format_generation_prompt(code, docs),
    }
}

/// 文档总结请求
pub fn summarization_request(name: &str, documentation: &str) -> GenerationRequest {
    GenerationRequest {
        system_instruction: SYSTEM_PROMPT.to_string(),
        user_prompt: format_summarization_prompt(name, documentation),
    }
}
