//! 带标签的语法树与结构比较
//!
//! tree-sitter 的 `Tree` 与源码缓冲区绑定，这里转换为独立的 [`SyntaxNode`]：
//! 注释等 extra 节点被丢弃，叶子节点保留原文。结构比较是一个按字段进行的递归访问器，
//! 由一组显式的忽略字段参数化（默认忽略源码位置）。

use std::collections::HashSet;
use std::fmt;
use tree_sitter::Node;

/// 以文本方式保存、不再向下展开的节点类型
const OPAQUE_KINDS: &[&str] = &["string_content"];

/// 源码位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub end_row: usize,
}

/// 语法树节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    /// 节点类型（具名节点如 `identifier`，匿名记号如 `+`）
    pub kind: &'static str,
    /// 在父节点中的字段名
    pub field: Option<&'static str>,
    /// 叶子节点的原文
    pub text: Option<String>,
    pub children: Vec<SyntaxNode>,
    pub span: Span,
}

impl SyntaxNode {
    /// 从 tree-sitter 节点构建，跳过注释等 extra 节点
    pub fn from_ts(node: Node<'_>, source: &str, field: Option<&'static str>) -> Self {
        let kind = node.kind();
        let opaque = node.child_count() == 0 || OPAQUE_KINDS.contains(&kind);

        let mut children = Vec::new();
        if !opaque {
            let mut cursor = node.walk();
            if cursor.goto_first_child() {
                loop {
                    let child = cursor.node();
                    if !child.is_extra() {
                        children.push(Self::from_ts(child, source, cursor.field_name()));
                    }
                    if !cursor.goto_next_sibling() {
                        break;
                    }
                }
            }
        }

        let text = opaque.then(|| {
            source
                .get(node.byte_range())
                .unwrap_or_default()
                .to_string()
        });

        Self {
            kind,
            field,
            text,
            children,
            span: Span {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                start_row: node.start_position().row,
                end_row: node.end_position().row,
            },
        }
    }

    /// 按字段名查找子节点
    pub fn child_by_field(&self, field: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    fn child_by_field_mut(&mut self, field: &str) -> Option<&mut SyntaxNode> {
        self.children.iter_mut().find(|c| c.field == Some(field))
    }

    /// 剥去装饰器后的定义节点
    pub fn definition(&self) -> &SyntaxNode {
        if self.kind == "decorated_definition" {
            if let Some(inner) = self.child_by_field("definition") {
                return inner;
            }
        }
        self
    }

    fn definition_mut(&mut self) -> &mut SyntaxNode {
        if self.kind == "decorated_definition" {
            if let Some(pos) = self.children.iter().position(|c| c.field == Some("definition")) {
                return &mut self.children[pos];
            }
        }
        self
    }

    /// 定义名称
    pub fn definition_name(&self) -> Option<&str> {
        self.definition()
            .child_by_field("name")
            .and_then(|n| n.text.as_deref())
    }

    pub fn is_definition(&self) -> bool {
        matches!(
            self.definition().kind,
            "function_definition" | "class_definition"
        )
    }

    /// 节点的简短描述，用于错误信息
    fn describe(&self) -> String {
        match &self.text {
            Some(text) if text != self.kind => format!("{} {:?}", self.kind, text),
            _ => self.kind.to_string(),
        }
    }

    fn path_segment(&self, index: Option<usize>) -> String {
        let mut segment = self.kind.to_string();
        if let Some(field) = self.field {
            segment.push_str(&format!("({})", field));
        }
        if let Some(index) = index {
            segment.push_str(&format!("[{}]", index));
        }
        segment
    }
}

/// 是否为文档语句（函数体中单独成句的字符串字面量）
fn is_documentation(node: &SyntaxNode) -> bool {
    node.kind == "expression_statement"
        && node.children.len() == 1
        && matches!(node.children[0].kind, "string" | "concatenated_string")
}

/// 去掉定义体中的文档语句
///
/// 对类同时处理其直接嵌套的方法体。
pub fn strip_documentation(node: &SyntaxNode) -> SyntaxNode {
    let mut stripped = node.clone();
    strip_in_place(stripped.definition_mut());
    stripped
}

fn strip_in_place(definition: &mut SyntaxNode) {
    let is_class = definition.kind == "class_definition";
    let Some(body) = definition.child_by_field_mut("body") else {
        return;
    };
    body.children.retain(|stmt| !is_documentation(stmt));

    if is_class {
        for member in body.children.iter_mut() {
            let member = member.definition_mut();
            if member.kind == "function_definition" {
                strip_in_place(member);
            }
        }
    }
}

/// 提取定义的首个文档字符串（按 `inspect.cleandoc` 规则清理）
pub fn docstring(node: &SyntaxNode) -> Option<String> {
    let body = node.definition().child_by_field("body")?;
    let first = body.children.first()?;
    if !is_documentation(first) {
        return None;
    }
    let raw = string_value(&first.children[0]);
    Some(clean_docstring(&raw))
}

/// 拼接字符串节点中的内容片段
fn string_value(node: &SyntaxNode) -> String {
    let mut out = String::new();
    collect_string_content(node, &mut out);
    out
}

fn collect_string_content(node: &SyntaxNode, out: &mut String) {
    if node.kind == "string_content" {
        if let Some(text) = &node.text {
            out.push_str(text);
        }
        return;
    }
    for child in &node.children {
        collect_string_content(child, out);
    }
}

/// 清理文档字符串缩进：首行去前导空白，其余行去公共缩进，去首尾空行
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim_start().to_string());
    for line in lines.iter().skip(1) {
        let trimmed = if line.trim().is_empty() {
            ""
        } else {
            line.get(margin..).unwrap_or_else(|| line.trim_start())
        };
        cleaned.push(trimmed.trim_end().to_string());
    }

    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }

    cleaned.join("\n")
}

/// 节点字段，用于配置比较时忽略哪些字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeField {
    Kind,
    Field,
    Text,
    Children,
    Span,
}

impl fmt::Display for NodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeField::Kind => "kind",
            NodeField::Field => "field",
            NodeField::Text => "text",
            NodeField::Children => "children",
            NodeField::Span => "span",
        };
        f.write_str(name)
    }
}

/// 与源码位置相关的字段
pub const POSITION_FIELDS: &[NodeField] = &[NodeField::Span];

/// 首个不一致的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// 从根节点到不一致节点的路径，如 `function_definition > block(body)[4] > return_statement[0]`
    pub path: String,
    pub field: NodeField,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} differs at `{}`: expected `{}`, found `{}`",
            self.field, self.path, self.expected, self.found
        )
    }
}

/// 结构比较器
pub struct StructuralComparator {
    ignored: HashSet<NodeField>,
}

impl StructuralComparator {
    pub fn new(ignored: &[NodeField]) -> Self {
        Self {
            ignored: ignored.iter().copied().collect(),
        }
    }

    /// 忽略源码位置的比较器
    pub fn position_agnostic() -> Self {
        Self::new(POSITION_FIELDS)
    }

    /// 深度比较两棵树，返回第一个不一致处
    pub fn compare(&self, expected: &SyntaxNode, found: &SyntaxNode) -> Result<(), Mismatch> {
        let mut path = vec![expected.path_segment(None)];
        self.visit(expected, found, &mut path)
    }

    fn visit(
        &self,
        expected: &SyntaxNode,
        found: &SyntaxNode,
        path: &mut Vec<String>,
    ) -> Result<(), Mismatch> {
        // 穷尽解构：新增字段时必须在此处显式处理
        let SyntaxNode {
            kind,
            field,
            text,
            children,
            span,
        } = expected;

        let mismatch = |which: NodeField, e: String, f: String, path: &[String]| Mismatch {
            path: path.join(" > "),
            field: which,
            expected: e,
            found: f,
        };

        if !self.ignored.contains(&NodeField::Kind) && *kind != found.kind {
            return Err(mismatch(
                NodeField::Kind,
                kind.to_string(),
                found.kind.to_string(),
                path,
            ));
        }
        if !self.ignored.contains(&NodeField::Field) && *field != found.field {
            return Err(mismatch(
                NodeField::Field,
                format!("{:?}", field),
                format!("{:?}", found.field),
                path,
            ));
        }
        if !self.ignored.contains(&NodeField::Text) && *text != found.text {
            return Err(mismatch(
                NodeField::Text,
                text.clone().unwrap_or_default(),
                found.text.clone().unwrap_or_default(),
                path,
            ));
        }
        if !self.ignored.contains(&NodeField::Span) && *span != found.span {
            return Err(mismatch(
                NodeField::Span,
                format!("{:?}", span),
                format!("{:?}", found.span),
                path,
            ));
        }
        if self.ignored.contains(&NodeField::Children) {
            return Ok(());
        }

        // 按较长一侧补齐，任何长度差异都会失败
        let len = children.len().max(found.children.len());
        for index in 0..len {
            match (children.get(index), found.children.get(index)) {
                (Some(e), Some(f)) => {
                    path.push(e.path_segment(Some(index)));
                    self.visit(e, f, path)?;
                    path.pop();
                }
                (e, f) => {
                    return Err(mismatch(
                        NodeField::Children,
                        e.map(SyntaxNode::describe).unwrap_or_else(|| "<none>".to_string()),
                        f.map(SyntaxNode::describe).unwrap_or_else(|| "<none>".to_string()),
                        path,
                    ));
                }
            }
        }

        Ok(())
    }
}
