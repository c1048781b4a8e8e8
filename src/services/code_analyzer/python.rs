//! Python 语言分析
//!
//! 基于 tree-sitter 的 Python 语法：提取顶层函数、类及类中直接定义的方法，
//! 每个定义的源码会被独立再解析一次，以便与生成结果按同样方式比较。

use std::collections::BTreeSet;
use tree_sitter::{Node, Parser, Tree};

use super::calls::{collect_calls, CallFilter};
use super::imports::collect_imports;
use super::syntax::SyntaxNode;
use super::types::{Definition, DefinitionKind, ModuleAnalysis, SyntaxError};

/// Python 解析器
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self, SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| SyntaxError::Language(e.to_string()))?;
        Ok(Self { parser })
    }

    /// 解析源码，任何 ERROR/MISSING 节点都视为语法错误
    pub fn parse_tree(&mut self, source: &str) -> Result<Tree, SyntaxError> {
        let tree = self.parser.parse(source, None).ok_or(SyntaxError::NoTree)?;
        if let Some(err) = first_error(tree.root_node()) {
            return Err(err);
        }
        Ok(tree)
    }

    /// 解析整个模块
    pub fn parse_module(&mut self, source: &str) -> Result<SyntaxNode, SyntaxError> {
        let tree = self.parse_tree(source)?;
        Ok(SyntaxNode::from_ts(tree.root_node(), source, None))
    }

    /// 解析源码并返回第一个顶层函数或类定义
    pub fn parse_definition(&mut self, source: &str) -> Result<SyntaxNode, SyntaxError> {
        let module = self.parse_module(source)?;
        module
            .children
            .into_iter()
            .find(SyntaxNode::is_definition)
            .ok_or(SyntaxError::NoDefinition)
    }

    /// 分析一个模块：定义、调用引用、导入、缩进单位
    pub fn analyze_module(
        &mut self,
        source: &str,
        filter: &CallFilter,
    ) -> Result<ModuleAnalysis, SyntaxError> {
        let root = self.parse_module(source)?;
        let imports = collect_imports(&root, source);
        let indent_unit = detect_indent_unit(&root, source);

        let mut definitions = Vec::new();
        for stmt in &root.children {
            let def = stmt.definition();
            match def.kind {
                "function_definition" => {
                    let Some(name) = def.definition_name() else {
                        continue;
                    };
                    let text = slice(source, stmt).to_string();
                    let tree = self.parse_definition(&text)?;
                    let calls = collect_calls(&tree, None, name, filter);
                    definitions.push(Definition {
                        qualified_name: name.to_string(),
                        kind: DefinitionKind::Function,
                        text,
                        indent: None,
                        start_line: stmt.span.start_row,
                        end_line: stmt.span.end_row,
                        tree,
                        calls,
                    });
                }
                "class_definition" => {
                    let Some(class_name) = def.definition_name() else {
                        continue;
                    };
                    let methods = self.analyze_methods(source, def, class_name, filter)?;
                    let method_names: Vec<String> =
                        methods.iter().map(|m| m.qualified_name.clone()).collect();
                    definitions.extend(methods);

                    let text = slice(source, stmt).to_string();
                    let tree = self.parse_definition(&text)?;
                    let mut calls = collect_calls(&tree, Some(class_name), class_name, filter);
                    for name in method_names {
                        if !calls.contains(&name) {
                            calls.push(name);
                        }
                    }
                    definitions.push(Definition {
                        qualified_name: class_name.to_string(),
                        kind: DefinitionKind::Class,
                        text,
                        indent: None,
                        start_line: stmt.span.start_row,
                        end_line: stmt.span.end_row,
                        tree,
                        calls,
                    });
                }
                _ => {}
            }
        }

        Ok(ModuleAnalysis {
            definitions,
            imports,
            indent_unit,
        })
    }

    /// 类体中直接定义的方法（含装饰器）
    fn analyze_methods(
        &mut self,
        source: &str,
        class: &SyntaxNode,
        class_name: &str,
        filter: &CallFilter,
    ) -> Result<Vec<Definition>, SyntaxError> {
        let Some(body) = class.child_by_field("body") else {
            return Ok(Vec::new());
        };

        let mut methods = Vec::new();
        for member in &body.children {
            let def = member.definition();
            if def.kind != "function_definition" {
                continue;
            }
            let Some(name) = def.definition_name() else {
                continue;
            };
            let qualified_name = format!("{}.{}", class_name, name);
            let (text, indent) = member_text(source, member);
            let tree = self.parse_definition(&text)?;
            let calls = collect_calls(&tree, Some(class_name), &qualified_name, filter);
            methods.push(Definition {
                qualified_name,
                kind: DefinitionKind::Method,
                text,
                indent,
                start_line: member.span.start_row,
                end_line: member.span.end_row,
                tree,
                calls,
            });
        }
        Ok(methods)
    }
}

/// 深度优先查找第一个 ERROR 或 MISSING 节点
fn first_error(node: Node<'_>) -> Option<SyntaxError> {
    if node.is_error() || node.is_missing() {
        let kind = if node.is_missing() {
            format!("missing `{}`", node.kind())
        } else {
            "unexpected token".to_string()
        };
        return Some(SyntaxError::Invalid {
            line: node.start_position().row + 1,
            kind,
        });
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn slice<'a>(source: &'a str, node: &SyntaxNode) -> &'a str {
    source
        .get(node.span.start_byte..node.span.end_byte)
        .unwrap_or_default()
}

/// 方法源码及其缩进前缀
///
/// 从所在行行首截取再去掉缩进，多行字符串内部的行保持原样。
fn member_text(source: &str, member: &SyntaxNode) -> (String, Option<String>) {
    let start = member.span.start_byte;
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &source[line_start..start];
    if !prefix.trim().is_empty() {
        // 与类头写在同一行
        return (slice(source, member).to_string(), None);
    }
    let text = source
        .get(line_start..member.span.end_byte)
        .unwrap_or_default();
    let keep: BTreeSet<usize> = literal_rows(member)
        .into_iter()
        .map(|row| row - member.span.start_row)
        .collect();
    (dedent_keeping(text, prefix, &keep), Some(prefix.to_string()))
}

/// 去掉每行的 `prefix` 前缀
///
/// 缩进更浅的非空行和 `keep` 中的行（从 0 开始）保持原样。
pub fn dedent_keeping(text: &str, prefix: &str, keep: &BTreeSet<usize>) -> String {
    if prefix.is_empty() {
        return text.to_string();
    }
    text.split('\n')
        .enumerate()
        .map(|(row, line)| match line.strip_prefix(prefix) {
            _ if keep.contains(&row) => line,
            Some(rest) => rest,
            None if line.trim().is_empty() => line.trim_start_matches([' ', '\t']),
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 起始位置落在多行字符串内部的行
///
/// 独立成句的字符串（文档）不计入，它们随代码一起缩进。
pub fn literal_rows(node: &SyntaxNode) -> BTreeSet<usize> {
    let mut rows = BTreeSet::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        for child in &node.children {
            if node.kind == "expression_statement" && child.kind == "string" {
                continue;
            }
            if child.kind == "string" && child.span.end_row > child.span.start_row {
                rows.extend(child.span.start_row + 1..=child.span.end_row);
            }
            stack.push(child);
        }
    }
    rows
}

/// 解析 `source` 并返回 [`literal_rows`]；无法解析时为空
pub fn literal_rows_in(source: &str) -> BTreeSet<usize> {
    PythonParser::new()
        .and_then(|mut parser| parser.parse_module(source))
        .map(|root| literal_rows(&root))
        .unwrap_or_default()
}

/// 首个缩进块中第一条语句的前导空白
pub fn detect_indent_unit(root: &SyntaxNode, source: &str) -> Option<String> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind == "block" {
            if let Some(first) = node.children.first() {
                let start = first.span.start_byte;
                let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
                let prefix = &source[line_start..start];
                if !prefix.is_empty() && prefix.trim().is_empty() {
                    return Some(prefix.to_string());
                }
            }
        }
        stack.extend(node.children.iter().rev());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use pretty_assertions::assert_eq;

    fn analyze(src: &str) -> ModuleAnalysis {
        let config = AppConfig::default();
        let filter = CallFilter::new(&config.ignored_calls, &config.ignored_methods);
        PythonParser::new().unwrap().analyze_module(src, &filter).unwrap()
    }

    const SAMPLE: &str = r#"import os


def helper(x):
    return os.path.basename(x)


@decorate
def top(path):
    return helper(path)


class Store:
    """Keeps things."""

    def __init__(self, root):
        self.root = root

    @staticmethod
    def load(path):
        return helper(path)

    def save(self):
        self.load(self.root)
        return top(self.root)


if __name__ == "__main__":
    top(".")
"#;

    #[test]
    fn test_definitions_and_order() {
        let analysis = analyze(SAMPLE);
        let names: Vec<&str> = analysis
            .definitions
            .iter()
            .map(|d| d.qualified_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["helper", "top", "Store.__init__", "Store.load", "Store.save", "Store"]
        );
        assert_eq!(analysis.indent_unit.as_deref(), Some("    "));
        assert_eq!(analysis.imports.statements, vec!["import os"]);
    }

    #[test]
    fn test_decorated_function_text_includes_decorator() {
        let analysis = analyze(SAMPLE);
        let top = &analysis.definitions[1];
        assert_eq!(top.text, "@decorate\ndef top(path):\n    return helper(path)");
        assert_eq!(top.calls, vec!["helper"]);
    }

    #[test]
    fn test_method_text_is_dedented() {
        let analysis = analyze(SAMPLE);
        let load = analysis
            .definitions
            .iter()
            .find(|d| d.qualified_name == "Store.load")
            .unwrap();
        assert_eq!(load.kind, DefinitionKind::Method);
        assert_eq!(
            load.text,
            "@staticmethod\ndef load(path):\n    return helper(path)"
        );
    }

    #[test]
    fn test_class_dependencies() {
        let analysis = analyze(SAMPLE);
        let save = analysis
            .definitions
            .iter()
            .find(|d| d.qualified_name == "Store.save")
            .unwrap();
        assert_eq!(save.calls, vec!["Store.load", "top"]);

        let class = analysis.definitions.last().unwrap();
        assert_eq!(class.kind, DefinitionKind::Class);
        assert_eq!(
            class.calls,
            vec!["helper", "Store.load", "top", "Store.__init__", "Store.save"]
        );
    }

    #[test]
    fn test_parse_error_reports_line() {
        let config = AppConfig::default();
        let filter = CallFilter::new(&config.ignored_calls, &config.ignored_methods);
        let err = PythonParser::new()
            .unwrap()
            .analyze_module("def ok():\n    pass\n\ndef broken(:\n    pass\n", &filter)
            .unwrap_err();
        match err {
            SyntaxError::Invalid { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_definition_requires_definition() {
        let err = PythonParser::new().unwrap().parse_definition("x = 1\n").unwrap_err();
        assert_eq!(err, SyntaxError::NoDefinition);
    }

    #[test]
    fn test_dedent_keeps_shallower_lines() {
        let text = "def f(self):\n        s = '''\nraw\n'''\n        return s";
        assert_eq!(
            dedent_keeping(text, "    ", &BTreeSet::new()),
            "def f(self):\n    s = '''\nraw\n'''\n    return s"
        );
    }

    #[test]
    fn test_method_literal_lines_kept_verbatim() {
        let src = "class Repo:\n    def sql(self):\n        q = \"\"\"\n        SELECT 1\nFROM t\n        \"\"\"\n        return q\n";
        let analysis = analyze(src);
        let sql = &analysis.definitions[0];
        assert_eq!(
            sql.text,
            "def sql(self):\n    q = \"\"\"\n        SELECT 1\nFROM t\n        \"\"\"\n    return q"
        );
        assert_eq!(sql.indent.as_deref(), Some("    "));
        assert_eq!(literal_rows_in(&sql.text), BTreeSet::from([2, 3, 4]));
    }

    #[test]
    fn test_docstring_lines_are_dedented() {
        let src = "class A:\n    def f(self):\n        \"\"\"Do.\n\n        More.\n        \"\"\"\n        return 1\n";
        let f = &analyze(src).definitions[0];
        assert_eq!(
            f.text,
            "def f(self):\n    \"\"\"Do.\n\n    More.\n    \"\"\"\n    return 1"
        );
        assert!(literal_rows_in(&f.text).is_empty());
    }

    #[test]
    fn test_method_indent_is_own_class_body_prefix() {
        let src = "if DEBUG:\n  LEVEL = 1\n\n\nclass A:\n    def f(self):\n        return 1\n";
        let analysis = analyze(src);
        assert_eq!(analysis.indent_unit.as_deref(), Some("  "));
        let f = &analysis.definitions[0];
        assert_eq!(f.indent.as_deref(), Some("    "));
        assert_eq!(f.text, "def f(self):\n    return 1");
        assert_eq!(analysis.definitions[1].indent, None);
    }

    #[test]
    fn test_tab_indent_detected() {
        let analysis = analyze("class A:\n\tdef f(self):\n\t\treturn 1\n");
        assert_eq!(analysis.indent_unit.as_deref(), Some("\t"));
        assert_eq!(analysis.definitions[0].text, "def f(self):\n\treturn 1");
    }
}
