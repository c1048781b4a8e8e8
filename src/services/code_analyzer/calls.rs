//! 调用引用提取

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::syntax::SyntaxNode;

/// 单个标识符接收者上的方法调用，如 `lines.append`
static RECEIVER_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\W0-9]\w*\.(\w+)$").unwrap());

/// 调用过滤器（常见内置调用不计入依赖）
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    /// 裸调用，小写比较
    bare: HashSet<String>,
    /// 在单个标识符上调用时忽略的方法名
    receiver: HashSet<String>,
}

impl CallFilter {
    pub fn new(ignored_calls: &[String], ignored_methods: &[String]) -> Self {
        Self {
            bare: ignored_calls.iter().map(|c| c.trim().to_lowercase()).collect(),
            receiver: ignored_calls
                .iter()
                .chain(ignored_methods.iter())
                .map(|c| c.trim().to_string())
                .collect(),
        }
    }

    pub fn is_ignored(&self, chain: &str) -> bool {
        if self.bare.contains(&chain.trim().to_lowercase()) {
            return true;
        }
        RECEIVER_CALL
            .captures(chain)
            .and_then(|caps| caps.get(1))
            .is_some_and(|method| self.receiver.contains(method.as_str()))
    }
}

/// 被调用表达式的名称链：`a.b.c` -> `["a", "b", "c"]`
///
/// 接收者为调用时取其被调用者（`f().g` -> `f.g`），其他接收者（下标、字面量等）从链中丢弃。
fn call_chain(node: &SyntaxNode) -> Option<Vec<String>> {
    match node.kind {
        "identifier" => Some(vec![node.text.clone()?]),
        "attribute" => {
            let attribute = node.child_by_field("attribute")?.text.clone()?;
            let mut chain = node
                .child_by_field("object")
                .and_then(receiver_chain)
                .unwrap_or_default();
            chain.push(attribute);
            Some(chain)
        }
        _ => None,
    }
}

fn receiver_chain(node: &SyntaxNode) -> Option<Vec<String>> {
    match node.kind {
        "identifier" | "attribute" => call_chain(node),
        "call" => node.child_by_field("function").and_then(call_chain),
        _ => None,
    }
}

/// 收集定义中的所有调用名
///
/// - 在类中，以 `self.`/`cls.` 开头的调用改写为 `ClassName.`
/// - 不包含 `own_name` 自身
/// - 去重，保持首次出现顺序
pub fn collect_calls(
    tree: &SyntaxNode,
    class_name: Option<&str>,
    own_name: &str,
    filter: &CallFilter,
) -> Vec<String> {
    let mut calls = Vec::new();
    let mut stack = vec![tree];

    while let Some(node) = stack.pop() {
        if node.kind == "call" {
            if let Some(chain) = node.child_by_field("function").and_then(call_chain) {
                let raw = chain.join(".");
                if !filter.is_ignored(&raw) {
                    let name = rewrite_receiver(chain, class_name);
                    if name != own_name && !calls.contains(&name) {
                        calls.push(name);
                    }
                }
            }
        }
        // 逆序入栈以保持先序遍历顺序
        stack.extend(node.children.iter().rev());
    }

    calls
}

fn rewrite_receiver(mut chain: Vec<String>, class_name: Option<&str>) -> String {
    if let Some(class_name) = class_name {
        if matches!(chain.first().map(String::as_str), Some("self") | Some("cls")) {
            chain[0] = class_name.to_string();
        }
    }
    chain.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::services::code_analyzer::python::PythonParser;

    fn default_filter() -> CallFilter {
        let config = AppConfig::default();
        CallFilter::new(&config.ignored_calls, &config.ignored_methods)
    }

    fn calls_of(src: &str, class_name: Option<&str>, own: &str) -> Vec<String> {
        let tree = PythonParser::new().unwrap().parse_definition(src).unwrap();
        collect_calls(&tree, class_name, own, &default_filter())
    }

    #[test]
    fn test_filter_bare_and_receiver_calls() {
        let filter = default_filter();
        assert!(filter.is_ignored("print"));
        assert!(filter.is_ignored("PRINT"));
        assert!(filter.is_ignored("x.print"));
        assert!(filter.is_ignored("lines.append"));
        assert!(!filter.is_ignored("a.b.append"));
        assert!(!filter.is_ignored("helper"));
        assert!(!filter.is_ignored("np.zeros"));
    }

    #[test]
    fn test_call_chains_in_order() {
        let calls = calls_of(
            "def f(items):\n    out = []\n    for i in range(len(items)):\n        out.append(np.sqrt(helper(i)))\n    print(out)\n    return os.path.join(a, b)\n",
            None,
            "f",
        );
        assert_eq!(calls, vec!["np.sqrt", "helper", "os.path.join"]);
    }

    #[test]
    fn test_receiver_call_collapses() {
        let calls = calls_of("def f():\n    return build().run()\n", None, "f");
        assert_eq!(calls, vec!["build.run", "build"]);
    }

    #[test]
    fn test_non_name_receiver_drops_out() {
        let calls = calls_of("def f(xs):\n    return xs[0].finish()\n", None, "f");
        assert_eq!(calls, vec!["finish"]);
    }

    #[test]
    fn test_self_calls_rewritten_and_recursion_excluded() {
        let calls = calls_of(
            "def step(self, n):\n    if n:\n        return self.step(n - 1)\n    return self.reset() or cls_helper()\n",
            Some("Machine"),
            "Machine.step",
        );
        assert_eq!(calls, vec!["Machine.reset", "cls_helper"]);
    }

    #[test]
    fn test_duplicates_removed() {
        let calls = calls_of("def f():\n    g()\n    g()\n    h()\n    g()\n", None, "f");
        assert_eq!(calls, vec!["g", "h"]);
    }
}
