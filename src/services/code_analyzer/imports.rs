//! 导入语句解析

use super::syntax::SyntaxNode;
use super::types::{ImportBinding, ImportSet};

const IMPORT_KINDS: &[&str] = &[
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

/// 收集模块中任意位置的导入语句及其引入的绑定
pub fn collect_imports(root: &SyntaxNode, source: &str) -> ImportSet {
    let mut imports = ImportSet::default();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if IMPORT_KINDS.contains(&node.kind) {
            let statement = node_text(node, source).trim().to_string();
            if !imports.statements.contains(&statement) {
                imports.statements.push(statement);
            }
            match node.kind {
                "import_statement" => plain_import_bindings(node, source, &mut imports),
                "import_from_statement" => from_import_bindings(node, source, &mut imports),
                _ => {}
            }
            continue;
        }
        stack.extend(node.children.iter().rev());
    }

    imports
}

fn node_text<'a>(node: &SyntaxNode, source: &'a str) -> &'a str {
    source
        .get(node.span.start_byte..node.span.end_byte)
        .unwrap_or_default()
}

/// `import a.b` 绑定 `a`；`import a.b as c` 绑定 `c -> a.b`
fn plain_import_bindings(node: &SyntaxNode, source: &str, imports: &mut ImportSet) {
    for child in node.children.iter().filter(|c| c.field == Some("name")) {
        let binding = match child.kind {
            "aliased_import" => aliased(child, source, None),
            _ => {
                let dotted = node_text(child, source);
                let top = dotted.split('.').next().unwrap_or(dotted);
                Some(ImportBinding {
                    local: top.to_string(),
                    target: top.to_string(),
                })
            }
        };
        if let Some(binding) = binding {
            imports.bindings.push(binding);
        }
    }
}

/// `from m import x` 绑定 `x -> m.x`；相对导入去掉前导点
fn from_import_bindings(node: &SyntaxNode, source: &str, imports: &mut ImportSet) {
    let module = node
        .child_by_field("module_name")
        .map(|m| node_text(m, source).trim_start_matches('.').to_string())
        .unwrap_or_default();

    if node.children.iter().any(|c| c.kind == "wildcard_import") {
        if !module.is_empty() && !imports.wildcard_modules.contains(&module) {
            imports.wildcard_modules.push(module);
        }
        return;
    }

    for child in node.children.iter().filter(|c| c.field == Some("name")) {
        let binding = match child.kind {
            "aliased_import" => aliased(child, source, Some(&module)),
            _ => {
                let name = node_text(child, source);
                Some(ImportBinding {
                    local: name.to_string(),
                    target: qualify(&module, name),
                })
            }
        };
        if let Some(binding) = binding {
            imports.bindings.push(binding);
        }
    }
}

fn aliased(node: &SyntaxNode, source: &str, module: Option<&str>) -> Option<ImportBinding> {
    let name = node_text(node.child_by_field("name")?, source);
    let alias = node_text(node.child_by_field("alias")?, source);
    let target = match module {
        Some(module) => qualify(module, name),
        None => name.to_string(),
    };
    Some(ImportBinding {
        local: alias.to_string(),
        target,
    })
}

fn qualify(module: &str, name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", module, name)
    }
}
