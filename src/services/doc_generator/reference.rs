//! 参考文档查询
//!
//! 无法在运行时反射 Python 库，因此参考文档来自预先导出的静态索引
//! （JSON 对象 `{ "qualified.name": "docstring" }`）。查不到只代表没有文档，不是错误。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::services::code_analyzer::syntax::clean_docstring;
use crate::services::code_analyzer::ImportSet;

/// 参考索引加载错误
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("读取参考索引失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("参考索引格式错误 ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 参考文档解析器
pub trait ReferenceResolver: Send + Sync {
    /// 按导入语句解析名称，返回清理后的文档
    fn resolve(&self, name: &str, imports: &ImportSet) -> Option<String>;
}

/// 不提供任何文档
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ReferenceResolver for NullResolver {
    fn resolve(&self, _name: &str, _imports: &ImportSet) -> Option<String> {
        None
    }
}

/// 静态文档索引
#[derive(Debug, Default, Clone)]
pub struct StaticDocIndex {
    docs: HashMap<String, String>,
}

impl StaticDocIndex {
    pub fn new(docs: HashMap<String, String>) -> Self {
        Self { docs }
    }

    /// 从 JSON 文件加载
    pub fn from_file(path: &Path) -> Result<Self, ReferenceError> {
        let content = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let docs: HashMap<String, String> =
            serde_json::from_str(&content).map_err(|source| ReferenceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "Loaded {} reference docs from {}",
            docs.len(),
            path.display()
        );
        Ok(Self::new(docs))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl ReferenceResolver for StaticDocIndex {
    fn resolve(&self, name: &str, imports: &ImportSet) -> Option<String> {
        let found = candidate_names(name, imports).into_iter().find_map(|candidate| {
            self.docs
                .get(&candidate)
                .map(|doc| clean_docstring(doc))
                .filter(|doc| !doc.is_empty())
        });
        if found.is_none() {
            debug!("No reference documentation found for `{}`", name);
        }
        found
    }
}

/// 依次尝试的索引键
///
/// 名称的每个点分后缀（从长到短，首段按导入绑定展开），然后是原名、
/// `builtins.<name>`，最后是 `from m import *` 引入的模块。
pub fn candidate_names(name: &str, imports: &ImportSet) -> Vec<String> {
    let segments: Vec<&str> = name.split('.').collect();
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    for i in 0..segments.len() {
        let head = segments[i];
        let rest = &segments[i + 1..];
        if let Some(target) = imports.resolve(head) {
            let mut expanded = vec![target];
            expanded.extend_from_slice(rest);
            push(expanded.join("."));
        }
    }
    push(name.to_string());
    push(format!("builtins.{name}"));
    for module in &imports.wildcard_modules {
        push(format!("{module}.{name}"));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::code_analyzer::types::ImportBinding;

    fn imports() -> ImportSet {
        ImportSet {
            statements: vec![
                "import numpy as np".to_string(),
                "from os import path".to_string(),
                "from math import *".to_string(),
            ],
            bindings: vec![
                ImportBinding {
                    local: "np".to_string(),
                    target: "numpy".to_string(),
                },
                ImportBinding {
                    local: "path".to_string(),
                    target: "os.path".to_string(),
                },
            ],
            wildcard_modules: vec!["math".to_string()],
        }
    }

    fn index() -> StaticDocIndex {
        let docs = [
            ("numpy.linalg.norm", "Matrix or vector norm.\n\n    More details."),
            ("os.path.join", "Join two or more pathname components."),
            ("builtins.zip", "Iterate in parallel."),
            ("math.sqrt", "Return the square root of x."),
        ];
        StaticDocIndex::new(
            docs.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_candidate_order() {
        let names = candidate_names("np.linalg.norm", &imports());
        assert_eq!(
            names,
            vec![
                "numpy.linalg.norm",
                "np.linalg.norm",
                "builtins.np.linalg.norm",
                "math.np.linalg.norm"
            ]
        );
    }

    #[test]
    fn test_resolve_through_bindings() {
        let index = index();
        let imports = imports();
        assert_eq!(
            index.resolve("np.linalg.norm", &imports).as_deref(),
            Some("Matrix or vector norm.\n\nMore details.")
        );
        assert_eq!(
            index.resolve("path.join", &imports).as_deref(),
            Some("Join two or more pathname components.")
        );
        assert_eq!(
            index.resolve("zip", &imports).as_deref(),
            Some("Iterate in parallel.")
        );
        assert_eq!(
            index.resolve("sqrt", &imports).as_deref(),
            Some("Return the square root of x.")
        );
    }

    #[test]
    fn test_suffix_lookup() {
        let index = index();
        // 局部变量接收者：去掉首段后按绑定展开
        assert_eq!(
            index.resolve("self_like.np.linalg.norm", &imports()).as_deref(),
            Some("Matrix or vector norm.\n\nMore details.")
        );
    }

    #[test]
    fn test_miss_is_none() {
        assert_eq!(index().resolve("helper", &imports()), None);
        assert_eq!(NullResolver.resolve("zip", &imports()), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        fs::write(&path, r#"{"builtins.len": "Return the number of items."}"#).unwrap();
        let index = StaticDocIndex::from_file(&path).unwrap();
        assert_eq!(index.len(), 1);

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StaticDocIndex::from_file(&path),
            Err(ReferenceError::Parse { .. })
        ));
    }
}
