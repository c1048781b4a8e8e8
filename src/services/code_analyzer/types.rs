//! 代码分析类型定义

use serde::Serialize;
use thiserror::Error;

use super::syntax::SyntaxNode;

/// 定义类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Function,
    Method,
    Class,
}

/// 从源文件中提取的一个函数、方法或类定义
#[derive(Debug, Clone)]
pub struct Definition {
    /// 限定名：`func`、`Class`、`Class.method`
    pub qualified_name: String,
    pub kind: DefinitionKind,
    /// 原始源码（方法已去除类体缩进，包含装饰器）
    pub text: String,
    /// 方法在类体中的缩进前缀，顶层定义为 `None`
    pub indent: Option<String>,
    /// 起止行（从 0 开始，含）
    pub start_line: usize,
    pub end_line: usize,
    /// 独立解析 `text` 得到的定义节点
    pub tree: SyntaxNode,
    /// 引用的调用名（去重、按出现顺序、已过滤）
    pub calls: Vec<String>,
}

/// 一条导入绑定：`import numpy as np` 绑定 `np -> numpy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportBinding {
    pub local: String,
    pub target: String,
}

/// 项目中收集到的导入语句
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSet {
    /// 原文，去重
    pub statements: Vec<String>,
    pub bindings: Vec<ImportBinding>,
    /// `from m import *` 中的模块
    pub wildcard_modules: Vec<String>,
}

impl ImportSet {
    /// 合并另一个文件的导入，保持首次出现顺序
    pub fn extend(&mut self, other: ImportSet) {
        for stmt in other.statements {
            if !self.statements.contains(&stmt) {
                self.statements.push(stmt);
            }
        }
        for binding in other.bindings {
            if !self.bindings.contains(&binding) {
                self.bindings.push(binding);
            }
        }
        for module in other.wildcard_modules {
            if !self.wildcard_modules.contains(&module) {
                self.wildcard_modules.push(module);
            }
        }
    }

    /// 查找本地名绑定的目标（后出现的绑定覆盖先出现的）
    pub fn resolve(&self, local: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.local == local)
            .map(|b| b.target.as_str())
    }
}

/// 单个模块的分析结果
#[derive(Debug, Clone)]
pub struct ModuleAnalysis {
    pub definitions: Vec<Definition>,
    pub imports: ImportSet,
    /// 文件的缩进单位（第一个缩进块的前导空白）
    pub indent_unit: Option<String>,
}

/// 语法错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("语法错误: 第 {line} 行附近 ({kind})")]
    Invalid { line: usize, kind: String },

    #[error("无法加载 Python 语法: {0}")]
    Language(String),

    #[error("解析器未返回语法树")]
    NoTree,

    #[error("未找到函数或类定义")]
    NoDefinition,
}
