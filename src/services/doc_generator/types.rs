//! 文档生成器类型定义
//!
//! 定义代码单元、处理状态、运行配置与统计等核心类型

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::{AppConfig, RefDocStrategy};
use crate::llm::TokenUsage;
use crate::services::code_analyzer::{DefinitionKind, SyntaxNode};

/// 代码单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Function,
    Method,
    Class,
    /// 只被引用、未在项目中定义的名称
    #[default]
    Unknown,
}

impl From<DefinitionKind> for UnitKind {
    fn from(kind: DefinitionKind) -> Self {
        match kind {
            DefinitionKind::Function => Self::Function,
            DefinitionKind::Method => Self::Method,
            DefinitionKind::Class => Self::Class,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::Function => "function",
            UnitKind::Method => "method",
            UnitKind::Class => "class",
            UnitKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// 代码单元处理状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UnitState {
    /// 待处理
    #[default]
    Pending,
    /// 复用了参考文档
    Reused,
    /// 生成结果通过校验
    Generated,
    /// 重试耗尽
    Failed { reason: String },
}

impl UnitState {
    pub fn label(&self) -> &'static str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Reused => "reused",
            UnitState::Generated => "generated",
            UnitState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UnitState::Pending)
    }
}

/// 代码单元：一个函数、方法或类定义，或被引用的外部名称（桩）
#[derive(Debug, Clone, Default)]
pub struct CodeUnit {
    /// 限定名
    pub name: String,
    pub kind: UnitKind,
    /// 原始源码，不会被修改
    pub original_text: Option<String>,
    /// 原始源码的语法树
    pub tree: Option<SyntaxNode>,
    /// 引用的名称，只追加
    pub dependencies: Vec<String>,
    /// 所在文件
    pub path: Option<PathBuf>,
    /// 写回时使用的缩进（仅方法）
    pub indent: String,
    /// 是否在项目中定义
    pub custom: bool,
    pub documentation: Option<String>,
    pub documentation_short: Option<String>,
    /// 生成（且通过校验）的源码
    pub generated_text: Option<String>,
    /// 类的生成基准：原始源码中已替换为方法的生成结果
    pub base_text: Option<String>,
    pub state: UnitState,
}

impl CodeUnit {
    /// 默认记录
    pub fn stub(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_documented(&self) -> bool {
        self.documentation.is_some()
    }

    /// 写回时用作锚点的文本
    pub fn anchor_text(&self) -> Option<&str> {
        self.base_text.as_deref().or(self.original_text.as_deref())
    }
}

/// 合并到存储中的部分更新
///
/// `dependencies` 追加到已有列表；其他字段为 `Some` 时直接覆盖。
#[derive(Debug, Clone, Default)]
pub struct UnitUpdate {
    pub kind: Option<UnitKind>,
    pub original_text: Option<String>,
    pub tree: Option<SyntaxNode>,
    pub dependencies: Vec<String>,
    pub path: Option<PathBuf>,
    pub indent: Option<String>,
    pub custom: Option<bool>,
    pub documentation: Option<String>,
    pub documentation_short: Option<String>,
    pub generated_text: Option<String>,
    pub base_text: Option<String>,
    pub state: Option<UnitState>,
}

/// 运行配置
#[derive(Debug, Clone)]
pub struct DocGenConfig {
    /// 每个代码单元的最大生成次数
    pub max_retries: u32,
    pub ref_doc: RefDocStrategy,
    pub stop_markers: Vec<String>,
    pub ignored_calls: Vec<String>,
    pub ignored_methods: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub max_file_size: u64,
    /// 报告路径，`None` 时不写报告
    pub report_path: Option<PathBuf>,
    /// 不写回源文件
    pub dry_run: bool,
}

impl DocGenConfig {
    pub fn from_app_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            ref_doc: config.ref_doc,
            stop_markers: config.stop_markers.clone(),
            ignored_calls: config.ignored_calls.clone(),
            ignored_methods: config.ignored_methods.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
            max_file_size: config.max_file_size,
            report_path: Some(config.report_path.clone()),
            dry_run,
        }
    }
}

impl Default for DocGenConfig {
    fn default() -> Self {
        let mut config = Self::from_app_config(&AppConfig::default(), false);
        config.report_path = None;
        config
    }
}

/// 运行统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// 项目中定义的代码单元数
    pub total_units: usize,
    pub generated: usize,
    pub reused: usize,
    pub failed: usize,
    /// 实际写回的文件数
    pub files_patched: usize,
    /// 未能定位而跳过的写回
    pub patch_failures: usize,
    pub usage: TokenUsage,
}
