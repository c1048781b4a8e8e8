//! 统一错误处理模块
//!
//! 汇总各层错误类型，命令行入口再转换为 `anyhow::Error` 输出。

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::services::doc_generator::{DocGenError, ReferenceError};

/// 应用错误枚举
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// LLM 调用错误
    #[error("LLM 错误: {0}")]
    Llm(#[from] LlmError),

    /// 参考文档索引错误
    #[error("参考文档错误: {0}")]
    Reference(#[from] ReferenceError),

    /// 文档生成流程错误
    #[error("{0}")]
    DocGen(#[from] DocGenError),

    /// 本地服务没有加载任何模型
    #[error("本地服务未提供可用模型")]
    NoModel,
}

/// 便捷类型别名
pub type AppResult<T> = Result<T, AppError>;
