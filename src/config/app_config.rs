//! 应用配置管理
//!
//! 配置来源优先级：`--config` 指定的文件 > 工作目录下的 `docgen.json` > 内置默认值，
//! 之后由命令行参数覆盖。配置在启动时加载一次并按值传递，不使用全局单例。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "docgen.json";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置文件格式错误 ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("缺少 LLM 凭据: 请提供 --port（本地服务）、--api-key 或 --api-key-env")]
    MissingCredentials,

    #[error("环境变量 {0} 未设置或为空")]
    MissingEnvVar(String),

    #[error("配置值无效: {0}")]
    Invalid(String),
}

/// 参考文档缩写策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RefDocStrategy {
    /// 取第一段（无空行时取第一行）
    #[default]
    Truncate,
    /// 让 LLM 总结为一句话
    Summarize,
    /// 使用完整文档
    Full,
}

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM API 密钥
    #[serde(default)]
    pub api_key: String,

    /// 存放 API 密钥的环境变量名
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// LLM API 基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 本地推理服务端口，设置后忽略 base_url
    #[serde(default)]
    pub port: Option<u16>,

    /// 模型名称
    #[serde(default = "default_model")]
    pub model: String,

    /// 温度参数 (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// 最大 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 每个代码单元的最大生成次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 参考文档缩写策略
    #[serde(default)]
    pub ref_doc: RefDocStrategy,

    /// 停止标记
    #[serde(default = "default_stop_markers")]
    pub stop_markers: Vec<String>,

    /// 不计入依赖的调用名（大小写不敏感）
    #[serde(default = "default_ignored_calls")]
    pub ignored_calls: Vec<String>,

    /// 在单个标识符上调用时不计入依赖的方法名
    #[serde(default = "default_ignored_methods")]
    pub ignored_methods: Vec<String>,

    /// 扫描时忽略的路径模式
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// 最大文件大小（字节）
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// 静态参考文档索引（JSON）
    #[serde(default)]
    pub reference_index: Option<PathBuf>,

    /// 报告输出路径（.json 输出 JSON，其他输出 CSV）
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// 生成尝试日志（JSONL）
    #[serde(default)]
    pub attempt_log: Option<PathBuf>,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_retries() -> u32 {
    3
}

fn default_stop_markers() -> Vec<String> {
    vec!["<STOP>".to_string(), "<|EOT|>".to_string()]
}

fn default_ignored_calls() -> Vec<String> {
    [
        "set", "list", "round", "range", "print", "sorted", "max", "len", "open", "read",
        "write", "int", "str", "join", "sum",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignored_methods() -> Vec<String> {
    [
        "append", "sort", "read", "readlines", "write", "split", "strip", "keys", "items",
        "lower", "upper",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignore_patterns() -> Vec<String> {
    [
        ".git",
        "__pycache__",
        ".venv",
        "venv",
        "env",
        ".tox",
        ".mypy_cache",
        ".pytest_cache",
        "build",
        "dist",
        "*.egg-info",
        "node_modules",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_report_path() -> PathBuf {
    PathBuf::from("docgen_report.csv")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_key_env: None,
            base_url: default_base_url(),
            port: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            ref_doc: RefDocStrategy::default(),
            stop_markers: default_stop_markers(),
            ignored_calls: default_ignored_calls(),
            ignored_methods: default_ignored_methods(),
            ignore_patterns: default_ignore_patterns(),
            max_file_size: default_max_file_size(),
            reference_index: None,
            report_path: default_report_path(),
            attempt_log: None,
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 显式指定的文件必须存在；未指定时查找工作目录下的 `docgen.json`，找不到则使用默认值。
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = PathBuf::from(CONFIG_FILE_NAME);
                if path.is_file() {
                    Self::from_file(&path)
                } else {
                    debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                    Ok(Self::default())
                }
            }
        }
    }

    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// 实际使用的 base_url（本地端口优先）
    pub fn effective_base_url(&self) -> String {
        match self.port {
            Some(port) => crate::llm::local_base_url(port),
            None => self.base_url.clone(),
        }
    }

    /// 解析 API 密钥
    ///
    /// 本地服务允许空密钥；远程服务依次使用 `api_key`、`api_key_env`。
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }
        if let Some(var) = &self.api_key_env {
            return match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => Ok(value),
                _ if self.port.is_some() => Ok(String::new()),
                _ => Err(ConfigError::MissingEnvVar(var.clone())),
            };
        }
        if self.port.is_some() {
            Ok(String::new())
        } else {
            Err(ConfigError::MissingCredentials)
        }
    }

    /// 校验数值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} out of range 0.0-2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}
