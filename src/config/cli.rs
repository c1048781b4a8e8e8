//! 命令行参数

use clap::Parser;
use std::path::PathBuf;

use super::app_config::{AppConfig, RefDocStrategy};

/// AI Docstring Generator - 为 Python 代码生成经过结构校验的文档
#[derive(Parser, Debug)]
#[command(name = "docgen-rs")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Python 文件或项目目录
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// 输出调试日志
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// 配置文件路径（默认查找 ./docgen.json）
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// LLM API 密钥
    #[arg(long = "api-key", value_name = "KEY")]
    pub api_key: Option<String>,

    /// 存放 API 密钥的环境变量名
    #[arg(long = "api-key-env", value_name = "VAR")]
    pub api_key_env: Option<String>,

    /// LLM API 基础 URL
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// 模型名称
    #[arg(long = "model", value_name = "NAME")]
    pub model: Option<String>,

    /// 本地推理服务端口（localhost）
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// 每个代码单元的最大生成次数
    #[arg(long = "max-retries", value_name = "N")]
    pub max_retries: Option<u32>,

    /// 参考文档缩写策略
    #[arg(long = "ref-doc", value_enum)]
    pub ref_doc: Option<RefDocStrategy>,

    /// 静态参考文档索引（JSON）
    #[arg(long = "reference-index", value_name = "FILE")]
    pub reference_index: Option<PathBuf>,

    /// 报告输出路径
    #[arg(long = "report", value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// 生成尝试日志（JSONL）
    #[arg(long = "attempt-log", value_name = "FILE")]
    pub attempt_log: Option<PathBuf>,

    /// 不写回源文件
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl CliArgs {
    /// 将命令行参数覆盖到配置上
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(key) = &self.api_key {
            config.api_key = key.clone();
        }
        if let Some(var) = &self.api_key_env {
            config.api_key_env = Some(var.clone());
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(strategy) = self.ref_doc {
            config.ref_doc = strategy;
        }
        if let Some(index) = &self.reference_index {
            config.reference_index = Some(index.clone());
        }
        if let Some(report) = &self.report {
            config.report_path = report.clone();
        }
        if let Some(log) = &self.attempt_log {
            config.attempt_log = Some(log.clone());
        }
    }

    /// 是否在命令行指定了模型
    pub fn model_given(&self) -> bool {
        self.model.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_server_args() {
        let args = CliArgs::try_parse_from([
            "docgen-rs",
            "project/",
            "-p",
            "1234",
            "--ref-doc",
            "full",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.path, PathBuf::from("project/"));
        assert_eq!(args.port, Some(1234));
        assert_eq!(args.ref_doc, Some(RefDocStrategy::Full));
        assert!(args.dry_run);
        assert!(!args.verbose);
    }

    #[test]
    fn test_overrides_apply_over_file_values() {
        let args = CliArgs::try_parse_from([
            "docgen-rs",
            "src",
            "--model",
            "gpt-4o",
            "--max-retries",
            "5",
            "--report",
            "out.json",
        ])
        .unwrap();

        let mut config = AppConfig {
            model: "from-file".to_string(),
            temperature: 0.5,
            ..AppConfig::default()
        };
        args.apply_to(&mut config);

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.report_path, PathBuf::from("out.json"));
        // 未指定的参数保留文件中的值
        assert!((config.temperature - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_path_is_required() {
        assert!(CliArgs::try_parse_from(["docgen-rs"]).is_err());
    }
}
