//! AI Docstring Generator
//!
//! 命令行工具：扫描 Python 项目，调用 LLM 为函数、方法和类生成文档，
//! 只接受结构与原始代码一致的结果并写回源文件。

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod llm;
mod services;
mod utils;

use config::{AppConfig, CliArgs};
use error::{AppError, AppResult};
use llm::LlmClient;
use services::doc_generator::{DocGenConfig, DocGenService, StaticDocIndex};
use services::LlmGenerator;
use utils::AttemptLogger;

/// 在 Windows 上设置控制台代码页为 UTF-8
#[cfg(windows)]
fn setup_console_encoding() {
    unsafe {
        // 设置控制台输出代码页为 UTF-8 (65001)
        extern "system" {
            fn SetConsoleOutputCP(code_page: u32) -> i32;
            fn SetConsoleCP(code_page: u32) -> i32;
        }
        SetConsoleOutputCP(65001);
        SetConsoleCP(65001);
    }
}

#[cfg(not(windows))]
fn setup_console_encoding() {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_console_encoding();
    let args = CliArgs::parse();

    // 初始化日志
    let default_filter = if args.verbose {
        "docgen_rs=debug"
    } else {
        "docgen_rs=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(args).await?;
    Ok(())
}

async fn run(args: CliArgs) -> AppResult<()> {
    let mut app_config = AppConfig::load(args.config.as_deref())?;
    args.apply_to(&mut app_config);
    app_config.validate()?;

    let api_key = app_config.resolve_api_key()?;
    let client = Arc::new(LlmClient::new(api_key, app_config.effective_base_url())?);

    // 本地服务且未指定模型时使用服务端加载的第一个模型
    let model = if app_config.port.is_some() && !args.model_given() {
        client
            .list_models()
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NoModel)?
    } else {
        app_config.model.clone()
    };
    info!("Using model {} at {}", model, client.base_url());

    let generator = Arc::new(LlmGenerator::new(client, model, &app_config));
    let mut service = DocGenService::new(
        DocGenConfig::from_app_config(&app_config, args.dry_run),
        generator,
    );
    if let Some(path) = &app_config.reference_index {
        service = service.with_resolver(Box::new(StaticDocIndex::from_file(path)?));
    }
    if let Some(path) = &app_config.attempt_log {
        let logger = AttemptLogger::new(path.clone());
        info!("Recording generation attempts to {}", logger.path().display());
        service = service.with_attempt_log(logger);
    }

    let outcome = service.run(&args.path).await?;
    let summary = outcome.summary;
    info!(
        "Token usage: {} prompt + {} completion in {} requests",
        summary.usage.prompt_tokens, summary.usage.completion_tokens, summary.usage.requests
    );
    if summary.patch_failures > 0 {
        info!("{} units could not be written back", summary.patch_failures);
    }
    Ok(())
}
