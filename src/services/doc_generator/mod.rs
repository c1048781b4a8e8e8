//! 文档生成器模块
//!
//! 为 Python 源码中的函数、方法和类生成文档，并保证生成结果不改变代码结构。
//!
//! # 功能
//!
//! - 扫描源码目录，构建代码单元依赖图
//! - 叶子名称优先复用参考文档
//! - 按未文档化依赖数从少到多逐个调用 LLM 生成
//! - 结构校验：去掉文档后的语法树必须与原始定义一致
//! - 按行锚点写回源文件，输出 CSV/JSON 报告
//!
//! # 使用示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use crate::services::doc_generator::{DocGenConfig, DocGenService};
//! use crate::services::LlmGenerator;
//!
//! let generator = Arc::new(LlmGenerator::new(client, "gpt-4o".to_string(), &app_config));
//! let service = DocGenService::new(DocGenConfig::default(), generator);
//! let outcome = service.run(Path::new("project/")).await?;
//! println!("{} generated", outcome.summary.generated);
//! ```

pub mod generator;
mod patcher;
mod processor;
pub mod prompts;
mod reference;
mod report;
mod scanner;
mod scheduler;
mod shorten;
mod store;
pub mod types;
mod validator;

pub use generator::{GenerationOutput, GenerationRequest, TextGenerator};
pub use processor::{DocGenError, DocGenService};
pub use reference::{ReferenceError, StaticDocIndex};
pub use types::DocGenConfig;
