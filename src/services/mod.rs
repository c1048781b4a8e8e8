//! 服务层模块

pub mod code_analyzer;
pub mod doc_generator;
mod llm_service;

pub use llm_service::LlmGenerator;
