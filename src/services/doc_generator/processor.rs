//! 文档生成流程
//!
//! 扫描 → 叶子参考文档 → 按未文档化依赖数逐个生成并校验 → 写回 → 报告。
//! 整个流程严格串行，下一个单元的选择依赖上一个单元的结果。

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::generator::TextGenerator;
use super::patcher::{patch_files, splice};
use super::prompts;
use super::reference::{NullResolver, ReferenceResolver};
use super::report::{build_rows, write_report, ReportError};
use super::scanner::{ScanError, SourceScanner};
use super::scheduler::Scheduler;
use super::shorten::DocShortener;
use super::store::CodeUnitStore;
use super::types::{CodeUnit, DocGenConfig, RunSummary, UnitKind, UnitState, UnitUpdate};
use super::validator::{Accepted, ValidationFailure, Validator};
use crate::llm::{LlmError, TokenUsage};
use crate::services::code_analyzer::{ImportSet, SyntaxError};
use crate::utils::{AttemptEntry, AttemptLogger, AttemptStatus};

/// 流程错误
#[derive(Debug, Error)]
pub enum DocGenError {
    #[error("扫描失败: {0}")]
    Scan(#[from] ScanError),

    #[error("生成请求失败: {0}")]
    Transport(#[from] LlmError),

    #[error("报告写入失败: {0}")]
    Report(#[from] ReportError),

    #[error("初始化校验器失败: {0}")]
    Validator(SyntaxError),
}

/// 一次运行的结果
#[derive(Debug)]
pub struct DocGenOutcome {
    pub store: CodeUnitStore,
    pub summary: RunSummary,
}

/// 文档生成服务（主入口）
pub struct DocGenService {
    config: DocGenConfig,
    generator: Arc<dyn TextGenerator>,
    resolver: Box<dyn ReferenceResolver>,
    attempt_log: Option<AttemptLogger>,
}

impl DocGenService {
    /// 创建新的文档生成服务（不查询参考文档）
    pub fn new(config: DocGenConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            config,
            generator,
            resolver: Box::new(NullResolver),
            attempt_log: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_attempt_log(mut self, logger: AttemptLogger) -> Self {
        self.attempt_log = Some(logger);
        self
    }

    /// 处理一个文件或目录
    ///
    /// 校验失败只影响对应单元；扫描错误和传输错误终止整个运行，此时不写回任何文件。
    pub async fn run(&self, root: &Path) -> Result<DocGenOutcome, DocGenError> {
        let mut scanner = SourceScanner::new(self.config.clone())?;
        let scan = scanner.scan(root)?;
        let mut store = scan.store;
        let mut usage = TokenUsage::default();

        usage += self.reference_pass(&mut store, &scan.imports).await;
        usage += self.generation_pass(&mut store).await?;

        let patch = patch_files(&store, self.config.dry_run);

        if let Some(path) = &self.config.report_path {
            write_report(path, &build_rows(&store))?;
        }

        let mut summary = RunSummary {
            files_patched: patch.files_patched,
            patch_failures: patch.failures,
            usage,
            ..RunSummary::default()
        };
        for unit in store.iter().filter(|u| u.custom) {
            summary.total_units += 1;
            match unit.state {
                UnitState::Generated => summary.generated += 1,
                UnitState::Reused => summary.reused += 1,
                UnitState::Failed { .. } => summary.failed += 1,
                UnitState::Pending => {}
            }
        }

        info!(
            "Done: {} units, {} generated, {} reused, {} failed, {} files updated",
            summary.total_units,
            summary.generated,
            summary.reused,
            summary.failed,
            summary.files_patched
        );
        Ok(DocGenOutcome { store, summary })
    }

    fn shortener(&self) -> DocShortener<'_> {
        DocShortener::new(
            self.config.ref_doc,
            self.generator.as_ref(),
            &self.config.stop_markers,
        )
    }

    /// 为无依赖的名称查找参考文档
    ///
    /// 项目内定义的叶子找到文档后标记为复用，不再生成。
    async fn reference_pass(&self, store: &mut CodeUnitStore, imports: &ImportSet) -> TokenUsage {
        let shortener = self.shortener();
        let mut usage = TokenUsage::default();
        let leaves = store.leaf_names();
        let mut found = 0;

        for name in &leaves {
            let Some(doc) = self.resolver.resolve(name, imports) else {
                continue;
            };
            let (short, used) = shortener.shorten(name, &doc).await;
            usage += used;
            found += 1;

            let custom = store.get(name).custom;
            if custom {
                info!("Reusing reference docs for `{}`", name);
            }
            store.merge(
                name,
                UnitUpdate {
                    documentation: Some(doc),
                    documentation_short: Some(short),
                    state: custom.then_some(UnitState::Reused),
                    ..UnitUpdate::default()
                },
            );
        }

        info!(
            "Reference docs found for {} of {} leaf names",
            found,
            leaves.len()
        );
        usage
    }

    async fn generation_pass(&self, store: &mut CodeUnitStore) -> Result<TokenUsage, DocGenError> {
        let mut validator =
            Validator::new(self.config.stop_markers.clone()).map_err(DocGenError::Validator)?;
        let shortener = self.shortener();
        let mut usage = TokenUsage::default();

        let pending: Vec<String> = store
            .iter()
            .filter(|u| u.custom && u.state == UnitState::Pending)
            .map(|u| u.name.clone())
            .collect();
        let mut scheduler = Scheduler::new(pending);
        let total = scheduler.len();
        let width = total.to_string().len();
        let max = self.config.max_retries;
        let mut index = 0;

        while let Some(name) = scheduler.next(store) {
            index += 1;
            let unit = store.get(&name).into_owned();
            let Some(tree) = unit.tree.as_ref() else {
                warn!("No syntax tree for `{}`, skipping", name);
                continue;
            };

            let base_text = match unit.kind {
                UnitKind::Class => class_base_text(store, &unit),
                _ => None,
            };
            let source = base_text
                .as_deref()
                .or(unit.original_text.as_deref())
                .unwrap_or_default();
            let request = prompts::generation_request(source, &store.reference_docs(&name));

            let mut accepted: Option<(Accepted, u32)> = None;
            let mut last_failure: Option<ValidationFailure> = None;
            for attempt in 1..=max {
                let started = AttemptEntry::start(&name, attempt, max);
                let output = match self.generator.generate(&request).await {
                    Ok(output) => output,
                    Err(e) => {
                        self.record(started.finish(
                            AttemptStatus::TransportError,
                            Some(e.to_string()),
                            TokenUsage::default(),
                            None,
                        ));
                        return Err(DocGenError::Transport(e));
                    }
                };
                usage += output.usage;

                match validator.validate(tree, &output.text) {
                    Ok(result) => {
                        self.record(started.finish(
                            AttemptStatus::Accepted,
                            None,
                            output.usage,
                            Some(&output.text),
                        ));
                        accepted = Some((result, attempt));
                        break;
                    }
                    Err(failure) => {
                        debug!(
                            "Attempt {}/{} for `{}` rejected: {}",
                            attempt, max, name, failure
                        );
                        self.record(started.finish(
                            AttemptStatus::Rejected,
                            Some(failure.to_string()),
                            output.usage,
                            Some(&output.text),
                        ));
                        last_failure = Some(failure);
                    }
                }
            }

            match accepted {
                Some((result, attempt)) => {
                    let documentation_short = match &result.documentation {
                        Some(doc) => {
                            let (short, used) = shortener.shorten(&name, doc).await;
                            usage += used;
                            Some(short)
                        }
                        None => {
                            warn!("Generated code for `{}` has no docstring", name);
                            None
                        }
                    };
                    store.merge(
                        &name,
                        UnitUpdate {
                            generated_text: Some(result.text),
                            documentation: result.documentation,
                            documentation_short,
                            base_text,
                            state: Some(UnitState::Generated),
                            ..UnitUpdate::default()
                        },
                    );
                    info!(
                        "[{:0width$}/{}] Generated docs for `{}` in {}/{} tries",
                        index,
                        total,
                        name,
                        attempt,
                        max,
                        width = width
                    );
                }
                None => {
                    let reason = last_failure
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "no attempts".to_string());
                    info!(
                        "[{:0width$}/{}] Could not generate docs for `{}` after {} tries",
                        index,
                        total,
                        name,
                        max,
                        width = width
                    );
                    info!("Reason: {}", reason);
                    store.merge(
                        &name,
                        UnitUpdate {
                            base_text,
                            state: Some(UnitState::Failed { reason }),
                            ..UnitUpdate::default()
                        },
                    );
                }
            }
        }

        Ok(usage)
    }

    fn record(&self, entry: AttemptEntry) {
        if let Some(logger) = &self.attempt_log {
            logger.record(&entry);
        }
    }
}

/// 把已生成的方法写入类的原始源码，得到类的生成基准
///
/// 没有可替换的方法时返回 `None`。
fn class_base_text(store: &CodeUnitStore, class: &CodeUnit) -> Option<String> {
    let original = class.original_text.as_deref()?;
    let prefix = format!("{}.", class.name);
    let mut text = original.to_string();

    for dep in class.dependencies.iter().filter(|d| d.starts_with(&prefix)) {
        let method = store.get(dep);
        if method.kind != UnitKind::Method || method.state != UnitState::Generated {
            continue;
        }
        let (Some(before), Some(after)) = (
            method.original_text.as_deref(),
            method.generated_text.as_deref(),
        ) else {
            continue;
        };
        if before == after {
            continue;
        }
        match splice(dep, &text, before, after, &method.indent) {
            Ok(patched) => text = patched,
            Err(e) => warn!("Could not merge `{}` into class `{}`: {}", dep, class.name, e),
        }
    }

    (text != original).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::doc_generator::generator::testing::{EchoGenerator, ScriptedGenerator};
    use crate::services::doc_generator::reference::StaticDocIndex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn project(source: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("module.py");
        fs::write(&path, source).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_docstring_added_and_file_patched() {
        let (dir, path) = project("def add(a, b):\n    return a + b\n");
        let generator = Arc::new(ScriptedGenerator::new([
            "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n```\n<STOP>",
        ]));
        let service = DocGenService::new(DocGenConfig::default(), generator.clone());

        let outcome = service.run(dir.path()).await.unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n"
        );
        let unit = outcome.store.get("add");
        assert_eq!(unit.state, UnitState::Generated);
        assert_eq!(unit.documentation.as_deref(), Some("Add two numbers."));
        assert_eq!(unit.original_text.as_deref(), Some("def add(a, b):\n    return a + b"));
        assert_eq!(outcome.summary.generated, 1);
        assert_eq!(outcome.summary.files_patched, 1);
        assert_eq!(outcome.summary.usage.requests, 1);
    }

    #[tokio::test]
    async fn test_behavior_change_rejected_after_retries() {
        let source = "def add(a, b):\n    return a + b\n";
        let (dir, path) = project(source);
        let wrong = "def add(a, b):\n    \"\"\"Add.\"\"\"\n    return a - b\n<STOP>";
        let generator = Arc::new(ScriptedGenerator::new([wrong, wrong, wrong]));
        let report = dir.path().join("report.json");
        let config = DocGenConfig {
            report_path: Some(report.clone()),
            ..DocGenConfig::default()
        };
        let service = DocGenService::new(config, generator.clone());

        let outcome = service.run(&path).await.unwrap();

        assert_eq!(generator.request_count(), 3);
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.summary.files_patched, 0);
        assert!(matches!(
            outcome.store.get("add").state,
            UnitState::Failed { .. }
        ));

        let rows: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(rows[0]["status"], "failed");
        assert_eq!(rows[0]["code_after"], "-");
    }

    #[tokio::test]
    async fn test_class_generated_after_methods() {
        let source = "class Calc:\n    def __init__(self, value):\n        self.value = value\n\n    def add(self, x):\n        return self.value + x\n";
        let documented = "class Calc:\n    \"\"\"A tiny calculator.\"\"\"\n\n    def __init__(self, value):\n        \"\"\"Store the start value.\"\"\"\n        self.value = value\n\n    def add(self, x):\n        \"\"\"Add x to the value.\"\"\"\n        return self.value + x";
        let (dir, path) = project(source);
        let generator = Arc::new(ScriptedGenerator::new([
            "def __init__(self, value):\n    \"\"\"Store the start value.\"\"\"\n    self.value = value\n<STOP>".to_string(),
            "def add(self, x):\n    \"\"\"Add x to the value.\"\"\"\n    return self.value + x\n<STOP>".to_string(),
            format!("{documented}\n```\n<STOP>"),
        ]));
        let service = DocGenService::new(DocGenConfig::default(), generator.clone());

        let outcome = service.run(dir.path()).await.unwrap();

        let requests = generator.requests.lock();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].user_prompt.contains("def __init__(self, value):"));
        assert!(requests[1].user_prompt.contains("def add(self, x):"));
        assert!(requests[2].user_prompt.contains("\"\"\"Store the start value.\"\"\""));
        assert!(requests[2]
            .user_prompt
            .contains("Function: Calc.add\nDocumentation: Add x to the value."));

        assert_eq!(outcome.summary.generated, 3);
        assert_eq!(outcome.summary.patch_failures, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{documented}\n"));
    }

    #[tokio::test]
    async fn test_documented_tree_is_left_untouched() {
        let source = "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n\n\ndef twice(x):\n    \"\"\"Double x.\"\"\"\n    return add(x, x)\n";
        let (dir, path) = project(source);
        let service = DocGenService::new(DocGenConfig::default(), Arc::new(EchoGenerator));

        let outcome = service.run(dir.path()).await.unwrap();

        assert_eq!(outcome.summary.generated, 2);
        assert_eq!(outcome.summary.files_patched, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_run() {
        let source = "def add(a, b):\n    return a + b\n";
        let (dir, path) = project(source);
        let service = DocGenService::new(
            DocGenConfig::default(),
            Arc::new(ScriptedGenerator::new(Vec::<String>::new())),
        );

        let result = service.run(dir.path()).await;

        assert!(matches!(result, Err(DocGenError::Transport(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[tokio::test]
    async fn test_leaf_reference_docs() {
        let source = "from math import *\n\n\ndef sqrt(x):\n    return x ** 0.5\n\n\ndef pairs(a, b):\n    return list(zip(a, b))\n";
        let (dir, _path) = project(source);
        let generator = Arc::new(ScriptedGenerator::new([
            "def pairs(a, b):\n    \"\"\"Pair up items.\"\"\"\n    return list(zip(a, b))\n<STOP>",
        ]));
        let index: HashMap<String, String> = [
            ("builtins.zip", "Iterate in parallel.\n\nMore text."),
            ("math.sqrt", "Return the square root of x."),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let service = DocGenService::new(DocGenConfig::default(), generator.clone())
            .with_resolver(Box::new(StaticDocIndex::new(index)));

        let outcome = service.run(dir.path()).await.unwrap();

        assert_eq!(generator.request_count(), 1);
        let prompt = generator.requests.lock()[0].user_prompt.clone();
        assert!(prompt.contains("Function: zip\nDocumentation: Iterate in parallel."));
        assert!(!prompt.contains("More text."));

        let sqrt = outcome.store.get("sqrt");
        assert_eq!(sqrt.state, UnitState::Reused);
        assert_eq!(sqrt.documentation.as_deref(), Some("Return the square root of x."));
        assert_eq!(outcome.store.get("zip").state, UnitState::Pending);
        assert_eq!(outcome.summary.reused, 1);
        assert_eq!(outcome.summary.generated, 1);
    }

    #[tokio::test]
    async fn test_attempt_log_records_every_try() {
        let (dir, _path) = project("def add(a, b):\n    return a + b\n");
        let generator = Arc::new(ScriptedGenerator::new([
            "def add(a, b):\n    return a * b\n<STOP>",
            "def add(a, b):\n    \"\"\"Add.\"\"\"\n    return a + b\n<STOP>",
        ]));
        let log_path = dir.path().join("attempts.jsonl");
        let service = DocGenService::new(DocGenConfig::default(), generator)
            .with_attempt_log(AttemptLogger::new(log_path.clone()));

        service.run(dir.path()).await.unwrap();

        let lines: Vec<serde_json::Value> = fs::read_to_string(&log_path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "rejected");
        assert_eq!(lines[1]["status"], "accepted");
        assert_eq!(lines[1]["attempt"], 2);
    }
}
