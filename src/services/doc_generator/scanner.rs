//! 源码扫描器
//!
//! 遍历源码目录，把每个 `.py` 文件解析为代码单元并写入存储，同时收集导入语句。
//! 任何文件读取或解析失败都会中止整个扫描。

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::store::CodeUnitStore;
use super::types::{DocGenConfig, UnitKind, UnitUpdate};
use crate::services::code_analyzer::{CallFilter, ImportSet, PythonParser, SyntaxError};

/// 找不到缩进块时使用的缩进
const FALLBACK_INDENT: &str = "    ";

/// 扫描结果
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub store: CodeUnitStore,
    pub imports: ImportSet,
    /// 按遍历顺序排列的源文件
    pub files: Vec<PathBuf>,
}

/// 源码扫描器
pub struct SourceScanner {
    config: DocGenConfig,
    /// 编译后的忽略模式（glob patterns）
    ignore_patterns: Vec<glob::Pattern>,
    filter: CallFilter,
    parser: PythonParser,
}

impl SourceScanner {
    pub fn new(config: DocGenConfig) -> Result<Self, ScanError> {
        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Invalid ignore pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        let filter = CallFilter::new(&config.ignored_calls, &config.ignored_methods);
        let parser = PythonParser::new().map_err(ScanError::Parser)?;

        Ok(Self {
            config,
            ignore_patterns,
            filter,
            parser,
        })
    }

    /// 扫描文件或目录
    pub fn scan(&mut self, root: &Path) -> Result<ScanOutput, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }

        info!("Starting source scan: {}", root.display());
        let files = self.collect_files(root)?;

        let mut output = ScanOutput::default();
        for path in &files {
            self.scan_file(path, &mut output)?;
        }
        output.files = files;

        info!(
            "Scan completed: {} files, {} custom units, {} referenced names",
            output.files.len(),
            output.store.custom_names().len(),
            output.store.len()
        );
        debug!("Code units:\n{}", output.store);
        Ok(output)
    }

    /// 收集待扫描的 Python 文件（按文件名排序）
    fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                let ignored = self.should_ignore(entry.path(), &name);
                if ignored {
                    debug!("Ignoring: {}", entry.path().display());
                }
                !ignored
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_python_file(path) {
                continue;
            }

            let size = entry.metadata()?.len();
            if size > self.config.max_file_size {
                warn!(
                    "Skipping oversized file: {} ({} bytes)",
                    path.display(),
                    size
                );
                continue;
            }
            files.push(path.to_path_buf());
        }
        Ok(files)
    }

    /// 解析单个文件并合并到存储
    fn scan_file(&mut self, path: &Path, output: &mut ScanOutput) -> Result<(), ScanError> {
        let source =
            fs::read_to_string(path).map_err(|e| ScanError::IoError(path.to_path_buf(), e))?;
        let analysis = self
            .parser
            .analyze_module(&source, &self.filter)
            .map_err(|source| ScanError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let fallback_indent = match &analysis.indent_unit {
            Some(indent) => indent.clone(),
            None => FALLBACK_INDENT.to_string(),
        };

        debug!(
            "{}: {} definitions, {} imports",
            path.display(),
            analysis.definitions.len(),
            analysis.imports.statements.len()
        );

        for def in analysis.definitions {
            if output.store.get(&def.qualified_name).custom {
                warn!(
                    "Duplicate definition `{}` in {}, the later one wins",
                    def.qualified_name,
                    path.display()
                );
            }
            let kind = UnitKind::from(def.kind);
            let indent = match (kind, def.indent) {
                (UnitKind::Method, Some(prefix)) => Some(prefix),
                (UnitKind::Method, None) => {
                    if analysis.indent_unit.is_none() {
                        error!(
                            "Could not detect indentation of `{}` in {}, falling back to four spaces",
                            def.qualified_name,
                            path.display()
                        );
                    }
                    Some(fallback_indent.clone())
                }
                _ => None,
            };
            output.store.merge(
                &def.qualified_name,
                UnitUpdate {
                    kind: Some(kind),
                    original_text: Some(def.text),
                    tree: Some(def.tree),
                    dependencies: def.calls,
                    path: Some(path.to_path_buf()),
                    indent,
                    custom: Some(true),
                    ..UnitUpdate::default()
                },
            );
        }
        output.imports.extend(analysis.imports);
        Ok(())
    }

    /// 检查是否应该忽略该路径
    fn should_ignore(&self, path: &Path, name: &str) -> bool {
        // 忽略隐藏文件/目录（以 . 开头）
        if name.starts_with('.') {
            return true;
        }

        self.ignore_patterns.iter().any(|pattern| {
            pattern.matches(name) || path.to_str().is_some_and(|p| pattern.matches(p))
        })
    }
}

fn is_python_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("py"))
}

/// 扫描错误类型
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("路径不存在: {0}")]
    PathNotFound(PathBuf),

    #[error("IO错误 ({0}): {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("遍历目录失败: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("解析失败 ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },

    #[error("初始化解析器失败: {0}")]
    Parser(SyntaxError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        let pkg = dir.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        write(
            &pkg.join("b_shapes.py"),
            "import numpy as np\n\n\nclass Square:\n    def area(self):\n        return np.square(self.side)\n",
        );
        write(
            &pkg.join("a_util.py"),
            "def helper(x):\n    return x + 1\n\n\ndef main():\n    print(helper(1))\n",
        );
        write(&dir.path().join("README.md"), "# readme");

        // 应该被忽略的目录
        let ignored = dir.path().join("__pycache__");
        fs::create_dir(&ignored).unwrap();
        write(&ignored.join("cached.py"), "def cached(:\n");
        let hidden = dir.path().join(".venv");
        fs::create_dir(&hidden).unwrap();
        write(&hidden.join("site.py"), "def site(): pass\n");

        dir
    }

    #[test]
    fn test_scan_directory() {
        let test_dir = create_test_dir();
        let mut scanner = SourceScanner::new(DocGenConfig::default()).unwrap();

        let output = scanner.scan(test_dir.path()).unwrap();

        assert_eq!(output.files.len(), 2);
        assert!(output.files[0].ends_with("pkg/a_util.py"));
        assert_eq!(
            output.store.custom_names(),
            vec!["helper", "main", "Square.area", "Square"]
        );
        assert_eq!(output.imports.statements, vec!["import numpy as np"]);

        let area = output.store.get("Square.area");
        assert_eq!(area.kind, UnitKind::Method);
        assert_eq!(area.indent, "    ");
        assert_eq!(area.dependencies, vec!["np.square"]);

        // 外部引用注册为桩
        let stub = output.store.get("np.square");
        assert!(output.store.contains("np.square"));
        assert!(!stub.custom);
        assert_eq!(stub.kind, UnitKind::Unknown);

        // print 在默认忽略列表中
        assert_eq!(output.store.get("main").dependencies, vec!["helper"]);
    }

    #[test]
    fn test_method_indent_follows_its_class_body() {
        let dir = TempDir::new().unwrap();
        write(
            &dir.path().join("mixed.py"),
            "if FLAG:\n  MODE = 1\n\n\nclass Wide:\n    def f(self):\n        return MODE\n",
        );

        let mut scanner = SourceScanner::new(DocGenConfig::default()).unwrap();
        let output = scanner.scan(dir.path()).unwrap();
        assert_eq!(output.store.get("Wide.f").indent, "    ");
        assert_eq!(output.store.get("Wide").indent, "");
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("ok.py"), "def ok():\n    pass\n");
        write(&dir.path().join("zz_broken.py"), "def broken(:\n    pass\n");

        let mut scanner = SourceScanner::new(DocGenConfig::default()).unwrap();
        let err = scanner.scan(dir.path()).unwrap_err();
        match err {
            ScanError::Parse { path, .. } => assert!(path.ends_with("zz_broken.py")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_path() {
        let mut scanner = SourceScanner::new(DocGenConfig::default()).unwrap();
        let err = scanner.scan(Path::new("/nonexistent/docgen")).unwrap_err();
        assert!(matches!(err, ScanError::PathNotFound(_)));
    }

    #[test]
    fn test_single_file_and_oversized_skip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("one.py");
        write(&file, "def one():\n    return 1\n");

        let mut scanner = SourceScanner::new(DocGenConfig::default()).unwrap();
        let output = scanner.scan(&file).unwrap();
        assert_eq!(output.store.custom_names(), vec!["one"]);

        let config = DocGenConfig {
            max_file_size: 4,
            ..DocGenConfig::default()
        };
        let mut scanner = SourceScanner::new(config).unwrap();
        let output = scanner.scan(dir.path()).unwrap();
        assert!(output.files.is_empty());
        assert!(output.store.is_empty());
    }

    #[test]
    fn test_duplicate_definition_later_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("a.py"), "def run():\n    return first()\n");
        write(&dir.path().join("b.py"), "def run():\n    return second()\n");

        let mut scanner = SourceScanner::new(DocGenConfig::default()).unwrap();
        let output = scanner.scan(dir.path()).unwrap();
        let run = output.store.get("run");
        assert!(run.path.as_ref().unwrap().ends_with("b.py"));
        assert_eq!(run.original_text.as_deref(), Some("def run():\n    return second()"));
        assert_eq!(run.dependencies, vec!["first", "second"]);
    }

    #[test]
    fn test_should_ignore() {
        let scanner = SourceScanner::new(DocGenConfig::default()).unwrap();

        assert!(scanner.should_ignore(Path::new(".gitignore"), ".gitignore"));
        assert!(scanner.should_ignore(Path::new("node_modules"), "node_modules"));
        assert!(scanner.should_ignore(Path::new("pkg.egg-info"), "pkg.egg-info"));
        assert!(!scanner.should_ignore(Path::new("main.py"), "main.py"));
    }
}
