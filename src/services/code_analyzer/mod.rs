//! 代码分析器主模块
//!
//! 将 Python 源码解析为带标签的语法树，提取定义、调用引用和导入，
//! 并提供生成结果校验所需的结构比较。

mod calls;
mod imports;
mod python;
pub mod syntax;
pub mod types;

pub use calls::CallFilter;
pub use python::{dedent_keeping, literal_rows_in, PythonParser};
pub use syntax::{docstring, strip_documentation, Mismatch, StructuralComparator, SyntaxNode};
pub use types::{Definition, DefinitionKind, ImportSet, ModuleAnalysis, SyntaxError};
