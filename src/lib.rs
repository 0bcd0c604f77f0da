//! Gremlin Translation - Cypher 查询计划到 Gremlin 遍历的翻译构建器
//!
//! 由上游规划器逐步调用构建器方法，生成与目标无关的遍历程序，支持：
//! - Gremlin-Groovy 脚本文本输出
//! - 可序列化的字节码指令列表
//! - 在内存图上直接执行的遍历对象
//! - 别名管理、NULL 属性改写为删除、投影/选择的元数校验

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod translation;
pub mod types;

// 重导出常用类型
pub use config::{EngineConfig, ScriptConfig, TranslatorConfig};
pub use engine::{Traversal, TraversalResult};
pub use error::{Error, Result};
pub use graph::{Edge, EdgeId, Graph, Vertex, VertexId};
pub use translation::{
    Bytecode, BytecodeBuilder, CustomFunction, GroovyBuilder, Program, Step, TranslationBuilder,
    TraversalBuilder, P,
};
pub use types::{Cardinality, Column, Order, Scope, Value, NULL};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
