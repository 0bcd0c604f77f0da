//! Translation builder and its targets
//!
//! 规划器通过 [`TranslationBuilder`] 逐步构建遍历程序，再由目标适配器
//! 渲染为脚本、字节码或可执行遍历

mod alias;
mod builder;
mod bytecode;
mod groovy;
mod predicate;
mod step;
mod traversal;

pub use alias::AliasHistory;
pub use builder::{Fragment, TranslationBuilder};
pub use bytecode::{Argument, Bytecode, BytecodeBuilder, Instruction, Token};
pub use groovy::GroovyBuilder;
pub use predicate::P;
pub use step::{CustomFunction, Labels, Program, Step};
pub use traversal::TraversalBuilder;
