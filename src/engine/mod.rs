//! Reference traversal engine
//!
//! 在内存图上执行翻译得到的遍历程序，用于验证翻译结果的语义

mod executor;
mod functions;
mod plan;
mod traverser;

pub use executor::{Executor, Traversal, TraversalResult, TraversalStats};
pub use functions::apply as apply_function;
pub use plan::{ByModulator, Op, Plan, RepeatSpec};
pub use traverser::{PathEntry, Traverser};
