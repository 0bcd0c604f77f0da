//! 命令行支持
//!
//! 遍历结果的表格与垂直格式输出

mod printer;

pub use printer::{PrintMode, Printer};
