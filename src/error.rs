//! 错误类型定义

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// 步骤参数数量不合法（例如没有 key 的 project）
    #[error("参数数量错误: {0}")]
    Arity(String),

    /// 目标表示无法渲染的操作数，在 build 时报告
    #[error("不支持的操作数: {0}")]
    UnsupportedOperand(String),

    #[error("遍历执行错误: {0}")]
    Execution(String),

    #[error("顶点不存在: {0}")]
    VertexNotFound(u64),

    #[error("边不存在: {0}")]
    EdgeNotFound(u64),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}
