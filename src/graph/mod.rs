//! 图核心模块
//!
//! 定义顶点、边和内存图，供参考执行引擎使用

mod edge;
mod graph;
mod index;
mod vertex;

pub use edge::{Edge, EdgeId};
pub use graph::Graph;
pub use index::{EdgeIndex, VertexIndex};
pub use vertex::{Vertex, VertexId};
