//! 边定义

use crate::graph::vertex::VertexId;
use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 边 ID（全局唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EdgeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 边
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// 边 ID
    id: EdgeId,
    /// 边标签
    label: String,
    /// 源顶点 ID
    src: VertexId,
    /// 目标顶点 ID
    dst: VertexId,
    /// 属性（边属性只有单值）
    properties: IndexMap<String, Value>,
}

impl Edge {
    /// 创建新边
    pub fn new(id: EdgeId, label: impl Into<String>, src: VertexId, dst: VertexId) -> Self {
        Self {
            id,
            label: label.into(),
            src,
            dst,
            properties: IndexMap::new(),
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn src(&self) -> VertexId {
        self.src
    }

    pub fn dst(&self) -> VertexId {
        self.dst
    }

    /// 给定一个端点，返回另一个端点
    pub fn other(&self, vertex: VertexId) -> VertexId {
        if vertex == self.src {
            self.dst
        } else {
            self.src
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: String, value: Value) {
        self.properties.insert(key, value);
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }
}
