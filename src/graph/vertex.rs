//! 顶点定义
//!
//! 顶点携带一个标签和多值属性（list 基数）

use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 顶点 ID（全局唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u64);

impl VertexId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for VertexId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 顶点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    /// 顶点 ID
    id: VertexId,
    /// 顶点标签
    label: String,
    /// 属性：每个 key 保存按插入顺序排列的值列表
    properties: IndexMap<String, Vec<Value>>,
}

impl Vertex {
    /// 创建新顶点
    pub fn new(id: VertexId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            properties: IndexMap::new(),
        }
    }

    /// 获取顶点 ID
    pub fn id(&self) -> VertexId {
        self.id
    }

    /// 获取顶点标签
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 获取某个 key 的全部值
    pub fn values(&self, key: &str) -> &[Value] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 获取某个 key 的第一个值
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.values(key).first()
    }

    pub fn has_property(&self, key: &str) -> bool {
        !self.values(key).is_empty()
    }

    /// 设置单值属性（替换已有的所有值）
    pub fn set_property(&mut self, key: String, value: Value) {
        self.properties.insert(key, vec![value]);
    }

    /// 追加 list 基数属性值
    pub fn push_property(&mut self, key: String, value: Value) {
        self.properties.entry(key).or_default().push(value);
    }

    /// 移除属性；给定 value 时只移除第一个相等的值
    pub fn remove_property(&mut self, key: &str, value: Option<&Value>) {
        match value {
            None => {
                self.properties.shift_remove(key);
            }
            Some(value) => {
                if let Some(values) = self.properties.get_mut(key) {
                    if let Some(pos) = values.iter().position(|v| v == value) {
                        values.remove(pos);
                    }
                    if values.is_empty() {
                        self.properties.shift_remove(key);
                    }
                }
            }
        }
    }

    /// 获取所有属性
    pub fn properties(&self) -> &IndexMap<String, Vec<Value>> {
        &self.properties
    }
}
