//! 图数据结构
//!
//! 参考执行引擎使用的内存属性图

use super::edge::{Edge, EdgeId};
use super::index::{EdgeIndex, VertexIndex};
use super::vertex::{Vertex, VertexId};
use crate::error::{Error, Result};
use crate::types::{Cardinality, Value};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 内存属性图
pub struct Graph {
    /// 顶点索引
    vertex_index: VertexIndex,
    /// 边索引
    edge_index: EdgeIndex,
    /// 下一个顶点 ID
    next_vertex_id: AtomicU64,
    /// 下一个边 ID
    next_edge_id: AtomicU64,
    /// 顶点表（按 ID 有序，保证遍历顺序确定）
    vertices: RwLock<BTreeMap<VertexId, Vertex>>,
    /// 边表
    edges: RwLock<BTreeMap<EdgeId, Edge>>,
}

impl Graph {
    /// 创建空图
    pub fn new() -> Self {
        Self {
            vertex_index: VertexIndex::new(),
            edge_index: EdgeIndex::new(),
            next_vertex_id: AtomicU64::new(1),
            next_edge_id: AtomicU64::new(1),
            vertices: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(BTreeMap::new()),
        }
    }

    /// 创建可共享的内存图
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ==================== 顶点操作 ====================

    /// 添加顶点
    pub fn add_vertex(&self, label: &str) -> VertexId {
        let id = VertexId::new(self.next_vertex_id.fetch_add(1, Ordering::SeqCst));
        self.vertex_index.add_label(label, id);
        self.vertices.write().insert(id, Vertex::new(id, label));
        id
    }

    /// 获取顶点
    pub fn get_vertex(&self, id: VertexId) -> Option<Vertex> {
        self.vertices.read().get(&id).cloned()
    }

    /// 所有顶点 ID（升序）
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices.read().keys().copied().collect()
    }

    /// 带任一给定标签的顶点 ID（升序，经标签索引查找）
    pub fn vertex_ids_by_label<S: AsRef<str>>(&self, labels: &[S]) -> Vec<VertexId> {
        let ids: BTreeSet<VertexId> = labels
            .iter()
            .flat_map(|label| self.vertex_index.get_by_label(label.as_ref()))
            .collect();
        ids.into_iter().collect()
    }

    /// 写入顶点属性
    pub fn set_vertex_property(
        &self,
        id: VertexId,
        key: &str,
        value: Value,
        cardinality: Cardinality,
    ) -> Result<()> {
        let mut vertices = self.vertices.write();
        let vertex = vertices
            .get_mut(&id)
            .ok_or(Error::VertexNotFound(id.as_u64()))?;
        match cardinality {
            Cardinality::Single => vertex.set_property(key.to_string(), value),
            Cardinality::List => vertex.push_property(key.to_string(), value),
        }
        Ok(())
    }

    /// 移除顶点属性；给定 value 时只移除该值
    pub fn remove_vertex_property(
        &self,
        id: VertexId,
        key: &str,
        value: Option<&Value>,
    ) -> Result<()> {
        let mut vertices = self.vertices.write();
        let vertex = vertices
            .get_mut(&id)
            .ok_or(Error::VertexNotFound(id.as_u64()))?;
        vertex.remove_property(key, value);
        Ok(())
    }

    /// 删除顶点及其关联边
    pub fn remove_vertex(&self, id: VertexId) -> Result<()> {
        let vertex = self
            .vertices
            .write()
            .remove(&id)
            .ok_or(Error::VertexNotFound(id.as_u64()))?;
        self.vertex_index.remove(id, vertex.label());

        let outgoing = self.edge_index.get_outgoing(id);
        let incoming = self.edge_index.get_incoming(id);
        for edge_id in outgoing.into_iter().chain(incoming) {
            // 自环边会出现两次
            if self.edges.read().contains_key(&edge_id) {
                self.remove_edge(edge_id)?;
            }
        }

        Ok(())
    }

    /// 获取顶点数量
    pub fn vertex_count(&self) -> usize {
        self.vertices.read().len()
    }

    // ==================== 边操作 ====================

    /// 添加边
    pub fn add_edge(&self, label: &str, src: VertexId, dst: VertexId) -> Result<EdgeId> {
        {
            let vertices = self.vertices.read();
            if !vertices.contains_key(&src) {
                return Err(Error::VertexNotFound(src.as_u64()));
            }
            if !vertices.contains_key(&dst) {
                return Err(Error::VertexNotFound(dst.as_u64()));
            }
        }

        let id = EdgeId::new(self.next_edge_id.fetch_add(1, Ordering::SeqCst));
        self.edge_index.add_edge(id, src, dst);
        self.edges.write().insert(id, Edge::new(id, label, src, dst));

        Ok(id)
    }

    /// 获取边
    pub fn get_edge(&self, id: EdgeId) -> Option<Edge> {
        self.edges.read().get(&id).cloned()
    }

    /// 所有边 ID（升序）
    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.read().keys().copied().collect()
    }

    /// 获取顶点的所有出边
    pub fn get_outgoing_edges(&self, vertex_id: VertexId) -> Vec<Edge> {
        self.edge_index
            .get_outgoing(vertex_id)
            .iter()
            .filter_map(|&id| self.get_edge(id))
            .collect()
    }

    /// 获取顶点的所有入边
    pub fn get_incoming_edges(&self, vertex_id: VertexId) -> Vec<Edge> {
        self.edge_index
            .get_incoming(vertex_id)
            .iter()
            .filter_map(|&id| self.get_edge(id))
            .collect()
    }

    /// 写入边属性
    pub fn set_edge_property(&self, id: EdgeId, key: &str, value: Value) -> Result<()> {
        let mut edges = self.edges.write();
        let edge = edges.get_mut(&id).ok_or(Error::EdgeNotFound(id.as_u64()))?;
        edge.set_property(key.to_string(), value);
        Ok(())
    }

    /// 移除边属性
    pub fn remove_edge_property(&self, id: EdgeId, key: &str) -> Result<()> {
        let mut edges = self.edges.write();
        let edge = edges.get_mut(&id).ok_or(Error::EdgeNotFound(id.as_u64()))?;
        edge.remove_property(key);
        Ok(())
    }

    /// 删除边
    pub fn remove_edge(&self, id: EdgeId) -> Result<()> {
        self.edges
            .write()
            .remove(&id)
            .ok_or(Error::EdgeNotFound(id.as_u64()))?;
        self.edge_index.remove(id);
        Ok(())
    }

    /// 获取边数量
    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
