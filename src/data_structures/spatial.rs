//! Hierarchical transforms with a per-frame cache.
//!
//! Nodes live in a [`SpatialTree`] arena and refer to each other by
//! [`SpatialId`]. Each node keeps its local matrix, the combined (world) matrix
//! it computed last and the [`FrameStamp`] it computed it for. A combined
//! matrix is reused only when it was computed for the very stamp being asked
//! about; [`SpatialTree::flush`] drops the stamp of a node and of everything
//! below it.

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::frame::FrameStamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpatialId(usize);

impl SpatialId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
struct SpatialNode {
    local: Matrix4<f32>,
    combined: Matrix4<f32>,
    parent: Option<SpatialId>,
    children: Vec<SpatialId>,
    cached: Option<FrameStamp>,
}

#[derive(Debug, Default)]
pub struct SpatialTree {
    nodes: Vec<SpatialNode>,
    recomputes: u64,
}

impl SpatialTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, local: Matrix4<f32>) -> SpatialId {
        self.nodes.push(SpatialNode {
            local,
            combined: Matrix4::identity(),
            parent: None,
            children: Vec::new(),
            cached: None,
        });
        SpatialId(self.nodes.len() - 1)
    }

    pub fn add_child(&mut self, parent: SpatialId, local: Matrix4<f32>) -> SpatialId {
        let id = self.add_root(local);
        self.set_parent(id, Some(parent));
        id
    }

    /// Re-attach `id` below `parent` (or make it a root).
    ///
    /// Panics when the new parent lies inside the subtree of `id`.
    pub fn set_parent(&mut self, id: SpatialId, parent: Option<SpatialId>) {
        if let Some(parent) = parent {
            assert!(
                !self.is_ancestor_or_self(id, parent),
                "attaching {id:?} below {parent:?} would create a cycle"
            );
        }
        if let Some(old) = self.nodes[id.0].parent.take() {
            self.nodes[old.0].children.retain(|child| *child != id);
        }
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes[id.0].parent = parent;
        self.flush(id);
    }

    fn is_ancestor_or_self(&self, ancestor: SpatialId, mut node: SpatialId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes[node.0].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    pub fn parent(&self, id: SpatialId) -> Option<SpatialId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: SpatialId) -> &[SpatialId] {
        &self.nodes[id.0].children
    }

    pub fn local(&self, id: SpatialId) -> Matrix4<f32> {
        self.nodes[id.0].local
    }

    /// Replace the local matrix; the node and its subtree recompute on next access.
    pub fn set_local(&mut self, id: SpatialId, local: Matrix4<f32>) {
        self.nodes[id.0].local = local;
        self.flush(id);
    }

    /// Invalidate the cached combined matrix of `id` and of all its descendants.
    pub fn flush(&mut self, id: SpatialId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let node = &mut self.nodes[current.0];
            node.cached = None;
            pending.extend_from_slice(&node.children);
        }
    }

    pub fn is_cached(&self, id: SpatialId, frame: FrameStamp) -> bool {
        self.nodes[id.0].cached == Some(frame)
    }

    /// World matrix of `id` for `frame`: `parent.combined(frame) * local`.
    ///
    /// Walks up until it meets an ancestor already computed for `frame`, then
    /// fills the chain back down.
    pub fn combined(&mut self, id: SpatialId, frame: FrameStamp) -> Matrix4<f32> {
        let mut chain = Vec::new();
        let mut base = Matrix4::identity();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if node.cached == Some(frame) {
                base = node.combined;
                break;
            }
            chain.push(current);
            cursor = node.parent;
        }
        for current in chain.into_iter().rev() {
            let node = &mut self.nodes[current.0];
            base = base * node.local;
            node.combined = base;
            node.cached = Some(frame);
            self.recomputes += 1;
        }
        base
    }

    /// How many combined matrices were computed so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
