//! On-the-fly caching over an abstract enumerator.
//!
//! [`CachedGraph`] records the successors of a black-box [`Explorer`] the
//! first time each node is queried and answers later queries from its own
//! arrays, so algorithms can walk an expensive or infinite state space
//! with at most one enumeration per node. It can also run without an
//! inner source as a write-once store filled through
//! [`CachedGraph::prepare_node`], or with caching disabled as a pure
//! pass-through for one-shot forward passes where memory matters more
//! than repeat-query latency.
//!
//! Successor counts are kept in a configurable integer width
//! ([`CountWidth`]) to bound overhead on very large, very-low-fanout
//! state spaces.

use crate::bitset::NodeSet;
use crate::error::{GraphError, GraphResult};
use crate::explorer::{AttributeDecl, Explorer, NullExplorer};
use crate::property::{Overlay, PropertyMap};
use crate::Node;
use kripke_values::Value;
use tracing::trace;

/// Storage width for per-node successor counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    U8,
    U16,
    U32,
    /// Start at 8 bits and widen whenever a count overflows.
    Smallest,
}

#[derive(Debug, Clone)]
enum Counts {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Counts {
    fn new(width: CountWidth) -> Self {
        match width {
            CountWidth::U8 | CountWidth::Smallest => Counts::U8(Vec::new()),
            CountWidth::U16 => Counts::U16(Vec::new()),
            CountWidth::U32 => Counts::U32(Vec::new()),
        }
    }

    fn limit(&self) -> usize {
        match self {
            Counts::U8(_) => u8::MAX as usize,
            Counts::U16(_) => u16::MAX as usize,
            Counts::U32(_) => u32::MAX as usize,
        }
    }

    fn get(&self, index: usize) -> usize {
        match self {
            Counts::U8(v) => v.get(index).copied().unwrap_or(0) as usize,
            Counts::U16(v) => v.get(index).copied().unwrap_or(0) as usize,
            Counts::U32(v) => v.get(index).copied().unwrap_or(0) as usize,
        }
    }

    fn set(&mut self, index: usize, count: usize) {
        match self {
            Counts::U8(v) => {
                if v.len() <= index {
                    v.resize(index + 1, 0);
                }
                v[index] = count as u8;
            }
            Counts::U16(v) => {
                if v.len() <= index {
                    v.resize(index + 1, 0);
                }
                v[index] = count as u16;
            }
            Counts::U32(v) => {
                if v.len() <= index {
                    v.resize(index + 1, 0);
                }
                v[index] = count as u32;
            }
        }
    }

    /// Copy into the next wider representation.
    fn widen(&mut self) {
        *self = match self {
            Counts::U8(v) => {
                trace!(entries = v.len(), "widening successor counts to 16 bits");
                Counts::U16(v.iter().map(|&c| c as u16).collect())
            }
            Counts::U16(v) => {
                trace!(entries = v.len(), "widening successor counts to 32 bits");
                Counts::U32(v.iter().map(|&c| c as u32).collect())
            }
            Counts::U32(_) => return,
        };
    }

    fn memory_bytes(&self) -> usize {
        match self {
            Counts::U8(v) => v.len(),
            Counts::U16(v) => v.len() * 2,
            Counts::U32(v) => v.len() * 4,
        }
    }
}

/// Memoizing wrapper around an [`Explorer`], or a manually driven
/// write-once successor store.
#[derive(Debug)]
pub struct CachedGraph<E = NullExplorer> {
    inner: Option<E>,
    caching: bool,
    width: CountWidth,
    visited: NodeSet,
    /// Block start per node in `cached`; -1 until first visit.
    table_start: Vec<i64>,
    counts: Counts,
    /// Concatenated successor blocks.
    cached: Vec<Node>,
    /// Derived overlays: node attributes keyed by node, edge attributes
    /// keyed by `table_start[node] + index`.
    props: PropertyMap,
    derived_node: Vec<AttributeDecl>,
    derived_edge: Vec<AttributeDecl>,
    initial: NodeSet,
    current: Option<Node>,
}

impl CachedGraph<NullExplorer> {
    /// Write-once on-the-fly store with no inner source; filled through
    /// [`CachedGraph::prepare_node`] and
    /// [`CachedGraph::set_cached_successor`].
    pub fn manual(width: CountWidth) -> Self {
        Self::build(None, width, true)
    }
}

impl<E: Explorer> CachedGraph<E> {
    /// Memoizing wrapper: each node's successors are read from `inner`
    /// at most once.
    pub fn wrapping(inner: E, width: CountWidth) -> Self {
        Self::build(Some(inner), width, true)
    }

    /// Non-caching pass-through: every query re-invokes `inner`.
    pub fn pass_through(inner: E) -> Self {
        Self::build(Some(inner), CountWidth::U8, false)
    }
}

impl<E> CachedGraph<E> {
    fn build(inner: Option<E>, width: CountWidth, caching: bool) -> Self {
        Self {
            inner,
            caching,
            width,
            visited: NodeSet::new(),
            table_start: Vec::new(),
            counts: Counts::new(width),
            cached: Vec::new(),
            props: PropertyMap::new(),
            derived_node: Vec::new(),
            derived_edge: Vec::new(),
            initial: NodeSet::new(),
            current: None,
        }
    }

    pub fn is_caching(&self) -> bool {
        self.caching
    }

    /// Number of nodes with a recorded successor block.
    pub fn num_cached_nodes(&self) -> usize {
        self.visited.len()
    }

    /// Total recorded successor entries.
    pub fn num_cached_edges(&self) -> usize {
        self.cached.len()
    }

    pub fn memory_bytes(&self) -> usize {
        self.cached.len() * 4
            + self.table_start.len() * 8
            + self.counts.memory_bytes()
            + self.visited.memory_bytes()
    }

    /// Largest successor count the current packing width can record.
    pub fn count_limit(&self) -> usize {
        self.counts.limit()
    }

    /// Attach a node attribute whose value is pulled from the inner
    /// source on each first visit.
    pub fn attach_node_attribute(&mut self, decl: AttributeDecl) -> GraphResult<()> {
        let overlay = Overlay::growable(decl.ty, decl.ty.default_value()).map_err(|source| {
            GraphError::PropertyType {
                name: decl.name.clone(),
                source,
            }
        })?;
        self.props.node.register(&decl.name, overlay)?;
        self.derived_node.push(decl);
        Ok(())
    }

    /// Attach an edge attribute, stored slot-keyed because successor
    /// counts are unknown until each node's first visit.
    pub fn attach_edge_attribute(&mut self, decl: AttributeDecl) -> GraphResult<()> {
        let overlay = Overlay::derived(decl.ty, decl.ty.default_value()).map_err(|source| {
            GraphError::PropertyType {
                name: decl.name.clone(),
                source,
            }
        })?;
        self.props.edge.register(&decl.name, overlay)?;
        self.derived_edge.push(decl);
        Ok(())
    }

    /// Mark an initial node (manual mode).
    pub fn add_initial(&mut self, node: Node) {
        self.initial.insert(node);
    }

    pub fn initial(&self) -> &NodeSet {
        &self.initial
    }

    /// Manually declare a node's successor block. Write-once: a visited
    /// node cannot be re-declared.
    pub fn prepare_node(&mut self, node: Node, out_degree: usize) -> GraphResult<()> {
        if self.visited.contains(node) {
            return Err(GraphError::DegreeDeclared {
                node,
                degree: self.counts.get(node as usize),
            });
        }
        let start = self.cached.len();
        self.record_block(node, start, out_degree)?;
        self.cached.resize(start + out_degree, 0);
        self.visited.insert(node);
        Ok(())
    }

    pub fn set_cached_successor(
        &mut self,
        node: Node,
        index: usize,
        target: Node,
    ) -> GraphResult<()> {
        let (start, degree) = self.block_of(node)?;
        if index >= degree {
            return Err(GraphError::SuccessorOutOfBounds {
                node,
                index,
                degree,
            });
        }
        self.cached[start + index] = target;
        Ok(())
    }

    /// Out-degree of the node selected by the last `query_node`.
    pub fn current_out_degree(&self) -> GraphResult<usize>
    where
        E: Explorer,
    {
        let node = self.current.ok_or(GraphError::Unpositioned)?;
        if !self.caching {
            let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
            return inner.out_degree();
        }
        Ok(self.counts.get(node as usize))
    }

    /// Successor of the node selected by the last `query_node`.
    pub fn current_successor(&self, index: usize) -> GraphResult<Node>
    where
        E: Explorer,
    {
        let node = self.current.ok_or(GraphError::Unpositioned)?;
        if !self.caching {
            let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
            return inner.successor(index);
        }
        let (start, degree) = self.block_of(node)?;
        if index >= degree {
            return Err(GraphError::SuccessorOutOfBounds {
                node,
                index,
                degree,
            });
        }
        Ok(self.cached[start + index])
    }

    /// Successor slice of a visited node.
    pub fn successors_of(&self, node: Node) -> GraphResult<&[Node]> {
        let (start, degree) = self.block_of(node)?;
        Ok(&self.cached[start..start + degree])
    }

    pub fn node_value(&self, name: &str, node: Node) -> GraphResult<Value> {
        self.props.node.get(name, node as usize, None)
    }

    pub fn set_node_value(&mut self, name: &str, node: Node, value: Value) -> GraphResult<()> {
        self.props.node.set(name, node as usize, value, None)
    }

    /// Edge attribute of a visited node's `index`-th successor.
    pub fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value> {
        let (start, degree) = self.block_of(node)?;
        if index >= degree {
            return Err(GraphError::SuccessorOutOfBounds {
                node,
                index,
                degree,
            });
        }
        self.props.edge.get(name, start + index, None)
    }

    pub fn set_edge_value(
        &mut self,
        name: &str,
        node: Node,
        index: usize,
        value: Value,
    ) -> GraphResult<()> {
        let (start, degree) = self.block_of(node)?;
        if index >= degree {
            return Err(GraphError::SuccessorOutOfBounds {
                node,
                index,
                degree,
            });
        }
        self.props.edge.set(name, start + index, value, None)
    }

    fn block_of(&self, node: Node) -> GraphResult<(usize, usize)> {
        if !self.visited.contains(node) {
            return Err(GraphError::NotPrepared { node });
        }
        let start = self.table_start[node as usize] as usize;
        Ok((start, self.counts.get(node as usize)))
    }

    fn record_block(&mut self, node: Node, start: usize, count: usize) -> GraphResult<()> {
        while count > self.counts.limit() {
            if self.width == CountWidth::Smallest && !matches!(self.counts, Counts::U32(_)) {
                self.counts.widen();
            } else {
                return Err(GraphError::CountWidthExceeded {
                    node,
                    count,
                    limit: self.counts.limit(),
                });
            }
        }
        let n = node as usize;
        if self.table_start.len() <= n {
            self.table_start.resize(n + 1, -1);
        }
        self.table_start[n] = start as i64;
        self.counts.set(n, count);
        Ok(())
    }
}

impl<E: Explorer> CachedGraph<E> {
    /// Position at `node`. The first visit of a node queries the inner
    /// source once, updates the derived node attributes, then the derived
    /// edge attributes, then records the successor block; later visits
    /// answer from the cache without touching the inner source.
    pub fn query_node(&mut self, node: Node) -> GraphResult<()> {
        if !self.caching {
            let inner = self.inner.as_mut().ok_or(GraphError::NotPrepared { node })?;
            inner.query_node(node)?;
            self.current = Some(node);
            return Ok(());
        }

        if self.visited.contains(node) {
            self.current = Some(node);
            return Ok(());
        }

        let degree = {
            let inner = self.inner.as_mut().ok_or(GraphError::NotPrepared { node })?;
            inner.query_node(node)?;
            inner.out_degree()?
        };
        let start = self.cached.len();
        self.record_block(node, start, degree)?;

        let inner = self.inner.as_mut().ok_or(GraphError::NotPrepared { node })?;
        for decl in &self.derived_node {
            let value = inner.node_attribute(&decl.name)?;
            self.props
                .node
                .set(&decl.name, node as usize, value, None)?;
        }
        for decl in &self.derived_edge {
            for index in 0..degree {
                let value = inner.edge_attribute(&decl.name, index)?;
                self.props.edge.set(&decl.name, start + index, value, None)?;
            }
        }
        for index in 0..degree {
            self.cached.push(inner.successor(index)?);
        }
        self.visited.insert(node);
        self.current = Some(node);
        Ok(())
    }
}

impl<E: Explorer> Explorer for CachedGraph<E> {
    fn initial_nodes(&mut self) -> GraphResult<Vec<Node>> {
        match self.inner.as_mut() {
            Some(inner) => {
                let nodes = inner.initial_nodes()?;
                for &node in &nodes {
                    self.initial.insert(node);
                }
                Ok(nodes)
            }
            None => Ok(self.initial.iter().collect()),
        }
    }

    fn query_node(&mut self, node: Node) -> GraphResult<()> {
        CachedGraph::query_node(self, node)
    }

    fn out_degree(&self) -> GraphResult<usize> {
        self.current_out_degree()
    }

    fn successor(&self, index: usize) -> GraphResult<Node> {
        self.current_successor(index)
    }

    fn graph_attributes(&self) -> Vec<AttributeDecl> {
        self.inner
            .as_ref()
            .map(|inner| inner.graph_attributes())
            .unwrap_or_default()
    }

    fn node_attributes(&self) -> Vec<AttributeDecl> {
        if self.caching {
            self.derived_node.clone()
        } else {
            self.inner
                .as_ref()
                .map(|inner| inner.node_attributes())
                .unwrap_or_default()
        }
    }

    fn edge_attributes(&self) -> Vec<AttributeDecl> {
        if self.caching {
            self.derived_edge.clone()
        } else {
            self.inner
                .as_ref()
                .map(|inner| inner.edge_attributes())
                .unwrap_or_default()
        }
    }

    fn graph_attribute(&self, name: &str) -> GraphResult<Value> {
        match self.inner.as_ref() {
            Some(inner) => inner.graph_attribute(name),
            None => self.props.graph(name),
        }
    }

    fn node_attribute(&self, name: &str) -> GraphResult<Value> {
        let node = self.current.ok_or(GraphError::Unpositioned)?;
        if self.caching {
            self.node_value(name, node)
        } else {
            let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
            inner.node_attribute(name)
        }
    }

    fn edge_attribute(&self, name: &str, index: usize) -> GraphResult<Value> {
        let node = self.current.ok_or(GraphError::Unpositioned)?;
        if self.caching {
            self.edge_value(name, node, index)
        } else {
            let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
            inner.edge_attribute(name, index)
        }
    }

    fn num_node_bits(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.num_node_bits())
            .unwrap_or(Node::BITS as usize)
    }

    fn is_nondeterministic(&self) -> bool {
        self.inner
            .as_ref()
            .map(|inner| inner.is_nondeterministic())
            .unwrap_or(false)
    }

    // The choice layer is never cached; it is only reachable in
    // pass-through mode where the inner source stays positioned.
    fn query_choice(&mut self, index: usize) -> GraphResult<()> {
        if self.caching {
            return Err(GraphError::Enumerator {
                message: "choice layer is not cached".into(),
            });
        }
        let inner = self.inner.as_mut().ok_or(GraphError::Unpositioned)?;
        inner.query_choice(index)
    }

    fn choice_out_degree(&self) -> GraphResult<usize> {
        if self.caching {
            return Err(GraphError::Enumerator {
                message: "choice layer is not cached".into(),
            });
        }
        let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
        inner.choice_out_degree()
    }

    fn choice_successor(&self, index: usize) -> GraphResult<Node> {
        if self.caching {
            return Err(GraphError::Enumerator {
                message: "choice layer is not cached".into(),
            });
        }
        let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
        inner.choice_successor(index)
    }

    fn choice_edge_attribute(&self, name: &str, index: usize) -> GraphResult<Value> {
        if self.caching {
            return Err(GraphError::Enumerator {
                message: "choice layer is not cached".into(),
            });
        }
        let inner = self.inner.as_ref().ok_or(GraphError::Unpositioned)?;
        inner.choice_edge_attribute(name, index)
    }
}
