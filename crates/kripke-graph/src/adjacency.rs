//! Compressed successor storage.
//!
//! Two layouts share the read contract in [`Adjacency`]. [`FlatStore`]
//! keeps one CSR bounds/successors array pair and fits deterministic
//! models. [`TwoLayerStore`] partitions nodes into states and choices for
//! nondeterministic models: choice successors are stored explicitly, while
//! a state's successors are the contiguous choice-node range given by
//! [`choice_index_of`] and occupy no storage at all.
//!
//! Both layouts are built strictly in increasing node order, either
//! pre-sized ("fixed mode": exact allocation, overflow is an error) or
//! growing by doubling. Construction invalidates any predecessor index.

use crate::bitset::NodeSet;
use crate::error::{GraphError, GraphResult};
use crate::predecessor::PredecessorIndex;
use crate::property::{Attributed, Overlay, OverlayMap, PropertyMap, WEIGHT};
use crate::Node;
use kripke_values::{Type, Value};
use tracing::trace;

/// Read contract shared by both adjacency layouts.
pub trait Adjacency {
    /// Total node count: states plus choices for two-layer stores.
    fn num_nodes(&self) -> usize;

    /// Number of stored successor entries.
    fn num_edges(&self) -> usize;

    fn out_degree(&self, node: Node) -> GraphResult<usize>;

    fn successor(&self, node: Node, index: usize) -> GraphResult<Node>;

    /// The initial-node set. Mutated only during construction.
    fn initial(&self) -> &NodeSet;
}

/// Implicit state→choice address rule of the two-layer layout.
///
/// The `index`-th successor of a state is not stored; it is defined to be
/// the choice node `num_states + state_base + index`, where `state_base`
/// is the state's entry in the state-bounds array. Every code path that
/// resolves or verifies a state successor goes through this function.
#[inline]
pub fn choice_index_of(num_states: usize, state_base: u32, index: usize) -> Node {
    num_states as Node + state_base + index as Node
}

/// Double `buffer` (at least to `needed`), filling new entries with `fill`.
fn grow_buffer<T: Clone>(buffer: &mut Vec<T>, needed: usize, fill: T) {
    if needed <= buffer.len() {
        return;
    }
    let mut new_len = buffer.len().max(4);
    while new_len < needed {
        new_len *= 2;
    }
    trace!(from = buffer.len(), to = new_len, "growing successor storage");
    buffer.resize(new_len, fill);
}

// === Flat layout ===

/// CSR successor storage for deterministic models.
///
/// `bounds[n + 1] - bounds[n]` is node `n`'s out-degree and
/// `successors[bounds[n] + i]` its `i`-th successor.
#[derive(Debug, Clone)]
pub struct FlatStore {
    bounds: Vec<u32>,
    successors: Vec<Node>,
    weights: Vec<Value>,
    weight_ty: Option<Type>,
    props: PropertyMap,
    initial: NodeSet,
    predecessors: Option<PredecessorIndex>,
    /// `(num_nodes, num_edges)` capacities in fixed mode.
    fixed: Option<(usize, usize)>,
    prepared: usize,
}

impl Default for FlatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatStore {
    /// Growth-mode store: counts unknown, arrays double on demand.
    pub fn new() -> Self {
        Self::with_mode(Vec::new(), None)
    }

    /// Fixed-mode store: exact pre-allocation, never resized.
    pub fn with_capacity(num_nodes: usize, num_edges: usize) -> Self {
        Self::with_mode(vec![0; num_edges], Some((num_nodes, num_edges)))
    }

    fn with_mode(successors: Vec<Node>, fixed: Option<(usize, usize)>) -> Self {
        let mut bounds = Vec::with_capacity(fixed.map_or(1, |(nodes, _)| nodes + 1));
        bounds.push(0);
        Self {
            bounds,
            successors,
            weights: Vec::new(),
            weight_ty: None,
            props: PropertyMap::new(),
            initial: NodeSet::new(),
            predecessors: None,
            fixed,
            prepared: 0,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }

    /// Declare node `node` with `out_degree` successors. Nodes must be
    /// prepared in increasing order and a degree cannot be re-declared.
    pub fn prepare(&mut self, node: Node, out_degree: usize) -> GraphResult<()> {
        let n = node as usize;
        if n < self.prepared {
            return Err(GraphError::DegreeDeclared {
                node,
                degree: (self.bounds[n + 1] - self.bounds[n]) as usize,
            });
        }
        if n != self.prepared {
            return Err(GraphError::PrepareOrder {
                node,
                expected: self.prepared as Node,
            });
        }
        let end = self.bounds[self.prepared] as usize + out_degree;
        if let Some((node_cap, edge_cap)) = self.fixed {
            if self.prepared >= node_cap {
                return Err(GraphError::FixedModeOverflow {
                    what: "nodes",
                    capacity: node_cap,
                });
            }
            if end > edge_cap {
                return Err(GraphError::FixedModeOverflow {
                    what: "successors",
                    capacity: edge_cap,
                });
            }
        } else {
            grow_buffer(&mut self.successors, end, 0);
            if let Some(ty) = self.weight_ty {
                grow_buffer(&mut self.weights, end, ty.default_value());
            }
        }
        self.bounds.push(end as u32);
        self.prepared += 1;
        self.predecessors = None;
        Ok(())
    }

    pub fn set_successor(&mut self, node: Node, index: usize, target: Node) -> GraphResult<()> {
        let slot = self.edge_slot(node, index)?;
        self.successors[slot] = target;
        self.predecessors = None;
        Ok(())
    }

    /// Successor slice of a prepared node.
    pub fn successors_of(&self, node: Node) -> GraphResult<&[Node]> {
        let degree = self.prepared_degree(node)?;
        let start = self.bounds[node as usize] as usize;
        Ok(&self.successors[start..start + degree])
    }

    /// Unchecked successor lookup for fixed-mode numeric kernels.
    #[inline]
    pub fn successor_unchecked(&self, node: Node, index: usize) -> Node {
        debug_assert!((node as usize) < self.prepared);
        debug_assert!(index < (self.bounds[node as usize + 1] - self.bounds[node as usize]) as usize);
        self.successors[self.bounds[node as usize] as usize + index]
    }

    pub fn mark_initial(&mut self, node: Node) {
        self.initial.insert(node);
    }

    // --- weights (store-backed WEIGHT edge attribute) ---

    /// Register the store-backed WEIGHT edge attribute with value type
    /// `ty`, allocating the weight array next to the successor array.
    pub fn register_weight(&mut self, ty: Type) -> GraphResult<()> {
        self.props.edge.register(WEIGHT, Overlay::store_backed(ty))?;
        self.weight_ty = Some(ty);
        self.weights = vec![ty.default_value(); self.successors.len()];
        Ok(())
    }

    pub fn weight(&self, node: Node, index: usize) -> GraphResult<Value> {
        let ty = self.require_weight()?;
        let slot = self.edge_slot(node, index)?;
        Ok(self.weights.get(slot).copied().unwrap_or(ty.default_value()))
    }

    pub fn set_weight(&mut self, node: Node, index: usize, value: Value) -> GraphResult<()> {
        let ty = self.require_weight()?;
        let slot = self.edge_slot(node, index)?;
        self.weights[slot] = ty.import(value).map_err(|source| GraphError::PropertyType {
            name: WEIGHT.into(),
            source,
        })?;
        Ok(())
    }

    fn require_weight(&self) -> GraphResult<Type> {
        self.weight_ty.ok_or_else(|| GraphError::UnknownProperty {
            name: WEIGHT.into(),
        })
    }

    // --- attributes ---

    pub fn register_node_attribute(&mut self, name: &str, overlay: Overlay) -> GraphResult<()> {
        self.props.node.register(name, overlay)
    }

    pub fn remove_node_attribute(&mut self, name: &str) -> GraphResult<Overlay> {
        self.props.node.remove(name)
    }

    pub fn register_edge_attribute(&mut self, name: &str, overlay: Overlay) -> GraphResult<()> {
        self.props.edge.register(name, overlay)
    }

    pub fn remove_edge_attribute(&mut self, name: &str) -> GraphResult<Overlay> {
        let overlay = self.props.edge.remove(name)?;
        if name == WEIGHT {
            self.weight_ty = None;
            self.weights = Vec::new();
        }
        Ok(overlay)
    }

    pub fn register_graph_attribute(&mut self, name: &str, value: Value) -> GraphResult<()> {
        self.props.register_graph(name, value)
    }

    pub fn set_graph_attribute(&mut self, name: &str, value: Value) -> GraphResult<()> {
        self.props.set_graph(name, value)
    }

    pub fn graph_attribute(&self, name: &str) -> GraphResult<Value> {
        self.props.graph(name)
    }

    pub fn graph_attribute_names(&self) -> Vec<String> {
        self.props.graph_names()
    }

    pub fn node_value(&self, name: &str, node: Node) -> GraphResult<Value> {
        self.check_node(node)?;
        self.props.node.get(name, node as usize, Some(&self.weights))
    }

    pub fn set_node_value(&mut self, name: &str, node: Node, value: Value) -> GraphResult<()> {
        self.check_node(node)?;
        self.props
            .node
            .set(name, node as usize, value, Some(&mut self.weights))
    }

    pub fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value> {
        let slot = self.edge_slot(node, index)?;
        self.props.edge.get(name, slot, Some(&self.weights))
    }

    pub fn set_edge_value(
        &mut self,
        name: &str,
        node: Node,
        index: usize,
        value: Value,
    ) -> GraphResult<()> {
        let slot = self.edge_slot(node, index)?;
        self.props.edge.set(name, slot, value, Some(&mut self.weights))
    }

    // --- predecessors ---

    /// Build the predecessor index. Idempotent: a present unrestricted
    /// index is kept as is.
    pub fn compute_predecessors(&mut self) -> GraphResult<()> {
        if self.predecessors.as_ref().is_some_and(|p| !p.is_restricted()) {
            return Ok(());
        }
        let index = PredecessorIndex::compute(self)?;
        self.predecessors = Some(index);
        Ok(())
    }

    /// Build a predecessor index restricted to edges with both endpoints
    /// in `subset`. Always recomputes.
    pub fn compute_predecessors_restricted(&mut self, subset: &NodeSet) -> GraphResult<()> {
        let index = PredecessorIndex::compute_restricted(self, subset)?;
        self.predecessors = Some(index);
        Ok(())
    }

    /// The predecessor index, or None if not computed (not the same as
    /// "no predecessors").
    pub fn predecessor_index(&self) -> Option<&PredecessorIndex> {
        self.predecessors.as_ref()
    }

    pub fn clear_predecessors(&mut self) {
        self.predecessors = None;
    }

    // --- raw buffer access for external numeric kernels ---

    pub fn bounds_raw(&self) -> &[u32] {
        &self.bounds
    }

    pub fn successors_raw(&self) -> &[Node] {
        &self.successors[..self.num_edges()]
    }

    pub fn successors_raw_mut(&mut self) -> &mut [Node] {
        self.predecessors = None;
        let edges = self.num_edges();
        &mut self.successors[..edges]
    }

    pub fn weights_raw(&self) -> Option<&[Value]> {
        self.weight_ty.map(|_| &self.weights[..self.num_edges()])
    }

    pub fn weights_raw_mut(&mut self) -> Option<&mut [Value]> {
        let edges = self.num_edges();
        self.weight_ty.map(|_| &mut self.weights[..edges])
    }

    /// Shrink growth-mode backing arrays to their exact final size.
    pub fn trim(&mut self) {
        let edges = self.num_edges();
        self.successors.truncate(edges);
        self.successors.shrink_to_fit();
        if self.weight_ty.is_some() {
            self.weights.truncate(edges);
            self.weights.shrink_to_fit();
        }
        self.bounds.shrink_to_fit();
    }

    /// Approximate heap usage of the adjacency arrays.
    pub fn memory_bytes(&self) -> usize {
        self.bounds.len() * 4
            + self.successors.len() * 4
            + self.weights.len() * std::mem::size_of::<Value>()
            + self.initial.memory_bytes()
    }

    fn check_node(&self, node: Node) -> GraphResult<()> {
        if (node as usize) < self.num_nodes() {
            Ok(())
        } else {
            Err(GraphError::NodeOutOfBounds {
                node,
                num_nodes: self.num_nodes(),
            })
        }
    }

    fn prepared_degree(&self, node: Node) -> GraphResult<usize> {
        let n = node as usize;
        if n >= self.prepared {
            return if n < self.num_nodes() {
                Err(GraphError::NotPrepared { node })
            } else {
                Err(GraphError::NodeOutOfBounds {
                    node,
                    num_nodes: self.num_nodes(),
                })
            };
        }
        Ok((self.bounds[n + 1] - self.bounds[n]) as usize)
    }

    fn edge_slot(&self, node: Node, index: usize) -> GraphResult<usize> {
        let degree = self.prepared_degree(node)?;
        if index >= degree {
            return Err(GraphError::SuccessorOutOfBounds {
                node,
                index,
                degree,
            });
        }
        Ok(self.bounds[node as usize] as usize + index)
    }
}

impl Adjacency for FlatStore {
    fn num_nodes(&self) -> usize {
        self.fixed.map_or(self.prepared, |(nodes, _)| nodes)
    }

    fn num_edges(&self) -> usize {
        self.bounds[self.prepared] as usize
    }

    fn out_degree(&self, node: Node) -> GraphResult<usize> {
        self.prepared_degree(node)
    }

    fn successor(&self, node: Node, index: usize) -> GraphResult<Node> {
        Ok(self.successors[self.edge_slot(node, index)?])
    }

    fn initial(&self) -> &NodeSet {
        &self.initial
    }
}

impl Attributed for FlatStore {
    fn node_attribute_names(&self) -> Vec<String> {
        self.props.node.names()
    }

    fn edge_attribute_names(&self) -> Vec<String> {
        self.props.edge.names()
    }

    fn node_value(&self, name: &str, node: Node) -> GraphResult<Value> {
        FlatStore::node_value(self, name, node)
    }

    fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value> {
        FlatStore::edge_value(self, name, node, index)
    }
}

// === Two-layer layout ===

/// Fixed-mode capacities of a two-layer store.
#[derive(Debug, Clone, Copy)]
struct FixedDims {
    num_states: usize,
    num_choices: usize,
    num_edges: usize,
}

/// State/choice successor storage for nondeterministic models.
///
/// Nodes `0..num_states` are states, `num_states..num_states+num_choices`
/// are choices. A state's successors are implicit (see
/// [`choice_index_of`]); only choice successors occupy the successor
/// array, and the choice-bounds array is indexed relative to
/// `node - num_states`.
#[derive(Debug, Clone)]
pub struct TwoLayerStore {
    state_bounds: Vec<u32>,
    choice_bounds: Vec<u32>,
    successors: Vec<Node>,
    weights: Vec<Value>,
    weight_ty: Option<Type>,
    /// State-node overlays, edge overlays (choice edges), graph values.
    props: PropertyMap,
    /// Choice-node overlays, keyed by relative choice index so that
    /// construction never depends on the not-yet-final state count.
    choice_node: OverlayMap,
    initial: NodeSet,
    predecessors: Option<PredecessorIndex>,
    fixed: Option<FixedDims>,
    prepared_states: usize,
    prepared_choices: usize,
}

impl Default for TwoLayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TwoLayerStore {
    /// Growth-mode store: counts unknown, arrays double on demand.
    pub fn new() -> Self {
        Self::with_mode(Vec::new(), None)
    }

    /// Fixed-mode store with exact pre-allocation.
    pub fn with_capacity(num_states: usize, num_choices: usize, num_edges: usize) -> Self {
        Self::with_mode(
            vec![0; num_edges],
            Some(FixedDims {
                num_states,
                num_choices,
                num_edges,
            }),
        )
    }

    fn with_mode(successors: Vec<Node>, fixed: Option<FixedDims>) -> Self {
        let mut state_bounds = Vec::with_capacity(fixed.map_or(1, |d| d.num_states + 1));
        state_bounds.push(0);
        let mut choice_bounds = Vec::with_capacity(fixed.map_or(1, |d| d.num_choices + 1));
        choice_bounds.push(0);
        Self {
            state_bounds,
            choice_bounds,
            successors,
            weights: Vec::new(),
            weight_ty: None,
            props: PropertyMap::new(),
            choice_node: OverlayMap::new(),
            initial: NodeSet::new(),
            predecessors: None,
            fixed,
            prepared_states: 0,
            prepared_choices: 0,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }

    pub fn num_states(&self) -> usize {
        self.fixed.map_or(self.prepared_states, |d| d.num_states)
    }

    pub fn num_choices(&self) -> usize {
        self.fixed.map_or(self.prepared_choices, |d| d.num_choices)
    }

    /// Declare state `state` with `num_choices` nondeterministic
    /// alternatives. States must be prepared in increasing order.
    pub fn prepare_state(&mut self, state: Node, num_choices: usize) -> GraphResult<()> {
        let n = state as usize;
        if n < self.prepared_states {
            return Err(GraphError::DegreeDeclared {
                node: state,
                degree: (self.state_bounds[n + 1] - self.state_bounds[n]) as usize,
            });
        }
        if n != self.prepared_states {
            return Err(GraphError::PrepareOrder {
                node: state,
                expected: self.prepared_states as Node,
            });
        }
        let end = self.state_bounds[self.prepared_states] as usize + num_choices;
        if let Some(dims) = self.fixed {
            if self.prepared_states >= dims.num_states {
                return Err(GraphError::FixedModeOverflow {
                    what: "states",
                    capacity: dims.num_states,
                });
            }
            if end > dims.num_choices {
                return Err(GraphError::FixedModeOverflow {
                    what: "choices",
                    capacity: dims.num_choices,
                });
            }
        }
        self.state_bounds.push(end as u32);
        self.prepared_states += 1;
        self.predecessors = None;
        Ok(())
    }

    /// Declare the `rel_choice`-th choice node (relative index) with
    /// `num_successors` probabilistic targets. Choices must be prepared
    /// in increasing relative order.
    pub fn prepare_choice(&mut self, rel_choice: usize, num_successors: usize) -> GraphResult<()> {
        if rel_choice < self.prepared_choices {
            return Err(GraphError::DegreeDeclared {
                node: self.choice_node_index(rel_choice),
                degree: (self.choice_bounds[rel_choice + 1] - self.choice_bounds[rel_choice])
                    as usize,
            });
        }
        if rel_choice != self.prepared_choices {
            return Err(GraphError::PrepareOrder {
                node: self.choice_node_index(rel_choice),
                expected: self.choice_node_index(self.prepared_choices),
            });
        }
        let end = self.choice_bounds[self.prepared_choices] as usize + num_successors;
        if let Some(dims) = self.fixed {
            if self.prepared_choices >= dims.num_choices {
                return Err(GraphError::FixedModeOverflow {
                    what: "choices",
                    capacity: dims.num_choices,
                });
            }
            if end > dims.num_edges {
                return Err(GraphError::FixedModeOverflow {
                    what: "successors",
                    capacity: dims.num_edges,
                });
            }
        } else {
            grow_buffer(&mut self.successors, end, 0);
            if let Some(ty) = self.weight_ty {
                grow_buffer(&mut self.weights, end, ty.default_value());
            }
        }
        self.choice_bounds.push(end as u32);
        self.prepared_choices += 1;
        self.predecessors = None;
        Ok(())
    }

    /// Set the `index`-th target of the choice with relative index
    /// `rel_choice`. Targets are state indices.
    pub fn set_choice_successor(
        &mut self,
        rel_choice: usize,
        index: usize,
        target: Node,
    ) -> GraphResult<()> {
        let slot = self.choice_slot(rel_choice, index)?;
        self.successors[slot] = target;
        self.predecessors = None;
        Ok(())
    }

    /// Combined-space successor write. State-node writes cannot change
    /// the implicit topology: they are accepted only when `target`
    /// matches [`choice_index_of`], so generic writers driving both
    /// layouts through one code path keep working.
    pub fn set_successor(&mut self, node: Node, index: usize, target: Node) -> GraphResult<()> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            let degree = self.state_degree(node)?;
            if index >= degree {
                return Err(GraphError::SuccessorOutOfBounds {
                    node,
                    index,
                    degree,
                });
            }
            let implicit = choice_index_of(num_states, self.state_bounds[n], index);
            if target != implicit {
                return Err(GraphError::ImplicitSuccessor {
                    state: node,
                    index,
                    target,
                });
            }
            return Ok(());
        }
        self.set_choice_successor(n - num_states, index, target)
    }

    pub fn choice_out_degree(&self, rel_choice: usize) -> GraphResult<usize> {
        if rel_choice >= self.prepared_choices {
            return Err(GraphError::NotPrepared {
                node: self.choice_node_index(rel_choice),
            });
        }
        Ok((self.choice_bounds[rel_choice + 1] - self.choice_bounds[rel_choice]) as usize)
    }

    /// Successor slice of a prepared choice node.
    pub fn choice_successors_of(&self, rel_choice: usize) -> GraphResult<&[Node]> {
        let degree = self.choice_out_degree(rel_choice)?;
        let start = self.choice_bounds[rel_choice] as usize;
        Ok(&self.successors[start..start + degree])
    }

    pub fn mark_initial(&mut self, node: Node) {
        self.initial.insert(node);
    }

    // --- weights ---

    /// Register the store-backed WEIGHT edge attribute for choice edges.
    pub fn register_weight(&mut self, ty: Type) -> GraphResult<()> {
        self.props.edge.register(WEIGHT, Overlay::store_backed(ty))?;
        self.weight_ty = Some(ty);
        self.weights = vec![ty.default_value(); self.successors.len()];
        Ok(())
    }

    pub fn choice_weight(&self, rel_choice: usize, index: usize) -> GraphResult<Value> {
        let ty = self.require_weight()?;
        let slot = self.choice_slot(rel_choice, index)?;
        Ok(self.weights.get(slot).copied().unwrap_or(ty.default_value()))
    }

    pub fn set_choice_weight(
        &mut self,
        rel_choice: usize,
        index: usize,
        value: Value,
    ) -> GraphResult<()> {
        let ty = self.require_weight()?;
        let slot = self.choice_slot(rel_choice, index)?;
        self.weights[slot] = ty.import(value).map_err(|source| GraphError::PropertyType {
            name: WEIGHT.into(),
            source,
        })?;
        Ok(())
    }

    fn require_weight(&self) -> GraphResult<Type> {
        self.weight_ty.ok_or_else(|| GraphError::UnknownProperty {
            name: WEIGHT.into(),
        })
    }

    // --- attributes ---

    /// Register a node attribute. One overlay instance covers the state
    /// layer and an independent clone covers the choice layer.
    pub fn register_node_attribute(&mut self, name: &str, overlay: Overlay) -> GraphResult<()> {
        self.props.node.register(name, overlay.clone())?;
        self.choice_node.register(name, overlay)
    }

    pub fn remove_node_attribute(&mut self, name: &str) -> GraphResult<Overlay> {
        let overlay = self.props.node.remove(name)?;
        self.choice_node.remove(name)?;
        Ok(overlay)
    }

    pub fn register_edge_attribute(&mut self, name: &str, overlay: Overlay) -> GraphResult<()> {
        self.props.edge.register(name, overlay)
    }

    pub fn remove_edge_attribute(&mut self, name: &str) -> GraphResult<Overlay> {
        let overlay = self.props.edge.remove(name)?;
        if name == WEIGHT {
            self.weight_ty = None;
            self.weights = Vec::new();
        }
        Ok(overlay)
    }

    pub fn register_graph_attribute(&mut self, name: &str, value: Value) -> GraphResult<()> {
        self.props.register_graph(name, value)
    }

    pub fn set_graph_attribute(&mut self, name: &str, value: Value) -> GraphResult<()> {
        self.props.set_graph(name, value)
    }

    pub fn graph_attribute(&self, name: &str) -> GraphResult<Value> {
        self.props.graph(name)
    }

    pub fn graph_attribute_names(&self) -> Vec<String> {
        self.props.graph_names()
    }

    pub fn node_value(&self, name: &str, node: Node) -> GraphResult<Value> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            self.props.node.get(name, n, Some(&self.weights))
        } else {
            let rel = self.check_choice(node)?;
            self.choice_node.get(name, rel, Some(&self.weights))
        }
    }

    pub fn set_node_value(&mut self, name: &str, node: Node, value: Value) -> GraphResult<()> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            self.props.node.set(name, n, value, Some(&mut self.weights))
        } else {
            let rel = self.check_choice(node)?;
            self.choice_node.set(name, rel, value, Some(&mut self.weights))
        }
    }

    /// Read an edge attribute. State→choice edges are implicit and carry
    /// no storage: they read as the overlay's default, except WEIGHT,
    /// which reads as the Dirac weight `one()`.
    pub fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            let degree = self.state_degree(node)?;
            if index >= degree {
                return Err(GraphError::SuccessorOutOfBounds {
                    node,
                    index,
                    degree,
                });
            }
            let overlay = self.props.edge.overlay(name)?;
            return Ok(match overlay {
                Overlay::StoreBacked { ty } => ty.one(),
                other => other.default_value(),
            });
        }
        let slot = self.choice_slot(n - num_states, index)?;
        self.props.edge.get(name, slot, Some(&self.weights))
    }

    pub fn set_edge_value(
        &mut self,
        name: &str,
        node: Node,
        index: usize,
        value: Value,
    ) -> GraphResult<()> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            return Err(GraphError::ImplicitEdge { state: node, index });
        }
        let slot = self.choice_slot(n - num_states, index)?;
        self.props.edge.set(name, slot, value, Some(&mut self.weights))
    }

    // --- predecessors ---

    pub fn compute_predecessors(&mut self) -> GraphResult<()> {
        if self.predecessors.as_ref().is_some_and(|p| !p.is_restricted()) {
            return Ok(());
        }
        let index = PredecessorIndex::compute(self)?;
        self.predecessors = Some(index);
        Ok(())
    }

    pub fn compute_predecessors_restricted(&mut self, subset: &NodeSet) -> GraphResult<()> {
        let index = PredecessorIndex::compute_restricted(self, subset)?;
        self.predecessors = Some(index);
        Ok(())
    }

    pub fn predecessor_index(&self) -> Option<&PredecessorIndex> {
        self.predecessors.as_ref()
    }

    pub fn clear_predecessors(&mut self) {
        self.predecessors = None;
    }

    // --- raw buffer access ---

    pub fn state_bounds_raw(&self) -> &[u32] {
        &self.state_bounds
    }

    pub fn choice_bounds_raw(&self) -> &[u32] {
        &self.choice_bounds
    }

    pub fn successors_raw(&self) -> &[Node] {
        &self.successors[..self.num_edges()]
    }

    pub fn successors_raw_mut(&mut self) -> &mut [Node] {
        self.predecessors = None;
        let edges = self.num_edges();
        &mut self.successors[..edges]
    }

    pub fn weights_raw(&self) -> Option<&[Value]> {
        self.weight_ty.map(|_| &self.weights[..self.num_edges()])
    }

    pub fn weights_raw_mut(&mut self) -> Option<&mut [Value]> {
        let edges = self.num_edges();
        self.weight_ty.map(|_| &mut self.weights[..edges])
    }

    pub fn trim(&mut self) {
        let edges = self.num_edges();
        self.successors.truncate(edges);
        self.successors.shrink_to_fit();
        if self.weight_ty.is_some() {
            self.weights.truncate(edges);
            self.weights.shrink_to_fit();
        }
        self.state_bounds.shrink_to_fit();
        self.choice_bounds.shrink_to_fit();
    }

    pub fn memory_bytes(&self) -> usize {
        (self.state_bounds.len() + self.choice_bounds.len() + self.successors.len()) * 4
            + self.weights.len() * std::mem::size_of::<Value>()
            + self.initial.memory_bytes()
    }

    fn choice_node_index(&self, rel_choice: usize) -> Node {
        (self.num_states() + rel_choice) as Node
    }

    fn state_degree(&self, state: Node) -> GraphResult<usize> {
        let n = state as usize;
        if n >= self.prepared_states {
            return Err(GraphError::NotPrepared { node: state });
        }
        Ok((self.state_bounds[n + 1] - self.state_bounds[n]) as usize)
    }

    fn choice_slot(&self, rel_choice: usize, index: usize) -> GraphResult<usize> {
        let degree = self.choice_out_degree(rel_choice)?;
        if index >= degree {
            return Err(GraphError::SuccessorOutOfBounds {
                node: self.choice_node_index(rel_choice),
                index,
                degree,
            });
        }
        Ok(self.choice_bounds[rel_choice] as usize + index)
    }

    fn check_choice(&self, node: Node) -> GraphResult<usize> {
        let rel = node as usize - self.num_states();
        if rel < self.num_choices() {
            Ok(rel)
        } else {
            Err(GraphError::NodeOutOfBounds {
                node,
                num_nodes: self.num_nodes(),
            })
        }
    }
}

impl Adjacency for TwoLayerStore {
    fn num_nodes(&self) -> usize {
        self.num_states() + self.num_choices()
    }

    fn num_edges(&self) -> usize {
        self.choice_bounds[self.prepared_choices] as usize
    }

    fn out_degree(&self, node: Node) -> GraphResult<usize> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            return self.state_degree(node);
        }
        let rel = n - num_states;
        if rel < self.prepared_choices {
            return self.choice_out_degree(rel);
        }
        if rel < self.num_choices() {
            Err(GraphError::NotPrepared { node })
        } else {
            Err(GraphError::NodeOutOfBounds {
                node,
                num_nodes: self.num_nodes(),
            })
        }
    }

    fn successor(&self, node: Node, index: usize) -> GraphResult<Node> {
        let n = node as usize;
        let num_states = self.num_states();
        if n < num_states {
            let degree = self.state_degree(node)?;
            if index >= degree {
                return Err(GraphError::SuccessorOutOfBounds {
                    node,
                    index,
                    degree,
                });
            }
            return Ok(choice_index_of(num_states, self.state_bounds[n], index));
        }
        Ok(self.successors[self.choice_slot(n - num_states, index)?])
    }

    fn initial(&self) -> &NodeSet {
        &self.initial
    }
}

impl Attributed for TwoLayerStore {
    fn node_attribute_names(&self) -> Vec<String> {
        self.props.node.names()
    }

    fn edge_attribute_names(&self) -> Vec<String> {
        self.props.edge.names()
    }

    fn node_value(&self, name: &str, node: Node) -> GraphResult<Value> {
        TwoLayerStore::node_value(self, name, node)
    }

    fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value> {
        TwoLayerStore::edge_value(self, name, node, index)
    }
}
