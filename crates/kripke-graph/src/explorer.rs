//! Abstract state-space enumerator contract.
//!
//! An [`Explorer`] enumerates a possibly expensive, possibly infinite
//! state space behind a dense node numbering: its node-identity codec maps
//! bit-serializable states to integer indices, and initial nodes receive
//! the first indices. The materializer and the caching wrapper consume
//! this contract; model front ends (out of scope here) implement it.
//!
//! Positioning semantics: `query_node` selects the node every per-node
//! reader refers to until the next `query_node` call. Nondeterministic
//! explorers additionally expose their current node's choice layer through
//! `query_choice` and the `choice_*` readers.

use crate::error::{GraphError, GraphResult};
use crate::Node;
use kripke_values::{Type, Value};

/// A declared attribute: name and value type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    pub name: String,
    pub ty: Type,
}

impl AttributeDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

fn no_choice_layer<T>() -> GraphResult<T> {
    Err(GraphError::Enumerator {
        message: "deterministic enumerator has no choice layer".into(),
    })
}

/// The enumerator contract consumed by materialization and caching.
pub trait Explorer {
    /// Dense indices of the initial nodes; these occupy the lowest
    /// indices of the numbering.
    fn initial_nodes(&mut self) -> GraphResult<Vec<Node>>;

    /// Position the enumerator at `node`.
    fn query_node(&mut self, node: Node) -> GraphResult<()>;

    /// Out-degree of the queried node. For nondeterministic models this
    /// is the number of choices.
    fn out_degree(&self) -> GraphResult<usize>;

    /// `index`-th successor of the queried node. Nondeterministic
    /// explorers expose successors through the choice layer instead.
    fn successor(&self, index: usize) -> GraphResult<Node>;

    /// Declared graph-level attributes.
    fn graph_attributes(&self) -> Vec<AttributeDecl> {
        Vec::new()
    }

    /// Declared per-node attributes (state nodes).
    fn node_attributes(&self) -> Vec<AttributeDecl> {
        Vec::new()
    }

    /// Declared per-edge attributes. WEIGHT is expected here for
    /// probabilistic models.
    fn edge_attributes(&self) -> Vec<AttributeDecl> {
        Vec::new()
    }

    fn graph_attribute(&self, name: &str) -> GraphResult<Value>;

    /// Attribute of the queried node.
    fn node_attribute(&self, name: &str) -> GraphResult<Value>;

    /// Attribute of the queried node's `index`-th outgoing edge.
    fn edge_attribute(&self, name: &str, index: usize) -> GraphResult<Value>;

    /// Width in bits of the node-identity encoding behind the dense
    /// numbering.
    fn num_node_bits(&self) -> usize;

    /// Whether states carry a nondeterminism layer. Decides the
    /// materialized layout.
    fn is_nondeterministic(&self) -> bool;

    // --- choice layer, nondeterministic models only ---

    /// Position the choice layer at choice `index` of the queried node.
    fn query_choice(&mut self, _index: usize) -> GraphResult<()> {
        no_choice_layer()
    }

    /// Out-degree of the queried choice.
    fn choice_out_degree(&self) -> GraphResult<usize> {
        no_choice_layer()
    }

    /// `index`-th probabilistic target of the queried choice.
    fn choice_successor(&self, _index: usize) -> GraphResult<Node> {
        no_choice_layer()
    }

    /// Edge attribute of the queried choice's `index`-th outgoing edge.
    fn choice_edge_attribute(&self, _name: &str, _index: usize) -> GraphResult<Value> {
        no_choice_layer()
    }
}

/// Placeholder source for manually driven caching stores; every query
/// fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExplorer;

impl Explorer for NullExplorer {
    fn initial_nodes(&mut self) -> GraphResult<Vec<Node>> {
        Ok(Vec::new())
    }

    fn query_node(&mut self, node: Node) -> GraphResult<()> {
        Err(GraphError::NotPrepared { node })
    }

    fn out_degree(&self) -> GraphResult<usize> {
        Err(GraphError::Unpositioned)
    }

    fn successor(&self, _index: usize) -> GraphResult<Node> {
        Err(GraphError::Unpositioned)
    }

    fn graph_attribute(&self, name: &str) -> GraphResult<Value> {
        Err(GraphError::UnknownProperty { name: name.into() })
    }

    fn node_attribute(&self, name: &str) -> GraphResult<Value> {
        Err(GraphError::UnknownProperty { name: name.into() })
    }

    fn edge_attribute(&self, name: &str, _index: usize) -> GraphResult<Value> {
        Err(GraphError::UnknownProperty { name: name.into() })
    }

    fn num_node_bits(&self) -> usize {
        Node::BITS as usize
    }

    fn is_nondeterministic(&self) -> bool {
        false
    }
}
