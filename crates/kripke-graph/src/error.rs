//! Error types for the storage engine.

use crate::Node;
use kripke_values::TypeError;
use thiserror::Error;

/// A storage-layer contract violation or enumeration failure.
///
/// Every variant except [`GraphError::Enumerator`] signals a caller bug:
/// nothing here is retried, and a failed materialization leaves a store
/// that must be discarded.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {node} out of bounds ({num_nodes} nodes)")]
    NodeOutOfBounds { node: Node, num_nodes: usize },

    #[error("successor {index} out of bounds for node {node} (degree {degree})")]
    SuccessorOutOfBounds {
        node: Node,
        index: usize,
        degree: usize,
    },

    #[error("node {node} prepared out of order, expected node {expected}")]
    PrepareOrder { node: Node, expected: Node },

    #[error("node {node} already prepared with degree {degree}")]
    DegreeDeclared { node: Node, degree: usize },

    #[error("node {node} not prepared")]
    NotPrepared { node: Node },

    #[error("fixed-mode store overflow: {what} capacity {capacity} exceeded")]
    FixedModeOverflow {
        what: &'static str,
        capacity: usize,
    },

    #[error("property '{name}' already registered")]
    PropertyExists { name: String },

    #[error("unknown property '{name}'")]
    UnknownProperty { name: String },

    #[error("property '{name}': {source}")]
    PropertyType {
        name: String,
        #[source]
        source: TypeError,
    },

    #[error("computed property '{name}' exceeds evaluation depth")]
    ComputedDepth { name: String },

    #[error("store-backed property '{name}' has no backing store")]
    NoBackingStore { name: String },

    #[error("successor {index} of state {state} is implicit, cannot point to {target}")]
    ImplicitSuccessor {
        state: Node,
        index: usize,
        target: Node,
    },

    #[error("state→choice edge ({state}, {index}) carries no stored attributes")]
    ImplicitEdge { state: Node, index: usize },

    #[error("successor count {count} of node {node} exceeds packing width limit {limit}")]
    CountWidthExceeded {
        node: Node,
        count: usize,
        limit: usize,
    },

    #[error("decision {decision} out of bounds for node {node} (limit {limit})")]
    DecisionOutOfBounds {
        node: Node,
        decision: i32,
        limit: usize,
    },

    #[error("enumerator not positioned at a node")]
    Unpositioned,

    #[error("enumerator reported no initial nodes")]
    NoInitialNodes,

    #[error("enumerator failure: {message}")]
    Enumerator { message: String },
}

pub type GraphResult<T> = Result<T, GraphError>;
