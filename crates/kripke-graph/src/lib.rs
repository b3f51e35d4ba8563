//! Explicit-state graph storage for probabilistic model checking.
//!
//! Holds the state space of a DTMC, CTMC, MDP, or automaton as compact,
//! randomly queryable successor arrays annotated with typed attributes.
//! Deterministic models use a flat CSR layout; nondeterministic models
//! use a two-layer state/choice layout whose state→choice edges are pure
//! address arithmetic. Stores are built either pre-sized (fixed mode) or
//! growing on demand from an abstract state-space enumerator, directly
//! via [`materialize::materialize`] or lazily via
//! [`onthefly::CachedGraph`].

pub mod adjacency;
pub mod bitset;
pub mod dot;
pub mod error;
pub mod explorer;
pub mod materialize;
pub mod onthefly;
pub mod predecessor;
pub mod property;
pub mod scheduler;

/// Dense node index. States occupy the low indices; in nondeterministic
/// models the choice nodes follow at `num_states..num_states+num_choices`.
pub type Node = u32;

pub use adjacency::{choice_index_of, Adjacency, FlatStore, TwoLayerStore};
pub use bitset::NodeSet;
pub use dot::{render_dot, write_dot};
pub use error::{GraphError, GraphResult};
pub use explorer::{AttributeDecl, Explorer, NullExplorer};
pub use materialize::{materialize, MaterializeOptions, MaterializedGraph};
pub use onthefly::{CachedGraph, CountWidth};
pub use predecessor::PredecessorIndex;
pub use property::{Attributed, Overlay, OverlayMap, PropertyMap, WEIGHT};
pub use scheduler::{ArrayScheduler, CompactScheduler, Scheduler, UNSET};
