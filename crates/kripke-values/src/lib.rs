//! Typed scalar values for graph attributes.
//!
//! This crate is the value capability consumed by the storage engine:
//! a small closed set of scalar payloads (flags, counters, probabilities,
//! rates, rewards) with type-directed arithmetic and import rules. The
//! storage layer never inspects payloads beyond this interface.

pub mod error;
pub mod op;
pub mod value;

pub use error::TypeError;
pub use op::Operator;
pub use value::{Type, Value};
