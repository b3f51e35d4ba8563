//! Typed attribute overlays for nodes, edges, and whole graphs.
//!
//! Each registered attribute name maps to one [`Overlay`], a closed set of
//! five backing strategies sharing a single contract: `get` returns a
//! snapshot value, `set` requires the supplied value to be importable into
//! the declared type. Which strategy backs a name is a construction-time
//! choice made through the factory constructors.

use crate::adjacency::Adjacency;
use crate::error::{GraphError, GraphResult};
use crate::Node;
use ahash::AHashMap;
use kripke_values::{Operator, Type, TypeError, Value};

/// Name of the mandatory edge attribute holding probabilities or rates.
///
/// On the static stores it is backed by [`Overlay::StoreBacked`] so the
/// values live next to the successor arrays.
pub const WEIGHT: &str = "weight";

/// Cap on transitive [`Overlay::Computed`] evaluation.
const MAX_COMPUTED_DEPTH: usize = 32;

/// One attribute's backing storage.
///
/// The five variants are exhaustive; external code selects one via the
/// factory constructors and never matches on the representation.
#[derive(Debug, Clone)]
pub enum Overlay {
    /// One shared value for every slot. Setting the value for any one
    /// node or edge changes it for all of them; this is intentional.
    Constant { ty: Type, value: Value },
    /// Default value plus a lazily grown per-slot array; slots never
    /// written read as the default.
    Growable {
        ty: Type,
        default: Value,
        values: Vec<Value>,
    },
    /// Operator over other attributes of the same registry, re-evaluated
    /// on every read. Writes are accepted and ignored.
    Computed {
        ty: Type,
        op: Operator,
        args: Vec<String>,
    },
    /// Aliases the owning store's weight array; the store supplies the
    /// array on each access.
    StoreBacked { ty: Type },
    /// Lazily grown array keyed by a caller-computed slot offset rather
    /// than a node index. Used by the caching wrapper, where successor
    /// counts are unknown a priori.
    Derived {
        ty: Type,
        default: Value,
        values: Vec<Value>,
    },
}

impl Overlay {
    pub fn constant(ty: Type, value: Value) -> Result<Self, TypeError> {
        Ok(Overlay::Constant {
            ty,
            value: ty.import(value)?,
        })
    }

    pub fn growable(ty: Type, default: Value) -> Result<Self, TypeError> {
        Ok(Overlay::Growable {
            ty,
            default: ty.import(default)?,
            values: Vec::new(),
        })
    }

    pub fn computed(ty: Type, op: Operator, args: Vec<String>) -> Self {
        Overlay::Computed { ty, op, args }
    }

    pub fn store_backed(ty: Type) -> Self {
        Overlay::StoreBacked { ty }
    }

    pub fn derived(ty: Type, default: Value) -> Result<Self, TypeError> {
        Ok(Overlay::Derived {
            ty,
            default: ty.import(default)?,
            values: Vec::new(),
        })
    }

    /// Declared value type.
    pub fn ty(&self) -> Type {
        match self {
            Overlay::Constant { ty, .. }
            | Overlay::Growable { ty, .. }
            | Overlay::Computed { ty, .. }
            | Overlay::StoreBacked { ty }
            | Overlay::Derived { ty, .. } => *ty,
        }
    }

    /// Value an unwritten slot reads as.
    pub fn default_value(&self) -> Value {
        match self {
            Overlay::Constant { value, .. } => *value,
            Overlay::Growable { default, .. } | Overlay::Derived { default, .. } => *default,
            Overlay::Computed { ty, .. } | Overlay::StoreBacked { ty } => ty.default_value(),
        }
    }
}

/// Name → overlay registry for one slot space (node slots or edge slots).
#[derive(Debug, Clone, Default)]
pub struct OverlayMap {
    entries: AHashMap<String, Overlay>,
}

impl OverlayMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `overlay` under `name`. A name may be registered once;
    /// remove and re-register to replace it.
    pub fn register(&mut self, name: &str, overlay: Overlay) -> GraphResult<()> {
        if self.entries.contains_key(name) {
            return Err(GraphError::PropertyExists { name: name.into() });
        }
        self.entries.insert(name.to_owned(), overlay);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> GraphResult<Overlay> {
        self.entries
            .remove(name)
            .ok_or_else(|| GraphError::UnknownProperty { name: name.into() })
    }

    pub fn overlay(&self, name: &str) -> GraphResult<&Overlay> {
        self.entries
            .get(name)
            .ok_or_else(|| GraphError::UnknownProperty { name: name.into() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read `name` at `slot`. `weights` is the owning store's weight
    /// array, required only when a store-backed overlay is reached.
    pub fn get(&self, name: &str, slot: usize, weights: Option<&[Value]>) -> GraphResult<Value> {
        self.get_at_depth(name, slot, weights, 0)
    }

    fn get_at_depth(
        &self,
        name: &str,
        slot: usize,
        weights: Option<&[Value]>,
        depth: usize,
    ) -> GraphResult<Value> {
        match self.overlay(name)? {
            Overlay::Constant { value, .. } => Ok(*value),
            Overlay::Growable {
                default, values, ..
            }
            | Overlay::Derived {
                default, values, ..
            } => Ok(values.get(slot).copied().unwrap_or(*default)),
            Overlay::StoreBacked { ty } => {
                let weights = weights.ok_or_else(|| GraphError::NoBackingStore {
                    name: name.into(),
                })?;
                Ok(weights.get(slot).copied().unwrap_or(ty.default_value()))
            }
            Overlay::Computed { ty, op, args } => {
                if depth >= MAX_COMPUTED_DEPTH {
                    return Err(GraphError::ComputedDepth { name: name.into() });
                }
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    operands.push(self.get_at_depth(arg, slot, weights, depth + 1)?);
                }
                let result = op.apply(&operands).map_err(|source| {
                    GraphError::PropertyType {
                        name: name.into(),
                        source,
                    }
                })?;
                ty.import(result).map_err(|source| GraphError::PropertyType {
                    name: name.into(),
                    source,
                })
            }
        }
    }

    /// Write `value` to `name` at `slot`. `weights` is the owning store's
    /// weight array for store-backed overlays.
    pub fn set(
        &mut self,
        name: &str,
        slot: usize,
        value: Value,
        weights: Option<&mut Vec<Value>>,
    ) -> GraphResult<()> {
        let overlay = self
            .entries
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownProperty { name: name.into() })?;
        let wrap = |source: TypeError| GraphError::PropertyType {
            name: name.into(),
            source,
        };
        match overlay {
            Overlay::Constant { ty, value: shared } => {
                *shared = ty.import(value).map_err(wrap)?;
            }
            Overlay::Growable {
                ty,
                default,
                values,
            }
            | Overlay::Derived {
                ty,
                default,
                values,
            } => {
                let imported = ty.import(value).map_err(wrap)?;
                if values.len() <= slot {
                    values.resize(slot + 1, *default);
                }
                values[slot] = imported;
            }
            Overlay::Computed { .. } => {}
            Overlay::StoreBacked { ty } => {
                let weights = weights.ok_or_else(|| GraphError::NoBackingStore {
                    name: name.into(),
                })?;
                let imported = ty.import(value).map_err(wrap)?;
                if weights.len() <= slot {
                    weights.resize(slot + 1, ty.default_value());
                }
                weights[slot] = imported;
            }
        }
        Ok(())
    }
}

/// The attribute registries of one graph: node overlays, edge overlays,
/// and graph-level values.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    pub(crate) node: OverlayMap,
    pub(crate) edge: OverlayMap,
    graph: AHashMap<String, Value>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a graph-level attribute. Names register once.
    pub fn register_graph(&mut self, name: &str, value: Value) -> GraphResult<()> {
        if self.graph.contains_key(name) {
            return Err(GraphError::PropertyExists { name: name.into() });
        }
        self.graph.insert(name.to_owned(), value);
        Ok(())
    }

    /// Update a registered graph-level attribute, importing into the type
    /// it was registered with.
    pub fn set_graph(&mut self, name: &str, value: Value) -> GraphResult<()> {
        let slot = self
            .graph
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownProperty { name: name.into() })?;
        *slot = slot.ty().import(value).map_err(|source| {
            GraphError::PropertyType {
                name: name.into(),
                source,
            }
        })?;
        Ok(())
    }

    pub fn graph(&self, name: &str) -> GraphResult<Value> {
        self.graph
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownProperty { name: name.into() })
    }

    pub fn graph_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graph.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

/// Attribute read surface shared by the static stores, used by the DOT
/// renderer and by algorithms generic over layout.
pub trait Attributed: Adjacency {
    fn node_attribute_names(&self) -> Vec<String>;
    fn edge_attribute_names(&self) -> Vec<String>;
    fn node_value(&self, name: &str, node: Node) -> GraphResult<Value>;
    fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_shared_write() {
        let mut map = OverlayMap::new();
        map.register("flag", Overlay::constant(Type::Bool, Value::Bool(false)).unwrap())
            .unwrap();
        assert_eq!(map.get("flag", 7, None).unwrap(), Value::Bool(false));
        // Writing slot 3 changes the value observed at every slot.
        map.set("flag", 3, Value::Bool(true), None).unwrap();
        assert_eq!(map.get("flag", 0, None).unwrap(), Value::Bool(true));
        assert_eq!(map.get("flag", 100, None).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_growable_default() {
        let mut map = OverlayMap::new();
        map.register("r", Overlay::growable(Type::Real, Value::Real(2.5)).unwrap())
            .unwrap();
        map.set("r", 5, Value::Int(4), None).unwrap();
        assert_eq!(map.get("r", 5, None).unwrap(), Value::Real(4.0));
        // Unwritten slots, below and beyond the grown range, read the default.
        assert_eq!(map.get("r", 2, None).unwrap(), Value::Real(2.5));
        assert_eq!(map.get("r", 50, None).unwrap(), Value::Real(2.5));
    }

    #[test]
    fn test_computed_reevaluates() {
        let mut map = OverlayMap::new();
        map.register("a", Overlay::growable(Type::Int, Value::Int(1)).unwrap())
            .unwrap();
        map.register("b", Overlay::growable(Type::Int, Value::Int(2)).unwrap())
            .unwrap();
        map.register(
            "sum",
            Overlay::computed(Type::Int, Operator::Add, vec!["a".into(), "b".into()]),
        )
        .unwrap();
        assert_eq!(map.get("sum", 0, None).unwrap(), Value::Int(3));
        map.set("a", 0, Value::Int(10), None).unwrap();
        assert_eq!(map.get("sum", 0, None).unwrap(), Value::Int(12));
        // Writes to a computed overlay are ignored.
        map.set("sum", 0, Value::Int(99), None).unwrap();
        assert_eq!(map.get("sum", 0, None).unwrap(), Value::Int(12));
    }

    #[test]
    fn test_computed_cycle_is_detected() {
        let mut map = OverlayMap::new();
        map.register(
            "loop",
            Overlay::computed(Type::Int, Operator::Add, vec!["loop".into(), "loop".into()]),
        )
        .unwrap();
        assert!(matches!(
            map.get("loop", 0, None),
            Err(GraphError::ComputedDepth { .. })
        ));
    }

    #[test]
    fn test_store_backed_needs_weights() {
        let mut map = OverlayMap::new();
        map.register(WEIGHT, Overlay::store_backed(Type::Real)).unwrap();
        assert!(matches!(
            map.get(WEIGHT, 0, None),
            Err(GraphError::NoBackingStore { .. })
        ));
        let mut weights = vec![Value::Real(0.0); 4];
        map.set(WEIGHT, 2, Value::Real(0.5), Some(&mut weights)).unwrap();
        assert_eq!(weights[2], Value::Real(0.5));
        assert_eq!(
            map.get(WEIGHT, 2, Some(&weights)).unwrap(),
            Value::Real(0.5)
        );
    }

    #[test]
    fn test_register_once() {
        let mut map = OverlayMap::new();
        map.register("x", Overlay::growable(Type::Int, Value::Int(0)).unwrap())
            .unwrap();
        assert!(matches!(
            map.register("x", Overlay::store_backed(Type::Real)),
            Err(GraphError::PropertyExists { .. })
        ));
        // Remove then re-register is the supported replacement path.
        map.remove("x").unwrap();
        map.register("x", Overlay::constant(Type::Int, Value::Int(7)).unwrap())
            .unwrap();
        assert_eq!(map.get("x", 0, None).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_type_checked_writes() {
        let mut map = OverlayMap::new();
        map.register("n", Overlay::growable(Type::Int, Value::Int(0)).unwrap())
            .unwrap();
        assert!(matches!(
            map.set("n", 0, Value::Real(0.5), None),
            Err(GraphError::PropertyType { .. })
        ));
    }

    #[test]
    fn test_graph_attributes() {
        let mut props = PropertyMap::new();
        props.register_graph("nondet", Value::Bool(true)).unwrap();
        assert!(props.register_graph("nondet", Value::Bool(false)).is_err());
        assert_eq!(props.graph("nondet").unwrap(), Value::Bool(true));
        props.set_graph("nondet", Value::Bool(false)).unwrap();
        assert_eq!(props.graph("nondet").unwrap(), Value::Bool(false));
        assert!(props.graph("missing").is_err());
    }
}
