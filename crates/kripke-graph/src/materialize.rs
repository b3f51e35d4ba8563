//! Materialization of an abstract enumerator into static storage.
//!
//! The pass walks a frontier of dense node indices: initial nodes seed
//! the highest index seen, processing a node may discover successors
//! beyond it, and the pass ends when the index range is exhausted. No
//! explicit work queue exists. Deterministic models fill a [`FlatStore`];
//! nondeterministic models fill a [`TwoLayerStore`], materializing each
//! state's choice nodes immediately after the state so the implicit
//! contiguous choice range holds by construction.

use crate::adjacency::{Adjacency, FlatStore, TwoLayerStore};
use crate::bitset::NodeSet;
use crate::error::{GraphError, GraphResult};
use crate::explorer::{AttributeDecl, Explorer};
use crate::property::{Attributed, Overlay, WEIGHT};
use crate::Node;
use kripke_values::Value;
use memory_stats::memory_stats;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Returns current process memory usage in MB, or None if unavailable.
fn current_memory_mb() -> Option<usize> {
    memory_stats().map(|stats| stats.physical_mem / (1024 * 1024))
}

/// Materialization options.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// Sampling interval of the background progress reporter; None
    /// disables it. The reporter only reads a counter and is purely
    /// observational.
    pub progress_interval: Option<Duration>,
    /// Shrink growth-mode arrays to exact size after a successful pass.
    pub trim: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            progress_interval: None,
            trim: true,
        }
    }
}

/// The store produced by [`materialize`], layout chosen by the
/// enumerator's determinism.
#[derive(Debug, Clone)]
pub enum MaterializedGraph {
    Flat(FlatStore),
    TwoLayer(TwoLayerStore),
}

impl MaterializedGraph {
    pub fn as_flat(&self) -> Option<&FlatStore> {
        match self {
            MaterializedGraph::Flat(store) => Some(store),
            MaterializedGraph::TwoLayer(_) => None,
        }
    }

    pub fn as_two_layer(&self) -> Option<&TwoLayerStore> {
        match self {
            MaterializedGraph::Flat(_) => None,
            MaterializedGraph::TwoLayer(store) => Some(store),
        }
    }

    fn trim(&mut self) {
        match self {
            MaterializedGraph::Flat(store) => store.trim(),
            MaterializedGraph::TwoLayer(store) => store.trim(),
        }
    }
}

impl Adjacency for MaterializedGraph {
    fn num_nodes(&self) -> usize {
        match self {
            MaterializedGraph::Flat(store) => store.num_nodes(),
            MaterializedGraph::TwoLayer(store) => store.num_nodes(),
        }
    }

    fn num_edges(&self) -> usize {
        match self {
            MaterializedGraph::Flat(store) => store.num_edges(),
            MaterializedGraph::TwoLayer(store) => store.num_edges(),
        }
    }

    fn out_degree(&self, node: Node) -> GraphResult<usize> {
        match self {
            MaterializedGraph::Flat(store) => store.out_degree(node),
            MaterializedGraph::TwoLayer(store) => store.out_degree(node),
        }
    }

    fn successor(&self, node: Node, index: usize) -> GraphResult<Node> {
        match self {
            MaterializedGraph::Flat(store) => store.successor(node, index),
            MaterializedGraph::TwoLayer(store) => store.successor(node, index),
        }
    }

    fn initial(&self) -> &NodeSet {
        match self {
            MaterializedGraph::Flat(store) => store.initial(),
            MaterializedGraph::TwoLayer(store) => store.initial(),
        }
    }
}

impl Attributed for MaterializedGraph {
    fn node_attribute_names(&self) -> Vec<String> {
        match self {
            MaterializedGraph::Flat(store) => store.node_attribute_names(),
            MaterializedGraph::TwoLayer(store) => store.node_attribute_names(),
        }
    }

    fn edge_attribute_names(&self) -> Vec<String> {
        match self {
            MaterializedGraph::Flat(store) => store.edge_attribute_names(),
            MaterializedGraph::TwoLayer(store) => store.edge_attribute_names(),
        }
    }

    fn node_value(&self, name: &str, node: Node) -> GraphResult<Value> {
        match self {
            MaterializedGraph::Flat(store) => store.node_value(name, node),
            MaterializedGraph::TwoLayer(store) => store.node_value(name, node),
        }
    }

    fn edge_value(&self, name: &str, node: Node, index: usize) -> GraphResult<Value> {
        match self {
            MaterializedGraph::Flat(store) => store.edge_value(name, node, index),
            MaterializedGraph::TwoLayer(store) => store.edge_value(name, node, index),
        }
    }
}

/// Background sampler of the processed-node counter.
///
/// Reads one atomic and logs a rate estimate; it never touches the store
/// under construction, and any failure inside it is cosmetic.
struct ProgressReporter {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProgressReporter {
    fn spawn(interval: Duration, processed: Arc<AtomicUsize>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut last = 0usize;
            let mut last_sample = Instant::now();
            while !stop_flag.load(Ordering::Relaxed) {
                thread::park_timeout(interval);
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                let now = processed.load(Ordering::Relaxed);
                let elapsed = last_sample.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 {
                    (now.saturating_sub(last)) as f64 / elapsed
                } else {
                    0.0
                };
                last = now;
                last_sample = Instant::now();
                let nodes_per_sec = rate.round() as u64;
                match current_memory_mb() {
                    Some(mb) => info!(
                        nodes = now,
                        nodes_per_sec,
                        memory_mb = mb,
                        "materialization progress"
                    ),
                    None => info!(nodes = now, nodes_per_sec, "materialization progress"),
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal and join the sampler thread. A panicked sampler is logged
    /// and otherwise ignored.
    fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                debug!("progress reporter thread panicked");
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

/// Drive `explorer` to exhaustion and return a static store.
///
/// Any enumerator error aborts the whole pass; nothing partial is
/// returned. The progress reporter, if enabled, is stopped on both the
/// success and the failure path.
pub fn materialize<E: Explorer>(
    explorer: &mut E,
    options: &MaterializeOptions,
) -> GraphResult<MaterializedGraph> {
    let started = Instant::now();
    let processed = Arc::new(AtomicUsize::new(0));
    let reporter = options
        .progress_interval
        .map(|interval| ProgressReporter::spawn(interval, Arc::clone(&processed)));

    let result = if explorer.is_nondeterministic() {
        materialize_two_layer(explorer, &processed).map(MaterializedGraph::TwoLayer)
    } else {
        materialize_flat(explorer, &processed).map(MaterializedGraph::Flat)
    };

    if let Some(reporter) = reporter {
        reporter.stop();
    }

    let mut graph = result?;
    if options.trim {
        graph.trim();
    }
    info!(
        nodes = graph.num_nodes(),
        edges = graph.num_edges(),
        node_bits = explorer.num_node_bits(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "materialized state space"
    );
    Ok(graph)
}

/// Seed the frontier with the initial nodes, returning the highest index.
fn seed_frontier<E: Explorer>(
    explorer: &mut E,
    mark: &mut dyn FnMut(Node),
) -> GraphResult<Node> {
    let initials = explorer.initial_nodes()?;
    if initials.is_empty() {
        return Err(GraphError::NoInitialNodes);
    }
    let mut last = 0;
    for &node in &initials {
        mark(node);
        last = last.max(node);
    }
    Ok(last)
}

fn materialize_flat<E: Explorer>(
    explorer: &mut E,
    processed: &AtomicUsize,
) -> GraphResult<FlatStore> {
    let mut store = FlatStore::new();
    let node_decls = explorer.node_attributes();
    let edge_decls = explorer.edge_attributes();
    for (name, value) in graph_attribute_values(explorer)? {
        store.register_graph_attribute(&name, value)?;
    }
    for decl in &node_decls {
        store.register_node_attribute(&decl.name, growable_for(decl)?)?;
    }
    for decl in &edge_decls {
        if decl.name == WEIGHT {
            store.register_weight(decl.ty)?;
        } else {
            let overlay = growable_for(decl)?;
            store.register_edge_attribute(&decl.name, overlay)?;
        }
    }

    let mut last = seed_frontier(explorer, &mut |node| store.mark_initial(node))?;
    let mut node: Node = 0;
    let mut scratch: SmallVec<[Node; 8]> = SmallVec::new();
    while node <= last {
        explorer.query_node(node)?;
        let degree = explorer.out_degree()?;
        store.prepare(node, degree)?;
        scratch.clear();
        for index in 0..degree {
            let target = explorer.successor(index)?;
            last = last.max(target);
            scratch.push(target);
        }
        for (index, &target) in scratch.iter().enumerate() {
            store.set_successor(node, index, target)?;
        }
        for decl in &node_decls {
            let value = explorer.node_attribute(&decl.name)?;
            store.set_node_value(&decl.name, node, value)?;
        }
        for decl in &edge_decls {
            for index in 0..degree {
                let value = explorer.edge_attribute(&decl.name, index)?;
                if decl.name == WEIGHT {
                    store.set_weight(node, index, value)?;
                } else {
                    store.set_edge_value(&decl.name, node, index, value)?;
                }
            }
        }
        processed.fetch_add(1, Ordering::Relaxed);
        node += 1;
    }
    Ok(store)
}

fn materialize_two_layer<E: Explorer>(
    explorer: &mut E,
    processed: &AtomicUsize,
) -> GraphResult<TwoLayerStore> {
    let mut store = TwoLayerStore::new();
    let node_decls = explorer.node_attributes();
    let edge_decls = explorer.edge_attributes();
    for (name, value) in graph_attribute_values(explorer)? {
        store.register_graph_attribute(&name, value)?;
    }
    for decl in &node_decls {
        store.register_node_attribute(&decl.name, growable_for(decl)?)?;
    }
    for decl in &edge_decls {
        if decl.name == WEIGHT {
            store.register_weight(decl.ty)?;
        } else {
            let overlay = growable_for(decl)?;
            store.register_edge_attribute(&decl.name, overlay)?;
        }
    }

    let mut last = seed_frontier(explorer, &mut |node| store.mark_initial(node))?;
    let mut state: Node = 0;
    let mut choice_counter: usize = 0;
    while state <= last {
        explorer.query_node(state)?;
        let num_choices = explorer.out_degree()?;
        store.prepare_state(state, num_choices)?;
        for decl in &node_decls {
            let value = explorer.node_attribute(&decl.name)?;
            store.set_node_value(&decl.name, state, value)?;
        }
        // Choice nodes are assigned consecutive relative indices right
        // after their state, which is what keeps the implicit contiguous
        // range of the two-layer layout true.
        for choice in 0..num_choices {
            explorer.query_choice(choice)?;
            let degree = explorer.choice_out_degree()?;
            let rel = choice_counter;
            store.prepare_choice(rel, degree)?;
            for index in 0..degree {
                let target = explorer.choice_successor(index)?;
                last = last.max(target);
                store.set_choice_successor(rel, index, target)?;
            }
            for decl in &edge_decls {
                for index in 0..degree {
                    let value = explorer.choice_edge_attribute(&decl.name, index)?;
                    if decl.name == WEIGHT {
                        store.set_choice_weight(rel, index, value)?;
                    } else {
                        let node = (store.num_states() + rel) as Node;
                        store.set_edge_value(&decl.name, node, index, value)?;
                    }
                }
            }
            choice_counter += 1;
        }
        processed.fetch_add(1, Ordering::Relaxed);
        state += 1;
    }
    Ok(store)
}

/// Read the enumerator's declared graph-level attributes, importing each
/// value into its declared type.
fn graph_attribute_values<E: Explorer>(explorer: &E) -> GraphResult<Vec<(String, Value)>> {
    explorer
        .graph_attributes()
        .iter()
        .map(|decl| {
            let value = explorer.graph_attribute(&decl.name)?;
            let imported = decl.ty.import(value).map_err(|source| {
                GraphError::PropertyType {
                    name: decl.name.clone(),
                    source,
                }
            })?;
            Ok((decl.name.clone(), imported))
        })
        .collect()
}

fn growable_for(decl: &AttributeDecl) -> GraphResult<Overlay> {
    Overlay::growable(decl.ty, decl.ty.default_value()).map_err(|source| {
        GraphError::PropertyType {
            name: decl.name.clone(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kripke_values::Type;

    /// 3-state DTMC: each state moves to the next two states (mod 3)
    /// with probability one half each.
    struct Dtmc3 {
        current: Option<Node>,
        fail_at: Option<Node>,
    }

    impl Dtmc3 {
        fn new() -> Self {
            Self {
                current: None,
                fail_at: None,
            }
        }
    }

    impl Explorer for Dtmc3 {
        fn initial_nodes(&mut self) -> GraphResult<Vec<Node>> {
            Ok(vec![0])
        }

        fn query_node(&mut self, node: Node) -> GraphResult<()> {
            if self.fail_at == Some(node) {
                return Err(GraphError::Enumerator {
                    message: "injected failure".into(),
                });
            }
            self.current = Some(node);
            Ok(())
        }

        fn out_degree(&self) -> GraphResult<usize> {
            Ok(2)
        }

        fn successor(&self, index: usize) -> GraphResult<Node> {
            let node = self.current.ok_or(GraphError::Unpositioned)?;
            Ok((node + 1 + index as Node) % 3)
        }

        fn node_attributes(&self) -> Vec<AttributeDecl> {
            vec![AttributeDecl::new("target", Type::Bool)]
        }

        fn edge_attributes(&self) -> Vec<AttributeDecl> {
            vec![AttributeDecl::new(WEIGHT, Type::Real)]
        }

        fn graph_attributes(&self) -> Vec<AttributeDecl> {
            vec![AttributeDecl::new("model", Type::Int)]
        }

        fn graph_attribute(&self, name: &str) -> GraphResult<Value> {
            match name {
                "model" => Ok(Value::Int(1)),
                _ => Err(GraphError::UnknownProperty { name: name.into() }),
            }
        }

        fn node_attribute(&self, name: &str) -> GraphResult<Value> {
            let node = self.current.ok_or(GraphError::Unpositioned)?;
            match name {
                "target" => Ok(Value::Bool(node == 2)),
                _ => Err(GraphError::UnknownProperty { name: name.into() }),
            }
        }

        fn edge_attribute(&self, name: &str, _index: usize) -> GraphResult<Value> {
            match name {
                WEIGHT => Ok(Value::Real(0.5)),
                _ => Err(GraphError::UnknownProperty { name: name.into() }),
            }
        }

        fn num_node_bits(&self) -> usize {
            2
        }

        fn is_nondeterministic(&self) -> bool {
            false
        }
    }

    /// 2-state MDP: state 0 offers two choices (stay as a Dirac, or a
    /// coin flip between both states), state 1 offers one Dirac back
    /// to 0.
    struct Mdp2 {
        state: Option<Node>,
        choice: Option<usize>,
    }

    impl Mdp2 {
        fn new() -> Self {
            Self {
                state: None,
                choice: None,
            }
        }

        fn branches(&self) -> GraphResult<Vec<(Node, f64)>> {
            let state = self.state.ok_or(GraphError::Unpositioned)?;
            let choice = self.choice.ok_or(GraphError::Unpositioned)?;
            Ok(match (state, choice) {
                (0, 0) => vec![(0, 1.0)],
                (0, 1) => vec![(0, 0.5), (1, 0.5)],
                (1, 0) => vec![(0, 1.0)],
                _ => vec![],
            })
        }
    }

    impl Explorer for Mdp2 {
        fn initial_nodes(&mut self) -> GraphResult<Vec<Node>> {
            Ok(vec![0])
        }

        fn query_node(&mut self, node: Node) -> GraphResult<()> {
            self.state = Some(node);
            self.choice = None;
            Ok(())
        }

        fn out_degree(&self) -> GraphResult<usize> {
            match self.state.ok_or(GraphError::Unpositioned)? {
                0 => Ok(2),
                _ => Ok(1),
            }
        }

        fn successor(&self, _index: usize) -> GraphResult<Node> {
            Err(GraphError::Enumerator {
                message: "nondeterministic states expose successors per choice".into(),
            })
        }

        fn edge_attributes(&self) -> Vec<AttributeDecl> {
            vec![AttributeDecl::new(WEIGHT, Type::Real)]
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
            1
        }

        fn is_nondeterministic(&self) -> bool {
            true
        }

        fn query_choice(&mut self, index: usize) -> GraphResult<()> {
            self.choice = Some(index);
            Ok(())
        }

        fn choice_out_degree(&self) -> GraphResult<usize> {
            Ok(self.branches()?.len())
        }

        fn choice_successor(&self, index: usize) -> GraphResult<Node> {
            Ok(self.branches()?[index].0)
        }

        fn choice_edge_attribute(&self, name: &str, index: usize) -> GraphResult<Value> {
            match name {
                WEIGHT => Ok(Value::Real(self.branches()?[index].1)),
                _ => Err(GraphError::UnknownProperty { name: name.into() }),
            }
        }
    }

    #[test]
    fn test_dtmc_materializes_flat() {
        let mut explorer = Dtmc3::new();
        let graph = materialize(&mut explorer, &MaterializeOptions::default()).unwrap();
        let store = graph.as_flat().expect("deterministic model");

        assert_eq!(store.num_nodes(), 3);
        assert_eq!(store.num_edges(), 6);
        assert_eq!(store.bounds_raw(), &[0, 2, 4, 6]);
        assert!(store.initial().contains(0));

        // WEIGHT sums to one per node.
        for node in 0..3 {
            let sum: f64 = (0..2)
                .map(|i| store.weight(node, i).unwrap().as_real().unwrap())
                .sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        assert_eq!(store.node_value("target", 2).unwrap(), Value::Bool(true));
        assert_eq!(store.node_value("target", 1).unwrap(), Value::Bool(false));
        assert_eq!(store.graph_attribute("model").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_mdp_materializes_two_layer() {
        let mut explorer = Mdp2::new();
        let graph = materialize(&mut explorer, &MaterializeOptions::default()).unwrap();
        let store = graph.as_two_layer().expect("nondeterministic model");

        assert_eq!(store.num_states(), 2);
        assert_eq!(store.num_choices(), 3);
        assert_eq!(store.num_edges(), 4);

        // State 0's choices are the contiguous choice nodes 2 and 3,
        // state 1's single choice is node 4.
        assert_eq!(store.successor(0, 0).unwrap(), 2);
        assert_eq!(store.successor(0, 1).unwrap(), 3);
        assert_eq!(store.successor(1, 0).unwrap(), 4);

        // Choice 1 (node 3) is the coin flip.
        assert_eq!(store.choice_successors_of(1).unwrap(), &[0, 1]);
        assert_eq!(store.choice_weight(1, 0).unwrap(), Value::Real(0.5));
        assert_eq!(store.choice_weight(1, 1).unwrap(), Value::Real(0.5));
        // Dirac choices carry weight one.
        assert_eq!(store.choice_weight(0, 0).unwrap(), Value::Real(1.0));
        assert_eq!(store.choice_weight(2, 0).unwrap(), Value::Real(1.0));
    }

    #[test]
    fn test_enumerator_error_aborts() {
        let mut explorer = Dtmc3::new();
        explorer.fail_at = Some(2);
        let result = materialize(&mut explorer, &MaterializeOptions::default());
        assert!(matches!(result, Err(GraphError::Enumerator { .. })));
    }

    #[test]
    fn test_reporter_is_stopped_on_failure() {
        let mut explorer = Dtmc3::new();
        explorer.fail_at = Some(1);
        let options = MaterializeOptions {
            progress_interval: Some(Duration::from_millis(5)),
            trim: true,
        };
        // Must return promptly despite the running reporter thread.
        let result = materialize(&mut explorer, &options);
        assert!(result.is_err());
    }

    #[test]
    fn test_progress_reporter_runs() {
        let mut explorer = Dtmc3::new();
        let options = MaterializeOptions {
            progress_interval: Some(Duration::from_millis(1)),
            trim: false,
        };
        let graph = materialize(&mut explorer, &options).unwrap();
        assert_eq!(graph.num_nodes(), 3);
    }
}
