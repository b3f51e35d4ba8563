//! Per-node decision vectors over chosen successor indices.
//!
//! A scheduler maps each node to the local index of a chosen successor,
//! or [`UNSET`]. It is dimensioned to a graph's node count but holds no
//! reference to the graph; matching dimensions are a precondition, not an
//! enforced relationship. The compact variant packs `decision + 1` into
//! the minimal bit width for the graph's maximum out-degree, an 8-32x
//! reduction for large schedulers with small branching factors.

use crate::adjacency::Adjacency;
use crate::error::{GraphError, GraphResult};
use crate::Node;

/// Sentinel decision meaning "no decision recorded".
pub const UNSET: i32 = -1;

/// Node → chosen successor local-index, with [`UNSET`] gaps.
pub trait Scheduler {
    fn num_nodes(&self) -> usize;

    fn decision(&self, node: Node) -> GraphResult<i32>;

    /// Record `decision` for `node`. The decision must be [`UNSET`] or a
    /// valid successor index of `node` in `graph` at set time.
    fn set_decision<G: Adjacency>(
        &mut self,
        graph: &G,
        node: Node,
        decision: i32,
    ) -> GraphResult<()>;
}

fn check_decision<G: Adjacency>(
    scheduler_nodes: usize,
    graph: &G,
    node: Node,
    decision: i32,
) -> GraphResult<()> {
    if node as usize >= scheduler_nodes {
        return Err(GraphError::NodeOutOfBounds {
            node,
            num_nodes: scheduler_nodes,
        });
    }
    if decision == UNSET {
        return Ok(());
    }
    let degree = graph.out_degree(node)?;
    if decision < 0 || decision as usize >= degree {
        return Err(GraphError::DecisionOutOfBounds {
            node,
            decision,
            limit: degree,
        });
    }
    Ok(())
}

/// Array-backed scheduler: one native-width integer per node.
#[derive(Debug, Clone)]
pub struct ArrayScheduler {
    decisions: Vec<i32>,
}

impl ArrayScheduler {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            decisions: vec![UNSET; num_nodes],
        }
    }

    pub fn for_graph<G: Adjacency>(graph: &G) -> Self {
        Self::new(graph.num_nodes())
    }

    /// Copy every decision out of another scheduler representation.
    pub fn from_scheduler<S: Scheduler>(other: &S) -> GraphResult<Self> {
        let mut decisions = Vec::with_capacity(other.num_nodes());
        for node in 0..other.num_nodes() as Node {
            decisions.push(other.decision(node)?);
        }
        Ok(Self { decisions })
    }

    pub fn decisions_raw(&self) -> &[i32] {
        &self.decisions
    }
}

impl Scheduler for ArrayScheduler {
    fn num_nodes(&self) -> usize {
        self.decisions.len()
    }

    fn decision(&self, node: Node) -> GraphResult<i32> {
        self.decisions
            .get(node as usize)
            .copied()
            .ok_or(GraphError::NodeOutOfBounds {
                node,
                num_nodes: self.decisions.len(),
            })
    }

    fn set_decision<G: Adjacency>(
        &mut self,
        graph: &G,
        node: Node,
        decision: i32,
    ) -> GraphResult<()> {
        check_decision(self.decisions.len(), graph, node, decision)?;
        self.decisions[node as usize] = decision;
        Ok(())
    }
}

/// Bit-packed scheduler.
///
/// Stores `decision + 1` in `bits = ceil(log2(max_out_degree + 1))` bits
/// per node, so zero encodes [`UNSET`]. Bits are addressed individually
/// as `bit = node * bits + k`, read-modify-write per bit; a value may
/// straddle a word boundary.
#[derive(Debug, Clone)]
pub struct CompactScheduler {
    words: Vec<u64>,
    bits: u32,
    num_nodes: usize,
    max_out_degree: usize,
}

/// Minimal bit width representing values `0..=max` (at least one bit).
fn bits_for(max: usize) -> u32 {
    (usize::BITS - max.leading_zeros()).max(1)
}

impl CompactScheduler {
    pub fn new(num_nodes: usize, max_out_degree: usize) -> Self {
        let bits = bits_for(max_out_degree);
        let total_bits = num_nodes * bits as usize;
        Self {
            words: vec![0; total_bits.div_ceil(64)],
            bits,
            num_nodes,
            max_out_degree,
        }
    }

    /// Dimension to `graph`, scanning it for the maximum out-degree.
    pub fn for_graph<G: Adjacency>(graph: &G) -> GraphResult<Self> {
        let mut max_out_degree = 0;
        for node in 0..graph.num_nodes() as Node {
            max_out_degree = max_out_degree.max(graph.out_degree(node)?);
        }
        Ok(Self::new(graph.num_nodes(), max_out_degree))
    }

    /// Copy every decision out of another scheduler representation.
    pub fn from_scheduler<S: Scheduler>(other: &S, max_out_degree: usize) -> GraphResult<Self> {
        let mut compact = Self::new(other.num_nodes(), max_out_degree);
        for node in 0..other.num_nodes() as Node {
            let decision = other.decision(node)?;
            if decision != UNSET && decision as usize >= max_out_degree {
                return Err(GraphError::DecisionOutOfBounds {
                    node,
                    decision,
                    limit: max_out_degree,
                });
            }
            compact.store(node, decision);
        }
        Ok(compact)
    }

    /// Bits per stored decision.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn max_out_degree(&self) -> usize {
        self.max_out_degree
    }

    pub fn memory_bytes(&self) -> usize {
        self.words.len() * 8
    }

    fn load(&self, node: Node) -> i32 {
        let base = node as usize * self.bits as usize;
        let mut stored = 0u64;
        for k in 0..self.bits as usize {
            let bit = base + k;
            let word = self.words[bit / 64];
            stored |= ((word >> (bit % 64)) & 1) << k;
        }
        stored as i32 - 1
    }

    fn store(&mut self, node: Node, decision: i32) {
        let stored = (decision + 1) as u64;
        let base = node as usize * self.bits as usize;
        for k in 0..self.bits as usize {
            let bit = base + k;
            let mask = 1u64 << (bit % 64);
            if (stored >> k) & 1 == 1 {
                self.words[bit / 64] |= mask;
            } else {
                self.words[bit / 64] &= !mask;
            }
        }
    }
}

impl Scheduler for CompactScheduler {
    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn decision(&self, node: Node) -> GraphResult<i32> {
        if node as usize >= self.num_nodes {
            return Err(GraphError::NodeOutOfBounds {
                node,
                num_nodes: self.num_nodes,
            });
        }
        Ok(self.load(node))
    }

    fn set_decision<G: Adjacency>(
        &mut self,
        graph: &G,
        node: Node,
        decision: i32,
    ) -> GraphResult<()> {
        check_decision(self.num_nodes, graph, node, decision)?;
        if decision != UNSET && decision as usize >= self.max_out_degree {
            return Err(GraphError::DecisionOutOfBounds {
                node,
                decision,
                limit: self.max_out_degree,
            });
        }
        self.store(node, decision);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::FlatStore;
    use proptest::prelude::*;

    /// Complete digraph where every node has `degree` successors.
    fn uniform_store(num_nodes: usize, degree: usize) -> FlatStore {
        let mut store = FlatStore::new();
        for node in 0..num_nodes {
            store.prepare(node as Node, degree).unwrap();
            for i in 0..degree {
                store
                    .set_successor(node as Node, i, (i % num_nodes) as Node)
                    .unwrap();
            }
        }
        store
    }

    #[test]
    fn test_bits_for() {
        assert_eq!(bits_for(0), 1);
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(2), 2);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(7), 3);
        assert_eq!(bits_for(8), 4);
        assert_eq!(bits_for(255), 8);
        assert_eq!(bits_for(256), 9);
    }

    #[test]
    fn test_array_set_time_validation() {
        let store = uniform_store(4, 2);
        let mut scheduler = ArrayScheduler::for_graph(&store);
        scheduler.set_decision(&store, 1, 1).unwrap();
        scheduler.set_decision(&store, 2, UNSET).unwrap();
        assert_eq!(scheduler.decision(1).unwrap(), 1);
        assert_eq!(scheduler.decision(2).unwrap(), UNSET);
        assert_eq!(scheduler.decision(0).unwrap(), UNSET);
        assert!(matches!(
            scheduler.set_decision(&store, 1, 2),
            Err(GraphError::DecisionOutOfBounds { .. })
        ));
        assert!(matches!(
            scheduler.set_decision(&store, 9, 0),
            Err(GraphError::NodeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_compact_straddles_word_boundaries() {
        // 3 bits per node: node 21 occupies bits 63..66.
        let store = uniform_store(30, 7);
        let mut scheduler = CompactScheduler::for_graph(&store).unwrap();
        assert_eq!(scheduler.bits(), 3);
        scheduler.set_decision(&store, 21, 6).unwrap();
        scheduler.set_decision(&store, 20, 3).unwrap();
        scheduler.set_decision(&store, 22, UNSET).unwrap();
        assert_eq!(scheduler.decision(21).unwrap(), 6);
        assert_eq!(scheduler.decision(20).unwrap(), 3);
        assert_eq!(scheduler.decision(22).unwrap(), UNSET);
    }

    #[test]
    fn test_representations_agree_on_grid() {
        for &max_degree in &[1usize, 2, 3, 7, 8, 255, 256] {
            let num_nodes = 67;
            let store = uniform_store(num_nodes, max_degree);
            let mut array = ArrayScheduler::for_graph(&store);
            let mut compact = CompactScheduler::for_graph(&store).unwrap();
            // A fixed pattern mixing UNSET with extreme valid decisions.
            for node in 0..num_nodes as Node {
                let decision = match node % 3 {
                    0 => UNSET,
                    1 => (max_degree - 1) as i32,
                    _ => 0,
                };
                array.set_decision(&store, node, decision).unwrap();
                compact.set_decision(&store, node, decision).unwrap();
            }
            for node in 0..num_nodes as Node {
                assert_eq!(
                    array.decision(node).unwrap(),
                    compact.decision(node).unwrap(),
                    "max_degree {max_degree} node {node}"
                );
            }
        }
    }

    #[test]
    fn test_conversion_round_trip() {
        let store = uniform_store(10, 3);
        let mut array = ArrayScheduler::for_graph(&store);
        array.set_decision(&store, 0, 2).unwrap();
        array.set_decision(&store, 5, 1).unwrap();
        let compact = CompactScheduler::from_scheduler(&array, 3).unwrap();
        let back = ArrayScheduler::from_scheduler(&compact).unwrap();
        assert_eq!(back.decisions_raw(), array.decisions_raw());
    }

    proptest! {
        #[test]
        fn prop_compact_matches_array(
            max_degree in 1usize..300,
            decisions in proptest::collection::vec(-1i32..300, 1..80),
        ) {
            let num_nodes = decisions.len();
            let store = uniform_store(num_nodes, max_degree);
            let mut array = ArrayScheduler::for_graph(&store);
            let mut compact = CompactScheduler::new(num_nodes, max_degree);
            for (node, &raw) in decisions.iter().enumerate() {
                let decision = if raw < 0 {
                    UNSET
                } else {
                    raw % max_degree as i32
                };
                array.set_decision(&store, node as Node, decision).unwrap();
                compact.set_decision(&store, node as Node, decision).unwrap();
            }
            for node in 0..num_nodes as Node {
                prop_assert_eq!(array.decision(node).unwrap(), compact.decision(node).unwrap());
            }
        }
    }
}
