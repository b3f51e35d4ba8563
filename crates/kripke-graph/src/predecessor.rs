//! Reverse adjacency, built on demand.
//!
//! The index is a counting-sort transpose of an [`Adjacency`] store:
//! in-degrees are counted into a prefix-sum bounds array, source ids are
//! scattered using the bounds entries as write cursors, and the bounds are
//! then rebuilt by a second counting pass since the scatter consumed them.
//! An absent index means "not computed", never "no predecessors".

use crate::adjacency::Adjacency;
use crate::bitset::NodeSet;
use crate::error::GraphResult;
use crate::Node;
use tracing::debug;

/// Predecessor lists in CSR form: `targets[bounds[n]..bounds[n + 1]]` are
/// the sources of edges into node `n`.
#[derive(Debug, Clone)]
pub struct PredecessorIndex {
    bounds: Vec<u32>,
    targets: Vec<Node>,
    restricted: bool,
}

impl PredecessorIndex {
    /// Transpose the full edge relation of `graph`.
    pub fn compute<G: Adjacency>(graph: &G) -> GraphResult<Self> {
        Self::build(graph, None)
    }

    /// Transpose only edges whose endpoints both lie in `subset`.
    pub fn compute_restricted<G: Adjacency>(graph: &G, subset: &NodeSet) -> GraphResult<Self> {
        Self::build(graph, Some(subset))
    }

    fn build<G: Adjacency>(graph: &G, subset: Option<&NodeSet>) -> GraphResult<Self> {
        let num_nodes = graph.num_nodes();
        let keep = |node: Node| subset.map_or(true, |s| s.contains(node));

        // First counting pass: in-degree of every kept target.
        let mut bounds = vec![0u32; num_nodes + 1];
        for source in 0..num_nodes as Node {
            if !keep(source) {
                continue;
            }
            for index in 0..graph.out_degree(source)? {
                let target = graph.successor(source, index)?;
                if keep(target) {
                    bounds[target as usize] += 1;
                }
            }
        }
        let mut sum = 0u32;
        for entry in bounds.iter_mut() {
            let count = *entry;
            *entry = sum;
            sum += count;
        }

        // Scatter sources, consuming the bounds entries as write cursors.
        let mut targets = vec![0 as Node; sum as usize];
        for source in 0..num_nodes as Node {
            if !keep(source) {
                continue;
            }
            for index in 0..graph.out_degree(source)? {
                let target = graph.successor(source, index)?;
                if keep(target) {
                    let cursor = &mut bounds[target as usize];
                    targets[*cursor as usize] = source;
                    *cursor += 1;
                }
            }
        }

        // The cursors now hold block ends; rebuild the bounds with a
        // second counting pass.
        bounds.iter_mut().for_each(|entry| *entry = 0);
        for source in 0..num_nodes as Node {
            if !keep(source) {
                continue;
            }
            for index in 0..graph.out_degree(source)? {
                let target = graph.successor(source, index)?;
                if keep(target) {
                    bounds[target as usize] += 1;
                }
            }
        }
        let mut sum = 0u32;
        for entry in bounds.iter_mut() {
            let count = *entry;
            *entry = sum;
            sum += count;
        }

        debug!(
            nodes = num_nodes,
            edges = targets.len(),
            restricted = subset.is_some(),
            "built predecessor index"
        );
        Ok(Self {
            bounds,
            targets,
            restricted: subset.is_some(),
        })
    }

    /// Sources of edges into `node`. Empty for out-of-range nodes.
    pub fn predecessors(&self, node: Node) -> &[Node] {
        let n = node as usize;
        if n + 1 >= self.bounds.len() {
            return &[];
        }
        &self.targets[self.bounds[n] as usize..self.bounds[n + 1] as usize]
    }

    pub fn in_degree(&self, node: Node) -> usize {
        self.predecessors(node).len()
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    pub fn num_edges(&self) -> usize {
        self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::FlatStore;
    use rand::{Rng, SeedableRng};

    fn store_from_lists(lists: &[Vec<Node>]) -> FlatStore {
        let mut store = FlatStore::new();
        for (node, successors) in lists.iter().enumerate() {
            store.prepare(node as Node, successors.len()).unwrap();
            for (i, &target) in successors.iter().enumerate() {
                store.set_successor(node as Node, i, target).unwrap();
            }
        }
        store
    }

    #[test]
    fn test_transpose_small() {
        let store = store_from_lists(&[vec![1, 2], vec![2], vec![0, 0]]);
        let index = PredecessorIndex::compute(&store).unwrap();
        assert_eq!(index.predecessors(0), &[2, 2]);
        assert_eq!(index.predecessors(1), &[0]);
        assert_eq!(index.predecessors(2), &[0, 1]);
        assert_eq!(index.num_edges(), 5);
        assert!(!index.is_restricted());
    }

    #[test]
    fn test_transpose_matches_reference_on_random_graphs() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let num_nodes = rng.gen_range(1..40usize);
            let lists: Vec<Vec<Node>> = (0..num_nodes)
                .map(|_| {
                    (0..rng.gen_range(0..6))
                        .map(|_| rng.gen_range(0..num_nodes) as Node)
                        .collect()
                })
                .collect();
            let store = store_from_lists(&lists);
            let index = PredecessorIndex::compute(&store).unwrap();

            // v ∈ predecessors(u) exactly as often as u ∈ successors(v).
            for u in 0..num_nodes as Node {
                for v in 0..num_nodes as Node {
                    let forward = lists[v as usize].iter().filter(|&&t| t == u).count();
                    let backward =
                        index.predecessors(u).iter().filter(|&&s| s == v).count();
                    assert_eq!(forward, backward, "edge ({v}, {u})");
                }
            }
        }
    }

    #[test]
    fn test_restricted_transpose() {
        // Edges: 0→1, 1→2, 2→0, 0→2. Subset {0, 2} keeps only 2→0 and 0→2.
        let store = store_from_lists(&[vec![1, 2], vec![2], vec![0]]);
        let subset: NodeSet = [0, 2].into_iter().collect();
        let index = PredecessorIndex::compute_restricted(&store, &subset).unwrap();
        assert!(index.is_restricted());
        assert_eq!(index.predecessors(0), &[2]);
        assert_eq!(index.predecessors(1), &[] as &[Node]);
        assert_eq!(index.predecessors(2), &[0]);
    }

    #[test]
    fn test_idempotent_recompute() {
        let mut store = store_from_lists(&[vec![1], vec![0]]);
        store.compute_predecessors().unwrap();
        let first = store.predecessor_index().unwrap().predecessors(0).as_ptr();
        store.compute_predecessors().unwrap();
        let second = store.predecessor_index().unwrap().predecessors(0).as_ptr();
        // No-op guard: the backing array was not rebuilt.
        assert_eq!(first, second);

        // A restricted index is replaced by an unrestricted recompute.
        let subset: NodeSet = [0].into_iter().collect();
        store.compute_predecessors_restricted(&subset).unwrap();
        assert!(store.predecessor_index().unwrap().is_restricted());
        store.compute_predecessors().unwrap();
        assert!(!store.predecessor_index().unwrap().is_restricted());
    }

    #[test]
    fn test_clear_means_not_computed() {
        let mut store = store_from_lists(&[vec![0]]);
        store.compute_predecessors().unwrap();
        store.clear_predecessors();
        assert!(store.predecessor_index().is_none());
    }
}
