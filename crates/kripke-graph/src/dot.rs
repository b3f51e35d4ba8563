//! DOT-format diagnostic export.
//!
//! Renders a store as `digraph { ... }` with one record per node line and
//! one per edge line, listing registered attributes as `key=value` label
//! fragments. The string-rendering path degrades to the literal `"ERROR"`
//! on any failure instead of propagating; callers who want errors use the
//! writer path.

use crate::adjacency::Adjacency;
use crate::error::{GraphError, GraphResult};
use crate::property::Attributed;
use std::fmt::Write as _;
use std::io;
use tracing::debug;

fn render<G: Attributed>(graph: &G, out: &mut String) -> GraphResult<()> {
    let node_names = graph.node_attribute_names();
    let edge_names = graph.edge_attribute_names();

    out.push_str("digraph {\n");
    for node in 0..graph.num_nodes() as crate::Node {
        out.push_str("  ");
        let _ = write!(out, "{}", node);
        if graph.initial().contains(node) || !node_names.is_empty() {
            out.push_str(" [label=\"");
            let mut first = true;
            if graph.initial().contains(node) {
                out.push_str("initial");
                first = false;
            }
            for name in &node_names {
                let value = graph.node_value(name, node)?;
                if !first {
                    out.push(',');
                }
                let _ = write!(out, "{}={}", name, value);
                first = false;
            }
            out.push_str("\"]");
        }
        out.push_str(";\n");
    }
    for node in 0..graph.num_nodes() as crate::Node {
        for index in 0..graph.out_degree(node)? {
            let target = graph.successor(node, index)?;
            out.push_str("  ");
            let _ = write!(out, "{} -> {}", node, target);
            if !edge_names.is_empty() {
                out.push_str(" [label=\"");
                let mut first = true;
                for name in &edge_names {
                    let value = graph.edge_value(name, node, index)?;
                    if !first {
                        out.push(',');
                    }
                    let _ = write!(out, "{}={}", name, value);
                    first = false;
                }
                out.push_str("\"]");
            }
            out.push_str(";\n");
        }
    }
    out.push_str("}\n");
    Ok(())
}

/// Render `graph` as DOT text. Never fails: any error collapses the
/// output to the literal string `"ERROR"`.
pub fn render_dot<G: Attributed>(graph: &G) -> String {
    let mut out = String::new();
    match render(graph, &mut out) {
        Ok(()) => out,
        Err(error) => {
            debug!(%error, "dot rendering failed");
            "ERROR".to_string()
        }
    }
}

/// Write `graph` as DOT text, propagating failures.
pub fn write_dot<G: Attributed, W: io::Write>(graph: &G, writer: &mut W) -> io::Result<()> {
    let mut out = String::new();
    render(graph, &mut out)
        .map_err(|error: GraphError| io::Error::new(io::ErrorKind::Other, error.to_string()))?;
    writer.write_all(out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::FlatStore;
    use crate::property::{Overlay, WEIGHT};
    use kripke_values::{Type, Value};

    fn two_node_store() -> FlatStore {
        let mut store = FlatStore::new();
        store.register_weight(Type::Real).unwrap();
        store
            .register_node_attribute("goal", Overlay::growable(Type::Bool, Value::Bool(false)).unwrap())
            .unwrap();
        store.prepare(0, 1).unwrap();
        store.set_successor(0, 0, 1).unwrap();
        store.set_weight(0, 0, Value::Real(1.0)).unwrap();
        store.prepare(1, 1).unwrap();
        store.set_successor(1, 0, 0).unwrap();
        store.set_weight(1, 0, Value::Real(1.0)).unwrap();
        store.set_node_value("goal", 1, Value::Bool(true)).unwrap();
        store.mark_initial(0);
        store
    }

    #[test]
    fn test_render_two_node_graph() {
        let store = two_node_store();
        let dot = render_dot(&store);
        let expected = "digraph {\n\
                        \x20 0 [label=\"initial,goal=false\"];\n\
                        \x20 1 [label=\"goal=true\"];\n\
                        \x20 0 -> 1 [label=\"weight=1\"];\n\
                        \x20 1 -> 0 [label=\"weight=1\"];\n\
                        }\n";
        assert_eq!(dot, expected);
    }

    #[test]
    fn test_write_dot_matches_render() {
        let store = two_node_store();
        let mut bytes = Vec::new();
        write_dot(&store, &mut bytes).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), render_dot(&store));
    }

    #[test]
    fn test_render_degrades_to_error_string() {
        // A computed overlay over a missing attribute fails on read; the
        // renderer must collapse to the sentinel, not propagate.
        let mut store = two_node_store();
        store
            .register_node_attribute(
                "broken",
                Overlay::computed(
                    Type::Real,
                    kripke_values::Operator::Add,
                    vec!["missing".into(), "missing".into()],
                ),
            )
            .unwrap();
        assert_eq!(render_dot(&store), "ERROR");
    }
}
