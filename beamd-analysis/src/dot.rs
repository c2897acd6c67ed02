//! Graphviz output for call graphs.

use std::fmt::Write;

use beamd_ir::CallGraph;

/// Render `graph` as a DOT digraph named after `module`.
///
/// Nodes belonging to `module` are drawn as boxes, external targets as
/// ellipses.
pub fn render_dot(module: &str, graph: &CallGraph) -> String {
    let local = format!("{module}.");
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", quote(module));
    for node in graph.nodes() {
        let shape = if node.starts_with(&local) { "box" } else { "ellipse" };
        let _ = writeln!(out, "    {} [shape={shape}];", quote(node));
    }
    for (caller, callee) in graph.edges() {
        let _ = writeln!(out, "    {} -> {};", quote(caller), quote(callee));
    }
    out.push_str("}\n");
    out
}

fn quote(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}
