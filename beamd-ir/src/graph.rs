use std::collections::BTreeSet;

use serde::Serialize;

/// Static call graph of one module.
///
/// Nodes are opaque `module.name/arity` identifiers. Cycles and self-loops
/// are ordinary edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallGraph {
    nodes: BTreeSet<String>,
    edges: BTreeSet<(String, String)>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node identifier for `module.name/arity`.
    pub fn node_id(module: &str, name: &str, arity: u32) -> String {
        format!("{module}.{name}/{arity}")
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        self.nodes.insert(id.into());
    }

    /// Insert an edge, adding both endpoints as nodes.
    pub fn add_edge(&mut self, caller: impl Into<String>, callee: impl Into<String>) {
        let caller = caller.into();
        let callee = callee.into();
        self.nodes.insert(caller.clone());
        self.nodes.insert(callee.clone());
        self.edges.insert((caller, callee));
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn contains_edge(&self, caller: &str, callee: &str) -> bool {
        self.edges.contains(&(caller.to_owned(), callee.to_owned()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Callees of `caller`, in sorted order.
    pub fn callees<'a>(&'a self, caller: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(a, _)| a == caller)
            .map(|(_, b)| b.as_str())
    }
}
