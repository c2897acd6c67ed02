//! Static call graph extraction.

use std::collections::HashMap;

use beamd_ir::{CallGraph, Operand, RawFunction, RawInstruction};
use beamd_isa::OpcodeFlags;

/// Build the call graph of `module` from its functions' raw code.
///
/// Every local function is a node. External calls and BIF invocations add an
/// edge to `module.name/arity` of the import they name. Local calls add an
/// edge only when the target label is the entry of a function in this
/// module; calls through funs and `apply` are skipped.
pub fn extract_call_graph(module: &str, functions: &[RawFunction]) -> CallGraph {
    let mut graph = CallGraph::new();
    let mut entries = HashMap::with_capacity(functions.len());
    for f in functions {
        let id = CallGraph::node_id(module, &f.name, f.arity);
        entries.insert(f.entry, id.clone());
        graph.add_node(id);
    }

    for f in functions {
        let caller = CallGraph::node_id(module, &f.name, f.arity);
        for insn in &f.code {
            if let Some(callee) = call_target(insn, &entries) {
                graph.add_edge(caller.clone(), callee);
            }
        }
    }

    log::debug!(
        "call graph of {module}: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    graph
}

fn call_target(insn: &RawInstruction, entries: &HashMap<u32, String>) -> Option<String> {
    let info = insn.info();
    let flags = info.flags();

    if flags.contains(OpcodeFlags::DYNAMIC_CALL) {
        return None;
    }

    if flags.intersects(OpcodeFlags::EXTERNAL_CALL | OpcodeFlags::BIF_CALL) {
        let named = info.import_operand().and_then(|i| insn.operands.get(i));
        let func = named
            .and_then(Operand::as_ext_func)
            .or_else(|| insn.operands.iter().find_map(Operand::as_ext_func))?;
        return Some(CallGraph::node_id(&func.module, &func.function, func.arity));
    }

    if flags.contains(OpcodeFlags::LOCAL_CALL) {
        let label = insn.operands.iter().find_map(|op| match op {
            Operand::Label(l) => Some(*l),
            _ => None,
        })?;
        return entries.get(&label).cloned();
    }

    None
}
