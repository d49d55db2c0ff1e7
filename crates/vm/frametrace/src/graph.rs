//! Dataflow graph produced by a completed trace.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::runtime::{DictKey, HostFn, ModuleObject, RuntimeValue};
use crate::value::Literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Operand of a graph node: another node, a literal, or a structure of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Node(NodeId),
    Const(Literal),
    Tuple(Vec<Arg>),
    List(Vec<Arg>),
    Dict(Vec<(DictKey, Arg)>),
    Slice(Box<[Arg; 3]>),
}

impl Arg {
    /// Every node this operand reads.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        match self {
            Arg::Node(id) => out.push(*id),
            Arg::Const(_) => {}
            Arg::Tuple(items) | Arg::List(items) => items.iter().for_each(|item| item.collect_nodes(out)),
            Arg::Dict(entries) => entries.iter().for_each(|(_, item)| item.collect_nodes(out)),
            Arg::Slice(parts) => parts.iter().for_each(|item| item.collect_nodes(out)),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |items: &[Arg]| items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        match self {
            Arg::Node(id) => write!(f, "{id}"),
            Arg::Const(literal) => write!(f, "{literal}"),
            Arg::Tuple(items) => write!(f, "({})", join(items)),
            Arg::List(items) => write!(f, "[{}]", join(items)),
            Arg::Dict(entries) => {
                let body = entries
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{body}}}")
            }
            Arg::Slice(parts) => write!(f, "slice({})", join(parts.as_slice())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeOp {
    /// Graph input bound to a frame binding path.
    Placeholder { name: String },
    /// Parameter or attribute of a registered module, `"<module key>.<member>"`.
    GetAttr { target: String },
    CallFunction { target: HostFn },
    /// Array method; the receiver is the first argument.
    CallMethod { method: HostFn },
    CallModule { target: String },
    /// Attribute read on the first argument.
    Attribute { name: String },
    Output,
}

impl NodeOp {
    fn opcode(&self) -> &'static str {
        match self {
            NodeOp::Placeholder { .. } => "placeholder",
            NodeOp::GetAttr { .. } => "get_attr",
            NodeOp::CallFunction { .. } => "call_function",
            NodeOp::CallMethod { .. } => "call_method",
            NodeOp::CallModule { .. } => "call_module",
            NodeOp::Attribute { .. } => "attribute",
            NodeOp::Output => "output",
        }
    }

    fn target(&self) -> String {
        match self {
            NodeOp::Placeholder { name } => name.clone(),
            NodeOp::GetAttr { target } | NodeOp::CallModule { target } => target.clone(),
            NodeOp::CallFunction { target } => target.to_string(),
            NodeOp::CallMethod { method } => method.to_string(),
            NodeOp::Attribute { name } => name.clone(),
            NodeOp::Output => "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub op: NodeOp,
    pub args: Vec<Arg>,
}

/// A finished, topologically ordered graph whose last node is the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Input names in positional order.
    pub fn placeholders(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.op {
                NodeOp::Placeholder { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn output(&self) -> Option<&Arg> {
        self.nodes
            .last()
            .filter(|node| node.op == NodeOp::Output)
            .and_then(|node| node.args.first())
    }

    /// Number of compute nodes, i.e. everything but inputs, attribute fetches and the output.
    pub fn op_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| {
                matches!(
                    node.op,
                    NodeOp::CallFunction { .. } | NodeOp::CallMethod { .. } | NodeOp::CallModule { .. }
                )
            })
            .count()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<8} {:<14} {:<20} args", "node", "opcode", "target")?;
        for node in &self.nodes {
            let args = node.args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            writeln!(f, "{:<8} {:<14} {:<20} {args}", node.id.to_string(), node.op.opcode(), node.op.target())?;
        }
        Ok(())
    }
}

/// Incrementally records nodes during a trace.
///
/// Identical pure nodes are deduplicated, so reading the same attribute or
/// applying the same operation twice yields one node.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    dedup: FxHashMap<(NodeOp, Vec<Arg>), NodeId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder(&mut self, name: &str) -> NodeId {
        self.insert(NodeOp::Placeholder { name: name.to_string() }, Vec::new())
    }

    pub fn get_attr(&mut self, target: &str) -> NodeId {
        self.insert(NodeOp::GetAttr { target: target.to_string() }, Vec::new())
    }

    pub fn call_function(&mut self, target: HostFn, args: Vec<Arg>) -> NodeId {
        self.insert(NodeOp::CallFunction { target }, args)
    }

    pub fn call_method(&mut self, method: HostFn, receiver: NodeId, args: Vec<Arg>) -> NodeId {
        let mut all = Vec::with_capacity(args.len().saturating_add(1));
        all.push(Arg::Node(receiver));
        all.extend(args);
        self.insert(NodeOp::CallMethod { method }, all)
    }

    pub fn call_module(&mut self, target: &str, args: Vec<Arg>) -> NodeId {
        self.insert(NodeOp::CallModule { target: target.to_string() }, args)
    }

    pub fn attribute(&mut self, base: NodeId, name: &str) -> NodeId {
        self.insert(NodeOp::Attribute { name: name.to_string() }, vec![Arg::Node(base)])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, op: NodeOp, args: Vec<Arg>) -> NodeId {
        let key = (op, args);
        if let Some(id) = self.dedup.get(&key) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        let (op, args) = key.clone();
        self.nodes.push(Node { id, op, args });
        self.dedup.insert(key, id);
        id
    }

    /// Appends the output node and freezes the graph.
    pub fn finish(mut self, output: Arg) -> Graph {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            op: NodeOp::Output,
            args: vec![output],
        });
        Graph { nodes: self.nodes }
    }
}

/// Modules reachable from a trace, keyed by their access path (`m.layers.2`).
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: IndexMap<String, Arc<ModuleObject>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` under `key` unless the key is taken; returns the key.
    pub fn register(&mut self, key: &str, module: Arc<ModuleObject>) -> String {
        self.modules.entry(key.to_string()).or_insert(module);
        key.to_string()
    }

    /// Registers a member of the module at `base`.
    pub fn add_submodule(&mut self, base: &str, name: &str, module: Arc<ModuleObject>) -> String {
        self.register(&format!("{base}.{name}"), module)
    }

    pub fn get(&self, key: &str) -> Option<&Arc<ModuleObject>> {
        self.modules.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolves a `get_attr` target such as `m.layer.weight`.
    pub fn resolve_attr(&self, target: &str) -> Option<RuntimeValue> {
        let (key, member) = target.rsplit_once('.')?;
        self.get(key)?.member(member).cloned()
    }
}
