//! Exported op graph with fake-value metadata.
//!
//! Every node carries a [`FakeValue`]: the shape/dtype (or scalar) its output
//! is known to have before anything runs. Call nodes keep their arguments as
//! an [`Argument`] tree whose node references were resolved against this
//! metadata when the tree was built.

use crate::types::{DType, Shape};
use crate::value::Kwargs;
use crate::{OpcheckError, Result};
use smallvec::SmallVec;

/// Unique identifier for a node in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Metadata about a tensor (known before materialization).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorMeta {
    pub shape: Shape,
    pub dtype: DType,
}

impl TensorMeta {
    pub fn new(dims: impl Into<Vec<i64>>, dtype: DType) -> Self {
        Self {
            shape: Shape::new(dims),
            dtype,
        }
    }
}

/// The value annotation attached to a node.
#[derive(Clone, Debug, PartialEq)]
pub enum FakeValue {
    Tensor(TensorMeta),
    Int(i64),
    Float(f64),
    /// Any annotation the input generator cannot materialize (symbolic
    /// sizes, opaque objects, ...). Holds a description for diagnostics.
    Other(String),
}

impl std::fmt::Display for FakeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FakeValue::Tensor(m) => write!(f, "tensor({}, {})", m.shape, m.dtype),
            FakeValue::Int(v) => write!(f, "{v}"),
            FakeValue::Float(v) => write!(f, "{v}"),
            FakeValue::Other(desc) => f.write_str(desc),
        }
    }
}

/// A reference to a graph node, resolved to the node's fake value.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeRef {
    pub id: NodeId,
    pub name: String,
    pub value: FakeValue,
}

/// An op argument before concretization.
#[derive(Clone, Debug, PartialEq)]
pub enum Argument {
    Node(NodeRef),
    Int(i64),
    Float(f64),
    Bool(bool),
    DType(DType),
    Seq(Vec<Argument>),
    /// A leaf kind with no concrete counterpart (strings, layouts, `None`, ...).
    Opaque(String),
}

impl Argument {
    fn collect_inputs(&self, out: &mut SmallVec<[NodeId; 2]>) {
        match self {
            Argument::Node(r) => {
                if !out.contains(&r.id) {
                    out.push(r.id);
                }
            }
            Argument::Seq(items) => items.iter().for_each(|a| a.collect_inputs(out)),
            _ => {}
        }
    }
}

/// The set of operations the eager reference backend implements.
///
/// Parameters (axes, indices, dtypes) are passed as call arguments, the way
/// the exported graph records them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    // ── Elementwise ─────────────────────────────────────────────────────
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Exp,
    Sqrt,

    // ── Reductions ──────────────────────────────────────────────────────
    /// `sum(x)` or `sum(x, dim)`.
    Sum,

    // ── Linear algebra ──────────────────────────────────────────────────
    MatMul,

    // ── Shape manipulation ──────────────────────────────────────────────
    /// `transpose(x, dim0, dim1)`.
    Transpose,
    /// `split(x, split_size, dim)`; multiple outputs.
    Split,
    /// `cat([x, ...], dim)`.
    Cat,

    // ── Indexing ────────────────────────────────────────────────────────
    /// `index_select(x, dim, index)`.
    IndexSelect,

    // ── Activations ─────────────────────────────────────────────────────
    /// `softmax(x, dim)`.
    Softmax,

    // ── Misc ────────────────────────────────────────────────────────────
    /// `lerp(start, end, weight)`.
    Lerp,
    /// `to(x, dtype)`.
    ToDtype,
}

impl OpKind {
    pub const ALL: [OpKind; 16] = [
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::Neg,
        OpKind::Exp,
        OpKind::Sqrt,
        OpKind::Sum,
        OpKind::MatMul,
        OpKind::Transpose,
        OpKind::Split,
        OpKind::Cat,
        OpKind::IndexSelect,
        OpKind::Softmax,
        OpKind::Lerp,
        OpKind::ToDtype,
    ];

    /// Qualified op name, as recorded in exported graphs.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Add => "aten.add",
            OpKind::Sub => "aten.sub",
            OpKind::Mul => "aten.mul",
            OpKind::Div => "aten.div",
            OpKind::Neg => "aten.neg",
            OpKind::Exp => "aten.exp",
            OpKind::Sqrt => "aten.sqrt",
            OpKind::Sum => "aten.sum",
            OpKind::MatMul => "aten.matmul",
            OpKind::Transpose => "aten.transpose",
            OpKind::Split => "aten.split",
            OpKind::Cat => "aten.cat",
            OpKind::IndexSelect => "aten.index_select",
            OpKind::Softmax => "aten.softmax",
            OpKind::Lerp => "aten.lerp",
            OpKind::ToDtype => "aten.to",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for OpKind {
    type Err = OpcheckError;

    fn from_str(s: &str) -> Result<Self> {
        let short = s.strip_prefix("aten.").unwrap_or(s);
        OpKind::ALL
            .into_iter()
            .find(|op| op.name().strip_prefix("aten.") == Some(short))
            .ok_or_else(|| OpcheckError::InvalidArgument(format!("unknown op `{s}`")))
    }
}

/// What a node does.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Graph input.
    Placeholder,
    /// A call of an op.
    Call {
        op: OpKind,
        args: Vec<Argument>,
        kwargs: Kwargs,
    },
}

/// A node in the graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub inputs: SmallVec<[NodeId; 2]>,
    pub value: FakeValue,
}

/// The graph arena.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    next_id: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a graph input.
    pub fn add_placeholder(&mut self, name: impl Into<String>, value: FakeValue) -> NodeId {
        self.push(name.into(), NodeKind::Placeholder, SmallVec::new(), value)
    }

    /// Add a call node. Every node referenced by `args` must already exist.
    pub fn add_call(
        &mut self,
        name: impl Into<String>,
        op: OpKind,
        args: Vec<Argument>,
        kwargs: Kwargs,
        value: FakeValue,
    ) -> Result<NodeId> {
        let mut inputs = SmallVec::new();
        for arg in &args {
            arg.collect_inputs(&mut inputs);
        }
        if let Some(missing) = inputs.iter().find(|&&id| self.get(id).is_none()) {
            return Err(OpcheckError::InvalidArgument(format!(
                "argument references unknown node {missing}"
            )));
        }
        Ok(self.push(name.into(), NodeKind::Call { op, args, kwargs }, inputs, value))
    }

    fn push(
        &mut self,
        name: String,
        kind: NodeKind,
        inputs: SmallVec<[NodeId; 2]>,
        value: FakeValue,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(Node {
            id,
            name,
            kind,
            inputs,
            value,
        });
        id
    }

    /// Build a node-reference argument, resolving the node's fake value now.
    pub fn arg(&self, id: NodeId) -> Result<Argument> {
        let node = self
            .get(id)
            .ok_or_else(|| OpcheckError::InvalidArgument(format!("unknown node {id}")))?;
        Ok(Argument::Node(NodeRef {
            id,
            name: node.name.clone(),
            value: node.value.clone(),
        }))
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Call nodes only, in insertion order.
    pub fn calls(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Call { .. }))
    }

    /// Topological sort of the graph rooted at `outputs`.
    pub fn topo_sort(&self, outputs: &[NodeId]) -> Vec<NodeId> {
        let mut visited = std::collections::HashSet::new();
        let mut order = Vec::new();

        for &out in outputs {
            self.topo_visit(out, &mut visited, &mut order);
        }

        order
    }

    fn topo_visit(
        &self,
        id: NodeId,
        visited: &mut std::collections::HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        if let Some(node) = self.get(id) {
            for &input in &node.inputs {
                self.topo_visit(input, visited, order);
            }
        }
        order.push(id);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
