pub mod kinds;

use crate::DagError;
use crate::transport::{ChannelOutputType, TransportArg};
use crate::value::{Kwargs, Options, Value};
pub use kinds::{
    ClassMethodNode, ClassNode, CustomNodeKind, DagInputData, DagNodeKind, FunctionNode,
    InputAttributeNode, InputNode, MultiOutputNode,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Handle of one node instance inside a [`crate::Dag`].
///
/// Copies of a logical node get a new handle but keep the [`StableId`].
#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct DagNodeId {
    inner: usize,
}

impl DagNodeId {
    pub(crate) fn from_index(inner: usize) -> Self {
        Self { inner }
    }

    pub fn index(&self) -> usize {
        self.inner
    }
}

impl Display for DagNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.inner)
    }
}

/// Identity of a logical node, preserved across every copy and rewrite.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StableId(Uuid);

impl StableId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for StableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// One deferred call bound into the graph.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub(crate) kind: DagNodeKind,
    pub(crate) bound_args: Vec<Value>,
    pub(crate) bound_kwargs: Kwargs,
    pub(crate) bound_options: Options,
    pub(crate) bound_other_args_to_resolve: Kwargs,
    pub(crate) stable_id: StableId,
    pub(crate) upstream: Vec<DagNodeId>,
    pub(crate) downstream: Vec<DagNodeId>,
    /// Positional args hold a node inside a container. Fatal once compiled.
    pub(crate) args_contain_nested_dag_node: bool,
    pub(crate) is_compile_root: bool,
    pub(crate) type_hint: ChannelOutputType,
    /// The `Auto` hint this node had before the compiler concretized it.
    pub(crate) original_type_hint: Option<ChannelOutputType>,
    pub(crate) cache_from_last_execute: Vec<(StableId, Value)>,
}

impl DagNode {
    pub fn kind(&self) -> &DagNodeKind {
        &self.kind
    }

    pub fn stable_id(&self) -> StableId {
        self.stable_id
    }

    pub fn args(&self) -> &[Value] {
        &self.bound_args
    }

    pub fn kwargs(&self) -> Kwargs {
        self.bound_kwargs.clone()
    }

    pub fn options(&self) -> Options {
        self.bound_options.clone()
    }

    pub fn other_args_to_resolve(&self) -> Kwargs {
        self.bound_other_args_to_resolve.clone()
    }

    pub fn upstream(&self) -> &[DagNodeId] {
        &self.upstream
    }

    pub fn downstream(&self) -> &[DagNodeId] {
        &self.downstream
    }

    pub fn args_contain_nested_dag_node(&self) -> bool {
        self.args_contain_nested_dag_node
    }

    pub fn is_compile_root(&self) -> bool {
        self.is_compile_root
    }

    pub fn is_input(&self) -> bool {
        self.kind.is_input()
    }

    pub fn type_hint(&self) -> &ChannelOutputType {
        &self.type_hint
    }

    pub fn original_type_hint(&self) -> Option<&ChannelOutputType> {
        self.original_type_hint.as_ref()
    }

    /// Resolution setter: an `Auto` hint being replaced is kept in
    /// `original_type_hint`.
    pub fn set_type_hint(&mut self, type_hint: ChannelOutputType) {
        if self.type_hint.is_auto() {
            self.original_type_hint = Some(self.type_hint.clone());
        }
        self.type_hint = type_hint;
    }

    /// Configure how this node's output is transported to its consumers.
    ///
    /// `transport` is one of `"auto"`, `"accelerator"`, `"nccl"`, `"shm"`
    /// or a custom communicator; `device` is one of `"default"`, `"cpu"`,
    /// `"gpu"`, `"cuda"`.
    pub fn with_tensor_transport(
        &mut self,
        transport: impl Into<TransportArg>,
        device: &str,
        static_shape: bool,
        direct_return: bool,
    ) -> Result<&mut Self, DagError> {
        self.type_hint =
            ChannelOutputType::from_request(transport.into(), device, static_shape, direct_return)?;
        Ok(self)
    }

    pub fn cached_results(&self) -> &[(StableId, Value)] {
        &self.cache_from_last_execute
    }

    pub fn clear_cache(&mut self) {
        self.cache_from_last_execute.clear();
    }
}

impl Display for DagNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}, id={})",
            self.kind.kind_name(),
            self.kind.label(),
            self.stable_id
        )
    }
}
