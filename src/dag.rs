//! Node arena and dependency linking.
//!
//! All nodes of a graph live in one [`Dag`]; edges are stored as
//! [`DagNodeId`] lists, so dropping the `Dag` tears the whole graph down.

use crate::DagError;
use crate::context::DagContext;
use crate::node::kinds::{DAG_INPUT_NODE_KEY, PARENT_CLASS_NODE_KEY};
use crate::node::{
    ClassMethodNode, ClassNode, DagNode, DagNodeId, DagNodeKind, FunctionNode, InputAttributeNode,
    InputNode, MultiOutputNode, StableId,
};
use crate::runtime::{ActorClass, RemoteFunction};
use crate::scanner::{find_nodes, find_toplevel_nodes};
use crate::transport::ChannelOutputType;
use crate::value::{Kwargs, Options, Value};

#[derive(Debug, Default)]
pub struct Dag {
    nodes: Vec<DagNode>,
    context: DagContext,
}

/// Arena state to restore when a multi-step operation fails part way.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    node_count: usize,
}

/// Result of scanning a node's bound values for dependencies.
struct Linkage {
    upstream: Vec<DagNodeId>,
    args_contain_nested_dag_node: bool,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(context: DagContext) -> Self {
        Self {
            nodes: Vec::new(),
            context,
        }
    }

    pub fn context(&self) -> &DagContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = DagNodeId> + '_ {
        (0..self.nodes.len()).map(DagNodeId::from_index)
    }

    pub fn node(&self, id: DagNodeId) -> Result<&DagNode, DagError> {
        self.nodes.get(id.index()).ok_or(DagError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: DagNodeId) -> Result<&mut DagNode, DagError> {
        self.nodes.get_mut(id.index()).ok_or(DagError::UnknownNode(id))
    }

    /// Bind a deferred call into the graph.
    ///
    /// Discovers upstream nodes in `args`, `kwargs` and `other_args_to_resolve`
    /// and registers the new node as downstream of each of them.
    pub fn bind(
        &mut self,
        kind: impl Into<DagNodeKind>,
        args: Vec<Value>,
        kwargs: Kwargs,
        options: Options,
        other_args_to_resolve: Kwargs,
    ) -> Result<DagNodeId, DagError> {
        self.insert_node(
            kind.into(),
            args,
            kwargs,
            options,
            other_args_to_resolve,
            StableId::new(),
        )
    }

    fn insert_node(
        &mut self,
        kind: DagNodeKind,
        args: Vec<Value>,
        kwargs: Kwargs,
        options: Options,
        other_args_to_resolve: Kwargs,
        stable_id: StableId,
    ) -> Result<DagNodeId, DagError> {
        let linkage = self.collect_upstream_nodes(&args, &kwargs, &other_args_to_resolve)?;
        let id = DagNodeId::from_index(self.nodes.len());
        for upstream in &linkage.upstream {
            self.nodes[upstream.index()].downstream.push(id);
        }
        let node = DagNode {
            kind,
            bound_args: args,
            bound_kwargs: kwargs,
            bound_options: options,
            bound_other_args_to_resolve: other_args_to_resolve,
            stable_id,
            upstream: linkage.upstream,
            downstream: Vec::new(),
            args_contain_nested_dag_node: linkage.args_contain_nested_dag_node,
            is_compile_root: false,
            type_hint: ChannelOutputType::default(),
            original_type_hint: None,
            cache_from_last_execute: Vec::new(),
        };
        log::debug!("bound {node} as {id}, upstream {:?}", node.upstream);
        self.nodes.push(node);
        Ok(id)
    }

    /// Positional args that are nodes link directly; nodes found deeper inside
    /// positional args link too but mark the node as holding nested references.
    /// Keyword args and the auxiliary map are scanned in full and link as well.
    fn collect_upstream_nodes(
        &self,
        args: &[Value],
        kwargs: &Kwargs,
        other_args_to_resolve: &Kwargs,
    ) -> Result<Linkage, DagError> {
        let mut upstream: Vec<DagNodeId> = Vec::new();
        let mut nested = false;
        for arg in args {
            let found = match arg {
                Value::Node(id) => vec![*id],
                other => {
                    let found = find_nodes(&[other]);
                    nested |= !found.is_empty();
                    found
                }
            };
            for id in found {
                if !upstream.contains(&id) {
                    upstream.push(id);
                }
            }
        }
        let kwargs = Value::Map(kwargs.clone());
        let other = Value::Map(other_args_to_resolve.clone());
        for id in find_nodes(&[&kwargs, &other]) {
            if !upstream.contains(&id) {
                upstream.push(id);
            }
        }
        for id in &upstream {
            self.node(*id)?;
        }
        Ok(Linkage {
            upstream,
            args_contain_nested_dag_node: nested,
        })
    }

    /// Copy `id` with new bound values.
    ///
    /// The copy keeps the source's stable identity and gets its own copy of
    /// both transport annotations.
    pub fn copy(
        &mut self,
        id: DagNodeId,
        new_args: Vec<Value>,
        new_kwargs: Kwargs,
        new_options: Options,
        new_other_args_to_resolve: Kwargs,
    ) -> Result<DagNodeId, DagError> {
        let source = self.node(id)?;
        let kind = source.kind.copy_kind()?;
        let stable_id = source.stable_id;
        let type_hint = source.type_hint.clone();
        let original_type_hint = source.original_type_hint.clone();
        let new_id = self.insert_node(
            kind,
            new_args,
            new_kwargs,
            new_options,
            new_other_args_to_resolve,
            stable_id,
        )?;
        let copy = &mut self.nodes[new_id.index()];
        copy.type_hint = type_hint;
        copy.original_type_hint = original_type_hint;
        Ok(new_id)
    }

    /// Nodes passed directly as args, kwargs or auxiliary values (not nested).
    pub fn toplevel_child_nodes(&self, id: DagNodeId) -> Result<Vec<DagNodeId>, DagError> {
        let node = self.node(id)?;
        let mut children = find_toplevel_nodes(node.bound_args.iter());
        for child in find_toplevel_nodes(
            node.bound_kwargs
                .values()
                .chain(node.bound_other_args_to_resolve.values()),
        ) {
            if !children.contains(&child) {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Every node referenced from args, kwargs or auxiliary values, at any depth.
    pub fn all_child_nodes(&self, id: DagNodeId) -> Result<Vec<DagNodeId>, DagError> {
        let node = self.node(id)?;
        let args = Value::List(node.bound_args.clone());
        let kwargs = Value::Map(node.bound_kwargs.clone());
        let other = Value::Map(node.bound_other_args_to_resolve.clone());
        Ok(find_nodes(&[&args, &kwargs, &other]))
    }

    pub fn input(&mut self) -> Result<DagNodeId, DagError> {
        self.bind(InputNode::new(), vec![], Kwargs::new(), Options::new(), Kwargs::new())
    }

    /// `input[key]`: an integer key selects a positional input, a string key a keyword input.
    pub fn input_attribute(
        &mut self,
        input: DagNodeId,
        key: impl Into<Value>,
    ) -> Result<DagNodeId, DagError> {
        let mut other = Kwargs::new();
        other.insert(DAG_INPUT_NODE_KEY.to_string(), Value::Node(input));
        self.bind(
            InputAttributeNode::new(key),
            vec![],
            Kwargs::new(),
            Options::new(),
            other,
        )
    }

    pub fn function(
        &mut self,
        function: &RemoteFunction,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<DagNodeId, DagError> {
        self.function_with_options(function, args, kwargs, Options::new())
    }

    pub fn function_with_options(
        &mut self,
        function: &RemoteFunction,
        args: Vec<Value>,
        kwargs: Kwargs,
        options: Options,
    ) -> Result<DagNodeId, DagError> {
        self.bind(
            FunctionNode::new(function.clone()),
            args,
            kwargs,
            options,
            Kwargs::new(),
        )
    }

    pub fn class(
        &mut self,
        class: &ActorClass,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<DagNodeId, DagError> {
        self.bind(
            ClassNode::new(class.clone()),
            args,
            kwargs,
            Options::new(),
            Kwargs::new(),
        )
    }

    /// `actor` is a class node or an existing actor handle.
    pub fn method(
        &mut self,
        actor: impl Into<Value>,
        method_name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<DagNodeId, DagError> {
        let mut other = Kwargs::new();
        other.insert(PARENT_CLASS_NODE_KEY.to_string(), actor.into());
        self.bind(
            ClassMethodNode::new(method_name),
            args,
            kwargs,
            Options::new(),
            other,
        )
    }

    pub fn multi_output(&mut self, outputs: Vec<DagNodeId>) -> Result<DagNodeId, DagError> {
        self.bind(
            MultiOutputNode::new(),
            outputs.into_iter().map(Value::Node).collect(),
            Kwargs::new(),
            Options::new(),
            Kwargs::new(),
        )
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            node_count: self.nodes.len(),
        }
    }

    /// Drop every node created after `checkpoint` along with the downstream
    /// edges that point at them.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        let count = checkpoint.node_count;
        if self.nodes.len() <= count {
            return;
        }
        log::debug!(
            "rolling back {} node(s) created after checkpoint",
            self.nodes.len() - count
        );
        self.nodes.truncate(count);
        for node in &mut self.nodes {
            node.downstream.retain(|d| d.index() < count);
        }
    }
}
