use crate::DagError;
use crate::execute::ExecContext;
use crate::node::DagNode;
use crate::runtime::{ActorClass, RemoteFunction};
use crate::value::{Kwargs, ScanRecord, Value};
use std::fmt::Debug;
use std::sync::Arc;

/// Auxiliary-map key holding the actor (or actor-producing node) of a method call.
pub const PARENT_CLASS_NODE_KEY: &str = "parent_class_node";
/// Auxiliary-map key holding the input node an attribute node projects from.
pub const DAG_INPUT_NODE_KEY: &str = "dag_input_node";

trait DagNodeImpl {
    fn kind_name(&self) -> &'static str;
    fn label(&self) -> String;
    fn copy_kind(&self) -> Result<DagNodeKind, DagError>;
    fn execute(&self, node: &DagNode, ctx: &mut ExecContext<'_>) -> Result<Value, DagError>;
    fn to_any(self) -> DagNodeKind;
}

impl<T: DagNodeImpl> From<T> for DagNodeKind {
    fn from(value: T) -> Self {
        value.to_any()
    }
}

/// Node kinds defined outside this crate.
///
/// Kinds that cannot be rewritten or run locally keep the default `copy_kind`
/// / `execute`, which report an internal error.
pub trait CustomNodeKind: Send + Sync + Debug {
    fn kind_name(&self) -> &str;

    fn copy_kind(&self) -> Option<Arc<dyn CustomNodeKind>> {
        None
    }

    fn execute(&self, _node: &DagNode, _ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        Err(DagError::Internal(format!(
            "{} does not implement execute",
            self.kind_name()
        )))
    }
}

#[derive(Clone, Debug)]
pub struct FunctionNode {
    function: RemoteFunction,
}

impl FunctionNode {
    pub fn new(function: RemoteFunction) -> Self {
        Self { function }
    }

    pub fn function(&self) -> &RemoteFunction {
        &self.function
    }
}

impl DagNodeImpl for FunctionNode {
    fn kind_name(&self) -> &'static str {
        "FunctionNode"
    }
    fn label(&self) -> String {
        self.function.name().to_string()
    }
    fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        Ok(self.clone().to_any())
    }
    fn execute(&self, node: &DagNode, ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        ctx.runtime.submit_task(
            &self.function,
            node.bound_args.clone(),
            node.bound_kwargs.clone(),
            &node.bound_options,
        )
    }
    fn to_any(self) -> DagNodeKind {
        DagNodeKind::Function(self)
    }
}

#[derive(Clone, Debug)]
pub struct ClassNode {
    class: ActorClass,
}

impl ClassNode {
    pub fn new(class: ActorClass) -> Self {
        Self { class }
    }

    pub fn class(&self) -> &ActorClass {
        &self.class
    }
}

impl DagNodeImpl for ClassNode {
    fn kind_name(&self) -> &'static str {
        "ClassNode"
    }
    fn label(&self) -> String {
        self.class.name().to_string()
    }
    fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        Ok(self.clone().to_any())
    }
    fn execute(&self, node: &DagNode, ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        ctx.runtime.create_actor(
            &self.class,
            node.bound_args.clone(),
            node.bound_kwargs.clone(),
            &node.bound_options,
        )
    }
    fn to_any(self) -> DagNodeKind {
        DagNodeKind::Class(self)
    }
}

/// Method call on an actor. The actor sits in the auxiliary map under
/// [`PARENT_CLASS_NODE_KEY`].
#[derive(Clone, Debug)]
pub struct ClassMethodNode {
    method_name: String,
}

impl ClassMethodNode {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl DagNodeImpl for ClassMethodNode {
    fn kind_name(&self) -> &'static str {
        "ClassMethodNode"
    }
    fn label(&self) -> String {
        self.method_name.clone()
    }
    fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        Ok(self.clone().to_any())
    }
    fn execute(&self, node: &DagNode, ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        let parent = node
            .bound_other_args_to_resolve
            .get(PARENT_CLASS_NODE_KEY)
            .ok_or_else(|| {
                DagError::Execution(format!("{node} has no {PARENT_CLASS_NODE_KEY}"))
            })?;
        let actor = match parent {
            Value::Actor(actor) => actor.clone(),
            Value::Ref(r) => {
                let resolved = futures::executor::block_on(r.resolve())?;
                resolved.as_actor().cloned().ok_or_else(|| {
                    DagError::Execution(format!(
                        "{node} expected an actor, got {}",
                        resolved.type_name()
                    ))
                })?
            }
            other => {
                return Err(DagError::Execution(format!(
                    "{node} expected an actor, got {}",
                    other.type_name()
                )));
            }
        };
        ctx.runtime.call_method(
            &actor,
            &self.method_name,
            node.bound_args.clone(),
            node.bound_kwargs.clone(),
            &node.bound_options,
        )
    }
    fn to_any(self) -> DagNodeKind {
        DagNodeKind::ClassMethod(self)
    }
}

/// The runtime input of the graph. A graph may hold at most one.
#[derive(Clone, Debug, Default)]
pub struct InputNode {}

impl InputNode {
    pub fn new() -> Self {
        Self {}
    }
}

impl DagNodeImpl for InputNode {
    fn kind_name(&self) -> &'static str {
        "InputNode"
    }
    fn label(&self) -> String {
        String::new()
    }
    fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        Ok(self.clone().to_any())
    }
    fn execute(&self, _node: &DagNode, ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        if ctx.input_args.len() == 1 && ctx.input_kwargs.is_empty() {
            return Ok(ctx.input_args[0].clone());
        }
        Ok(Value::Record(Arc::new(DagInputData {
            args: ctx.input_args.to_vec(),
            kwargs: ctx.input_kwargs.clone(),
        })))
    }
    fn to_any(self) -> DagNodeKind {
        DagNodeKind::Input(self)
    }
}

/// Input passed to `execute` when it is not a single positional value.
///
/// Integer subscripts index the positional inputs, string subscripts the keyword inputs.
#[derive(Clone, Debug)]
pub struct DagInputData {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl ScanRecord for DagInputData {
    fn type_name(&self) -> &str {
        "DagInputData"
    }

    fn fields(&self) -> Vec<&Value> {
        self.args.iter().chain(self.kwargs.values()).collect()
    }

    fn with_fields(&self, fields: Vec<Value>) -> Arc<dyn ScanRecord> {
        let mut fields = fields.into_iter();
        let args = fields.by_ref().take(self.args.len()).collect();
        let kwargs = self.kwargs.keys().cloned().zip(fields).collect();
        Arc::new(DagInputData { args, kwargs })
    }

    fn get_item(&self, key: &Value) -> Option<&Value> {
        match key {
            Value::Int(idx) => usize::try_from(*idx).ok().and_then(|i| self.args.get(i)),
            Value::Str(name) => self.kwargs.get(name),
            _ => None,
        }
    }
}

/// `input[key]`: projects one item of the runtime input.
#[derive(Clone, Debug)]
pub struct InputAttributeNode {
    key: Value,
}

impl InputAttributeNode {
    pub fn new(key: impl Into<Value>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &Value {
        &self.key
    }
}

impl DagNodeImpl for InputAttributeNode {
    fn kind_name(&self) -> &'static str {
        "InputAttributeNode"
    }
    fn label(&self) -> String {
        format!("{:?}", self.key)
    }
    fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        Ok(self.clone().to_any())
    }
    fn execute(&self, node: &DagNode, _ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        let input = node
            .bound_other_args_to_resolve
            .get(DAG_INPUT_NODE_KEY)
            .ok_or_else(|| DagError::Execution(format!("{node} has no {DAG_INPUT_NODE_KEY}")))?;
        input.get_item(&self.key).cloned().ok_or_else(|| {
            DagError::Execution(format!(
                "input of type {} has no item {:?}",
                input.type_name(),
                self.key
            ))
        })
    }
    fn to_any(self) -> DagNodeKind {
        DagNodeKind::InputAttribute(self)
    }
}

/// Aggregates several outputs; its positional args are the aggregated nodes.
#[derive(Clone, Debug, Default)]
pub struct MultiOutputNode {}

impl MultiOutputNode {
    pub fn new() -> Self {
        Self {}
    }
}

impl DagNodeImpl for MultiOutputNode {
    fn kind_name(&self) -> &'static str {
        "MultiOutputNode"
    }
    fn label(&self) -> String {
        String::new()
    }
    fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        Ok(self.clone().to_any())
    }
    fn execute(&self, node: &DagNode, _ctx: &mut ExecContext<'_>) -> Result<Value, DagError> {
        Ok(Value::List(node.bound_args.clone()))
    }
    fn to_any(self) -> DagNodeKind {
        DagNodeKind::MultiOutput(self)
    }
}

#[derive(Clone, Debug)]
pub enum DagNodeKind {
    Function(FunctionNode),
    Class(ClassNode),
    ClassMethod(ClassMethodNode),
    Input(InputNode),
    InputAttribute(InputAttributeNode),
    MultiOutput(MultiOutputNode),
    Custom(Arc<dyn CustomNodeKind>),
}

impl DagNodeKind {
    pub fn kind_name(&self) -> &str {
        match self {
            DagNodeKind::Function(node) => node.kind_name(),
            DagNodeKind::Class(node) => node.kind_name(),
            DagNodeKind::ClassMethod(node) => node.kind_name(),
            DagNodeKind::Input(node) => node.kind_name(),
            DagNodeKind::InputAttribute(node) => node.kind_name(),
            DagNodeKind::MultiOutput(node) => node.kind_name(),
            DagNodeKind::Custom(node) => node.kind_name(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            DagNodeKind::Function(node) => node.label(),
            DagNodeKind::Class(node) => node.label(),
            DagNodeKind::ClassMethod(node) => node.label(),
            DagNodeKind::Input(node) => node.label(),
            DagNodeKind::InputAttribute(node) => node.label(),
            DagNodeKind::MultiOutput(node) => node.label(),
            DagNodeKind::Custom(_) => String::new(),
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, DagNodeKind::Input(_))
    }

    pub(crate) fn copy_kind(&self) -> Result<DagNodeKind, DagError> {
        match self {
            DagNodeKind::Function(node) => node.copy_kind(),
            DagNodeKind::Class(node) => node.copy_kind(),
            DagNodeKind::ClassMethod(node) => node.copy_kind(),
            DagNodeKind::Input(node) => node.copy_kind(),
            DagNodeKind::InputAttribute(node) => node.copy_kind(),
            DagNodeKind::MultiOutput(node) => node.copy_kind(),
            DagNodeKind::Custom(node) => node.copy_kind().map(DagNodeKind::Custom).ok_or_else(|| {
                DagError::Internal(format!("{} does not implement copy", node.kind_name()))
            }),
        }
    }

    pub(crate) fn execute(
        &self,
        node: &DagNode,
        ctx: &mut ExecContext<'_>,
    ) -> Result<Value, DagError> {
        match self {
            DagNodeKind::Function(kind) => kind.execute(node, ctx),
            DagNodeKind::Class(kind) => kind.execute(node, ctx),
            DagNodeKind::ClassMethod(kind) => kind.execute(node, ctx),
            DagNodeKind::Input(kind) => kind.execute(node, ctx),
            DagNodeKind::InputAttribute(kind) => kind.execute(node, ctx),
            DagNodeKind::MultiOutput(kind) => kind.execute(node, ctx),
            DagNodeKind::Custom(kind) => kind.execute(node, ctx),
        }
    }
}
