pub mod compile;
pub mod context;
pub mod dag;
pub mod execute;
pub mod node;
pub mod rewrite;
pub mod runtime;
pub mod scanner;
pub mod transport;
pub mod traverse;
pub mod value;

pub use compile::{CompileOptions, CompiledDagBuilder, CompiledDagPlan, DefaultCommunicator};
pub use context::DagContext;
pub use dag::Dag;
pub use execute::{ExecContext, ExecutionObserver};
pub use node::{DagNode, DagNodeId, DagNodeKind, StableId};
pub use rewrite::RewriteCache;
pub use runtime::{ActorClass, ActorHandle, LocalRuntime, ObjectRef, RemoteFunction, TaskRuntime};
pub use transport::{ChannelOutputType, Communicator, Device, TensorTransport, TransportArg};
pub use value::{Kwargs, Options, Value, kwargs};

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("Invalid device '{device}', expected one of {valid}")]
    InvalidDevice { device: String, valid: String },
    #[error(
        "Invalid transport '{0}', expected 'auto', 'nccl', 'shm', 'accelerator' or a Communicator"
    )]
    InvalidTransport(String),
    #[error("Graph has more than one input node: {first} and {second}")]
    MultipleInputNodes { first: StableId, second: StableId },
    #[error(
        "Graph was compiled more than once: \
         {first} and {second} were both marked as compile roots"
    )]
    CompiledMoreThanOnce { first: String, second: String },
    #[error(
        "Found {count} node(s) nested inside argument {arg} of {node}; \
         pass nodes directly as arguments"
    )]
    NestedDagNode {
        count: usize,
        arg: String,
        node: String,
    },
    #[error("No input node upstream of {0}")]
    MissingRoot(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Unknown node {0}")]
    UnknownNode(DagNodeId),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Execution error: {0}")]
    Execution(String),
}
