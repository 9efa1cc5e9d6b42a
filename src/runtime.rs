//! Boundary between graph execution and whatever actually runs tasks.
//!
//! [`TaskRuntime`] is what a cluster client implements. [`LocalRuntime`]
//! runs everything in-process and is what the non-compiled path uses in tests
//! and demos.

use crate::DagError;
use crate::value::{Kwargs, Options, Value};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Handle to a value that may still be in flight.
#[derive(Clone)]
pub struct ObjectRef {
    id: Uuid,
    inner: Shared<BoxFuture<'static, Result<Value, String>>>,
}

impl ObjectRef {
    pub fn ready(value: Value) -> Self {
        Self::from_future(futures::future::ready(Ok(value)))
    }

    pub fn from_future(fut: impl Future<Output = Result<Value, String>> + Send + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: fut.boxed().shared(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The value, if the underlying future already completed.
    pub fn peek(&self) -> Option<Result<Value, String>> {
        self.inner.peek().cloned()
    }

    pub async fn resolve(&self) -> Result<Value, DagError> {
        self.inner.clone().await.map_err(DagError::Execution)
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectRef({})", self.id.simple())
    }
}

/// A live actor created by executing a class node.
pub trait ActorInstance: Send {
    fn call(&mut self, method: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, DagError>;
}

#[derive(Clone)]
pub struct ActorHandle {
    actor_id: Uuid,
    class_name: Arc<str>,
    instance: Arc<Mutex<Box<dyn ActorInstance>>>,
}

impl ActorHandle {
    pub fn new(class_name: &str, instance: Box<dyn ActorInstance>) -> Self {
        Self {
            actor_id: Uuid::new_v4(),
            class_name: class_name.into(),
            instance: Arc::new(Mutex::new(instance)),
        }
    }

    pub fn actor_id(&self) -> Uuid {
        self.actor_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn call(&self, method: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, DagError> {
        let mut instance = self
            .instance
            .lock()
            .map_err(|_| DagError::Execution(format!("actor {} is poisoned", self.class_name)))?;
        instance.call(method, args, kwargs)
    }
}

impl Debug for ActorHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Actor({}, {})", self.class_name, self.actor_id.simple())
    }
}

pub type TaskBody = dyn Fn(Vec<Value>, Kwargs) -> Result<Value, DagError> + Send + Sync;
pub type ActorConstructor =
    dyn Fn(Vec<Value>, Kwargs) -> Result<Box<dyn ActorInstance>, DagError> + Send + Sync;

/// A function that can be bound into a graph as a task.
#[derive(Clone)]
pub struct RemoteFunction {
    name: Arc<str>,
    body: Arc<TaskBody>,
}

impl RemoteFunction {
    pub fn new(
        name: &str,
        body: impl Fn(Vec<Value>, Kwargs) -> Result<Value, DagError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, DagError> {
        (self.body)(args, kwargs)
    }
}

impl Debug for RemoteFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemoteFunction({})", self.name)
    }
}

/// An actor class that can be bound into a graph as a constructor call.
#[derive(Clone)]
pub struct ActorClass {
    name: Arc<str>,
    constructor: Arc<ActorConstructor>,
}

impl ActorClass {
    pub fn new(
        name: &str,
        constructor: impl Fn(Vec<Value>, Kwargs) -> Result<Box<dyn ActorInstance>, DagError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<ActorHandle, DagError> {
        let instance = (self.constructor)(args, kwargs)?;
        Ok(ActorHandle::new(&self.name, instance))
    }
}

impl Debug for ActorClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActorClass({})", self.name)
    }
}

/// Submits the calls that graph nodes stand for.
pub trait TaskRuntime {
    fn submit_task(
        &mut self,
        function: &RemoteFunction,
        args: Vec<Value>,
        kwargs: Kwargs,
        options: &Options,
    ) -> Result<Value, DagError>;

    fn create_actor(
        &mut self,
        class: &ActorClass,
        args: Vec<Value>,
        kwargs: Kwargs,
        options: &Options,
    ) -> Result<Value, DagError>;

    fn call_method(
        &mut self,
        actor: &ActorHandle,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        options: &Options,
    ) -> Result<Value, DagError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalRuntimeMode {
    /// Run each call before returning its value.
    #[default]
    Eager,
    /// Return an `ObjectRef` per call; the call runs when first awaited.
    Deferred,
}

/// Runs tasks and actor calls in the calling thread.
#[derive(Debug, Default)]
pub struct LocalRuntime {
    mode: LocalRuntimeMode,
    submitted: usize,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self {
            mode: LocalRuntimeMode::Deferred,
            submitted: 0,
        }
    }

    /// Number of tasks and method calls submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    fn run(
        &mut self,
        args: Vec<Value>,
        kwargs: Kwargs,
        call: impl FnOnce(Vec<Value>, Kwargs) -> Result<Value, DagError> + Send + 'static,
    ) -> Result<Value, DagError> {
        self.submitted += 1;
        match self.mode {
            LocalRuntimeMode::Eager => {
                let (args, kwargs) = futures::executor::block_on(resolve_arguments(args, kwargs))?;
                call(args, kwargs)
            }
            LocalRuntimeMode::Deferred => Ok(Value::Ref(ObjectRef::from_future(async move {
                let (args, kwargs) = resolve_arguments(args, kwargs)
                    .await
                    .map_err(|e| e.to_string())?;
                call(args, kwargs).map_err(|e| e.to_string())
            }))),
        }
    }
}

async fn resolve_arguments(
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<(Vec<Value>, Kwargs), DagError> {
    let mut resolved_args = Vec::with_capacity(args.len());
    for arg in args {
        resolved_args.push(arg.resolve_refs().await?);
    }
    let mut resolved_kwargs = Kwargs::new();
    for (k, v) in kwargs {
        resolved_kwargs.insert(k, v.resolve_refs().await?);
    }
    Ok((resolved_args, resolved_kwargs))
}

impl TaskRuntime for LocalRuntime {
    fn submit_task(
        &mut self,
        function: &RemoteFunction,
        args: Vec<Value>,
        kwargs: Kwargs,
        _options: &Options,
    ) -> Result<Value, DagError> {
        let function = function.clone();
        self.run(args, kwargs, move |args, kwargs| function.call(args, kwargs))
    }

    fn create_actor(
        &mut self,
        class: &ActorClass,
        args: Vec<Value>,
        kwargs: Kwargs,
        _options: &Options,
    ) -> Result<Value, DagError> {
        // Actor handles are handed out immediately, like a cluster runtime would.
        let (args, kwargs) = futures::executor::block_on(resolve_arguments(args, kwargs))?;
        Ok(Value::Actor(class.instantiate(args, kwargs)?))
    }

    fn call_method(
        &mut self,
        actor: &ActorHandle,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        _options: &Options,
    ) -> Result<Value, DagError> {
        let actor = actor.clone();
        let method = method.to_string();
        self.run(args, kwargs, move |args, kwargs| actor.call(&method, args, kwargs))
    }
}
