use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use task_dag::runtime::ActorInstance;
use task_dag::{ActorClass, DagError, Kwargs, RemoteFunction, Value};

pub mod execution;
pub mod rewriting;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Await any in-flight handles inside `value`.
fn settle(value: Value) -> Result<Value, DagError> {
    futures::executor::block_on(value.resolve_refs())
}

fn add() -> RemoteFunction {
    RemoteFunction::new("add", |args, kwargs| {
        let total = args
            .iter()
            .chain(kwargs.values())
            .filter_map(Value::as_int)
            .sum::<i64>();
        Ok(Value::Int(total))
    })
}

/// `add`, counting how often it actually runs.
fn counted_add(calls: Arc<AtomicUsize>) -> RemoteFunction {
    let inner = add();
    RemoteFunction::new("counted_add", move |args, kwargs| {
        calls.fetch_add(1, Ordering::SeqCst);
        inner.call(args, kwargs)
    })
}

fn failing() -> RemoteFunction {
    RemoteFunction::new("failing", |_, _| {
        Err(DagError::Execution("task raised".to_string()))
    })
}

struct Counter {
    total: i64,
}

impl ActorInstance for Counter {
    fn call(&mut self, method: &str, args: Vec<Value>, _kwargs: Kwargs) -> Result<Value, DagError> {
        match method {
            "add" => {
                self.total += args.iter().filter_map(Value::as_int).sum::<i64>();
                Ok(Value::Int(self.total))
            }
            "get" => Ok(Value::Int(self.total)),
            other => Err(DagError::Execution(format!("Counter has no method {other}"))),
        }
    }
}

fn counter_class() -> ActorClass {
    ActorClass::new("Counter", |args, _| {
        let total = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Box::new(Counter { total }) as Box<dyn ActorInstance>)
    })
}
