use crate::DagError;
use crate::dag::Dag;
use crate::node::{DagNode, DagNodeId, StableId};
use crate::rewrite::RewriteCache;
use crate::runtime::TaskRuntime;
use crate::value::{Kwargs, Value};
use std::time::Instant;

/// What a node sees while it is being executed.
pub struct ExecContext<'a> {
    pub runtime: &'a mut dyn TaskRuntime,
    pub input_args: &'a [Value],
    pub input_kwargs: &'a Kwargs,
}

pub trait ExecutionObserver {
    fn on_node_executed(
        &mut self,
        node: &DagNode,
        start_instant: Instant,
        end_instant: Instant,
        result: &Value,
    );
}

impl ExecutionObserver for () {
    fn on_node_executed(
        &mut self,
        _node: &DagNode,
        _start_instant: Instant,
        _end_instant: Instant,
        _result: &Value,
    ) {
    }
}

impl Dag {
    /// Run the graph rooted at `root` without compiling it.
    ///
    /// Every node is submitted to `runtime` bottom-up with its children's
    /// results substituted in. With `cache_results`, the per-node results of
    /// this run are kept on `root` (see [`Dag::results_from_last_execute`]).
    pub fn execute(
        &mut self,
        root: DagNodeId,
        runtime: &mut dyn TaskRuntime,
        args: Vec<Value>,
        kwargs: Kwargs,
        cache_results: bool,
    ) -> Result<Value, DagError> {
        self.execute_observed(root, runtime, args, kwargs, cache_results, &mut ())
    }

    pub fn execute_observed<O: ExecutionObserver>(
        &mut self,
        root: DagNodeId,
        runtime: &mut dyn TaskRuntime,
        args: Vec<Value>,
        kwargs: Kwargs,
        cache_results: bool,
        observer: &mut O,
    ) -> Result<Value, DagError> {
        self.node(root)?;
        let checkpoint = self.checkpoint();
        let mut cache = RewriteCache::new();
        let mut ctx = ExecContext {
            runtime,
            input_args: &args,
            input_kwargs: &kwargs,
        };
        let result = self.apply_recursive_with(root, &mut cache, &mut |dag: &mut Dag, id| {
            let node = dag.node(id)?;
            let start_instant = Instant::now();
            let value = node.kind().execute(node, &mut ctx)?;
            observer.on_node_executed(node, start_instant, Instant::now(), &value);
            Ok(value)
        });
        // Execution copies hold plain values, nothing outside this call refers to them.
        self.rollback(checkpoint);
        let result = result?;
        if cache_results {
            self.node_mut(root)?.cache_from_last_execute = cache.into_entries();
        }
        Ok(result)
    }

    /// Results cached by the last `execute` on `root`, in the order nodes
    /// ran, with in-flight handles awaited.
    pub async fn results_from_last_execute(
        &self,
        root: DagNodeId,
    ) -> Result<Vec<(StableId, Value)>, DagError> {
        let mut resolved = Vec::new();
        for (id, value) in self.node(root)?.cached_results() {
            let value = match value {
                Value::Ref(r) => r.resolve().await?,
                other => other.clone(),
            };
            resolved.push((*id, value));
        }
        Ok(resolved)
    }

    pub fn clear_cache(&mut self, root: DagNodeId) -> Result<(), DagError> {
        self.node_mut(root)?.clear_cache();
        Ok(())
    }
}
