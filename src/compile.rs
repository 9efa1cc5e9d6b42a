//! Compile requests: the validation gate run before a graph is handed to the
//! compiled-execution engine.

use crate::DagError;
use crate::context::{DagContext, timeout_from_secs};
use crate::dag::Dag;
use crate::node::DagNodeId;
use crate::transport::{ChannelOutputType, Communicator, TensorTransport, TensorTransportType};
use std::sync::Arc;
use std::time::Duration;

/// Communicator used for accelerator transfers that do not name their own.
#[derive(Clone, Debug, Default)]
pub enum DefaultCommunicator {
    /// Let the engine create (or reuse) communicators as needed.
    #[default]
    Create,
    /// Every accelerator transfer must bring a custom communicator.
    Disabled,
    Custom(Arc<dyn Communicator>),
}

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Seconds; negative waits forever. Unset falls back to the context.
    pub submit_timeout: Option<f64>,
    pub buffer_size_bytes: Option<usize>,
    pub enable_asyncio: bool,
    pub max_inflight_executions: Option<usize>,
    pub max_buffered_results: Option<usize>,
    pub overlap_gpu_communication: Option<bool>,
    pub default_communicator: DefaultCommunicator,
}

impl CompileOptions {
    fn resolve(self, ctx: &DagContext) -> Result<ResolvedCompileOptions, DagError> {
        Ok(ResolvedCompileOptions {
            submit_timeout: timeout_from_secs(
                self.submit_timeout.unwrap_or(ctx.submit_timeout),
            )?,
            buffer_size_bytes: self.buffer_size_bytes.unwrap_or(ctx.buffer_size_bytes),
            enable_asyncio: self.enable_asyncio,
            max_inflight_executions: self
                .max_inflight_executions
                .unwrap_or(ctx.max_inflight_executions),
            max_buffered_results: self.max_buffered_results.unwrap_or(ctx.max_buffered_results),
            overlap_gpu_communication: self
                .overlap_gpu_communication
                .unwrap_or(ctx.overlap_gpu_communication),
            default_communicator: self.default_communicator,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedCompileOptions {
    /// `None` waits forever.
    pub submit_timeout: Option<Duration>,
    pub buffer_size_bytes: usize,
    pub enable_asyncio: bool,
    pub max_inflight_executions: usize,
    pub max_buffered_results: usize,
    pub overlap_gpu_communication: bool,
    pub default_communicator: DefaultCommunicator,
}

/// A validated graph, ready for the compiled-execution engine.
#[derive(Clone, Debug)]
pub struct CompiledDagPlan {
    pub root: DagNodeId,
    pub input_node: Option<DagNodeId>,
    /// Every node of the root's connected component, in visit order.
    pub nodes: Vec<DagNodeId>,
    pub options: ResolvedCompileOptions,
}

/// The compiled-execution engine's entry point.
pub trait CompiledDagBuilder {
    type Output;
    fn build(&mut self, dag: &Dag, plan: CompiledDagPlan) -> Result<Self::Output, DagError>;
}

fn resolve_auto_transport(
    hint: &ChannelOutputType,
    default: &DefaultCommunicator,
) -> Option<ChannelOutputType> {
    let ChannelOutputType::Auto(auto) = hint else {
        return None;
    };
    let transport = if auto.device.is_accelerator() {
        match default {
            DefaultCommunicator::Custom(c) => TensorTransport::Custom(c.clone()),
            _ => TensorTransport::Accelerator,
        }
    } else {
        TensorTransport::SharedMemory
    };
    Some(ChannelOutputType::Tensor(TensorTransportType {
        transport,
        device: auto.device,
        static_shape: auto.static_shape,
        direct_return: auto.direct_return,
    }))
}

impl Dag {
    /// Mark `root` as the output of a compiled graph and validate its whole
    /// connected component.
    ///
    /// `Auto` transport hints in the component are concretized; their
    /// original value stays available through `original_type_hint`. On
    /// failure nothing is left marked or resolved.
    pub fn experimental_compile(
        &mut self,
        root: DagNodeId,
        options: CompileOptions,
    ) -> Result<CompiledDagPlan, DagError> {
        let root_node = self.node(root)?;
        if root_node.is_compile_root() {
            return Err(DagError::Internal(format!(
                "experimental_compile was already called on {root_node}; \
                 reuse the compiled graph or build a new one"
            )));
        }
        self.node_mut(root)?.is_compile_root = true;
        match self.plan_compilation(root, options) {
            Ok(plan) => {
                log::info!(
                    "compiled graph rooted at {} ({} nodes)",
                    self.node(root)?,
                    plan.nodes.len()
                );
                Ok(plan)
            }
            Err(e) => {
                self.node_mut(root)?.is_compile_root = false;
                Err(e)
            }
        }
    }

    pub fn experimental_compile_with<B: CompiledDagBuilder>(
        &mut self,
        root: DagNodeId,
        options: CompileOptions,
        builder: &mut B,
    ) -> Result<B::Output, DagError> {
        let plan = self.experimental_compile(root, options)?;
        builder.build(self, plan)
    }

    fn plan_compilation(
        &mut self,
        root: DagNodeId,
        options: CompileOptions,
    ) -> Result<CompiledDagPlan, DagError> {
        let options = options.resolve(self.context())?;
        let mut nodes = Vec::new();
        let mut input_node: Option<DagNodeId> = None;
        self.traverse_and_apply(root, |dag, id| {
            nodes.push(id);
            let node = dag.node(id)?;
            if node.is_input() {
                if let Some(first) = input_node {
                    return Err(DagError::MultipleInputNodes {
                        first: dag.node(first)?.stable_id(),
                        second: node.stable_id(),
                    });
                }
                input_node = Some(id);
            }
            Ok(())
        })?;

        let mut resolutions = Vec::new();
        for id in &nodes {
            let node = self.node(*id)?;
            let hint = resolve_auto_transport(node.type_hint(), &options.default_communicator);
            let effective = hint.as_ref().unwrap_or(node.type_hint());
            if matches!(options.default_communicator, DefaultCommunicator::Disabled)
                && matches!(
                    effective,
                    ChannelOutputType::Tensor(TensorTransportType {
                        transport: TensorTransport::Accelerator,
                        ..
                    })
                )
            {
                return Err(DagError::Config(format!(
                    "{node} needs an accelerator communicator \
                     but the default communicator is disabled"
                )));
            }
            if let Some(hint) = hint {
                resolutions.push((*id, hint));
            }
        }
        for (id, hint) in resolutions {
            log::debug!("resolved auto transport of {} to {:?}", self.node(id)?, hint);
            self.node_mut(id)?.set_type_hint(hint);
        }

        Ok(CompiledDagPlan {
            root,
            input_node,
            nodes,
            options,
        })
    }
}
