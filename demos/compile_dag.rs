use task_dag::compile::ResolvedCompileOptions;
use task_dag::{
    CompileOptions, CompiledDagBuilder, CompiledDagPlan, Dag, DagContext, DagError, Kwargs,
    RemoteFunction, Value,
};

/// Prints the hand-off instead of building channels.
struct PrintingBuilder;

impl CompiledDagBuilder for PrintingBuilder {
    type Output = ResolvedCompileOptions;

    fn build(&mut self, dag: &Dag, plan: CompiledDagPlan) -> Result<Self::Output, DagError> {
        println!("compiled {} nodes, root {}", plan.nodes.len(), dag.node(plan.root)?);
        for id in &plan.nodes {
            let node = dag.node(*id)?;
            println!(
                "  {node}: {:?} (requested {:?})",
                node.type_hint(),
                node.original_type_hint()
            );
        }
        Ok(plan.options)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    let identity = RemoteFunction::new("identity", |mut args, _| {
        Ok(args.pop().unwrap_or(Value::None))
    });

    let mut dag = Dag::with_context(DagContext::from_env()?);
    let inp = dag.input()?;
    let producer = dag.function(&identity, vec![inp.into()], Kwargs::new())?;
    dag.node_mut(producer)?
        .with_tensor_transport("auto", "gpu", true, false)?;
    let staging = dag.function(&identity, vec![producer.into()], Kwargs::new())?;
    dag.node_mut(staging)?
        .with_tensor_transport("shm", "cpu", false, false)?;
    let consumer = dag.function(&identity, vec![staging.into()], Kwargs::new())?;

    if let Err(e) = dag.node_mut(consumer)?.with_tensor_transport("auto", "neptune", false, false) {
        println!("rejected: {e}");
    }

    let options = CompileOptions {
        max_inflight_executions: Some(4),
        ..CompileOptions::default()
    };
    let resolved = dag.experimental_compile_with(consumer, options, &mut PrintingBuilder)?;
    println!("{resolved:?}");

    let nested = dag.function(&identity, vec![Value::from(vec![consumer])], Kwargs::new())?;
    match dag.experimental_compile(nested, CompileOptions::default()) {
        Ok(_) => println!("unexpectedly compiled {}", dag.node(nested)?),
        Err(e) => println!("rejected: {e}"),
    }
    Ok(())
}
