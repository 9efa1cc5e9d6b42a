use task_dag::runtime::ActorInstance;
use task_dag::{
    ActorClass, Dag, DagError, Kwargs, LocalRuntime, RemoteFunction, Value, kwargs,
};

struct Accumulator {
    total: i64,
}

impl ActorInstance for Accumulator {
    fn call(&mut self, method: &str, args: Vec<Value>, _kwargs: Kwargs) -> Result<Value, DagError> {
        match method {
            "add" => {
                self.total += args.iter().filter_map(Value::as_int).sum::<i64>();
                Ok(Value::Int(self.total))
            }
            other => Err(DagError::Execution(format!("Accumulator has no method {other}"))),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let square = RemoteFunction::new("square", |args, _| {
        let x = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Int(x * x))
    });
    let offset = RemoteFunction::new("offset", |args, kwargs| {
        let x = args.first().and_then(Value::as_int).unwrap_or(0);
        let by = kwargs.get("by").and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Int(x + by))
    });
    let accumulator = ActorClass::new("Accumulator", |args, _| {
        let total = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Box::new(Accumulator { total }) as Box<dyn ActorInstance>)
    });

    let mut dag = Dag::new();
    let inp = dag.input()?;
    let x = dag.input_attribute(inp, 0)?;
    let by = dag.input_attribute(inp, "by")?;
    let squared = dag.function(&square, vec![x.into()], Kwargs::new())?;
    let shifted = dag.function(&offset, vec![squared.into()], kwargs([("by", by)]))?;
    let actor = dag.class(&accumulator, vec![Value::Int(100)], Kwargs::new())?;
    let total = dag.method(actor, "add", vec![shifted.into(), squared.into()], Kwargs::new())?;
    let out = dag.multi_output(vec![squared, shifted, total])?;

    for id in dag.node_ids() {
        println!("{}", dag.node(id)?);
    }

    let mut runtime = LocalRuntime::new();
    let result = dag.execute(
        out,
        &mut runtime,
        vec![Value::Int(3)],
        kwargs([("by", 4)]),
        false,
    )?;
    println!("eager: {result:?} ({} submissions)", runtime.submitted());

    let mut runtime = LocalRuntime::deferred();
    dag.execute(
        out,
        &mut runtime,
        vec![Value::Int(5)],
        kwargs([("by", 1)]),
        true,
    )?;
    for (id, value) in futures::executor::block_on(dag.results_from_last_execute(out))? {
        println!("{id}: {value:?}");
    }
    dag.clear_cache(out)?;
    Ok(())
}
