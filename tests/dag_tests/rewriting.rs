use crate::dag_tests::{add, settle};
use task_dag::{Dag, DagNodeKind, Kwargs, LocalRuntime, RemoteFunction, Value};

fn double() -> RemoteFunction {
    RemoteFunction::new("double", |args, _| {
        Ok(Value::Int(args.first().and_then(Value::as_int).unwrap_or(0) * 2))
    })
}

pub fn test_rewritten_graph_executes(runtime: &mut LocalRuntime) {
    let f = add();
    let d = double();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into(), Value::Int(1)], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![a.into(), Value::Int(1)], Kwargs::new()).unwrap();

    // Wrap every function call in a doubling step.
    let rewritten = dag
        .apply_recursive(b, |dag: &mut Dag, id| {
            if matches!(dag.node(id)?.kind(), DagNodeKind::Function(_)) {
                dag.function(&d, vec![id.into()], Kwargs::new())
            } else {
                Ok(id)
            }
        })
        .unwrap();

    let original = dag
        .execute(b, runtime, vec![Value::Int(1)], Kwargs::new(), false)
        .and_then(settle)
        .unwrap();
    let doubled = dag
        .execute(rewritten, runtime, vec![Value::Int(1)], Kwargs::new(), false)
        .and_then(settle)
        .unwrap();
    assert_eq!(original, Value::Int(3));
    // (1 + 1) * 2 = 4, then (4 + 1) * 2
    assert_eq!(doubled, Value::Int(10));
}

pub fn test_apply_functional_substitutes_results(runtime: &mut LocalRuntime) {
    let f = add();
    let mut dag = Dag::new();
    let a = dag.function(&f, vec![Value::Int(2), Value::Int(3)], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![a.into(), Value::Int(3)], Kwargs::new()).unwrap();
    let before = dag.len();

    let values = vec![
        Value::from(vec![Value::Node(a), Value::Int(0)]),
        Value::Node(b),
    ];
    let replaced = dag
        .apply_functional(
            values,
            |_, id| id == a,
            |dag, id| {
                dag.execute(id, &mut *runtime, vec![], Kwargs::new(), false)
                    .and_then(settle)
            },
        )
        .unwrap();
    assert_eq!(
        replaced,
        vec![Value::from(vec![Value::Int(5), Value::Int(0)]), Value::Node(b)]
    );
    assert_eq!(dag.len(), before);
}
