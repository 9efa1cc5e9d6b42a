use crate::dag_tests::{add, counted_add, counter_class, failing, settle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use task_dag::{Dag, DagError, Kwargs, LocalRuntime, Value, kwargs};

pub fn test_diamond_runs_shared_node_once(runtime: &mut LocalRuntime) {
    let calls = Arc::new(AtomicUsize::new(0));
    let f = counted_add(calls.clone());
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let shared = dag.function(&f, vec![inp.into(), Value::Int(1)], Kwargs::new()).unwrap();
    let left = dag.function(&f, vec![shared.into(), Value::Int(10)], Kwargs::new()).unwrap();
    let right = dag.function(&f, vec![shared.into(), Value::Int(100)], Kwargs::new()).unwrap();
    let out = dag.function(&f, vec![left.into(), right.into()], Kwargs::new()).unwrap();

    let result = dag
        .execute(out, runtime, vec![Value::Int(1)], Kwargs::new(), false)
        .and_then(settle)
        .unwrap();
    // shared = 2, left = 12, right = 102
    assert_eq!(result, Value::Int(114));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

pub fn test_input_attributes_project_args_and_kwargs(runtime: &mut LocalRuntime) {
    let f = add();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let first = dag.input_attribute(inp, 0).unwrap();
    let second = dag.input_attribute(inp, 1).unwrap();
    let scale = dag.input_attribute(inp, "scale").unwrap();
    let out = dag
        .function(&f, vec![first.into(), second.into()], kwargs([("scale", scale)]))
        .unwrap();

    let result = dag
        .execute(
            out,
            runtime,
            vec![Value::Int(2), Value::Int(3)],
            kwargs([("scale", 40)]),
            false,
        )
        .and_then(settle)
        .unwrap();
    assert_eq!(result, Value::Int(45));
}

pub fn test_single_positional_input_passes_through(runtime: &mut LocalRuntime) {
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let out = dag.multi_output(vec![inp, inp]).unwrap();
    let result = dag
        .execute(out, runtime, vec![Value::from("x")], Kwargs::new(), false)
        .and_then(settle)
        .unwrap();
    assert_eq!(result, Value::from(vec!["x", "x"]));
}

pub fn test_actor_methods_share_one_actor(runtime: &mut LocalRuntime) {
    let mut dag = Dag::new();
    let actor = dag.class(&counter_class(), vec![Value::Int(100)], Kwargs::new()).unwrap();
    let first = dag.method(actor, "add", vec![Value::Int(5)], Kwargs::new()).unwrap();
    let second = dag.method(actor, "add", vec![first.into()], Kwargs::new()).unwrap();

    let result = dag
        .execute(second, runtime, vec![], Kwargs::new(), false)
        .and_then(settle)
        .unwrap();
    // 100 + 5, then 105 + 105
    assert_eq!(result, Value::Int(210));
}

pub fn test_multi_output_collects_in_order(runtime: &mut LocalRuntime) {
    let f = add();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into(), Value::Int(1)], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![inp.into(), Value::Int(2)], Kwargs::new()).unwrap();
    let out = dag.multi_output(vec![b, a]).unwrap();

    let result = dag
        .execute(out, runtime, vec![Value::Int(10)], Kwargs::new(), false)
        .and_then(settle)
        .unwrap();
    assert_eq!(result, Value::from(vec![12, 11]));
}

pub fn test_cached_results_follow_execution_order(runtime: &mut LocalRuntime) {
    let f = add();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into(), Value::Int(1)], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![a.into(), Value::Int(1)], Kwargs::new()).unwrap();
    dag.execute(b, runtime, vec![Value::Int(0)], Kwargs::new(), true)
        .unwrap();

    let results = futures::executor::block_on(dag.results_from_last_execute(b)).unwrap();
    let ids: Vec<_> = [inp, a, b]
        .iter()
        .map(|id| dag.node(*id).unwrap().stable_id())
        .collect();
    assert_eq!(results.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids);
    assert_eq!(
        results.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        vec![Value::Int(0), Value::Int(1), Value::Int(2)]
    );

    dag.clear_cache(b).unwrap();
    let results = futures::executor::block_on(dag.results_from_last_execute(b)).unwrap();
    assert!(results.is_empty());
}

pub fn test_failing_task_surfaces_execution_error(runtime: &mut LocalRuntime) {
    let mut dag = Dag::new();
    let bad = dag.function(&failing(), vec![], Kwargs::new()).unwrap();
    let out = dag.function(&add(), vec![bad.into()], Kwargs::new()).unwrap();
    let err = dag
        .execute(out, runtime, vec![], Kwargs::new(), false)
        .and_then(settle)
        .unwrap_err();
    assert!(matches!(err, DagError::Execution(_)), "{err}");
    assert!(err.to_string().contains("task raised"));
}

pub fn test_execution_leaves_graph_untouched(runtime: &mut LocalRuntime) {
    let f = add();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let before = dag.len();
    let downstream = dag.node(inp).unwrap().downstream().to_vec();

    for x in 0..3 {
        let result = dag
            .execute(a, runtime, vec![Value::Int(x)], Kwargs::new(), false)
            .and_then(settle)
            .unwrap();
        assert_eq!(result, Value::Int(x));
    }
    assert_eq!(dag.len(), before);
    assert_eq!(dag.node(inp).unwrap().downstream(), downstream.as_slice());
}
