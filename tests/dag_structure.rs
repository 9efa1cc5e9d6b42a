use std::sync::Arc;
use task_dag::node::CustomNodeKind;
use task_dag::transport::{TensorTransportType, TransportArg};
use task_dag::{
    ChannelOutputType, CompileOptions, Communicator, Dag, DagError, DagNodeKind, Device, Kwargs,
    Options, RemoteFunction, TensorTransport, Value, kwargs,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noop() -> RemoteFunction {
    RemoteFunction::new("noop", |_, _| Ok(Value::None))
}

#[derive(Debug)]
struct LoopbackCommunicator;

impl Communicator for LoopbackCommunicator {
    fn name(&self) -> &str {
        "loopback"
    }
}

/// A kind with neither copy nor local execution.
#[derive(Debug)]
struct OpaqueKind;

impl CustomNodeKind for OpaqueKind {
    fn kind_name(&self) -> &str {
        "OpaqueKind"
    }
}

#[test]
fn test_two_input_nodes_rejected_by_rewrite() {
    init_logging();
    let f = noop();
    let mut dag = Dag::new();
    let first = dag.input().unwrap();
    let second = dag.input().unwrap();
    let out = dag
        .function(&f, vec![first.into(), second.into()], Kwargs::new())
        .unwrap();
    let err = dag.apply_recursive(out, |_, id| Ok(id)).unwrap_err();
    match err {
        DagError::MultipleInputNodes { first: a, second: b } => {
            assert_eq!(a, dag.node(first).unwrap().stable_id());
            assert_eq!(b, dag.node(second).unwrap().stable_id());
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_zero_or_one_input_node_accepted() {
    init_logging();
    let f = noop();
    let mut dag = Dag::new();
    let lone = dag.function(&f, vec![Value::Int(1)], Kwargs::new()).unwrap();
    dag.apply_recursive(lone, |_, id| Ok(id)).unwrap();

    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![inp.into(), a.into()], Kwargs::new()).unwrap();
    dag.apply_recursive(b, |_, id| Ok(id)).unwrap();
}

#[test]
fn test_second_compile_root_names_both_nodes() {
    init_logging();
    let f = noop();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![a.into()], Kwargs::new()).unwrap();

    dag.experimental_compile(a, CompileOptions::default()).unwrap();
    let err = dag
        .experimental_compile(b, CompileOptions::default())
        .unwrap_err();
    let a_name = dag.node(a).unwrap().to_string();
    let b_name = dag.node(b).unwrap().to_string();
    match &err {
        DagError::CompiledMoreThanOnce { first, second } => {
            let mut names = vec![first.clone(), second.clone()];
            names.sort();
            let mut expected = vec![a_name, b_name];
            expected.sort();
            assert_eq!(names, expected);
        }
        other => panic!("unexpected error {other}"),
    }
    // The failed request leaves no mark behind.
    assert!(dag.node(a).unwrap().is_compile_root());
    assert!(!dag.node(b).unwrap().is_compile_root());
}

#[test]
fn test_node_inside_list_is_flagged_and_blocks_compile() {
    init_logging();
    let f = noop();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let direct = dag.function(&f, vec![a.into()], Kwargs::new()).unwrap();
    let nested = dag
        .function(&f, vec![Value::from(vec![Value::Node(a)])], Kwargs::new())
        .unwrap();

    assert!(!dag.node(direct).unwrap().args_contain_nested_dag_node());
    assert!(dag.node(nested).unwrap().args_contain_nested_dag_node());
    // The nested reference still links the edge.
    assert_eq!(dag.node(nested).unwrap().upstream(), &[a]);

    // Compiling anything in the component walks through the flagged node.
    let err = dag
        .experimental_compile(direct, CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, DagError::NestedDagNode { count: 1, .. }), "{err}");
    assert!(!dag.node(direct).unwrap().is_compile_root());
}

#[test]
fn test_nested_flag_covers_every_positional_arg() {
    let f = noop();
    let mut dag = Dag::new();
    let a = dag.function(&f, vec![], Kwargs::new()).unwrap();
    let b = dag
        .function(
            &f,
            vec![Value::from(vec![Value::Node(a)]), Value::Int(1)],
            Kwargs::new(),
        )
        .unwrap();
    assert!(dag.node(b).unwrap().args_contain_nested_dag_node());
}

#[test]
fn test_nodes_nested_in_kwargs_and_aux_link_without_flag() {
    let f = noop();
    let mut dag = Dag::new();
    let a = dag.function(&f, vec![], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![], Kwargs::new()).unwrap();
    let c = dag
        .function(
            &f,
            vec![],
            kwargs([("items", Value::from(vec![Value::Node(a)]))]),
        )
        .unwrap();
    assert!(!dag.node(c).unwrap().args_contain_nested_dag_node());
    assert_eq!(dag.node(c).unwrap().upstream(), &[a]);

    let mut aux = Kwargs::new();
    aux.insert("extra".to_string(), Value::from(vec![Value::Node(b)]));
    let d = dag
        .bind(
            DagNodeKind::Custom(Arc::new(OpaqueKind)),
            vec![],
            Kwargs::new(),
            Options::new(),
            aux,
        )
        .unwrap();
    assert_eq!(dag.node(d).unwrap().upstream(), &[b]);
    assert_eq!(dag.node(b).unwrap().downstream(), &[d]);
}

#[test]
fn test_auto_transport_resolution_keeps_request() {
    init_logging();
    let f = noop();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![a.into()], Kwargs::new()).unwrap();
    dag.node_mut(a)
        .unwrap()
        .with_tensor_transport("auto", "gpu", false, false)
        .unwrap();
    dag.node_mut(b)
        .unwrap()
        .with_tensor_transport("auto", "cpu", false, false)
        .unwrap();
    assert!(dag.node(a).unwrap().original_type_hint().is_none());

    dag.experimental_compile(b, CompileOptions::default()).unwrap();

    let a_node = dag.node(a).unwrap();
    let original = a_node.original_type_hint().unwrap();
    assert!(original.is_auto());
    assert_eq!(original.device(), Device::Gpu);
    assert!(matches!(
        a_node.type_hint(),
        ChannelOutputType::Tensor(TensorTransportType {
            transport: TensorTransport::Accelerator,
            ..
        })
    ));
    assert!(matches!(
        dag.node(b).unwrap().type_hint(),
        ChannelOutputType::Tensor(TensorTransportType {
            transport: TensorTransport::SharedMemory,
            device: Device::Cpu,
            ..
        })
    ));
}

#[test]
fn test_custom_default_communicator_wins_for_accelerators() {
    let communicator: Arc<dyn Communicator> = Arc::new(LoopbackCommunicator);
    let f = noop();
    let mut dag = Dag::new();
    let a = dag.function(&f, vec![], Kwargs::new()).unwrap();
    dag.node_mut(a)
        .unwrap()
        .with_tensor_transport("auto", "cuda", false, true)
        .unwrap();
    let options = CompileOptions {
        default_communicator: task_dag::DefaultCommunicator::Custom(communicator.clone()),
        ..CompileOptions::default()
    };
    dag.experimental_compile(a, options).unwrap();
    match dag.node(a).unwrap().type_hint() {
        ChannelOutputType::Tensor(TensorTransportType {
            transport: TensorTransport::Custom(c),
            direct_return,
            ..
        }) => {
            assert!(Arc::ptr_eq(c, &communicator));
            assert!(*direct_return);
        }
        other => panic!("unexpected hint {other:?}"),
    }
}

#[test]
fn test_unknown_device_lists_valid_devices() {
    let f = noop();
    let mut dag = Dag::new();
    let a = dag.function(&f, vec![], Kwargs::new()).unwrap();
    let err = dag
        .node_mut(a)
        .unwrap()
        .with_tensor_transport("auto", "neptune", false, false)
        .unwrap_err();
    assert!(matches!(err, DagError::InvalidDevice { .. }));
    let message = err.to_string();
    for device in ["'default'", "'cpu'", "'gpu'", "'cuda'", "neptune"] {
        assert!(message.contains(device), "{message}");
    }
    assert_eq!(dag.node(a).unwrap().type_hint(), &ChannelOutputType::Default);
}

#[test]
fn test_unknown_transport_rejected() {
    let f = noop();
    let mut dag = Dag::new();
    let a = dag.function(&f, vec![], Kwargs::new()).unwrap();
    let err = dag
        .node_mut(a)
        .unwrap()
        .with_tensor_transport("carrier-pigeon", "cpu", false, false)
        .unwrap_err();
    assert!(matches!(err, DagError::InvalidTransport(ref t) if t == "carrier-pigeon"));

    let communicator: Arc<dyn Communicator> = Arc::new(LoopbackCommunicator);
    dag.node_mut(a)
        .unwrap()
        .with_tensor_transport(TransportArg::from(communicator), "gpu", false, false)
        .unwrap();
    assert!(dag.node(a).unwrap().type_hint().requires_accelerator_communicator());
}

#[test]
fn test_copy_keeps_identity_and_hints() {
    let f = noop();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    dag.node_mut(a)
        .unwrap()
        .with_tensor_transport("auto", "gpu", true, false)
        .unwrap();
    dag.experimental_compile(a, CompileOptions::default()).unwrap();

    let copy = dag
        .copy(a, vec![Value::Int(3)], Kwargs::new(), Options::new(), Kwargs::new())
        .unwrap();
    let (src, dst) = (dag.node(a).unwrap(), dag.node(copy).unwrap());
    assert_ne!(a, copy);
    assert_eq!(src.stable_id(), dst.stable_id());
    assert_eq!(src.type_hint(), dst.type_hint());
    assert_eq!(src.original_type_hint(), dst.original_type_hint());
    assert!(dst.upstream().is_empty());
    assert!(!dst.is_compile_root());

    // The copy owns its annotations.
    dag.node_mut(copy)
        .unwrap()
        .with_tensor_transport("shm", "cpu", false, false)
        .unwrap();
    assert_ne!(
        dag.node(a).unwrap().type_hint(),
        dag.node(copy).unwrap().type_hint()
    );
}

#[test]
fn test_kind_without_copy_is_internal_error() {
    let mut dag = Dag::new();
    let opaque = dag
        .bind(
            DagNodeKind::Custom(Arc::new(OpaqueKind)),
            vec![],
            Kwargs::new(),
            Options::new(),
            Kwargs::new(),
        )
        .unwrap();
    let err = dag.apply_recursive(opaque, |_, id| Ok(id)).unwrap_err();
    assert!(matches!(err, DagError::Internal(_)), "{err}");
    assert_eq!(dag.len(), 1);
}

#[test]
fn test_identity_rewrite_is_isomorphic() {
    let f = noop();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let b = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let out = dag.multi_output(vec![a, b]).unwrap();

    let mut visited = Vec::new();
    let copy = dag
        .apply_recursive(out, |dag: &mut Dag, id| {
            visited.push(dag.node(id)?.stable_id());
            Ok(id)
        })
        .unwrap();

    // Shared input visited once, children before parents.
    assert_eq!(visited.len(), 4);
    assert_eq!(visited[0], dag.node(inp).unwrap().stable_id());
    assert_eq!(visited[3], dag.node(out).unwrap().stable_id());

    let copied_children = dag.toplevel_child_nodes(copy).unwrap();
    assert_eq!(copied_children.len(), 2);
    for (copied, original) in copied_children.iter().zip([a, b]) {
        assert_eq!(
            dag.node(*copied).unwrap().stable_id(),
            dag.node(original).unwrap().stable_id()
        );
        let grandchildren = dag.toplevel_child_nodes(*copied).unwrap();
        assert_eq!(grandchildren.len(), 1);
        assert_eq!(
            dag.node(grandchildren[0]).unwrap().stable_id(),
            dag.node(inp).unwrap().stable_id()
        );
    }
}

#[test]
fn test_traversal_reaches_backward_only_nodes() {
    let f = noop();
    let mut dag = Dag::new();
    let inp = dag.input().unwrap();
    let a = dag.function(&f, vec![inp.into()], Kwargs::new()).unwrap();
    let side = dag.function(&f, vec![Value::Int(4)], Kwargs::new()).unwrap();
    let out = dag.function(&f, vec![a.into(), side.into()], Kwargs::new()).unwrap();

    let mut seen = Vec::new();
    let root = dag
        .traverse_and_apply(inp, |_, id| {
            seen.push(id);
            Ok(())
        })
        .unwrap();
    assert_eq!(root, None);
    seen.sort();
    assert_eq!(seen, vec![inp, a, side, out]);
    assert_eq!(dag.find_root(out).unwrap(), inp);
    assert!(matches!(dag.find_root(side), Err(DagError::MissingRoot(_))));
}
