use std::sync::Arc;

use super::*;
use crate::graph::NodeOp;
use crate::guards::{ArraySpec, GuardCheck, GuardSource};
use crate::runtime::{
    ArrayValue, Frame, FunctionObject, HostFn, HostModule, HostObject, ModuleKind, ModuleObject, RuntimeValue,
};
use crate::value::Literal;

fn assemble(source: &str, varnames: &[&str], names: &[&str], constants: Vec<Literal>) -> CodeUnit {
    CodeUnit::assemble("f", source)
        .unwrap()
        .with_varnames(varnames, varnames.len())
        .with_names(names)
        .with_constants(constants)
}

/// `x.shape[0] + 1`
fn shape_plus_one() -> CodeUnit {
    assemble(
        "LOAD_FAST 0
         LOAD_ATTR 0
         LOAD_CONST 0
         BINARY_SUBSCR
         LOAD_CONST 1
         BINARY_ADD
         RETURN_VALUE",
        &["x"],
        &["shape"],
        vec![0.into(), 1.into()],
    )
}

fn has_call(graph: &Graph, target: HostFn) -> bool {
    graph.nodes().iter().any(|node| node.op == NodeOp::CallFunction { target })
}

#[test]
fn static_shape_queries_fold_to_constants() {
    let code = shape_plus_one();
    let array = ArrayValue::full(vec![4, 2], 0.0);
    let frame = Frame::new().with_local("x", array.clone());
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    assert_eq!(output.graph.output(), Some(&Arg::Const(Literal::Int(5))));
    assert_eq!(output.graph.op_count(), 0);
    let guard = output.guards.iter().find(|guard| guard.name() == "x").unwrap();
    assert_eq!(guard.check(), &GuardCheck::ArrayMatch(ArraySpec::of(&array, false)));
}

#[test]
fn dynamic_shape_queries_become_graph_nodes() {
    let code = shape_plus_one();
    let array = ArrayValue::full(vec![4, 2], 0.0);
    let frame = Frame::new().with_local("x", array.clone());
    let config = EngineConfig {
        dynamic_shapes: true,
        ..EngineConfig::default()
    };

    let output = trace(&code, &frame, &config).unwrap();
    assert!(matches!(output.graph.output(), Some(Arg::Node(_))));
    assert!(has_call(&output.graph, HostFn::GetItem));
    assert!(has_call(&output.graph, HostFn::Add));
    assert!(output.graph.nodes().iter().any(|node| node.op == NodeOp::Attribute { name: "shape".to_string() }));
    assert_eq!(output.graph.placeholders(), vec!["x"]);
    assert_eq!(output.inputs, vec![InputBinding { name: "x".to_string(), source: GuardSource::Local }]);
    let guard = output.guards.iter().find(|guard| guard.name() == "x").unwrap();
    assert_eq!(guard.check(), &GuardCheck::ArrayMatch(ArraySpec::of(&array, true)));
}

#[test]
fn indexing_a_module_list_only_touches_the_selected_child() {
    let children: Vec<_> = (0..3).map(|i| ModuleObject::leaf(&format!("Act{i}"), HostFn::Relu)).collect();
    let model = ModuleObject::new(
        "Model",
        ModuleKind::Container,
        [("submodule", RuntimeValue::Module(ModuleObject::list(children)))],
    );
    let code = assemble(
        "LOAD_FAST 0
         LOAD_ATTR 0
         LOAD_CONST 0
         BINARY_SUBSCR
         LOAD_FAST 1
         CALL_FUNCTION 1
         RETURN_VALUE",
        &["m", "x"],
        &["submodule"],
        vec![2.into()],
    );
    let frame = Frame::new()
        .with_local("m", RuntimeValue::Module(model.clone()))
        .with_local("x", ArrayValue::full(vec![3], -1.0));
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    assert_eq!(output.modules.keys().collect::<Vec<_>>(), vec!["m.submodule.2"]);
    assert!(output
        .graph
        .nodes()
        .iter()
        .any(|node| node.op == NodeOp::CallModule { target: "m.submodule.2".to_string() }));
    let mut names: Vec<_> = output.guards.iter().map(|guard| guard.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["m", "x"]);
    assert!(output
        .guards
        .iter()
        .any(|guard| guard.check() == &GuardCheck::IdMatch(model.id)));
}

#[test]
fn branching_on_array_data_breaks_the_graph() {
    // if x.sum() > 0: return x
    // return -x
    let code = assemble(
        "LOAD_FAST 0
         LOAD_METHOD 0
         CALL_METHOD 0
         LOAD_CONST 0
         COMPARE_OP 4
         POP_JUMP_IF_FALSE 7
         LOAD_FAST 0
         LOAD_FAST 0
         UNARY_NEGATIVE
         RETURN_VALUE",
        &["x"],
        &["sum"],
        vec![0.into()],
    );
    let frame = Frame::new().with_local("x", ArrayValue::full(vec![2], 1.0));
    let config = EngineConfig::default();

    let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
    let graph_break = interp.run().unwrap_err();
    assert_eq!(graph_break.pc, 5);
    assert_eq!(graph_break.opcode, Some(Opcode::POP_JUMP_IF_FALSE));
    assert!(matches!(graph_break.reason, BreakReason::DataDependentBranch(_)));
    assert_eq!(interp.state(), TraceState::Aborted);
}

#[test]
fn branching_on_constants_follows_the_taken_side() {
    // return x + 1 if n > 2 else x - 1
    let code = assemble(
        "LOAD_FAST 1
         LOAD_CONST 0
         COMPARE_OP 4
         POP_JUMP_IF_FALSE 8
         LOAD_FAST 0
         LOAD_CONST 1
         BINARY_ADD
         RETURN_VALUE
         LOAD_FAST 0
         LOAD_CONST 1
         BINARY_SUBTRACT
         RETURN_VALUE",
        &["x", "n"],
        &[],
        vec![2.into(), 1.into()],
    );
    let frame = Frame::new().with_local("x", ArrayValue::full(vec![2], 1.0)).with_local("n", 3i64);
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    assert!(has_call(&output.graph, HostFn::Add));
    assert!(!has_call(&output.graph, HostFn::Sub));
    assert!(output
        .guards
        .iter()
        .any(|guard| guard.name() == "n" && guard.check() == &GuardCheck::ConstantMatch(Literal::Int(3))));
}

#[test]
fn calls_to_user_functions_are_not_inlined() {
    let helper = FunctionObject::new(Arc::new(CodeUnit::new("helper", Vec::new())));
    let code = assemble(
        "LOAD_GLOBAL 0
         LOAD_FAST 0
         CALL_FUNCTION 1
         RETURN_VALUE",
        &["x"],
        &["helper"],
        Vec::new(),
    );
    let frame = Frame::new()
        .with_local("x", ArrayValue::full(vec![2], 1.0))
        .with_global("helper", RuntimeValue::Function(helper));
    let config = EngineConfig::default();

    let graph_break = trace(&code, &frame, &config).unwrap_err();
    assert_eq!(graph_break.pc, 2);
    assert_eq!(graph_break.reason, BreakReason::UserCall("helper".to_string()));
}

#[test]
fn loops_over_known_sequences_are_unrolled() {
    // total = 0
    // for v in xs: total = total + v
    // return total
    let code = assemble(
        "LOAD_CONST 0
         STORE_FAST 1
         LOAD_FAST 0
         GET_ITER
         FOR_ITER 11
         STORE_FAST 2
         LOAD_FAST 1
         LOAD_FAST 2
         BINARY_ADD
         STORE_FAST 1
         JUMP_ABSOLUTE 4
         LOAD_FAST 1
         RETURN_VALUE",
        &["xs", "total", "v"],
        &[],
        vec![0.into()],
    );
    let xs = RuntimeValue::List(vec![RuntimeValue::Int(1), RuntimeValue::Int(2), RuntimeValue::Int(3)]);
    let frame = Frame::new().with_local("xs", xs);
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    assert_eq!(output.graph.output(), Some(&Arg::Const(Literal::Int(6))));
    assert!(output
        .guards
        .iter()
        .any(|guard| guard.name() == "xs" && guard.check() == &GuardCheck::LengthMatch(3)));
    assert!(output.guards.iter().any(|guard| guard.name() == "xs[2]"));

    let frame = Frame::new().with_local("xs", RuntimeValue::List(Vec::new()));
    let output = trace(&code, &frame, &config).unwrap();
    assert_eq!(output.graph.output(), Some(&Arg::Const(Literal::Int(0))));
}

#[test]
fn loops_over_arrays_break_the_graph() {
    let code = assemble(
        "LOAD_FAST 0
         GET_ITER
         FOR_ITER 4
         JUMP_ABSOLUTE 2
         LOAD_CONST 0
         RETURN_VALUE",
        &["x"],
        &[],
        vec![Literal::None],
    );
    let frame = Frame::new().with_local("x", ArrayValue::full(vec![2], 1.0));
    let config = EngineConfig::default();

    let graph_break = trace(&code, &frame, &config).unwrap_err();
    assert_eq!(graph_break.opcode, Some(Opcode::GET_ITER));
    assert!(matches!(graph_break.reason, BreakReason::Value(_)));
}

#[test]
fn opaque_object_attributes_are_guarded_constants() {
    // return x * cfg.hidden
    let cfg = HostObject::new("Config", [("hidden", RuntimeValue::Int(16))]);
    let code = assemble(
        "LOAD_FAST 0
         LOAD_FAST 1
         LOAD_ATTR 0
         BINARY_MULTIPLY
         RETURN_VALUE",
        &["x", "cfg"],
        &["hidden"],
        Vec::new(),
    );
    let frame = Frame::new()
        .with_local("x", ArrayValue::full(vec![2], 1.0))
        .with_local("cfg", RuntimeValue::Object(cfg));
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    let mul = output
        .graph
        .nodes()
        .iter()
        .find(|node| node.op == NodeOp::CallFunction { target: HostFn::Mul })
        .unwrap();
    assert_eq!(mul.args.get(1), Some(&Arg::Const(Literal::Int(16))));
    assert!(output
        .guards
        .iter()
        .any(|guard| guard.name() == "cfg.hidden" && guard.check() == &GuardCheck::ConstantMatch(Literal::Int(16))));
}

#[test]
fn host_module_functions_become_graph_calls() {
    // return ops.relu(x)
    let code = assemble(
        "LOAD_GLOBAL 0
         LOAD_ATTR 1
         LOAD_FAST 0
         CALL_FUNCTION 1
         RETURN_VALUE",
        &["x"],
        &["ops", "relu"],
        Vec::new(),
    );
    let frame = Frame::new()
        .with_local("x", ArrayValue::full(vec![2], 1.0))
        .with_global("ops", RuntimeValue::HostModule(HostModule::standard_ops()));
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    assert!(has_call(&output.graph, HostFn::Relu));
    assert!(output
        .guards
        .iter()
        .any(|guard| guard.name() == "ops" && guard.source() == GuardSource::Global));
}

#[test]
fn unpacking_a_tuple_binds_each_item() {
    // a, b = pair; return x * a + b
    let code = assemble(
        "LOAD_FAST 1
         UNPACK_SEQUENCE 2
         STORE_FAST 2
         STORE_FAST 3
         LOAD_FAST 0
         LOAD_FAST 2
         BINARY_MULTIPLY
         LOAD_FAST 3
         BINARY_ADD
         RETURN_VALUE",
        &["x", "pair", "a", "b"],
        &[],
        Vec::new(),
    );
    let pair = RuntimeValue::Tuple(vec![RuntimeValue::Int(2), RuntimeValue::Int(5)]);
    let frame = Frame::new().with_local("x", ArrayValue::full(vec![2], 1.0)).with_local("pair", pair);
    let config = EngineConfig::default();

    let output = trace(&code, &frame, &config).unwrap();
    let mul = output
        .graph
        .nodes()
        .iter()
        .find(|node| node.op == NodeOp::CallFunction { target: HostFn::Mul })
        .unwrap();
    assert_eq!(mul.args.get(1), Some(&Arg::Const(Literal::Int(2))));

    let triple = RuntimeValue::Tuple(vec![RuntimeValue::Int(1); 3]);
    let frame = Frame::new().with_local("x", ArrayValue::full(vec![2], 1.0)).with_local("pair", triple);
    let graph_break = trace(&code, &frame, &config).unwrap_err();
    assert_eq!(graph_break.opcode, Some(Opcode::UNPACK_SEQUENCE));
    assert!(matches!(graph_break.reason, BreakReason::Host(_)));
}

#[test]
fn folding_errors_surface_as_host_breaks() {
    let code = assemble(
        "LOAD_CONST 0
         LOAD_CONST 1
         BINARY_TRUE_DIVIDE
         RETURN_VALUE",
        &[],
        &[],
        vec![1.into(), 0.into()],
    );
    let frame = Frame::new();
    let config = EngineConfig::default();
    let graph_break = trace(&code, &frame, &config).unwrap_err();
    assert!(matches!(graph_break.reason, BreakReason::Host(_)));
}

#[test]
fn attempts_are_single_use() {
    let code = assemble("NOP", &[], &[], Vec::new());
    let frame = Frame::new();
    let config = EngineConfig::default();
    let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
    assert_eq!(interp.state(), TraceState::Started);
    assert_eq!(interp.run().unwrap_err().reason, BreakReason::MissingReturn);
    assert!(matches!(interp.run().unwrap_err().reason, BreakReason::Unsupported(_)));
    assert_eq!(interp.state(), TraceState::Aborted);
}

#[test]
fn stack_underflow_is_a_break() {
    let code = assemble("BINARY_ADD\nRETURN_VALUE", &[], &[], Vec::new());
    let frame = Frame::new();
    let config = EngineConfig::default();
    let graph_break = trace(&code, &frame, &config).unwrap_err();
    assert_eq!(graph_break.reason, BreakReason::StackUnderflow);
}
