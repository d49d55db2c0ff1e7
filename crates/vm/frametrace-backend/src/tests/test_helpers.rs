//! Shared helpers for frametrace-backend tests.

use std::sync::{Arc, LazyLock};

use frametrace::code::CodeUnit;
use frametrace::runtime::{ArrayValue, DictKey, Frame, HostModule, RuntimeValue};
use frametrace::value::Literal;
use frametrace::{EngineConfig, FrameGate};

use crate::{EvalBackend, register_backend};

/// One `ops` namespace shared by every frame, so identity guards on it hold
/// across calls.
pub static OPS: LazyLock<Arc<HostModule>> = LazyLock::new(HostModule::standard_ops);

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Gate with the default configuration and the reference backend registered.
pub fn make_gate() -> FrameGate {
    make_gate_with(EngineConfig::default())
}

pub fn make_gate_with(config: EngineConfig) -> FrameGate {
    init_tracing();
    let gate = FrameGate::with_config(config);
    register_backend(&gate);
    gate
}

/// Gate using a custom [`EvalBackend`].
pub fn make_gate_with_backend(config: EngineConfig, backend: EvalBackend) -> FrameGate {
    init_tracing();
    let gate = FrameGate::with_config(config);
    gate.register_backend(Arc::new(backend));
    gate
}

/// Assemble `source` with every varname a parameter.
pub fn assemble(name: &str, source: &str, varnames: &[&str], names: &[&str], constants: Vec<Literal>) -> CodeUnit {
    CodeUnit::assemble(name, source)
        .expect("test code assembles")
        .with_varnames(varnames, varnames.len())
        .with_names(names)
        .with_constants(constants)
}

/// `return x.shape[0] + 1`
pub fn shape_plus_one() -> CodeUnit {
    assemble(
        "shape_plus_one",
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

/// `return x * n`
pub fn scale_by() -> CodeUnit {
    assemble(
        "scale_by",
        "LOAD_FAST 0
         LOAD_FAST 1
         BINARY_MULTIPLY
         RETURN_VALUE",
        &["x", "n"],
        &[],
        Vec::new(),
    )
}

/// `return len(xs)`
pub fn len_of() -> CodeUnit {
    assemble(
        "len_of",
        "LOAD_GLOBAL 0
         LOAD_FAST 0
         CALL_FUNCTION 1
         RETURN_VALUE",
        &["xs"],
        &["len"],
        Vec::new(),
    )
}

/// `{'k0': 0, 'k1': 1, ...}` with `len` entries.
pub fn dict_of_len(len: usize) -> RuntimeValue {
    RuntimeValue::Dict(
        (0..len)
            .map(|i| {
                let value = i64::try_from(i).expect("small test length");
                (DictKey::Str(Arc::from(format!("k{i}").as_str())), RuntimeValue::Int(value))
            })
            .collect(),
    )
}

pub fn array(shape: &[usize], fill: f64) -> RuntimeValue {
    RuntimeValue::array(ArrayValue::full(shape.to_vec(), fill))
}

/// Frame with `x` bound to an array of `shape` and the `ops` namespace as a global.
pub fn array_frame(shape: &[usize], fill: f64) -> Frame {
    Frame::new()
        .with_local("x", array(shape, fill))
        .with_global("ops", RuntimeValue::HostModule(OPS.clone()))
}
