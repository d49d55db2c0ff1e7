//! Frame gate.
//!
//! Sits in front of every call to an intercepted code unit and decides how
//! the call runs: through a cached artifact whose guards hold, through a
//! freshly traced and compiled artifact, or uninstrumented. Correctness
//! failures (graph breaks, backend errors, guard misses) never reach the
//! caller; they only change which path is taken.
//!
//! Compilation is delegated to a [`GraphBackend`] registered at startup, so
//! this crate stays free of any particular execution engine.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use super::cache::ArtifactCache;
use super::counter::FrameCounter;
use super::types::{CompiledArtifact, EngineConfig, FrameStats, GateMetrics, MetricsSnapshot};
use crate::code::{CodeId, CodeUnit};
use crate::errors::{EngineError, HostError};
use crate::graph::{Graph, ModuleTable};
use crate::guards::{check_guards, resolve_binding};
use crate::interpreter::trace;
use crate::runtime::{LiveEnvironment, RuntimeValue};

/// Trait for graph compilation backends.
///
/// The core defines this interface; `frametrace-backend` provides the
/// reference implementation.
pub trait GraphBackend: Send + Sync {
    /// Compile a traced graph. `modules` holds every module the graph reads
    /// parameters from or calls.
    fn compile(&self, graph: &Graph, modules: &ModuleTable) -> Result<Arc<dyn Executable>, String>;
}

/// A compiled graph, callable with the values of its placeholders in order.
pub trait Executable: Send + Sync + fmt::Debug {
    fn run(&self, inputs: &[RuntimeValue]) -> Result<RuntimeValue, String>;
}

/// Why a call ran uninstrumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackReason {
    /// The code unit has not been called `minimum_call_count` times yet.
    BelowCallThreshold,
    /// The code unit was retired earlier.
    FallbackOnly,
    /// No backend is registered.
    NoBackend,
    /// The trace attempt aborted; the code unit is now fallback-only.
    GraphBreak,
    /// Guards missed with the cache full; the code unit is now fallback-only.
    CeilingReached,
    /// The backend rejected the graph; the code unit is now fallback-only.
    CompileFailed,
    /// The artifact failed while running. Affects this call only.
    ExecutionFailed,
}

/// How a call was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPath {
    /// A previously cached artifact at `index` passed its guards.
    CachedArtifact { index: usize },
    /// The call traced and compiled the artifact now cached at `index`.
    FreshArtifact { index: usize },
    Fallback(FallbackReason),
}

impl ExecutionPath {
    pub fn is_fallback(self) -> bool {
        matches!(self, ExecutionPath::Fallback(_))
    }
}

/// What a cache miss resolved to.
enum Route {
    Artifact {
        artifact: Arc<CompiledArtifact>,
        path: ExecutionPath,
    },
    Fallback(FallbackReason),
}

/// Result of one intercepted call.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub value: RuntimeValue,
    pub path: ExecutionPath,
}

/// Engine state shared by every intercepted call.
///
/// An owned value rather than a process global: hosts keep one per
/// interpreter and tests build as many independent gates as they need.
pub struct FrameGate {
    /// Artifacts per code unit, in insertion order.
    pub cache: ArtifactCache,
    /// Per code unit call accounting.
    pub counter: FrameCounter,
    pub config: EngineConfig,
    backend: RwLock<Option<Arc<dyn GraphBackend>>>,
    pub metrics: GateMetrics,
    /// Code units that always run uninstrumented.
    fallback_only: RwLock<FxHashSet<CodeId>>,
    /// Serializes tracing per code unit.
    trace_locks: Mutex<FxHashMap<CodeId, Arc<Mutex<()>>>>,
}

impl FrameGate {
    /// Create a gate with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            cache: ArtifactCache::new(),
            counter: FrameCounter::new(),
            config,
            backend: RwLock::new(None),
            metrics: GateMetrics::new(),
            fallback_only: RwLock::new(FxHashSet::default()),
            trace_locks: Mutex::new(FxHashMap::default()),
        }
    }

    /// Register the compilation backend. Without one every call falls back.
    pub fn register_backend(&self, backend: Arc<dyn GraphBackend>) {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut guard = self.backend.write().unwrap();
        *guard = Some(backend);
    }

    pub fn backend(&self) -> Option<Arc<dyn GraphBackend>> {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let guard = self.backend.read().unwrap();
        guard.clone()
    }

    /// Run one call to `code`.
    ///
    /// `env` exposes the call's bindings; `run_original` executes the code
    /// unit uninstrumented and is invoked at most once, only when no artifact
    /// serves the call. Its host errors are the only errors returned.
    pub fn call<F>(&self, code: &CodeUnit, env: &dyn LiveEnvironment, run_original: F) -> Result<GateOutcome, EngineError>
    where
        F: FnOnce() -> Result<RuntimeValue, HostError>,
    {
        let id = code.id;
        let calls = self.counter.record_call(id);

        if self.is_fallback_only(id) {
            return self.fallback(code, FallbackReason::FallbackOnly, run_original);
        }
        if calls < self.config.minimum_call_count {
            return self.fallback(code, FallbackReason::BelowCallThreshold, run_original);
        }

        let mut scanned = 0;
        if let Some((index, artifact)) = self.lookup(code, env, &mut scanned) {
            return self.serve(code, env, &artifact, ExecutionPath::CachedArtifact { index }, run_original);
        }

        // User code runs only after the trace lock is released, so a
        // recursive call into the same code unit cannot block on it.
        match self.resolve_miss(code, env, &mut scanned) {
            Route::Artifact { artifact, path } => self.serve(code, env, &artifact, path, run_original),
            Route::Fallback(reason) => self.fallback(code, reason, run_original),
        }
    }

    /// Decides how a call that missed the cache runs. Holds the code unit's
    /// trace lock for the recheck, trace, compile and append.
    fn resolve_miss(&self, code: &CodeUnit, env: &dyn LiveEnvironment, scanned: &mut usize) -> Route {
        let id = code.id;
        let lock = self.trace_lock(id);
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let _tracing = lock.lock().unwrap();

        // Another caller may have compiled or retired the code unit while we waited.
        if self.is_fallback_only(id) {
            return Route::Fallback(FallbackReason::FallbackOnly);
        }
        if let Some((index, artifact)) = self.lookup(code, env, scanned) {
            return Route::Artifact {
                artifact,
                path: ExecutionPath::CachedArtifact { index },
            };
        }

        let cached = self.cache.len_for(id);
        if cached >= self.config.cache_size_ceiling {
            let removed = self.cache.invalidate(id);
            self.retire(code, &format!("cache size ceiling {} reached", self.config.cache_size_ceiling));
            debug!(code = %code.name, id = %id, removed, "dropped artifacts of retired code unit");
            return Route::Fallback(FallbackReason::CeilingReached);
        }

        let Some(backend) = self.backend() else {
            return Route::Fallback(FallbackReason::NoBackend);
        };

        GateMetrics::bump(&self.metrics.trace_attempts);
        let output = match trace(code, env, &self.config) {
            Ok(output) => output,
            Err(graph_break) => {
                GateMetrics::bump(&self.metrics.graph_breaks);
                warn!(code = %code.name, id = %id, reason = %graph_break, "graph break");
                self.retire(code, "graph break");
                return Route::Fallback(FallbackReason::GraphBreak);
            }
        };

        let executable = match backend.compile(&output.graph, &output.modules) {
            Ok(executable) => executable,
            Err(reason) => {
                warn!(code = %code.name, id = %id, %reason, "backend compilation failed");
                self.retire(code, "backend compilation failed");
                return Route::Fallback(FallbackReason::CompileFailed);
            }
        };

        let artifact = Arc::new(CompiledArtifact {
            guards: output.guards,
            inputs: output.inputs,
            graph: output.graph,
            modules: output.modules,
            executable,
        });
        let index = self.cache.append(id, artifact.clone());
        GateMetrics::bump(&self.metrics.compilations);
        info!(
            code = %code.name,
            id = %id,
            index,
            guards = artifact.guards.len(),
            nodes = artifact.graph.nodes().len(),
            "compiled artifact"
        );
        Route::Artifact {
            artifact,
            path: ExecutionPath::FreshArtifact { index },
        }
    }

    /// First artifact at or after `*scanned` whose guards all hold; advances
    /// `scanned` past every artifact checked. Each rejected artifact is
    /// recorded under the guard that rejected it.
    fn lookup(
        &self,
        code: &CodeUnit,
        env: &dyn LiveEnvironment,
        scanned: &mut usize,
    ) -> Option<(usize, Arc<CompiledArtifact>)> {
        for (index, artifact) in self.cache.get(code.id).into_iter().enumerate().skip(*scanned) {
            *scanned = index.saturating_add(1);
            match check_guards(&artifact.guards, env) {
                Ok(()) => return Some((index, artifact)),
                Err(failure) => {
                    GateMetrics::bump(&self.metrics.guard_failures);
                    self.counter.record_guard_failure(code.id, &failure.guard.to_string());
                    debug!(code = %code.name, id = %code.id, index, reason = %failure, "guard miss");
                }
            }
        }
        None
    }

    /// Runs `artifact`, falling back for this call if it fails.
    fn serve<F>(
        &self,
        code: &CodeUnit,
        env: &dyn LiveEnvironment,
        artifact: &CompiledArtifact,
        path: ExecutionPath,
        run_original: F,
    ) -> Result<GateOutcome, EngineError>
    where
        F: FnOnce() -> Result<RuntimeValue, HostError>,
    {
        match Self::execute(artifact, env) {
            Ok(value) => {
                self.counter.record_ok(code.id);
                if matches!(path, ExecutionPath::CachedArtifact { .. }) {
                    GateMetrics::bump(&self.metrics.cache_hits);
                }
                Ok(GateOutcome { value, path })
            }
            Err(reason) => {
                GateMetrics::bump(&self.metrics.execution_failures);
                warn!(code = %code.name, id = %code.id, %reason, "artifact execution failed");
                self.fallback(code, FallbackReason::ExecutionFailed, run_original)
            }
        }
    }

    fn execute(artifact: &CompiledArtifact, env: &dyn LiveEnvironment) -> Result<RuntimeValue, String> {
        let inputs = artifact
            .inputs
            .iter()
            .map(|input| resolve_binding(env, &input.name, input.source).map_err(|err| format!("input {input}: {err}")))
            .collect::<Result<Vec<_>, _>>()?;
        artifact.executable.run(&inputs)
    }

    fn fallback<F>(&self, code: &CodeUnit, reason: FallbackReason, run_original: F) -> Result<GateOutcome, EngineError>
    where
        F: FnOnce() -> Result<RuntimeValue, HostError>,
    {
        GateMetrics::bump(&self.metrics.fallbacks);
        debug!(code = %code.name, id = %code.id, ?reason, "running uninstrumented");
        let value = run_original()?;
        Ok(GateOutcome {
            value,
            path: ExecutionPath::Fallback(reason),
        })
    }

    fn retire(&self, code: &CodeUnit, why: &str) {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut fallback_only = self.fallback_only.write().unwrap();
        if fallback_only.insert(code.id) {
            warn!(code = %code.name, id = %code.id, why, "code unit marked fallback-only");
        }
    }

    fn trace_lock(&self, code: CodeId) -> Arc<Mutex<()>> {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let mut locks = self.trace_locks.lock().unwrap();
        locks.entry(code).or_default().clone()
    }

    pub fn is_fallback_only(&self, code: CodeId) -> bool {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let fallback_only = self.fallback_only.read().unwrap();
        fallback_only.contains(&code)
    }

    /// Artifacts cached for `code`, oldest first.
    pub fn artifacts(&self, code: CodeId) -> Vec<Arc<CompiledArtifact>> {
        self.cache.get(code)
    }

    pub fn stats(&self, code: CodeId) -> FrameStats {
        self.counter.stats(code)
    }

    /// Per code unit `ok`/`total` counters and guard failure histograms.
    pub fn snapshot(&self) -> BTreeMap<CodeId, FrameStats> {
        self.counter.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Clear the cache, counters, fallback set and metrics. The
    /// configuration and the registered backend are kept.
    pub fn reset(&self) {
        self.cache.clear();
        self.counter.clear();
        self.metrics.reset();
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        {
            self.fallback_only.write().unwrap().clear();
        }
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        {
            self.trace_locks.lock().unwrap().clear();
        }
    }

    /// Forget everything recorded for one code unit.
    pub fn reset_code(&self, code: CodeId) {
        self.cache.invalidate(code);
        self.counter.reset_code(code);
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        {
            self.fallback_only.write().unwrap().remove(&code);
        }
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        {
            self.trace_locks.lock().unwrap().remove(&code);
        }
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Arg;
    use crate::runtime::{ArrayValue, Frame, FunctionObject};
    use crate::value::Literal;

    /// Returns the graph's constant output, or its first input.
    #[derive(Debug)]
    struct Echo {
        output: Option<Literal>,
        fail: bool,
    }

    impl Executable for Echo {
        fn run(&self, inputs: &[RuntimeValue]) -> Result<RuntimeValue, String> {
            if self.fail {
                return Err("device lost".to_string());
            }
            match &self.output {
                Some(literal) => Ok(literal.to_runtime()),
                None => inputs.first().cloned().ok_or_else(|| "no inputs".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct EchoBackend {
        reject: bool,
        fail_runs: bool,
    }

    impl GraphBackend for EchoBackend {
        fn compile(&self, graph: &Graph, _modules: &ModuleTable) -> Result<Arc<dyn Executable>, String> {
            if self.reject {
                return Err("unsupported node".to_string());
            }
            let output = match graph.output() {
                Some(Arg::Const(literal)) => Some(literal.clone()),
                _ => None,
            };
            Ok(Arc::new(Echo {
                output,
                fail: self.fail_runs,
            }))
        }
    }

    fn gate(config: EngineConfig, backend: EchoBackend) -> FrameGate {
        let gate = FrameGate::with_config(config);
        gate.register_backend(Arc::new(backend));
        gate
    }

    /// `x.shape[0] + 1`
    fn shape_plus_one() -> CodeUnit {
        CodeUnit::assemble(
            "shape_plus_one",
            "LOAD_FAST 0
             LOAD_ATTR 0
             LOAD_CONST 0
             BINARY_SUBSCR
             LOAD_CONST 1
             BINARY_ADD
             RETURN_VALUE",
        )
        .unwrap()
        .with_varnames(&["x"], 1)
        .with_names(&["shape"])
        .with_constants(vec![0.into(), 1.into()])
    }

    fn frame(rows: usize) -> Frame {
        Frame::new().with_local("x", ArrayValue::full(vec![rows], 0.0))
    }

    fn original() -> Result<RuntimeValue, HostError> {
        Ok(RuntimeValue::Int(-1))
    }

    #[test]
    fn guard_failure_retraces_and_keeps_both_artifacts() {
        let gate = gate(EngineConfig::default(), EchoBackend::default());
        let code = shape_plus_one();

        let first = gate.call(&code, &frame(4), original).unwrap();
        assert_eq!(first.path, ExecutionPath::FreshArtifact { index: 0 });
        assert_eq!(first.value, RuntimeValue::Int(5));

        let again = gate.call(&code, &frame(4), original).unwrap();
        assert_eq!(again.path, ExecutionPath::CachedArtifact { index: 0 });

        let wider = gate.call(&code, &frame(7), original).unwrap();
        assert_eq!(wider.path, ExecutionPath::FreshArtifact { index: 1 });
        assert_eq!(wider.value, RuntimeValue::Int(8));

        let back = gate.call(&code, &frame(4), original).unwrap();
        assert_eq!(back.path, ExecutionPath::CachedArtifact { index: 0 });

        let stats = gate.stats(code.id);
        assert_eq!((stats.ok, stats.total), (4, 4));
        assert_eq!(stats.guard_failures.values().sum::<u64>(), 1);
        let metrics = gate.metrics();
        assert_eq!(metrics.compilations, 2);
        assert_eq!(metrics.cache_hits, 2);
        assert_eq!(metrics.guard_failures, 1);
        assert_eq!(gate.artifacts(code.id).len(), 2);
    }

    #[test]
    fn calls_below_the_threshold_are_not_traced() {
        let config = EngineConfig {
            minimum_call_count: 3,
            ..EngineConfig::default()
        };
        let gate = gate(config, EchoBackend::default());
        let code = shape_plus_one();

        for _ in 0..2 {
            let outcome = gate.call(&code, &frame(4), original).unwrap();
            assert_eq!(outcome.path, ExecutionPath::Fallback(FallbackReason::BelowCallThreshold));
            assert_eq!(outcome.value, RuntimeValue::Int(-1));
        }
        assert_eq!(gate.metrics().trace_attempts, 0);
        let third = gate.call(&code, &frame(4), original).unwrap();
        assert_eq!(third.path, ExecutionPath::FreshArtifact { index: 0 });
    }

    #[test]
    fn missing_backend_falls_back() {
        let gate = FrameGate::new();
        let code = shape_plus_one();
        let outcome = gate.call(&code, &frame(4), original).unwrap();
        assert_eq!(outcome.path, ExecutionPath::Fallback(FallbackReason::NoBackend));
        assert!(!gate.is_fallback_only(code.id));
    }

    #[test]
    fn graph_breaks_retire_the_code_unit() {
        let gate = gate(EngineConfig::default(), EchoBackend::default());
        let helper = FunctionObject::new(Arc::new(CodeUnit::new("helper", Vec::new())));
        let code = CodeUnit::assemble("calls_helper", "LOAD_GLOBAL 0\nCALL_FUNCTION 0\nRETURN_VALUE")
            .unwrap()
            .with_names(&["helper"]);
        let env = Frame::new().with_global("helper", RuntimeValue::Function(helper));

        let first = gate.call(&code, &env, original).unwrap();
        assert_eq!(first.path, ExecutionPath::Fallback(FallbackReason::GraphBreak));
        assert_eq!(first.value, RuntimeValue::Int(-1));
        let second = gate.call(&code, &env, original).unwrap();
        assert_eq!(second.path, ExecutionPath::Fallback(FallbackReason::FallbackOnly));

        let metrics = gate.metrics();
        assert_eq!(metrics.trace_attempts, 1);
        assert_eq!(metrics.graph_breaks, 1);
        assert_eq!(metrics.fallbacks, 2);
        assert_eq!(gate.stats(code.id).fallbacks(), 2);
    }

    #[test]
    fn reaching_the_ceiling_retires_the_code_unit() {
        let config = EngineConfig {
            cache_size_ceiling: 2,
            ..EngineConfig::default()
        };
        let gate = gate(config, EchoBackend::default());
        let code = shape_plus_one();

        for rows in 1..=2 {
            assert!(!gate.call(&code, &frame(rows), original).unwrap().path.is_fallback());
        }
        let third = gate.call(&code, &frame(3), original).unwrap();
        assert_eq!(third.path, ExecutionPath::Fallback(FallbackReason::CeilingReached));
        assert!(gate.is_fallback_only(code.id));
        assert!(gate.artifacts(code.id).is_empty());

        // Even inputs an earlier artifact matched now run uninstrumented.
        let first_shape = gate.call(&code, &frame(1), original).unwrap();
        assert_eq!(first_shape.path, ExecutionPath::Fallback(FallbackReason::FallbackOnly));
    }

    #[test]
    fn backend_failures_fall_back() {
        let rejecting = gate(
            EngineConfig::default(),
            EchoBackend {
                reject: true,
                ..EchoBackend::default()
            },
        );
        let code = shape_plus_one();
        let outcome = rejecting.call(&code, &frame(4), original).unwrap();
        assert_eq!(outcome.path, ExecutionPath::Fallback(FallbackReason::CompileFailed));
        assert!(rejecting.is_fallback_only(code.id));

        let failing = gate(
            EngineConfig::default(),
            EchoBackend {
                fail_runs: true,
                ..EchoBackend::default()
            },
        );
        let outcome = failing.call(&code, &frame(4), original).unwrap();
        assert_eq!(outcome.path, ExecutionPath::Fallback(FallbackReason::ExecutionFailed));
        assert_eq!(outcome.value, RuntimeValue::Int(-1));
        assert!(!failing.is_fallback_only(code.id));
        assert_eq!(failing.metrics().execution_failures, 1);
        assert_eq!(failing.stats(code.id).ok, 0);
    }

    #[test]
    fn host_errors_from_the_original_propagate() {
        let gate = FrameGate::new();
        let code = shape_plus_one();
        let result = gate.call(&code, &frame(4), || Err(HostError::Name("y".to_string())));
        assert!(matches!(result, Err(EngineError::Host(HostError::Name(_)))));
    }

    #[test]
    fn reset_forgets_everything_but_the_backend() {
        let gate = gate(EngineConfig::default(), EchoBackend::default());
        let code = shape_plus_one();
        gate.call(&code, &frame(4), original).unwrap();
        gate.reset();
        assert!(gate.cache.is_empty());
        assert!(gate.snapshot().is_empty());
        assert_eq!(gate.metrics(), MetricsSnapshot::default());

        let outcome = gate.call(&code, &frame(4), original).unwrap();
        assert_eq!(outcome.path, ExecutionPath::FreshArtifact { index: 0 });
    }

    #[test]
    fn reset_code_readmits_a_retired_code_unit() {
        let config = EngineConfig {
            cache_size_ceiling: 0,
            ..EngineConfig::default()
        };
        let gate = gate(config, EchoBackend::default());
        let code = shape_plus_one();
        gate.call(&code, &frame(4), original).unwrap();
        assert!(gate.is_fallback_only(code.id));

        gate.reset_code(code.id);
        assert!(!gate.is_fallback_only(code.id));
        assert_eq!(gate.stats(code.id), FrameStats::default());
    }

    #[test]
    fn recursive_calls_into_the_same_code_unit_complete() {
        let gate = FrameGate::new();
        let code = shape_plus_one();
        let env = frame(4);

        let outcome = gate
            .call(&code, &env, || {
                let inner = gate
                    .call(&code, &env, || Ok(RuntimeValue::Int(1)))
                    .map_err(|err| HostError::System(err.to_string()))?;
                assert_eq!(inner.path, ExecutionPath::Fallback(FallbackReason::NoBackend));
                crate::runtime::ops::binary(crate::runtime::HostFn::Add, &inner.value, &RuntimeValue::Int(1))
            })
            .unwrap();
        assert_eq!(outcome.path, ExecutionPath::Fallback(FallbackReason::NoBackend));
        assert_eq!(outcome.value, RuntimeValue::Int(2));
        assert_eq!(gate.stats(code.id).total, 2);
    }

    #[test]
    fn recursion_inside_a_retired_code_unit_completes() {
        let gate = gate(EngineConfig::default(), EchoBackend { reject: true, ..EchoBackend::default() });
        let code = shape_plus_one();
        let env = frame(4);

        let outcome = gate
            .call(&code, &env, || {
                let inner = gate.call(&code, &env, original).map_err(|err| HostError::System(err.to_string()))?;
                // The outer call retired the code unit before running the original.
                assert_eq!(inner.path, ExecutionPath::Fallback(FallbackReason::FallbackOnly));
                Ok(inner.value)
            })
            .unwrap();
        assert_eq!(outcome.path, ExecutionPath::Fallback(FallbackReason::CompileFailed));
        assert_eq!(outcome.value, RuntimeValue::Int(-1));
    }

    #[test]
    fn concurrent_first_calls_compile_once() {
        let gate = gate(EngineConfig::default(), EchoBackend::default());
        let code = shape_plus_one();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let outcome = gate.call(&code, &frame(4), original).unwrap();
                    assert_eq!(outcome.value, RuntimeValue::Int(5));
                });
            }
        });
        assert_eq!(gate.metrics().compilations, 1);
        assert_eq!(gate.metrics().trace_attempts, 1);
        assert_eq!(gate.stats(code.id).ok, 4);
    }
}
