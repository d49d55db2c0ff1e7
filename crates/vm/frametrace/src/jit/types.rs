//! Frame gate types.
//!
//! Configuration, metrics and the compiled artifacts held by the cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::dispatch::Executable;
use crate::graph::{Graph, ModuleTable};
use crate::guards::{GuardSet, GuardSource};

/// Configuration for the tracing tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When true, array shapes and strides are not baked into the graph.
    /// Shape queries become graph nodes and guards only pin dtype, device
    /// and rank.
    pub dynamic_shapes: bool,
    /// Number of calls a code unit needs before it is traced.
    /// Earlier calls run uninstrumented.
    pub minimum_call_count: u64,
    /// Maximum number of artifacts per code unit. A guard miss with this many
    /// artifacts cached retires the code unit to fallback-only.
    pub cache_size_ceiling: usize,
    /// When true, int and float frame inputs are folded into the graph as
    /// constants; otherwise they become scalar graph inputs.
    pub specialize_scalars: bool,
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dynamic_shapes: false,
            minimum_call_count: 1,
            cache_size_ceiling: 8,
            specialize_scalars: true,
        }
    }
}

/// A frame input the compiled graph reads, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputBinding {
    /// Binding path such as `x` or `xs[1]`.
    pub name: String,
    pub source: GuardSource,
}

impl fmt::Display for InputBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.source, self.name)
    }
}

/// A traced, compiled specialization of one code unit.
pub struct CompiledArtifact {
    /// Every guard must hold before `executable` may run.
    pub guards: GuardSet,
    pub inputs: Vec<InputBinding>,
    pub graph: Graph,
    pub modules: ModuleTable,
    pub executable: Arc<dyn Executable>,
}

impl CompiledArtifact {
    /// Same preconditions and same graph: running either gives the same result.
    pub fn is_equivalent(&self, other: &CompiledArtifact) -> bool {
        self.guards == other.guards && self.graph == other.graph && self.inputs == other.inputs
    }
}

impl fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledArtifact")
            .field("guards", &self.guards.len())
            .field("inputs", &self.inputs)
            .field("nodes", &self.graph.nodes().len())
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

/// Per code unit correctness counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Calls served by a compiled artifact.
    pub ok: u64,
    /// All calls, including those that fell back.
    pub total: u64,
    /// Failures per guard, keyed by the guard's display form.
    pub guard_failures: BTreeMap<String, u64>,
}

impl FrameStats {
    /// Calls that ran uninstrumented.
    pub fn fallbacks(&self) -> u64 {
        self.total.saturating_sub(self.ok)
    }
}

/// Atomic metrics for trace, compile and dispatch events.
#[derive(Debug)]
pub struct GateMetrics {
    /// Number of trace attempts started.
    pub trace_attempts: AtomicU64,
    /// Number of artifacts compiled and cached.
    pub compilations: AtomicU64,
    /// Number of trace attempts that ended in a graph break.
    pub graph_breaks: AtomicU64,
    /// Number of cached artifacts rejected by a guard.
    pub guard_failures: AtomicU64,
    /// Number of calls served by an already cached artifact.
    pub cache_hits: AtomicU64,
    /// Number of calls that ran uninstrumented.
    pub fallbacks: AtomicU64,
    /// Number of artifact runs that failed inside the backend.
    pub execution_failures: AtomicU64,
}

/// Point-in-time copy of [`GateMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub trace_attempts: u64,
    pub compilations: u64,
    pub graph_breaks: u64,
    pub guard_failures: u64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub execution_failures: u64,
}

impl GateMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            trace_attempts: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
            graph_breaks: AtomicU64::new(0),
            guard_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            execution_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.trace_attempts.store(0, Ordering::Relaxed);
        self.compilations.store(0, Ordering::Relaxed);
        self.graph_breaks.store(0, Ordering::Relaxed);
        self.guard_failures.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.execution_failures.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trace_attempts: self.trace_attempts.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            graph_breaks: self.graph_breaks.load(Ordering::Relaxed),
            guard_failures: self.guard_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new()
    }
}
