//! Live environment of an intercepted call.

use rustc_hash::FxHashMap;

use super::RuntimeValue;
use crate::guards::GuardSource;

/// Read access to the bindings visible to an intercepted call.
///
/// Used exclusively by guard validation and artifact input binding; tracing
/// itself only sees values through the variable builder.
pub trait LiveEnvironment {
    fn lookup(&self, name: &str, source: GuardSource) -> Option<RuntimeValue>;
}

/// Locals and globals of one call.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub locals: FxHashMap<String, RuntimeValue>,
    pub globals: FxHashMap<String, RuntimeValue>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, name: &str, value: impl Into<RuntimeValue>) -> Self {
        self.locals.insert(name.to_string(), value.into());
        self
    }

    pub fn with_global(mut self, name: &str, value: impl Into<RuntimeValue>) -> Self {
        self.globals.insert(name.to_string(), value.into());
        self
    }

    pub fn set_local(&mut self, name: &str, value: RuntimeValue) {
        self.locals.insert(name.to_string(), value);
    }

    pub fn local(&self, name: &str) -> Option<&RuntimeValue> {
        self.locals.get(name)
    }

    pub fn global(&self, name: &str) -> Option<&RuntimeValue> {
        self.globals.get(name)
    }
}

impl LiveEnvironment for Frame {
    fn lookup(&self, name: &str, source: GuardSource) -> Option<RuntimeValue> {
        match source {
            GuardSource::Local => self.locals.get(name).cloned(),
            GuardSource::Global => self.globals.get(name).cloned(),
        }
    }
}
