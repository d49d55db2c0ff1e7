//! Tracing tier infrastructure: configuration, the artifact cache, call
//! accounting and the frame gate that ties them together.
//!
//! Graph compilation lives behind [`dispatch::GraphBackend`]; the reference
//! backend is the separate `frametrace-backend` crate.

pub mod cache;
pub mod counter;
pub mod dispatch;
pub mod types;
