//! Testing utilities and mock implementations
//!
//! Mock collaborators for exercising the agent, the instrumentation wrapper
//! and the health endpoints without a real order service.

pub mod mocks;

pub use mocks::*;
