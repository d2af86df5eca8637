//! Domain logic: geodesy, scheduling, route execution and the persistence
//! port.
//!
//! Keep this layer free of HTTP and transport concerns so the same logic can
//! be exercised by handlers, background workers and tests alike.

pub mod execution;
pub mod geo;
pub mod ports;
pub mod schedule;

pub use self::execution::ExecutionEngine;
pub use self::ports::{DispatchStore, StoreError};
