//! Built-in event listeners

pub mod memory_listener;
pub mod tracing_listener;

pub use memory_listener::MemoryListener;
pub use tracing_listener::TracingListener;
