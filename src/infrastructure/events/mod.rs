pub mod tracing_emitter;

pub use tracing_emitter::TracingSyncEventEmitter;
