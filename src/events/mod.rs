mod audit_event;
mod emitter;
mod errors;
mod sinks;

pub use audit_event::AuditEvent;
pub use emitter::AuditEmitter;
pub use errors::SinkError;
pub use sinks::{AuditSink, BalanceCache, CachedBalance, LogSink};
