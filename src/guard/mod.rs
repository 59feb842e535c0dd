mod account_locks;
mod errors;
mod idempotency;

pub use account_locks::{AccountLocks, LockSet};
pub use errors::GuardError;
pub use idempotency::IdempotencyCache;
