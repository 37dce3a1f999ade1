//! Caching subsystem.
//!
//! Two cooperating structures, both keyed on [`RequestKey`](crate::RequestKey):
//!
//! - [`TtlCache`]: bounded response cache with per-entry TTL. Consulted
//!   first on every call; expired entries are treated as absent, never as a
//!   fallback value.
//!
//! - [`Deduplicator`]: tracks calls that are currently in flight so that
//!   concurrent identical requests share one real invocation.
//!
//! The [`Gatekeeper`](crate::Gatekeeper) checks the cache strictly before
//! the deduplicator, and moves a settled result from the deduplicator into
//! the cache under the deduplicator's lock, so a key is never both cached
//! and in flight.

pub mod inflight;
pub mod store;

pub use inflight::{Deduplicator, Pending};
pub use store::{CachedKey, DEFAULT_MAX_ENTRIES, TtlCache};
