//! Data model shared across components.

pub mod key;
pub mod policy;
pub mod stats;

pub use key::RequestKey;
pub use policy::{EndpointPolicy, Priority};
pub use stats::Statistics;
