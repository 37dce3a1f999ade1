//! Gatekeeper construction and the rate-limit facade

mod builder;
mod gatekeeper;
mod options;

pub use builder::{Heimdall, HeimdallBuilder};
pub use gatekeeper::Gatekeeper;
pub use options::CallOptions;
