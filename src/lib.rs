//! Heimdall - admission control for test runs that call external endpoints
//!
//! Parallel test workers calling the same APIs tend to trip the upstream's
//! rate limits. A [`Gatekeeper`] sits between the tests and the real calls
//! and applies, per endpoint pattern:
//!
//! - a TTL response cache, consulted first,
//! - in-flight deduplication (one real call per key, shared by all callers),
//! - sliding-window and burst admission control with priority queueing,
//! - exponential backoff on upstream throttling and transient failures.
//!
//! Limits come from an [`EnvironmentProfile`] chosen once per run by
//! environment name (`development`, `ci`, `production-verification`, `load`).
//!
//! # Example
//!
//! ```rust,no_run
//! use heimdall::{CallOptions, Heimdall, Priority, UpstreamError, request_fn};
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let gatekeeper = Heimdall::builder()
//!         .environment("development")
//!         .build::<String>()?;
//!
//!     let body = gatekeeper
//!         .call_with_policy(
//!             "/api/users/42",
//!             request_fn(|| async {
//!                 // Perform the real request here.
//!                 Ok::<_, UpstreamError>("{\"id\":42}".to_string())
//!             }),
//!             CallOptions::new().priority(Priority::High),
//!         )
//!         .await?;
//!
//!     println!("{body}");
//!     println!("{:?}", gatekeeper.get_statistics());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod profile;
pub mod registry;
pub mod request;
pub mod retry;
pub mod telemetry;
pub mod throttle;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{FailureClass, HeimdallError, NetworkErrorKind, Result, Stage, UpstreamError};
pub use gateway::{CallOptions, Gatekeeper, Heimdall, HeimdallBuilder};
pub use profile::{Environment, EnvironmentProfile, load_profile};
pub use registry::PolicyRegistry;
pub use request::{Request, RequestFn, request_fn};
pub use retry::{RetryConfig, TransientErrors};
pub use throttle::{Admission, DenyReason, ThrottleController};
pub use types::{EndpointPolicy, Priority, RequestKey, Statistics};
pub use version::{PKG_VERSION, version_string};
