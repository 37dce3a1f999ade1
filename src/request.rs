//! The injected "perform the real request" seam.
//!
//! Heimdall never builds requests itself. Each call to the
//! [`Gatekeeper`](crate::Gatekeeper) carries a [`Request`] whose single
//! [`execute()`](Request::execute) method performs the real call, and which
//! may be executed several times when the call is retried.

use std::future::Future;

use async_trait::async_trait;

use crate::error::UpstreamError;

/// A real call to an external endpoint.
#[async_trait]
pub trait Request: Send + Sync {
    type Output: Send;

    /// Perform the call once.
    async fn execute(&self) -> Result<Self::Output, UpstreamError>;
}

/// [`Request`] adapter for a closure returning a future.
///
/// Created by [`request_fn()`].
#[derive(Clone)]
pub struct RequestFn<F>(F);

/// Wrap a closure as a [`Request`].
///
/// ```rust
/// use heimdall::{request_fn, Request, UpstreamError};
///
/// # async fn demo() {
/// let req = request_fn(|| async { Ok::<_, UpstreamError>(42u32) });
/// assert_eq!(req.execute().await, Ok(42));
/// # }
/// ```
pub fn request_fn<F, Fut, T>(f: F) -> RequestFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    T: Send + 'static,
{
    RequestFn(f)
}

#[async_trait]
impl<F, Fut, T> Request for RequestFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn execute(&self) -> Result<T, UpstreamError> {
        (self.0)().await
    }
}

impl<F> std::fmt::Debug for RequestFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestFn")
    }
}
