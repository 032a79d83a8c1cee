//! API endpoint handler trait

use crate::error::HandlerError;
use crate::http::{Request, Response};
use async_trait::async_trait;

/// Application callback bound to an endpoint
///
/// The handler may write any response it wants. Returning `Ok` leaves the
/// status at 200 unless the handler chose another one; returning `Err`
/// (or panicking) turns the response into a 500 and reports the failure.
/// The router ends the response afterwards if the handler did not.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), HandlerError>;
}

/// Adapter turning a synchronous closure into a [`Handler`]
pub struct FnHandler<F>(F);

/// Wrap a closure as a handler
pub const fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), HandlerError> {
        (self.0)(req, res)
    }
}
