//! Handler contract between the queue and domain code
//!
//! The handler is injected once per lane group at construction. The queue
//! never interprets the handler's result; it is passed through verbatim to
//! the submitter's outcome handle.

use crate::envelope::Envelope;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;

/// Domain-side processor for dispatched envelopes
///
/// Implementations should be cheap to call concurrently: a group dispatches
/// into the same handler from every lane. Errors returned here are passed
/// through to the submitter unchanged.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process one envelope for the given session
    async fn handle(&self, session_id: &str, envelope: &Envelope) -> Result<serde_json::Value>;
}

/// Adapter turning an async closure into a [`Handler`]
///
/// Mainly for tests and small consumers. The closure receives owned clones
/// of the session id and envelope.
///
/// ```rust,ignore
/// let handler = FnHandler::new(|_session, envelope: Envelope| async move {
///     Ok(envelope.payload)
/// });
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Wrap an async closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(String, Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value>> + Send,
{
    async fn handle(&self, session_id: &str, envelope: &Envelope) -> Result<serde_json::Value> {
        (self.f)(session_id.to_string(), envelope.clone()).await
    }
}
