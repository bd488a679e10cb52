use std::error::Error;

use crate::error::ErrorKind;
use crate::request::{ModelRequest, RequestOptions};
use crate::response::{Message, ModelStream};

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model provider, which is an entry for
/// sampling requests.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
///
/// Providers should honor `opts.signal` where they can. Callers race their
/// awaits against the signal and the timeout regardless.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The streaming response type for this provider.
    type Stream: ModelStream<Error = Self::Error>;

    /// Sends a request and waits for the complete response.
    fn create(
        &self,
        req: &ModelRequest,
        opts: &RequestOptions,
    ) -> impl Future<Output = Result<Message, Self::Error>> + Send + 'static;

    /// Sends a request and returns a stream of events.
    fn stream(
        &self,
        req: &ModelRequest,
        opts: &RequestOptions,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
