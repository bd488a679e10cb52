use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures_util::task::{self as task_util, ArcWake};
use futures_util::{Stream, StreamExt};
use tether_model::{
    Message, ModelProvider, ModelRequest, ModelStream, RequestOptions,
    StreamEvent,
};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RunnerError;

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
#[rustfmt::skip]
type CreateFn = Arc<
    dyn Fn(ModelRequest, RequestOptions)
        -> BoxedFuture<Result<Message, RunnerError>> + Send + Sync
>;
#[rustfmt::skip]
type StreamFn = Arc<
    dyn Fn(ModelRequest, RequestOptions)
        -> BoxedFuture<Result<MessageStream, RunnerError>> + Send + Sync
>;

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
///
/// Every call is raced against the timeout and the cancellation signal of
/// its [`RequestOptions`].
#[derive(Clone)]
pub struct ModelClient {
    create_fn: CreateFn,
    stream_fn: StreamFn,
}

impl ModelClient {
    /// Wraps a provider.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);

        let create_fn: CreateFn = {
            let provider = Arc::clone(&provider);
            Arc::new(move |req, opts| {
                let fut = provider.create(&req, &opts);
                Box::pin(
                    async move {
                        trace!("got a request: {req:?}");
                        guard(fut, &opts).await
                    }
                    .instrument(trace_span!("model client req")),
                )
            })
        };

        let stream_fn: StreamFn = Arc::new(move |req, opts| {
            let fut = provider.stream(&req, &opts);
            Box::pin(
                async move {
                    trace!("got a stream request: {req:?}");
                    let stream = guard(fut, &opts).await?;
                    Ok(MessageStream::new(stream, &opts))
                }
                .instrument(trace_span!("model client stream")),
            )
        });

        Self {
            create_fn,
            stream_fn,
        }
    }

    /// Sends a request and waits for the complete response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe.
    #[inline]
    pub async fn create(
        &self,
        req: ModelRequest,
        opts: RequestOptions,
    ) -> Result<Message, RunnerError> {
        (self.create_fn)(req, opts).await
    }

    /// Sends a request and returns a handle to the streaming response.
    #[inline]
    pub async fn stream(
        &self,
        req: ModelRequest,
        opts: RequestOptions,
    ) -> Result<MessageStream, RunnerError> {
        (self.stream_fn)(req, opts).await
    }
}

impl Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient").finish_non_exhaustive()
    }
}

/// Awaits a provider future within the limits of `opts`.
async fn guard<T, E>(
    fut: impl Future<Output = Result<T, E>>,
    opts: &RequestOptions,
) -> Result<T, RunnerError>
where
    E: tether_model::ModelProviderError,
{
    let signal = opts.signal.clone().unwrap_or_default();
    let limited = within(opts.timeout, fut);
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(RunnerError::Cancelled),
        res = limited => match res? {
            Ok(value) => Ok(value),
            Err(err) => {
                error!("got an error: {err:?}");
                Err(RunnerError::Model(Arc::new(err)))
            }
        },
    }
}

async fn within<F: Future>(
    timeout: Option<Duration>,
    fut: F,
) -> Result<F::Output, RunnerError> {
    match timeout {
        Some(timeout) => time::timeout(timeout, fut)
            .await
            .map_err(|_| RunnerError::Timeout),
        None => Ok(fut.await),
    }
}

/// Type-erased [`ModelStream`].
trait ErasedStream: Send {
    fn poll_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, RunnerError>>;

    fn message(&self) -> Option<Message>;
}

impl<S: ModelStream> ErasedStream for S {
    fn poll_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, RunnerError>> {
        self.poll_next_event(cx).map_err(|err| {
            error!("got an error: {err:?}");
            RunnerError::Model(Arc::new(err))
        })
    }

    #[inline]
    fn message(&self) -> Option<Message> {
        self.final_message()
    }
}

/// Wakes every task parked on a shared stream.
#[derive(Default)]
struct Parked(Mutex<Vec<Waker>>);

impl Parked {
    fn lock(&self) -> MutexGuard<'_, Vec<Waker>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, waker: &Waker) {
        let mut wakers = self.lock();
        if !wakers.iter().any(|parked| parked.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn unpark(&self, waker: &Waker) {
        self.lock().retain(|parked| !parked.will_wake(waker));
    }
}

impl ArcWake for Parked {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let wakers = std::mem::take(&mut *arc_self.lock());
        for waker in wakers {
            waker.wake();
        }
    }
}

struct StreamState {
    inner: Pin<Box<dyn ErasedStream>>,
    parked: Arc<Parked>,
    waker: Waker,
    finished: bool,
    error: Option<RunnerError>,
    message: Option<Message>,
}

/// A live handle to a streaming model response.
///
/// The handle is a [`Stream`] of events. Clones share the same underlying
/// response, so events consumed through one clone are not seen by the
/// others. Clones may be polled from different tasks at once; each of them
/// is woken when the response makes progress.
/// [`MessageStream::final_message`] drains whatever is left and returns
/// the aggregated message.
#[derive(Clone)]
pub struct MessageStream {
    state: Arc<Mutex<StreamState>>,
    signal: CancellationToken,
    timeout: Option<Duration>,
}

impl MessageStream {
    fn new<S: ModelStream>(stream: S, opts: &RequestOptions) -> Self {
        let parked = Arc::new(Parked::default());
        let state = StreamState {
            inner: Box::pin(stream),
            waker: task_util::waker(parked.clone()),
            parked,
            finished: false,
            error: None,
            message: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            signal: opts.signal.clone().unwrap_or_default(),
            timeout: opts.timeout,
        }
    }

    #[inline]
    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once the response has ended.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Consumes the remaining events and returns the aggregated message.
    ///
    /// Calling it again returns the same message, or the same error.
    pub async fn final_message(&self) -> Result<Message, RunnerError> {
        let mut events = self.clone();
        let drain = async {
            while let Some(event) = events.next().await {
                if let Ok(event) = event {
                    trace!("drained an event: {event:?}");
                }
            }
        };
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => {
                let mut state = self.state();
                if !state.finished {
                    state.finished = true;
                    state.error = Some(RunnerError::Cancelled);
                }
            }
            res = within(self.timeout, drain) => res?,
        }

        let state = self.state();
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        state.message.clone().ok_or(RunnerError::Stream)
    }
}

impl Stream for MessageStream {
    type Item = Result<StreamEvent, RunnerError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let mut state = self.state();
        if state.finished {
            return Poll::Ready(None);
        }
        if self.signal.is_cancelled() {
            state.finished = true;
            state.error = Some(RunnerError::Cancelled);
            return Poll::Ready(Some(Err(RunnerError::Cancelled)));
        }

        // The inner stream keeps a single waker, so it gets one that wakes
        // every parked clone.
        state.parked.park(cx.waker());
        let waker = state.waker.clone();
        let polled = state
            .inner
            .as_mut()
            .poll_event(&mut Context::from_waker(&waker));
        if polled.is_ready() {
            state.parked.unpark(cx.waker());
        }
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Some(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Ok(None)) => {
                state.finished = true;
                state.message = state.inner.message();
                Poll::Ready(None)
            }
            Poll::Ready(Err(err)) => {
                state.finished = true;
                state.error = Some(err.clone());
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
