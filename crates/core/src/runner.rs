//! The tool runner loop.
//!
//! A [`ToolRunner`] alternates between calling the model and running the
//! tools the model asked for, until the model stops asking.

mod params;

use std::fmt::{self, Debug};
use std::future::IntoFuture;
use std::pin::Pin;

use tether_model::{Message, MessageParam, ModelProvider, RequestOptions, Role};
use tokio::sync::watch;
use tracing::Instrument;

use crate::error::RunnerError;
use crate::model_client::{MessageStream, ModelClient};
pub use params::{ParamsHandle, RunnerParams, RunnerParamsBuilder};

const HELPER_HEADER: &str = "x-agent-helper";
const HELPER_HEADER_VALUE: &str = "tool-runner";

/// One model call made by the loop.
#[derive(Debug)]
pub enum Step {
    /// The complete response of a non-streaming call.
    Message(Message),
    /// The live handle of a streaming call.
    ///
    /// The loop resumes with whatever the handle has not consumed yet, so
    /// reading the events is optional.
    Stream(MessageStream),
}

/// How a run ended.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The loop finished, with the last response of the model.
    Completed(Message),
    /// The loop failed. The runner may be run again.
    Failed(RunnerError),
}

impl Outcome {
    /// Converts the outcome into a result.
    #[inline]
    pub fn into_result(self) -> Result<Message, RunnerError> {
        match self {
            Outcome::Completed(message) => Ok(message),
            Outcome::Failed(err) => Err(err),
        }
    }
}

/// The lifecycle of a [`ToolRunner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunnerState {
    /// Not started yet.
    Idle,
    /// The loop is being consumed.
    Running,
    /// The loop has finished.
    Completed,
    /// The loop failed, and can be started again.
    Failed,
}

/// A response that was handed out but not yet folded into the history.
enum Pending {
    Message(Message),
    Stream(MessageStream),
}

/// Drives the conversation between a model and a set of tools.
///
/// Each iteration makes one model call. When the response asks for tools,
/// they are executed concurrently and their results are appended as a user
/// message, then the model is called again. The loop ends when a response
/// asks for no tools, or when the iteration cap is reached.
///
/// The loop is consumed through [`ToolRunner::steps`], or all at once with
/// [`ToolRunner::run_until_done`] or by awaiting the runner itself.
///
/// # Examples
///
/// ```ignore
/// let params = RunnerParams::builder("some-model")
///     .with_message(MessageParam::user("What's in the README?"))
///     .with_tools(tools)
///     .build();
/// let runner = ToolRunner::new(provider, params, RequestOptions::new());
/// let message = runner.await?;
/// ```
pub struct ToolRunner {
    client: ModelClient,
    options: RequestOptions,
    handle: ParamsHandle,
    iteration: u32,
    state: RunnerState,
    last_response: Option<Message>,
    outcome_tx: watch::Sender<Option<Outcome>>,
}

impl ToolRunner {
    /// Creates a runner over a model provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(
        provider: P,
        params: RunnerParams,
        options: RequestOptions,
    ) -> Self {
        Self::with_client(ModelClient::new(provider), params, options)
    }

    /// Creates a runner over an existing model client.
    pub fn with_client(
        client: ModelClient,
        params: RunnerParams,
        mut options: RequestOptions,
    ) -> Self {
        options
            .headers
            .entry(HELPER_HEADER.to_owned())
            .or_insert_with(|| HELPER_HEADER_VALUE.to_owned());
        let (outcome_tx, _) = watch::channel(None);
        Self {
            client,
            options,
            handle: ParamsHandle::new(params),
            iteration: 0,
            state: RunnerState::Idle,
            last_response: None,
            outcome_tx,
        }
    }

    /// Returns the current lifecycle state.
    #[inline]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Returns the number of model calls made so far.
    #[inline]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Returns the request options used for every call.
    #[inline]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Returns a handle to the parameters, usable from other tasks.
    #[inline]
    pub fn params_handle(&self) -> ParamsHandle {
        self.handle.clone()
    }

    /// Returns a snapshot of the parameters.
    #[inline]
    pub fn params(&self) -> RunnerParams {
        self.handle.params()
    }

    /// Returns a snapshot of the message history.
    #[inline]
    pub fn messages(&self) -> Vec<MessageParam> {
        self.handle.messages()
    }

    /// Replaces the parameters. See [`ParamsHandle`].
    #[inline]
    pub fn set_params(&self, params: RunnerParams) {
        self.handle.set_params(params);
    }

    /// Changes the parameters in place. See [`ParamsHandle`].
    #[inline]
    pub fn update_params<F: FnOnce(&mut RunnerParams)>(&self, f: F) {
        self.handle.update_params(f);
    }

    /// Appends messages to the history. See [`ParamsHandle`].
    #[inline]
    pub fn push_messages<I>(&self, messages: I)
    where
        I: IntoIterator<Item = MessageParam>,
    {
        self.handle.push_messages(messages);
    }

    /// Starts consuming the loop.
    ///
    /// Fails with [`RunnerError::AlreadyConsumed`] if the loop is running
    /// or has completed. A failed loop may be started again, and so may a
    /// loop whose [`Steps`] were dropped early; a response handed out but
    /// not yet folded into the history is lost in that case.
    pub fn steps(&mut self) -> Result<Steps<'_>, RunnerError> {
        match self.state {
            RunnerState::Running | RunnerState::Completed => {
                return Err(RunnerError::AlreadyConsumed);
            }
            RunnerState::Idle | RunnerState::Failed => {}
        }
        self.state = RunnerState::Running;
        self.outcome_tx.send_replace(None);
        Ok(Steps {
            runner: self,
            pending: None,
            finished: false,
        })
    }

    /// Runs the loop to the end and returns the last response.
    ///
    /// On a completed runner this returns the stored result.
    pub async fn run_until_done(&mut self) -> Result<Message, RunnerError> {
        if self.state != RunnerState::Completed {
            let mut steps = self.steps()?;
            while let Some(step) = steps.next().await {
                step?;
            }
        }
        self.done().await
    }

    /// Waits for the loop to end, from any task.
    ///
    /// The returned future doesn't borrow the runner. It resolves with the
    /// failure of the last run until the runner is started again, and with
    /// [`RunnerError::Abandoned`] if the runner is dropped first.
    pub fn done(
        &self,
    ) -> impl Future<Output = Result<Message, RunnerError>> + Send + 'static
    {
        let mut outcome_rx = self.outcome_tx.subscribe();
        async move {
            let outcome = match outcome_rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone(),
                Err(_) => return Err(RunnerError::Abandoned),
            };
            match outcome {
                Some(outcome) => outcome.into_result(),
                None => Err(RunnerError::Abandoned),
            }
        }
    }

    /// Executes the tools requested by the last message of the history.
    ///
    /// Returns `None` unless the last message is an assistant message with
    /// `tool_use` blocks. The result is cached until the parameters change.
    pub async fn generate_tool_response(&self) -> Option<MessageParam> {
        let (tools, calls, revision) = {
            let slot = self.handle.lock();
            if let Some(cached) = &slot.tool_response {
                return cached.clone();
            }
            let calls: Vec<_> = slot
                .params
                .messages
                .last()
                .filter(|message| message.role == Role::Assistant)
                .map(|message| message.tool_uses().cloned().collect())
                .unwrap_or_default();
            (slot.params.tools.clone(), calls, slot.revision)
        };

        let response = if calls.is_empty() {
            None
        } else {
            let cancel = self.options.signal.clone().unwrap_or_default();
            let results = tools.execute_all(&calls, &cancel).await;
            Some(MessageParam::user(results))
        };

        let mut slot = self.handle.lock();
        if slot.revision == revision {
            slot.tool_response = Some(response.clone());
        }
        response
    }

    /// Makes one model call with the current parameters.
    async fn start_iteration(
        &mut self,
    ) -> Result<(Step, Pending), RunnerError> {
        let (request, stream) = {
            let mut slot = self.handle.lock();
            slot.dirty = false;
            slot.tool_response = None;
            (slot.params.to_request(), slot.params.stream)
        };
        self.iteration += 1;
        debug!("starting iteration {}", self.iteration);

        let options = self.options.clone();
        if stream {
            let stream = self.client.stream(request, options).await?;
            Ok((Step::Stream(stream.clone()), Pending::Stream(stream)))
        } else {
            let message = self.client.create(request, options).await?;
            Ok((Step::Message(message.clone()), Pending::Message(message)))
        }
    }

    /// Folds the response into the history and runs the requested tools.
    ///
    /// Returns `true` if the loop should go on.
    async fn finish_iteration(
        &mut self,
        pending: Pending,
    ) -> Result<bool, RunnerError> {
        let message = match pending {
            Pending::Message(message) => message,
            Pending::Stream(stream) => stream.final_message().await?,
        };
        trace!("got a response: {message:?}");

        {
            let mut slot = self.handle.lock();
            if slot.dirty {
                debug!("parameters changed, dropping the response");
            } else {
                slot.push_own(MessageParam::assistant(message.content.clone()));
            }
        }
        self.last_response = Some(message);

        let tool_response = self
            .generate_tool_response()
            .instrument(debug_span!("tool response", iter = self.iteration))
            .await;

        let mut slot = self.handle.lock();
        let has_tool_response = tool_response.is_some();
        if let Some(tool_response) = tool_response {
            slot.push_own(tool_response);
        }
        Ok(has_tool_response || slot.dirty)
    }

    fn cap_reached(&self) -> bool {
        self.handle
            .lock()
            .params
            .max_iterations
            .is_some_and(|max| self.iteration >= max)
    }

    fn complete(&mut self) -> Result<(), RunnerError> {
        let Some(message) = self.last_response.clone() else {
            return Err(self.fail(RunnerError::NoResponse));
        };
        debug!("completed after {} iterations", self.iteration);
        self.state = RunnerState::Completed;
        self.outcome_tx.send_replace(Some(Outcome::Completed(message)));
        Ok(())
    }

    fn fail(&mut self, err: RunnerError) -> RunnerError {
        warn!("tool runner failed: {err}");
        self.state = RunnerState::Failed;
        self.outcome_tx.send_replace(Some(Outcome::Failed(err.clone())));
        err
    }
}

impl Debug for ToolRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRunner")
            .field("state", &self.state)
            .field("iteration", &self.iteration)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for ToolRunner {
    type Output = Result<Message, RunnerError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.run_until_done().await })
    }
}

/// The iterations of a [`ToolRunner`], produced one by one.
///
/// Each call to [`Steps::next`] first finishes the previous iteration
/// (appending the response and running the tools), then makes the next
/// model call.
pub struct Steps<'a> {
    runner: &'a mut ToolRunner,
    pending: Option<Pending>,
    finished: bool,
}

impl Steps<'_> {
    /// Returns the next model call, or `None` once the loop has ended.
    ///
    /// After an error is returned the loop is over and the runner may be
    /// started again.
    pub async fn next(&mut self) -> Option<Result<Step, RunnerError>> {
        if self.finished {
            return None;
        }
        match self.advance().await {
            Ok(Some(step)) => Some(Ok(step)),
            Ok(None) => {
                self.finished = true;
                self.runner.complete().err().map(Err)
            }
            Err(err) => {
                self.finished = true;
                Some(Err(self.runner.fail(err)))
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<Step>, RunnerError> {
        if let Some(pending) = self.pending.take() {
            if !self.runner.finish_iteration(pending).await? {
                return Ok(None);
            }
        }
        if self.runner.cap_reached() {
            debug!("iteration cap reached");
            return Ok(None);
        }
        let (step, pending) = self.runner.start_iteration().await?;
        self.pending = Some(pending);
        Ok(Some(step))
    }
}

impl Drop for Steps<'_> {
    fn drop(&mut self) {
        // An abandoned loop can be started over.
        if !self.finished {
            debug!("steps dropped before the loop ended");
            self.runner.state = RunnerState::Idle;
        }
    }
}

impl Debug for Steps<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Steps")
            .field("runner", &self.runner)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
