use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tether_model::{MessageParam, ModelRequest, ToolChoice};

use crate::tool::ToolRegistry;

/// Parameters of a [`ToolRunner`](crate::ToolRunner).
#[derive(Clone, Debug)]
pub struct RunnerParams {
    /// The model to sample from.
    pub model: String,
    /// The system prompt.
    pub system: Option<String>,
    /// The conversation so far. The runner appends to it.
    pub messages: Vec<MessageParam>,
    /// The tools offered to the model.
    pub tools: ToolRegistry,
    /// How the model should use the tools.
    pub tool_choice: Option<ToolChoice>,
    /// Token budget of each model call.
    pub max_tokens: u32,
    /// Maximum number of model calls. Reaching it ends the loop normally.
    pub max_iterations: Option<u32>,
    /// Whether model calls are streamed.
    pub stream: bool,
}

impl RunnerParams {
    /// Token budget used when none is given.
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    /// Creates a builder for the given model.
    #[inline]
    pub fn builder<S: Into<String>>(model: S) -> RunnerParamsBuilder {
        RunnerParamsBuilder {
            params: RunnerParams {
                model: model.into(),
                system: None,
                messages: Vec::new(),
                tools: ToolRegistry::default(),
                tool_choice: None,
                max_tokens: Self::DEFAULT_MAX_TOKENS,
                max_iterations: None,
                stream: false,
            },
        }
    }

    /// Builds the request for the next model call.
    pub(crate) fn to_request(&self) -> ModelRequest {
        ModelRequest {
            model: self.model.clone(),
            system: self.system.clone(),
            messages: self.messages.clone(),
            tools: self.tools.definitions(),
            tool_choice: self.tool_choice.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

/// Builder for [`RunnerParams`].
#[derive(Clone, Debug)]
pub struct RunnerParamsBuilder {
    params: RunnerParams,
}

impl RunnerParamsBuilder {
    /// Sets the system prompt.
    #[inline]
    pub fn with_system<S: Into<String>>(mut self, system: S) -> Self {
        self.params.system = Some(system.into());
        self
    }

    /// Sets the conversation history.
    #[inline]
    pub fn with_messages(mut self, messages: Vec<MessageParam>) -> Self {
        self.params.messages = messages;
        self
    }

    /// Appends one message to the history.
    #[inline]
    pub fn with_message(mut self, message: MessageParam) -> Self {
        self.params.messages.push(message);
        self
    }

    /// Sets the tools.
    #[inline]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.params.tools = tools;
        self
    }

    /// Sets the tool choice.
    #[inline]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.params.tool_choice = Some(tool_choice);
        self
    }

    /// Sets the token budget of each call.
    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    /// Caps the number of model calls.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.params.max_iterations = Some(max_iterations);
        self
    }

    /// Enables or disables streaming.
    #[inline]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.params.stream = stream;
        self
    }

    /// Builds the parameters.
    #[inline]
    pub fn build(self) -> RunnerParams {
        self.params
    }
}

#[derive(Debug)]
pub(super) struct ParamsSlot {
    pub params: RunnerParams,
    /// Set by any change made from outside the loop.
    pub dirty: bool,
    /// The tool response computed for the current history, if any.
    pub tool_response: Option<Option<MessageParam>>,
    /// Bumped on every change to the parameters.
    pub revision: u64,
}

impl ParamsSlot {
    /// Appends a message produced by the loop itself.
    pub fn push_own(&mut self, message: MessageParam) {
        self.params.messages.push(message);
        self.tool_response = None;
        self.revision += 1;
    }
}

/// A handle to the parameters of a running [`ToolRunner`].
///
/// The handle can be moved to another task and used while the runner is
/// waiting on the model. Every change marks the parameters as modified,
/// which makes the runner discard the response it is waiting for and
/// issue another call with the new parameters.
///
/// [`ToolRunner`]: crate::ToolRunner
#[derive(Clone, Debug)]
pub struct ParamsHandle {
    slot: Arc<Mutex<ParamsSlot>>,
}

impl ParamsHandle {
    pub(super) fn new(params: RunnerParams) -> Self {
        let slot = ParamsSlot {
            params,
            dirty: false,
            tool_response: None,
            revision: 0,
        };
        Self {
            slot: Arc::new(Mutex::new(slot)),
        }
    }

    #[inline]
    pub(super) fn lock(&self) -> MutexGuard<'_, ParamsSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify<R>(&self, f: impl FnOnce(&mut RunnerParams) -> R) -> R {
        let mut slot = self.lock();
        slot.dirty = true;
        slot.tool_response = None;
        slot.revision += 1;
        f(&mut slot.params)
    }

    /// Returns a snapshot of the parameters.
    #[inline]
    pub fn params(&self) -> RunnerParams {
        self.lock().params.clone()
    }

    /// Returns a snapshot of the message history.
    #[inline]
    pub fn messages(&self) -> Vec<MessageParam> {
        self.lock().params.messages.clone()
    }

    /// Replaces the parameters.
    #[inline]
    pub fn set_params(&self, params: RunnerParams) {
        self.modify(|current| *current = params);
    }

    /// Changes the parameters in place.
    #[inline]
    pub fn update_params<F: FnOnce(&mut RunnerParams)>(&self, f: F) {
        self.modify(f);
    }

    /// Appends messages to the history.
    pub fn push_messages<I>(&self, messages: I)
    where
        I: IntoIterator<Item = MessageParam>,
    {
        self.modify(|params| params.messages.extend(messages));
    }
}
