use serde_json::Value;
use tether_core::permission::PermissionEngine;
use tether_core::tool::Approval as ToolApproval;
use tether_core::{
    ModelClient, RunnerError, RunnerParams, Step, Tool, ToolRegistry,
    ToolRunner,
};
use tether_model::{
    Message, MessageParam, ModelProvider, RequestOptions, Role, ToolChoice,
};
use tether_transcript::{
    ConversationEntry, PromptCacheConfig, SystemEntry, ToolContext,
    normalize_messages_for_api, remove_orphan_tool_uses,
    reorder_tool_use_and_hook_messages, split_message_blocks,
};

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    client: ModelClient,
    model: String,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    tool_choice: Option<ToolChoice>,
    max_tokens: u32,
    max_iterations: Option<u32>,
    stream: bool,
    options: RequestOptions,
    prompt_cache: PromptCacheConfig,
    history: Vec<ConversationEntry>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            client: ModelClient::new(provider),
            model: String::new(),
            system_prompt: None,
            tools: ToolRegistry::default(),
            tool_choice: None,
            max_tokens: RunnerParams::DEFAULT_MAX_TOKENS,
            max_iterations: None,
            stream: false,
            options: RequestOptions::new(),
            prompt_cache: PromptCacheConfig::default(),
            history: Vec::new(),
        }
    }

    /// Sets the model to sample from.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Adds a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Replaces the tool set. Permission settings are taken from `tools`.
    #[inline]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Sets how the model should use the tools.
    #[inline]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Sets the engine consulted before every tool call.
    #[inline]
    pub fn with_permission_engine<E: PermissionEngine + 'static>(
        mut self,
        engine: E,
    ) -> Self {
        self.tools.set_permission_engine(engine);
        self
    }

    /// Attaches a callback to be invoked when a tool call needs approval.
    #[inline]
    pub fn on_tool_call_request(
        mut self,
        on_tool_call_request: impl Fn(ToolApproval) + Send + Sync + 'static,
    ) -> Self {
        self.tools.on_request(on_tool_call_request);
        self
    }

    /// Sets the token budget of each model call.
    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Caps the number of model calls per message.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Enables or disables streaming.
    #[inline]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the options of every model call.
    #[inline]
    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the prompt caching switches.
    #[inline]
    pub fn with_prompt_cache(mut self, config: PromptCacheConfig) -> Self {
        self.prompt_cache = config;
        self
    }

    /// Resumes from a previously recorded transcript.
    #[inline]
    pub fn with_history(mut self, entries: Vec<ConversationEntry>) -> Self {
        self.history = entries;
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        Session {
            client: self.client,
            model: self.model,
            system_prompt: self.system_prompt,
            tools: self.tools,
            tool_choice: self.tool_choice,
            max_tokens: self.max_tokens,
            max_iterations: self.max_iterations,
            stream: self.stream,
            options: self.options,
            prompt_cache: self.prompt_cache,
            entries: self.history,
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// Every message runs a fresh [`ToolRunner`] over the conversation so far.
/// The session records what happened as [`ConversationEntry`]s, which is
/// the source of truth both for rendering and for the next model call.
pub struct Session {
    client: ModelClient,
    model: String,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    tool_choice: Option<ToolChoice>,
    max_tokens: u32,
    max_iterations: Option<u32>,
    stream: bool,
    options: RequestOptions,
    prompt_cache: PromptCacheConfig,
    entries: Vec<ConversationEntry>,
}

impl Session {
    /// Sends a message and runs the tool loop to completion.
    ///
    /// Returns the last response of the model. On failure the history made
    /// so far is kept, followed by an `api_error` entry.
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<Message, RunnerError> {
        self.entries.push(ConversationEntry::user(message));
        let messages = self.resume_messages();
        let base = messages.len();

        let mut params = RunnerParams::builder(self.model.as_str())
            .with_messages(messages)
            .with_tools(self.tools.clone())
            .with_max_tokens(self.max_tokens)
            .with_stream(self.stream);
        if let Some(system_prompt) = &self.system_prompt {
            params = params.with_system(system_prompt.as_str());
        }
        if let Some(tool_choice) = &self.tool_choice {
            params = params.with_tool_choice(tool_choice.clone());
        }
        if let Some(max_iterations) = self.max_iterations {
            params = params.with_max_iterations(max_iterations);
        }

        let mut runner = ToolRunner::with_client(
            self.client.clone(),
            params.build(),
            self.options.clone(),
        );
        let (responses, result) = drive(&mut runner).await;

        let history = runner.messages();
        self.record(history.get(base..).unwrap_or_default(), &responses);
        if let Err(err) = &result {
            self.entries.push(api_error_entry(err));
        }
        result
    }

    fn record(&mut self, added: &[MessageParam], responses: &[Message]) {
        let mut responses = responses.iter();
        for param in added {
            let response = match param.role {
                Role::Assistant => responses.next(),
                Role::User => None,
            };
            let entry = match response {
                Some(response) => ConversationEntry::from_response(response),
                None => ConversationEntry::from_param(param),
            };
            self.entries.push(entry);
        }
        trace!("session has {} entries", self.entries.len());
    }

    /// Returns the raw entries recorded so far.
    #[inline]
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Returns the canonical transcript for rendering or storage: one block
    /// per entry, each tool call followed by its hooks and result.
    pub fn transcript(&self) -> Vec<ConversationEntry> {
        let split = split_message_blocks(&self.entries);
        reorder_tool_use_and_hook_messages(&split, &[])
    }

    /// Returns the history to send to the model, with incomplete tool calls
    /// removed and cache markers applied.
    pub fn resume_messages(&self) -> Vec<MessageParam> {
        let resumable = remove_orphan_tool_uses(&self.entries);
        let marker = self.prompt_cache.marker_for(&self.model);
        normalize_messages_for_api(&resumable, marker.as_ref())
    }

    /// Returns the lookup tables over the transcript.
    pub fn tool_context(&self) -> ToolContext {
        let split = split_message_blocks(&self.entries);
        ToolContext::build(&split, &self.entries)
    }

    /// Serializes the raw entries, one JSON object per line.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Runs the loop and collects every response in order.
async fn drive(
    runner: &mut ToolRunner,
) -> (Vec<Message>, Result<Message, RunnerError>) {
    let mut taken = Vec::new();
    let mut failure = None;
    match runner.steps() {
        Ok(mut steps) => {
            while let Some(step) = steps.next().await {
                match step {
                    Ok(step) => taken.push(step),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }
        Err(err) => failure = Some(err),
    }

    let mut responses = Vec::with_capacity(taken.len());
    for step in taken {
        let message = match step {
            Step::Message(message) => Some(message),
            // Already drained by the loop.
            Step::Stream(stream) => stream.final_message().await.ok(),
        };
        responses.extend(message);
    }
    let result = match failure {
        Some(err) => Err(err),
        None => runner.done().await,
    };
    (responses, result)
}

fn api_error_entry(err: &RunnerError) -> ConversationEntry {
    let mut entry = ConversationEntry::system(SystemEntry::API_ERROR);
    if let ConversationEntry::System(inner) = &mut entry {
        inner.level = Some("error".to_owned());
        inner.content = Some(Value::String(err.to_string()));
    }
    entry
}
