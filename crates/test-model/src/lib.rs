//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use pin_project_lite::pin_project;
use tether_model::{
    ContentBlock, ErrorKind, Message, ModelProvider, ModelProviderError,
    ModelRequest, ModelStream, RequestOptions, StopReason, StreamEvent, Usage,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// The error returned by [`TestModelProvider`].
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pin_project! {
    /// The streaming response of [`TestModelProvider`].
    ///
    /// Every event is delivered after the provider's delay.
    pub struct TestModelStream {
        events: VecDeque<StreamEvent>,
        message: Message,
        delay: Duration,
        #[pin]
        sleep: Option<Sleep>,
        finished: bool,
    }
}

impl ModelStream for TestModelStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let mut this = self.project();
        loop {
            if let Some(timer) = this.sleep.as_mut().as_pin_mut() {
                ready!(timer.poll(cx));
                this.sleep.set(None);

                let event = this.events.pop_front();
                if event.is_none() {
                    *this.finished = true;
                }
                return Poll::Ready(Ok(event));
            }
            if *this.finished {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
            this.sleep.set(Some(sleep(*this.delay)));
        }
    }

    fn final_message(&self) -> Option<Message> {
        self.finished.then(|| self.message.clone())
    }
}

#[derive(Default)]
struct State {
    script: Vec<PresetResponse>,
    cursor: usize,
    attempts: u64,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each call. Responses are consumed in order, one
/// per successful call. If the script is exhausted, an error is returned.
///
/// Clones share the same script and request log, so a test can hand one
/// clone to the code under test and inspect the calls through another.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    state: Arc<Mutex<State>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Creates a provider with an empty script.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.state().script.push(preset);
    }

    /// Sets the latency of each call and of each streamed event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, failed attempts included.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.state().requests.clone()
    }

    /// Returns the number of calls received so far.
    #[inline]
    pub fn call_count(&self) -> usize {
        self.state().requests.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delay(&self) -> Duration {
        self.delay.unwrap_or(Duration::from_millis(1))
    }

    fn next_response(&self, req: &ModelRequest) -> Result<Message, Error> {
        let mut state = self.state();
        state.requests.push(req.clone());

        let idx = state.cursor;
        let Some(preset) = state.script.get(idx).cloned() else {
            return Err(Error {
                message: "script exhausted",
                kind: ErrorKind::Other,
            });
        };

        match preset.failures {
            Some(0) => {
                return Err(Error {
                    message: "injected failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            Some(failures) if state.attempts < failures => {
                state.attempts += 1;
                return Err(Error {
                    message: "injected failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            _ => {}
        }
        state.cursor += 1;
        state.attempts = 0;

        let stop_reason = if preset.has_tool_use() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        let mut message =
            Message::new(format!("msg_{idx}"), &req.model, preset.content())
                .with_stop_reason(stop_reason);
        message.usage = Usage {
            input_tokens: req.messages.len() as u64,
            output_tokens: preset.events.len() as u64,
        };
        Ok(message)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Stream = TestModelStream;

    fn create(
        &self,
        req: &ModelRequest,
        _opts: &RequestOptions,
    ) -> impl Future<Output = Result<Message, Self::Error>> + Send + 'static
    {
        let result = self.next_response(req);
        let delay = self.delay();
        async move {
            sleep(delay).await;
            result
        }
    }

    fn stream(
        &self,
        req: &ModelRequest,
        _opts: &RequestOptions,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let delay = self.delay();
        let result = self.next_response(req).map(|message| {
            let mut events = VecDeque::new();
            events.push_back(StreamEvent::MessageStart {
                id: message.id.clone(),
                model: message.model.clone(),
            });
            for block in &message.content {
                match block {
                    ContentBlock::Text { text, .. } => {
                        events.push_back(StreamEvent::TextDelta {
                            text: text.clone(),
                        });
                    }
                    block => events.push_back(StreamEvent::ContentBlock {
                        block: block.clone(),
                    }),
                }
            }
            let stop_reason =
                message.stop_reason.unwrap_or(StopReason::EndTurn);
            events.push_back(StreamEvent::Completed { stop_reason });
            TestModelStream {
                events,
                message,
                delay,
                sleep: None,
                finished: false,
            }
        });
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use tether_model::{MessageParam, ToolDefinition};

    use super::*;

    fn request(messages: Vec<MessageParam>) -> ModelRequest {
        ModelRequest {
            model: "test".to_owned(),
            system: None,
            messages,
            tools: vec![ToolDefinition {
                name: "read_file".to_owned(),
                description: "Reads a file".to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "The name of the file to read"
                        }
                    }
                }),
            }],
            tool_choice: None,
            max_tokens: 64,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create() {
        let mut provider = TestModelProvider::new();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Hello, "),
            PresetEvent::text("world!"),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Sure, let me take a look."),
            PresetEvent::tool_use(
                "tool:1",
                "read_file",
                json!({ "filename": "todo.txt" }),
            ),
        ]));

        let opts = RequestOptions::new();
        let mut messages = vec![MessageParam::user("Hi")];
        let msg = provider.create(&request(messages.clone()), &opts).await;
        let msg = msg.unwrap();
        assert_eq!(msg.text(), "Hello, world!");
        assert_eq!(msg.stop_reason, Some(StopReason::EndTurn));

        messages.push(MessageParam::assistant(msg.content));
        messages.push(MessageParam::user("Check my todo"));
        let msg = provider.create(&request(messages), &opts).await.unwrap();
        assert_eq!(msg.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(
            msg.content[1],
            ContentBlock::tool_use(
                "tool:1",
                "read_file",
                json!({ "filename": "todo.txt" })
            )
        );
        assert_eq!(provider.call_count(), 2);

        let err = provider
            .create(&request(vec![]), &opts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures() {
        let mut provider = TestModelProvider::new();
        provider.add_response(PresetResponse::text("ok").with_failures(2));

        let opts = RequestOptions::new();
        for _ in 0..2 {
            let err = provider
                .create(&request(vec![]), &opts)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let msg = provider.create(&request(vec![]), &opts).await.unwrap();
        assert_eq!(msg.text(), "ok");
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream() {
        let mut provider = TestModelProvider::new();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Looking"),
            PresetEvent::tool_use("t1", "read_file", json!({})),
        ]));

        let stream = provider
            .stream(&request(vec![]), &RequestOptions::new())
            .await
            .unwrap();
        let mut stream = pin!(stream);
        assert!(stream.final_message().is_none());

        let mut kinds = vec![];
        while let Some(event) =
            poll_fn(|cx| stream.as_mut().poll_next_event(cx))
                .await
                .unwrap()
        {
            kinds.push(match event {
                StreamEvent::MessageStart { .. } => "start",
                StreamEvent::TextDelta { .. } => "text",
                StreamEvent::ContentBlock { .. } => "block",
                StreamEvent::Completed { .. } => "completed",
            });
        }
        assert_eq!(kinds, ["start", "text", "block", "completed"]);

        let msg = stream.final_message().unwrap();
        assert_eq!(msg.id, "msg_0");
        assert!(msg.has_tool_use());
    }
}
