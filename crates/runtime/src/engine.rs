//! The conversation engine: drives model turns and tool calls for one query.
//!
//! Each query runs a small state machine:
//!
//! - `AwaitingModel`: send the history and the tool catalog to the model.
//! - `HandlingResponse`: walk the returned blocks in order. Text is
//!   reported and buffered. The first tool use flushes the buffered
//!   assistant message, runs the tool, appends its result, and goes back
//!   to `AwaitingModel`; any blocks after it in the same response are
//!   dropped. A response without a tool use is the final answer.
//! - `Done`: hand the transcript back.

use tracing::{debug, warn};

use crate::model::{
    Backend, ContentBlock, Message, ModelRequest, ResponseBlock, Role, ToolResult, ToolUse, Usage,
};
use crate::tools::ToolHost;
use crate::{Error, Result};

/// Something the caller may want to show while a query runs.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// A text block from the model, in response order.
    Text(&'a str),
    /// The model asked for a tool; about to dispatch it.
    ToolCall(&'a ToolUse),
    /// The tool finished (or failed) and its result joins the history.
    ToolResult {
        call: &'a ToolUse,
        result: &'a ToolResult,
    },
}

type EventHandler = Box<dyn Fn(&EngineEvent<'_>) + Send + Sync>;

/// Engine tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Maximum model calls per query. `None` means unlimited.
    pub max_turns: Option<usize>,
}

/// Why a query stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without asking for a tool.
    Answered,
    /// The model returned no content.
    EmptyResponse,
    /// `max_turns` model calls were made and another was needed.
    TurnLimit,
}

/// The full exchange for one query.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub messages: Vec<Message>,
    pub stop: StopReason,
    /// Number of model calls made.
    pub turns: usize,
    pub usage: Usage,
}

impl Transcript {
    /// Text of the final assistant message, if the model answered.
    pub fn answer(&self) -> Option<String> {
        match self.stop {
            StopReason::Answered => self
                .messages
                .last()
                .filter(|m| m.role == Role::Assistant)
                .map(Message::text),
            _ => None,
        }
    }
}

enum State {
    AwaitingModel,
    HandlingResponse(Vec<ResponseBlock>),
    Done(StopReason),
}

/// Runs queries against a model backend with tools from a [`ToolHost`].
pub struct ConversationEngine<B, H> {
    backend: B,
    tools: H,
    options: EngineOptions,
    on_event: Option<EventHandler>,
}

impl<B: Backend, H: ToolHost> ConversationEngine<B, H> {
    pub fn new(backend: B, tools: H) -> Self {
        Self {
            backend,
            tools,
            options: EngineOptions::default(),
            on_event: None,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a callback for text and tool activity as it happens.
    pub fn on_event(mut self, handler: impl Fn(&EngineEvent<'_>) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(handler));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer one user query, calling tools as the model requests them.
    ///
    /// The history starts fresh for every query. Tool failures become error
    /// results in the history; only a failed model call aborts.
    pub async fn process_query(&self, query: &str) -> Result<Transcript> {
        let mut messages = vec![Message::user(query)];
        let mut usage = Usage::default();
        let mut turns = 0;
        let mut state = State::AwaitingModel;

        loop {
            state = match state {
                State::AwaitingModel => {
                    if self.options.max_turns.is_some_and(|max| turns >= max) {
                        warn!(turns, "turn limit reached, stopping");
                        State::Done(StopReason::TurnLimit)
                    } else {
                        check_tool_pairing(&messages)?;
                        let response = self
                            .backend
                            .call(ModelRequest {
                                messages: &messages,
                                tools: self.tools.specs(),
                            })
                            .await?;
                        turns += 1;
                        usage += response.usage;
                        State::HandlingResponse(response.blocks)
                    }
                }
                State::HandlingResponse(blocks) => self.handle_response(blocks, &mut messages).await,
                State::Done(stop) => {
                    debug!(turns, ?stop, messages = messages.len(), "query finished");
                    return Ok(Transcript {
                        messages,
                        stop,
                        turns,
                        usage,
                    });
                }
            };
        }
    }

    async fn handle_response(&self, blocks: Vec<ResponseBlock>, messages: &mut Vec<Message>) -> State {
        if blocks.is_empty() {
            debug!("model returned no content");
            return State::Done(StopReason::EmptyResponse);
        }

        let mut pending = Vec::with_capacity(blocks.len());
        let mut blocks = blocks.into_iter();

        while let Some(block) = blocks.next() {
            match block {
                ResponseBlock::Text(text) => {
                    self.emit(&EngineEvent::Text(&text));
                    pending.push(ContentBlock::Text { text });
                }
                ResponseBlock::ToolUse(call) => {
                    self.emit(&EngineEvent::ToolCall(&call));
                    pending.push(ContentBlock::ToolUse(call.clone()));
                    messages.push(Message::assistant(pending));

                    let result = self.run_tool(&call).await;
                    self.emit(&EngineEvent::ToolResult {
                        call: &call,
                        result: &result,
                    });
                    messages.push(Message::tool_result(result));

                    let dropped = blocks.len();
                    if dropped > 0 {
                        debug!(dropped, "ignoring blocks after the first tool use");
                    }
                    return State::AwaitingModel;
                }
            }
        }

        messages.push(Message::assistant(pending));
        State::Done(StopReason::Answered)
    }

    async fn run_tool(&self, call: &ToolUse) -> ToolResult {
        debug!(tool = %call.name, id = %call.id, "calling tool");
        match self.tools.execute(call).await {
            Ok(output) => ToolResult::success(&call.id, output),
            Err(e) => {
                warn!(tool = %call.name, reason = e.reason(), error = %e, "tool call failed");
                ToolResult::error(&call.id, format!("Error: {e}"))
            }
        }
    }

    fn emit(&self, event: &EngineEvent<'_>) {
        if let Some(handler) = &self.on_event {
            handler(event);
        }
    }
}

/// Check that every tool use is answered by exactly one tool result in the
/// message right after it, and that no result is orphaned.
pub fn check_tool_pairing(messages: &[Message]) -> Result<()> {
    let mut open: Vec<&str> = Vec::new();

    for message in messages {
        match message.role {
            Role::Assistant => {
                if let Some(id) = open.first() {
                    return Err(Error::Protocol(format!("tool_use {id} has no tool_result")));
                }
                if message.tool_results().next().is_some() {
                    return Err(Error::Protocol(
                        "tool_result in an assistant message".into(),
                    ));
                }
                for call in message.tool_uses() {
                    if open.contains(&call.id.as_str()) {
                        return Err(Error::Protocol(format!("duplicate tool_use id {}", call.id)));
                    }
                    open.push(&call.id);
                }
            }
            Role::User => {
                for result in message.tool_results() {
                    let Some(position) = open.iter().position(|id| *id == result.tool_use_id)
                    else {
                        return Err(Error::Protocol(format!(
                            "tool_result {} does not answer a pending tool_use",
                            result.tool_use_id
                        )));
                    };
                    open.remove(position);
                }
                if let Some(id) = open.first() {
                    return Err(Error::Protocol(format!("tool_use {id} has no tool_result")));
                }
            }
        }
    }

    match open.first() {
        Some(id) => Err(Error::Protocol(format!("tool_use {id} has no tool_result"))),
        None => Ok(()),
    }
}
