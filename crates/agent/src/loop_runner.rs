//! The conversation loop implementation.

use std::sync::Arc;
use cadence_config::AgentConfig;
use cadence_core::cancellation::CancellationToken;
use cadence_core::error::LlmError;
use cadence_core::message::{ContentBlock, Message, Session, ToolInvocation};
use cadence_core::provider::{Provider, ProviderRequest, ResponseBlock, Usage};
use cadence_core::tool::ToolCall;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::history;
use crate::loop_event::{LoopEvent, LoopEventKind};
use crate::recovery::ErrorRecovery;
use crate::scheduler::{ParallelScheduler, ToolResult};

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub system_prompt: Option<String>,
    pub max_iterations: u32,
    /// Cumulative token budget; unlimited when `None`
    pub max_tokens: Option<u64>,
    pub cancellation: Option<Arc<CancellationToken>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 50,
            max_tokens: None,
            cancellation: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_iterations: config.max_iterations,
            max_tokens: config.max_tokens,
            cancellation: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_tokens(mut self, max: u64) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    IterationLimit,
    TokenLimit,
    LlmError,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub iterations: u32,
    pub usage: Usage,
}

/// Event sink for one run: stamps every event with iteration and tokens.
struct Emitter<'a> {
    tx: &'a mpsc::Sender<LoopEvent>,
    iteration: u32,
    usage: Usage,
}

impl Emitter<'_> {
    async fn emit(&self, kind: LoopEventKind) {
        let event = LoopEvent::new(kind, self.iteration, self.usage.total_tokens);
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(event).await;
    }

    fn add_usage(&mut self, usage: Usage) {
        self.usage.prompt_tokens += usage.prompt_tokens;
        self.usage.completion_tokens += usage.completion_tokens;
        self.usage.total_tokens += usage.total_tokens;
    }
}

/// Drives one session: LLM call → tool calls → results → next turn.
pub struct ConversationLoop {
    provider: Arc<dyn Provider>,
    scheduler: ParallelScheduler,
    recovery: ErrorRecovery,
}

impl ConversationLoop {
    pub fn new(provider: Arc<dyn Provider>, scheduler: ParallelScheduler) -> Self {
        Self {
            provider,
            scheduler,
            recovery: ErrorRecovery::new(),
        }
    }

    /// Replace the recovery advisor used to classify failed tool results.
    pub fn with_recovery(mut self, recovery: ErrorRecovery) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn scheduler(&self) -> &ParallelScheduler {
        &self.scheduler
    }

    /// Run the loop for one user input, sending events to `events`.
    ///
    /// Appends to `session.messages` and `session.tool_history`. The final
    /// event is always `finished`.
    pub async fn run(
        &self,
        session: &mut Session,
        user_input: &str,
        options: &RunOptions,
        events: &mpsc::Sender<LoopEvent>,
    ) -> RunSummary {
        info!(
            session_id = %session.id,
            messages = session.messages.len(),
            "Starting conversation loop"
        );

        session.push(Message::user(user_input));

        let cancel = options.cancellation.as_deref();
        let tool_schemas = self.scheduler.tools().list_definitions();
        let mut out = Emitter {
            tx: events,
            iteration: 0,
            usage: Usage::default(),
        };

        let stop_reason = loop {
            if let Some(token) = cancel.filter(|t| t.is_cancelled()) {
                out.emit(LoopEventKind::Cancelled { cancel_reason: token.reason() }).await;
                break StopReason::Cancelled;
            }

            if out.iteration >= options.max_iterations {
                warn!(
                    session_id = %session.id,
                    iterations = out.iteration,
                    "Max iterations reached"
                );
                out.emit(LoopEventKind::IterationLimitReached {
                    max_iterations: options.max_iterations,
                })
                .await;
                break StopReason::IterationLimit;
            }

            out.iteration += 1;

            let messages = history::to_wire(&session.messages, options.system_prompt.as_deref());
            info!(
                iteration = out.iteration,
                messages = messages.len(),
                estimated_tokens = history::estimate_tokens(&messages),
                "Sending request to LLM"
            );

            let request = ProviderRequest {
                messages,
                tools: tool_schemas.clone(),
            };

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    let err = LlmError::classify(e);
                    warn!(
                        kind = %err.kind,
                        retryable = err.retryable,
                        error = %err.message,
                        "LLM request failed"
                    );
                    out.emit(LoopEventKind::LlmError {
                        error_type: err.kind,
                        error_message: err.message,
                        retryable: err.retryable,
                        status_code: err.status_code,
                    })
                    .await;
                    break StopReason::LlmError;
                }
            };

            if let Some(usage) = response.usage {
                out.add_usage(usage);
            }

            if let Some(max_tokens) = options.max_tokens {
                if out.usage.total_tokens > max_tokens {
                    warn!(
                        total_tokens = out.usage.total_tokens,
                        max_tokens, "Token budget exceeded"
                    );
                    out.emit(LoopEventKind::TokenLimitReached { max_tokens }).await;
                    break StopReason::TokenLimit;
                }
            }

            let mut blocks = Vec::with_capacity(response.content.len());
            let mut calls = Vec::new();
            for block in response.content {
                match block {
                    ResponseBlock::Text { text } => {
                        out.emit(LoopEventKind::Text { content: text.clone() }).await;
                        blocks.push(ContentBlock::Text { text });
                    }
                    ResponseBlock::ToolUse { id, name, input } => {
                        out.emit(LoopEventKind::ToolCall {
                            tool_id: id.clone(),
                            tool_name: name.clone(),
                            arguments: input.clone(),
                        })
                        .await;
                        calls.push(ToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: input.clone(),
                        });
                        blocks.push(ContentBlock::ToolUse { id, name, input });
                    }
                }
            }

            session.push(Message::assistant(blocks));

            if calls.is_empty() {
                break StopReason::Completed;
            }

            debug!(tool_count = calls.len(), "Executing tool calls");
            let results = self.scheduler.execute(&calls, cancel).await;

            let mut result_blocks = Vec::with_capacity(results.len());
            for (call, result) in calls.iter().zip(results) {
                self.emit_tool_result(&out, call, &result).await;
                session.tool_history.push(ToolInvocation {
                    tool_use_id: result.tool_use_id.clone(),
                    tool_name: result.tool_name.clone(),
                    arguments: call.arguments.clone(),
                    result: result.result.clone(),
                    is_error: result.is_error,
                    was_cached: result.was_cached,
                    timestamp: Utc::now(),
                });
                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: result.tool_use_id,
                    content: result.result,
                    is_error: result.is_error,
                });
            }
            session.push(Message::tool_results(result_blocks));

            if let Some(token) = cancel.filter(|t| t.is_cancelled()) {
                out.emit(LoopEventKind::Cancelled { cancel_reason: token.reason() }).await;
                break StopReason::Cancelled;
            }
        };

        out.emit(LoopEventKind::Finished { usage: out.usage }).await;
        info!(
            session_id = %session.id,
            iterations = out.iteration,
            total_tokens = out.usage.total_tokens,
            stop_reason = ?stop_reason,
            "Conversation loop finished"
        );

        RunSummary {
            stop_reason,
            iterations: out.iteration,
            usage: out.usage,
        }
    }

    async fn emit_tool_result(&self, out: &Emitter<'_>, call: &ToolCall, result: &ToolResult) {
        if result.permission_denied {
            out.emit(LoopEventKind::PermissionDenied {
                tool_id: result.tool_use_id.clone(),
                tool_name: result.tool_name.clone(),
                content: result.result.clone(),
            })
            .await;
            return;
        }

        if result.was_cached {
            out.emit(LoopEventKind::CacheHit {
                tool_id: result.tool_use_id.clone(),
                tool_name: result.tool_name.clone(),
            })
            .await;
        }

        let action = result
            .failure
            .as_ref()
            .map(|f| self.recovery.handle_tool_error(&call.name, f, &call.arguments));

        out.emit(LoopEventKind::ToolResult {
            tool_id: result.tool_use_id.clone(),
            tool_name: result.tool_name.clone(),
            content: result.result.clone(),
            is_error: result.is_error,
            cached: result.was_cached,
            error_type: action.as_ref().map(|a| a.error_type.to_string()),
            retryable: action.as_ref().map(|a| a.should_retry),
            suggestions: action.map(|a| a.suggestions).unwrap_or_default(),
        })
        .await;
    }

    /// Run to completion, collecting every event.
    pub async fn run_collect(
        &self,
        session: &mut Session,
        user_input: &str,
        options: &RunOptions,
    ) -> (Vec<LoopEvent>, RunSummary) {
        let (tx, mut rx) = mpsc::channel(128);
        let run = async move {
            let summary = self.run(session, user_input, options, &tx).await;
            drop(tx);
            summary
        };
        let drain = async {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        };
        let (summary, events) = tokio::join!(run, drain);
        (events, summary)
    }

    /// Spawn the loop and stream its events.
    ///
    /// Drain the receiver before awaiting the handle; the channel is bounded.
    pub fn run_stream(
        self: Arc<Self>,
        mut session: Session,
        user_input: String,
        options: RunOptions,
    ) -> (mpsc::Receiver<LoopEvent>, JoinHandle<(Session, RunSummary)>) {
        let (tx, rx) = mpsc::channel(128);
        let handle = tokio::spawn(async move {
            let summary = self.run(&mut session, &user_input, &options, &tx).await;
            (session, summary)
        });
        (rx, handle)
    }
}
