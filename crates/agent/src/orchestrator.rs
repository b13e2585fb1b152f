//! The conversation loop.
//!
//! One iteration assembles the cached context, asks the model for one
//! turn, appends it, and executes its tool calls. All results of a turn go
//! back in a single user turn whose leading blocks answer the tool uses in
//! order. The loop ends when the model answers without tools, when it
//! emits the completion marker, or when a budget runs out.

use crate::outcome::{TerminalResult, TruncationReason};
use appforge_config::AppConfig;
use appforge_context::token::estimate_history_tokens;
use appforge_context::{AppType, AssemblyError, ContextAssembler};
use appforge_core::cache::ChangeObserver;
use appforge_core::event::{EventBus, ProgressEvent};
use appforge_core::message::{ContentBlock, Conversation, Role, Turn};
use appforge_core::provider::{Provider, StopReason, ThinkingConfig, TurnRequest};
use appforge_core::store::FileStore;
use appforge_core::tool::{ToolCallRecord, ToolContext};
use appforge_core::Error;
use appforge_tools::ToolEngine;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sent after a turn that hit the output limit.
pub const CONTINUATION_PROMPT: &str = "Your previous response was cut off by the output token limit. \
Continue from where you stopped. Any tool call that was cut off was not executed; issue it again in full.";

/// Stands in for an assistant turn whose only content was cut off.
const TRUNCATED_PLACEHOLDER: &str = "[response truncated]";

/// Per-run model and loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    /// Extended thinking budget; 0 disables thinking.
    pub thinking_budget: u32,
    pub max_iterations: u32,
    /// Assistant text containing this ends the run after its tools ran.
    /// Empty disables the marker.
    pub completion_marker: String,
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            thinking_budget: config.thinking_budget,
            max_iterations: config.agent.max_iterations,
            completion_marker: config.agent.completion_marker.clone(),
        }
    }

    fn thinking(&self) -> Option<ThinkingConfig> {
        (self.thinking_budget > 0).then_some(ThinkingConfig {
            budget_tokens: self.thinking_budget,
        })
    }

    fn marks_completion(&self, text: &str) -> bool {
        !self.completion_marker.is_empty() && text.contains(&self.completion_marker)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Drives conversations with the model to a terminal result.
///
/// One orchestrator serves many conversations; each `run` is sequential
/// within its conversation and independent of the others.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    assembler: Arc<ContextAssembler>,
    engine: Arc<ToolEngine>,
    store: Arc<dyn FileStore>,
    changes: Arc<dyn ChangeObserver>,
    settings: LoopSettings,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        assembler: Arc<ContextAssembler>,
        engine: Arc<ToolEngine>,
        store: Arc<dyn FileStore>,
        changes: Arc<dyn ChangeObserver>,
    ) -> Self {
        Self {
            provider,
            assembler,
            engine,
            store,
            changes,
            settings: LoopSettings::default(),
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Share a cancellation token; cancelling it stops every run before
    /// its next iteration.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start a conversation with a request and drive it to a terminal
    /// result.
    pub async fn run(&self, conversation: &mut Conversation, request: &str) -> Result<TerminalResult, Error> {
        self.run_with(conversation, request, None).await
    }

    /// Like [`run`](Self::run), for a follow-up request on an app whose
    /// type is already known.
    pub async fn run_with(
        &self,
        conversation: &mut Conversation,
        request: &str,
        current_app_type: Option<AppType>,
    ) -> Result<TerminalResult, Error> {
        conversation.push(Turn::user_text(request))?;
        self.assembler
            .open(&conversation.id, &conversation.workspace_id, request, current_app_type)
            .await;
        self.drive_guarded(conversation).await
    }

    /// Continue a truncated conversation from its history.
    ///
    /// A conversation stopped by the iteration limit stays at the limit;
    /// fork it with [`Conversation::resume_from`] for a fresh budget.
    pub async fn resume(&self, conversation: &mut Conversation) -> Result<TerminalResult, Error> {
        let request = conversation.initial_request().unwrap_or_default();
        if self.assembler.prediction(&conversation.id).await.is_none() {
            self.assembler
                .open(&conversation.id, &conversation.workspace_id, &request, None)
                .await;
        }
        if conversation.last_turn().is_none_or(|t| t.role == Role::Assistant) {
            conversation.push(Turn::user_text(CONTINUATION_PROMPT))?;
        }
        self.drive_guarded(conversation).await
    }

    async fn drive_guarded(&self, conversation: &mut Conversation) -> Result<TerminalResult, Error> {
        let result = self.drive(conversation).await;
        match &result {
            Ok(TerminalResult::Truncated { .. }) => {}
            Ok(_) => self.assembler.close(&conversation.id).await,
            Err(e) => {
                error!(conversation_id = %conversation.id, error = %e, "Conversation aborted");
                if !conversation.status().is_terminal() {
                    conversation.mark_failed()?;
                }
                self.assembler.close(&conversation.id).await;
            }
        }
        result
    }

    async fn drive(&self, conversation: &mut Conversation) -> Result<TerminalResult, Error> {
        let ctx = ToolContext::new(
            conversation.workspace_id.clone(),
            self.store.clone(),
            self.changes.clone(),
        );
        let tools = self.engine.registry().definitions();
        let max_iterations = self.settings.max_iterations;
        conversation.mark_running()?;

        info!(
            conversation_id = %conversation.id,
            workspace_id = %conversation.workspace_id,
            turns = conversation.turns().len(),
            "Running conversation"
        );

        loop {
            if self.cancel.is_cancelled() {
                info!(conversation_id = %conversation.id, "Conversation cancelled");
                conversation.mark_failed()?;
                return Ok(TerminalResult::Cancelled {
                    iterations: conversation.iteration_count(),
                });
            }

            if conversation.iteration_count() >= max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    max_iterations,
                    "Iteration limit reached, truncating"
                );
                return truncate(conversation, TruncationReason::IterationLimit);
            }

            // Components loaded on demand join the context from now on.
            let requested: Vec<String> = match ctx.requested_components.lock() {
                Ok(mut set) => std::mem::take(&mut *set).into_iter().collect(),
                Err(_) => Vec::new(),
            };
            if !requested.is_empty() {
                debug!(conversation_id = %conversation.id, components = ?requested, "Adding requested components");
                if let Err(e) = self.assembler.request_components(&conversation.id, &requested).await {
                    return fail(conversation, &e);
                }
            }

            let assembly = match self.assembler.assemble(&conversation.id).await {
                Ok(assembly) => assembly,
                Err(AssemblyError::OverBudget { total_tokens, max_tokens }) => {
                    warn!(
                        conversation_id = %conversation.id,
                        total_tokens,
                        max_tokens,
                        "Context over hard limit, truncating"
                    );
                    return truncate(conversation, TruncationReason::ContextBudget);
                }
                Err(e) => return fail(conversation, &e),
            };

            let history_tokens = estimate_history_tokens(conversation.turns());
            let max_tokens = self.assembler.budget().max_tokens;
            if assembly.report.total_tokens + history_tokens > max_tokens {
                warn!(
                    conversation_id = %conversation.id,
                    context_tokens = assembly.report.total_tokens,
                    history_tokens,
                    max_tokens,
                    "Context and history over hard limit, truncating"
                );
                return truncate(conversation, TruncationReason::ContextBudget);
            }

            let iteration = conversation.begin_iteration(max_iterations)?;
            debug!(
                conversation_id = %conversation.id,
                iteration,
                context_tokens = assembly.report.total_tokens,
                history_tokens,
                efficiency = assembly.report.efficiency,
                "Sending turn"
            );

            let request = TurnRequest {
                model: self.settings.model.clone(),
                context: assembly.blocks,
                tools: tools.clone(),
                history: conversation.turns().to_vec(),
                max_tokens: self.settings.max_tokens,
                thinking: self.settings.thinking(),
            };
            let reply = match self.provider.send_turn(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(
                        conversation_id = %conversation.id,
                        iteration,
                        error = %e,
                        "Model transport failed"
                    );
                    conversation.mark_failed()?;
                    return Ok(TerminalResult::Failed {
                        error: e.to_string(),
                        iterations: iteration,
                    });
                }
            };

            let tool_uses = reply
                .blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .count();
            self.events.publish(ProgressEvent::TurnCompleted {
                conversation_id: conversation.id.to_string(),
                iteration,
                stop_reason: reply.stop_reason.clone(),
                tool_calls: tool_uses,
                usage: reply.usage.clone(),
                cache_efficiency: assembly.report.efficiency,
                rebuilt_tiers: assembly.report.rebuilt_tiers.clone(),
                timestamp: Utc::now(),
            });
            info!(
                conversation_id = %conversation.id,
                iteration,
                stop_reason = ?reply.stop_reason,
                tool_calls = tool_uses,
                input_tokens = reply.usage.input_tokens,
                cache_read_tokens = reply.usage.cache_read_input_tokens,
                "Model turn complete"
            );

            if reply.stop_reason == StopReason::MaxTokens {
                // Tool uses in a cut-off turn may be incomplete; none of
                // them run, and the model re-issues what it still needs.
                let dropped = tool_uses;
                let mut blocks: Vec<ContentBlock> = reply
                    .blocks
                    .into_iter()
                    .filter(|b| !matches!(b, ContentBlock::ToolUse { .. }))
                    .collect();
                if !blocks.iter().any(|b| matches!(b, ContentBlock::Text { .. })) {
                    blocks.push(ContentBlock::text(TRUNCATED_PLACEHOLDER));
                }
                warn!(
                    conversation_id = %conversation.id,
                    iteration,
                    dropped_tool_calls = dropped,
                    "Turn hit the output limit, requesting continuation"
                );
                conversation.push(Turn::assistant(blocks))?;
                conversation.push(Turn::user_text(CONTINUATION_PROMPT))?;
                continue;
            }

            let turn = Turn::assistant(reply.blocks);
            let calls = turn.tool_calls();
            let text = turn.text();
            let finished = self.settings.marks_completion(&text);
            conversation.push(turn)?;

            if !calls.is_empty() {
                let records = self.engine.execute(&ctx, &conversation.id, &calls).await;
                let results: Vec<ContentBlock> = records.iter().map(ToolCallRecord::to_block).collect();
                for record in records {
                    conversation.record_tool_call(record)?;
                }
                conversation.push(Turn::tool_results(results, None))?;
            }

            if calls.is_empty() || finished {
                conversation.mark_completed()?;
                let text = text.replace(&self.settings.completion_marker, "").trim().to_string();
                info!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    tool_calls = conversation.tool_call_records().len(),
                    "Conversation complete"
                );
                return Ok(TerminalResult::Completed {
                    text,
                    iterations: iteration,
                });
            }
        }
    }
}

fn truncate(conversation: &mut Conversation, reason: TruncationReason) -> Result<TerminalResult, Error> {
    conversation.mark_pending()?;
    Ok(TerminalResult::Truncated {
        reason,
        last_text: conversation.last_assistant_text().filter(|t| !t.is_empty()),
        iterations: conversation.iteration_count(),
    })
}

fn fail(conversation: &mut Conversation, e: &AssemblyError) -> Result<TerminalResult, Error> {
    error!(conversation_id = %conversation.id, error = %e, "Context assembly failed");
    conversation.mark_failed()?;
    Ok(TerminalResult::Failed {
        error: e.to_string(),
        iterations: conversation.iteration_count(),
    })
}
