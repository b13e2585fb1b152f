//! Scripted providers and a wired-up orchestrator for loop tests.

use crate::orchestrator::{LoopSettings, Orchestrator};
use appforge_context::{ChangeTracker, Classifier, ContextAssembler, ContextBudget, TemplateLibrary, TierRules};
use appforge_core::error::ProviderError;
use appforge_core::event::EventBus;
use appforge_core::message::{ContentBlock, Conversation, WorkspaceId};
use appforge_core::provider::{AssistantTurn, Provider, StopReason, TurnRequest, Usage};
use appforge_core::retry::RetryPolicy;
use appforge_core::store::{FileStore, InMemoryFileStore};
use appforge_core::InMemoryKvStore;
use appforge_tools::{Services, ToolEngine, ToolRegistry};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub(crate) type Scripted = Result<AssistantTurn, ProviderError>;

pub(crate) fn turn_with(blocks: Vec<ContentBlock>, stop_reason: StopReason) -> Scripted {
    Ok(AssistantTurn {
        blocks,
        stop_reason,
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        },
        model: "mock-model".into(),
    })
}

pub(crate) fn text_turn(text: &str) -> Scripted {
    turn_with(vec![ContentBlock::text(text)], StopReason::EndTurn)
}

pub(crate) fn tool_turn(calls: Vec<ContentBlock>) -> Scripted {
    turn_with(calls, StopReason::ToolUse)
}

pub(crate) fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: name.into(),
        input,
    }
}

/// Returns scripted turns in order and records every request.
pub(crate) struct SequentialMockProvider {
    responses: Mutex<Vec<Scripted>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl SequentialMockProvider {
    pub fn new(mut responses: Vec<Scripted>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential-mock"
    }

    async fn send_turn(&self, request: TurnRequest) -> Result<AssistantTurn, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
    }
}

/// Answers every turn with one more write.
#[derive(Default)]
pub(crate) struct EndlessToolProvider {
    calls: Mutex<usize>,
}

#[async_trait]
impl Provider for EndlessToolProvider {
    fn name(&self) -> &str {
        "endless-mock"
    }

    async fn send_turn(&self, _request: TurnRequest) -> Result<AssistantTurn, ProviderError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        tool_turn(vec![tool_use(
            &format!("toolu_{n}"),
            "write_file",
            serde_json::json!({"path": "src/App.tsx", "content": format!("// revision {n}\n")}),
        )])
    }
}

pub(crate) struct Harness {
    pub orchestrator: Orchestrator,
    pub provider: Arc<SequentialMockProvider>,
    pub store: Arc<InMemoryFileStore>,
    pub tracker: Arc<ChangeTracker>,
    pub events: Arc<EventBus>,
    workspace_id: WorkspaceId,
}

impl Harness {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self::build(Arc::new(SequentialMockProvider::new(script)), None, 8, ContextBudget::default())
    }

    pub fn with_budget(script: Vec<Scripted>, budget: ContextBudget) -> Self {
        Self::build(Arc::new(SequentialMockProvider::new(script)), None, 8, budget)
    }

    /// Drive `provider` instead of the scripted one; `self.provider` then
    /// stays empty.
    pub fn with_provider(provider: Arc<dyn Provider>, max_iterations: u32) -> Self {
        Self::build(
            Arc::new(SequentialMockProvider::new(Vec::new())),
            Some(provider),
            max_iterations,
            ContextBudget::default(),
        )
    }

    fn build(
        scripted: Arc<SequentialMockProvider>,
        provider: Option<Arc<dyn Provider>>,
        max_iterations: u32,
        budget: ContextBudget,
    ) -> Self {
        let store = Arc::new(InMemoryFileStore::new());
        let tracker = Arc::new(ChangeTracker::new(
            Arc::new(InMemoryKvStore::new()),
            Classifier::new(TierRules::default()),
            RetryPolicy::immediate(8),
        ));
        let library = Arc::new(TemplateLibrary::react_starter());
        let assembler = Arc::new(
            ContextAssembler::new(library.clone(), store.clone(), tracker.clone()).with_budget(budget),
        );
        let events = Arc::new(EventBus::default());
        let registry = Arc::new(ToolRegistry::builtin(library, Services::default()));
        let engine = Arc::new(ToolEngine::new(registry).with_events(events.clone()));

        let provider = provider.unwrap_or_else(|| scripted.clone() as Arc<dyn Provider>);
        let orchestrator = Orchestrator::new(
            provider,
            assembler,
            engine,
            store.clone(),
            tracker.clone(),
        )
        .with_settings(LoopSettings {
            max_iterations,
            ..LoopSettings::default()
        })
        .with_events(events.clone());

        Self {
            orchestrator,
            provider: scripted,
            store,
            tracker,
            events,
            workspace_id: WorkspaceId::from("ws-test"),
        }
    }

    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.workspace_id.clone())
    }

    pub async fn read(&self, path: &str) -> Option<String> {
        self.store.read(&self.workspace_id, path).await.unwrap()
    }
}
