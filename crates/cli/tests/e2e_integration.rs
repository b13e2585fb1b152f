//! End-to-end tests for the AppForge generation pipeline.
//!
//! These run the orchestrator over the real stack: a directory-backed
//! workspace, the change tracker, the context assembler and the builtin
//! tools. Only the model is scripted.

use std::path::Path;
use std::sync::{Arc, Mutex};

use appforge_agent::{LoopSettings, Orchestrator, TerminalResult, TruncationReason};
use appforge_context::{AppType, ChangeTracker, Classifier, ContextAssembler, TemplateLibrary, TierRules};
use appforge_core::error::ProviderError;
use appforge_core::event::{EventBus, ProgressEvent};
use appforge_core::message::{ContentBlock, Conversation, ConversationId, ConversationStatus, WorkspaceId};
use appforge_core::provider::{AssistantTurn, Provider, StopReason, TurnRequest, Usage};
use appforge_core::retry::RetryPolicy;
use appforge_core::store::FileStore;
use appforge_core::InMemoryKvStore;
use appforge_tools::{LocalFileStore, Services, ToolEngine, ToolRegistry};
use chrono::Utc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted turns in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<AssistantTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<AssistantTurn>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> TurnRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn send_turn(&self, request: TurnRequest) -> Result<AssistantTurn, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let n = requests.len();
        requests.push(request);
        let responses = self.responses.lock().unwrap();
        responses
            .get(n)
            .cloned()
            .ok_or_else(|| ProviderError::Network(format!("script exhausted at call #{n}")))
    }
}

fn turn(blocks: Vec<ContentBlock>, stop_reason: StopReason) -> AssistantTurn {
    AssistantTurn {
        blocks,
        stop_reason,
        usage: Usage {
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 900,
        },
        model: "mock".into(),
    }
}

fn text(answer: &str) -> AssistantTurn {
    turn(vec![ContentBlock::text(answer)], StopReason::EndTurn)
}

fn tools(calls: Vec<ContentBlock>) -> AssistantTurn {
    turn(calls, StopReason::ToolUse)
}

fn call(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: name.into(),
        input,
    }
}

fn write(id: &str, path: &str, content: &str) -> ContentBlock {
    call(id, "write_file", serde_json::json!({"path": path, "content": content}))
}

// ── Stack ────────────────────────────────────────────────────────────────

struct Stack {
    _dir: tempfile::TempDir,
    store: Arc<LocalFileStore>,
    tracker: Arc<ChangeTracker>,
    assembler: Arc<ContextAssembler>,
    events: Arc<EventBus>,
    orchestrator: Orchestrator,
    provider: Arc<ScriptedProvider>,
}

impl Stack {
    fn new(script: Vec<AssistantTurn>, max_iterations: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalFileStore::new(dir.path()));
        let tracker = Arc::new(ChangeTracker::new(
            Arc::new(InMemoryKvStore::new()),
            Classifier::new(TierRules::default()),
            RetryPolicy::immediate(8),
        ));
        let library = Arc::new(TemplateLibrary::react_starter());
        let assembler = Arc::new(ContextAssembler::new(library.clone(), store.clone(), tracker.clone()));
        let events = Arc::new(EventBus::default());
        let engine = Arc::new(
            ToolEngine::new(Arc::new(ToolRegistry::builtin(library, Services::default())))
                .with_events(events.clone()),
        );
        let provider = Arc::new(ScriptedProvider::new(script));
        let orchestrator = Orchestrator::new(
            provider.clone(),
            assembler.clone(),
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
            _dir: dir,
            store,
            tracker,
            assembler,
            events,
            orchestrator,
            provider,
        }
    }

    fn workspace(&self) -> WorkspaceId {
        WorkspaceId::from("app")
    }

    fn file(&self, path: &str) -> Option<String> {
        let full = self.store.root().join("app").join(path);
        std::fs::read_to_string(Path::new(&full)).ok()
    }
}

fn tool_results(turn_blocks: &[ContentBlock]) -> Vec<(String, bool, String)> {
    turn_blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((tool_use_id.clone(), *is_error, content.clone())),
            _ => None,
        })
        .collect()
}

// ── E2E: Generation ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_todo_app_generation() {
    let app = "import { Card } from \"@/components/ui/card\";\n\nexport default function App() {\n  return <Card />;\n}\n";
    let stack = Stack::new(
        vec![
            tools(vec![
                write("toolu_1", "src/App.tsx", app),
                write("toolu_2", "src/components/TodoItem.tsx", "export function TodoItem() { return null; }\n"),
            ]),
            text("Your todo app is ready."),
        ],
        8,
    );
    let mut conv = Conversation::new(stack.workspace());

    let result = stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();
    assert_eq!(
        result,
        TerminalResult::Completed {
            text: "Your todo app is ready.".into(),
            iterations: 2
        }
    );
    assert_eq!(conv.status(), ConversationStatus::Completed);
    assert_eq!(stack.file("src/App.tsx").as_deref(), Some(app));
    assert!(stack.file("src/components/TodoItem.tsx").is_some());

    // The first turn saw exactly the todo components.
    let first = stack.provider.request(0);
    let context: String = first.context.iter().map(|b| b.text.as_str()).collect();
    for name in ["input", "checkbox", "button", "card"] {
        assert!(context.contains(&format!("src/components/ui/{name}.tsx")), "missing {name}");
    }
    assert!(!context.contains("src/components/ui/table.tsx"));

    // The second turn saw the files the first one wrote.
    let second = stack.provider.request(1);
    let context: String = second.context.iter().map(|b| b.text.as_str()).collect();
    assert!(context.contains("<file path=\"src/components/TodoItem.tsx\">"));
    assert_eq!(second.history.len(), 3);
}

#[tokio::test]
async fn e2e_write_then_patch_same_file_in_one_turn() {
    let stack = Stack::new(
        vec![
            tools(vec![
                write("A", "src/App.tsx", "export const title = \"Hello\";\n"),
                call(
                    "B",
                    "apply_patch",
                    serde_json::json!({
                        "path": "src/App.tsx",
                        "edits": [{"search": "Hello", "replace": "Todos"}]
                    }),
                ),
                write("C", "src/other.ts", "export {};\n"),
            ]),
            text("Done."),
        ],
        8,
    );
    let mut conv = Conversation::new(stack.workspace());
    stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();

    let results = tool_results(&conv.turns()[2].blocks);
    let ids: Vec<&str> = results.iter().map(|(id, _, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert!(results.iter().all(|(_, is_error, _)| !is_error));
    assert_eq!(stack.file("src/App.tsx").as_deref(), Some("export const title = \"Todos\";\n"));
}

#[tokio::test]
async fn e2e_identical_rewrite_is_not_a_change() {
    let content = "export default function App() { return null; }\n";
    let stack = Stack::new(
        vec![
            tools(vec![write("w1", "src/App.tsx", content)]),
            tools(vec![write("w2", "src/App.tsx", content)]),
            text("Done."),
        ],
        8,
    );
    let mut conv = Conversation::new(stack.workspace());
    stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();

    let log = stack.tracker.change_log(&stack.workspace());
    assert_eq!(log.len(), 1);
    let second = tool_results(&conv.turns()[4].blocks);
    assert!(second[0].2.contains("unchanged"), "{}", second[0].2);
}

#[tokio::test]
async fn e2e_failures_are_reported_to_the_model() {
    let stack = Stack::new(
        vec![
            tools(vec![
                call("bad_tool", "launch_rocket", serde_json::json!({})),
                call(
                    "bad_patch",
                    "apply_patch",
                    serde_json::json!({"path": "src/missing.ts", "edits": [{"search": "a", "replace": "b"}]}),
                ),
                call("bad_path", "write_file", serde_json::json!({"path": "../escape.ts", "content": "x"})),
                write("good", "src/ok.ts", "ok\n"),
            ]),
            text("Fixed what I could."),
        ],
        8,
    );
    let mut conv = Conversation::new(stack.workspace());
    let result = stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();
    assert!(result.is_completed());

    let results = tool_results(&conv.turns()[2].blocks);
    let flags: Vec<bool> = results.iter().map(|(_, is_error, _)| *is_error).collect();
    assert_eq!(flags, vec![true, true, true, false]);
    assert_eq!(stack.file("src/ok.ts").as_deref(), Some("ok\n"));
    assert!(stack.store.root().join("escape.ts").metadata().is_err());
}

#[tokio::test]
async fn e2e_dependency_added_to_workspace_manifest() {
    let stack = Stack::new(
        vec![
            tools(vec![call(
                "dep",
                "add_dependency",
                serde_json::json!({"name": "date-fns", "version": "^3.6.0"}),
            )]),
            text("Added date-fns."),
        ],
        8,
    );
    stack
        .store
        .write(
            &stack.workspace(),
            "package.json",
            "{\n  \"name\": \"app\",\n  \"dependencies\": {\n    \"react\": \"^18.3.1\"\n  }\n}\n",
        )
        .await
        .unwrap();

    let mut conv = Conversation::new(stack.workspace());
    stack.orchestrator.run(&mut conv, "Create a todo app with due dates").await.unwrap();

    let manifest: serde_json::Value = serde_json::from_str(&stack.file("package.json").unwrap()).unwrap();
    assert_eq!(manifest["dependencies"]["date-fns"], "^3.6.0");
    assert_eq!(manifest["dependencies"]["react"], "^18.3.1");
}

// ── E2E: Limits and recovery ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_output_limit_continuation() {
    let stack = Stack::new(
        vec![
            turn(
                vec![
                    ContentBlock::Thinking {
                        thinking: "Long component ahead.".into(),
                        signature: "sig".into(),
                    },
                    ContentBlock::text("Writing App.tsx"),
                    call("cut", "write_file", serde_json::json!({"path": "src/App.tsx", "content": "export default fu"})),
                ],
                StopReason::MaxTokens,
            ),
            tools(vec![write("whole", "src/App.tsx", "export default function App() {}\n")]),
            text("Done."),
        ],
        8,
    );
    let mut conv = Conversation::new(stack.workspace());
    let result = stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();
    assert!(result.is_completed());

    let ids: Vec<String> = conv.tool_call_records().iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["whole"]);
    assert_eq!(
        stack.file("src/App.tsx").as_deref(),
        Some("export default function App() {}\n")
    );
    // The cut-off turn keeps its thinking and text, minus the tool use.
    let resent = &stack.provider.request(1).history[1];
    assert!(matches!(resent.blocks[0], ContentBlock::Thinking { .. }));
    assert!(!resent.has_tool_use());
}

#[tokio::test]
async fn e2e_iteration_limit_then_resume() {
    let stack = Stack::new(
        vec![
            tools(vec![write("t1", "src/App.tsx", "v1\n")]),
            tools(vec![write("t2", "src/App.tsx", "v2\n")]),
            text("Finished."),
        ],
        2,
    );
    let mut conv = Conversation::new(stack.workspace());

    let first = stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();
    assert!(matches!(
        first,
        TerminalResult::Truncated {
            reason: TruncationReason::IterationLimit,
            iterations: 2,
            ..
        }
    ));
    assert_eq!(conv.status(), ConversationStatus::Pending);
    assert_eq!(stack.provider.calls(), 2);

    let mut fork = Conversation::resume_from(&conv);
    let second = stack.orchestrator.resume(&mut fork).await.unwrap();
    assert_eq!(
        second,
        TerminalResult::Completed {
            text: "Finished.".into(),
            iterations: 1
        }
    );
    assert_eq!(stack.file("src/App.tsx").as_deref(), Some("v2\n"));
}

#[tokio::test]
async fn e2e_follow_up_keeps_app_type() {
    let stack = Stack::new(vec![text("Added a chart.")], 8);
    let mut conv = Conversation::new(stack.workspace());
    stack
        .orchestrator
        .run_with(&mut conv, "add a chart of completed tasks", Some(AppType::Todo))
        .await
        .unwrap();

    let context: String = stack.provider.request(0).context.iter().map(|b| b.text.as_str()).collect();
    assert!(context.contains("src/components/ui/checkbox.tsx"));
    assert!(context.contains("src/components/ui/chart.tsx"));
}

#[tokio::test]
async fn e2e_turn_events_report_cache_reads() {
    let stack = Stack::new(vec![tools(vec![write("w", "src/App.tsx", "x\n")]), text("ok")], 8);
    let mut rx = stack.events.subscribe();
    let mut conv = Conversation::new(stack.workspace());
    stack.orchestrator.run(&mut conv, "Create a todo app").await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::TurnCompleted { usage, .. } = event.as_ref() {
            assert_eq!(usage.cache_read_input_tokens, 900);
        }
        kinds.push(event.event_type());
    }
    assert_eq!(
        kinds,
        vec!["turn_completed", "tool_started", "tool_completed", "turn_completed"]
    );
}

// ── E2E: Assembly ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_assembly_is_deterministic_across_assemblers() {
    let stack = Stack::new(Vec::new(), 8);
    let ws = stack.workspace();
    stack.store.write(&ws, "src/App.tsx", "export default function App() {}\n").await.unwrap();
    stack.store.write(&ws, "src/hooks/useTodos.ts", "export {};\n").await.unwrap();

    let other = ContextAssembler::new(
        Arc::new(TemplateLibrary::react_starter()),
        stack.store.clone(),
        stack.tracker.clone(),
    );
    let now = Utc::now();
    let mut blocks = Vec::new();
    for assembler in [stack.assembler.as_ref(), &other] {
        let conv = ConversationId::new();
        assembler.open(&conv, &ws, "Create a todo app", None).await;
        blocks.push(assembler.assemble_at(&conv, now).await.unwrap().blocks);
    }
    assert_eq!(blocks[0], blocks[1]);
}
