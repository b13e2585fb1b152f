//! Tool execution engine.
//!
//! Takes the tool uses of one assistant turn and returns one finished
//! [`ToolCallRecord`] per call, in call order. Calls are grouped into
//! consecutive waves whose touched paths are disjoint; a wave runs
//! concurrently, waves run one after another, so two calls on the same
//! file always apply in the order the model issued them.
//!
//! Nothing escapes as an error: unknown tools, duplicate ids, handler
//! failures and timeouts all become failed records.

use crate::registry::{BuiltinTool, ToolRegistry};
use appforge_core::error::ToolError;
use appforge_core::event::{EventBus, ProgressEvent};
use appforge_core::message::ConversationId;
use appforge_core::tool::{ALL_PATHS, ToolCall, ToolCallRecord, ToolCallStatus, ToolContext, ToolOutput};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

type InFlightKey = (ConversationId, String);

pub struct ToolEngine {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    parallel: bool,
    max_concurrency: usize,
    events: Option<Arc<EventBus>>,
    in_flight: Mutex<HashSet<InFlightKey>>,
}

/// Removes a call from the in-flight set when dropped, including when the
/// surrounding future is cancelled.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<InFlightKey>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

#[derive(Default)]
struct Wave {
    calls: Vec<usize>,
    paths: HashSet<String>,
    whole_workspace: bool,
}

impl Wave {
    fn conflicts(&self, paths: &[String]) -> bool {
        if paths.iter().any(|p| p == ALL_PATHS) {
            return self.whole_workspace || !self.paths.is_empty();
        }
        (self.whole_workspace && !paths.is_empty()) || paths.iter().any(|p| self.paths.contains(p))
    }

    fn add(&mut self, index: usize, paths: Vec<String>) {
        self.calls.push(index);
        for path in paths {
            if path == ALL_PATHS {
                self.whole_workspace = true;
            } else {
                self.paths.insert(path);
            }
        }
    }
}

impl ToolEngine {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(60),
            parallel: true,
            max_concurrency: 8,
            events: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run independent calls concurrently (default) or strictly one by one.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one turn's tool calls. The result has one record per call,
    /// in the order of `calls`.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        conversation_id: &ConversationId,
        calls: &[ToolCall],
    ) -> Vec<ToolCallRecord> {
        let mut seen = HashSet::new();
        let repeated: Vec<bool> = calls.iter().map(|c| !seen.insert(c.id.as_str())).collect();

        let mut records = Vec::with_capacity(calls.len());
        for wave in self.plan(calls) {
            debug!(
                conversation_id = %conversation_id,
                calls = wave.calls.len(),
                "Executing tool wave"
            );
            let done: Vec<(usize, ToolCallRecord)> = stream::iter(wave.calls)
                .map(|i| {
                    let call = &calls[i];
                    let repeated = repeated[i];
                    async move { (i, self.execute_one(ctx, conversation_id, call, repeated).await) }
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
            records.extend(done);
        }

        records.sort_by_key(|(i, _)| *i);
        records.into_iter().map(|(_, record)| record).collect()
    }

    /// Split calls into consecutive waves of non-conflicting calls.
    fn plan(&self, calls: &[ToolCall]) -> Vec<Wave> {
        let mut waves: Vec<Wave> = Vec::new();
        for (i, call) in calls.iter().enumerate() {
            let paths = self
                .registry
                .resolve(&call.name)
                .map(|tool| tool.touched_paths(&call.arguments))
                .unwrap_or_default();
            let fits = self.parallel && waves.last().is_some_and(|w| !w.conflicts(&paths));
            if !fits {
                waves.push(Wave::default());
            }
            if let Some(wave) = waves.last_mut() {
                wave.add(i, paths);
            }
        }
        waves
    }

    async fn execute_one(
        &self,
        ctx: &ToolContext,
        conversation_id: &ConversationId,
        call: &ToolCall,
        repeated: bool,
    ) -> ToolCallRecord {
        let record = ToolCallRecord::pending(call);
        let key = (conversation_id.clone(), call.id.clone());
        let newly_in_flight = !repeated && {
            let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            set.insert(key.clone())
        };
        if !newly_in_flight {
            warn!(
                conversation_id = %conversation_id,
                tool = %call.name,
                id = %call.id,
                "Rejected tool call with duplicate id"
            );
            return record.finish(ToolOutput::error(ToolError::DuplicateId(call.id.clone()).to_string()));
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key,
        };

        let tool = match self.registry.resolve(&call.name) {
            Ok(tool) => tool.clone(),
            Err(e) => {
                warn!(conversation_id = %conversation_id, tool = %call.name, "Unsupported tool requested");
                return record.finish(ToolOutput::error(e.to_string()));
            }
        };

        self.publish(ProgressEvent::ToolStarted {
            conversation_id: conversation_id.to_string(),
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            timestamp: Utc::now(),
        });
        let record = record.executing();

        let output = match tokio::time::timeout(self.timeout, tool.execute(ctx, call.arguments.clone())).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => ToolOutput::error(e.to_string()),
            Err(_) => ToolOutput::error(
                ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }
                .to_string(),
            ),
        };

        if output.success {
            debug!(
                conversation_id = %conversation_id,
                tool = %call.name,
                id = %call.id,
                mutating = call.name.parse::<BuiltinTool>().is_ok_and(BuiltinTool::mutates_workspace),
                "Tool call complete"
            );
        } else {
            warn!(
                conversation_id = %conversation_id,
                tool = %call.name,
                id = %call.id,
                reason = %output.output,
                "Tool call failed"
            );
        }

        let record = record.finish(output);
        self.publish(ProgressEvent::ToolCompleted {
            conversation_id: conversation_id.to_string(),
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: record.status == ToolCallStatus::Complete,
            duration_ms: record.duration_ms(),
            timestamp: Utc::now(),
        });
        record
    }

    fn publish(&self, event: ProgressEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use appforge_core::tool::Tool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for `delay_ms` (argument), then writes `content` to `path`.
    struct SlowWrite {
        running: AtomicUsize,
        peak: AtomicUsize,
        executions: AtomicUsize,
    }

    impl SlowWrite {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                executions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Tool for SlowWrite {
        fn name(&self) -> &str {
            "write_file"
        }

        fn description(&self) -> &str {
            "test writer"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        fn touched_paths(&self, arguments: &serde_json::Value) -> Vec<String> {
            crate::args::touched(arguments, "path").into_iter().collect()
        }

        async fn execute(
            &self,
            ctx: &ToolContext,
            arguments: serde_json::Value,
        ) -> Result<ToolOutput, ToolError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(arguments["delay_ms"].as_u64().unwrap_or(0))).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let path = crate::args::required_path(&arguments, "path")?;
            let content = arguments["content"].as_str().unwrap_or_default();
            ctx.write_file("write_file", &path, content).await?;
            Ok(ToolOutput::ok(format!("wrote {path}")))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "web_search"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(
            &self,
            _ctx: &ToolContext,
            _arguments: serde_json::Value,
        ) -> Result<ToolOutput, ToolError> {
            Err(ToolError::ServiceUnavailable("web_search".into()))
        }
    }

    fn engine(writer: Arc<SlowWrite>) -> ToolEngine {
        let mut registry = ToolRegistry::new();
        registry.register(writer).unwrap();
        registry.register(Arc::new(Failing)).unwrap();
        ToolEngine::new(Arc::new(registry))
    }

    fn write(id: &str, path: &str, content: &str, delay_ms: u64) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "write_file".into(),
            arguments: serde_json::json!({"path": path, "content": content, "delay_ms": delay_ms}),
        }
    }

    fn conv() -> ConversationId {
        ConversationId::from("conv-1")
    }

    fn ids(records: &[ToolCallRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_call_order_even_when_finished_out_of_order() {
        let fx = Fixture::new();
        let writer = SlowWrite::new();
        let engine = engine(writer.clone());

        let calls = vec![write("A", "x.ts", "x", 50), write("B", "y.ts", "y", 5)];
        let records = engine.execute(&fx.ctx, &conv(), &calls).await;

        assert_eq!(ids(&records), vec!["A", "B"]);
        assert!(records.iter().all(|r| r.status == ToolCallStatus::Complete));
        assert_eq!(writer.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_path_writes_apply_in_call_order() {
        let fx = Fixture::new();
        let writer = SlowWrite::new();
        let engine = engine(writer.clone());

        let calls = vec![write("A", "x.ts", "first", 50), write("B", "./x.ts", "second", 0)];
        let records = engine.execute(&fx.ctx, &conv(), &calls).await;

        assert_eq!(ids(&records), vec!["A", "B"]);
        assert_eq!(writer.peak.load(Ordering::SeqCst), 1);
        assert_eq!(fx.read("x.ts").await.as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_mode_never_overlaps() {
        let fx = Fixture::new();
        let writer = SlowWrite::new();
        let engine = engine(writer.clone()).with_parallel(false);

        let calls = vec![write("A", "a.ts", "a", 10), write("B", "b.ts", "b", 10), write("C", "c.ts", "c", 10)];
        let records = engine.execute(&fx.ctx, &conv(), &calls).await;

        assert_eq!(ids(&records), vec!["A", "B", "C"]);
        assert_eq!(writer.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_record() {
        let fx = Fixture::new();
        let engine = engine(SlowWrite::new());
        let calls = vec![ToolCall {
            id: "t1".into(),
            name: "launch_rockets".into(),
            arguments: serde_json::json!({}),
        }];

        let records = engine.execute(&fx.ctx, &conv(), &calls).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ToolCallStatus::Failed);
        assert!(records[0].result.as_ref().unwrap().output.contains("Unsupported tool"));
    }

    #[tokio::test]
    async fn handler_failure_does_not_stop_the_batch() {
        let fx = Fixture::new();
        let engine = engine(SlowWrite::new());
        let calls = vec![
            ToolCall {
                id: "s1".into(),
                name: "web_search".into(),
                arguments: serde_json::json!({"query": "x"}),
            },
            write("w1", "a.ts", "a", 0),
        ];

        let records = engine.execute(&fx.ctx, &conv(), &calls).await;
        assert_eq!(records[0].status, ToolCallStatus::Failed);
        assert_eq!(records[1].status, ToolCallStatus::Complete);
        assert_eq!(fx.read("a.ts").await.as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let fx = Fixture::new();
        let engine = engine(SlowWrite::new()).with_timeout(Duration::from_millis(100));

        let records = engine
            .execute(&fx.ctx, &conv(), &[write("slow", "a.ts", "a", 10_000)])
            .await;
        assert_eq!(records[0].status, ToolCallStatus::Failed);
        assert!(records[0].result.as_ref().unwrap().output.contains("timed out"));
        assert!(fx.read("a.ts").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_id_in_batch_is_never_executed() {
        let fx = Fixture::new();
        let writer = SlowWrite::new();
        let engine = engine(writer.clone());

        let calls = vec![write("dup", "a.ts", "a", 0), write("dup", "b.ts", "b", 0)];
        let records = engine.execute(&fx.ctx, &conv(), &calls).await;

        assert_eq!(records[0].status, ToolCallStatus::Complete);
        assert_eq!(records[1].status, ToolCallStatus::Failed);
        assert!(records[1].result.as_ref().unwrap().output.contains("Duplicate"));
        assert_eq!(writer.executions.load(Ordering::SeqCst), 1);
        assert!(fx.read("b.ts").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_id_across_concurrent_batches_is_rejected() {
        let fx = Fixture::new();
        let writer = SlowWrite::new();
        let engine = engine(writer.clone());

        let first = [write("same", "a.ts", "a", 100)];
        let second = [write("same", "b.ts", "b", 0)];
        let id = conv();
        let (a, b) = tokio::join!(
            engine.execute(&fx.ctx, &id, &first),
            engine.execute(&fx.ctx, &id, &second),
        );

        assert_eq!(a[0].status, ToolCallStatus::Complete);
        assert_eq!(b[0].status, ToolCallStatus::Failed);
        assert_eq!(writer.executions.load(Ordering::SeqCst), 1);

        // Once finished, the id may be reused.
        let again = engine.execute(&fx.ctx, &id, &second).await;
        assert_eq!(again[0].status, ToolCallStatus::Complete);
    }

    #[tokio::test]
    async fn progress_events_bracket_each_call() {
        let fx = Fixture::new();
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let engine = engine(SlowWrite::new()).with_events(bus);

        engine.execute(&fx.ctx, &conv(), &[write("A", "a.ts", "a", 0)]).await;

        let started = rx.recv().await.unwrap();
        assert_eq!(started.event_type(), "tool_started");
        match rx.recv().await.unwrap().as_ref() {
            ProgressEvent::ToolCompleted { tool_use_id, success, .. } => {
                assert_eq!(tool_use_id, "A");
                assert!(*success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn planning_groups_disjoint_calls() {
        let engine = engine(SlowWrite::new());
        let calls = vec![
            write("1", "a.ts", "", 0),
            write("2", "b.ts", "", 0),
            write("3", "a.ts", "", 0),
            ToolCall {
                id: "4".into(),
                name: "web_search".into(),
                arguments: serde_json::json!({}),
            },
        ];
        let waves: Vec<Vec<usize>> = engine.plan(&calls).into_iter().map(|w| w.calls).collect();
        assert_eq!(waves, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn whole_workspace_calls_stand_alone() {
        let mut wave = Wave::default();
        wave.add(0, vec!["a.ts".into()]);
        assert!(wave.conflicts(&[ALL_PATHS.to_string()]));
        assert!(!wave.conflicts(&[]));

        let mut wave = Wave::default();
        wave.add(0, vec![ALL_PATHS.to_string()]);
        assert!(wave.conflicts(&["b.ts".to_string()]));
        assert!(!wave.conflicts(&[]));
    }
}
