//! `appforge generate` — Run the generation loop against a workspace.

use crate::runtime::{ContextStack, load_config};
use appforge_agent::{LoopSettings, Orchestrator, TerminalResult};
use appforge_config::AppConfig;
use appforge_context::AppType;
use appforge_core::event::{EventBus, ProgressEvent};
use appforge_core::message::{Conversation, WorkspaceId};
use appforge_providers::{AnthropicProvider, RetryingProvider};
use appforge_tools::{Services, ToolEngine, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(
    request: &str,
    root: PathBuf,
    workspace: &str,
    app_type: Option<AppType>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    // Fail before wiring anything when no key is set
    let Some(api_key) = config.api_key.clone() else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    APPFORGE_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };

    let mut anthropic = AnthropicProvider::new(api_key)?;
    if let Some(url) = &config.api_url {
        anthropic = anthropic.with_base_url(url);
    }
    let provider = Arc::new(
        RetryingProvider::new(Arc::new(anthropic), config.retry.policy())
            .with_attempt_timeout(config.agent.model_timeout()),
    );

    let stack = ContextStack::build(&config, root);
    let events = Arc::new(EventBus::default());
    let registry = Arc::new(ToolRegistry::builtin(stack.library.clone(), Services::with_page_fetcher()?));
    let engine = Arc::new(
        ToolEngine::new(registry)
            .with_timeout(config.agent.tool_timeout())
            .with_parallel(config.agent.parallel_tools)
            .with_events(events.clone()),
    );

    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        provider,
        stack.assembler.clone(),
        engine,
        stack.store.clone(),
        stack.tracker.clone(),
    )
    .with_settings(LoopSettings::from_config(&config))
    .with_events(events.clone())
    .with_cancellation(cancel.clone());

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("  Stopping after the current step...");
            ctrl_c.cancel();
        }
    });

    let mut rx = events.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let mut conversation = Conversation::new(WorkspaceId::from(workspace));
    eprintln!("  Workspace:  {}", stack.store.workspace_dir(&conversation.workspace_id)?.display());
    eprintln!("  Model:      {}", config.model);
    eprintln!();

    let result = orchestrator.run_with(&mut conversation, request, app_type).await;
    printer.abort();
    let result = result?;

    println!();
    match &result {
        TerminalResult::Completed { text, iterations } => {
            println!("{text}");
            eprintln!();
            eprintln!("  ✅ Done in {iterations} turn(s), {} tool call(s)", conversation.tool_call_records().len());
        }
        TerminalResult::Truncated {
            reason,
            last_text,
            iterations,
        } => {
            if let Some(text) = last_text {
                println!("{text}");
            }
            eprintln!("  ⚠️  Stopped after {iterations} turn(s): {reason}");
        }
        TerminalResult::Failed { error, iterations } => {
            eprintln!("  ❌ Failed after {iterations} turn(s): {error}");
            return Err(error.clone().into());
        }
        TerminalResult::Cancelled { iterations } => {
            eprintln!("  Cancelled after {iterations} turn(s)");
        }
    }
    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::ToolStarted { tool_name, .. } => eprintln!("  → {tool_name}"),
        ProgressEvent::ToolCompleted {
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            let mark = if *success { "✓" } else { "✗" };
            eprintln!("  {mark} {tool_name} ({duration_ms} ms)");
        }
        ProgressEvent::TurnCompleted {
            iteration,
            usage,
            cache_efficiency,
            ..
        } => eprintln!(
            "  turn {iteration}: {} in, {} cached, {} out, context {:.0}% cacheable",
            usage.input_tokens,
            usage.cache_read_input_tokens,
            usage.output_tokens,
            cache_efficiency * 100.0
        ),
    }
}
