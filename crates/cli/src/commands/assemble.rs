//! `appforge assemble` — Dry-run context assembly for a request.

use crate::runtime::{ContextStack, load_config};
use appforge_core::message::{ConversationId, WorkspaceId};
use std::path::PathBuf;

pub async fn run(
    request: &str,
    root: PathBuf,
    workspace: &str,
    show_blocks: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let stack = ContextStack::build(&config, root);

    let conversation_id = ConversationId::new();
    let workspace_id = WorkspaceId::from(workspace);
    stack
        .assembler
        .open(&conversation_id, &workspace_id, request, None)
        .await;
    let assembly = stack.assembler.assemble(&conversation_id).await?;
    stack.assembler.close(&conversation_id).await;

    let report = &assembly.report;
    println!("  Components:  {}", report.components.join(", "));
    println!("  Tokens:      {} ({} cacheable)", report.total_tokens, report.cacheable_tokens);
    println!("  Efficiency:  {:.1}%", report.efficiency * 100.0);
    for block in &assembly.blocks {
        let ttl = block
            .cache_ttl
            .map_or_else(|| "uncached".to_string(), |d| format!("ttl {}s", d.as_secs()));
        let items = report.items.get(&block.tier).map_or(0, Vec::len);
        println!(
            "  {:<12} {:>7} tokens  {:>3} items  {ttl}",
            block.tier.as_str(),
            block.token_estimate,
            items
        );
    }
    for warning in &report.warnings {
        println!("  ⚠️  {warning}");
    }

    if show_blocks {
        for block in &assembly.blocks {
            println!();
            println!("── {} ──", block.tier);
            print!("{}", block.text);
        }
    }
    Ok(())
}
