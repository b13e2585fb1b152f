//! The generation loop for AppForge.
//!
//! A run follows an **Assemble → Ask → Act** cycle:
//!
//! 1. **Assemble** the tiered context for the conversation
//! 2. **Ask** the model for one turn with the full history
//! 3. **Act** on its tool calls and append their results as one user turn
//!
//! The loop repeats until the model answers without tools, emits the
//! completion marker, or a budget runs out. See [`TerminalResult`].

pub mod orchestrator;
pub mod outcome;

#[cfg(test)]
mod test_helpers;

pub use orchestrator::{LoopSettings, Orchestrator, CONTINUATION_PROMPT};
pub use outcome::{TerminalResult, TruncationReason};
