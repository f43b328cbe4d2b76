//! The cadence agent loop.
//!
//! One run follows this cycle:
//!
//! 1. **Append** the user input to the session
//! 2. **Send** history (plus optional system prompt) and tool schemas to the LLM
//! 3. **If tool calls**: schedule them (permission gate → cache → tool), append
//!    the results, loop back to step 2
//! 4. **If text only**: the turn is complete
//!
//! The loop also stops on the iteration limit, the token budget, an LLM
//! failure, or cancellation. Every stop is reported as an event, followed by
//! a final `finished` event.

pub mod cache;
pub mod history;
pub mod loop_event;
pub mod loop_runner;
pub mod recovery;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cache::{CachePolicy, CacheStats, ToolCache};
pub use loop_event::{LoopEvent, LoopEventKind};
pub use loop_runner::{ConversationLoop, RunOptions, RunSummary, StopReason};
pub use recovery::{ErrorRecovery, ErrorType, RecoveryAction};
pub use scheduler::{
    group_into_batches, parallel_stats, paths_conflict, ExecutionBatch, ParallelScheduler,
    ParallelStats, ToolExecution, ToolResult,
};
