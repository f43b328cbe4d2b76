//! Conflict-aware parallel tool scheduler.
//!
//! One turn's tool calls are partitioned into ordered batches. Read-only calls
//! on non-conflicting paths share a batch and run concurrently; every write
//! runs alone. Results always come back in request order.

use cadence_core::cancellation::CancellationToken;
use cadence_core::error::Failure;
use cadence_core::permission::PermissionGate;
use cadence_core::tool::{Tool, ToolCall, ToolRegistry};
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::ToolCache;

/// Argument names whose string values are treated as filesystem paths.
pub const PATH_ARGUMENTS: &[&str] = &[
    "path",
    "file_path",
    "source",
    "destination",
    "src",
    "dest",
    "directory",
    "dir",
];

pub const PERMISSION_DENIED_MESSAGE: &str = "Permission denied by user.";
pub const SKIPPED_ON_CANCEL_MESSAGE: &str = "Operation cancelled before this tool ran.";

/// A resolved tool call, ready for batching.
#[derive(Clone)]
pub struct ToolExecution {
    /// Position in the turn's request list
    pub index: usize,
    pub call: ToolCall,
    pub tool: Arc<dyn Tool>,
    pub read_only: bool,
    pub affected_paths: BTreeSet<String>,
}

impl ToolExecution {
    pub fn new(index: usize, call: ToolCall, tool: Arc<dyn Tool>) -> Self {
        let read_only = tool.read_only();
        let affected_paths = extract_affected_paths(&call.arguments);
        Self {
            index,
            call,
            tool,
            read_only,
            affected_paths,
        }
    }
}

impl std::fmt::Debug for ToolExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecution")
            .field("index", &self.index)
            .field("tool", &self.call.name)
            .field("read_only", &self.read_only)
            .field("affected_paths", &self.affected_paths)
            .finish()
    }
}

/// A contiguous group of executions run together.
#[derive(Debug, Clone)]
pub struct ExecutionBatch {
    pub executions: Vec<ToolExecution>,
    /// True only for read batches with more than one member
    pub parallel: bool,
}

/// Outcome of one tool call. Failures are data here, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub tool_name: String,
    pub result: String,
    pub is_error: bool,
    pub was_cached: bool,
    /// Set when the permission gate refused the call
    pub permission_denied: bool,
    /// The classified failure, when the tool body itself failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, result: String, was_cached: bool) -> Self {
        Self {
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
            is_error: false,
            was_cached,
            permission_denied: false,
            failure: None,
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: message.into(),
            is_error: true,
            was_cached: false,
            permission_denied: false,
            failure: None,
        }
    }

    pub fn unknown_tool(call: &ToolCall) -> Self {
        Self::error(call, format!("Tool {} not found.", call.name))
    }

    pub fn denied(call: &ToolCall) -> Self {
        Self {
            permission_denied: true,
            ..Self::error(call, PERMISSION_DENIED_MESSAGE)
        }
    }
}

/// Path-like argument values (non-empty strings only).
pub fn extract_affected_paths(arguments: &Value) -> BTreeSet<String> {
    PATH_ARGUMENTS
        .iter()
        .filter_map(|name| arguments.get(*name).and_then(Value::as_str))
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Two path sets conflict when they share a path or one contains the other
/// (after trimming trailing separators). Empty sets never conflict.
pub fn paths_conflict(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.iter().any(|p1| {
        let p1 = p1.trim_end_matches('/');
        b.iter().any(|p2| {
            let p2 = p2.trim_end_matches('/');
            p1 == p2 || is_under(p1, p2) || is_under(p2, p1)
        })
    })
}

fn is_under(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Batch plan as index groups into `executions`, plus the parallel flag.
fn plan_batches(executions: &[ToolExecution]) -> Vec<(Vec<usize>, bool)> {
    let mut plan: Vec<(Vec<usize>, bool)> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut open_paths: BTreeSet<String> = BTreeSet::new();

    let close = |open: &mut Vec<usize>, open_paths: &mut BTreeSet<String>, plan: &mut Vec<(Vec<usize>, bool)>| {
        if !open.is_empty() {
            let members = std::mem::take(open);
            let parallel = members.len() > 1;
            plan.push((members, parallel));
            open_paths.clear();
        }
    };

    for (i, exec) in executions.iter().enumerate() {
        if exec.read_only {
            if paths_conflict(&exec.affected_paths, &open_paths) {
                close(&mut open, &mut open_paths, &mut plan);
            }
            open.push(i);
            open_paths.extend(exec.affected_paths.iter().cloned());
        } else {
            close(&mut open, &mut open_paths, &mut plan);
            plan.push((vec![i], false));
        }
    }
    close(&mut open, &mut open_paths, &mut plan);
    plan
}

/// Partition executions into ordered batches.
pub fn group_into_batches(executions: Vec<ToolExecution>) -> Vec<ExecutionBatch> {
    let plan = plan_batches(&executions);
    let mut slots: Vec<Option<ToolExecution>> = executions.into_iter().map(Some).collect();
    plan.into_iter()
        .map(|(members, parallel)| ExecutionBatch {
            executions: members.into_iter().filter_map(|i| slots[i].take()).collect(),
            parallel,
        })
        .collect()
}

/// Summary of how a turn would be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParallelStats {
    pub total: usize,
    pub read_only: usize,
    pub write: usize,
    pub batches: usize,
    pub max_parallel: usize,
}

pub fn parallel_stats(executions: &[ToolExecution]) -> ParallelStats {
    let plan = plan_batches(executions);
    let read_only = executions.iter().filter(|e| e.read_only).count();
    ParallelStats {
        total: executions.len(),
        read_only,
        write: executions.len() - read_only,
        batches: plan.len(),
        max_parallel: plan.iter().map(|(m, _)| m.len()).max().unwrap_or(0),
    }
}

/// Executes a turn's tool calls against the registry, cache and permission gate.
pub struct ParallelScheduler {
    tools: Arc<ToolRegistry>,
    cache: Option<Arc<ToolCache>>,
    permissions: Option<Arc<dyn PermissionGate>>,
}

impl ParallelScheduler {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            cache: None,
            permissions: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ToolCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Without a gate every call is allowed.
    pub fn with_permissions(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.permissions = Some(gate);
        self
    }

    pub fn cache(&self) -> Option<&Arc<ToolCache>> {
        self.cache.as_ref()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Resolve each call. Unknown tools become error results immediately.
    pub fn annotate(&self, calls: &[ToolCall]) -> (Vec<ToolExecution>, Vec<(usize, ToolResult)>) {
        let mut executions = Vec::new();
        let mut unknown = Vec::new();
        for (index, call) in calls.iter().enumerate() {
            match self.tools.get(&call.name) {
                Some(tool) => executions.push(ToolExecution::new(index, call.clone(), tool)),
                None => {
                    warn!(tool = %call.name, "Model requested an unknown tool");
                    unknown.push((index, ToolResult::unknown_tool(call)));
                }
            }
        }
        (executions, unknown)
    }

    /// Run one turn's tool calls. Output order equals input order.
    ///
    /// Cancellation is checked between batches; calls in batches that had
    /// not started get an error result instead of running.
    pub async fn execute(&self, calls: &[ToolCall], cancel: Option<&CancellationToken>) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let (executions, unknown) = self.annotate(calls);
        for (index, result) in unknown {
            slots[index] = Some(result);
        }

        let batches = group_into_batches(executions);
        debug!(calls = calls.len(), batches = batches.len(), "Scheduling tool calls");

        for batch in batches {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                for exec in &batch.executions {
                    slots[exec.index] = Some(ToolResult::error(&exec.call, SKIPPED_ON_CANCEL_MESSAGE));
                }
                continue;
            }

            if batch.parallel {
                debug!(size = batch.executions.len(), "Running parallel batch");
                let results = join_all(batch.executions.iter().map(|e| self.execute_single(e))).await;
                for (exec, result) in batch.executions.iter().zip(results) {
                    slots[exec.index] = Some(result);
                }
            } else {
                for exec in &batch.executions {
                    slots[exec.index] = Some(self.execute_single(exec).await);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    async fn execute_single(&self, exec: &ToolExecution) -> ToolResult {
        let call = &exec.call;
        let name = call.name.as_str();

        if let Some(gate) = &self.permissions {
            if !gate.check(name, exec.tool.risk(), &call.arguments).await {
                warn!(tool = name, "Permission denied");
                return ToolResult::denied(call);
            }
        }

        let cache = self.cache.as_ref().filter(|_| exec.tool.cacheable());
        if let Some(cache) = cache {
            if let Some(hit) = cache.get(name, &call.arguments).await {
                debug!(tool = name, "Cache hit");
                return ToolResult::success(call, hit, true);
            }
        }

        let outcome = AssertUnwindSafe(exec.tool.execute(call.arguments.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => {
                if let Some(cache) = cache {
                    cache.set(name, &call.arguments, output.clone(), None).await;
                }
                ToolResult::success(call, output, false)
            }
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                ToolResult {
                    failure: Some(Failure::from(&e)),
                    ..ToolResult::error(call, format!("Error executing tool: {e}"))
                }
            }
            Err(_) => {
                warn!(tool = name, "Tool panicked");
                let failure = Failure::new("Panic", format!("tool '{name}' panicked"));
                ToolResult {
                    result: format!("Error executing tool: {}", failure.message),
                    failure: Some(failure),
                    ..ToolResult::error(call, "")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, ToolCache};
    use crate::test_helpers::{CountingTool, RecordingGate};
    use cadence_core::tool::RiskLevel;
    use cadence_core::permission::StaticGate;
    use serde_json::json;
    use std::time::Duration;

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    fn exec(index: usize, name: &str, read_only: bool, args: Value) -> ToolExecution {
        let tool = Arc::new(CountingTool::new(name, read_only));
        ToolExecution::new(index, call(&format!("c{index}"), name, args), tool)
    }

    fn paths(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_known_path_arguments() {
        let found = extract_affected_paths(&json!({
            "path": "src/lib.rs",
            "dest": "out/",
            "dir": "",
            "pattern": "*.rs",
            "source": 42
        }));
        assert_eq!(found, paths(&["src/lib.rs", "out/"]));
    }

    #[test]
    fn conflict_rules() {
        assert!(!paths_conflict(&paths(&[]), &paths(&["a"])));
        assert!(paths_conflict(&paths(&["a.txt"]), &paths(&["a.txt"])));
        assert!(paths_conflict(&paths(&["src/"]), &paths(&["src/main.rs"])));
        assert!(paths_conflict(&paths(&["src/main.rs"]), &paths(&["src"])));
        assert!(!paths_conflict(&paths(&["src"]), &paths(&["src2/main.rs"])));
        assert!(!paths_conflict(&paths(&["a.txt"]), &paths(&["b.txt"])));
    }

    #[test]
    fn disjoint_reads_share_one_parallel_batch() {
        let batches = group_into_batches(vec![
            exec(0, "read_file", true, json!({"path": "a.txt"})),
            exec(1, "read_file", true, json!({"path": "b.txt"})),
        ]);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].parallel);
    }

    #[test]
    fn same_path_splits_batches() {
        let batches = group_into_batches(vec![
            exec(0, "read_file", true, json!({"path": "a.txt"})),
            exec(1, "read_file", true, json!({"path": "a.txt"})),
            exec(2, "write_file", false, json!({"path": "a.txt"})),
            exec(3, "read_file", true, json!({"path": "a.txt"})),
        ]);
        let shape: Vec<(Vec<usize>, bool)> = batches
            .iter()
            .map(|b| (b.executions.iter().map(|e| e.index).collect(), b.parallel))
            .collect();
        assert_eq!(
            shape,
            vec![(vec![0], false), (vec![1], false), (vec![2], false), (vec![3], false)]
        );
    }

    #[test]
    fn write_closes_open_read_batch() {
        let execs = vec![
            exec(0, "read_file", true, json!({"path": "a"})),
            exec(1, "list_files", true, json!({"path": "b"})),
            exec(2, "shell", false, json!({"command": "ls"})),
            exec(3, "read_file", true, json!({"path": "c"})),
        ];
        let stats = parallel_stats(&execs);
        assert_eq!(
            stats,
            ParallelStats { total: 4, read_only: 3, write: 1, batches: 3, max_parallel: 2 }
        );
    }

    #[tokio::test]
    async fn results_keep_request_order_with_unknown_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool::new("read_file", true).with_delay(Duration::from_millis(20))));
        registry.register(Arc::new(CountingTool::new("list_files", true)));
        let scheduler = ParallelScheduler::new(Arc::new(registry));

        let calls = vec![
            call("1", "read_file", json!({"path": "a"})),
            call("2", "mystery", json!({})),
            call("3", "list_files", json!({"path": "b"})),
        ];
        let results = scheduler.execute(&calls, None).await;

        let ids: Vec<_> = results.iter().map(|r| r.tool_use_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(results[1].result, "Tool mystery not found.");
        assert!(results[1].is_error);
        assert!(!results[0].is_error && !results[2].is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_batch_members_run_concurrently() {
        let reader = Arc::new(CountingTool::new("read_file", true).with_delay(Duration::from_secs(1)));
        let mut registry = ToolRegistry::new();
        registry.register(reader.clone());
        let scheduler = ParallelScheduler::new(Arc::new(registry));

        let calls: Vec<_> = ["a.txt", "b.txt", "c.txt", "d.txt"]
            .iter()
            .enumerate()
            .map(|(i, p)| call(&i.to_string(), "read_file", json!({"path": p})))
            .collect();

        let started = tokio::time::Instant::now();
        let results = scheduler.execute(&calls, None).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| !r.is_error));
        assert_eq!(reader.calls(), 4);
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn write_batches_run_one_after_another() {
        let writer = Arc::new(CountingTool::new("write_file", false).with_delay(Duration::from_secs(1)));
        let mut registry = ToolRegistry::new();
        registry.register(writer.clone());
        let scheduler = ParallelScheduler::new(Arc::new(registry));

        let calls = vec![
            call("1", "write_file", json!({"path": "a.txt"})),
            call("2", "write_file", json!({"path": "b.txt"})),
        ];

        let started = tokio::time::Instant::now();
        scheduler.execute(&calls, None).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(writer.calls(), 2);
    }

    #[tokio::test]
    async fn denied_calls_are_not_invoked() {
        let shell = Arc::new(CountingTool::new("shell", false).with_risk(RiskLevel::High));
        let mut registry = ToolRegistry::new();
        registry.register(shell.clone());
        let scheduler = ParallelScheduler::new(Arc::new(registry))
            .with_permissions(Arc::new(StaticGate::deny_all()));

        let results = scheduler
            .execute(&[call("1", "shell", json!({"command": "rm -rf /tmp/x"}))], None)
            .await;

        assert_eq!(results[0].result, PERMISSION_DENIED_MESSAGE);
        assert!(results[0].permission_denied);
        assert_eq!(shell.calls(), 0);
    }

    #[tokio::test]
    async fn gate_sees_tool_risk() {
        let gate = Arc::new(RecordingGate::new(true));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool::new("write_file", false).with_risk(RiskLevel::Medium)));
        let scheduler = ParallelScheduler::new(Arc::new(registry)).with_permissions(gate.clone());

        scheduler.execute(&[call("1", "write_file", json!({"path": "x"}))], None).await;
        assert_eq!(gate.seen(), vec![("write_file".to_string(), RiskLevel::Medium)]);
    }

    #[tokio::test]
    async fn cacheable_results_are_reused() {
        let reader = Arc::new(CountingTool::new("read_file", true));
        let mut registry = ToolRegistry::new();
        registry.register(reader.clone());
        let cache = Arc::new(ToolCache::new(10, CachePolicy::default()));
        let scheduler = ParallelScheduler::new(Arc::new(registry)).with_cache(cache.clone());

        let calls = [call("1", "read_file", json!({"path": "a.txt"}))];
        let first = scheduler.execute(&calls, None).await;
        let second = scheduler.execute(&calls, None).await;

        assert!(!first[0].was_cached);
        assert!(second[0].was_cached);
        assert_eq!(first[0].result, second[0].result);
        assert_eq!(reader.calls(), 1);
    }

    #[tokio::test]
    async fn non_cacheable_tools_bypass_cache() {
        let writer = Arc::new(CountingTool::new("write_file", false));
        let mut registry = ToolRegistry::new();
        registry.register(writer.clone());
        let cache = Arc::new(ToolCache::new(10, CachePolicy::default()));
        let scheduler = ParallelScheduler::new(Arc::new(registry)).with_cache(cache.clone());

        let calls = [call("1", "write_file", json!({"path": "a.txt"}))];
        scheduler.execute(&calls, None).await;
        scheduler.execute(&calls, None).await;
        assert_eq!(writer.calls(), 2);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool::new("read_file", true).failing()));
        let scheduler = ParallelScheduler::new(Arc::new(registry));

        let results = scheduler.execute(&[call("1", "read_file", json!({"path": "nope"}))], None).await;
        assert!(results[0].is_error);
        assert!(results[0].result.starts_with("Error executing tool: "));
        assert_eq!(results[0].failure.as_ref().map(|f| f.kind.as_str()), Some("FileNotFound"));
    }

    #[tokio::test]
    async fn cancelled_token_skips_unstarted_batches() {
        let reader = Arc::new(CountingTool::new("read_file", true));
        let mut registry = ToolRegistry::new();
        registry.register(reader.clone());
        let scheduler = ParallelScheduler::new(Arc::new(registry));
        let token = CancellationToken::new();
        token.cancel(Some("stop"));

        let results = scheduler
            .execute(&[call("1", "read_file", json!({"path": "a"}))], Some(&token))
            .await;
        assert_eq!(results[0].result, SKIPPED_ON_CANCEL_MESSAGE);
        assert!(results[0].is_error);
        assert_eq!(reader.calls(), 0);
    }
}
