//! `cadence chat` — Single-message or interactive chat against the mock backend.

use async_trait::async_trait;
use cadence_agent::{ConversationLoop, LoopEvent, LoopEventKind, ParallelScheduler, RunOptions, RunSummary, ToolCache};
use cadence_config::AppConfig;
use cadence_core::cancellation::CancellationToken;
use cadence_core::message::Session;
use cadence_core::tool::RiskLevel;
use cadence_providers::MockProvider;
use cadence_security::{FixedPrompt, PermissionManager, PermissionPrompt};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub struct ChatArgs {
    pub message: Option<String>,
    pub yes: bool,
    pub max_iterations: Option<u32>,
    pub max_tokens: Option<u64>,
    pub json: bool,
}

/// Asks on the terminal before running a tool that is not auto-approved.
struct TerminalPrompt;

#[async_trait]
impl PermissionPrompt for TerminalPrompt {
    async fn confirm(&self, tool_name: &str, risk: RiskLevel, arguments: &serde_json::Value) -> bool {
        let question = format!("  Allow {tool_name} ({risk}) with {arguments}? [y/N] ");
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("{question}");
            let _ = std::io::stderr().flush();
            read_line()
        })
        .await
        .ok()
        .flatten();

        matches!(answer.as_deref().map(str::trim), Some("y" | "Y" | "yes"))
    }
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let cwd = std::env::current_dir()?;

    let prompt: Arc<dyn PermissionPrompt> = if args.yes {
        Arc::new(FixedPrompt(true))
    } else {
        Arc::new(TerminalPrompt)
    };
    let permissions = PermissionManager::new(config.permissions.session_override).with_prompt(prompt);

    let tools = Arc::new(cadence_tools::default_registry(&cwd));
    let cache = Arc::new(ToolCache::from_config(&config.cache));
    let scheduler = ParallelScheduler::new(tools)
        .with_cache(cache)
        .with_permissions(Arc::new(permissions));
    let agent = ConversationLoop::new(Arc::new(MockProvider::new()), scheduler);

    let token = Arc::new(CancellationToken::new());
    let mut options = RunOptions::from_config(&config.agent).with_cancellation(token.clone());
    if let Some(max) = args.max_iterations {
        options = options.with_max_iterations(max);
    }
    if let Some(max) = args.max_tokens {
        options = options.with_max_tokens(max);
    }

    debug!(
        cwd = %cwd.display(),
        max_iterations = options.max_iterations,
        max_tokens = ?options.max_tokens,
        auto_confirm = args.yes,
        "Starting chat session"
    );

    {
        let token = token.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                token.cancel(Some("Interrupted by user"));
            }
        });
    }

    let mut session = Session::new(&cwd);

    if let Some(msg) = args.message {
        run_turn(&agent, &mut session, &msg, &options, args.json).await;
        return Ok(());
    }

    println!();
    println!("  cadence — interactive mode (mock backend)");
    println!("  Tools:  {}", agent.scheduler().tools().names().join(", "));
    println!("  Type 'exit' to quit. Ctrl+C cancels the current turn.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = tokio::task::spawn_blocking(read_line).await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        token.reset();
        run_turn(&agent, &mut session, input, &options, args.json).await;
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

async fn run_turn(
    agent: &ConversationLoop,
    session: &mut Session,
    input: &str,
    options: &RunOptions,
    json: bool,
) -> RunSummary {
    let (tx, mut rx) = mpsc::channel(128);
    let run = async move {
        let summary = agent.run(session, input, options, &tx).await;
        drop(tx);
        summary
    };
    let print = async {
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            } else {
                print_event(&event);
            }
        }
    };
    let (summary, ()) = tokio::join!(run, print);
    summary
}

fn print_event(event: &LoopEvent) {
    match &event.kind {
        LoopEventKind::Text { content } => {
            for line in content.lines() {
                println!("  Assistant > {line}");
            }
        }
        LoopEventKind::ToolCall {
            tool_name, arguments, ..
        } => println!("  [tool] {tool_name} {arguments}"),
        LoopEventKind::CacheHit { tool_name, .. } => println!("  [cache] {tool_name} served from cache"),
        LoopEventKind::ToolResult {
            content,
            is_error,
            error_type,
            suggestions,
            ..
        } => {
            let marker = if *is_error { "error" } else { "result" };
            for line in content.lines().take(20) {
                println!("  [{marker}] {line}");
            }
            if let Some(error_type) = error_type {
                println!("  [{marker}] type: {error_type}");
            }
            for s in suggestions {
                println!("  [hint] {s}");
            }
        }
        LoopEventKind::PermissionDenied { tool_name, content, .. } => {
            println!("  [denied] {tool_name}: {content}")
        }
        LoopEventKind::IterationLimitReached { max_iterations } => {
            println!("  [stop] iteration limit reached ({max_iterations})")
        }
        LoopEventKind::TokenLimitReached { max_tokens } => {
            println!("  [stop] token limit reached ({max_tokens})")
        }
        LoopEventKind::LlmError {
            error_type,
            error_message,
            retryable,
            ..
        } => println!("  [llm error] {}: {error_message} (retryable: {retryable})", error_type.as_str()),
        LoopEventKind::Cancelled { cancel_reason } => {
            println!("  [cancelled] {}", cancel_reason.as_deref().unwrap_or("no reason given"))
        }
        LoopEventKind::Finished { usage } => println!(
            "  [done] {} iterations, {} tokens",
            event.iteration, usage.total_tokens
        ),
    }
}
