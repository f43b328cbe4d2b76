//! Mock provider — keyword-triggered canned responses.
//!
//! Used for demos and offline runs. Every response reports the same fixed
//! token usage so token limits can be exercised deterministically.

use async_trait::async_trait;
use cadence_core::error::ProviderError;
use cadence_core::message::Role;
use cadence_core::provider::*;
use regex_lite::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub const MOCK_PROMPT_TOKENS: u64 = 100;
pub const MOCK_COMPLETION_TOKENS: u64 = 50;

static READ_TRIGGER: LazyLock<Regex> =
    LazyLock::new(|| trigger(r"\bread\b.*\bfile\b|\bshow\b.*\bfile\b|\bcat\b"));
static LIST_TRIGGER: LazyLock<Regex> =
    LazyLock::new(|| trigger(r"\blist\b.*\b(files?|director(y|ies))\b|\bls\b|\bdir\b"));
static SHELL_TRIGGER: LazyLock<Regex> =
    LazyLock::new(|| trigger(r"\brun\b|\bexecute\b|\bshell\b|\bcommand\b"));
static GREETING: LazyLock<Regex> = LazyLock::new(|| trigger(r"\b(hello|hi|hey|greetings)\b"));
static HELP: LazyLock<Regex> =
    LazyLock::new(|| trigger(r"\bhelp\b|\bwhat can you do\b|\bcapabilities\b"));

/// Compile a case-insensitive trigger. Patterns are literals above.
fn trigger(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("trigger pattern is a valid literal")
}

const KNOWN_COMMANDS: &[&str] = &["ls", "cat", "echo", "git", "cargo", "pwd", "wc"];

const GREETING_TEXT: &str = "Hello! I'm cadence, your coding assistant. I can help you with:

- Reading files: \"read file README.md\"
- Listing directories: \"list files in src/\"
- Writing files
- Running commands: \"run 'ls -la'\"

What would you like me to help you with today?";

const HELP_TEXT: &str = "I'm a coding assistant with access to these tools:

1. read_file - Read contents of any file
2. list_files - List directory contents
3. write_file - Create or overwrite files
4. shell - Execute shell commands

Just describe what you'd like to do in natural language!";

const FOLLOW_UP_TEXT: &str =
    "I've completed the requested operation. Is there anything else you'd like me to help with?";

/// A provider that answers from canned responses, no network involved.
pub struct MockProvider {
    delay: Option<Duration>,
    usage: Usage,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            delay: None,
            usage: Usage::new(MOCK_PROMPT_TOKENS, MOCK_COMPLETION_TOKENS),
        }
    }

    /// Sleep before each response, for a more realistic feel.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Override the usage reported with every response.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    fn respond(&self, content: Vec<ResponseBlock>, stop_reason: &str) -> ProviderResponse {
        ProviderResponse {
            content,
            stop_reason: Some(stop_reason.into()),
            usage: Some(self.usage),
        }
    }

    fn tool_call(&self, preface: String, id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
        self.respond(
            vec![
                ResponseBlock::Text { text: preface },
                ResponseBlock::ToolUse {
                    id: id.into(),
                    name: name.into(),
                    input,
                },
            ],
            "tool_use",
        )
    }

    fn check_tool_triggers(&self, message: &str, tools: &[ToolSchema]) -> Option<ProviderResponse> {
        let has_tool = |name: &str| tools.iter().any(|t| t.name == name);

        if has_tool("read_file") && READ_TRIGGER.is_match(message) {
            let filename = extract_filename(message).unwrap_or_else(|| "README.md".into());
            return Some(self.tool_call(
                format!("I'll read the file `{filename}` for you."),
                "mock_call_1",
                "read_file",
                serde_json::json!({ "path": filename }),
            ));
        }

        if has_tool("list_files") && LIST_TRIGGER.is_match(message) {
            let path = extract_path(message).unwrap_or_else(|| ".".into());
            return Some(self.tool_call(
                format!("I'll list the contents of `{path}`."),
                "mock_call_2",
                "list_files",
                serde_json::json!({ "path": path }),
            ));
        }

        if has_tool("shell") && SHELL_TRIGGER.is_match(message) {
            let command = extract_command(message).unwrap_or_else(|| "echo 'Hello from mock shell'".into());
            return Some(self.tool_call(
                "I'll execute the shell command for you.".into(),
                "mock_call_3",
                "shell",
                serde_json::json!({ "command": command }),
            ));
        }

        None
    }

    fn text_response(&self, message: &str) -> ProviderResponse {
        let text = if GREETING.is_match(message) {
            GREETING_TEXT.to_string()
        } else if HELP.is_match(message) {
            HELP_TEXT.to_string()
        } else {
            format!(
                "I understand you want help with: \"{message}\"\n\n\
                 Could you be more specific? For example:\n\
                 - \"read file Cargo.toml\"\n\
                 - \"list files in the current directory\"\n\
                 - \"run 'git status'\""
            )
        };
        self.respond(vec![ResponseBlock::Text { text }], "end_turn")
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if request.messages.last().is_some_and(|m| m.role == Role::Tool) {
            return Ok(self.respond(vec![ResponseBlock::Text { text: FOLLOW_UP_TEXT.into() }], "end_turn"));
        }

        let message = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.as_deref())
            .unwrap_or("");

        debug!(message_len = message.len(), tools = request.tools.len(), "Mock provider request");

        Ok(self
            .check_tool_triggers(message, &request.tools)
            .unwrap_or_else(|| self.text_response(message)))
    }
}

/// The first quoted span in the message, if any.
fn quoted(message: &str) -> Option<String> {
    for quote in ['\'', '"', '`'] {
        if let Some(start) = message.find(quote)
            && let Some(len) = message[start + 1..].find(quote)
            && len > 0
        {
            return Some(message[start + 1..start + 1 + len].to_string());
        }
    }
    None
}

fn tokens(message: &str) -> impl Iterator<Item = &str> {
    message
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, ',' | ';' | '!' | '?' | '(' | ')')))
        .map(|t| t.strip_suffix('.').filter(|s| !s.is_empty() && *s != ".").unwrap_or(t))
}

fn extract_filename(message: &str) -> Option<String> {
    let looks_like_file = |t: &str| {
        t.rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    };
    if let Some(q) = quoted(message)
        && looks_like_file(q.as_str())
    {
        return Some(q);
    }
    tokens(message).find(|t| looks_like_file(*t)).map(String::from)
}

fn extract_path(message: &str) -> Option<String> {
    if let Some(q) = quoted(message) {
        return Some(q);
    }
    tokens(message)
        .find(|t| *t == "." || *t == ".." || t.contains('/'))
        .map(String::from)
}

fn extract_command(message: &str) -> Option<String> {
    if let Some(q) = quoted(message) {
        return Some(q);
    }
    let words: Vec<&str> = message.split_whitespace().collect();
    let start = words.iter().position(|w| KNOWN_COMMANDS.contains(w))?;
    Some(words[start..].join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    fn request(text: &str) -> ProviderRequest {
        ProviderRequest {
            messages: vec![WireMessage::text(Role::User, text)],
            tools: vec![schema("read_file"), schema("list_files"), schema("shell")],
        }
    }

    fn tool_use(response: &ProviderResponse) -> Option<(&str, &serde_json::Value)> {
        response.content.iter().find_map(|b| match b {
            ResponseBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    #[tokio::test]
    async fn read_file_trigger_extracts_filename() {
        let provider = MockProvider::new();
        let response = provider.complete(request("please read the file src/main.rs")).await.unwrap();
        let (name, input) = tool_use(&response).unwrap();
        assert_eq!(name, "read_file");
        assert_eq!(input["path"], "src/main.rs");
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    }

    #[tokio::test]
    async fn read_file_defaults_to_readme() {
        let provider = MockProvider::new();
        let response = provider.complete(request("read that file")).await.unwrap();
        let (_, input) = tool_use(&response).unwrap();
        assert_eq!(input["path"], "README.md");
    }

    #[tokio::test]
    async fn list_trigger() {
        let provider = MockProvider::new();
        let response = provider.complete(request("list files in src/")).await.unwrap();
        let (name, input) = tool_use(&response).unwrap();
        assert_eq!(name, "list_files");
        assert_eq!(input["path"], "src/");
    }

    #[tokio::test]
    async fn shell_trigger_uses_quoted_command() {
        let provider = MockProvider::new();
        let response = provider.complete(request("run 'git status'")).await.unwrap();
        let (name, input) = tool_use(&response).unwrap();
        assert_eq!(name, "shell");
        assert_eq!(input["command"], "git status");
    }

    #[test]
    fn command_from_known_word() {
        assert_eq!(extract_command("please run ls -la now").as_deref(), Some("ls -la now"));
        assert_eq!(extract_command("run ls").as_deref(), Some("ls"));
        assert_eq!(extract_command("run it"), None);
    }

    #[test]
    fn triggers_compile_and_ignore_case() {
        assert!(READ_TRIGGER.is_match("Please READ the FILE"));
        assert!(LIST_TRIGGER.is_match("List Directories"));
        assert!(SHELL_TRIGGER.is_match("EXECUTE this"));
        assert!(GREETING.is_match("Hey"));
        assert!(HELP.is_match("What can you do?"));
        assert!(!GREETING.is_match("this is fine"));
    }

    #[tokio::test]
    async fn bare_known_command_is_used() {
        let provider = MockProvider::new();
        let response = provider.complete(request("run pwd")).await.unwrap();
        let (name, input) = tool_use(&response).unwrap();
        assert_eq!(name, "shell");
        assert_eq!(input["command"], "pwd");
    }

    #[tokio::test]
    async fn trigger_needs_registered_tool() {
        let provider = MockProvider::new();
        let req = ProviderRequest {
            messages: vec![WireMessage::text(Role::User, "read file a.txt")],
            tools: vec![],
        };
        let response = provider.complete(req).await.unwrap();
        assert!(tool_use(&response).is_none());
    }

    #[tokio::test]
    async fn follow_up_after_tool_result() {
        let provider = MockProvider::new();
        let mut req = request("read file a.txt");
        req.messages.push(WireMessage::tool("mock_call_1", "contents"));
        let response = provider.complete(req).await.unwrap();
        assert!(tool_use(&response).is_none());
        match &response.content[0] {
            ResponseBlock::Text { text } => assert!(text.starts_with("I've completed")),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn greeting_and_fixed_usage() {
        let provider = MockProvider::new();
        let response = provider.complete(request("hello there")).await.unwrap();
        match &response.content[0] {
            ResponseBlock::Text { text } => assert!(text.starts_with("Hello!")),
            other => panic!("unexpected block: {other:?}"),
        }
        assert_eq!(response.usage.unwrap().total_tokens, 150);
    }

    #[tokio::test]
    async fn unknown_request_echoes_message() {
        let provider = MockProvider::new();
        let response = provider.complete(request("refactor everything")).await.unwrap();
        match &response.content[0] {
            ResponseBlock::Text { text } => assert!(text.contains("\"refactor everything\"")),
            other => panic!("unexpected block: {other:?}"),
        }
    }
}
