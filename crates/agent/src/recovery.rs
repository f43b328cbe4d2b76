//! Error recovery advisor.
//!
//! Classifies a tool failure into an [`ErrorType`] with a retry policy and
//! actionable suggestions. Resolution order:
//!
//! 1. exact match of the failure kind against the kind rules
//! 2. "is-a" match through the failure's lineage
//! 3. case-insensitive regex match of the message against the message rules
//! 4. `Unknown`, non-retryable, with a generic suggestion
//!
//! Both rule lists are ordered and can be extended at runtime.

use cadence_core::error::Failure;
use regex_lite::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

const MAX_SIMILAR_PATHS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    FileNotFound,
    PermissionDenied,
    IsADirectory,
    FileExists,
    NotADirectory,
    GitNotARepository,
    GitConflict,
    GitNoRemote,
    ModuleNotFound,
    Timeout,
    ConnectionError,
    SyntaxError,
    DecodeError,
    InvalidArgument,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::IsADirectory => "is_a_directory",
            Self::FileExists => "file_exists",
            Self::NotADirectory => "not_a_directory",
            Self::GitNotARepository => "git_not_a_repository",
            Self::GitConflict => "git_conflict",
            Self::GitNoRemote => "git_no_remote",
            Self::ModuleNotFound => "module_not_found",
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::SyntaxError => "syntax_error",
            Self::DecodeError => "decode_error",
            Self::InvalidArgument => "invalid_argument",
            Self::Unknown => "unknown",
        }
    }

    /// Only transient categories are retryable by default.
    pub fn default_retry(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionError)
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do about a failed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryAction {
    pub error_type: ErrorType,
    pub should_retry: bool,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_args: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub similar_paths: Vec<String>,
}

#[derive(Debug, Clone)]
struct KindRule {
    kind: String,
    error_type: ErrorType,
    suggestions: Vec<String>,
    retry: bool,
}

#[derive(Debug, Clone)]
struct MessageRule {
    pattern: Regex,
    error_type: ErrorType,
    suggestions: Vec<String>,
}

/// Constructible classifier owning the kind rules and message rules.
#[derive(Debug, Clone)]
pub struct ErrorRecovery {
    kind_rules: Vec<KindRule>,
    message_rules: Vec<MessageRule>,
}

impl ErrorRecovery {
    /// A classifier preloaded with the built-in rules.
    pub fn new() -> Self {
        let mut recovery = Self::empty();
        recovery.install_default_kind_rules();
        recovery.install_default_message_rules();
        recovery
    }

    /// A classifier with no rules; everything classifies as `Unknown`.
    pub fn empty() -> Self {
        Self {
            kind_rules: Vec::new(),
            message_rules: Vec::new(),
        }
    }

    /// Register (or replace) a rule for a failure kind.
    pub fn add_kind_rule(
        &mut self,
        kind: impl Into<String>,
        error_type: ErrorType,
        suggestions: Vec<String>,
        retry: bool,
    ) {
        let kind = kind.into();
        let rule = KindRule {
            kind: kind.clone(),
            error_type,
            suggestions,
            retry,
        };
        match self.kind_rules.iter_mut().find(|r| r.kind == kind) {
            Some(existing) => *existing = rule,
            None => self.kind_rules.push(rule),
        }
    }

    /// Append a case-insensitive message rule. Suggestions may use
    /// `{module}` for the first capture group.
    pub fn add_message_rule(
        &mut self,
        pattern: &str,
        error_type: ErrorType,
        suggestions: Vec<String>,
    ) -> Result<(), regex_lite::Error> {
        let pattern = Regex::new(&format!("(?i){pattern}"))?;
        self.message_rules.push(MessageRule {
            pattern,
            error_type,
            suggestions,
        });
        Ok(())
    }

    /// Classify a failure raised by `tool_name`. `context` is the tool's
    /// argument object (used for `{path}` and the path/timeout hints).
    pub fn handle_tool_error(&self, tool_name: &str, failure: &Failure, context: &Value) -> RecoveryAction {
        let by_kind = self
            .kind_rules
            .iter()
            .find(|r| r.kind == failure.kind)
            .or_else(|| self.kind_rules.iter().find(|r| failure.is_a(&r.kind)));

        let (error_type, should_retry, suggestions) = if let Some(rule) = by_kind {
            let suggestions = contextualize(&rule.suggestions, tool_name, &failure.message, context, None);
            (rule.error_type, rule.retry, suggestions)
        } else if let Some((rule, caps)) = self
            .message_rules
            .iter()
            .find_map(|r| r.pattern.captures(&failure.message).map(|c| (r, c)))
        {
            let suggestions =
                contextualize(&rule.suggestions, tool_name, &failure.message, context, Some(&caps));
            (rule.error_type, rule.error_type.default_retry(), suggestions)
        } else {
            return RecoveryAction {
                error_type: ErrorType::Unknown,
                should_retry: false,
                suggestions: vec![
                    format!("Error in {tool_name}: {}", failure.message),
                    "Check the tool arguments and try again.".into(),
                    "Review the error message for more details.".into(),
                ],
                modified_args: None,
                similar_paths: Vec::new(),
            };
        };

        let similar_paths = if error_type == ErrorType::FileNotFound {
            context_path(context).map(similar_paths).unwrap_or_default()
        } else {
            Vec::new()
        };

        let modified_args = if error_type == ErrorType::Timeout {
            doubled_timeout(context)
        } else {
            None
        };

        RecoveryAction {
            error_type,
            should_retry,
            suggestions,
            modified_args,
            similar_paths,
        }
    }

    fn install_default_kind_rules(&mut self) {
        let rules: &[(&str, ErrorType, &[&str])] = &[
            (
                "FileNotFound",
                ErrorType::FileNotFound,
                &[
                    "Check if the file path is correct.",
                    "Use list_files or find_files to see available files.",
                    "The file may have been moved or deleted.",
                ],
            ),
            (
                "PermissionDenied",
                ErrorType::PermissionDenied,
                &[
                    "File permissions issue. Check file ownership and permissions.",
                    "Try running with appropriate permissions.",
                    "The file may be locked by another process.",
                ],
            ),
            (
                "IsADirectory",
                ErrorType::IsADirectory,
                &[
                    "The path is a directory, not a file.",
                    "Use list_files to see directory contents.",
                    "Specify a file path instead of a directory path.",
                ],
            ),
            (
                "FileExists",
                ErrorType::FileExists,
                &[
                    "A file already exists at this location.",
                    "Use a different filename or path.",
                    "Use edit_file to modify the existing file instead.",
                ],
            ),
            (
                "NotADirectory",
                ErrorType::NotADirectory,
                &[
                    "A component of the path is not a directory.",
                    "Check that parent directories exist.",
                ],
            ),
            (
                "GitError",
                ErrorType::GitNotARepository,
                &[
                    "Not inside a git repository.",
                    "Initialize with 'git init' or navigate to a git repository.",
                    "Use git_status to verify repository state.",
                ],
            ),
            (
                "Timeout",
                ErrorType::Timeout,
                &[
                    "The operation timed out.",
                    "Try increasing the timeout value.",
                    "The target may be slow or unresponsive.",
                ],
            ),
            (
                "ConnectionError",
                ErrorType::ConnectionError,
                &[
                    "Failed to establish a connection.",
                    "Check network connectivity.",
                    "The target host may be down or unreachable.",
                ],
            ),
            (
                "DecodeError",
                ErrorType::DecodeError,
                &[
                    "Invalid JSON format.",
                    "Check that the input is valid JSON.",
                    "The response may not be JSON content.",
                ],
            ),
            (
                "SyntaxError",
                ErrorType::SyntaxError,
                &[
                    "Syntax error in the code or input.",
                    "Check for missing brackets, quotes, or other syntax issues.",
                ],
            ),
            (
                "InvalidArgument",
                ErrorType::InvalidArgument,
                &[
                    "Invalid value provided.",
                    "Check the argument requirements.",
                ],
            ),
        ];

        for (kind, error_type, suggestions) in rules {
            self.add_kind_rule(
                *kind,
                *error_type,
                suggestions.iter().map(|s| s.to_string()).collect(),
                error_type.default_retry(),
            );
        }
    }

    fn install_default_message_rules(&mut self) {
        let rules: &[(&str, ErrorType, &[&str])] = &[
            (
                r"No such file or directory",
                ErrorType::FileNotFound,
                &["The specified path does not exist.", "Use find_files to locate the file."],
            ),
            (
                r"Permission denied",
                ErrorType::PermissionDenied,
                &["Insufficient permissions.", "Check file permissions."],
            ),
            (
                r"not a git repository",
                ErrorType::GitNotARepository,
                &["Not inside a git repository.", "Run git init or navigate to a repo."],
            ),
            (
                r"CONFLICT|merge conflict",
                ErrorType::GitConflict,
                &["Git merge conflict detected.", "Resolve conflicts before proceeding."],
            ),
            (
                r"No (such )?remote",
                ErrorType::GitNoRemote,
                &[
                    "No remote repository configured.",
                    "Add a remote with: git remote add origin <url>",
                ],
            ),
            (
                r#"No module named ['"]?(\w+)"#,
                ErrorType::ModuleNotFound,
                &["Python module not installed.", "Install with: pip install {module}"],
            ),
            (
                r"ModuleNotFoundError",
                ErrorType::ModuleNotFound,
                &["Required module not found.", "Install missing dependencies."],
            ),
            (
                r"timed? ?out",
                ErrorType::Timeout,
                &["Operation timed out.", "Try again or increase timeout."],
            ),
            (
                r"Connection (refused|reset|closed)",
                ErrorType::ConnectionError,
                &["Connection failed.", "Check network and target availability."],
            ),
            (
                r"ECONNREFUSED|ENOTFOUND|EHOSTUNREACH",
                ErrorType::ConnectionError,
                &["Network connection error.", "Verify the target address."],
            ),
            (
                r"Invalid JSON|JSON.*invalid|Expecting.*JSON",
                ErrorType::DecodeError,
                &["Invalid JSON data.", "Verify JSON format."],
            ),
        ];

        for (pattern, error_type, suggestions) in rules {
            // Built-in patterns are known to compile.
            let _ = self.add_message_rule(
                pattern,
                *error_type,
                suggestions.iter().map(|s| s.to_string()).collect(),
            );
        }
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new()
    }
}

fn contextualize(
    suggestions: &[String],
    tool_name: &str,
    message: &str,
    context: &Value,
    caps: Option<&Captures<'_>>,
) -> Vec<String> {
    let module = caps.and_then(|c| c.get(1)).map(|m| m.as_str());
    let path = context_path(context);

    let mut result: Vec<String> = suggestions
        .iter()
        .map(|s| {
            let mut s = s.replace("{tool}", tool_name);
            if let Some(module) = module {
                s = s.replace("{module}", module);
            }
            if s.contains("{path}") {
                s = s.replace("{path}", path.unwrap_or(""));
            }
            s
        })
        .collect();

    if tool_name.starts_with("git_")
        && message.to_lowercase().contains("repository")
        && !result.iter().any(|s| s.contains("Initialize with"))
    {
        result.push("Ensure you're in a git repository directory.".into());
    }

    result
}

/// `path`, then `file_path`, then the first of `paths`.
fn context_path(context: &Value) -> Option<&str> {
    context
        .get("path")
        .and_then(Value::as_str)
        .or_else(|| context.get("file_path").and_then(Value::as_str))
        .or_else(|| {
            context
                .get("paths")
                .and_then(Value::as_array)
                .and_then(|p| p.first())
                .and_then(Value::as_str)
        })
}

/// Up to five siblings of `path` whose names resemble its file name.
fn similar_paths(path: &str) -> Vec<String> {
    let target = Path::new(path);
    let Some(name) = target.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };

    let wanted = name.to_lowercase();
    let wanted_stem = stem(&wanted);
    let mut found: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|candidate| {
            let lower = candidate.to_lowercase();
            lower != wanted
                && (stem(&lower) == wanted_stem
                    || lower.contains(wanted_stem)
                    || (stem(&lower).len() >= 3 && wanted_stem.contains(stem(&lower)))
                    || edit_distance(&lower, &wanted) <= 2)
        })
        .map(|candidate| parent.join(candidate).to_string_lossy().into_owned())
        .collect();
    found.sort();
    found.truncate(MAX_SIMILAR_PATHS);
    found
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

fn doubled_timeout(context: &Value) -> Option<Value> {
    let timeout = context.get("timeout")?.as_f64()?;
    let mut args = context.as_object()?.clone();
    let doubled = if timeout.fract() == 0.0 && timeout >= 0.0 {
        Value::from((timeout as u64).saturating_mul(2))
    } else {
        Value::from(timeout * 2.0)
    };
    args.insert("timeout".into(), doubled);
    Some(Value::Object(args))
}
