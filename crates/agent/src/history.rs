//! History → backend wire conversion.

use cadence_core::message::{ContentBlock, Message, Role};
use cadence_core::provider::{WireMessage, WireToolCall};

/// Convert session history (plus an optional system prompt) to wire form.
///
/// - plain text messages pass through
/// - assistant messages with tool-use blocks carry a tool-call list, with
///   their text flattened into one content field
/// - tool-result blocks become one `tool` message each
pub fn to_wire(messages: &[Message], system_prompt: Option<&str>) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt {
        wire.push(WireMessage::text(Role::System, prompt));
    }

    for message in messages {
        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(WireToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.to_string(),
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => tool_results.push(WireMessage::tool(tool_use_id, content)),
            }
        }

        wire.extend(tool_results);

        if !tool_calls.is_empty() {
            wire.push(WireMessage {
                role: message.role,
                content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                tool_calls,
                tool_call_id: None,
            });
        } else if !text_parts.is_empty() || message.content.is_empty() {
            wire.push(WireMessage::text(message.role, text_parts.join("\n")));
        }
    }

    wire
}

/// Rough token estimate of a wire payload (4 chars ≈ 1 token).
pub fn estimate_tokens(wire: &[WireMessage]) -> usize {
    wire.iter()
        .map(|m| {
            m.content.as_deref().map_or(0, str::len)
                + m.tool_calls
                    .iter()
                    .map(|c| c.name.len() + c.arguments.len())
                    .sum::<usize>()
        })
        .sum::<usize>()
        / 4
}
