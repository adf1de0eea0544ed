//! Parse one stdout line into a typed message.

use serde_json::{Map, Value};

use crate::error::LineParseError;
use crate::message::{
    AssistantMessage, ContentBlock, Message, ResultMessage, SystemMessage, TextBlock,
    ToolResultBlock, ToolUseBlock, UserMessage,
};

/// Parse a single stdout line.
///
/// Returns `Ok(None)` for blank lines and for well-formed JSON the CLI
/// emits that this crate does not model (missing or unrecognized `type`,
/// missing required fields). Returns `Err` only when the line is not JSON
/// at all. `line_number` is the 1-based position of the line in the stream.
pub fn parse_line(line: &str, line_number: u64) -> Result<Option<Message>, LineParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let raw: Value = serde_json::from_str(trimmed)
        .map_err(|source| LineParseError::new(line, line_number, source))?;

    Ok(typed_message(&raw))
}

fn typed_message(raw: &Value) -> Option<Message> {
    let object = raw.as_object()?;

    match object.get("type").and_then(Value::as_str)? {
        "user" => user_message(object),
        "assistant" => assistant_message(object),
        "system" => system_message(object),
        "result" => result_message(object),
        _ => None,
    }
}

fn user_message(object: &Map<String, Value>) -> Option<Message> {
    let content = nested_field(object, "content")?.as_str()?.to_string();
    Some(Message::User(UserMessage { content }))
}

fn assistant_message(object: &Map<String, Value>) -> Option<Message> {
    let blocks = nested_field(object, "content")?
        .as_array()?
        .iter()
        .map(content_block)
        .collect::<Option<Vec<_>>>()?;
    Some(Message::Assistant(AssistantMessage { content: blocks }))
}

fn system_message(object: &Map<String, Value>) -> Option<Message> {
    let subtype = object.get("subtype").and_then(Value::as_str)?.to_string();

    let mut data = object.clone();
    data.remove("type");
    data.remove("subtype");

    Some(Message::System(SystemMessage { subtype, data }))
}

fn result_message(object: &Map<String, Value>) -> Option<Message> {
    let subtype = object.get("subtype").and_then(Value::as_str)?.to_string();
    let duration_ms = int_field(object, "duration_ms")?;
    let duration_api_ms = int_field(object, "duration_api_ms")?;
    let is_error = object.get("is_error").and_then(Value::as_bool)?;
    let num_turns = int_field(object, "num_turns")?;
    let session_id = object.get("session_id").and_then(Value::as_str)?.to_string();

    let total_cost_usd = object.get("total_cost_usd").and_then(Value::as_f64);
    let usage = object.get("usage").and_then(Value::as_object).cloned();
    let result = object
        .get("result")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    Some(Message::Result(ResultMessage {
        subtype,
        duration_ms,
        duration_api_ms,
        is_error,
        num_turns,
        session_id,
        total_cost_usd,
        usage,
        result,
    }))
}

fn content_block(raw: &Value) -> Option<ContentBlock> {
    match raw.get("type").and_then(Value::as_str)? {
        "text" => {
            let text = raw.get("text").and_then(Value::as_str)?.to_string();
            Some(ContentBlock::Text(TextBlock { text }))
        }
        "tool_use" => {
            let id = raw.get("id").and_then(Value::as_str)?.to_string();
            let name = raw.get("name").and_then(Value::as_str)?.to_string();
            let input = raw.get("input").and_then(Value::as_object)?.clone();
            Some(ContentBlock::ToolUse(ToolUseBlock { id, name, input }))
        }
        "tool_result" => {
            let tool_use_id = raw
                .get("tool_use_id")
                .or_else(|| raw.get("toolUseId"))
                .and_then(Value::as_str)?
                .to_string();
            let content = raw
                .get("content")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            let is_error = raw.get("is_error").and_then(Value::as_bool);
            Some(ContentBlock::ToolResult(ToolResultBlock {
                tool_use_id,
                content,
                is_error,
            }))
        }
        _ => None,
    }
}

// The CLI nests message payloads under "message" but older records carry
// the field at the top level.
fn nested_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .get("message")
        .and_then(Value::as_object)
        .and_then(|message| message.get(key))
        .or_else(|| object.get(key))
}

fn int_field(object: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = object.get(key)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}
