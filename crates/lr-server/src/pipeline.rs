//! Pure helpers the request pipeline needs beyond what `AppState` and
//! the individual crates already expose: pulling plain text out of a
//! chat-completions body, and writing redacted text back into it. Kept
//! free of axum/HTTP types so they're trivially unit tested without
//! spinning up a router.

use serde_json::Value;

use lr_guardrails::scan_for_pii;
use lr_types::PiiAction;

/// Concatenate the textual parts of a single message's `content` field,
/// which is either a plain string or a list of `{type, text}` parts.
pub fn extract_message_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Extract the full prompt text scanned by injection/PII detection:
/// every message's `content`, newline-joined.
pub fn extract_prompt_text(body: &Value) -> String {
    body.get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|m| extract_message_text(m.get("content").unwrap_or(&Value::Null)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The requested model, or `""` if the field is absent — an empty
/// allowlist still means "all allowed", so callers must check the
/// allowlist before rejecting on an empty model.
pub fn requested_model(body: &Value) -> String {
    body.get("model").and_then(Value::as_str).unwrap_or("").to_string()
}

/// `true` iff the client asked for a streamed response.
pub fn is_streaming_requested(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

/// Index of the last message with `role == "user"`, if any.
fn last_user_message_index(messages: &[Value]) -> Option<usize> {
    messages.iter().rposition(|m| m.get("role").and_then(Value::as_str) == Some("user"))
}

/// Redact PII in the last user message's own content and write it back
/// into `body` in place.
///
/// The block/allow decision for the request as a whole is made against
/// the full concatenated prompt, but only the last user message is ever
/// mutated — rewriting the whole concatenated prompt back into message
/// fields would lose the message boundaries the array depends on.
/// Re-running the scanner narrowly on just that message's own text
/// keeps the redaction local to the turn that introduced it. Returns
/// `true` if anything was changed.
pub fn redact_last_user_message(body: &mut Value) -> bool {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return false;
    };
    let Some(idx) = last_user_message_index(messages) else {
        return false;
    };

    let message = &mut messages[idx];
    let Some(content) = message.get("content").cloned() else {
        return false;
    };

    match content {
        Value::String(text) => {
            let result = scan_for_pii(&text, PiiAction::Redact);
            if let Some(redacted) = result.redacted_content {
                message["content"] = Value::String(redacted);
                return true;
            }
            false
        }
        Value::Array(mut parts) => {
            let mut changed = false;
            for part in parts.iter_mut() {
                if part.get("type").and_then(Value::as_str) != Some("text") {
                    continue;
                }
                let Some(text) = part.get("text").and_then(Value::as_str).map(str::to_string) else {
                    continue;
                };
                let result = scan_for_pii(&text, PiiAction::Redact);
                if let Some(redacted) = result.redacted_content {
                    part["text"] = Value::String(redacted);
                    changed = true;
                }
            }
            if changed {
                message["content"] = Value::Array(parts);
            }
            changed
        }
        _ => false,
    }
}

/// Extract the assistant's reply text from a non-streaming provider
/// response body (`choices[0].message.content`), for the response
/// scanner.
pub fn extract_assistant_text(response_body: &Value) -> String {
    response_body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
