use super::message::AssistantMessage;
use crate::types::Delta;
use serde_json::{Map, Value};

/// Folds one streamed fragment into the in-progress assistant message.
///
/// Text fields are concatenated in arrival order. Structured fields merge key
/// by key: strings concatenate, objects merge recursively, arrays extend, and
/// a key that is new to the message takes the fragment's value.
pub fn merge_delta(message: &mut AssistantMessage, delta: Delta) {
    if let Some(content) = delta.content {
        message
            .content
            .get_or_insert_with(String::new)
            .push_str(&content);
    }

    if let Some(fragment) = delta.function_call {
        let call = message.function_call.get_or_insert_with(Default::default);
        if let Some(name) = fragment.name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            call.arguments.push_str(&arguments);
        }
    }

    merge_object(&mut message.extra, delta.extra);
}

pub fn merge_object(existing: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match existing.get_mut(&key) {
            Some(current) => merge_value(current, value),
            None => {
                existing.insert(key, value);
            }
        }
    }
}

fn merge_value(current: &mut Value, incoming: Value) {
    match (current, incoming) {
        (Value::String(current), Value::String(incoming)) => current.push_str(&incoming),
        (Value::Object(current), Value::Object(incoming)) => merge_object(current, incoming),
        (Value::Array(current), Value::Array(incoming)) => current.extend(incoming),
        // Existing scalars are kept.
        _ => {}
    }
}
