//! Repeated tool failure detection.
//!
//! Tracks tool error signatures across iterations and triggers a fail-fast
//! when the same tool keeps failing with the same error on the same
//! arguments. Errors a model is expected to recover from (a missing file, an
//! ambiguous edit) still count: retrying the identical call never helps.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::ai::types::{AiToolCall, Content};

/// Stop after this many identical failures.
pub const REPEATED_FAILURE_THRESHOLD: usize = 2;

/// Check tool results for repeated failures. Returns a diagnostic message
/// if the same tool+error+arguments signature reached the threshold.
///
/// On any success, all counters are cleared.
pub fn detect_repeated_failures(
    counters: &mut HashMap<String, usize>,
    tool_calls: &[AiToolCall],
    tool_results: &[Content],
) -> Option<String> {
    let call_meta: HashMap<&str, (&str, u64)> = tool_calls
        .iter()
        .map(|call| {
            (
                call.id.as_str(),
                (call.name.as_str(), hash_arguments(&call.arguments)),
            )
        })
        .collect();

    let mut saw_success = false;

    for result in tool_results {
        let Content::ToolResult {
            tool_use_id,
            output,
            is_error,
        } = result
        else {
            continue;
        };

        if !is_error.unwrap_or(false) {
            saw_success = true;
            continue;
        }

        let Some((tool_name, args_hash)) = call_meta.get(tool_use_id.as_str()) else {
            continue;
        };

        let error_code = error_code(output);
        let signature = format!("{}|{}|{}", tool_name, error_code, args_hash);
        let count = counters
            .entry(signature)
            .and_modify(|c| *c += 1)
            .or_insert(1);

        if *count >= REPEATED_FAILURE_THRESHOLD {
            return Some(format!(
                "Stopping tool loop: '{}' failed {} times with the same '{}' error. A different strategy is required.",
                tool_name, *count, error_code
            ));
        }
    }

    if saw_success {
        counters.clear();
    }

    None
}

fn hash_arguments(arguments: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    arguments.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Code from a `{"ok":false,"error":{"code":..}}` envelope, else `tool_error`.
fn error_code(output: &Value) -> String {
    let parsed = match output {
        Value::String(s) => serde_json::from_str::<Value>(s).ok(),
        other => Some(other.clone()),
    };
    parsed
        .as_ref()
        .and_then(|v| v["error"]["code"].as_str())
        .filter(|c| !c.is_empty())
        .unwrap_or("tool_error")
        .to_string()
}
