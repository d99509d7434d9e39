use anyhow::Result;
use serde_json::Value;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Truncate `input` to at most `max_chars` Unicode characters, stripping
/// control characters and appending `…` when truncated.
///
/// Used to keep remote response bodies readable in log lines.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

pub fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Split a pipe-delimited access-point cell into its terms.
///
/// Empty segments and the literal `NULL` token (any case) are dropped.
pub fn split_terms(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty() && !item.eq_ignore_ascii_case("null"))
        .map(ToOwned::to_owned)
        .collect()
}

/// Name of a creator given either as a bare string or as an authority object.
///
/// Older source exports spell the object field `authotized_form_of_name`.
pub fn creator_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => s.as_str(),
        other => ["authorized_form_of_name", "authotized_form_of_name"]
            .iter()
            .find_map(|field| other.get(*field).and_then(Value::as_str))?,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
