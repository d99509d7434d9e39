fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub source: &'a str,
    pub offset: Option<u64>,
    pub reason: &'a str,
    pub err: &'a str,
}

pub fn render(event: &AlertEvent<'_>) -> String {
    let offset = event
        .offset
        .map(|o| o.to_string())
        .unwrap_or_default();
    format!(
        "ASPACE_SYNC_ALERT code={} stage={} source={} offset={} reason={} err={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.source),
        sanitize_value(&offset),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

/// Write a single greppable alert line to stderr.
pub fn emit(event: &AlertEvent<'_>) {
    eprintln!("{}", render(event));
}
