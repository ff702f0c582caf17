// src/firewall/encoding.rs - context-specific output escaping
//
// These never gate a request. Rendering code calls them directly.

/// HTML entity encoding, quotes included.
pub fn encode_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// A quoted JavaScript string literal with `< > & ' "` hex-escaped, safe inside `<script>`.
pub fn encode_js(value: &str) -> String {
    let json = serde_json::Value::String(value.to_string()).to_string();
    let inner = &json[1..json.len() - 1];

    let mut out = String::with_capacity(json.len() + 8);
    out.push('"');
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') => out.push_str("\\u0022"),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push('\\'),
            },
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '\'' => out.push_str("\\u0027"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// RFC 3986 percent-encoding; only unreserved characters pass through.
pub fn encode_url(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Keeps `[A-Za-z0-9_-]` and drops everything else.
pub fn encode_css(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
