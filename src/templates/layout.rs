// src/templates/layout.rs
use crate::firewall::encoding::encode_html;
use crate::firewall::CspNonce;

/// Wraps page content. Inline styles carry the request nonce so the CSP admits them.
pub fn render_page(title: &str, content: &str, nonce: &CspNonce) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{} - Bulwark</title>
    <style nonce="{}">
        body {{ font-family: system-ui, sans-serif; margin: 0; background: #f6f7f9; color: #1d2330; }}
        .container {{ max-width: 760px; margin: 0 auto; padding: 24px; }}
        .header {{ background: #1d2330; color: #fff; }}
        .note {{ background: #fff; border-radius: 8px; padding: 12px 16px; margin-bottom: 12px; }}
        .note .author {{ font-weight: 600; }}
        textarea {{ width: 100%; min-height: 80px; }}
    </style>
</head>
<body>
    <header class="header">
        <div class="container"><strong>Bulwark</strong></div>
    </header>
    <main class="container">
        {}
    </main>
</body>
</html>"#,
        encode_html(title),
        nonce.as_str(),
        content
    )
}
