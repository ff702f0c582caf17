// src/templates/index.rs
use super::render_page;
use crate::firewall::encoding::{encode_html, encode_js};
use crate::firewall::CspNonce;
use crate::models::Note;

pub fn render(notes: &[Note], csrf_token: &str, nonce: &CspNonce) -> String {
    let notes_html = if notes.is_empty() {
        r#"<p class="empty">No notes yet.</p>"#.to_string()
    } else {
        notes
            .iter()
            .map(|note| {
                format!(
                    r#"<div class="note"><div class="author">{}</div><div class="body">{}</div><small>{}</small></div>"#,
                    encode_html(&note.author),
                    encode_html(&note.body),
                    encode_html(&note.created_at)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let content = format!(
        r#"
        <h1>Notes</h1>
        <form id="note-form">
            <input type="hidden" name="_token" value="{}">
            <p><input type="text" name="author" placeholder="Your name" maxlength="64"></p>
            <p><textarea name="body" placeholder="Write a note" maxlength="2000" required></textarea></p>
            <button type="submit">Save</button>
        </form>
        <section id="notes">
        {}
        </section>
        <script nonce="{}">
            const csrfToken = {};
            document.getElementById("note-form").addEventListener("submit", async (event) => {{
                event.preventDefault();
                const form = new FormData(event.target);
                const response = await fetch("/api/notes", {{
                    method: "POST",
                    headers: {{ "Content-Type": "application/json", "X-CSRF-Token": csrfToken }},
                    body: JSON.stringify({{ author: form.get("author"), body: form.get("body") }}),
                }});
                if (response.ok) {{
                    window.location.reload();
                }} else {{
                    const error = await response.json();
                    alert(error.message || "Could not save note");
                }}
            }});
        </script>
        "#,
        encode_html(csrf_token),
        notes_html,
        nonce.as_str(),
        encode_js(csrf_token)
    );

    render_page("Notes", &content, nonce)
}
