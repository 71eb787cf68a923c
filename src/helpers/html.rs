//! HTML helper functions

use crate::config::CommentsConfig;

/// Escape text for use in HTML content and attribute values
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Cut `s` to at most `length` characters, appending `...` when shortened
pub fn truncate_chars(s: &str, length: usize) -> String {
    if s.chars().count() <= length {
        return s.to_string();
    }
    let truncated: String = s.chars().take(length).collect();
    format!("{}...", truncated.trim_end())
}

/// Script tag loading the comment widget into the element it is placed in
///
/// # Examples
/// ```ignore
/// comments_script(&config.comments)
/// // -> <script src="https://utteranc.es/client.js" repo="owner/blog" ...></script>
/// ```
pub fn comments_script(comments: &CommentsConfig) -> String {
    format!(
        r#"<script src="{}" repo="{}" issue-term="{}" theme="{}" crossorigin="anonymous" async></script>"#,
        escape_html(&comments.script),
        escape_html(comments.repo.trim()),
        escape_html(&comments.issue_term),
        escape_html(&comments.theme)
    )
}
