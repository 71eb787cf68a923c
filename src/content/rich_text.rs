//! Structured rich text: plain-text flattening and HTML serialization

use serde::{Deserialize, Serialize};

use crate::cms::null_as_default;
use crate::helpers::escape_html;

/// One rich-text block (paragraph, heading, list item, image, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextBlock {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub spans: Vec<Span>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oembed: Option<serde_json::Value>,
}

impl RichTextBlock {
    /// A paragraph without formatting
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new("paragraph", text)
    }

    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            spans: Vec::new(),
            url: None,
            alt: None,
            oembed: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }
}

/// Inline formatting over a character range of a block's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Span {
    pub fn new(kind: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            kind: kind.into(),
            data: None,
        }
    }

    pub fn hyperlink(start: usize, end: usize, url: &str) -> Self {
        Self {
            data: Some(serde_json::json!({ "link_type": "Web", "url": url })),
            ..Self::new("hyperlink", start, end)
        }
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    fn open_tag(&self) -> String {
        match self.kind.as_str() {
            "strong" => "<strong>".to_string(),
            "em" => "<em>".to_string(),
            "hyperlink" => {
                let url = self.data_str("url").unwrap_or("#");
                match self.data_str("target") {
                    Some(target) => format!(
                        r#"<a href="{}" target="{}" rel="noopener noreferrer">"#,
                        escape_html(url),
                        escape_html(target)
                    ),
                    None => format!(r#"<a href="{}">"#, escape_html(url)),
                }
            }
            "label" => format!(
                r#"<span class="{}">"#,
                escape_html(self.data_str("label").unwrap_or_default())
            ),
            _ => "<span>".to_string(),
        }
    }

    fn close_tag(&self) -> &'static str {
        match self.kind.as_str() {
            "strong" => "</strong>",
            "em" => "</em>",
            "hyperlink" => "</a>",
            _ => "</span>",
        }
    }
}

/// Flatten blocks to plain text, one space between blocks
pub fn as_text(blocks: &[RichTextBlock]) -> String {
    blocks
        .iter()
        .filter(|b| !b.text.is_empty())
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serialize blocks to HTML, grouping consecutive list items
pub fn as_html(blocks: &[RichTextBlock]) -> String {
    let mut html = String::new();
    let mut open_list: Option<&'static str> = None;

    for block in blocks {
        let list = match block.kind.as_str() {
            "list-item" => Some("ul"),
            "o-list-item" => Some("ol"),
            _ => None,
        };

        if open_list != list {
            if let Some(tag) = open_list {
                html.push_str(&format!("</{}>", tag));
            }
            if let Some(tag) = list {
                html.push_str(&format!("<{}>", tag));
            }
            open_list = list;
        }

        html.push_str(&render_block(block));
    }

    if let Some(tag) = open_list {
        html.push_str(&format!("</{}>", tag));
    }

    html
}

fn render_block(block: &RichTextBlock) -> String {
    match block.kind.as_str() {
        "heading1" | "heading2" | "heading3" | "heading4" | "heading5" | "heading6" => {
            let level = &block.kind["heading".len()..];
            format!(
                "<h{level}>{}</h{level}>",
                render_spans(&block.text, &block.spans, true)
            )
        }
        "preformatted" => format!("<pre>{}</pre>", render_spans(&block.text, &block.spans, false)),
        "list-item" | "o-list-item" => {
            format!("<li>{}</li>", render_spans(&block.text, &block.spans, true))
        }
        "image" => {
            let url = block.url.as_deref().unwrap_or_default();
            let alt = block.alt.as_deref().unwrap_or_default();
            format!(
                r#"<p class="block-img"><img src="{}" alt="{}" /></p>"#,
                escape_html(url),
                escape_html(alt)
            )
        }
        "embed" => render_embed(block),
        _ => format!("<p>{}</p>", render_spans(&block.text, &block.spans, true)),
    }
}

fn render_embed(block: &RichTextBlock) -> String {
    let Some(oembed) = &block.oembed else {
        return String::new();
    };
    let field = |key: &str| oembed.get(key).and_then(|v| v.as_str()).unwrap_or_default();
    format!(
        r#"<div data-oembed="{}" data-oembed-type="{}" data-oembed-provider="{}">{}</div>"#,
        escape_html(field("embed_url")),
        escape_html(field("type")),
        escape_html(field("provider_name")),
        field("html")
    )
}

/// Apply spans to `text`; overlapping spans are closed and reopened so the
/// output stays well nested.
///
/// Span offsets count UTF-16 code units, as the content API computes them.
fn render_spans(text: &str, spans: &[Span], line_breaks: bool) -> String {
    let len = text.encode_utf16().count();

    let mut ordered: Vec<&Span> = spans
        .iter()
        .filter(|s| s.start < s.end && s.start < len)
        .collect();
    ordered.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(text.len());
    let mut open: Vec<&Span> = Vec::new();
    let mut next = 0;
    let mut pos = 0;

    for c in text.chars() {
        close_ending(&mut out, &mut open, pos);

        // A span starting inside a surrogate pair opens at that character
        let width = c.len_utf16();
        while next < ordered.len() && ordered[next].start < pos + width {
            out.push_str(&ordered[next].open_tag());
            open.push(ordered[next]);
            next += 1;
        }

        match c {
            '\n' if line_breaks => out.push_str("<br />"),
            _ => out.push_str(&escape_html(c.encode_utf8(&mut [0; 4]))),
        }
        pos += width;
    }

    while let Some(span) = open.pop() {
        out.push_str(span.close_tag());
    }

    out
}

fn close_ending<'a>(out: &mut String, open: &mut Vec<&'a Span>, pos: usize) {
    if !open.iter().any(|s| s.end <= pos) {
        return;
    }

    let mut reopen = Vec::new();
    while open.iter().any(|s| s.end <= pos) {
        let Some(top) = open.pop() else { break };
        out.push_str(top.close_tag());
        if top.end > pos {
            reopen.push(top);
        }
    }

    for span in reopen.into_iter().rev() {
        out.push_str(&span.open_tag());
        open.push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_text_joins_blocks() {
        let blocks = vec![
            RichTextBlock::paragraph("Hello there."),
            RichTextBlock::new("image", ""),
            RichTextBlock::paragraph("General Kenobi"),
        ];
        assert_eq!(as_text(&blocks), "Hello there. General Kenobi");
        assert_eq!(as_text(&[]), "");
    }

    #[test]
    fn test_paragraph_escaping() {
        let html = as_html(&[RichTextBlock::paragraph("a < b & c")]);
        assert_eq!(html, "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn test_headings_and_preformatted() {
        let html = as_html(&[
            RichTextBlock::new("heading2", "Title"),
            RichTextBlock::new("preformatted", "line 1\nline 2"),
            RichTextBlock::paragraph("one\ntwo"),
        ]);
        assert_eq!(
            html,
            "<h2>Title</h2><pre>line 1\nline 2</pre><p>one<br />two</p>"
        );
    }

    #[test]
    fn test_lists_are_grouped() {
        let html = as_html(&[
            RichTextBlock::new("list-item", "a"),
            RichTextBlock::new("list-item", "b"),
            RichTextBlock::new("o-list-item", "c"),
            RichTextBlock::paragraph("d"),
        ]);
        assert_eq!(
            html,
            "<ul><li>a</li><li>b</li></ul><ol><li>c</li></ol><p>d</p>"
        );
    }

    #[test]
    fn test_nested_spans() {
        let block = RichTextBlock::paragraph("bold and italic")
            .with_span(Span::new("strong", 0, 15))
            .with_span(Span::new("em", 9, 15));
        assert_eq!(
            as_html(&[block]),
            "<p><strong>bold and <em>italic</em></strong></p>"
        );
    }

    #[test]
    fn test_overlapping_spans_stay_well_nested() {
        let block = RichTextBlock::paragraph("abcdef")
            .with_span(Span::new("strong", 0, 4))
            .with_span(Span::new("em", 2, 6));
        assert_eq!(
            as_html(&[block]),
            "<p><strong>ab<em>cd</em></strong><em>ef</em></p>"
        );
    }

    #[test]
    fn test_hyperlink_span() {
        let block = RichTextBlock::paragraph("see docs")
            .with_span(Span::hyperlink(4, 8, "https://doc.rust-lang.org"));
        assert_eq!(
            as_html(&[block]),
            r#"<p>see <a href="https://doc.rust-lang.org">docs</a></p>"#
        );
    }

    #[test]
    fn test_span_offsets_count_utf16_units() {
        // The rocket takes two UTF-16 units, so "go" starts at 3
        let block = RichTextBlock::paragraph("🚀 go fast").with_span(Span::new("strong", 3, 5));
        assert_eq!(as_html(&[block]), "<p>🚀 <strong>go</strong> fast</p>");

        let block = RichTextBlock::paragraph("a😀b😀c")
            .with_span(Span::new("em", 3, 4))
            .with_span(Span::new("strong", 6, 7));
        assert_eq!(
            as_html(&[block]),
            "<p>a😀<em>b</em>😀<strong>c</strong></p>"
        );
    }

    #[test]
    fn test_span_past_end_is_clamped() {
        let block = RichTextBlock::paragraph("ação").with_span(Span::new("em", 1, 10));
        assert_eq!(as_html(&[block]), "<p>a<em>ção</em></p>");
    }

    #[test]
    fn test_image_block() {
        let mut image = RichTextBlock::new("image", "");
        image.url = Some("https://images.prismic.io/x.png".to_string());
        image.alt = Some("rocket".to_string());
        assert_eq!(
            as_html(&[image]),
            r#"<p class="block-img"><img src="https://images.prismic.io/x.png" alt="rocket" /></p>"#
        );
    }

    #[test]
    fn test_deserialize_block() {
        let json = r#"{
            "type": "paragraph",
            "text": "Hello",
            "spans": [{"start": 0, "end": 5, "type": "strong"}]
        }"#;
        let block: RichTextBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.kind, "paragraph");
        assert_eq!(block.spans.len(), 1);

        let image: RichTextBlock =
            serde_json::from_str(r#"{"type": "image", "text": null, "url": "u"}"#).unwrap();
        assert_eq!(image.text, "");
        assert!(image.spans.is_empty());
    }
}
