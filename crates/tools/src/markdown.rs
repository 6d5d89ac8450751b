//! HTML-to-Markdown conversion for page content extraction.

/// Convert HTML to clean Markdown using htmd.
///
/// Strips nav, header, footer, script, style, aside and similar chrome so
/// the model sees the page's actual content.
pub fn html_to_markdown(html: &str) -> String {
    use htmd::HtmlToMarkdown;

    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe",
        ])
        .build();

    match converter.convert(html) {
        Ok(md) => clean_markdown(&md),
        // Conversion failures are rare (malformed markup); hand back the raw
        // text rather than nothing.
        Err(_) => html.to_string(),
    }
}

/// Collapse excessive blank lines (3+ become 2) and trim the edges.
fn clean_markdown(md: &str) -> String {
    let mut result = String::with_capacity(md.len());
    let mut consecutive_newlines: usize = 0;

    for line in md.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            consecutive_newlines += 1;
        } else {
            if !result.is_empty() {
                let separator_newlines = if consecutive_newlines > 0 { 2 } else { 1 };
                for _ in 0..separator_newlines {
                    result.push('\n');
                }
            }
            consecutive_newlines = 0;
            result.push_str(line);
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_markdown_basic() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let md = html_to_markdown(html);
        assert!(md.contains("# Hello") || md.contains("Hello"));
        assert!(md.contains("World"));
    }

    #[test]
    fn test_html_to_markdown_strips_scripts() {
        let html = "<html><body><script>alert('x')</script><p>Content</p></body></html>";
        let md = html_to_markdown(html);
        assert!(!md.contains("alert"));
        assert!(md.contains("Content"));
    }

    #[test]
    fn test_html_to_markdown_preserves_links() {
        let html = r#"<html><body><a href="https://example.com">Click here</a></body></html>"#;
        let md = html_to_markdown(html);
        assert!(md.contains("Click here"));
        assert!(md.contains("https://example.com"));
    }

    #[test]
    fn test_clean_markdown_collapses_blanks() {
        let input = "Line 1\n\n\n\n\nLine 2\n\n\n\nLine 3";
        let result = clean_markdown(input);
        assert!(!result.contains("\n\n\n"));
    }
}
