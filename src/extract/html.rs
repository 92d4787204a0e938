//! HTML-to-text stripping using the `scraper` crate.
//!
//! Every text node in document order is trimmed and kept if non-empty;
//! the survivors are joined with newlines so block boundaries become line
//! breaks. Script and style contents are skipped.

use scraper::{Html, Node};

/// Elements whose text content is never rendered.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Strip markup from an HTML document or fragment.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut lines = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()));
        if skipped {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }
    lines.join("\n")
}
