//! Link HTML rendering with comrak.

use comrak::Options;

use crate::model::Link;

/// Replaced by the bookmark href.
pub const URL_MARKER: &str = "_URL_";
/// Replaced by the bookmark publish key.
pub const ID_MARKER: &str = "_ID_";
/// Replaced by the bookmark description.
pub const DESC_MARKER: &str = "_DESC_";

/// Template used for descriptions that carry no marker.
pub const DEFAULT_LINK_TEMPLATE: &str = "[_DESC_](_URL_)";

/// Renders a [`Link`] to an inline HTML fragment.
///
/// Bookmark descriptions are untrusted, so raw HTML in them is escaped
/// rather than passed through.
pub struct LinkRenderer<'a> {
    options: Options<'a>,
}

impl<'a> LinkRenderer<'a> {
    /// Creates renderer with autolinks and strikethrough enabled.
    pub fn new() -> Self {
        let mut options = Options::default();

        options.extension.strikethrough = true;
        options.extension.autolink = true;
        options.render.escape = true;

        Self { options }
    }

    /// Renders the link as inline HTML.
    ///
    /// Picks the description itself as template when it mentions a marker,
    /// substitutes the markers, converts the Markdown and strips a single
    /// wrapping paragraph.
    pub fn render(&self, link: &Link) -> String {
        let template = if has_marker(&link.description) {
            link.description.as_str()
        } else {
            DEFAULT_LINK_TEMPLATE
        };

        let markdown = substitute_markers(template, link);
        let html = comrak::markdown_to_html(&markdown, &self.options);
        strip_paragraph(html.trim()).to_string()
    }
}

impl Default for LinkRenderer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn has_marker(description: &str) -> bool {
    [URL_MARKER, ID_MARKER, DESC_MARKER]
        .iter()
        .any(|marker| description.contains(marker))
}

/// Replaces every marker occurrence, URL first, then id, then description.
fn substitute_markers(template: &str, link: &Link) -> String {
    template
        .replace(URL_MARKER, &link.href)
        .replace(ID_MARKER, &link.publish_key)
        .replace(DESC_MARKER, &link.description)
}

fn strip_paragraph(html: &str) -> &str {
    match html
        .strip_prefix("<p>")
        .and_then(|inner| inner.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner,
        _ => html,
    }
}
