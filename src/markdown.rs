//! Markdown rendering of bookmark descriptions.
//!
//! A description may act as a small Markdown template for its own link by
//! mentioning the `_URL_`, `_ID_` or `_DESC_` markers. Descriptions without
//! markers render as a plain `[description](href)` link.

mod renderer;

pub use renderer::{DEFAULT_LINK_TEMPLATE, DESC_MARKER, ID_MARKER, LinkRenderer, URL_MARKER};
