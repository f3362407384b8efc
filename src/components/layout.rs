//! Page frame component

use maud::{DOCTYPE, Markup, html};

/// Site wide settings used by the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOptions {
    pub title: String,
    pub stylesheet: Option<String>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            title: "Bookmarks".to_string(),
            stylesheet: None,
        }
    }
}

/// Wraps page content with standard HTML structure
///
/// Provides DOCTYPE, charset, viewport, the optional stylesheet and a link
/// back to the site index. The caller provides the page body.
///
/// # Arguments
///
/// * `options`: Site title and stylesheet
/// * `heading`: Page specific title suffix
/// * `body`: Page specific body markup
///
/// # Returns
///
/// Complete HTML document with wrapped content
pub fn frame(options: &FrameOptions, heading: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (heading) " - " (options.title) }
                @if let Some(stylesheet) = &options.stylesheet {
                    link rel="stylesheet" href=(stylesheet);
                }
            }
            body {
                header class="site-header" {
                    a href="index.html" class="site-title" { (options.title) }
                }
                main class="container" {
                    (body)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wraps_body() {
        // Arrange
        let options = FrameOptions::default();

        // Act
        let html = frame(&options, "2023-07", html! { p { "content" } }).into_string();

        // Assert
        assert!(html.starts_with("<!DOCTYPE html>"), "Should start with doctype");
        assert!(html.contains("<title>2023-07 - Bookmarks</title>"));
        assert!(html.contains("<p>content</p>"), "Should embed body");
        assert!(!html.contains("stylesheet"), "No stylesheet configured");
    }

    #[test]
    fn test_frame_includes_stylesheet() {
        // Arrange
        let options = FrameOptions {
            title: "Links".to_string(),
            stylesheet: Some("/site.css".to_string()),
        };

        // Act
        let html = frame(&options, "Index", html! {}).into_string();

        // Assert
        assert!(html.contains(r#"<link rel="stylesheet" href="/site.css">"#));
        assert!(html.contains("Links"));
    }
}
