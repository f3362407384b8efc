//! Link list component

use chrono_tz::Tz;
use maud::{Markup, PreEscaped, html};

use crate::markdown::LinkRenderer;
use crate::model::Link;

/// Renders links as an ordered list
///
/// Each entry carries the bookmark id as `data-id`, its rendered
/// description HTML and the time of day in `time_zone`. Order follows the
/// slice.
pub fn link_list(renderer: &LinkRenderer<'_>, links: &[Link], time_zone: Tz) -> Markup {
    html! {
        ul class="links" {
            @for link in links {
                li class="link" id=(format!("link-{}", link.id)) data-id=(link.id) {
                    span class="link-html" { (PreEscaped(renderer.render(link))) }
                    " "
                    @let local = link.time.with_timezone(&time_zone);
                    time class="link-time" datetime=(local.to_rfc3339()) {
                        (local.format("%H:%M"))
                    }
                }
            }
        }
    }
}
