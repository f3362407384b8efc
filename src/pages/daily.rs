//! Daily page generation

use chrono::NaiveDate;
use chrono_tz::Tz;
use maud::{Markup, html};

use crate::components::link_list::link_list;
use crate::markdown::LinkRenderer;
use crate::model::Link;

/// Generates the body of a single day's page
pub fn generate(
    renderer: &LinkRenderer<'_>,
    date: NaiveDate,
    links: &[Link],
    time_zone: Tz,
) -> Markup {
    let key = date.format("%Y-%m-%d").to_string();
    html! {
        article class="day" data-date=(key) {
            h1 { (key) }
            @if links.is_empty() {
                p class="empty-state" { "No bookmarks this day" }
            } @else {
                (link_list(renderer, links, time_zone))
            }
        }
    }
}
