//! Monthly archive page generation

use chrono_tz::Tz;
use maud::{Markup, html};

use crate::components::link_list::link_list;
use crate::markdown::LinkRenderer;
use crate::model::{DayGroup, YearMonth};

/// Generates the body of a monthly archive page
///
/// Lists each day of the month that has bookmarks, newest day first, with
/// the day's links in bookmark order. A month without bookmarks renders an
/// empty state instead of failing.
///
/// # Arguments
///
/// * `renderer`: Link description renderer
/// * `year_month`: Month being rendered
/// * `days`: Links grouped by calendar day
/// * `time_zone`: Zone used to show link times
///
/// # Returns
///
/// Page body markup, without frame
pub fn generate(
    renderer: &LinkRenderer<'_>,
    year_month: YearMonth,
    days: &DayGroup,
    time_zone: Tz,
) -> Markup {
    html! {
        article class="month" data-year-month=(year_month) {
            h1 { (year_month) }
            @if days.is_empty() {
                p class="empty-state" { "No bookmarks this month" }
            } @else {
                @for (day, links) in days.days().rev() {
                    section class="day" id=(day) {
                        h2 { (day) }
                        (link_list(renderer, links, time_zone))
                    }
                }
            }
        }
    }
}
