//! Site index page generation

use maud::{Markup, html};
use std::collections::BTreeMap;

use crate::model::YearMonth;

/// Generates the body of the archive index
///
/// Groups months by year, newest year first and months in calendar order
/// inside a year. Each month links to its `YYYY-MM.html` page. Duplicate
/// months are listed once.
///
/// # Arguments
///
/// * `year_months`: Months that have a page, in any order
///
/// # Returns
///
/// Page body markup, without frame
pub fn generate(year_months: &[YearMonth]) -> Markup {
    let mut years: BTreeMap<i32, Vec<YearMonth>> = BTreeMap::new();
    for year_month in year_months {
        years.entry(year_month.year()).or_default().push(*year_month);
    }
    for months in years.values_mut() {
        months.sort();
        months.dedup();
    }

    html! {
        article class="archive" {
            h1 { "Archive" }
            @if years.is_empty() {
                p class="empty-state" { "No bookmarks yet" }
            }
            @for (year, months) in years.iter().rev() {
                section class="year" id=(format!("year-{}", year)) {
                    h2 { (year) }
                    ul class="months" {
                        @for month in months {
                            li { a href=(month.file_name()) { (month) } }
                        }
                    }
                }
            }
        }
    }
}
