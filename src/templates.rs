//! Template service: the rendering interface the site writer depends on,
//! and the compiled maud implementation shipped with the crate.

use anyhow::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::components::layout::{FrameOptions, frame};
use crate::markdown::LinkRenderer;
use crate::model::{DayGroup, Link, YearMonth};
use crate::pages;

/// Renders site pages to HTML strings.
pub trait TemplateService {
    /// Page for one month, links grouped by `YYYY-MM-DD` day key.
    fn monthly(&self, year_month: YearMonth, links: &DayGroup) -> Result<String>;

    /// Page for one calendar day.
    fn daily(&self, date: NaiveDate, links: &[Link]) -> Result<String>;

    /// Archive page listing the given months.
    fn index(&self, year_months: &[YearMonth]) -> Result<String>;
}

/// Compiled templates.
///
/// Output depends only on the arguments, so rendering the same data twice
/// yields identical bytes.
pub struct MaudTemplates {
    frame: FrameOptions,
    time_zone: Tz,
    renderer: LinkRenderer<'static>,
}

impl MaudTemplates {
    pub fn new(frame: FrameOptions, time_zone: Tz) -> Self {
        Self {
            frame,
            time_zone,
            renderer: LinkRenderer::new(),
        }
    }
}

impl Default for MaudTemplates {
    fn default() -> Self {
        Self::new(FrameOptions::default(), Tz::UTC)
    }
}

impl TemplateService for MaudTemplates {
    fn monthly(&self, year_month: YearMonth, links: &DayGroup) -> Result<String> {
        let body = pages::monthly::generate(&self.renderer, year_month, links, self.time_zone);
        Ok(frame(&self.frame, &year_month.to_string(), body).into_string())
    }

    fn daily(&self, date: NaiveDate, links: &[Link]) -> Result<String> {
        let body = pages::daily::generate(&self.renderer, date, links, self.time_zone);
        let heading = date.format("%Y-%m-%d").to_string();
        Ok(frame(&self.frame, &heading, body).into_string())
    }

    fn index(&self, year_months: &[YearMonth]) -> Result<String> {
        let body = pages::index::generate(year_months);
        Ok(frame(&self.frame, "Archive", body).into_string())
    }
}
