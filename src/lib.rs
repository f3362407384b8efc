//! Static bookmark archive published through Git.
//!
//! Bookmarks are read month by month from PostgreSQL, rendered to one HTML
//! page per month inside a fresh clone of the site repository, and the
//! result is committed and pushed back.

pub mod components;
pub mod config;
pub mod error;
pub mod git;
mod markdown;
pub mod model;
pub mod pages;
pub mod pipeline;
pub mod publish;
pub mod source;
pub mod templates;
pub mod writer;

pub use config::{Cli, FileConfig, Settings};
pub use error::{ErrorKind, Failure, kind_of};
pub use git::{GitCredentials, GitTransport, WorkingCopy, transport_for};
pub use markdown::LinkRenderer;
pub use model::{Bookmark, Bookmarks, DayGroup, Link, YearMonth};
pub use pipeline::{CHUNK_SIZE, PipelineReport, run_pipeline};
pub use publish::{PublishReport, publish, publish_with_transport};
pub use source::{BookmarkSource, InMemorySource, PgBookmarkSource};
pub use templates::{MaudTemplates, TemplateService};
pub use writer::SiteWriter;
