//! Reusable HTML components for page generation
//!
//! Maud component functions shared by the monthly, daily and index pages:
//! the page frame and the link list.

pub mod layout;
pub mod link_list;
