//! Page generation modules for the bookmark site
//!
//! One module per page type. Each page builds its body from the shared
//! components; the frame is applied by the caller.

pub mod daily;
pub mod index;
pub mod monthly;
