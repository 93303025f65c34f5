//! State module for tracking crawl progress
//!
//! - `UrlState`: lifecycle of a single URL inside a crawl's frontier

mod url_state;

pub use url_state::UrlState;
