//! Output module for reporting crawl results on the command line
//!
//! This module handles:
//! - Summarizing a finished run from the database
//! - Printing the recent crawl history of a site

pub mod stats;

pub use stats::{load_run_summary, print_crawl_history, print_run_summary, RunSummary};
