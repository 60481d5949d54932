//! Output module for rank reports
//!
//! This module handles rendering the ranks collected by a run as plain text
//! or HTML and printing them.

mod report;

pub use report::{format_report, print_report};
