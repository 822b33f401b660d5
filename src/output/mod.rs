//! Output module for exporting results and reporting progress
//!
//! This module handles:
//! - Exporting harvested entries as JSON
//! - Printing queue progress and run statistics

mod export;
pub mod stats;

pub use export::{export_results, export_to_path};
pub use stats::{
    format_progress, load_statistics, print_progress, print_statistics, render_statistics,
    HarvestStatistics,
};
