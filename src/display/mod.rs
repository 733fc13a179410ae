//! Rich terminal display utilities for the CLI.
//!
//! Provides styled tables, progress bars, and formatted output.

pub mod help;
pub mod progress;
pub mod tables;
pub mod theme;

pub use help::{create_help_text, format_help_section};
pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{
    NO_MATCHES, TableBuilder, create_info_table, create_results_table, create_skipped_table,
};
pub use theme::{THEME, Theme};
