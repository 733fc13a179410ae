//! Custom help formatting for consistent CLI display.

use crate::display::theme::Theme;
use console::style;

/// Format help text with consistent styling
pub fn format_help_section(title: &str, content: &str, indent: bool) -> String {
    let mut output = String::new();

    if Theme::should_disable_colors() {
        output.push_str(&format!("{title}\n"));
    } else {
        output.push_str(&format!("{}\n", style(title).cyan().bold()));
    }

    for line in content.lines() {
        if line.trim().is_empty() {
            output.push('\n');
        } else if indent && !line.starts_with("    ") {
            output.push_str(&format!("    {line}\n"));
        } else {
            output.push_str(&format!("{line}\n"));
        }
    }

    output
}

/// Create styled help text shown after the command list
pub fn create_help_text() -> String {
    let mut help = String::new();

    let quick_start = r#"$ vecdex init                    # Create .vecdex/settings.toml
$ vecdex build docs/             # Index a directory of text files
$ vecdex search "red running shoe""#;

    help.push_str(&format_help_section("QUICK START", quick_start, true));
    help.push('\n');

    let examples = r#"# Index a JSON product catalog, then add a second batch
$ vecdex build catalog.json
$ vecdex add new_arrivals.json

# Search with a precomputed query vector
$ vecdex search --vector "0.12,0.80,0.33" -k 3

# Scan more regions of an approximate index
$ vecdex search "leather boots" --probes 16 --json"#;

    help.push_str(&format_help_section("EXAMPLES", examples, true));
    help
}
