//! Table formatting for search results, index summaries and skip reports.

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::catalog::IndexInfo;
use crate::ingest::SkippedItem;
use crate::persistence::ArtifactPaths;
use crate::query::QueryOutcome;

/// Printed in place of a table when a query matched nothing.
pub const NO_MATCHES: &str = "No matches found!";

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked search results, best match first.
pub fn create_results_table(outcome: &QueryOutcome) -> String {
    let hits = match outcome {
        QueryOutcome::Empty => return NO_MATCHES.to_string(),
        QueryOutcome::Matches(hits) => hits,
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Match").add_attribute(Attribute::Bold),
        Cell::new("Similarity").add_attribute(Attribute::Bold),
        Cell::new("Distance").add_attribute(Attribute::Bold),
        Cell::new("Location").add_attribute(Attribute::Bold),
    ]);

    for (rank, hit) in hits.iter().enumerate() {
        let label = match hit.metadata.external_id() {
            Some(id) => format!("{} ({id})", hit.metadata.label()),
            None => hit.metadata.label(),
        };
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(label),
            Cell::new(format!("{:.3}", hit.similarity))
                .fg(similarity_color(hit.similarity))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.4}", hit.distance)).set_alignment(CellAlignment::Right),
            Cell::new(hit.metadata.location().unwrap_or("-")),
        ]);
    }

    table.to_string()
}

fn similarity_color(similarity: f32) -> Color {
    if similarity >= 0.8 {
        Color::Green
    } else if similarity >= 0.5 {
        Color::Yellow
    } else {
        Color::Reset
    }
}

/// Summary of a catalog's index and where it is stored.
pub fn create_info_table(info: &IndexInfo, paths: &ArtifactPaths) -> String {
    let optional = |value: Option<usize>| value.map_or_else(|| "-".to_string(), |v| v.to_string());

    TableBuilder::new()
        .set_headers(vec!["Property", "Value"])
        .add_row(vec!["Flavor".to_string(), info.flavor.to_string()])
        .add_row(vec!["Vectors".to_string(), info.vector_count.to_string()])
        .add_row(vec!["Dimension".to_string(), info.dimension.to_string()])
        .add_row(vec!["Regions".to_string(), optional(info.regions)])
        .add_row(vec!["Probes".to_string(), optional(info.probes)])
        .add_row(vec!["Trained".to_string(), info.trained.to_string()])
        .add_row(vec!["Index file".to_string(), paths.index.display().to_string()])
        .add_row(vec![
            "Metadata file".to_string(),
            paths.metadata.display().to_string(),
        ])
        .build()
}

/// Items that produced no vector during ingestion.
pub fn create_skipped_table(skipped: &[SkippedItem]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["Item", "Source", "Reason"]);
    for item in skipped {
        builder = builder.add_row(vec![
            (item.position + 1).to_string(),
            item.label.clone(),
            item.reason.clone(),
        ]);
    }
    builder.build()
}
