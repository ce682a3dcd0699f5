//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use dashprobe_common::WorkspaceSummary;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for WorkspaceSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.status.to_string()]
    }
}

fn table<T: TableDisplay>(rows: impl IntoIterator<Item = Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(T::headers());
    for row in rows {
        table.add_row(row);
    }
    table
}

fn plain<T: TableDisplay>(item: &T) -> String {
    T::headers()
        .iter()
        .zip(item.row())
        .map(|(header, value)| format!("{header}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn serialized<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).unwrap_or_default(),
        _ => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

/// Render a single item
pub fn render_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => table::<T>([item.row()]).to_string(),
        OutputFormat::Json | OutputFormat::Yaml => serialized(item, format),
        OutputFormat::Plain => plain(item),
    }
}

/// Render a list of items
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table if items.is_empty() => "No workspaces found.".to_string(),
        OutputFormat::Table => table::<T>(items.iter().map(|item| item.row())).to_string(),
        OutputFormat::Json | OutputFormat::Yaml => serialized(items, format),
        OutputFormat::Plain => items.iter().map(|item| plain(item)).collect::<Vec<_>>().join("\n---\n"),
    }
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    println!("{}", render_item(item, format));
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    println!("{}", render_list(items, format));
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}
