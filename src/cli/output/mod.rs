//! CLI output formatting: `comfy-table`-backed tables for human readers,
//! dual-rendered as JSON via `serde_json::to_string_pretty` under `--json`.

pub mod table;

pub use table::TableFormatter;
