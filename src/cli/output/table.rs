//! Table output formatting for CLI status/refinery commands: a
//! `comfy-table` preset with color-coded cells and `NO_COLOR`/`TERM=dumb`
//! detection, following `cli/display/table.rs`'s rendering approach for
//! worker records, merge requests, and the rate-limit snapshot.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{AgentState, MergeRequest, MergeRequestStatus, WorkerRecord, WorkerStatus};

pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    fn base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table
    }

    pub fn format_workers(&self, workers: &[WorkerRecord]) -> String {
        if workers.is_empty() {
            return "(no active workers)".to_string();
        }
        let mut table = self.base_table();
        table.set_header(vec![
            Cell::new("Worker").add_attribute(Attribute::Bold),
            Cell::new("Task").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Agent").add_attribute(Attribute::Bold),
            Cell::new("Iteration").add_attribute(Attribute::Bold),
            Cell::new("Branch").add_attribute(Attribute::Bold),
        ]);
        for w in workers {
            let status_cell = if self.use_colors {
                Cell::new(worker_status_label(w.status)).fg(worker_status_color(w.status))
            } else {
                Cell::new(worker_status_label(w.status))
            };
            table.add_row(vec![
                Cell::new(&w.name),
                Cell::new(w.task_id.as_deref().unwrap_or("-")),
                status_cell,
                Cell::new(&w.agent_id),
                Cell::new(w.iteration),
                Cell::new(&w.branch),
            ]);
        }
        table.to_string()
    }

    pub fn format_merge_requests(&self, requests: &[MergeRequest]) -> String {
        if requests.is_empty() {
            return "(merge queue is empty)".to_string();
        }
        let mut table = self.base_table();
        table.set_header(vec![
            Cell::new("Branch").add_attribute(Attribute::Bold),
            Cell::new("Task").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Priority").add_attribute(Attribute::Bold),
            Cell::new("Unblocks").add_attribute(Attribute::Bold),
            Cell::new("Retries").add_attribute(Attribute::Bold),
        ]);
        for mr in requests {
            let status_cell = if self.use_colors {
                Cell::new(merge_status_label(mr.status)).fg(merge_status_color(mr.status))
            } else {
                Cell::new(merge_status_label(mr.status))
            };
            table.add_row(vec![
                Cell::new(&mr.branch),
                Cell::new(&mr.task_id),
                status_cell,
                Cell::new(mr.priority),
                Cell::new(mr.unblock_count),
                Cell::new(mr.retry_count),
            ]);
        }
        table.to_string()
    }

    pub fn format_rate_limits(&self, chain: &[String], states: &[(String, AgentState)]) -> String {
        let mut table = self.base_table();
        table.set_header(vec![
            Cell::new("Agent").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Consecutive limits").add_attribute(Attribute::Bold),
        ]);
        for agent in chain {
            let state = states.iter().find(|(id, _)| id == agent).map(|(_, s)| s);
            let (label, color, count) = match state {
                Some(s) if s.is_available() => ("available", Color::Green, s.consecutive_limit_count),
                Some(s) => ("limited", Color::Red, s.consecutive_limit_count),
                None => ("available", Color::Green, 0),
            };
            let status_cell = if self.use_colors { Cell::new(label).fg(color) } else { Cell::new(label) };
            table.add_row(vec![Cell::new(agent), status_cell, Cell::new(count)]);
        }
        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }
    true
}

fn worker_status_label(status: WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Idle => "idle",
        WorkerStatus::Working => "working",
        WorkerStatus::RateLimited => "rate-limited",
        WorkerStatus::Done => "done",
        WorkerStatus::Error => "error",
        WorkerStatus::Interrupted => "interrupted",
    }
}

fn worker_status_color(status: WorkerStatus) -> Color {
    match status {
        WorkerStatus::Idle => Color::DarkGrey,
        WorkerStatus::Working => Color::Cyan,
        WorkerStatus::RateLimited => Color::Yellow,
        WorkerStatus::Done => Color::Green,
        WorkerStatus::Error => Color::Red,
        WorkerStatus::Interrupted => Color::DarkGrey,
    }
}

fn merge_status_label(status: MergeRequestStatus) -> &'static str {
    match status {
        MergeRequestStatus::Queued => "queued",
        MergeRequestStatus::Merging => "merging",
        MergeRequestStatus::Conflict => "conflict",
        MergeRequestStatus::Merged => "merged",
        MergeRequestStatus::Failed => "failed",
    }
}

fn merge_status_color(status: MergeRequestStatus) -> Color {
    match status {
        MergeRequestStatus::Queued => Color::DarkGrey,
        MergeRequestStatus::Merging => Color::Cyan,
        MergeRequestStatus::Conflict => Color::Yellow,
        MergeRequestStatus::Merged => Color::Green,
        MergeRequestStatus::Failed => Color::Red,
    }
}
