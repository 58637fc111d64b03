//! `Tracker` adapters. A `json`-file-backed tracker for local/solo use and
//! a CLI-backed tracker shelling out to `bd`/`bv` are both valid
//! implementations of the same port; callers pick one at startup based on
//! configuration.

pub mod cli_tracker;
pub mod json_tracker;

pub use cli_tracker::{CliTracker, CliTrackerConfig};
pub use json_tracker::JsonTracker;
