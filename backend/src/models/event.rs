//! Search diagnostics log
//!
//! An append-only record of what the compliance search looked at and chose,
//! tagged with the compliance id, calendar year, producer–consumer iteration
//! and search iteration. The log is purely observational: nothing in it feeds
//! back into the search.
//!
//! # Modes
//!
//! - **Off**: nothing is recorded except the completion event
//! - **Winners**: the winning row(s) of each search iteration
//! - **FullTable**: every evaluated row, winners flagged, optionally sliced
//!   to rows at or below a compliance-ratio ceiling
//!
//! # Example
//!
//! ```rust
//! use compliance_search_core_rs::models::event::{DiagnosticsMode, IterationLog, SearchEvent};
//!
//! let mut log = IterationLog::new(DiagnosticsMode::Winners, "cfg-hash");
//! log.log(SearchEvent::SearchCompleted {
//!     compliance_id: "OEM_A".to_string(),
//!     calendar_year: 2021,
//!     producer_consumer_iteration: 0,
//!     search_iterations: 4,
//!     final_compliance_error: 0.0004,
//!     compliance_possible: true,
//!     converged: true,
//! });
//! assert_eq!(log.events_for_year(2021).len(), 1);
//! ```

use crate::models::option::ProductionOption;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the diagnostics log records per search iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsMode {
    Off,
    #[default]
    Winners,
    FullTable,
}

/// Diagnostics event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SearchEvent {
    /// Every evaluated option of one search iteration
    OptionTable {
        compliance_id: String,
        calendar_year: i32,
        producer_consumer_iteration: usize,
        search_iteration: usize,
        share_range: f64,
        rows: Vec<ProductionOption>,
    },

    /// Winning option(s) of one search iteration
    Winners {
        compliance_id: String,
        calendar_year: i32,
        producer_consumer_iteration: usize,
        search_iteration: usize,
        share_range: f64,
        rows: Vec<ProductionOption>,
    },

    /// Search finished for one year
    SearchCompleted {
        compliance_id: String,
        calendar_year: i32,
        producer_consumer_iteration: usize,
        search_iterations: usize,
        final_compliance_error: f64,
        compliance_possible: bool,
        converged: bool,
    },
}

impl SearchEvent {
    pub fn calendar_year(&self) -> i32 {
        match self {
            SearchEvent::OptionTable { calendar_year, .. }
            | SearchEvent::Winners { calendar_year, .. }
            | SearchEvent::SearchCompleted { calendar_year, .. } => *calendar_year,
        }
    }

    pub fn search_iteration(&self) -> Option<usize> {
        match self {
            SearchEvent::OptionTable { search_iteration, .. }
            | SearchEvent::Winners { search_iteration, .. } => Some(*search_iteration),
            SearchEvent::SearchCompleted { .. } => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SearchEvent::OptionTable { .. } => "option_table",
            SearchEvent::Winners { .. } => "winners",
            SearchEvent::SearchCompleted { .. } => "search_completed",
        }
    }
}

/// Append-only diagnostics log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationLog {
    run_id: Uuid,
    config_fingerprint: String,
    mode: DiagnosticsMode,
    events: Vec<SearchEvent>,
}

impl IterationLog {
    /// New log for one analysis run
    pub fn new(mode: DiagnosticsMode, config_fingerprint: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config_fingerprint: config_fingerprint.into(),
            mode,
            events: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// SHA-256 fingerprint of the configuration that produced this log
    pub fn config_fingerprint(&self) -> &str {
        &self.config_fingerprint
    }

    pub fn mode(&self) -> DiagnosticsMode {
        self.mode
    }

    pub fn log(&mut self, event: SearchEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[SearchEvent] {
        &self.events
    }

    pub fn events_for_year(&self, calendar_year: i32) -> Vec<&SearchEvent> {
        self.events
            .iter()
            .filter(|e| e.calendar_year() == calendar_year)
            .collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&SearchEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// One JSON document per event, newline separated
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winners(year: i32, iteration: usize) -> SearchEvent {
        SearchEvent::Winners {
            compliance_id: "OEM_A".to_string(),
            calendar_year: year,
            producer_consumer_iteration: 0,
            search_iteration: iteration,
            share_range: 0.5,
            rows: vec![ProductionOption::default()],
        }
    }

    #[test]
    fn test_filters_by_year_and_type() {
        let mut log = IterationLog::new(DiagnosticsMode::Winners, "abc");
        log.log(winners(2021, 0));
        log.log(winners(2021, 1));
        log.log(winners(2022, 0));

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_for_year(2021).len(), 2);
        assert_eq!(log.events_of_type("winners").len(), 3);
        assert_eq!(log.events()[1].search_iteration(), Some(1));
    }

    #[test]
    fn test_json_lines() {
        let mut log = IterationLog::new(DiagnosticsMode::Winners, "abc");
        log.log(winners(2021, 0));
        let text = log.to_json_lines().unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"event_type\":\"winners\""));
    }
}
