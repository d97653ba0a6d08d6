use std::collections::VecDeque;

use crate::config::DURATION_WINDOW;

/// Telemetry events sent from the converter to the progress reporter
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A new output file was opened for a source
    FileStarted,
    /// A batch was appended to the active output
    BatchWritten { rows: u64, duration_ms: u64 },
    /// The active output was closed
    FileCompleted { rows: u64 },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub files_started: usize,
    pub files_completed: usize,
    pub rows_written: u64,
    pub batches_written: u64,
    /// Durations of the most recent batches, oldest first
    pub batch_durations_ms: VecDeque<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::FileStarted => {
                self.files_started += 1;
            }
            TelemetryEvent::BatchWritten { rows, duration_ms } => {
                self.rows_written += rows;
                self.batches_written += 1;
                if self.batch_durations_ms.len() == DURATION_WINDOW {
                    self.batch_durations_ms.pop_front();
                }
                self.batch_durations_ms.push_back(*duration_ms);
            }
            TelemetryEvent::FileCompleted { .. } => {
                // Rows were already counted per batch
                self.files_completed += 1;
            }
        }
    }

    /// Calculate percentile over the recent batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        let sorted = self.sorted_durations();
        Self::percentile_of(&sorted, p)
    }

    /// Get p50, p90, p99 percentiles, sorting the window once
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let sorted = self.sorted_durations();
        (
            Self::percentile_of(&sorted, 50.0),
            Self::percentile_of(&sorted, 90.0),
            Self::percentile_of(&sorted, 99.0),
        )
    }

    fn sorted_durations(&self) -> Vec<u64> {
        let mut sorted: Vec<u64> = self.batch_durations_ms.iter().copied().collect();
        sorted.sort_unstable();
        sorted
    }

    fn percentile_of(sorted: &[u64], p: f64) -> Option<u64> {
        if sorted.is_empty() {
            return None;
        }
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.clamp(1, sorted.len()) - 1])
    }
}
