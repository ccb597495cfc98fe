//! Chunk-loop progress reporting (enabled by the `progress` feature).
//!
//! The [`indicatif`] bar advances by one step per chunk and computes the ETA itself.
//! Chunks carry very different numbers of detections, so the bar message shows the
//! ephemeris throughput instead: rows per second of the last chunk and of the run
//! so far ([`ChunkThroughput`]).
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{bar:40.cyan/blue} {pos}/{len} chunks ({percent:>3}%) | {elapsed_precise} ETA {eta_precise} | {msg}";

/// Ephemeris rows processed per second, chunk by chunk.
pub(crate) struct ChunkThroughput {
    chunk_start: Instant,
    rows: u64,
    busy: Duration,
}

impl ChunkThroughput {
    pub(crate) fn new() -> Self {
        Self {
            chunk_start: Instant::now(),
            rows: 0,
            busy: Duration::ZERO,
        }
    }

    /// Close the current chunk, which processed `rows` ephemeris rows, and return its
    /// throughput.
    pub(crate) fn finish_chunk(&mut self, rows: usize) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.chunk_start);
        self.chunk_start = now;
        self.push(rows, dt)
    }

    fn push(&mut self, rows: usize, dt: Duration) -> f64 {
        self.rows += rows as u64;
        self.busy += dt;
        rate(rows as u64, dt)
    }

    /// Throughput over every chunk closed so far.
    pub(crate) fn overall(&self) -> f64 {
        rate(self.rows, self.busy)
    }
}

fn rate(rows: u64, dt: Duration) -> f64 {
    let secs = dt.as_secs_f64();
    if secs > 0.0 {
        rows as f64 / secs
    } else {
        0.0
    }
}

pub(crate) fn fmt_rate(rows_per_sec: f64) -> String {
    if rows_per_sec < 1e3 {
        format!("{rows_per_sec:.0} rows/s")
    } else if rows_per_sec < 1e6 {
        format!("{:.1}k rows/s", rows_per_sec / 1e3)
    } else {
        format!("{:.1}M rows/s", rows_per_sec / 1e6)
    }
}

/// Progress bar over the chunks of a run.
pub(crate) fn chunk_progress_bar(total_chunks: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_chunks.max(1));
    pb.set_style(ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()));
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

#[cfg(test)]
mod progress_bar_test {
    use super::*;

    #[test]
    fn test_throughput_weights_chunks_by_rows() {
        let mut meter = ChunkThroughput::new();
        assert_eq!(meter.overall(), 0.0);

        assert_eq!(meter.push(1000, Duration::from_millis(500)), 2000.0);
        assert_eq!(meter.push(0, Duration::from_millis(500)), 0.0);
        assert_eq!(meter.push(3000, Duration::from_secs(1)), 3000.0);
        assert_eq!(meter.overall(), 2000.0);
    }

    #[test]
    fn test_fmt_rate_scales() {
        assert_eq!(fmt_rate(0.0), "0 rows/s");
        assert_eq!(fmt_rate(950.4), "950 rows/s");
        assert_eq!(fmt_rate(12_340.0), "12.3k rows/s");
        assert_eq!(fmt_rate(2_500_000.0), "2.5M rows/s");
    }
}
