//! Occupancy tracking.
//!
//! Per-frame person counts are noisy: occlusion and model jitter make people
//! flicker in and out between consecutive frames. The tracker keeps a fixed
//! window of the most recent raw counts and reports the mode of that window
//! as the current occupancy. Every rise in occupancy is treated as new
//! arrivals and added to a cumulative total that never decreases.
//!
//! The tracker is owned by a single frame loop and is fed strictly in frame
//! order. It has no error states.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

/// Default number of frames in the smoothing window.
pub const DEFAULT_WINDOW_SIZE: usize = 10;
/// Largest accepted window. `mode` is quadratic in the window length.
pub const MAX_WINDOW_SIZE: usize = 1_000;

/// Rule for choosing between values that are equally frequent in the window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// The tied value that appears first when scanning oldest to newest.
    #[default]
    FirstSeen,
    /// The smallest tied value.
    Lowest,
}

impl FromStr for TieBreak {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first-seen" | "first_seen" | "first" => Ok(Self::FirstSeen),
            "lowest" | "min" => Ok(Self::Lowest),
            other => Err(anyhow!(
                "unknown tie-break '{}': expected 'first-seen' or 'lowest'",
                other
            )),
        }
    }
}

impl std::fmt::Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstSeen => write!(f, "first-seen"),
            Self::Lowest => write!(f, "lowest"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    pub window_size: usize,
    pub tie_break: TieBreak,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            tie_break: TieBreak::default(),
        }
    }
}

/// Fixed-capacity FIFO of recent raw counts.
///
/// Starts full of zeros; every push evicts the oldest entry, so the length
/// always equals the capacity.
#[derive(Clone, Debug)]
pub struct HistoryWindow {
    counts: VecDeque<u32>,
}

impl HistoryWindow {
    pub fn zeroed(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("history window capacity must be at least 1"));
        }
        if capacity > MAX_WINDOW_SIZE {
            return Err(anyhow!(
                "history window capacity {} exceeds the maximum of {}",
                capacity,
                MAX_WINDOW_SIZE
            ));
        }
        Ok(Self {
            counts: std::iter::repeat(0).take(capacity).collect(),
        })
    }

    pub fn push(&mut self, raw_count: u32) {
        self.counts.pop_front();
        self.counts.push_back(raw_count);
    }

    pub fn capacity(&self) -> usize {
        self.counts.len()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.counts.iter().copied()
    }

    pub fn contains(&self, value: u32) -> bool {
        self.counts.contains(&value)
    }

    /// Most frequent value in the window.
    pub fn mode(&self, tie_break: TieBreak) -> u32 {
        // (value, frequency) in order of first appearance.
        let mut tallies: Vec<(u32, usize)> = Vec::new();
        for value in self.iter() {
            match tallies.iter_mut().find(|(seen, _)| *seen == value) {
                Some((_, frequency)) => *frequency += 1,
                None => tallies.push((value, 1)),
            }
        }

        let mut best = tallies[0];
        for &(value, frequency) in &tallies[1..] {
            let better = match tie_break {
                TieBreak::FirstSeen => frequency > best.1,
                TieBreak::Lowest => {
                    frequency > best.1 || (frequency == best.1 && value < best.0)
                }
            };
            if better {
                best = (value, frequency);
            }
        }
        best.0
    }
}

/// Result of observing one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    /// Smoothed number of people currently in view.
    pub current: u32,
    /// Cumulative arrivals since the stream started.
    pub total: u64,
    /// Change in `current` caused by this observation.
    pub delta: i64,
}

/// Smooths raw per-frame person counts and accumulates arrivals.
#[derive(Clone, Debug)]
pub struct OccupancyTracker {
    config: TrackerConfig,
    history: HistoryWindow,
    current: u32,
    total: u64,
    frames_observed: u64,
}

impl OccupancyTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Ok(Self {
            history: HistoryWindow::zeroed(config.window_size)?,
            config,
            current: 0,
            total: 0,
            frames_observed: 0,
        })
    }

    /// Feed the raw person count of the next frame.
    pub fn observe(&mut self, raw_count: u32) -> Occupancy {
        self.history.push(raw_count);
        self.frames_observed += 1;

        let previous = self.current;
        let current = self.history.mode(self.config.tie_break);
        let delta = i64::from(current) - i64::from(previous);
        if delta > 0 {
            self.total += delta as u64;
        }
        self.current = current;

        if delta != 0 {
            log::debug!(
                "occupancy {} -> {} (total {}) after frame {}",
                previous,
                current,
                self.total,
                self.frames_observed
            );
        }

        Occupancy {
            current,
            total: self.total,
            delta,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.history
    }

    /// Drop all stream state, as if a new stream had started.
    pub fn reset(&mut self) {
        self.history = HistoryWindow {
            counts: std::iter::repeat(0).take(self.config.window_size).collect(),
        };
        self.current = 0;
        self.total = 0;
        self.frames_observed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(window_size: usize) -> OccupancyTracker {
        OccupancyTracker::new(TrackerConfig {
            window_size,
            tie_break: TieBreak::FirstSeen,
        })
        .expect("tracker")
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = OccupancyTracker::new(TrackerConfig {
            window_size: 0,
            tie_break: TieBreak::FirstSeen,
        })
        .unwrap_err();
        assert!(format!("{err}").contains("at least 1"));
    }

    #[test]
    fn oversized_window_is_rejected() {
        assert!(HistoryWindow::zeroed(MAX_WINDOW_SIZE).is_ok());
        let err = HistoryWindow::zeroed(MAX_WINDOW_SIZE + 1).unwrap_err();
        assert!(format!("{err}").contains("exceeds the maximum"));
    }

    #[test]
    fn window_keeps_its_length() {
        let mut window = HistoryWindow::zeroed(4).unwrap();
        for count in [3, 1, 4, 1, 5, 9] {
            window.push(count);
            assert_eq!(window.capacity(), 4);
        }
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![4, 1, 5, 9]);
    }

    #[test]
    fn first_seen_tie_break_prefers_oldest_value() {
        let mut window = HistoryWindow::zeroed(4).unwrap();
        for count in [2, 2, 1, 1] {
            window.push(count);
        }
        assert_eq!(window.mode(TieBreak::FirstSeen), 2);
        assert_eq!(window.mode(TieBreak::Lowest), 1);
    }

    #[test]
    fn balanced_window_holds_previous_majority() {
        let mut t = tracker(10);
        for _ in 0..5 {
            t.observe(1);
        }
        // five zeros (older) vs five ones: the zeros were seen first
        assert_eq!(t.current(), 0);
        let occ = t.observe(1);
        assert_eq!(occ.current, 1);
        assert_eq!(occ.delta, 1);
        assert_eq!(occ.total, 1);
    }

    #[test]
    fn departures_do_not_reduce_total() {
        let mut t = tracker(3);
        for _ in 0..3 {
            t.observe(2);
        }
        assert_eq!((t.current(), t.total()), (2, 2));
        for _ in 0..3 {
            t.observe(0);
        }
        assert_eq!((t.current(), t.total()), (0, 2));
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut t = tracker(2);
        t.observe(3);
        t.observe(3);
        assert_eq!(t.total(), 3);
        t.reset();
        assert_eq!(t.current(), 0);
        assert_eq!(t.total(), 0);
        assert_eq!(t.frames_observed(), 0);
        assert!(t.window().iter().all(|c| c == 0));
    }

    #[test]
    fn tie_break_parses_from_cli_strings() {
        assert_eq!("first-seen".parse::<TieBreak>().unwrap(), TieBreak::FirstSeen);
        assert_eq!("LOWEST".parse::<TieBreak>().unwrap(), TieBreak::Lowest);
        assert!("median".parse::<TieBreak>().is_err());
    }
}
