//! # Telemetry Ingestion
//!
//! Scales connected over the serial link stream their reading continuously,
//! one text line per frame (`"  12.50 kg"`, `"ST,GS,+0012.5kg"`, ...). This
//! module pulls the reading out of each frame and decides when it has
//! settled.
//!
//! ## Stability
//!
//! The last [`WINDOW_CAPACITY`] readings are kept in a [`SampleWindow`]. The
//! reading is stable when every sample in the window is the same value.
//!
//! ```text
//! window: [12.5, 12.5, 12.5]        -> stable at 12.5
//! window: [12.5, 12.6]              -> not stable
//! ```
//!
//! ## State Updates
//!
//! [`TelemetryState`] is only ever changed by [`reduce`], a pure function of
//! the previous state and one raw frame, so the whole path can be tested
//! without a transport.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Number of recent readings considered for stability.
pub const WINDOW_CAPACITY: usize = 10;

/// Decimal number, optional fraction, optional unit suffix.
static READING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+(?:\.\d+)?\s*(?:kg|g|lb)?").expect("reading pattern is valid")
});

/// One token extracted from an inbound frame, e.g. `"12.3 kg"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Reading(String);

impl Reading {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part of the reading, if it parses.
    pub fn value(&self) -> Option<f64> {
        let end = self
            .0
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(self.0.len());
        self.0[..end].parse().ok()
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the first reading from a raw frame.
///
/// Returns `None` when the frame has no number in it. Frames that are not
/// valid UTF-8 are decoded lossily.
pub fn extract(frame: &[u8]) -> Option<Reading> {
    let text = String::from_utf8_lossy(frame);
    READING_PATTERN
        .find(&text)
        .map(|m| Reading::new(m.as_str().trim()))
}

/// Bounded FIFO of the most recent readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleWindow {
    samples: VecDeque<Reading>,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading, evicting the oldest one past capacity.
    pub fn push(&mut self, reading: Reading) {
        self.samples.push_back(reading);
        while self.samples.len() > WINDOW_CAPACITY {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.samples.iter()
    }

    /// Stability of the current contents.
    pub fn stability(&self) -> Stability {
        let distinct: HashSet<&Reading> = self.samples.iter().collect();
        if distinct.len() == 1 {
            Stability {
                is_stable: true,
                stable_value: self.samples.back().cloned(),
            }
        } else {
            Stability::default()
        }
    }
}

impl<S: Into<String>> FromIterator<S> for SampleWindow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut window = SampleWindow::new();
        for s in iter {
            window.push(Reading::new(s));
        }
        window
    }
}

/// Whether the recent readings agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stability {
    pub is_stable: bool,
    pub stable_value: Option<Reading>,
}

/// Everything the session knows about the inbound stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryState {
    /// Most recent reading, overwritten on every match
    pub latest: Option<Reading>,
    pub window: SampleWindow,
    pub stability: Stability,
    /// Readings extracted since the state was created. Bumped on every
    /// match, so a repeat of a settled reading still changes the state.
    pub samples_seen: u64,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply one inbound frame to `state`.
///
/// Frames without a reading leave the state untouched.
pub fn reduce(state: &TelemetryState, frame: &[u8]) -> TelemetryState {
    let Some(reading) = extract(frame) else {
        return state.clone();
    };

    let mut window = state.window.clone();
    window.push(reading.clone());
    let stability = window.stability();

    TelemetryState {
        latest: Some(reading),
        window,
        stability,
        samples_seen: state.samples_seen + 1,
    }
}

// ============================================================================
// TESTS
// ============================================================================
