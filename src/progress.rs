//! Progress reporting
//!
//! A request's progress is a single monotonically non-decreasing fraction.
//! Raw reports from sub-loaders are mapped into the sub-range of the phase
//! the request is in, so a late "all resources resolved" signal can never
//! move the value backwards.

use parking_lot::Mutex;
use std::sync::Arc;

/// External consumer of progress (a progress bar / credits widget)
pub trait ProgressSink: Send + Sync {
    /// Show the overall completion fraction in [0, 1]
    fn set_percentage(&self, fraction: f32);

    /// Show a human-readable message (credits on success, failure description)
    fn set_credits(&self, message: &str);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_percentage(&self, _fraction: f32) {}

    fn set_credits(&self, _message: &str) {}
}

/// Sink that forwards to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set_percentage(&self, fraction: f32) {
        log::info!("Import progress: {:.0}%", fraction * 100.0);
    }

    fn set_credits(&self, message: &str) {
        if !message.is_empty() {
            log::info!("{message}");
        }
    }
}

/// Sink that records every call
///
/// Useful for headless tools and for asserting on the observed sequence.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    percentages: Mutex<Vec<f32>>,
    credits: Mutex<Vec<String>>,
}

impl RecordingProgress {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Every percentage reported so far, in order
    pub fn percentages(&self) -> Vec<f32> {
        self.percentages.lock().clone()
    }

    /// Every credits message reported so far, in order
    pub fn credits(&self) -> Vec<String> {
        self.credits.lock().clone()
    }

    /// The most recent credits message
    pub fn last_credits(&self) -> Option<String> {
        self.credits.lock().last().cloned()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.percentages.lock().clear();
        self.credits.lock().clear();
    }
}

impl ProgressSink for RecordingProgress {
    fn set_percentage(&self, fraction: f32) {
        self.percentages.lock().push(fraction);
    }

    fn set_credits(&self, message: &str) {
        self.credits.lock().push(message.to_string());
    }
}

/// Sequential phases of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Fetching and decoding the model and its resources
    Decode,
    /// Everything after all resources resolved
    PostProcess,
}

#[derive(Debug)]
struct AggregatorState {
    value: f32,
    phase: Phase,
    completed: bool,
}

/// Merges sub-loader progress into one monotonic fraction
pub struct ProgressAggregator {
    sink: Arc<dyn ProgressSink>,
    decode_share: f32,
    state: Mutex<AggregatorState>,
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProgressAggregator")
            .field("value", &state.value)
            .field("phase", &state.phase)
            .field("completed", &state.completed)
            .field("decode_share", &self.decode_share)
            .finish()
    }
}

impl ProgressAggregator {
    /// Create an aggregator where decoding takes the first half of the range
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self::with_decode_share(sink, 0.5)
    }

    /// Create an aggregator with a custom decode-phase share of the range
    pub fn with_decode_share(sink: Arc<dyn ProgressSink>, decode_share: f32) -> Self {
        Self {
            sink,
            decode_share: decode_share.clamp(0.0, 1.0),
            state: Mutex::new(AggregatorState {
                value: 0.0,
                phase: Phase::Decode,
                completed: false,
            }),
        }
    }

    /// Current overall fraction
    pub fn value(&self) -> f32 {
        self.state.lock().value
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Whether `complete()` has taken effect
    pub fn is_complete(&self) -> bool {
        self.state.lock().completed
    }

    /// Start a new request at 0
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.value = 0.0;
            state.phase = Phase::Decode;
            state.completed = false;
        }
        self.sink.set_percentage(0.0);
    }

    /// Move to a later phase, raising progress to the phase floor
    ///
    /// Moving backwards is ignored.
    pub fn enter(&self, phase: Phase) {
        let floor = {
            let mut state = self.state.lock();
            if state.completed || phase <= state.phase {
                return;
            }
            state.phase = phase;
            self.range(phase).0
        };
        self.raise(floor);
    }

    /// Report a phase-relative fraction in [0, 1]
    ///
    /// Out-of-range and non-finite values are ignored.
    pub fn report(&self, fraction: f32) {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            log::debug!("Ignoring out-of-range progress report {fraction}");
            return;
        }

        let (start, end) = {
            let state = self.state.lock();
            if state.completed {
                return;
            }
            self.range(state.phase)
        };
        self.raise(start + (end - start) * fraction);
    }

    /// Report sub-loader byte counters
    ///
    /// Reports with `total == 0` or `loaded > total` are ignored.
    pub fn report_bytes(&self, loaded: u64, total: u64) {
        if total == 0 || loaded > total {
            return;
        }
        self.report(loaded as f32 / total as f32);
    }

    /// Force progress to 1
    ///
    /// Only the first call per request has an effect.
    pub fn complete(&self) {
        {
            let mut state = self.state.lock();
            if state.completed {
                return;
            }
            state.completed = true;
            state.value = 1.0;
        }
        self.sink.set_percentage(1.0);
    }

    /// Forward a credits message to the sink
    pub fn set_credits(&self, message: &str) {
        self.sink.set_credits(message);
    }

    fn range(&self, phase: Phase) -> (f32, f32) {
        match phase {
            Phase::Decode => (0.0, self.decode_share),
            Phase::PostProcess => (self.decode_share, 1.0),
        }
    }

    fn raise(&self, value: f32) {
        let value = value.min(1.0);
        {
            let mut state = self.state.lock();
            if state.completed || value <= state.value {
                return;
            }
            state.value = value;
        }
        self.sink.set_percentage(value);
    }
}
